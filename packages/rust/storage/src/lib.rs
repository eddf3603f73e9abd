//! Turso Embedded / libSQL record store for school profiles.
//!
//! The [`SchoolStore`] struct wraps a local libSQL database holding the
//! canonical school records the enrichment pipeline reads from and writes
//! back to. The pipeline is the sole writer.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, Value, params};
use tracing::{debug, info};

use schoolforge_shared::{
    Association, Field, FieldValue, FieldValues, Result, School, SchoolForgeError, SchoolId,
};

/// Column list shared by every SELECT, in [`row_to_school`] index order.
const SCHOOL_COLUMNS: &str = "school_id, school_name, address, city, zip, county, phone, \
     latitude, longitude, lea_id, urban_area_classification, school_type, \
     religious_orientation, school_network, catholic_diocese, days_in_school_year, \
     total_student_enrollment, dast_pipeline_stage, source, edlink_id, twenty_id, \
     nces_id, state_id, school_association, target_school, lcms_district";

/// Primary storage handle wrapping a libSQL database.
pub struct SchoolStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// Declarative row filters for [`SchoolStore::select_schools`].
///
/// Column names come from [`Field`], never from caller strings, so filter
/// construction cannot inject SQL.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    /// Maximum rows returned.
    pub limit: Option<u32>,
    /// Equality constraints, ANDed together.
    pub eq: Vec<(Field, String)>,
}

impl SchoolStore {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SchoolForgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SchoolForgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SchoolForgeError::Storage(e.to_string()))?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SchoolForgeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Check that the database answers a trivial query.
    pub async fn test_connection(&self) -> Result<u64> {
        let count = self.count_schools().await?;
        debug!(count, "store connection ok");
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // School operations
    // -----------------------------------------------------------------------

    /// Insert a new school record.
    pub async fn insert_school(&self, school: &School) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let association_json = school
            .school_association
            .as_ref()
            .map(|a| serde_json::to_string(a).unwrap_or_default());

        self.conn
            .execute(
                "INSERT INTO schools (school_id, school_name, address, city, zip, county, phone, \
                 latitude, longitude, lea_id, urban_area_classification, school_type, \
                 religious_orientation, school_network, catholic_diocese, days_in_school_year, \
                 total_student_enrollment, dast_pipeline_stage, source, edlink_id, twenty_id, \
                 nces_id, state_id, school_association, target_school, lcms_district, \
                 created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                 ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
                params![
                    school.school_id.to_string(),
                    school.school_name.as_deref(),
                    school.address.as_deref(),
                    school.city.as_deref(),
                    school.zip.map(i64::from),
                    school.county.as_deref(),
                    school.phone.as_deref(),
                    school.latitude,
                    school.longitude,
                    school.lea_id.as_deref(),
                    school.urban_area_classification.as_str(),
                    school.school_type.as_str(),
                    school.religious_orientation.as_deref(),
                    school.school_network.as_deref(),
                    school.catholic_diocese.as_deref(),
                    school.days_in_school_year,
                    school.total_student_enrollment.map(i64::from),
                    school.dast_pipeline_stage.as_deref(),
                    school.source.as_deref(),
                    school.edlink_id.as_deref(),
                    school.twenty_id.as_deref(),
                    school.nces_id.as_deref(),
                    school.state_id.as_deref(),
                    association_json,
                    i64::from(school.target_school),
                    school.lcms_district.as_deref(),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| SchoolForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Insert a batch of school records.
    pub async fn insert_schools(&self, schools: &[School]) -> Result<()> {
        for school in schools {
            self.insert_school(school).await?;
        }
        Ok(())
    }

    /// Get a school by ID.
    pub async fn get_school(&self, id: &SchoolId) -> Result<Option<School>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SCHOOL_COLUMNS} FROM schools WHERE school_id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| SchoolForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_school(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(SchoolForgeError::Storage(e.to_string())),
        }
    }

    /// Select schools matching `filters`, in insertion (rowid) order.
    pub async fn select_schools(&self, filters: &Filters) -> Result<Vec<School>> {
        let mut sql = format!("SELECT {SCHOOL_COLUMNS} FROM schools");
        let mut values: Vec<Value> = Vec::new();

        if !filters.eq.is_empty() {
            let clauses: Vec<String> = filters
                .eq
                .iter()
                .enumerate()
                .map(|(i, (field, _))| format!("{} = ?{}", field.as_str(), i + 1))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
            values.extend(filters.eq.iter().map(|(_, v)| Value::Text(v.clone())));
        }

        sql.push_str(" ORDER BY rowid");
        if let Some(limit) = filters.limit {
            sql.push_str(&format!(" LIMIT ?{}", values.len() + 1));
            values.push(Value::Integer(i64::from(limit)));
        }

        let mut rows = self
            .conn
            .query(&sql, libsql::params_from_iter(values))
            .await
            .map_err(|e| SchoolForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_school(&row)?);
        }
        Ok(results)
    }

    /// Count all school records.
    pub async fn count_schools(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM schools", params![])
            .await
            .map_err(|e| SchoolForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<u64>(0)
                .map_err(|e| SchoolForgeError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(SchoolForgeError::Storage(e.to_string())),
        }
    }

    /// Update exactly the given fields of one school. Untouched columns keep
    /// their values; `updated_at` is bumped.
    pub async fn update_school(&self, id: &SchoolId, values: &FieldValues) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        let mut assignments = Vec::with_capacity(values.len() + 1);
        let mut bound: Vec<Value> = Vec::with_capacity(values.len() + 2);

        for (i, (field, value)) in values.iter().enumerate() {
            assignments.push(format!("{} = ?{}", field.as_str(), i + 1));
            bound.push(field_value_to_sql(value));
        }
        assignments.push(format!("updated_at = ?{}", bound.len() + 1));
        bound.push(Value::Text(Utc::now().to_rfc3339()));
        let where_idx = bound.len() + 1;
        bound.push(Value::Text(id.to_string()));

        let sql = format!(
            "UPDATE schools SET {} WHERE school_id = ?{where_idx}",
            assignments.join(", ")
        );

        let affected = self
            .conn
            .execute(&sql, libsql::params_from_iter(bound))
            .await
            .map_err(|e| SchoolForgeError::Storage(e.to_string()))?;

        if affected == 0 {
            return Err(SchoolForgeError::Storage(format!(
                "no school with id {id}"
            )));
        }
        Ok(())
    }

    /// Schools with at least one missing field, paired with their missing
    /// field lists, capped at `limit`.
    pub async fn schools_needing_enrichment(
        &self,
        limit: usize,
    ) -> Result<Vec<(School, Vec<Field>)>> {
        let schools = self.select_schools(&Filters::default()).await?;

        let mut results = Vec::new();
        for school in schools {
            let missing: Vec<Field> = Field::ALL
                .into_iter()
                .filter(|f| school.is_missing(*f))
                .collect();
            if !missing.is_empty() {
                results.push((school, missing));
                if results.len() == limit {
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Seed the database with a sample record when empty, so a fresh install
    /// has something to enrich. Returns the number of records present after.
    pub async fn initialize(&self) -> Result<u64> {
        let count = self.count_schools().await?;
        if count > 0 {
            return Ok(count);
        }

        let sample = School {
            school_name: Some("Lowell High School".into()),
            city: Some("San Francisco".into()),
            school_type: "Public".into(),
            target_school: true,
            ..School::default()
        };
        self.insert_school(&sample).await?;
        info!(school = %sample.display_name(), "seeded sample school");
        Ok(1)
    }
}

/// Map a typed field value to its SQL representation. Associations are
/// stored as a JSON array in a text column.
fn field_value_to_sql(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Int(n) => Value::Integer(i64::from(*n)),
        FieldValue::Float(v) => Value::Real(*v),
        FieldValue::Associations(list) => {
            Value::Text(serde_json::to_string(list).unwrap_or_default())
        }
    }
}

/// Convert a database row (in [`SCHOOL_COLUMNS`] order) to a [`School`].
fn row_to_school(row: &libsql::Row) -> Result<School> {
    let association_json: Option<String> = row.get::<String>(23).ok();
    let school_association: Option<Vec<Association>> = match association_json {
        Some(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| SchoolForgeError::Storage(format!("invalid association JSON: {e}")))?,
        ),
        None => None,
    };

    Ok(School {
        school_id: SchoolId(
            row.get::<String>(0)
                .map_err(|e| SchoolForgeError::Storage(e.to_string()))?,
        ),
        school_name: row.get::<String>(1).ok(),
        address: row.get::<String>(2).ok(),
        city: row.get::<String>(3).ok(),
        zip: row.get::<i64>(4).ok().and_then(|v| u32::try_from(v).ok()),
        county: row.get::<String>(5).ok(),
        phone: row.get::<String>(6).ok(),
        latitude: row.get::<f64>(7).ok(),
        longitude: row.get::<f64>(8).ok(),
        lea_id: row.get::<String>(9).ok(),
        urban_area_classification: row
            .get::<String>(10)
            .map_err(|e| SchoolForgeError::Storage(e.to_string()))?,
        school_type: row
            .get::<String>(11)
            .map_err(|e| SchoolForgeError::Storage(e.to_string()))?,
        religious_orientation: row.get::<String>(12).ok(),
        school_network: row.get::<String>(13).ok(),
        catholic_diocese: row.get::<String>(14).ok(),
        days_in_school_year: row.get::<f64>(15).ok(),
        total_student_enrollment: row
            .get::<i64>(16)
            .ok()
            .and_then(|v| u32::try_from(v).ok()),
        dast_pipeline_stage: row.get::<String>(17).ok(),
        source: row.get::<String>(18).ok(),
        edlink_id: row.get::<String>(19).ok(),
        twenty_id: row.get::<String>(20).ok(),
        nces_id: row.get::<String>(21).ok(),
        state_id: row.get::<String>(22).ok(),
        school_association,
        target_school: row.get::<i64>(24).unwrap_or(0) != 0,
        lcms_district: row.get::<String>(25).ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file store for testing.
    async fn test_store() -> SchoolStore {
        let tmp = std::env::temp_dir().join(format!("sf_test_{}.db", Uuid::new_v4()));
        SchoolStore::open(&tmp).await.expect("open test db")
    }

    fn sample_school(name: &str) -> School {
        School {
            school_name: Some(name.into()),
            city: Some("San Francisco".into()),
            zip: Some(94132),
            ..School::default()
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let store = test_store().await;
        assert_eq!(store.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sf_test_{}.db", Uuid::new_v4()));
        let s1 = SchoolStore::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = SchoolStore::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let store = test_store().await;
        let school = School {
            latitude: Some(37.7319),
            school_association: Some(vec![
                Association { name: "NCEA".into() },
                Association { name: "WCEA".into() },
            ]),
            target_school: true,
            ..sample_school("Lowell High School")
        };

        store.insert_school(&school).await.expect("insert");
        let found = store
            .get_school(&school.school_id)
            .await
            .expect("get")
            .expect("present");

        assert_eq!(found.school_name.as_deref(), Some("Lowell High School"));
        assert_eq!(found.zip, Some(94132));
        assert_eq!(found.latitude, Some(37.7319));
        assert_eq!(found.school_type, "Unknown");
        assert!(found.target_school);
        let associations = found.school_association.expect("associations");
        assert_eq!(associations.len(), 2);
        assert_eq!(associations[0].name, "NCEA");
    }

    #[tokio::test]
    async fn missing_school_is_none() {
        let store = test_store().await;
        let found = store.get_school(&SchoolId::from("nope")).await.expect("get");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn filters_apply_equality_and_limit() {
        let store = test_store().await;
        store
            .insert_schools(&[
                sample_school("A"),
                sample_school("B"),
                School {
                    city: Some("Oakland".into()),
                    ..sample_school("C")
                },
            ])
            .await
            .expect("insert batch");

        let sf = store
            .select_schools(&Filters {
                eq: vec![(Field::City, "San Francisco".into())],
                limit: None,
            })
            .await
            .expect("select");
        assert_eq!(sf.len(), 2);

        let limited = store
            .select_schools(&Filters {
                eq: vec![],
                limit: Some(2),
            })
            .await
            .expect("select limited");
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].school_name.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn update_touches_only_given_fields() {
        let store = test_store().await;
        let school = sample_school("Lowell High School");
        store.insert_school(&school).await.expect("insert");

        let mut values = FieldValues::new();
        values.insert(Field::Phone, FieldValue::Text("(415) 759-2730".into()));
        values.insert(Field::TotalStudentEnrollment, FieldValue::Int(2650));
        store
            .update_school(&school.school_id, &values)
            .await
            .expect("update");

        let found = store
            .get_school(&school.school_id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(found.phone.as_deref(), Some("(415) 759-2730"));
        assert_eq!(found.total_student_enrollment, Some(2650));
        // Untouched columns unchanged.
        assert_eq!(found.city.as_deref(), Some("San Francisco"));
        assert_eq!(found.zip, Some(94132));
    }

    #[tokio::test]
    async fn update_unknown_id_fails() {
        let store = test_store().await;
        let mut values = FieldValues::new();
        values.insert(Field::Phone, FieldValue::Text("x".into()));
        let result = store.update_school(&SchoolId::from("nope"), &values).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn update_with_no_values_is_a_no_op() {
        let store = test_store().await;
        store
            .update_school(&SchoolId::from("nope"), &FieldValues::new())
            .await
            .expect("empty update");
    }

    #[tokio::test]
    async fn needing_enrichment_reports_missing_fields() {
        let store = test_store().await;
        let school = sample_school("Lowell High School");
        store.insert_school(&school).await.expect("insert");

        let needing = store
            .schools_needing_enrichment(10)
            .await
            .expect("query");
        assert_eq!(needing.len(), 1);
        let (found, missing) = &needing[0];
        assert_eq!(found.school_id, school.school_id);
        assert!(!missing.contains(&Field::SchoolName));
        assert!(!missing.contains(&Field::Zip));
        assert!(missing.contains(&Field::Phone));
        assert!(missing.contains(&Field::SchoolType)); // sentinel counts as missing
    }

    #[tokio::test]
    async fn needing_enrichment_respects_limit() {
        let store = test_store().await;
        store
            .insert_schools(&[sample_school("A"), sample_school("B"), sample_school("C")])
            .await
            .expect("insert");

        let needing = store.schools_needing_enrichment(2).await.expect("query");
        assert_eq!(needing.len(), 2);
    }

    #[tokio::test]
    async fn initialize_seeds_once() {
        let store = test_store().await;
        assert_eq!(store.initialize().await.expect("first init"), 1);
        assert_eq!(store.initialize().await.expect("second init"), 1);
        assert_eq!(store.count_schools().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn out_of_range_numeric_columns_read_as_missing() {
        let store = test_store().await;
        let school = sample_school("A");
        store.insert_school(&school).await.expect("insert");

        // Plant values no u32 field can represent, as a hand-edited or
        // corrupted row would.
        store
            .conn
            .execute(
                "UPDATE schools SET zip = -5, total_student_enrollment = 4294967296 \
                 WHERE school_id = ?1",
                params![school.school_id.to_string()],
            )
            .await
            .expect("raw update");

        let read = store
            .get_school(&school.school_id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(read.zip, None);
        assert_eq!(read.total_student_enrollment, None);
    }

    #[tokio::test]
    async fn test_connection_reports_count() {
        let store = test_store().await;
        assert_eq!(store.test_connection().await.expect("ping"), 0);
        store
            .insert_school(&sample_school("A"))
            .await
            .expect("insert");
        assert_eq!(store.test_connection().await.expect("ping"), 1);
    }
}
