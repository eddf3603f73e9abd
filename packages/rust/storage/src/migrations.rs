//! SQL migration definitions for the SchoolForge database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: schools",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- School profile records. Classification columns carry the 'Unknown'
-- sentinel instead of NULL; school_association is a JSON array.
CREATE TABLE IF NOT EXISTS schools (
    school_id                 TEXT PRIMARY KEY,
    school_name               TEXT,
    address                   TEXT,
    city                      TEXT,
    zip                       INTEGER,
    county                    TEXT,
    phone                     TEXT,
    latitude                  REAL,
    longitude                 REAL,
    lea_id                    TEXT,
    urban_area_classification TEXT NOT NULL DEFAULT 'Unknown',
    school_type               TEXT NOT NULL DEFAULT 'Unknown',
    religious_orientation     TEXT,
    school_network            TEXT,
    catholic_diocese          TEXT,
    days_in_school_year       REAL,
    total_student_enrollment  INTEGER,
    dast_pipeline_stage       TEXT,
    source                    TEXT,
    edlink_id                 TEXT,
    twenty_id                 TEXT,
    nces_id                   TEXT,
    state_id                  TEXT,
    school_association        TEXT,
    target_school             INTEGER NOT NULL DEFAULT 0,
    lcms_district             TEXT,
    created_at                TEXT NOT NULL,
    updated_at                TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_schools_name ON schools(school_name);
CREATE INDEX IF NOT EXISTS idx_schools_target ON schools(target_school);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
