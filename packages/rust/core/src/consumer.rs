//! Batch consumers.
//!
//! A [`Consumer`] takes planned batches and does the actual enrichment work.
//! The built-in [`ScrapingConsumer`] searches each configured source for a
//! school, scrapes the first hit, and persists whatever the merge accepts.

use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};

use schoolforge_scrape::{Extraction, Fetcher, SourceRegistry, extract};
use schoolforge_shared::{FieldValues, Result, School, SourceConfig};
use schoolforge_storage::SchoolStore;

use crate::planner::{Batch, SimplifiedSchool};
use crate::reconcile;

/// Per-batch outcome counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOutcome {
    /// Schools attempted.
    pub schools_processed: usize,
    /// Field values accepted and persisted.
    pub fields_filled: usize,
    /// Schools that could not be processed at all.
    pub schools_failed: usize,
}

/// Processes one planned batch.
pub trait Consumer {
    async fn consume(&self, batch: &Batch) -> Result<BatchOutcome>;
}

/// Consumer that enriches schools by scraping the registered sources in
/// priority order, filling only missing fields.
pub struct ScrapingConsumer<'a> {
    fetcher: Fetcher,
    registry: SourceRegistry,
    store: &'a SchoolStore,
}

impl<'a> ScrapingConsumer<'a> {
    pub fn new(fetcher: Fetcher, registry: SourceRegistry, store: &'a SchoolStore) -> Self {
        Self {
            fetcher,
            registry,
            store,
        }
    }

    /// Enrich one school across all sources. Source failures are isolated:
    /// a source that errors is skipped and the rest still run.
    async fn enrich_school(&self, school: &mut School) -> Result<FieldValues> {
        let query = school.display_name().to_string();
        let mut applied = FieldValues::new();

        for source in self.registry.sources() {
            if reconcile::missing_fields(school).is_empty() {
                break;
            }

            let extraction = match self.scrape_source(source, &query).await {
                Ok(Some(extraction)) => extraction,
                Ok(None) => {
                    info!(source = %source.name, school = %query, "no search results");
                    continue;
                }
                Err(e) => {
                    warn!(source = %source.name, school = %query, error = %e, "source failed, skipping");
                    continue;
                }
            };

            let outcome = reconcile::merge(school, &extraction)?;
            applied.extend(outcome.applied);
        }

        Ok(applied)
    }

    /// Search `source` for `query` and scrape the first result page.
    async fn scrape_source(
        &self,
        source: &SourceConfig,
        query: &str,
    ) -> Result<Option<Extraction>> {
        let search_url = self.registry.build_search_url(source, query)?;
        let (search_html, _) = self.fetcher.fetch(&search_url).await?;

        let Some(page_url) = self
            .registry
            .search_results(source, &search_html)
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let (page_html, final_url) = self.fetcher.fetch(&page_url).await?;
        let selectors = self.registry.selectors_for(source);
        let values = extract(&page_html, &selectors);

        Ok(Some(Extraction {
            values,
            source_url: final_url,
        }))
    }

    /// Load, enrich, and persist one school. Returns the number of fields
    /// filled, or `Ok(None)` when the record is gone from the store.
    async fn process_school(&self, record: &SimplifiedSchool) -> Result<Option<usize>> {
        let Some(mut school) = self.store.get_school(&record.school_id).await? else {
            return Ok(None);
        };

        let applied = self.enrich_school(&mut school).await?;
        if !applied.is_empty() {
            self.store.update_school(&school.school_id, &applied).await?;
        }

        info!(
            school = %school.display_name(),
            filled = applied.len(),
            still_missing = reconcile::missing_fields(&school).len(),
            "school processed"
        );
        Ok(Some(applied.len()))
    }
}

impl Consumer for ScrapingConsumer<'_> {
    /// Schools in the batch run concurrently; the fetcher's permit cap
    /// bounds in-flight requests. Within one school, sources are scraped
    /// and merged in priority order. A school that errors is counted as
    /// failed and the rest of the batch still completes.
    #[instrument(skip_all, fields(batch = batch.index, schools = batch.schools.len()))]
    async fn consume(&self, batch: &Batch) -> Result<BatchOutcome> {
        let results: Vec<_> = stream::iter(&batch.schools)
            .map(|record| async move { (record, self.process_school(record).await) })
            .buffer_unordered(batch.schools.len().max(1))
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for (record, result) in results {
            match result {
                Ok(Some(filled)) => {
                    outcome.schools_processed += 1;
                    outcome.fields_filled += filled;
                }
                Ok(None) => {
                    warn!(school_id = %record.school_id, "school vanished from store");
                    outcome.schools_failed += 1;
                }
                Err(e) => {
                    warn!(school = %record.school_name, error = %e, "school failed, continuing batch");
                    outcome.schools_failed += 1;
                }
            }
        }

        Ok(outcome)
    }
}

/// Consumer that only counts, for dry runs.
pub struct NoopConsumer;

impl Consumer for NoopConsumer {
    async fn consume(&self, batch: &Batch) -> Result<BatchOutcome> {
        Ok(BatchOutcome {
            schools_processed: batch.schools.len(),
            ..BatchOutcome::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use url::Url;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use schoolforge_shared::{BatchConfig, FetchConfig, Field, FieldValue};

    use crate::planner::{self, HeuristicCounter};

    fn test_fetch_config() -> FetchConfig {
        FetchConfig {
            politeness_min_ms: 0,
            politeness_max_ms: 0,
            timeout_secs: 5,
            max_attempts: 1,
            retry_base_ms: 1,
            retry_max_ms: 2,
            jitter: false,
            concurrency: 4,
        }
    }

    fn test_source(server: &MockServer) -> SourceConfig {
        let mut selectors = BTreeMap::new();
        selectors.insert(Field::Phone, ".phone".to_string());
        selectors.insert(Field::Zip, ".zip".to_string());
        selectors.insert(Field::SchoolType, ".type".to_string());
        SourceConfig {
            name: "TestSource".into(),
            base_url: Url::parse(&server.uri()).expect("server url"),
            search_path: "/search?q={query}".into(),
            selectors,
        }
    }

    async fn test_store() -> SchoolStore {
        let tmp = std::env::temp_dir().join(format!("sf_consumer_{}.db", Uuid::new_v4()));
        SchoolStore::open(&tmp).await.expect("open test db")
    }

    fn batch_for(store_records: &[(School, Vec<Field>)]) -> Batch {
        let config = BatchConfig::default();
        planner::plan(&config, &HeuristicCounter, store_records, &[])
            .expect("plan")
            .into_iter()
            .next()
            .expect("one batch")
    }

    #[tokio::test]
    async fn consume_scrapes_merges_and_persists() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><a href="/school/lowell">Lowell</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/school/lowell"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body>
                    <span class="phone">(415) 759-2730</span>
                    <span class="zip">CA 94132</span>
                    <span class="type">Public</span>
                </body></html>"#,
            ))
            .mount(&server)
            .await;

        let store = test_store().await;
        let school = School {
            school_name: Some("Lowell High School".into()),
            ..School::default()
        };
        store.insert_school(&school).await.expect("insert");

        let missing = reconcile::missing_fields(&school);
        let batch = batch_for(&[(school.clone(), missing)]);

        let consumer = ScrapingConsumer::new(
            Fetcher::new(&test_fetch_config()).expect("fetcher"),
            SourceRegistry::new(vec![test_source(&server)]),
            &store,
        );

        let outcome = consumer.consume(&batch).await.expect("consume");
        assert_eq!(outcome.schools_processed, 1);
        assert_eq!(outcome.schools_failed, 0);
        assert!(outcome.fields_filled >= 3);

        let enriched = store
            .get_school(&school.school_id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(enriched.phone.as_deref(), Some("(415) 759-2730"));
        assert_eq!(enriched.zip, Some(94132));
        assert_eq!(enriched.school_type, "Public");
        // Provenance points at the scraped page.
        assert!(enriched.source.expect("source").ends_with("/school/lowell"));
        // Present-before values survived.
        assert_eq!(enriched.school_name.as_deref(), Some("Lowell High School"));
    }

    #[tokio::test]
    async fn failing_source_does_not_fail_the_school() {
        let server = MockServer::start().await;
        // Search endpoint is down; everything 500s.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = test_store().await;
        let school = School {
            school_name: Some("Lowell High School".into()),
            ..School::default()
        };
        store.insert_school(&school).await.expect("insert");

        let missing = reconcile::missing_fields(&school);
        let batch = batch_for(&[(school.clone(), missing)]);

        let consumer = ScrapingConsumer::new(
            Fetcher::new(&test_fetch_config()).expect("fetcher"),
            SourceRegistry::new(vec![test_source(&server)]),
            &store,
        );

        let outcome = consumer.consume(&batch).await.expect("consume");
        assert_eq!(outcome.schools_processed, 1);
        assert_eq!(outcome.fields_filled, 0);

        let unchanged = store
            .get_school(&school.school_id)
            .await
            .expect("get")
            .expect("present");
        assert!(unchanged.phone.is_none());
    }

    #[tokio::test]
    async fn empty_search_results_move_on() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><p>no results</p></body></html>"),
            )
            .mount(&server)
            .await;

        let store = test_store().await;
        let school = School {
            school_name: Some("Nowhere Academy".into()),
            ..School::default()
        };
        store.insert_school(&school).await.expect("insert");

        let missing = reconcile::missing_fields(&school);
        let batch = batch_for(&[(school.clone(), missing)]);

        let consumer = ScrapingConsumer::new(
            Fetcher::new(&test_fetch_config()).expect("fetcher"),
            SourceRegistry::new(vec![test_source(&server)]),
            &store,
        );

        let outcome = consumer.consume(&batch).await.expect("consume");
        assert_eq!(outcome.schools_processed, 1);
        assert_eq!(outcome.fields_filled, 0);
    }

    #[tokio::test]
    async fn missing_record_counts_as_failed() {
        let store = test_store().await;
        let school = School {
            school_name: Some("Ghost School".into()),
            ..School::default()
        };
        // Never inserted into the store.
        let missing = reconcile::missing_fields(&school);
        let batch = batch_for(&[(school, missing)]);

        let server = MockServer::start().await;
        let consumer = ScrapingConsumer::new(
            Fetcher::new(&test_fetch_config()).expect("fetcher"),
            SourceRegistry::new(vec![test_source(&server)]),
            &store,
        );

        let outcome = consumer.consume(&batch).await.expect("consume");
        assert_eq!(outcome.schools_processed, 0);
        assert_eq!(outcome.schools_failed, 1);
    }

    #[tokio::test]
    async fn failing_school_does_not_fail_the_batch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><a href="/school/lowell">Lowell</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/school/lowell"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><span class="phone">(415) 759-2730</span></body></html>"#,
            ))
            .mount(&server)
            .await;

        let store = test_store().await;
        let corrupt = School {
            school_name: Some("Corrupt Academy".into()),
            ..School::default()
        };
        let healthy = School {
            school_name: Some("Lowell High School".into()),
            ..School::default()
        };
        store.insert_school(&corrupt).await.expect("insert");
        store.insert_school(&healthy).await.expect("insert");

        // Wreck the first school's association column so loading it errors.
        let mut bad = FieldValues::new();
        bad.insert(Field::SchoolAssociation, FieldValue::Text("not json".into()));
        store
            .update_school(&corrupt.school_id, &bad)
            .await
            .expect("update");

        let batch = batch_for(&[
            (corrupt.clone(), reconcile::missing_fields(&corrupt)),
            (healthy.clone(), reconcile::missing_fields(&healthy)),
        ]);

        let consumer = ScrapingConsumer::new(
            Fetcher::new(&test_fetch_config()).expect("fetcher"),
            SourceRegistry::new(vec![test_source(&server)]),
            &store,
        );

        let outcome = consumer.consume(&batch).await.expect("consume");
        assert_eq!(outcome.schools_failed, 1);
        assert_eq!(outcome.schools_processed, 1);

        // The healthy school was still enriched and persisted.
        let enriched = store
            .get_school(&healthy.school_id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(enriched.phone.as_deref(), Some("(415) 759-2730"));
    }

    #[tokio::test]
    async fn schools_in_a_batch_run_concurrently() {
        let server = MockServer::start().await;
        let delay = std::time::Duration::from_millis(400);

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_delay(delay).set_body_string(
                r#"<html><body><a href="/school/lowell">Lowell</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/school/lowell"))
            .respond_with(ResponseTemplate::new(200).set_delay(delay).set_body_string(
                r#"<html><body><span class="phone">(415) 759-2730</span></body></html>"#,
            ))
            .mount(&server)
            .await;

        let store = test_store().await;
        let mut records = Vec::new();
        for name in ["Lowell High School", "Mission High School"] {
            let school = School {
                school_name: Some(name.into()),
                ..School::default()
            };
            store.insert_school(&school).await.expect("insert");
            let missing = reconcile::missing_fields(&school);
            records.push((school, missing));
        }
        let batch = batch_for(&records);

        let consumer = ScrapingConsumer::new(
            Fetcher::new(&test_fetch_config()).expect("fetcher"),
            SourceRegistry::new(vec![test_source(&server)]),
            &store,
        );

        let started = std::time::Instant::now();
        let outcome = consumer.consume(&batch).await.expect("consume");
        let elapsed = started.elapsed();

        assert_eq!(outcome.schools_processed, 2);
        // Each school makes two 400 ms fetches; one school at a time would
        // need about 1.6 s, overlapped schools about 0.8 s.
        assert!(
            elapsed < std::time::Duration::from_millis(1400),
            "batch took {elapsed:?}"
        );
    }
}
