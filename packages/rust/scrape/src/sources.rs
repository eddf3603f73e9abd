//! Source registry: named scrape targets with per-field selector overrides.

use std::collections::BTreeMap;

use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

use schoolforge_shared::{Field, Result, SchoolForgeError, SourceConfig};

/// Cross-source fallback selectors, one entry per schema field. Per-source
/// overrides shadow these field-by-field.
pub fn default_selectors() -> BTreeMap<Field, String> {
    use Field::*;
    [
        (SchoolName, "h1.school-name, h1.name, .school-title"),
        (
            Address,
            ".school-address, .address, span[itemprop='streetAddress']",
        ),
        (City, ".school-city, .city, span[itemprop='addressLocality']"),
        (Zip, ".school-zip, .zip, span[itemprop='postalCode']"),
        (County, ".school-county, .county"),
        (Phone, ".school-phone, .phone, .tel"),
        (Latitude, "meta[itemprop='latitude'], [data-latitude]"),
        (Longitude, "meta[itemprop='longitude'], [data-longitude]"),
        (LeaId, ".lea-id, .district-id"),
        (UrbanAreaClassification, ".urban-classification, .locale"),
        (SchoolType, ".school-type, .type, .category"),
        (ReligiousOrientation, ".religious-orientation, .faith"),
        (SchoolNetwork, ".network, .affiliation"),
        (CatholicDiocese, ".diocese, .catholic-diocese"),
        (DaysInSchoolYear, ".school-days, .calendar-days"),
        (TotalStudentEnrollment, ".enrollment, .student-count"),
        (DastPipelineStage, ".pipeline-stage"),
        (Source, ".source-info"),
        (EdlinkId, ".edlink-id"),
        (TwentyId, ".twenty-id"),
        (NcesId, ".nces-id, .national-id"),
        (StateId, ".state-id"),
        (SchoolAssociation, ".association-info, .memberships"),
        (LcmsDistrict, ".lcms-district"),
    ]
    .into_iter()
    .map(|(f, s)| (f, s.to_string()))
    .collect()
}

fn overrides(entries: &[(Field, &str)]) -> BTreeMap<Field, String> {
    entries.iter().map(|(f, s)| (*f, s.to_string())).collect()
}

/// The built-in source set, in priority order.
pub fn builtin_sources() -> Vec<SourceConfig> {
    use Field::*;
    vec![
        SourceConfig {
            name: "GreatSchools".into(),
            // Hand-written literals; parse cannot fail.
            base_url: Url::parse("https://www.greatschools.org").unwrap(),
            search_path: "/search/search.page?q={query}".into(),
            selectors: overrides(&[
                (SchoolName, ".school-name, h1"),
                (Address, ".school-address"),
                (City, "span[itemprop='addressLocality']"),
                (Zip, "span[itemprop='postalCode']"),
                (Phone, ".school-phone"),
                (TotalStudentEnrollment, ".enrollment-number"),
                (SchoolType, ".school-type"),
                (NcesId, ".nces-id"),
            ]),
        },
        SourceConfig {
            name: "Niche".into(),
            base_url: Url::parse("https://www.niche.com/k12").unwrap(),
            search_path: "/search/schools/?q={query}".into(),
            selectors: overrides(&[
                (SchoolName, ".school-header__name"),
                (Address, ".school-address__line"),
                (City, ".school-address__city"),
                (Zip, ".school-address__zip"),
                (Phone, ".school-contact__phone"),
                (TotalStudentEnrollment, ".school-stats__enrollment"),
                (SchoolType, ".school-stats__type"),
                (NcesId, ".school-id--nces"),
            ]),
        },
        SourceConfig {
            name: "SchoolDigger".into(),
            base_url: Url::parse("https://www.schooldigger.com").unwrap(),
            search_path: "/go/XX/search.aspx?q={query}".into(),
            selectors: overrides(&[
                (SchoolName, ".schoolTitle"),
                (Address, ".schoolAddress"),
                (City, ".schoolCity"),
                (Zip, ".schoolZip"),
                (Phone, ".schoolPhone"),
                (TotalStudentEnrollment, ".enrollment"),
                (SchoolType, ".schoolType"),
                (NcesId, ".ncesID"),
            ]),
        },
    ]
}

// ---------------------------------------------------------------------------
// SourceRegistry
// ---------------------------------------------------------------------------

/// Named lookup over the configured sources, plus search-URL construction
/// and result-link discovery.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceConfig>,
    defaults: BTreeMap<Field, String>,
}

/// Cap on search result links returned per source.
const SEARCH_RESULT_LIMIT: usize = 5;

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new(builtin_sources())
    }
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self {
            sources,
            defaults: default_selectors(),
        }
    }

    /// All sources in priority order.
    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    /// Look up a source by name. First match wins, so an earlier entry
    /// shadows a later one with the same name.
    pub fn resolve(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SchoolForgeError::config(format!("unknown source: {name}")))
    }

    /// The effective selector mapping for `source`: defaults overlaid with
    /// the source's per-field overrides.
    pub fn selectors_for(&self, source: &SourceConfig) -> BTreeMap<Field, String> {
        let mut merged = self.defaults.clone();
        for (field, selector) in &source.selectors {
            merged.insert(*field, selector.clone());
        }
        merged
    }

    /// Build the search URL for `query` against `source`, percent-encoding
    /// the query into the `{query}` placeholder.
    pub fn build_search_url(&self, source: &SourceConfig, query: &str) -> Result<Url> {
        let encoded = encode_query(query);
        let path = source.search_path.replace("{query}", &encoded);
        source.base_url.join(&path).map_err(|e| {
            SchoolForgeError::config(format!(
                "invalid search path for source '{}': {e}",
                source.name
            ))
        })
    }

    /// Extract candidate school links from a search-results page: anchors
    /// whose href mentions "school", resolved against the source base URL,
    /// capped at [`SEARCH_RESULT_LIMIT`]. Best-effort by design; pages with
    /// no matching anchors yield an empty list, not an error.
    pub fn search_results(&self, source: &SourceConfig, html: &str) -> Vec<Url> {
        // Static pattern, parse cannot fail.
        let selector = Selector::parse(r#"a[href*="school"]"#).unwrap();
        let doc = Html::parse_document(html);

        let mut links = Vec::new();
        for anchor in doc.select(&selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            match source.base_url.join(href) {
                Ok(url) => links.push(url),
                Err(e) => warn!(href, source = %source.name, "skipping unjoinable link: {e}"),
            }
            if links.len() == SEARCH_RESULT_LIMIT {
                break;
            }
        }
        links
    }
}

/// Form-encode a search query for use inside a URL query component.
fn encode_query(query: &str) -> String {
    url::form_urlencoded::byte_serialize(query.as_bytes()).collect()
}
