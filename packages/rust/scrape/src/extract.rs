//! Selector-driven field extraction with per-field type coercion.
//!
//! Every field is independent: a selector that matches nothing leaves the
//! field out of the result entirely, and a coercion failure is logged and
//! omitted rather than aborting the remaining fields.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use schoolforge_shared::{Association, Field, FieldKind, FieldValue, FieldValues};

/// A field-value mapping extracted from one page, with the resolved final
/// URL carried as provenance.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub values: FieldValues,
    pub source_url: Url,
}

/// Evaluate `selectors` against `html` and coerce each match per its field.
///
/// Omission distinguishes "not found" from "found empty": a matched element
/// with no text and no `content` attribute yields an empty text value, while
/// an unmatched selector yields nothing at all.
pub fn extract(html: &str, selectors: &std::collections::BTreeMap<Field, String>) -> FieldValues {
    let doc = Html::parse_document(html);
    let mut values = FieldValues::new();

    for (&field, selector_str) in selectors {
        let selector = match Selector::parse(selector_str) {
            Ok(s) => s,
            Err(e) => {
                warn!(%field, selector = %selector_str, "invalid selector: {e}");
                continue;
            }
        };

        if field.kind() == FieldKind::Associations {
            let list: Vec<Association> = doc
                .select(&selector)
                .map(|el| Association {
                    name: element_text(&el),
                })
                .collect();
            if !list.is_empty() {
                values.insert(field, FieldValue::Associations(list));
            }
            continue;
        }

        let Some(element) = doc.select(&selector).next() else {
            continue;
        };

        let raw = match raw_value(&element) {
            Some(v) => v,
            // Matched but empty: record found-empty for text fields.
            None if field.kind() == FieldKind::Text => String::new(),
            None => continue,
        };

        match coerce(field, &raw) {
            Ok(Some(value)) => {
                values.insert(field, value);
            }
            Ok(None) => {} // stripped to nothing, omit
            Err(message) => {
                warn!(%field, raw, "coercion failed, omitting field: {message}");
            }
        }
    }

    values
}

/// Trimmed text content, or the `content` attribute when the text is empty
/// (meta-tag style sources).
fn raw_value(element: &ElementRef<'_>) -> Option<String> {
    let text = element_text(element);
    if !text.is_empty() {
        return Some(text);
    }
    element
        .value()
        .attr("content")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Apply the field's coercion rule. `Ok(None)` means the value stripped to
/// nothing and the field should be omitted.
fn coerce(field: Field, raw: &str) -> std::result::Result<Option<FieldValue>, String> {
    match field.kind() {
        FieldKind::Geo => raw
            .parse::<f64>()
            .map(|v| Some(FieldValue::Float(v)))
            .map_err(|e| e.to_string()),
        FieldKind::Count => {
            let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return Ok(None);
            }
            digits
                .parse::<u32>()
                .map(|v| Some(FieldValue::Int(v)))
                .map_err(|e| e.to_string())
        }
        FieldKind::Days => {
            let cleaned: String = raw
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if cleaned.is_empty() {
                return Ok(None);
            }
            cleaned
                .parse::<f64>()
                .map(|v| Some(FieldValue::Float(v)))
                .map_err(|e| e.to_string())
        }
        FieldKind::Text => Ok(Some(FieldValue::Text(raw.to_string()))),
        // Handled by the caller via select-all.
        FieldKind::Associations => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn selectors(entries: &[(Field, &str)]) -> BTreeMap<Field, String> {
        entries
            .iter()
            .map(|(f, s)| (*f, s.to_string()))
            .collect()
    }

    #[test]
    fn unmatched_selector_is_absent_not_null() {
        let html = "<html><body><p>nothing relevant</p></body></html>";
        let map = selectors(&[(Field::SchoolName, "h1.school-name")]);
        let values = extract(html, &map);
        assert!(!values.contains_key(&Field::SchoolName));
        assert!(values.is_empty());
    }

    #[test]
    fn text_field_trimmed() {
        let html = r#"<html><body><h1 class="school-name">  Lowell High School  </h1></body></html>"#;
        let map = selectors(&[(Field::SchoolName, "h1.school-name")]);
        let values = extract(html, &map);
        assert_eq!(
            values.get(&Field::SchoolName),
            Some(&FieldValue::Text("Lowell High School".into()))
        );
    }

    #[test]
    fn content_attribute_fallback() {
        let html = r#"<html><head><meta itemprop="latitude" content="37.7319"></head></html>"#;
        let map = selectors(&[(Field::Latitude, r#"meta[itemprop="latitude"]"#)]);
        let values = extract(html, &map);
        assert_eq!(values.get(&Field::Latitude), Some(&FieldValue::Float(37.7319)));
    }

    #[test]
    fn count_field_strips_non_digits() {
        let html = r#"<html><body>
            <span class="zip">CA 94132</span>
            <div class="enrollment">2,650 students</div>
        </body></html>"#;
        let map = selectors(&[
            (Field::Zip, ".zip"),
            (Field::TotalStudentEnrollment, ".enrollment"),
        ]);
        let values = extract(html, &map);
        assert_eq!(values.get(&Field::Zip), Some(&FieldValue::Int(94132)));
        assert_eq!(
            values.get(&Field::TotalStudentEnrollment),
            Some(&FieldValue::Int(2650))
        );
    }

    #[test]
    fn count_field_with_no_digits_is_omitted() {
        let html = r#"<html><body><span class="zip">unknown</span></body></html>"#;
        let map = selectors(&[(Field::Zip, ".zip")]);
        let values = extract(html, &map);
        assert!(!values.contains_key(&Field::Zip));
    }

    #[test]
    fn days_field_keeps_decimal_point() {
        let html = r#"<html><body><span class="school-days">180.5 days</span></body></html>"#;
        let map = selectors(&[(Field::DaysInSchoolYear, ".school-days")]);
        let values = extract(html, &map);
        assert_eq!(
            values.get(&Field::DaysInSchoolYear),
            Some(&FieldValue::Float(180.5))
        );
    }

    #[test]
    fn malformed_days_value_is_omitted_not_fatal() {
        // Two decimal points survive stripping and fail the float parse; the
        // other field must still come through.
        let html = r#"<html><body>
            <span class="school-days">1.8.0</span>
            <h1 class="school-name">Lowell</h1>
        </body></html>"#;
        let map = selectors(&[
            (Field::DaysInSchoolYear, ".school-days"),
            (Field::SchoolName, ".school-name"),
        ]);
        let values = extract(html, &map);
        assert!(!values.contains_key(&Field::DaysInSchoolYear));
        assert_eq!(
            values.get(&Field::SchoolName),
            Some(&FieldValue::Text("Lowell".into()))
        );
    }

    #[test]
    fn association_field_collects_every_match() {
        let html = r#"<html><body>
            <li class="memberships">NCEA</li>
            <li class="memberships">WCEA</li>
            <li class="memberships">NAIS</li>
        </body></html>"#;
        let map = selectors(&[(Field::SchoolAssociation, ".memberships")]);
        let values = extract(html, &map);
        match values.get(&Field::SchoolAssociation) {
            Some(FieldValue::Associations(list)) => {
                assert_eq!(list.len(), 3);
                assert_eq!(list[0].name, "NCEA");
                assert_eq!(list[2].name, "NAIS");
            }
            other => panic!("expected associations, got {other:?}"),
        }
    }

    #[test]
    fn found_empty_text_is_distinct_from_not_found() {
        let html = r#"<html><body><span class="phone"></span></body></html>"#;
        let map = selectors(&[(Field::Phone, ".phone")]);
        let values = extract(html, &map);
        assert_eq!(values.get(&Field::Phone), Some(&FieldValue::Text(String::new())));
    }

    #[test]
    fn invalid_selector_skips_only_that_field() {
        let html = r#"<html><body><h1 class="school-name">Lowell</h1></body></html>"#;
        let map = selectors(&[
            (Field::SchoolName, ".school-name"),
            (Field::City, ":::not-a-selector"),
        ]);
        let values = extract(html, &map);
        assert_eq!(values.len(), 1);
        assert!(values.contains_key(&Field::SchoolName));
    }

    #[test]
    fn selector_list_takes_first_match() {
        let html = r#"<html><body><h1>Fallback Title</h1></body></html>"#;
        let map = selectors(&[(Field::SchoolName, ".school-name, h1")]);
        let values = extract(html, &map);
        assert_eq!(
            values.get(&Field::SchoolName),
            Some(&FieldValue::Text("Fallback Title".into()))
        );
    }
}
