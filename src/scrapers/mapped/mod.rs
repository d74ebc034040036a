//! Declarative document-to-record mapping.
//!
//! A mapping block names, for each output field, how to extract it from a
//! [`LoadedDocument`]. Processing a block yields rows: row *i* holds the
//! *i*-th value of every field, so list pages produce one record per row.

mod attribute;
pub mod dates;
mod postprocess;
mod scrape;

pub use attribute::AttributeConfig;
pub use postprocess::{apply_chain, feet_to_cm, lb_to_kg, PostProcessAction, RegexReplace};
pub use scrape::{GalleryMapping, MappedScraper, MovieMapping, PerformerMapping, SceneMapping};

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::models::{FieldValue, MappedFields};
use crate::scrapers::document::LoadedDocument;

/// Field key whose values are kept together as one list.
pub const URLS_KEY: &str = "URLs";

/// A map that keeps the order keys were written in.
#[derive(Debug, Clone)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn retain(&mut self, mut f: impl FnMut(&str) -> bool) {
        self.0.retain(|(k, _)| f(k));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(OrderedMap::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = OrderedMap::new();
                while let Some(key) = access.next_key::<String>()? {
                    let value = access
                        .next_value::<V>()
                        .map_err(|e| serde::de::Error::custom(format!("{}: {}", key, e)))?;
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

/// Placeholder to selector-fragment substitutions shared by a mapping block.
pub type CommonConfig = OrderedMap<String>;

/// Ordered output field name to attribute configuration.
pub type MappingConfig = OrderedMap<AttributeConfig>;

/// One result row: field key to extracted value.
pub type MappedRow = HashMap<String, FieldValue>;

fn set_single(rows: &mut Vec<MappedRow>, index: usize, key: &str, value: String) {
    if rows.len() <= index {
        rows.resize_with(index + 1, MappedRow::new);
    }
    rows[index].insert(key.to_string(), FieldValue::Single(value));
}

fn set_multi(rows: &mut Vec<MappedRow>, key: &str, values: Vec<String>) {
    if rows.is_empty() {
        rows.push(MappedRow::new());
    }
    rows[0].insert(key.to_string(), FieldValue::Multi(values));
}

fn hostname(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    match url::Url::parse(url) {
        Ok(u) => u.host_str().unwrap_or_default().to_string(),
        Err(e) => {
            tracing::warn!("Error parsing URL '{}': {}", url, e);
            String::new()
        }
    }
}

fn substitute_input(template: &str, input_url: &str, input_host: &str) -> String {
    template
        .replace("{inputURL}", input_url)
        .replace("{inputHostname}", input_host)
}

impl MappingConfig {
    /// Extract every field from `doc` into rows.
    ///
    /// When `urls_multi` is set the `URLs` key keeps all of its values as
    /// one list in row 0.
    pub async fn process(
        &self,
        doc: &LoadedDocument,
        common: &CommonConfig,
        urls_multi: bool,
    ) -> Vec<MappedRow> {
        let mut rows = Vec::new();
        let input_url = doc.url().to_string();
        let input_host = hostname(&input_url);

        for (key, attr) in self.iter() {
            if let Some(fixed) = attr.fixed.as_deref() {
                set_single(&mut rows, 0, key, substitute_input(fixed, &input_url, &input_host));
                continue;
            }

            let mut selector = attr.selector.clone();
            for (placeholder, fragment) in common.iter() {
                selector = selector.replace(placeholder, fragment);
            }
            let selector = substitute_input(&selector, &input_url, &input_host);

            let found = doc.query(&selector);
            if found.is_empty() {
                continue;
            }
            tracing::debug!("{}: {} match(es) for {}", key, found.len(), selector);

            let values = post_process(attr, found, doc).await;
            if urls_multi && key == URLS_KEY {
                set_multi(&mut rows, key, values);
            } else {
                for (i, value) in values.into_iter().enumerate() {
                    set_single(&mut rows, i, key, value);
                }
            }
        }

        rows
    }
}

/// Run the attribute's post-processing over the raw matches.
async fn post_process(attr: &AttributeConfig, found: Vec<String>, doc: &LoadedDocument) -> Vec<String> {
    if attr.concat.is_some() {
        let joined = attr.concatenate(&found);
        let value = apply_chain(attr, joined, doc).await;
        if attr.split.is_none() {
            return vec![value];
        }
        let pieces = attr.split_value(&value);
        if doc.is_search() {
            return pieces;
        }
        return AttributeConfig::clean(pieces);
    }

    let mut out = Vec::with_capacity(found.len());
    for text in found {
        let value = apply_chain(attr, text, doc).await;
        // only the first match is split when there is no concat
        if attr.split.is_some() {
            return attr.split_value(&value);
        }
        out.push(value);
    }

    if doc.is_search() {
        return out;
    }
    AttributeConfig::clean(out)
}

/// Build a fragment from one row, warning about values that do not fit.
pub fn apply_row<T: MappedFields>(row: &MappedRow) -> T {
    let mut target = T::default();
    let mut keys: Vec<&String> = row.keys().collect();
    keys.sort();
    for key in keys {
        if let Err(e) = target.set_field(key, row[key].clone()) {
            tracing::warn!("{}", e);
        }
    }
    target
}

/// Drop keys the fragment type does not have.
pub(crate) fn retain_known<T: MappedFields>(config: &mut MappingConfig, block: &str) {
    config.retain(|key| {
        let known = T::has_field(key);
        if !known {
            tracing::warn!("Ignoring unknown field {} in {} mapping", key, block);
        }
        known
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScrapedPerformer;
    use crate::scrapers::document::{Document, QueryType};

    #[test]
    fn test_ordered_map_keeps_written_order() {
        let map: MappingConfig = serde_yaml::from_str("Zeta: //z\nAlpha: //a\nMid: //m\n").unwrap();
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_apply_row_sets_known_fields() {
        let mut row = MappedRow::new();
        row.insert("Name".into(), FieldValue::Single("Jane".into()));
        row.insert(
            "URLs".into(),
            FieldValue::Multi(vec!["https://a".into(), "https://b".into()]),
        );
        row.insert("Bogus".into(), FieldValue::Single("x".into()));

        let performer: ScrapedPerformer = apply_row(&row);
        assert_eq!(performer.name.as_deref(), Some("Jane"));
        assert_eq!(performer.urls.len(), 2);
    }

    #[test]
    fn test_retain_known_drops_unknown_keys() {
        let mut map: MappingConfig = serde_yaml::from_str("Name: //n\nShoeSize: //s\n").unwrap();
        retain_known::<ScrapedPerformer>(&mut map, "performer");
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["Name"]);
    }

    const PAGE: &str = r#"<html><body>
        <h1>Title</h1>
        <li>a, b</li><li>c</li><li>a, b</li>
        <a href="https://one.example/x">1</a><a href="https://two.example/y">2</a>
        <span class="dob">July 1, 1992 (27 years old)</span>
    </body></html>"#;

    fn page(query_type: QueryType) -> LoadedDocument {
        LoadedDocument::detached("https://site.example/p/1", Document::parse_markup(PAGE), query_type)
    }

    async fn rows(yaml: &str, query_type: QueryType) -> Vec<MappedRow> {
        let map: MappingConfig = serde_yaml::from_str(yaml).unwrap();
        map.process(&page(query_type), &CommonConfig::new(), true).await
    }

    fn single(row: &MappedRow, key: &str) -> Option<String> {
        match row.get(key) {
            Some(FieldValue::Single(v)) => Some(v.clone()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_zero_match_field_is_absent() {
        let rows = rows("Name: //h1\nGender: //h6\n", QueryType::Scrape).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(single(&rows[0], "Name").as_deref(), Some("Title"));
        assert!(!rows[0].contains_key("Gender"));
    }

    #[tokio::test]
    async fn test_matches_fill_rows_and_clean() {
        let scrape = rows("Name: //li\n", QueryType::Scrape).await;
        let names: Vec<_> = scrape.iter().filter_map(|r| single(r, "Name")).collect();
        assert_eq!(names, vec!["a, b", "c"]);

        let search = rows("Name: //li\n", QueryType::Search).await;
        assert_eq!(search.len(), 3);
    }

    #[tokio::test]
    async fn test_split_without_concat_uses_first_match() {
        let rows = rows("Aliases:\n  selector: //li\n  split: \", \"\n", QueryType::Scrape).await;
        let values: Vec<_> = rows.iter().filter_map(|r| single(r, "Aliases")).collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_concat_then_split_cleans() {
        let yaml = "Aliases:\n  selector: //li\n  concat: \", \"\n  split: \", \"\n";
        let rows = rows(yaml, QueryType::Scrape).await;
        let values: Vec<_> = rows.iter().filter_map(|r| single(r, "Aliases")).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_chain_runs_left_to_right() {
        let yaml = r#"
Birthdate:
  selector: //span[@class="dob"]
  postProcess:
    - replace:
        - regex: " \\(.*\\)"
          with: ""
    - parseDate: January 2, 2006
"#;
        let rows = rows(yaml, QueryType::Scrape).await;
        assert_eq!(single(&rows[0], "Birthdate").as_deref(), Some("1992-07-01"));
    }

    #[tokio::test]
    async fn test_fixed_values_and_input_placeholders() {
        let yaml = "Gender:\n  fixed: Female\nURL:\n  fixed: \"{inputURL}\"\nDetails:\n  fixed: \"{inputHostname}\"\n";
        let rows = rows(yaml, QueryType::Scrape).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(single(&rows[0], "Gender").as_deref(), Some("Female"));
        assert_eq!(single(&rows[0], "URL").as_deref(), Some("https://site.example/p/1"));
        assert_eq!(single(&rows[0], "Details").as_deref(), Some("site.example"));
    }

    #[tokio::test]
    async fn test_urls_key_keeps_all_values_in_first_row() {
        let rows = rows("URLs: //a/@href\n", QueryType::Scrape).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get(URLS_KEY),
            Some(&FieldValue::Multi(vec![
                "https://one.example/x".to_string(),
                "https://two.example/y".to_string()
            ]))
        );
    }

    #[test]
    fn test_hostname() {
        assert_eq!(hostname("https://www.example.com:8080/a?b"), "www.example.com");
        assert_eq!(hostname(""), "");
    }
}
