//! Attribute configuration decoding.
//!
//! An attribute is either a bare selector string or an object. Post-process
//! actions are normalised into one ordered list at load time, from either the
//! `postProcess` list or the legacy `replace`/`subScraper`/`parseDate` keys.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use super::postprocess::{PostProcessAction, RegexReplace};

/// How one output field is extracted.
#[derive(Debug, Clone, Default)]
pub struct AttributeConfig {
    pub selector: String,
    /// Literal value used instead of a selector.
    pub fixed: Option<String>,
    /// Join all matches with this separator before post-processing.
    pub concat: Option<String>,
    /// Split the post-processed value on this separator.
    pub split: Option<String>,
    pub actions: Vec<PostProcessAction>,
}

impl AttributeConfig {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            ..Default::default()
        }
    }

    pub fn fixed(value: impl Into<String>) -> Self {
        Self {
            fixed: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn with_actions(mut self, actions: Vec<PostProcessAction>) -> Self {
        self.actions = actions;
        self
    }

    pub fn concatenate(&self, found: &[String]) -> String {
        found.join(self.concat.as_deref().unwrap_or_default())
    }

    /// Split on the configured separator, dropping empty pieces.
    pub fn split_value(&self, value: &str) -> Vec<String> {
        match self.split.as_deref() {
            None | Some("") => vec![value.to_string()],
            Some(sep) => value
                .split(sep)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Remove duplicates (keeping the first occurrence) and empty strings.
    pub fn clean(values: Vec<String>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        values
            .into_iter()
            .filter(|v| !v.is_empty() && seen.insert(v.clone()))
            .collect()
    }
}

/// One `postProcess` list entry as written.
#[derive(Debug, Default, Deserialize)]
struct RawAction {
    #[serde(default, rename = "parseDate")]
    parse_date: Option<String>,
    #[serde(default, rename = "subtractDays")]
    subtract_days: bool,
    #[serde(default)]
    replace: Vec<RegexReplace>,
    #[serde(default, rename = "subScraper")]
    sub_scraper: Option<AttributeConfig>,
    #[serde(default)]
    map: Option<BTreeMap<String, String>>,
    #[serde(default, rename = "feetToCm")]
    feet_to_cm: bool,
    #[serde(default, rename = "lbToKg")]
    lb_to_kg: bool,
    #[serde(default)]
    javascript: Option<String>,
}

impl RawAction {
    fn into_action(self) -> Result<PostProcessAction, String> {
        let mut found: Option<&'static str> = None;
        let mut action = None;
        let mut take = |name: &'static str, a: PostProcessAction| -> Result<(), String> {
            if let Some(prev) = found {
                return Err(format!(
                    "post-process actions must have a single field, found {} and {}",
                    prev, name
                ));
            }
            found = Some(name);
            action = Some(a);
            Ok(())
        };

        if let Some(fmt) = self.parse_date.filter(|s| !s.is_empty()) {
            take("parseDate", PostProcessAction::ParseDate(fmt))?;
        }
        if !self.replace.is_empty() {
            take("replace", PostProcessAction::Replace(self.replace))?;
        }
        if let Some(sub) = self.sub_scraper {
            take("subScraper", PostProcessAction::SubScraper(Box::new(sub)))?;
        }
        if let Some(map) = self.map {
            take("map", PostProcessAction::Map(map))?;
        }
        if self.feet_to_cm {
            take("feetToCm", PostProcessAction::FeetToCm)?;
        }
        if self.lb_to_kg {
            take("lbToKg", PostProcessAction::LbToKg)?;
        }
        if self.subtract_days {
            take("subtractDays", PostProcessAction::SubtractDays)?;
        }
        if self.javascript.is_some() {
            return Err("javascript post-process actions are not supported".to_string());
        }

        action.ok_or_else(|| "invalid post-process action".to_string())
    }
}

/// Attribute object form as written.
#[derive(Debug, Default, Deserialize)]
struct RawAttribute {
    #[serde(default)]
    selector: String,
    #[serde(default)]
    fixed: String,
    #[serde(default, rename = "postProcess")]
    post_process: Vec<RawAction>,
    #[serde(default)]
    concat: String,
    #[serde(default)]
    split: String,
    #[serde(default, rename = "parseDate")]
    parse_date: String,
    #[serde(default)]
    replace: Vec<RegexReplace>,
    #[serde(default, rename = "subScraper")]
    sub_scraper: Option<AttributeConfig>,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl TryFrom<RawAttribute> for AttributeConfig {
    type Error = String;

    fn try_from(raw: RawAttribute) -> Result<Self, Self::Error> {
        let mut actions = Vec::new();

        if !raw.post_process.is_empty() {
            if !raw.parse_date.is_empty() || !raw.replace.is_empty() || raw.sub_scraper.is_some() {
                return Err(
                    "cannot include postProcess and (parseDate, replace, subScraper) deprecated fields"
                        .to_string(),
                );
            }
            for a in raw.post_process {
                actions.push(a.into_action()?);
            }
        } else {
            if !raw.replace.is_empty() {
                actions.push(PostProcessAction::Replace(raw.replace));
            }
            if let Some(sub) = raw.sub_scraper {
                actions.push(PostProcessAction::SubScraper(Box::new(sub)));
            }
            if !raw.parse_date.is_empty() {
                actions.push(PostProcessAction::ParseDate(raw.parse_date));
            }
        }

        Ok(AttributeConfig {
            selector: raw.selector,
            fixed: non_empty(raw.fixed),
            concat: non_empty(raw.concat),
            split: non_empty(raw.split),
            actions,
        })
    }
}

impl<'de> Deserialize<'de> for AttributeConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AttributeVisitor;

        impl<'de> Visitor<'de> for AttributeVisitor {
            type Value = AttributeConfig;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a selector string or an attribute object")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(AttributeConfig::selector(v))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                let raw = RawAttribute::deserialize(de::value::MapAccessDeserializer::new(map))?;
                AttributeConfig::try_from(raw).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(AttributeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<AttributeConfig, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn test_bare_string_is_selector() {
        let attr = parse("//h1").unwrap();
        assert_eq!(attr.selector, "//h1");
        assert!(attr.actions.is_empty());
        assert!(attr.fixed.is_none());
    }

    #[test]
    fn test_post_process_list_preserves_order() {
        let attr = parse(
            r#"
selector: //span
postProcess:
  - replace:
      - regex: a
        with: b
  - parseDate: January 2, 2006
  - map:
      x: y
  - feetToCm: true
"#,
        )
        .unwrap();
        let kinds: Vec<&str> = attr.actions.iter().map(|a| a.name()).collect();
        assert_eq!(kinds, vec!["replace", "parseDate", "map", "feetToCm"]);
    }

    #[test]
    fn test_legacy_fields_converted_in_fixed_order() {
        let attr = parse(
            r#"
selector: //a
parseDate: "2006"
subScraper: //b
replace:
  - regex: x
    with: y
"#,
        )
        .unwrap();
        let kinds: Vec<&str> = attr.actions.iter().map(|a| a.name()).collect();
        assert_eq!(kinds, vec!["replace", "subScraper", "parseDate"]);
    }

    #[test]
    fn test_mixed_legacy_and_post_process_rejected() {
        let err = parse(
            r#"
selector: //a
replace:
  - regex: x
    with: y
postProcess:
  - parseDate: "2006"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot include postProcess"));
    }

    #[test]
    fn test_action_with_two_fields_rejected() {
        let err = parse(
            r#"
selector: //a
postProcess:
  - parseDate: "2006"
    feetToCm: true
"#,
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("must have a single field, found parseDate and feetToCm"));
    }

    #[test]
    fn test_empty_action_rejected() {
        let err = parse("selector: //a\npostProcess:\n  - feetToCm: false\n").unwrap_err();
        assert!(err.to_string().contains("invalid post-process action"));
    }

    #[test]
    fn test_split_and_clean() {
        let attr = AttributeConfig {
            split: Some(",".to_string()),
            ..Default::default()
        };
        assert_eq!(attr.split_value("a,,b,"), vec!["a", "b"]);
        assert_eq!(
            AttributeConfig::clean(vec![
                "a".to_string(),
                "".to_string(),
                "b".to_string(),
                "a".to_string()
            ]),
            vec!["a", "b"]
        );
    }
}
