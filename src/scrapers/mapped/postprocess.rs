//! Post-processing actions applied to extracted values.
//!
//! Actions never fail the scrape. A value that cannot be transformed is
//! passed through unchanged and a warning is logged.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::Local;
use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use super::attribute::AttributeConfig;
use super::dates;
use crate::scrapers::document::LoadedDocument;

const FOOT_IN_CM: f64 = 30.48;
const INCH_IN_CM: f64 = 2.54;
const LB_IN_KG: f64 = 0.45359237;

/// A `{regex, with}` rewrite rule.
#[derive(Debug, Clone)]
pub struct RegexReplace {
    pub pattern: String,
    pub with: String,
    regex: Option<Regex>,
}

impl RegexReplace {
    pub fn new(pattern: &str, with: &str) -> Self {
        let regex = if pattern.is_empty() {
            None
        } else {
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("Error compiling regex '{}': {}", pattern, e);
                    None
                }
            }
        };

        Self {
            pattern: pattern.to_string(),
            with: with.to_string(),
            regex,
        }
    }

    /// Replace every match, then trim surrounding whitespace.
    ///
    /// Empty or invalid patterns leave the value untouched.
    pub fn apply(&self, value: &str) -> String {
        let Some(re) = &self.regex else {
            return value.to_string();
        };
        let replaced = re.replace_all(value, self.with.as_str());
        let out = replaced.trim().to_string();
        tracing::debug!("Replace: '{}' with '{}': '{}' -> '{}'", self.pattern, self.with, value, out);
        out
    }

    pub fn apply_all(rules: &[RegexReplace], value: &str) -> String {
        rules
            .iter()
            .fold(value.to_string(), |acc, rule| rule.apply(&acc))
    }
}

impl<'de> Deserialize<'de> for RegexReplace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            regex: String,
            #[serde(default)]
            with: String,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(RegexReplace::new(&raw.regex, &raw.with))
    }
}

/// One step of an attribute's post-processing chain.
#[derive(Debug, Clone)]
pub enum PostProcessAction {
    Replace(Vec<RegexReplace>),
    /// Parse with a reference-layout format and normalise to `YYYY-MM-DD`.
    ParseDate(String),
    /// Treat the value as a day count and subtract it from today.
    SubtractDays,
    Map(BTreeMap<String, String>),
    FeetToCm,
    LbToKg,
    /// Fetch the value as a URL and extract from the sub-document.
    SubScraper(Box<AttributeConfig>),
}

impl PostProcessAction {
    pub fn name(&self) -> &'static str {
        match self {
            PostProcessAction::Replace(_) => "replace",
            PostProcessAction::ParseDate(_) => "parseDate",
            PostProcessAction::SubtractDays => "subtractDays",
            PostProcessAction::Map(_) => "map",
            PostProcessAction::FeetToCm => "feetToCm",
            PostProcessAction::LbToKg => "lbToKg",
            PostProcessAction::SubScraper(_) => "subScraper",
        }
    }

    pub fn apply<'a>(&'a self, value: String, doc: &'a LoadedDocument) -> BoxFuture<'a, String> {
        Box::pin(async move {
            match self {
                PostProcessAction::Replace(rules) => RegexReplace::apply_all(rules, &value),
                PostProcessAction::ParseDate(format) => {
                    dates::parse_date(format, &value, Local::now().date_naive())
                }
                PostProcessAction::SubtractDays => {
                    dates::subtract_days(&value, Local::now().date_naive())
                }
                PostProcessAction::Map(table) => table.get(&value).cloned().unwrap_or(value),
                PostProcessAction::FeetToCm => feet_to_cm(&value),
                PostProcessAction::LbToKg => lb_to_kg(&value),
                PostProcessAction::SubScraper(sub) => sub_scrape(sub, &value, doc).await,
            }
        })
    }
}

/// Run the attribute's actions as a left-to-right fold.
pub fn apply_chain<'a>(
    attr: &'a AttributeConfig,
    value: String,
    doc: &'a LoadedDocument,
) -> BoxFuture<'a, String> {
    Box::pin(async move {
        let mut value = value;
        for action in &attr.actions {
            value = action.apply(value, doc).await;
        }
        value
    })
}

async fn sub_scrape(attr: &AttributeConfig, value: &str, doc: &LoadedDocument) -> String {
    tracing::debug!("Sub-scraping for: {}", value);
    let Some(sub) = doc.sub_document(value).await else {
        return String::new();
    };

    let found = sub.query(&attr.selector);
    if found.is_empty() {
        return String::new();
    }

    let first = if attr.concat.is_some() {
        attr.concatenate(&found)
    } else {
        found[0].clone()
    };

    apply_chain(attr, first, &sub).await
}

/// Convert a feet/inches string such as `5'7"` to whole centimetres.
pub fn feet_to_cm(value: &str) -> String {
    let numbers: Vec<f64> = NUMBERS
        .find_iter(value)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let feet = numbers.first().copied().unwrap_or(0.0);
    let inches = numbers.get(1).copied().unwrap_or(0.0);
    ((feet * FOOT_IN_CM + inches * INCH_IN_CM).round() as i64).to_string()
}

/// Convert pounds to whole kilograms. Non-numeric values pass through.
pub fn lb_to_kg(value: &str) -> String {
    match value.trim().parse::<f64>() {
        Ok(w) => ((w * LB_IN_KG).round() as i64).to_string(),
        Err(_) => value.to_string(),
    }
}

static NUMBERS: LazyLock<Regex> = LazyLock::new(|| Regex::new("[0-9]+").unwrap());
