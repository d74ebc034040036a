//! Content type and scrape strategy enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of content a scraper can produce.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Performer,
    Scene,
    Gallery,
    Movie,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Performer,
        ContentType::Scene,
        ContentType::Gallery,
        ContentType::Movie,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Performer => "performer",
            ContentType::Scene => "scene",
            ContentType::Gallery => "gallery",
            ContentType::Movie => "movie",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy a definition supports for a content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeType {
    Name,
    Fragment,
    Url,
}
