//! Fragment input for scrape-by-fragment requests.

use serde::{Deserialize, Serialize};

use super::content::ContentType;
use super::scraped::{ScrapedGallery, ScrapedPerformer, ScrapedScene};
use crate::error::{Result, ScrapeError};

/// A partially known record used to seed a scrape.
///
/// Exactly one of the fragments must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Input {
    pub performer: Option<ScrapedPerformer>,
    pub scene: Option<ScrapedScene>,
    pub gallery: Option<ScrapedGallery>,
}

impl Input {
    pub fn performer(p: ScrapedPerformer) -> Self {
        Self {
            performer: Some(p),
            ..Default::default()
        }
    }

    pub fn scene(s: ScrapedScene) -> Self {
        Self {
            scene: Some(s),
            ..Default::default()
        }
    }

    pub fn gallery(g: ScrapedGallery) -> Self {
        Self {
            gallery: Some(g),
            ..Default::default()
        }
    }

    /// Build an input from a JSON fragment of the given type.
    pub fn from_json(ty: ContentType, value: serde_json::Value) -> Result<Self> {
        let decode_err = |e: serde_json::Error| ScrapeError::InvalidInput(e.to_string());
        match ty {
            ContentType::Performer => Ok(Self::performer(
                serde_json::from_value(value).map_err(decode_err)?,
            )),
            ContentType::Scene => Ok(Self::scene(
                serde_json::from_value(value).map_err(decode_err)?,
            )),
            ContentType::Gallery => Ok(Self::gallery(
                serde_json::from_value(value).map_err(decode_err)?,
            )),
            ContentType::Movie => Err(ScrapeError::InvalidInput(
                "movie fragments are not accepted as scrape input".to_string(),
            )),
        }
    }

    /// The content type of the single fragment, or `InvalidInput`.
    pub fn validate(&self) -> Result<ContentType> {
        let set = [
            self.performer.is_some(),
            self.scene.is_some(),
            self.gallery.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();

        if set != 1 {
            return Err(ScrapeError::InvalidInput(format!(
                "exactly one of performer, scene or gallery must be set, found {}",
                set
            )));
        }

        Ok(if self.performer.is_some() {
            ContentType::Performer
        } else if self.scene.is_some() {
            ContentType::Scene
        } else {
            ContentType::Gallery
        })
    }

    /// Fill a missing `url` from the first entry of `urls`.
    pub fn populate_url(&mut self) {
        fn fill(url: &mut Option<String>, urls: &[String]) {
            if url.as_deref().map_or(true, str::is_empty) {
                if let Some(first) = urls.first() {
                    *url = Some(first.clone());
                }
            }
        }

        if let Some(p) = self.performer.as_mut() {
            fill(&mut p.url, &p.urls);
        }
        if let Some(s) = self.scene.as_mut() {
            fill(&mut s.url, &s.urls);
        }
        if let Some(g) = self.gallery.as_mut() {
            fill(&mut g.url, &g.urls);
        }
    }

    /// The fragment's URL, if non-empty.
    pub fn url(&self) -> Option<&str> {
        let url = if let Some(p) = &self.performer {
            p.url.as_deref()
        } else if let Some(s) = &self.scene {
            s.url.as_deref()
        } else if let Some(g) = &self.gallery {
            g.url.as_deref()
        } else {
            None
        };
        url.filter(|u| !u.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_exactly_one() {
        assert!(matches!(
            Input::default().validate(),
            Err(ScrapeError::InvalidInput(_))
        ));

        let both = Input {
            performer: Some(ScrapedPerformer::default()),
            scene: Some(ScrapedScene::default()),
            gallery: None,
        };
        assert!(matches!(both.validate(), Err(ScrapeError::InvalidInput(_))));

        let scene = Input::scene(ScrapedScene::default());
        assert_eq!(scene.validate().unwrap(), ContentType::Scene);
    }

    #[test]
    fn test_populate_url_from_urls() {
        let mut input = Input::scene(ScrapedScene {
            urls: vec!["https://a.example/1".to_string(), "https://b.example".to_string()],
            ..Default::default()
        });
        input.populate_url();
        assert_eq!(input.url(), Some("https://a.example/1"));
    }

    #[test]
    fn test_populate_url_keeps_existing() {
        let mut input = Input::gallery(ScrapedGallery {
            url: Some("https://keep.example".to_string()),
            urls: vec!["https://other.example".to_string()],
            ..Default::default()
        });
        input.populate_url();
        assert_eq!(input.url(), Some("https://keep.example"));
    }

    #[test]
    fn test_from_json_rejects_movie() {
        let err = Input::from_json(ContentType::Movie, serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidInput(_)));
    }
}
