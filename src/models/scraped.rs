//! Scraped fragments.
//!
//! Every fragment carries an optional `stored_id` (set once the fragment is
//! matched to a catalog entity) and an optional `remote_site_id` (its identity
//! on the external source).

use serde::{Deserialize, Serialize};

use super::content::ContentType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapedTag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_site_id: Option<String>,
}

impl ScrapedTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapedStudio {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_site_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapedPerformer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disambiguation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ethnicity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eye_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fake_tits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penis_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circumcised: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub career_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tattoos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piercings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<ScrapedTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hair_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_site_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapedMovie {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studio: Option<ScrapedStudio>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<ScrapedTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_site_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapedScene {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studio: Option<ScrapedStudio>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<ScrapedTag>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub performers: Vec<ScrapedPerformer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub movies: Vec<ScrapedMovie>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_site_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapedGallery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photographer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studio: Option<ScrapedStudio>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<ScrapedTag>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub performers: Vec<ScrapedPerformer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_site_id: Option<String>,
}

/// A scraped record of any content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScrapedContent {
    Performer(ScrapedPerformer),
    Scene(ScrapedScene),
    Gallery(ScrapedGallery),
    Studio(ScrapedStudio),
    Movie(ScrapedMovie),
    Tag(ScrapedTag),
}

impl ScrapedContent {
    /// Content type for the variants that have one.
    pub fn content_type(&self) -> Option<ContentType> {
        match self {
            ScrapedContent::Performer(_) => Some(ContentType::Performer),
            ScrapedContent::Scene(_) => Some(ContentType::Scene),
            ScrapedContent::Gallery(_) => Some(ContentType::Gallery),
            ScrapedContent::Movie(_) => Some(ContentType::Movie),
            ScrapedContent::Studio(_) | ScrapedContent::Tag(_) => None,
        }
    }

    /// Decode a JSON value into the fragment type for `ty`.
    pub fn from_json(ty: ContentType, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match ty {
            ContentType::Performer => ScrapedContent::Performer(serde_json::from_value(value)?),
            ContentType::Scene => ScrapedContent::Scene(serde_json::from_value(value)?),
            ContentType::Gallery => ScrapedContent::Gallery(serde_json::from_value(value)?),
            ContentType::Movie => ScrapedContent::Movie(serde_json::from_value(value)?),
        })
    }

    /// Move every stored id in the tree into `remote_site_id` and clear it.
    ///
    /// Used for records from a remote catalog, whose ids belong to the remote
    /// server's id space.
    pub fn blank_stored_ids(&mut self) {
        match self {
            ScrapedContent::Performer(p) => blank_performer(p),
            ScrapedContent::Scene(s) => {
                blank(&mut s.stored_id, &mut s.remote_site_id);
                s.performers.iter_mut().for_each(blank_performer);
                s.tags.iter_mut().for_each(blank_tag);
                s.movies.iter_mut().for_each(blank_movie);
                if let Some(studio) = s.studio.as_mut() {
                    blank_studio(studio);
                }
            }
            ScrapedContent::Gallery(g) => {
                blank(&mut g.stored_id, &mut g.remote_site_id);
                g.performers.iter_mut().for_each(blank_performer);
                g.tags.iter_mut().for_each(blank_tag);
                if let Some(studio) = g.studio.as_mut() {
                    blank_studio(studio);
                }
            }
            ScrapedContent::Studio(s) => blank_studio(s),
            ScrapedContent::Movie(m) => blank_movie(m),
            ScrapedContent::Tag(t) => blank_tag(t),
        }
    }
}

fn blank(stored: &mut Option<String>, remote: &mut Option<String>) {
    if let Some(id) = stored.take() {
        remote.get_or_insert(id);
    }
}

fn blank_tag(t: &mut ScrapedTag) {
    blank(&mut t.stored_id, &mut t.remote_site_id);
}

fn blank_studio(s: &mut ScrapedStudio) {
    blank(&mut s.stored_id, &mut s.remote_site_id);
}

fn blank_performer(p: &mut ScrapedPerformer) {
    blank(&mut p.stored_id, &mut p.remote_site_id);
    p.tags.iter_mut().for_each(blank_tag);
}

fn blank_movie(m: &mut ScrapedMovie) {
    blank(&mut m.stored_id, &mut m.remote_site_id);
    m.tags.iter_mut().for_each(blank_tag);
    if let Some(studio) = m.studio.as_mut() {
        blank_studio(studio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_stored_ids_clears_nested_references() {
        let mut content = ScrapedContent::Scene(ScrapedScene {
            stored_id: Some("1".to_string()),
            performers: vec![ScrapedPerformer {
                stored_id: Some("7".to_string()),
                tags: vec![ScrapedTag {
                    stored_id: Some("3".to_string()),
                    name: "Blonde".to_string(),
                    remote_site_id: None,
                }],
                ..Default::default()
            }],
            studio: Some(ScrapedStudio {
                stored_id: Some("9".to_string()),
                name: "Studio".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });

        content.blank_stored_ids();

        let ScrapedContent::Scene(scene) = content else {
            panic!("expected scene");
        };
        assert_eq!(scene.stored_id, None);
        assert_eq!(scene.remote_site_id.as_deref(), Some("1"));
        assert_eq!(scene.performers[0].stored_id, None);
        assert_eq!(scene.performers[0].remote_site_id.as_deref(), Some("7"));
        assert_eq!(scene.performers[0].tags[0].stored_id, None);
        assert_eq!(scene.studio.as_ref().unwrap().stored_id, None);
    }

    #[test]
    fn test_blank_keeps_existing_remote_id() {
        let mut tag = ScrapedTag {
            stored_id: Some("3".to_string()),
            name: "x".to_string(),
            remote_site_id: Some("abc".to_string()),
        };
        blank_tag(&mut tag);
        assert_eq!(tag.stored_id, None);
        assert_eq!(tag.remote_site_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_from_json_performer() {
        let value = serde_json::json!({"name": "Mia", "eye_color": "Hazel", "tags": [{"name": "Blonde"}]});
        let content = ScrapedContent::from_json(ContentType::Performer, value).unwrap();
        let ScrapedContent::Performer(p) = content else {
            panic!("expected performer");
        };
        assert_eq!(p.name.as_deref(), Some("Mia"));
        assert_eq!(p.eye_color.as_deref(), Some("Hazel"));
        assert_eq!(p.tags, vec![ScrapedTag::new("Blonde")]);
    }
}
