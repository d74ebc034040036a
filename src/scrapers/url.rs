//! Query URL construction from `{placeholder}` templates.

use std::collections::BTreeMap;
use std::path::Path;

use crate::catalog::{StoredGallery, StoredScene};
use crate::models::ScrapedScene;
use crate::scrapers::definition::QueryUrlReplacements;
use crate::scrapers::mapped::RegexReplace;

/// Named values substituted into a query URL template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryUrlParameters(BTreeMap<String, String>);

fn file_name(path: Option<&str>) -> String {
    path.and_then(|p| Path::new(p).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl QueryUrlParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn set_opt(&mut self, key: &str, value: Option<&String>) {
        self.set(key, value.cloned().unwrap_or_default());
    }

    pub fn from_stored_scene(scene: &StoredScene) -> Self {
        let mut params = Self::new();
        params.set_opt("checksum", scene.checksum.as_ref());
        params.set_opt("oshash", scene.oshash.as_ref());
        params.set("filename", file_name(scene.path.as_deref()));
        params.set_opt("title", scene.title.as_ref());
        params.set_opt("url", scene.url.as_ref().or(scene.urls.first()));
        params
    }

    pub fn from_scene_fragment(scene: &ScrapedScene) -> Self {
        let mut params = Self::new();
        params.set_opt("title", scene.title.as_ref());
        params.set_opt("code", scene.code.as_ref());
        params.set_opt("details", scene.details.as_ref());
        params.set_opt("remote_site_id", scene.remote_site_id.as_ref());
        params.set_opt("url", scene.url.as_ref().or(scene.urls.first()));
        params.set_opt("date", scene.date.as_ref());
        params
    }

    pub fn from_stored_gallery(gallery: &StoredGallery) -> Self {
        let mut params = Self::new();
        params.set_opt("checksum", gallery.checksum.as_ref());
        params.set("filename", file_name(gallery.path.as_deref()));
        params.set_opt("title", gallery.title.as_ref());
        params.set_opt("url", gallery.url.as_ref().or(gallery.urls.first()));
        params
    }

    pub fn from_url(url: &str) -> Self {
        let mut params = Self::new();
        params.set("url", url);
        params
    }

    /// Rewrite each parameter that has rules through its regex chain.
    pub fn apply_replacements(&mut self, replacements: &QueryUrlReplacements) {
        for (key, value) in self.0.iter_mut() {
            if let Some(rules) = replacements.get(key) {
                *value = RegexReplace::apply_all(rules, value);
            }
        }
    }

    /// Substitute `{name}` for every known parameter. Unknown placeholders
    /// stay as written.
    pub fn construct_url(&self, template: &str) -> String {
        self.0.iter().fold(template.to_string(), |url, (key, value)| {
            url.replace(&format!("{{{}}}", key), value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_url_keeps_unknown_placeholders() {
        let mut params = QueryUrlParameters::new();
        params.set("title", "Some Title");
        assert_eq!(
            params.construct_url("https://x.example/{title}/{studio}"),
            "https://x.example/Some Title/{studio}"
        );
    }

    #[test]
    fn test_stored_scene_parameters() {
        let scene = StoredScene {
            id: "1".to_string(),
            path: Some("/media/scenes/abc.1080p.mp4".to_string()),
            checksum: Some("d41d8cd9".to_string()),
            urls: vec!["https://a.example/scene".to_string()],
            ..Default::default()
        };
        let params = QueryUrlParameters::from_stored_scene(&scene);
        assert_eq!(params.get("filename"), Some("abc.1080p.mp4"));
        assert_eq!(params.get("url"), Some("https://a.example/scene"));
        assert_eq!(params.get("title"), Some(""));
    }

    #[test]
    fn test_apply_replacements() {
        let mut params = QueryUrlParameters::new();
        params.set("filename", "abc.1080p.mp4");
        params.set("title", "untouched");

        let mut replacements = QueryUrlReplacements::new();
        replacements.insert(
            "filename".to_string(),
            vec![RegexReplace::new(r"\..*$", ""), RegexReplace::new("^", "id-")],
        );
        params.apply_replacements(&replacements);

        assert_eq!(params.get("filename"), Some("id-abc"));
        assert_eq!(
            params.construct_url("https://s.example/search?q={filename}&t={title}"),
            "https://s.example/search?q=id-abc&t=untouched"
        );
    }
}
