//! Typed scrapes over a mapping block.

use serde::Deserialize;

use super::{apply_row, retain_known, CommonConfig, MappedRow, MappingConfig};
use crate::models::{
    MappedFields, ScrapedGallery, ScrapedMovie, ScrapedPerformer, ScrapedScene, ScrapedStudio,
    ScrapedTag,
};
use crate::scrapers::document::LoadedDocument;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerformerMapping {
    #[serde(default, rename = "Tags")]
    pub tags: Option<MappingConfig>,
    #[serde(flatten)]
    pub fields: MappingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneMapping {
    #[serde(default, rename = "Tags")]
    pub tags: Option<MappingConfig>,
    #[serde(default, rename = "Performers")]
    pub performers: Option<PerformerMapping>,
    #[serde(default, rename = "Studio")]
    pub studio: Option<MappingConfig>,
    #[serde(default, rename = "Movies", alias = "Groups")]
    pub movies: Option<MappingConfig>,
    #[serde(flatten)]
    pub fields: MappingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GalleryMapping {
    #[serde(default, rename = "Tags")]
    pub tags: Option<MappingConfig>,
    #[serde(default, rename = "Performers")]
    pub performers: Option<MappingConfig>,
    #[serde(default, rename = "Studio")]
    pub studio: Option<MappingConfig>,
    #[serde(flatten)]
    pub fields: MappingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovieMapping {
    #[serde(default, rename = "Studio")]
    pub studio: Option<MappingConfig>,
    #[serde(default, rename = "Tags")]
    pub tags: Option<MappingConfig>,
    #[serde(flatten)]
    pub fields: MappingConfig,
}

/// A named mapping block (`xPathScrapers.<name>` or `jsonScrapers.<name>`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappedScraper {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub performer: Option<PerformerMapping>,
    #[serde(default)]
    pub scene: Option<SceneMapping>,
    #[serde(default)]
    pub gallery: Option<GalleryMapping>,
    #[serde(default, alias = "group")]
    pub movie: Option<MovieMapping>,
}

fn retain_nested<T: MappedFields>(config: &mut Option<MappingConfig>, block: &str) {
    if let Some(config) = config.as_mut() {
        retain_known::<T>(config, block);
    }
}

fn rows_into<T: MappedFields>(rows: &[MappedRow]) -> Vec<T> {
    rows.iter().map(apply_row::<T>).collect()
}

impl MappedScraper {
    /// Drop output keys the target fragment types do not have.
    pub fn validate(&mut self, block: &str) {
        if let Some(p) = self.performer.as_mut() {
            retain_known::<ScrapedPerformer>(&mut p.fields, &format!("{}.performer", block));
            retain_nested::<ScrapedTag>(&mut p.tags, &format!("{}.performer.Tags", block));
        }
        if let Some(s) = self.scene.as_mut() {
            retain_known::<ScrapedScene>(&mut s.fields, &format!("{}.scene", block));
            retain_nested::<ScrapedTag>(&mut s.tags, &format!("{}.scene.Tags", block));
            retain_nested::<ScrapedStudio>(&mut s.studio, &format!("{}.scene.Studio", block));
            retain_nested::<ScrapedMovie>(&mut s.movies, &format!("{}.scene.Movies", block));
            if let Some(p) = s.performers.as_mut() {
                retain_known::<ScrapedPerformer>(&mut p.fields, &format!("{}.scene.Performers", block));
                retain_nested::<ScrapedTag>(&mut p.tags, &format!("{}.scene.Performers.Tags", block));
            }
        }
        if let Some(g) = self.gallery.as_mut() {
            retain_known::<ScrapedGallery>(&mut g.fields, &format!("{}.gallery", block));
            retain_nested::<ScrapedTag>(&mut g.tags, &format!("{}.gallery.Tags", block));
            retain_nested::<ScrapedPerformer>(&mut g.performers, &format!("{}.gallery.Performers", block));
            retain_nested::<ScrapedStudio>(&mut g.studio, &format!("{}.gallery.Studio", block));
        }
        if let Some(m) = self.movie.as_mut() {
            retain_known::<ScrapedMovie>(&mut m.fields, &format!("{}.movie", block));
            retain_nested::<ScrapedStudio>(&mut m.studio, &format!("{}.movie.Studio", block));
            retain_nested::<ScrapedTag>(&mut m.tags, &format!("{}.movie.Tags", block));
        }
    }

    async fn process_nested<T: MappedFields>(
        &self,
        config: Option<&MappingConfig>,
        doc: &LoadedDocument,
    ) -> Vec<T> {
        match config {
            Some(config) => rows_into(&config.process(doc, &self.common, false).await),
            None => Vec::new(),
        }
    }

    pub async fn scrape_performer(&self, doc: &LoadedDocument) -> Option<ScrapedPerformer> {
        let mapping = self.performer.as_ref()?;

        let rows = mapping.fields.process(doc, &self.common, true).await;
        let tags: Vec<ScrapedTag> = self.process_nested(mapping.tags.as_ref(), doc).await;

        if rows.is_empty() && tags.is_empty() {
            return None;
        }

        let mut performer: ScrapedPerformer = rows.first().map(apply_row).unwrap_or_default();
        performer.tags = tags;
        Some(performer)
    }

    /// One performer per row of a search results page.
    pub async fn scrape_performers(&self, doc: &LoadedDocument) -> Vec<ScrapedPerformer> {
        let Some(mapping) = self.performer.as_ref() else {
            return Vec::new();
        };
        rows_into(&mapping.fields.process(doc, &self.common, false).await)
    }

    async fn scene_performers(&self, mapping: &PerformerMapping, doc: &LoadedDocument) -> Vec<ScrapedPerformer> {
        tracing::debug!("Processing scene performers");
        let rows = mapping.fields.process(doc, &self.common, false).await;
        if rows.is_empty() {
            return Vec::new();
        }

        let tags: Vec<ScrapedTag> = self.process_nested(mapping.tags.as_ref(), doc).await;
        rows.iter()
            .map(|row| {
                let mut performer: ScrapedPerformer = apply_row(row);
                performer.tags = tags.clone();
                performer
            })
            .collect()
    }

    /// Attach performers, tags, studio and movies. Returns whether any were found.
    async fn scene_relationships(
        &self,
        mapping: &SceneMapping,
        doc: &LoadedDocument,
        index: usize,
        scene: &mut ScrapedScene,
    ) -> bool {
        if let Some(performers) = mapping.performers.as_ref() {
            scene.performers = self.scene_performers(performers, doc).await;
        }

        scene.tags = self.process_nested(mapping.tags.as_ref(), doc).await;

        if let Some(studio) = mapping.studio.as_ref() {
            let rows = studio.process(doc, &self.common, false).await;
            scene.studio = rows.get(index).map(apply_row::<ScrapedStudio>);
        }

        scene.movies = self.process_nested(mapping.movies.as_ref(), doc).await;

        !scene.performers.is_empty()
            || !scene.tags.is_empty()
            || scene.studio.is_some()
            || !scene.movies.is_empty()
    }

    pub async fn scrape_scene(&self, doc: &LoadedDocument) -> Option<ScrapedScene> {
        let mapping = self.scene.as_ref()?;

        let rows = mapping.fields.process(doc, &self.common, true).await;
        let mut scene: ScrapedScene = rows.first().map(apply_row).unwrap_or_default();
        let related = self.scene_relationships(mapping, doc, 0, &mut scene).await;

        if rows.is_empty() && !related {
            return None;
        }
        Some(scene)
    }

    /// One scene per row of a search results page, with the studio row of the same index.
    pub async fn scrape_scenes(&self, doc: &LoadedDocument) -> Vec<ScrapedScene> {
        let Some(mapping) = self.scene.as_ref() else {
            return Vec::new();
        };

        let rows = mapping.fields.process(doc, &self.common, false).await;
        let mut scenes = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let mut scene: ScrapedScene = apply_row(row);
            self.scene_relationships(mapping, doc, i, &mut scene).await;
            scenes.push(scene);
        }
        scenes
    }

    pub async fn scrape_gallery(&self, doc: &LoadedDocument) -> Option<ScrapedGallery> {
        let mapping = self.gallery.as_ref()?;

        let rows = mapping.fields.process(doc, &self.common, true).await;
        let performers: Vec<ScrapedPerformer> =
            self.process_nested(mapping.performers.as_ref(), doc).await;
        let tags: Vec<ScrapedTag> = self.process_nested(mapping.tags.as_ref(), doc).await;
        let studio = self
            .process_nested::<ScrapedStudio>(mapping.studio.as_ref(), doc)
            .await
            .into_iter()
            .next();

        if rows.is_empty() && performers.is_empty() && tags.is_empty() && studio.is_none() {
            return None;
        }

        let mut gallery: ScrapedGallery = rows.first().map(apply_row).unwrap_or_default();
        gallery.performers = performers;
        gallery.tags = tags;
        gallery.studio = studio;
        Some(gallery)
    }

    pub async fn scrape_movie(&self, doc: &LoadedDocument) -> Option<ScrapedMovie> {
        let mapping = self.movie.as_ref()?;

        let rows = mapping.fields.process(doc, &self.common, true).await;
        let studio = self
            .process_nested::<ScrapedStudio>(mapping.studio.as_ref(), doc)
            .await
            .into_iter()
            .next();
        let tags: Vec<ScrapedTag> = self.process_nested(mapping.tags.as_ref(), doc).await;

        if rows.is_empty() && studio.is_none() && tags.is_empty() {
            return None;
        }

        let mut movie: ScrapedMovie = rows.first().map(apply_row).unwrap_or_default();
        movie.studio = studio;
        movie.tags = tags;
        Some(movie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_mapping_separates_nested_blocks() {
        let yaml = r#"
common:
  $root: //div[@class="scene"]
scene:
  Title: $root/h1
  Details:
    selector: $root/p
    concat: " "
  Tags:
    Name: //a[@class="tag"]
  Performers:
    Name: //a[@class="performer"]
    Tags:
      Name: //span[@class="ptag"]
  Studio:
    Name: //a[@class="studio"]
  Groups:
    Name: //a[@class="group"]
"#;
        let scraper: MappedScraper = serde_yaml::from_str(yaml).unwrap();
        let scene = scraper.scene.as_ref().unwrap();

        let fields: Vec<&str> = scene.fields.keys().collect();
        assert_eq!(fields, vec!["Title", "Details"]);
        assert!(scene.tags.is_some());
        assert!(scene.studio.is_some());
        assert!(scene.movies.is_some());
        let performers = scene.performers.as_ref().unwrap();
        assert!(performers.tags.is_some());
        assert_eq!(scraper.common.get("$root").map(String::as_str), Some(r#"//div[@class="scene"]"#));
    }

    #[test]
    fn test_group_alias_for_movie() {
        let scraper: MappedScraper = serde_yaml::from_str("group:\n  Name: //h1\n").unwrap();
        assert!(scraper.movie.is_some());
    }

    #[test]
    fn test_validate_drops_unknown_keys() {
        let mut scraper: MappedScraper =
            serde_yaml::from_str("performer:\n  Name: //h1\n  Favourite: //p\n").unwrap();
        scraper.validate("test");
        let keys: Vec<&str> = scraper.performer.as_ref().unwrap().fields.keys().collect();
        assert_eq!(keys, vec!["Name"]);
    }
}
