//! Built-in Freeones performer scraper, shipped as an embedded XPath
//! definition.

use crate::error::Result;
use crate::scrapers::definition::ScraperDefinition;

pub const FREEONES_ID: &str = "builtin_freeones";

const FREEONES_YAML: &str = include_str!("freeones.yml");

pub fn freeones_definition() -> Result<ScraperDefinition> {
    ScraperDefinition::from_yaml(FREEONES_ID, FREEONES_YAML, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScrapeType;

    #[test]
    fn test_preset_loads() {
        let def = freeones_definition().unwrap();
        assert_eq!(def.id, FREEONES_ID);
        assert_eq!(def.name, "Freeones");

        let performer = def.performer.as_ref().unwrap();
        assert_eq!(performer.supported_scrapes(), vec![ScrapeType::Name, ScrapeType::Url]);
        assert!(performer.url_action("https://www.freeones.com/jane-doe/feed").is_some());
        assert!(def.scene.is_none());
    }
}
