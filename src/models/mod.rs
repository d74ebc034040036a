//! Data models for scraped content and scrape requests.

mod content;
pub mod fields;
mod input;
mod scraped;

pub use content::{ContentType, ScrapeType};
pub use fields::{FieldValue, MappedFields};
pub use input::Input;
pub use scraped::{
    ScrapedContent, ScrapedGallery, ScrapedMovie, ScrapedPerformer, ScrapedScene, ScrapedStudio,
    ScrapedTag,
};
