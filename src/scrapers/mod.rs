//! The scraper engine: definitions, fetching, mapping and dispatch.

pub mod adapters;
pub mod browser;
pub mod context;
pub mod definition;
pub mod document;
pub mod http_client;
pub mod image;
pub mod mapped;
pub mod registry;
pub mod resolver;
pub mod url;

pub use context::{cancel_pair, CancelHandle, CancelToken, ScrapeContext};
pub use definition::{DefinitionSummary, ScraperDefinition};
pub use http_client::HttpClient;
pub use registry::{LoadReport, ScraperRegistry};
