//! metascrape - declarative metadata scraper engine.
//!
//! Extracts performer, scene, gallery and movie metadata from configured
//! websites, remote catalogs and helper scripts, and reconciles the results
//! against a local catalog.

pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod scrapers;

pub use config::Config;
pub use error::{Result, ScrapeError};
pub use scrapers::{ScrapeContext, ScraperRegistry};
