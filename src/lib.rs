pub mod app;
pub mod citation;
pub mod config;
pub mod domain;
pub mod entrez;
pub mod error;
pub mod frame;
pub mod output;
pub mod project;
pub mod publications;
pub mod reports;
pub mod scrape;
pub mod store;
pub mod synapse;
