use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SyndccError {
    #[error("invalid Synapse id: {0}")]
    InvalidSynapseId(String),

    #[error("invalid PubMed id: {0}")]
    InvalidPubmedId(String),

    #[error("invalid permission: {0}")]
    InvalidPermission(String),

    #[error("unknown consortium id: {0}")]
    #[diagnostic(help("known consortium ids are configured under `templates` (defaults: U54, U01)"))]
    UnknownConsortium(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing Synapse credentials")]
    #[diagnostic(help(
        "set SYNAPSE_AUTH_TOKEN or add `authtoken` under [authentication] in ~/.synapseConfig"
    ))]
    MissingCredentials,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("Synapse request failed: {0}")]
    SynapseHttp(String),

    #[error("Synapse returned status {status}: {message}")]
    SynapseStatus { status: u16, message: String },

    #[error("Synapse table job {token} did not finish after {attempts} polls")]
    SynapseJobTimeout { token: String, attempts: usize },

    #[error("Entrez request failed: {0}")]
    EntrezHttp(String),

    #[error("Entrez returned status {status}: {message}")]
    EntrezStatus { status: u16, message: String },

    #[error("page request failed: {0}")]
    PageHttp(String),

    #[error("page {url} returned status {status}")]
    PageStatus { url: String, status: u16 },

    #[error("PubMed page for {pmid} has no {section}")]
    MissingPageSection { pmid: String, section: String },

    #[error("column not found: {0}")]
    MissingColumn(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
