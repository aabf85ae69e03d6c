use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::config::EntrezSettings;
use crate::domain::PubmedId;
use crate::error::SyndccError;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Boolean operator joining grant numbers in a PubMed query.
pub const OR_DELIMITER: &str = " OR ";

/// Upper bound on ids per search. Larger result sets are truncated.
pub const MAX_RESULTS: u32 = 1_000_000;

/// Joins grant numbers into one PubMed query. Entries are not validated.
pub fn build_grant_query<S: AsRef<str>>(grants: &[S]) -> String {
    grants
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(OR_DELIMITER)
}

pub trait EntrezClient: Send + Sync {
    fn search_pubmed(&self, query: &str) -> Result<Vec<PubmedId>, SyndccError>;
}

#[derive(Clone)]
pub struct EntrezHttpClient {
    client: Client,
    base_url: String,
    settings: EntrezSettings,
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

impl EntrezHttpClient {
    pub fn new(settings: EntrezSettings) -> Result<Self, SyndccError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("syndccutils/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyndccError::EntrezHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SyndccError::EntrezHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: EUTILS_BASE.to_string(),
            settings,
        })
    }

    fn search_params<'a>(&'a self, query: &'a str, retmax: &'a str) -> Vec<(&'a str, &'a str)> {
        let mut params = vec![
            ("db", "pubmed"),
            ("sort", "relevance"),
            ("retmax", retmax),
            ("retmode", "json"),
            ("term", query),
            ("tool", self.settings.tool.as_str()),
        ];
        if let Some(email) = &self.settings.email {
            params.push(("email", email.as_str()));
        }
        if let Some(api_key) = &self.settings.api_key {
            params.push(("api_key", api_key.as_str()));
        }
        params
    }
}

impl EntrezClient for EntrezHttpClient {
    fn search_pubmed(&self, query: &str) -> Result<Vec<PubmedId>, SyndccError> {
        let retmax = MAX_RESULTS.to_string();
        let url = format!("{}/esearch.fcgi", self.base_url);
        // POST keeps long OR-queries out of the URL length limit.
        let response = self
            .client
            .post(&url)
            .form(&self.search_params(query, &retmax))
            .send()
            .map_err(|err| SyndccError::EntrezHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Entrez request failed".to_string());
            return Err(SyndccError::EntrezStatus { status, message });
        }
        let payload: ESearchResponse = response
            .json()
            .map_err(|err| SyndccError::EntrezHttp(err.to_string()))?;
        tracing::debug!(count = payload.esearchresult.idlist.len(), "esearch returned ids");
        payload
            .esearchresult
            .idlist
            .iter()
            .map(|id| id.parse())
            .collect()
    }
}
