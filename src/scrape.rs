//! PubMed detail-page and GEO cross-reference scraping.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{ElementRef, Html, Selector};

use crate::domain::PubmedId;
use crate::error::SyndccError;

const GDS_LINK_BASE: &str = "https://www.ncbi.nlm.nih.gov/gds?LinkName=pubmed_gds&from_uid=";
const GEO_ACCESSION_BASE: &str = "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=";

/// Separator between several dataset links in one cell.
pub const DATASET_LINK_SEPARATOR: &str = " , ";

pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, SyndccError>;
}

#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self, SyndccError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("syndccutils/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyndccError::PageHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SyndccError::PageHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch(&self, url: &str) -> Result<String, SyndccError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SyndccError::PageHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SyndccError::PageStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        response
            .text()
            .map_err(|err| SyndccError::PageHttp(err.to_string()))
    }
}

/// Raw fields scraped from a PubMed abstract page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationPage {
    pub title: String,
    pub journal: String,
    pub citation: String,
    pub authors: Vec<String>,
    pub grant_citations: Vec<String>,
}

pub fn parse_publication_page(pmid: &PubmedId, html: &str) -> Result<PublicationPage, SyndccError> {
    let document = Html::parse_document(html);
    let missing = |section: &str| SyndccError::MissingPageSection {
        pmid: pmid.to_string(),
        section: section.to_string(),
    };

    let title = document
        .select(&selector(".rprt.abstract h1")?)
        .next()
        .map(|h1| element_text(&h1))
        .ok_or_else(|| missing("title"))?;
    let title = ascii_only(&title).replace('.', "").trim().to_string();

    let citation_element = document
        .select(&selector(".cit")?)
        .next()
        .ok_or_else(|| missing("citation"))?;
    let journal = citation_element
        .select(&selector("a")?)
        .next()
        .map(|a| element_text(&a))
        .ok_or_else(|| missing("journal"))?
        .replace('.', "")
        .trim()
        .to_string();
    let citation = element_text(&citation_element);

    let authors_block = document
        .select(&selector("div.auths")?)
        .next()
        .ok_or_else(|| missing("author list"))?;
    let authors = authors_block
        .select(&selector("a")?)
        .filter_map(|a| a.text().next().map(ascii_only))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    let report = document
        .select(&selector("div.rprt_all")?)
        .next()
        .ok_or_else(|| missing("report body"))?;
    let grant_citations = report
        .select(&selector(r#"a[abstractlink="yes"][alsec="grnt"]"#)?)
        .filter_map(|a| a.text().next().map(|text| text.trim().to_string()))
        .collect();

    Ok(PublicationPage {
        title,
        journal,
        citation,
        authors,
        grant_citations,
    })
}

pub fn gds_link_url(pmid: &PubmedId) -> String {
    format!("{GDS_LINK_BASE}{pmid}")
}

/// GEO series accessions listed on a pubmed→gds link page.
pub fn parse_geo_series(html: &str) -> Result<Vec<String>, SyndccError> {
    let document = Html::parse_document(html);
    let dd = selector("dd")?;
    Ok(document
        .select(&selector(".rprtid")?)
        .filter_map(|report| report.select(&dd).next())
        .map(|value| element_text(&value).trim().to_string())
        .filter(|value| value.contains("GSE"))
        .collect())
}

pub fn geo_accession_url(accession: &str) -> String {
    format!("{GEO_ACCESSION_BASE}{accession}")
}

/// Empty for no links, the link itself for one, `" , "`-joined otherwise.
pub fn render_dataset_links(links: &[String]) -> String {
    links.join(DATASET_LINK_SEPARATOR)
}

pub fn ascii_only(text: &str) -> String {
    text.chars().filter(char::is_ascii).collect()
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

fn selector(css: &str) -> Result<Selector, SyndccError> {
    Selector::parse(css)
        .map_err(|err| SyndccError::InvalidArgument(format!("selector {css}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_links_by_count() {
        assert_eq!(render_dataset_links(&[]), "");
        let one = vec![geo_accession_url("GSE100")];
        assert_eq!(
            render_dataset_links(&one),
            "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=GSE100"
        );
        let two = vec![geo_accession_url("GSE1"), geo_accession_url("GSE2")];
        assert_eq!(
            render_dataset_links(&two),
            "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=GSE1 , https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=GSE2"
        );
    }

    #[test]
    fn geo_series_keeps_only_gse_accessions() {
        let html = r#"<html><body>
            <div class="rprt"><dl class="rprtid"><dt>Accession:</dt><dd> GSE98765 </dd></dl></div>
            <div class="rprt"><dl class="rprtid"><dt>Accession:</dt><dd>GPL570</dd></dl></div>
            <div class="rprt"><dl class="rprtid"><dt>ID:</dt></dl></div>
        </body></html>"#;
        assert_eq!(parse_geo_series(html).unwrap(), vec!["GSE98765"]);
    }

    #[test]
    fn ascii_only_drops_accents() {
        assert_eq!(ascii_only("Müller J"), "Mller J");
    }
}
