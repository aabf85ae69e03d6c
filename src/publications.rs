//! Publication scraping and grant reconciliation.
//!
//! For every PubMed id the scraper fetches the abstract page and the GEO
//! link page, parses them, matches the cited grants against the consortium
//! view and produces one [`PublicationRecord`].

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::citation::{self, GrantCitationParser};
use crate::domain::{Consortium, GrantRecord, PubmedId};
use crate::error::SyndccError;
use crate::frame::{Cell, Frame};
use crate::scrape::{self, PageFetcher};
use crate::synapse::ColumnModel;

/// The consortium project view restricted to rows that carry a grant number.
#[derive(Debug, Clone)]
pub struct ConsortiumView {
    frame: Frame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ownership {
    pub project_id: String,
    pub consortium: String,
    /// More than one project shares the matched grant numbers.
    pub ambiguous: bool,
}

impl ConsortiumView {
    pub fn from_frame(frame: Frame) -> Result<Self, SyndccError> {
        frame.require_column("id")?;
        let frame = frame.drop_missing("grantNumber")?;
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Grant numbers in view order, duplicates included.
    pub fn grant_numbers(&self) -> Vec<String> {
        self.frame
            .iter()
            .filter_map(|row| row.get("grantNumber"))
            .map(|value| value.trim().to_string())
            .collect()
    }

    pub fn grant_set(&self) -> BTreeSet<String> {
        self.grant_numbers().into_iter().collect()
    }

    /// First view row whose grant number is in `numbers` owns the
    /// publication. Later rows only contribute consortium labels.
    pub fn owner_of(&self, numbers: &BTreeSet<String>) -> Option<Ownership> {
        let rows = self
            .frame
            .iter()
            .filter(|row| {
                row.get("grantNumber")
                    .is_some_and(|grant| numbers.contains(grant.trim()))
            })
            .collect::<Vec<_>>();
        let first = rows.first()?;
        let project_id = first.get("id").unwrap_or_default().to_string();
        let projects = rows
            .iter()
            .filter_map(|row| row.get("id"))
            .collect::<BTreeSet<_>>();
        let consortium = rows
            .iter()
            .filter_map(|row| row.get("consortium"))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join(",");
        Some(Ownership {
            project_id,
            consortium,
            ambiguous: projects.len() > 1,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationRecord {
    pub external_id: PubmedId,
    pub source_url: String,
    pub journal: String,
    pub published: NaiveDate,
    pub title: String,
    pub authors: Vec<String>,
    pub matched_grants: Vec<GrantRecord>,
    pub derived_dataset_links: Vec<String>,
    pub owner_project_id: String,
    pub consortium: String,
}

impl PublicationRecord {
    pub fn publication_year(&self) -> i32 {
        self.published.year()
    }

    pub fn authors_cell(&self) -> String {
        self.authors.join(", ")
    }

    pub fn grants_cell(&self) -> String {
        self.matched_grants
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn dataset_links_cell(&self) -> String {
        scrape::render_dataset_links(&self.derived_dataset_links)
    }

    /// Cells in [`publication_columns`] order.
    pub fn to_row(&self) -> Vec<Cell> {
        vec![
            Some(self.owner_project_id.clone()),
            Some(self.consortium.clone()),
            Some(self.source_url.clone()),
            Some(self.journal.clone()),
            Some(self.publication_year().to_string()),
            Some(self.title.clone()),
            Some(self.authors_cell()),
            Some(self.grants_cell()),
            Some(self.dataset_links_cell()),
            None,
            None,
        ]
        .into_iter()
        .map(|cell| cell.filter(|value| !value.is_empty()))
        .collect()
    }
}

pub fn publication_columns(consortium: &Consortium) -> Vec<&'static str> {
    vec![
        consortium.center_column(),
        "Consortium",
        "PubMed",
        "Journal",
        "Publication Year",
        "Title",
        "Authors",
        "Grant",
        "Data Location",
        "Synapse Location",
        "Keywords",
    ]
}

/// Column models for a new publications table.
pub fn publication_schema(consortium: &Consortium) -> Vec<ColumnModel> {
    vec![
        ColumnModel::new(consortium.center_column(), "ENTITYID", Some(50)),
        ColumnModel::new("Consortium", "STRING", Some(100)),
        ColumnModel::new("PubMed", "LINK", Some(100)),
        ColumnModel::new("Journal", "STRING", Some(100)),
        ColumnModel::new("Publication Year", "DATE", None),
        ColumnModel::new("Title", "STRING", Some(500)),
        ColumnModel::new("Authors", "STRING", Some(990)),
        ColumnModel::new("Grant", "STRING", Some(50)),
        ColumnModel::new("Data Location", "LINK", Some(1000)),
        ColumnModel::new("Synapse Location", "ENTITYID", Some(50)),
        ColumnModel::new("Keywords", "STRING", Some(250)),
    ]
}

pub fn publication_frame(
    records: &[PublicationRecord],
    consortium: &Consortium,
) -> Result<Frame, SyndccError> {
    Frame::from_rows(
        publication_columns(consortium),
        records.iter().map(PublicationRecord::to_row).collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Record(Box<PublicationRecord>),
    /// No strategy recognized a date in the citation.
    SkippedDate { citation: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeReport {
    pub records: Vec<PublicationRecord>,
    pub skipped: Vec<PubmedId>,
    pub unrecognized_grants: Vec<String>,
}

pub struct PublicationScraper<'a, F: PageFetcher> {
    fetcher: &'a F,
    view: &'a ConsortiumView,
    grants: BTreeSet<String>,
    parser: GrantCitationParser,
}

impl<'a, F: PageFetcher> PublicationScraper<'a, F> {
    pub fn new(
        fetcher: &'a F,
        view: &'a ConsortiumView,
        grant_prefixes: &[String],
    ) -> Result<Self, SyndccError> {
        let parser = GrantCitationParser::new(grant_prefixes)
            .map_err(|err| SyndccError::InvalidArgument(format!("grant prefixes: {err}")))?;
        Ok(Self {
            fetcher,
            view,
            grants: view.grant_set(),
            parser,
        })
    }

    pub fn scrape_all(
        &self,
        pmids: &[PubmedId],
        sink: &dyn ProgressSink,
    ) -> Result<ScrapeReport, SyndccError> {
        sink.event(ProgressEvent {
            message: format!("phase=Scrape; {} publications found", pmids.len()),
            elapsed: None,
        });
        let mut report = ScrapeReport::default();
        for (index, pmid) in pmids.iter().enumerate() {
            let start = std::time::Instant::now();
            let (outcome, unrecognized) = self.scrape_one(pmid)?;
            report.unrecognized_grants.extend(unrecognized);
            match outcome {
                ScrapeOutcome::Record(record) => {
                    if record.owner_project_id.is_empty() {
                        tracing::debug!(%pmid, "no consortium grant matched");
                    }
                    report.records.push(*record);
                }
                ScrapeOutcome::SkippedDate { citation } => {
                    tracing::warn!(%pmid, %citation, "citation date not recognized; skipping");
                    report.skipped.push(pmid.clone());
                }
            }
            sink.event(ProgressEvent {
                message: format!("pubmed {pmid} ({}/{})", index + 1, pmids.len()),
                elapsed: Some(start.elapsed()),
            });
        }
        Ok(report)
    }

    /// Scrapes one publication. Also returns grant citations whose shape was
    /// not recognized.
    pub fn scrape_one(&self, pmid: &PubmedId) -> Result<(ScrapeOutcome, Vec<String>), SyndccError> {
        let source_url = pmid.page_url();
        let html = self.fetcher.fetch(&source_url)?;
        let page = scrape::parse_publication_page(pmid, &html)?;

        let Some((strategy, date)) = citation::extract_date(&page.citation) else {
            return Ok((
                ScrapeOutcome::SkippedDate {
                    citation: page.citation,
                },
                Vec::new(),
            ));
        };
        tracing::debug!(%pmid, ?strategy, date = %date.date, "citation date");

        let cleaned = self.parser.clean_all(&page.grant_citations);
        let matched_grants = cleaned
            .grants
            .into_iter()
            .filter(|grant| self.grants.contains(&grant.grant_number))
            .collect::<Vec<_>>();
        let numbers = matched_grants
            .iter()
            .map(|grant| grant.grant_number.clone())
            .collect::<BTreeSet<_>>();

        let ownership = if numbers.is_empty() {
            None
        } else {
            self.view.owner_of(&numbers)
        };
        if let Some(owner) = ownership.as_ref().filter(|owner| owner.ambiguous) {
            tracing::warn!(
                %pmid,
                project = %owner.project_id,
                "grant number shared by several projects; first project wins"
            );
        }

        let gds_html = self.fetcher.fetch(&scrape::gds_link_url(pmid))?;
        let series = scrape::parse_geo_series(&gds_html)?;
        tracing::info!(%pmid, geo = ?series, "derived datasets");

        let record = PublicationRecord {
            external_id: pmid.clone(),
            source_url,
            journal: page.journal,
            published: date.date,
            title: page.title,
            authors: page.authors,
            matched_grants,
            derived_dataset_links: series
                .iter()
                .map(|accession| scrape::geo_accession_url(accession))
                .collect(),
            owner_project_id: ownership
                .as_ref()
                .map(|owner| owner.project_id.clone())
                .unwrap_or_default(),
            consortium: ownership
                .map(|owner| owner.consortium)
                .unwrap_or_default(),
        };
        Ok((ScrapeOutcome::Record(Box::new(record)), cleaned.unrecognized))
    }
}
