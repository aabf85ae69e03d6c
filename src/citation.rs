//! Heuristic parsers for PubMed citation text.
//!
//! Both parsers are best-effort. Dates are recovered by trying an ordered list
//! of [`DateStrategy`] values; grant citations are matched against an explicit
//! table of [`GrantShape`] patterns, and anything outside the table is
//! reported as unrecognized instead of being reshaped.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::domain::GrantRecord;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateGranularity {
    Year,
    Month,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CitationDate {
    pub date: NaiveDate,
    pub granularity: DateGranularity,
}

/// Where in the citation a date is looked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateStrategy {
    /// `Journal. 2017 Jan 15;10(2):123-30`: between the journal prefix and `;`.
    Semicolon,
    /// `Journal. 2017 Jan. doi: ...`: the first `.` segment starting with a year.
    Period,
    /// The whole citation, e.g. `2017 Jan`.
    Bare,
}

impl DateStrategy {
    pub const ORDER: [DateStrategy; 3] = [
        DateStrategy::Semicolon,
        DateStrategy::Period,
        DateStrategy::Bare,
    ];

    fn segment(self, citation: &str) -> Option<&str> {
        match self {
            DateStrategy::Semicolon => {
                let head = &citation[..citation.find(';')?];
                let start = head.rfind('.').map(|i| i + 1).unwrap_or(0);
                Some(head[start..].trim())
            }
            DateStrategy::Period => citation
                .split('.')
                .map(str::trim)
                .find(|segment| segment.split_whitespace().next().is_some_and(is_year)),
            DateStrategy::Bare => Some(citation.trim()),
        }
    }

    /// Returns `None` when this strategy does not recognize a date.
    pub fn parse(self, citation: &str) -> Option<CitationDate> {
        parse_date_tokens(self.segment(citation)?)
    }
}

/// Tries every strategy in order and returns the first recognized date.
pub fn extract_date(citation: &str) -> Option<(DateStrategy, CitationDate)> {
    DateStrategy::ORDER
        .iter()
        .find_map(|strategy| strategy.parse(citation).map(|date| (*strategy, date)))
}

/// `YEAR [MONTH [DAY]]`. Month tokens longer than three characters
/// (`Spring`, `Nov-Dec`) degrade to January.
pub fn parse_date_tokens(segment: &str) -> Option<CitationDate> {
    let tokens = segment.split_whitespace().collect::<Vec<_>>();
    let year_token = *tokens.first()?;
    if !is_year(year_token) {
        return None;
    }
    let year = year_token.parse::<i32>().ok()?;

    let (month, mut granularity) = match tokens.get(1) {
        None => (1, DateGranularity::Year),
        Some(token) if token.chars().count() > 3 => (1, DateGranularity::Year),
        Some(token) => (month_number(token)?, DateGranularity::Month),
    };

    let day = match tokens.get(2) {
        None => 1,
        Some(token) => {
            if !token.chars().all(|ch| ch.is_ascii_digit()) {
                return None;
            }
            if granularity == DateGranularity::Month {
                granularity = DateGranularity::Day;
            }
            token.parse::<u32>().ok()?
        }
    };

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(CitationDate { date, granularity })
}

fn is_year(token: &str) -> bool {
    token.len() == 4 && token.chars().all(|ch| ch.is_ascii_digit())
}

fn month_number(token: &str) -> Option<u32> {
    let lower = token.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|month| *month == lower)
        .map(|index| index as u32 + 1)
}

/// Recognized layouts of a PubMed grant-support line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantShape {
    /// `U54 CA209997/CA/NCI NIH HHS/United States`
    Spaced,
    /// `U54CA209997/CA/NCI NIH HHS/United States`
    Concatenated,
    /// `U54 CA 209997/CA/NCI NIH HHS/United States`
    SplitNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantCitation {
    /// The line does not start with a consortium grant prefix.
    OtherProgram,
    Recognized { shape: GrantShape, grant: GrantRecord },
    /// Consortium prefix present but no shape matched; needs manual review.
    Unrecognized(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedGrants {
    pub grants: Vec<GrantRecord>,
    pub unrecognized: Vec<String>,
}

pub struct GrantCitationParser {
    prefixes: Vec<String>,
    shapes: Vec<(GrantShape, Regex)>,
}

impl GrantCitationParser {
    pub fn new(prefixes: &[String]) -> Result<Self, regex::Error> {
        let alternation = prefixes
            .iter()
            .map(|prefix| regex::escape(prefix.trim()))
            .collect::<Vec<_>>()
            .join("|");
        let shapes = vec![
            (
                GrantShape::Spaced,
                Regex::new(&format!(r"^(?P<kind>{alternation})\s+(?P<number>[^\s/]+)/"))?,
            ),
            (
                GrantShape::SplitNumber,
                Regex::new(&format!(
                    r"^(?P<kind>{alternation})\s+(?P<head>[^\s/]+)\s+(?P<number>[^\s/]+)/"
                ))?,
            ),
            (
                GrantShape::Concatenated,
                Regex::new(&format!(r"^(?P<kind>{alternation})(?P<number>[^\s/]+)/"))?,
            ),
        ];
        Ok(Self {
            prefixes: prefixes.iter().map(|p| p.trim().to_string()).collect(),
            shapes,
        })
    }

    pub fn classify(&self, raw: &str) -> GrantCitation {
        let trimmed = raw.trim();
        if !self
            .prefixes
            .iter()
            .any(|prefix| trimmed.starts_with(prefix.as_str()))
        {
            return GrantCitation::OtherProgram;
        }
        let cleaned = trimmed.replace('-', "");
        for (shape, pattern) in &self.shapes {
            let Some(captures) = pattern.captures(&cleaned) else {
                continue;
            };
            let number = match captures.name("head") {
                Some(head) => format!("{}{}", head.as_str(), &captures["number"]),
                None => captures["number"].to_string(),
            };
            return GrantCitation::Recognized {
                shape: *shape,
                grant: GrantRecord {
                    grant_type: captures["kind"].to_string(),
                    grant_number: number,
                },
            };
        }
        GrantCitation::Unrecognized(trimmed.to_string())
    }

    /// Classifies every line, de-duplicating recognized grants.
    pub fn clean_all<S: AsRef<str>>(&self, raws: &[S]) -> CleanedGrants {
        let mut grants = BTreeSet::new();
        let mut unrecognized = Vec::new();
        for raw in raws {
            match self.classify(raw.as_ref()) {
                GrantCitation::OtherProgram => {}
                GrantCitation::Recognized { grant, .. } => {
                    grants.insert(grant);
                }
                GrantCitation::Unrecognized(line) => {
                    tracing::warn!(citation = %line, "unrecognized grant citation shape");
                    unrecognized.push(line);
                }
            }
        }
        CleanedGrants {
            grants: grants.into_iter().collect(),
            unrecognized,
        }
    }
}
