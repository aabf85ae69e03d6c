use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyndccError;

/// A Synapse entity id such as `syn10142562`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SynapseId(String);

impl SynapseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id without its `syn` prefix, as used in view scopes.
    pub fn numeric(&self) -> &str {
        &self.0[3..]
    }
}

impl fmt::Display for SynapseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SynapseId {
    type Error = SyndccError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SynapseId> for String {
    fn from(id: SynapseId) -> Self {
        id.0
    }
}

impl FromStr for SynapseId {
    type Err = SyndccError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .get(..3)
            .filter(|prefix| prefix.eq_ignore_ascii_case("syn"))
            .map(|_| &trimmed[3..])
            .ok_or_else(|| SyndccError::InvalidSynapseId(value.to_string()))?;
        // Version suffixes (`syn123.4`) are not accepted here.
        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(SyndccError::InvalidSynapseId(value.to_string()));
        }
        Ok(Self(format!("syn{digits}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PubmedId(String);

impl PubmedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn page_url(&self) -> String {
        format!("https://www.ncbi.nlm.nih.gov/pubmed/?term={}", self.0)
    }

    /// Recovers the id from a stored `PubMed` link cell (`...?term=<id>`).
    pub fn from_link(link: &str) -> Option<Self> {
        let (_, id) = link.split_once('=')?;
        id.parse().ok()
    }
}

impl fmt::Display for PubmedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PubmedId {
    type Err = SyndccError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(SyndccError::InvalidPubmedId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A consortium grant: the program prefix (`U54`) and the grant number (`CA209997`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantRecord {
    pub grant_type: String,
    pub grant_number: String,
}

impl fmt::Display for GrantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.grant_type, self.grant_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessType {
    Read,
    Download,
    Create,
    Update,
    Delete,
    ChangeSettings,
    ChangePermissions,
    Moderate,
    Upload,
    Participate,
    Submit,
    ReadPrivateSubmission,
    UpdateSubmission,
    DeleteSubmission,
    TeamMembershipUpdate,
    SendMessage,
    ReviewSubmissions,
    ExemptionEligible,
}

impl AccessType {
    pub fn team_member() -> Vec<AccessType> {
        vec![
            AccessType::Create,
            AccessType::Update,
            AccessType::Delete,
            AccessType::Download,
            AccessType::Read,
        ]
    }

    pub fn admin() -> Vec<AccessType> {
        vec![
            AccessType::ChangeSettings,
            AccessType::ChangePermissions,
            AccessType::Moderate,
            AccessType::Read,
            AccessType::Download,
            AccessType::Create,
            AccessType::Delete,
            AccessType::Update,
        ]
    }
}

/// Permission levels accepted by `permit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Download,
    Edit,
}

impl Permission {
    pub fn access_types(self) -> Vec<AccessType> {
        match self {
            Permission::Read => vec![AccessType::Read],
            Permission::Download => vec![AccessType::Read, AccessType::Download],
            Permission::Edit => vec![
                AccessType::Read,
                AccessType::Download,
                AccessType::Create,
                AccessType::Delete,
                AccessType::Update,
            ],
        }
    }
}

impl FromStr for Permission {
    type Err = SyndccError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "read" | "view" => Ok(Permission::Read),
            "download" => Ok(Permission::Download),
            "edit" => Ok(Permission::Edit),
            _ => Err(SyndccError::InvalidPermission(value.to_string())),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Read => write!(f, "read"),
            Permission::Download => write!(f, "download"),
            Permission::Edit => write!(f, "edit"),
        }
    }
}

/// Consortium naming used to pick column labels and member-table patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consortium {
    Csbc,
    Pson,
    CsbcPson,
    Other(String),
}

impl Consortium {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "csbc" => Consortium::Csbc,
            "pson" => Consortium::Pson,
            "csbc pson" => Consortium::CsbcPson,
            _ => Consortium::Other(name.trim().to_string()),
        }
    }

    /// Column naming the owning project in the publications table.
    pub fn center_column(&self) -> &'static str {
        match self {
            Consortium::Csbc => "CSBC PSON Center",
            _ => "Consortium Center",
        }
    }

    /// Substring selecting member columns in an invitation table: `CSBC` or
    /// `PSON` for those consortia, otherwise `name` as given.
    pub fn member_pattern(name: &str) -> String {
        match Consortium::parse(name) {
            Consortium::Csbc => "CSBC".to_string(),
            Consortium::Pson => "PSON".to_string(),
            Consortium::CsbcPson | Consortium::Other(_) => name.trim().to_string(),
        }
    }

    pub fn has_builtin_report_layout(&self) -> bool {
        !matches!(self, Consortium::Other(_))
    }
}
