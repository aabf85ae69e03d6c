use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::SynapseId;
use crate::error::SyndccError;

pub const DEFAULT_CONFIG_FILE: &str = "syndccutils.json";

/// On-disk configuration. Every field is optional; missing values fall back
/// to the CSBC/PSON consortium defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub project_view: Option<String>,
    #[serde(default)]
    pub publication_view: Option<String>,
    #[serde(default)]
    pub admin_team: Option<u64>,
    #[serde(default)]
    pub public_principals: Option<Vec<u64>>,
    #[serde(default)]
    pub templates: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub sponsor_teams: Option<Vec<u64>>,
    #[serde(default)]
    pub sponsor_principals: Option<Vec<u64>>,
    #[serde(default)]
    pub sponsor_institutions: Option<Vec<String>>,
    #[serde(default)]
    pub grant_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub report_views: Option<ReportViewsEntry>,
    #[serde(default)]
    pub entrez: Option<EntrezEntry>,
    #[serde(default)]
    pub summary_cutoff: Option<String>,
    #[serde(default)]
    pub placeholder_files: Option<Vec<String>>,
    #[serde(default)]
    pub excluded_folders: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ReportViewsEntry {
    #[serde(default)]
    pub publications: Option<String>,
    #[serde(default)]
    pub projects: Option<String>,
    #[serde(default)]
    pub files: Option<String>,
    #[serde(default)]
    pub tools: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct EntrezEntry {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportViews {
    pub publications: SynapseId,
    pub projects: SynapseId,
    pub files: SynapseId,
    pub tools: SynapseId,
}

impl ReportViews {
    pub fn as_vec(&self) -> Vec<SynapseId> {
        vec![
            self.publications.clone(),
            self.projects.clone(),
            self.files.clone(),
            self.tools.clone(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrezSettings {
    pub email: Option<String>,
    pub api_key: Option<String>,
    pub tool: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub project_view: SynapseId,
    pub publication_view: SynapseId,
    pub admin_team: u64,
    pub public_principals: Vec<u64>,
    pub templates: BTreeMap<String, SynapseId>,
    pub sponsor_teams: Vec<u64>,
    pub sponsor_principals: Vec<u64>,
    pub sponsor_institutions: Vec<String>,
    pub grant_prefixes: Vec<String>,
    pub report_views: ReportViews,
    pub entrez: EntrezSettings,
    pub summary_cutoff: String,
    pub placeholder_files: Vec<String>,
    pub excluded_folders: Vec<String>,
}

impl ResolvedConfig {
    pub fn template_for(&self, consortium_id: &str) -> Result<&SynapseId, SyndccError> {
        self.templates
            .get(consortium_id.trim())
            .ok_or_else(|| SyndccError::UnknownConsortium(consortium_id.to_string()))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads an explicit config file, or `syndccutils.json` from the working
    /// directory when present, or the built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SyndccError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            tracing::debug!("no {DEFAULT_CONFIG_FILE} found; using built-in defaults");
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SyndccError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SyndccError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SyndccError> {
        let project_view = config
            .project_view
            .as_deref()
            .unwrap_or("syn10142562")
            .parse::<SynapseId>()?;
        let publication_view = config
            .publication_view
            .as_deref()
            .unwrap_or("syn10923842")
            .parse::<SynapseId>()?;

        let templates = config
            .templates
            .unwrap_or_else(default_templates)
            .into_iter()
            .map(|(consortium, id)| Ok((consortium, id.parse::<SynapseId>()?)))
            .collect::<Result<BTreeMap<_, _>, SyndccError>>()?;

        let views = config.report_views.unwrap_or_default();
        let report_views = ReportViews {
            publications: match views.publications {
                Some(id) => id.parse()?,
                None => publication_view.clone(),
            },
            projects: match views.projects {
                Some(id) => id.parse()?,
                None => project_view.clone(),
            },
            files: views.files.as_deref().unwrap_or("syn9630847").parse()?,
            tools: views.tools.as_deref().unwrap_or("syn9898965").parse()?,
        };

        let entrez = config.entrez.unwrap_or_default();
        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .or(entrez.api_key);
        let entrez = EntrezSettings {
            email: entrez.email,
            api_key,
            tool: entrez.tool.unwrap_or_else(|| "syndccutils".to_string()),
        };

        Ok(ResolvedConfig {
            project_view,
            publication_view,
            admin_team: config.admin_team.unwrap_or(3346139),
            public_principals: config
                .public_principals
                .unwrap_or_else(|| vec![273948, 273949]),
            templates,
            sponsor_teams: config
                .sponsor_teams
                .unwrap_or_else(|| vec![3346396, 3346986, 3346987]),
            sponsor_principals: config
                .sponsor_principals
                .unwrap_or_else(default_sponsor_principals),
            sponsor_institutions: config
                .sponsor_institutions
                .unwrap_or_else(|| vec!["Multiple".to_string(), "Sage Bionetworks".to_string()]),
            grant_prefixes: config
                .grant_prefixes
                .unwrap_or_else(|| vec!["U54".to_string(), "U01".to_string()]),
            report_views,
            entrez,
            summary_cutoff: config
                .summary_cutoff
                .unwrap_or_else(|| "2017-04-01T00:00:00.000Z".to_string()),
            placeholder_files: config
                .placeholder_files
                .unwrap_or_else(|| vec!["placeholder.txt".to_string()]),
            excluded_folders: config
                .excluded_folders
                .unwrap_or_else(|| vec!["Reporting".to_string()]),
        })
    }
}

pub fn default_templates() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("U54".to_string(), "syn11801564".to_string()),
        ("U01".to_string(), "syn11801693".to_string()),
    ])
}

pub fn default_sponsor_principals() -> Vec<u64> {
    vec![
        273948, 273949, 3334658, 3346139, 1418096, 3333546, 3346401, 2223305,
    ]
}
