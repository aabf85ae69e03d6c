//! Consortium reporting: the `meltinfo` master table and the per-folder
//! `summary` report.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{Consortium, SynapseId};
use crate::error::SyndccError;
use crate::frame::{Cell, Frame};
use crate::synapse::{ChildEntity, SynapseClient};

const PROJECT_RENAMES: [(&str, &str); 5] = [
    ("id", "projectId"),
    ("name", "name_project"),
    ("createdOn", "createdOn_project"),
    ("modifiedOn", "modifiedOn_project"),
    ("modifiedBy", "modifiedBy_project"),
];

const FILE_RENAMES: [(&str, &str); 5] = [
    ("id", "fileId"),
    ("name", "name_file"),
    ("createdOn", "createdOn_file"),
    ("modifiedOn", "modifiedOn_file"),
    ("modifiedBy", "modifiedBy_file"),
];

const CENTER_COLUMNS: [&str; 2] = ["CSBC PSON Center", "Consortium Center"];

/// Columns rendered as whole numbers in the melted table.
pub const INTEGER_COLUMNS: [&str; 7] = [
    "modifiedOn_file",
    "modifiedOn_project",
    "createdOn_file",
    "createdOn_project",
    "age",
    "readLength",
    "teamProfileId",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeltAttributes {
    pub project_publication: Vec<String>,
    pub project: Vec<String>,
    pub file: Vec<String>,
}

impl MeltAttributes {
    pub fn builtin() -> Self {
        Self {
            project_publication: to_strings(&[
                "projectId",
                "Consortium",
                "institution",
                "grantNumber",
                "grantType",
                "teamMembersProfileId",
                "teamProfileId",
                "name_project",
                "createdOn_project",
                "modifiedOn_project",
                "PubMed",
                "Title",
                "Authors",
                "Journal",
                "Keywords",
                "Publication Year",
                "Data Location",
                "Synapse Location",
            ]),
            project: to_strings(&[
                "projectId",
                "consortium",
                "institution",
                "grantNumber",
                "grantType",
                "teamMembersProfileId",
                "teamProfileId",
                "name_project",
                "createdOn_project",
                "modifiedOn_project",
                "publication_count",
                "publication_geodata_produced",
            ]),
            file: to_strings(&[
                "cellSubType",
                "cellLine",
                "softwareType",
                "tumorType",
                "transplantationRecipientTissue",
                "individualID",
                "sex",
                "transcriptQuantificationMethod",
                "isStranded",
                "tissue",
                "platform",
                "softwareLanguage",
                "species",
                "Data_Location",
                "specimenID",
                "fundingAgency",
                "isCellLine",
                "individualIdSource",
                "libraryPrep",
                "inputDataType",
                "compoundDose",
                "runType",
                "softwareRepositoryType",
                "transplantationDonorTissue",
                "peakCallingMethod",
                "fileFormat",
                "assay",
                "softwareRepository",
                "compoundName",
                "transplantationType",
                "dataType",
                "softwareAuthor",
                "transplantationDonorSpecies",
                "readLength",
                "Synapse_Location",
                "modelSystem",
                "scriptLanguageVersion",
                "analysisType",
                "concreteType",
                "fileId",
                "dataSubtype",
                "organ",
                "isPrimaryCell",
                "resourceType",
                "outputDataType",
                "study",
                "diseaseSubtype",
                "experimentalCondition",
                "diagnosis",
                "cellType",
                "experimentalTimePoint",
                "age",
                "rnaAlignmentMethod",
                "dnaAlignmentMethod",
                "networkEdgeType",
                "name_file",
                "createdOn_file",
                "modifiedOn_file",
                "projectId",
            ]),
        }
    }

    /// Built-in lists for known consortia, otherwise the supplied ones.
    pub fn for_consortium(
        consortium: &Consortium,
        project_publication: Vec<String>,
        project: Vec<String>,
        file: Vec<String>,
    ) -> Result<Self, SyndccError> {
        if consortium.has_builtin_report_layout() {
            return Ok(Self::builtin());
        }
        if project.is_empty() || file.is_empty() {
            return Err(SyndccError::InvalidArgument(
                "--project-attribute and --file-attribute are required for this consortium"
                    .to_string(),
            ));
        }
        Ok(Self {
            project_publication,
            project,
            file,
        })
    }
}

/// The four source views of `meltinfo`, in query order.
#[derive(Debug, Clone, Default)]
pub struct MeltSources {
    pub publications: Frame,
    pub projects: Frame,
    pub files: Frame,
    pub tools: Frame,
}

#[derive(Debug, Clone)]
pub struct MeltReport {
    pub table: Frame,
    /// Projects joined with their publications, reduced to the
    /// project-publication attributes.
    pub project_publications: Frame,
    pub project_count: usize,
    pub tool_count: usize,
    pub data_file_count: usize,
}

/// Builds the master table: non-sponsor projects with their publication
/// counts, left-joined to tool rows and data-file rows.
///
/// Files that also appear in the tools view are dropped from the data files
/// and kept as tool rows (tagged `resourceType = tool`). Placeholder files are
/// removed from both sets.
pub fn melt(
    sources: MeltSources,
    attributes: &MeltAttributes,
    sponsor_institutions: &[String],
    placeholder_files: &[String],
) -> Result<MeltReport, SyndccError> {
    let MeltSources {
        mut publications,
        mut projects,
        files,
        tools,
    } = sources;

    publications.rename(&CENTER_COLUMNS.map(|center| (center, "projectId")));
    publications.require_column("projectId")?;
    projects.rename(&PROJECT_RENAMES);
    let mut projects = projects.filter(|row| {
        row.get("institution")
            .is_none_or(|institution| !sponsor_institutions.iter().any(|s| s == institution))
    });

    let project_publications = projects
        .left_join(&publications, "projectId")?
        .select_present(&attributes.project_publication);

    let (counts, geodata) = publication_counts(&projects, &publications)?;
    projects.append_column("publication_count", counts)?;
    projects.append_column("publication_geodata_produced", geodata)?;

    let tool_ids = tools.distinct("id")?;
    let data_files = files.filter(|row| row.get("id").is_none_or(|id| !tool_ids.contains(id)));
    let removed = files.len() - data_files.len();
    if removed > 0 {
        tracing::info!(removed, "tool files removed from data files");
    }

    let data_files = file_attributes(data_files, &attributes.file, placeholder_files);
    let tools = file_attributes(tools, &attributes.file, placeholder_files);
    let tool_file_ids = if tools.has_column("fileId") {
        tools.distinct("fileId")?
    } else {
        BTreeSet::new()
    };
    let file_info = Frame::concat(&[tools.clone(), data_files.clone()]);

    let project_columns = attributes
        .project
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>();
    let mut table = projects
        .select(&project_columns)?
        .left_join(&file_info, "projectId")?;

    if table.has_column("fileId") {
        table.set_where("resourceType", "tool", |row| {
            row.get("fileId").is_some_and(|id| tool_file_ids.contains(id))
        });
    }

    for column in INTEGER_COLUMNS {
        if table.has_column(column) {
            table.map_column(column, render_integer)?;
        }
    }

    let joined_projects = table.distinct("projectId")?.len();
    if joined_projects != projects.len() {
        tracing::warn!(
            joined = joined_projects,
            projects = projects.len(),
            "not every project made it into the melted table"
        );
    }

    Ok(MeltReport {
        table,
        project_publications,
        project_count: projects.len(),
        tool_count: tools.len(),
        data_file_count: data_files.len(),
    })
}

fn file_attributes(mut frame: Frame, attributes: &[String], placeholders: &[String]) -> Frame {
    frame.rename(&FILE_RENAMES);
    let frame = frame.select_present(attributes);
    if !frame.has_column("name_file") {
        return frame;
    }
    frame.filter(|row| {
        row.get("name_file")
            .is_none_or(|name| !placeholders.iter().any(|p| p == name))
    })
}

/// Publication rows and dataset links per project, in project order.
fn publication_counts(
    projects: &Frame,
    publications: &Frame,
) -> Result<(Vec<Cell>, Vec<Cell>), SyndccError> {
    let mut per_project: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for row in publications.iter() {
        let Some(project) = row.get("projectId") else {
            continue;
        };
        let entry = per_project.entry(project).or_default();
        entry.0 += 1;
        entry.1 += row.get("Data Location").map(count_links).unwrap_or(0);
    }
    let ids = projects.column_values("projectId")?;
    let lookup = |id: Option<&str>| id.and_then(|id| per_project.get(id)).copied().unwrap_or((0, 0));
    Ok((
        ids.iter()
            .map(|id| Some(lookup(*id).0.to_string()))
            .collect(),
        ids.iter()
            .map(|id| Some(lookup(*id).1.to_string()))
            .collect(),
    ))
}

/// Non-empty comma-separated pieces of a `Data Location` cell.
pub fn count_links(cell: &str) -> usize {
    cell.split(',').filter(|piece| !piece.trim().is_empty()).count()
}

/// Whole-number rendering: `1.5e12` → `1500000000000`, zero or missing →
/// empty. Non-numeric text is kept as is.
pub fn render_integer(cell: Option<&str>) -> Cell {
    let value = cell.map(str::trim).filter(|value| !value.is_empty())?;
    match value.parse::<f64>() {
        Ok(number) if number == 0.0 || number.is_nan() => None,
        Ok(number) => Some(format!("{}", number.trunc() as i64)),
        Err(_) => Some(value.to_string()),
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Summary inputs that come from configuration.
#[derive(Debug, Clone)]
pub struct SummarySettings {
    pub sponsor_principals: Vec<u64>,
    pub sponsor_institutions: Vec<String>,
    pub excluded_folders: Vec<String>,
    pub placeholder_files: Vec<String>,
    /// ISO-8601 timestamp; files created after it are not counted.
    pub created_before: String,
}

pub const SUMMARY_COLUMNS: [&str; 16] = [
    "folder",
    "file_count",
    "file_annotations_count",
    "annot_files",
    "annot_files_count",
    "annot_files_per_study_count",
    "project_ids",
    "institution",
    "grantNumber",
    "grantType",
    "consortium",
    "team_profileId",
    "team_members_profileId",
    "team_members_count",
    "pubmed_publication",
    "geodata_produced_count",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeamInfo {
    pub team_ids: Vec<u64>,
    pub member_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderSummary {
    pub folder: String,
    pub file_count: usize,
    pub annotated_file_count: usize,
    /// File count per distinct `study` annotation value.
    pub studies: BTreeMap<String, usize>,
}

pub struct SummaryBuilder<'a, S: SynapseClient> {
    client: &'a S,
    settings: &'a SummarySettings,
}

impl<'a, S: SynapseClient> SummaryBuilder<'a, S> {
    pub fn new(client: &'a S, settings: &'a SummarySettings) -> Self {
        Self { client, settings }
    }

    pub fn build(
        &self,
        projects: &Frame,
        publications: &Frame,
        sink: &dyn ProgressSink,
    ) -> Result<Frame, SyndccError> {
        let projects = projects.filter(|row| {
            row.get("institution").is_none_or(|institution| {
                !self
                    .settings
                    .sponsor_institutions
                    .iter()
                    .any(|s| s == institution)
            })
        });
        let center = CENTER_COLUMNS
            .iter()
            .find(|column| publications.has_column(column))
            .ok_or_else(|| SyndccError::MissingColumn(CENTER_COLUMNS.join(" | ")))?;

        let mut report = Frame::new(SUMMARY_COLUMNS);
        for row in projects.iter() {
            let start = std::time::Instant::now();
            let id: SynapseId = row
                .get("id")
                .ok_or_else(|| SyndccError::MissingColumn("id".to_string()))?
                .parse()?;
            let team = self.team_info(&id)?;
            let project_pubs = publications.filter(|pub_row| pub_row.get(center) == Some(id.as_str()));
            let links = project_pubs
                .iter()
                .filter_map(|pub_row| pub_row.get("Data Location"))
                .map(count_links)
                .sum::<usize>();

            for folder in self.folder_summaries(&id)? {
                let cell = |value: Option<&str>| value.map(str::to_string);
                let (studies, study_counts) = if folder.studies.is_empty() {
                    (None, None)
                } else {
                    (
                        Some(join(folder.studies.keys())),
                        Some(join(folder.studies.values())),
                    )
                };
                report.push_row(vec![
                    Some(folder.folder.clone()),
                    Some(folder.file_count.to_string()),
                    Some(folder.annotated_file_count.to_string()),
                    studies,
                    (!folder.studies.is_empty()).then(|| folder.studies.len().to_string()),
                    study_counts,
                    Some(id.to_string()),
                    cell(row.get("institution")),
                    cell(row.get("grantNumber")),
                    cell(row.get("grantType")),
                    cell(row.get("consortium")),
                    Some(join(&team.team_ids)),
                    Some(join(&team.member_ids)),
                    Some(team.member_ids.len().to_string()),
                    Some(project_pubs.len().to_string()),
                    Some(links.to_string()),
                ])?;
            }
            sink.event(ProgressEvent {
                message: format!("summarized {id}"),
                elapsed: Some(start.elapsed()),
            });
        }
        Ok(report)
    }

    /// Teams on the project ACL that are not sponsors, and their non-sponsor
    /// members. Principals that are users rather than teams are skipped.
    pub fn team_info(&self, project: &SynapseId) -> Result<TeamInfo, SyndccError> {
        let sponsors = &self.settings.sponsor_principals;
        let acl = self.client.get_acl(project)?;
        let mut info = TeamInfo::default();
        for principal in acl.principals() {
            if sponsors.contains(&principal) {
                continue;
            }
            let members = match self.client.team_members(principal) {
                Ok(members) => members,
                Err(SyndccError::SynapseStatus { status: 404, .. }) => {
                    tracing::debug!(principal, "principal is not a team");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if members.is_empty() {
                continue;
            }
            info.team_ids.push(principal);
            for member in members {
                if !sponsors.contains(&member) && !info.member_ids.contains(&member) {
                    info.member_ids.push(member);
                }
            }
        }
        Ok(info)
    }

    /// One summary per top-level folder, walking each subtree breadth first.
    pub fn folder_summaries(&self, project: &SynapseId) -> Result<Vec<FolderSummary>, SyndccError> {
        let top = self.client.children(project)?;
        let loose = top.iter().filter(|child| child.is_file()).count();
        if loose > 0 {
            tracing::info!(%project, files = loose, "files at project root should be placed in folders");
        }

        let mut summaries = Vec::new();
        for folder in top.iter().filter(|child| self.walkable(child)) {
            let files = self.walk(&folder.id)?;
            let mut summary = FolderSummary {
                folder: folder.name.clone(),
                ..FolderSummary::default()
            };
            for file in files.iter().filter(|file| self.countable(file)) {
                summary.file_count += 1;
                let annotations = self.client.annotations(&file.id)?;
                let strings = annotations
                    .iter()
                    .filter(|(_, value)| value.value_type == "STRING")
                    .collect::<Vec<_>>();
                if !strings.is_empty() {
                    summary.annotated_file_count += 1;
                }
                let studies = strings
                    .iter()
                    .filter(|(key, _)| key.as_str() == "study")
                    .flat_map(|(_, value)| value.value.iter().cloned())
                    .collect::<BTreeSet<_>>();
                for study in studies {
                    *summary.studies.entry(study).or_default() += 1;
                }
            }
            summaries.push(summary);
        }
        Ok(summaries)
    }

    fn walk(&self, root: &SynapseId) -> Result<Vec<ChildEntity>, SyndccError> {
        let mut files = Vec::new();
        let mut queue = VecDeque::from([root.clone()]);
        while let Some(folder) = queue.pop_front() {
            for child in self.client.children(&folder)? {
                if self.walkable(&child) {
                    queue.push_back(child.id.clone());
                } else if child.is_file() {
                    files.push(child);
                }
            }
        }
        Ok(files)
    }

    fn walkable(&self, child: &ChildEntity) -> bool {
        child.is_folder() && !self.settings.excluded_folders.contains(&child.name)
    }

    fn countable(&self, file: &ChildEntity) -> bool {
        !self.settings.placeholder_files.contains(&file.name)
            && file
                .created_on
                .as_deref()
                .is_some_and(|created| created <= self.settings.created_before.as_str())
    }
}

fn join<T: ToString>(values: impl IntoIterator<Item = T>) -> String {
    values
        .into_iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
