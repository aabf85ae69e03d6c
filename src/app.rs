use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{AccessType, Consortium, Permission, PubmedId, SynapseId};
use crate::entrez::{self, EntrezClient};
use crate::error::SyndccError;
use crate::frame::Frame;
use crate::project;
use crate::publications::{self, ConsortiumView, PublicationScraper};
use crate::reports::{self, MeltAttributes, MeltSources, SummaryBuilder, SummarySettings};
use crate::scrape::PageFetcher;
use crate::store;
use crate::synapse::{self, MembershipInvitation, SynapseClient};

pub const DEFAULT_PUBMED_OUTPUT: &str = "publications.csv";
pub const DEFAULT_MELT_OUTPUT: &str = "final_df.csv";
pub const DEFAULT_SUMMARY_OUTPUT: &str = "consortium_summary_iter.csv";

#[derive(Debug, Clone)]
pub struct TemplateRequest {
    pub consortium_id: String,
    pub project_name: String,
    pub team_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateResult {
    pub project_id: SynapseId,
    pub template_id: SynapseId,
    pub folders_copied: usize,
    pub files_copied: usize,
    pub view_scope_updated: bool,
}

#[derive(Debug, Clone)]
pub struct PubmedRequest {
    pub project_id: SynapseId,
    pub grant_view: Option<SynapseId>,
    pub table_name: Option<String>,
    pub table_id: Option<SynapseId>,
    pub consortium: String,
    pub output: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PubmedResult {
    pub grant_count: usize,
    pub search_count: usize,
    pub scraped_count: usize,
    pub record_count: usize,
    pub skipped: Vec<PubmedId>,
    pub unrecognized_grants: Vec<String>,
    pub table_id: Option<SynapseId>,
    pub rows_appended: usize,
    pub output_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InviteRequest {
    pub table_id: SynapseId,
    pub team_id: u64,
    pub consortium: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteResult {
    pub columns: Vec<String>,
    pub invited: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub output: Option<Utf8PathBuf>,
    pub created_before: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub project_count: usize,
    pub row_count: usize,
    pub output_path: String,
}

#[derive(Debug, Clone)]
pub struct MeltRequest {
    pub consortium: String,
    pub table_id: Option<SynapseId>,
    pub project_publication_attributes: Vec<String>,
    pub project_attributes: Vec<String>,
    pub file_attributes: Vec<String>,
    /// Publications, projects, data files, tools; configured views when empty.
    pub views: Vec<SynapseId>,
    pub output: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeltResult {
    pub project_count: usize,
    pub tool_count: usize,
    pub data_file_count: usize,
    pub row_count: usize,
    pub rows_deleted: usize,
    pub table_id: Option<SynapseId>,
    pub output_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PermitRequest {
    pub entity: SynapseId,
    pub permission: Permission,
    pub teams: Vec<u64>,
    pub sponsor_teams: bool,
    pub sponsors: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermitResult {
    pub entity: SynapseId,
    pub access_type: Vec<AccessType>,
    pub principals: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<S: SynapseClient, E: EntrezClient, F: PageFetcher> {
    config: ResolvedConfig,
    synapse: S,
    entrez: E,
    pages: F,
}

impl<S: SynapseClient, E: EntrezClient, F: PageFetcher> App<S, E, F> {
    pub fn new(config: ResolvedConfig, synapse: S, entrez: E, pages: F) -> Self {
        Self {
            config,
            synapse,
            entrez,
            pages,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn synapse(&self) -> &S {
        &self.synapse
    }

    pub fn template(
        &self,
        request: TemplateRequest,
        sink: &dyn ProgressSink,
    ) -> Result<TemplateResult, SyndccError> {
        let template_id = self.config.template_for(&request.consortium_id)?.clone();

        let start = Instant::now();
        let project_id = project::create_project(
            &self.synapse,
            &request.project_name,
            &self.config.public_principals,
            request.team_id,
            self.config.admin_team,
        )?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Create; project {} location on synapse is {project_id}",
                request.project_name
            ),
            elapsed: Some(start.elapsed()),
        });

        let start = Instant::now();
        let copied = project::copy_tree(&self.synapse, &template_id, &project_id)?;
        sink.event(ProgressEvent {
            message: format!("phase=Copy; template {template_id} copied"),
            elapsed: Some(start.elapsed()),
        });

        let view_scope_updated =
            project::add_to_view_scope(&self.synapse, &self.config.project_view, &project_id)?;
        sink.event(ProgressEvent {
            message: "phase=Scope; project view scope updated, annotations still needed"
                .to_string(),
            elapsed: None,
        });

        Ok(TemplateResult {
            project_id,
            template_id,
            folders_copied: copied.folders,
            files_copied: copied.files,
            view_scope_updated,
        })
    }

    pub fn pubmed(
        &self,
        request: PubmedRequest,
        sink: &dyn ProgressSink,
    ) -> Result<PubmedResult, SyndccError> {
        let consortium = Consortium::parse(&request.consortium);
        self.synapse.get_entity(&request.project_id)?;

        let grant_view = request
            .grant_view
            .clone()
            .unwrap_or_else(|| self.config.project_view.clone());
        sink.event(ProgressEvent {
            message: format!("phase=Grants; loading consortium view {grant_view}"),
            elapsed: None,
        });
        let view = ConsortiumView::from_frame(self.synapse.query_table(&grant_view)?.frame)?;
        let grants = view.grant_numbers();

        let start = Instant::now();
        let query = entrez::build_grant_query(&grants);
        let found = self.entrez.search_pubmed(&query)?;
        sink.event(ProgressEvent {
            message: format!("phase=Search; {} PubMed ids for {} grants", found.len(), grants.len()),
            elapsed: Some(start.elapsed()),
        });

        let pmids = match &request.table_id {
            Some(table_id) => {
                let existing = existing_publications(&self.synapse.query_table(table_id)?.frame)?;
                let fresh = found
                    .iter()
                    .filter(|pmid| !existing.contains(*pmid))
                    .cloned()
                    .collect::<Vec<_>>();
                tracing::info!(existing = existing.len(), fresh = fresh.len(), "new publications");
                fresh
            }
            None => found.clone(),
        };

        let scraper = PublicationScraper::new(&self.pages, &view, &self.config.grant_prefixes)?;
        let report = scraper.scrape_all(&pmids, sink)?;
        let frame = publications::publication_frame(&report.records, &consortium)?;

        let table_id = match (&request.table_id, &request.table_name) {
            (Some(table_id), _) => Some(table_id.clone()),
            (None, Some(name)) => {
                let schema = publications::publication_schema(&consortium);
                let table = project::create_table(&self.synapse, &request.project_id, name, &schema)?;
                tracing::info!(%table, name = %name, "publications table created");
                Some(table)
            }
            (None, None) => None,
        };
        let rows_appended = match &table_id {
            Some(table) => self.synapse.append_rows(table, &frame)?,
            None => 0,
        };

        let output_path = match (&request.output, &table_id) {
            (Some(path), _) => Some(write_output(path, &frame)?),
            (None, None) => Some(write_output(Utf8Path::new(DEFAULT_PUBMED_OUTPUT), &frame)?),
            (None, Some(_)) => None,
        };

        Ok(PubmedResult {
            grant_count: grants.len(),
            search_count: found.len(),
            scraped_count: pmids.len(),
            record_count: report.records.len(),
            skipped: report.skipped,
            unrecognized_grants: report.unrecognized_grants,
            table_id,
            rows_appended,
            output_path,
        })
    }

    pub fn invite_members(
        &self,
        request: InviteRequest,
        sink: &dyn ProgressSink,
    ) -> Result<InviteResult, SyndccError> {
        let table = self.synapse.query_table(&request.table_id)?.frame;
        let pattern = Consortium::member_pattern(&request.consortium);
        let columns = table
            .columns()
            .iter()
            .filter(|column| column.contains(&pattern))
            .cloned()
            .collect::<Vec<_>>();

        let mut members = Vec::new();
        for column in &columns {
            members.extend(table.present_values(column)?);
        }

        let mut result = InviteResult {
            columns,
            invited: Vec::new(),
            skipped: Vec::new(),
        };
        if members.is_empty() {
            sink.event(ProgressEvent {
                message: "Member list is empty".to_string(),
                elapsed: None,
            });
            return Ok(result);
        }

        for member in members {
            let Some(invitation) =
                invitation_for(request.team_id, &member, request.message.clone())
            else {
                tracing::warn!(member = %member, "not an email or profile id; skipping");
                result.skipped.push(member);
                continue;
            };
            let start = Instant::now();
            let response = self.synapse.invite(&invitation)?;
            tracing::debug!(%response, "membership invitation created");
            sink.event(ProgressEvent {
                message: format!("invited {member} to team {}", request.team_id),
                elapsed: Some(start.elapsed()),
            });
            result.invited.push(member);
        }
        Ok(result)
    }

    pub fn summary(
        &self,
        request: SummaryRequest,
        sink: &dyn ProgressSink,
    ) -> Result<SummaryResult, SyndccError> {
        let settings = SummarySettings {
            sponsor_principals: self.config.sponsor_principals.clone(),
            sponsor_institutions: self.config.sponsor_institutions.clone(),
            excluded_folders: self.config.excluded_folders.clone(),
            placeholder_files: self.config.placeholder_files.clone(),
            created_before: request
                .created_before
                .unwrap_or_else(|| self.config.summary_cutoff.clone()),
        };
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; reading {}", self.config.project_view),
            elapsed: None,
        });
        let projects = self.synapse.query_table(&self.config.project_view)?.frame;
        let publications = self.synapse.query_table(&self.config.publication_view)?.frame;

        let report = SummaryBuilder::new(&self.synapse, &settings).build(&projects, &publications, sink)?;
        let path = request
            .output
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_SUMMARY_OUTPUT));
        let output_path = write_output(&path, &report)?;

        Ok(SummaryResult {
            project_count: report.distinct("project_ids")?.len(),
            row_count: report.len(),
            output_path,
        })
    }

    pub fn meltinfo(
        &self,
        request: MeltRequest,
        sink: &dyn ProgressSink,
    ) -> Result<MeltResult, SyndccError> {
        let consortium = Consortium::parse(&request.consortium);
        let attributes = MeltAttributes::for_consortium(
            &consortium,
            request.project_publication_attributes,
            request.project_attributes,
            request.file_attributes,
        )?;
        let views = if request.views.is_empty() || consortium.has_builtin_report_layout() {
            self.config.report_views.as_vec()
        } else {
            request.views
        };
        let [publications, projects, files, tools] = <[SynapseId; 4]>::try_from(views)
            .map_err(|views| {
                SyndccError::InvalidArgument(format!(
                    "--views needs 4 ids (publications, projects, files, tools), got {}",
                    views.len()
                ))
            })?;

        let query = |id: &SynapseId| -> Result<Frame, SyndccError> {
            let start = Instant::now();
            let frame = self.synapse.query_table(id)?.frame;
            sink.event(ProgressEvent {
                message: format!("phase=Query; {id} returned {} rows", frame.len()),
                elapsed: Some(start.elapsed()),
            });
            Ok(frame)
        };
        let sources = MeltSources {
            publications: query(&publications)?,
            projects: query(&projects)?,
            files: query(&files)?,
            tools: query(&tools)?,
        };

        let report = reports::melt(
            sources,
            &attributes,
            &self.config.sponsor_institutions,
            &self.config.placeholder_files,
        )?;
        tracing::debug!(
            rows = report.project_publications.len(),
            "project publication associations"
        );

        let mut result = MeltResult {
            project_count: report.project_count,
            tool_count: report.tool_count,
            data_file_count: report.data_file_count,
            row_count: report.table.len(),
            rows_deleted: 0,
            table_id: request.table_id.clone(),
            output_path: None,
        };
        match &request.table_id {
            Some(table_id) => {
                let existing = self.synapse.query_table(table_id)?;
                result.rows_deleted =
                    self.synapse
                        .delete_rows(table_id, existing.etag.as_deref(), &existing.row_ids)?;
                self.synapse.append_rows(table_id, &report.table)?;
                if let Some(path) = &request.output {
                    result.output_path = Some(write_output(path, &report.table)?);
                }
            }
            None => {
                let path = request
                    .output
                    .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_MELT_OUTPUT));
                result.output_path = Some(write_output(&path, &report.table)?);
            }
        }
        Ok(result)
    }

    pub fn permit(
        &self,
        request: PermitRequest,
        sink: &dyn ProgressSink,
    ) -> Result<PermitResult, SyndccError> {
        if request.teams.is_empty() {
            return Err(SyndccError::InvalidArgument(
                "provide team(s) or sponsor team profile ids".to_string(),
            ));
        }
        let sponsors = if !request.sponsors.is_empty() {
            request.sponsors.clone()
        } else if request.sponsor_teams {
            self.config.sponsor_teams.clone()
        } else {
            Vec::new()
        };
        let mut principals = request.teams.clone();
        for sponsor in sponsors {
            if !principals.contains(&sponsor) {
                principals.push(sponsor);
            }
        }

        let access_type = request.permission.access_types();
        for principal in &principals {
            let start = Instant::now();
            synapse::set_permissions(&self.synapse, &request.entity, *principal, access_type.clone())?;
            sink.event(ProgressEvent {
                message: format!("granted {} on {} to {principal}", request.permission, request.entity),
                elapsed: Some(start.elapsed()),
            });
        }
        Ok(PermitResult {
            entity: request.entity,
            access_type,
            principals,
        })
    }
}

/// PubMed ids already stored in a publications table's `PubMed` column.
pub fn existing_publications(table: &Frame) -> Result<BTreeSet<PubmedId>, SyndccError> {
    Ok(table
        .present_values("PubMed")?
        .iter()
        .filter_map(|link| PubmedId::from_link(link))
        .collect())
}

/// Email invitations for values containing `@`, profile-id invitations for
/// numbers (`3334658.0` is read as `3334658`).
pub fn invitation_for(team_id: u64, member: &str, message: Option<String>) -> Option<MembershipInvitation> {
    let member = member.trim();
    let mut invitation = MembershipInvitation {
        team_id: team_id.to_string(),
        message,
        invitee_email: None,
        invitee_id: None,
    };
    if member.contains('@') {
        invitation.invitee_email = Some(member.to_string());
        return Some(invitation);
    }
    let digits = member.strip_suffix(".0").unwrap_or(member);
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    invitation.invitee_id = Some(digits.to_string());
    Some(invitation)
}

fn write_output(path: &Utf8Path, frame: &Frame) -> Result<String, SyndccError> {
    store::write_frame_atomic(path, frame)?;
    tracing::info!(path = %path, rows = frame.len(), "table written");
    Ok(path.to_string())
}
