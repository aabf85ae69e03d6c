use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    InviteResult, MeltResult, PermitResult, ProgressEvent, ProgressSink, PubmedResult,
    SummaryResult, TemplateResult,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

/// Progress on stderr, result lines on stdout.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_template(result: &TemplateResult) {
        println!("project {} created from {}", result.project_id, result.template_id);
        println!(
            "copied {} folders and {} files",
            result.folders_copied, result.files_copied
        );
        if !result.view_scope_updated {
            println!("project was already in the consortium view scope");
        }
    }

    pub fn print_pubmed(result: &PubmedResult) {
        println!(
            "{} grants, {} PubMed ids, {} scraped, {} records",
            result.grant_count, result.search_count, result.scraped_count, result.record_count
        );
        if !result.skipped.is_empty() {
            let skipped = result
                .skipped
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            println!("skipped (no citation date): {}", skipped.join(", "));
        }
        for citation in &result.unrecognized_grants {
            println!("unrecognized grant citation: {citation}");
        }
        if let Some(table) = &result.table_id {
            println!("{} rows appended to {table}", result.rows_appended);
        }
        if let Some(path) = &result.output_path {
            println!("written to {path}");
        }
    }

    pub fn print_invite(result: &InviteResult) {
        if result.invited.is_empty() && result.skipped.is_empty() {
            println!("Member list is empty");
            return;
        }
        println!("{} invitations sent", result.invited.len());
        for member in &result.skipped {
            println!("skipped: {member}");
        }
    }

    pub fn print_summary(result: &SummaryResult) {
        println!(
            "{} projects, {} folder rows written to {}",
            result.project_count, result.row_count, result.output_path
        );
    }

    pub fn print_melt(result: &MeltResult) {
        println!(
            "{} projects, {} tools, {} data files, {} rows",
            result.project_count, result.tool_count, result.data_file_count, result.row_count
        );
        if let Some(table) = &result.table_id {
            println!("{} rows replaced in {table}", result.rows_deleted);
        }
        if let Some(path) = &result.output_path {
            println!("written to {path}");
        }
    }

    pub fn print_permit(result: &PermitResult) {
        let principals = result
            .principals
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        println!(
            "{} granted {:?} to {}",
            result.entity,
            result.access_type,
            principals.join(", ")
        );
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        tracing::debug!(message = %event.message, elapsed = ?event.elapsed, "progress");
    }
}
