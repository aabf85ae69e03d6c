use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use syndccutils::app::{
    App, InviteRequest, MeltRequest, PermitRequest, ProgressSink, PubmedRequest, SummaryRequest,
    TemplateRequest,
};
use syndccutils::config::ConfigLoader;
use syndccutils::domain::{Permission, SynapseId};
use syndccutils::entrez::EntrezHttpClient;
use syndccutils::error::SyndccError;
use syndccutils::output::{ConsoleOutput, JsonOutput, OutputMode};
use syndccutils::scrape::HttpPageFetcher;
use syndccutils::synapse::SynapseHttpClient;

#[derive(Parser)]
#[command(name = "syndccutils")]
#[command(about = "Synapse consortium administration: templates, publications, invitations and reports")]
#[command(version, author)]
struct Cli {
    /// Print full diagnostics and debug logs.
    #[arg(long, global = true)]
    debug: bool,

    /// Print the command result as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// JSON config file (defaults to ./syndccutils.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a consortium project from a template")]
    Template(TemplateArgs),
    #[command(about = "Scrape PubMed publications citing consortium grants")]
    Pubmed(PubmedArgs),
    #[command(about = "Invite members listed in a table to a team")]
    Invitemembers(InviteArgs),
    #[command(about = "Per-project folder, team and publication summary")]
    Summary(SummaryArgs),
    #[command(about = "Build the consortium master table of projects and files")]
    Meltinfo(MeltArgs),
    #[command(about = "Grant teams a permission on an entity")]
    Permit(PermitArgs),
}

#[derive(Args)]
struct TemplateArgs {
    /// Consortium grant type, e.g. U54 or U01.
    #[arg(long)]
    consortium_id: String,

    #[arg(long)]
    project_name: String,

    #[arg(long)]
    team_id: Option<u64>,
}

#[derive(Args)]
struct PubmedArgs {
    /// Project that owns the publications table.
    #[arg(long)]
    project_id: String,

    /// View listing project grant numbers (defaults to the consortium project view).
    #[arg(long)]
    grantview_id: Option<String>,

    /// Create a new publications table with this name.
    #[arg(long)]
    table_name: Option<String>,

    /// Append new publications to this existing table.
    #[arg(long)]
    table_id: Option<String>,

    /// Consortium name, e.g. csbc or pson.
    #[arg(long)]
    name: String,

    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct InviteArgs {
    #[arg(long)]
    table_id: String,

    #[arg(long)]
    team_id: u64,

    /// Consortium name; selects the member columns.
    #[arg(long)]
    name: String,

    #[arg(long)]
    message: Option<String>,
}

#[derive(Args)]
struct SummaryArgs {
    #[arg(long)]
    output: Option<Utf8PathBuf>,

    /// Only count files created at or before this ISO-8601 timestamp.
    #[arg(long)]
    created_before: Option<String>,
}

#[derive(Args)]
struct MeltArgs {
    /// Replace the rows of this table with the result.
    #[arg(long)]
    table_id: Option<String>,

    #[arg(long, num_args = 1..)]
    project_publication_attribute: Vec<String>,

    #[arg(long, num_args = 1..)]
    project_attribute: Vec<String>,

    #[arg(long, num_args = 1..)]
    file_attribute: Vec<String>,

    /// Publications, projects, data files and tools view ids, in that order.
    #[arg(long, num_args = 4)]
    views: Vec<String>,

    /// Consortium name; csbc, pson and csbc pson use built-in attributes.
    #[arg(long)]
    name: String,

    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct PermitArgs {
    #[arg(long)]
    entity: String,

    /// read (or view), download or edit.
    #[arg(long)]
    permission: String,

    #[arg(long, num_args = 1.., required = true)]
    teams: Vec<u64>,

    /// Also grant the consortium sponsor teams.
    #[arg(long)]
    csbcteam: bool,

    /// Sponsor profile ids; replaces the --csbcteam list.
    #[arg(long, num_args = 1..)]
    sponsors: Vec<u64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = cli.debug;
    init_tracing(debug);

    if let Err(report) = run(cli) {
        if debug {
            eprintln!("{report:?}");
        } else {
            eprintln!("error: {report}");
        }
        if let Some(error) = report.downcast_ref::<SyndccError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn map_exit_code(error: &SyndccError) -> u8 {
    match error {
        SyndccError::InvalidSynapseId(_)
        | SyndccError::InvalidPubmedId(_)
        | SyndccError::InvalidPermission(_)
        | SyndccError::UnknownConsortium(_)
        | SyndccError::InvalidArgument(_)
        | SyndccError::MissingCredentials
        | SyndccError::ConfigRead(_)
        | SyndccError::ConfigParse(_) => 2,
        SyndccError::SynapseHttp(_)
        | SyndccError::SynapseStatus { .. }
        | SyndccError::SynapseJobTimeout { .. }
        | SyndccError::EntrezHttp(_)
        | SyndccError::EntrezStatus { .. }
        | SyndccError::PageHttp(_)
        | SyndccError::PageStatus { .. }
        | SyndccError::MissingPageSection { .. } => 3,
        _ => 1,
    }
}

fn run(cli: Cli) -> miette::Result<()> {
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let synapse = SynapseHttpClient::from_environment()?;
    let entrez = EntrezHttpClient::new(config.entrez.clone())?;
    let pages = HttpPageFetcher::new()?;
    let app = App::new(config, synapse, entrez, pages);
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &ConsoleOutput,
    };

    match cli.command {
        Commands::Template(args) => {
            let result = app.template(
                TemplateRequest {
                    consortium_id: args.consortium_id,
                    project_name: args.project_name,
                    team_id: args.team_id,
                },
                sink,
            )?;
            emit(output_mode, &result, ConsoleOutput::print_template)
        }
        Commands::Pubmed(args) => {
            if args.table_id.is_some() && args.table_name.is_some() {
                return Err(SyndccError::InvalidArgument(
                    "--table-id and --table-name are mutually exclusive".to_string(),
                )
                .into());
            }
            let result = app.pubmed(
                PubmedRequest {
                    project_id: args.project_id.parse()?,
                    grant_view: parse_optional_id(args.grantview_id)?,
                    table_name: args.table_name,
                    table_id: parse_optional_id(args.table_id)?,
                    consortium: args.name,
                    output: args.output,
                },
                sink,
            )?;
            emit(output_mode, &result, ConsoleOutput::print_pubmed)
        }
        Commands::Invitemembers(args) => {
            let result = app.invite_members(
                InviteRequest {
                    table_id: args.table_id.parse()?,
                    team_id: args.team_id,
                    consortium: args.name,
                    message: args.message,
                },
                sink,
            )?;
            emit(output_mode, &result, ConsoleOutput::print_invite)
        }
        Commands::Summary(args) => {
            let result = app.summary(
                SummaryRequest {
                    output: args.output,
                    created_before: args.created_before,
                },
                sink,
            )?;
            emit(output_mode, &result, ConsoleOutput::print_summary)
        }
        Commands::Meltinfo(args) => {
            let views = args
                .views
                .iter()
                .map(|id| id.parse::<SynapseId>())
                .collect::<Result<Vec<_>, _>>()?;
            let result = app.meltinfo(
                MeltRequest {
                    consortium: args.name,
                    table_id: parse_optional_id(args.table_id)?,
                    project_publication_attributes: args.project_publication_attribute,
                    project_attributes: args.project_attribute,
                    file_attributes: args.file_attribute,
                    views,
                    output: args.output,
                },
                sink,
            )?;
            emit(output_mode, &result, ConsoleOutput::print_melt)
        }
        Commands::Permit(args) => {
            let result = app.permit(
                PermitRequest {
                    entity: args.entity.parse()?,
                    permission: args.permission.parse::<Permission>()?,
                    teams: args.teams,
                    sponsor_teams: args.csbcteam,
                    sponsors: args.sponsors,
                },
                sink,
            )?;
            emit(output_mode, &result, ConsoleOutput::print_permit)
        }
    }
}

fn emit<T: Serialize>(output_mode: OutputMode, result: &T, human: fn(&T)) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print(result).into_diagnostic(),
        OutputMode::Human => {
            human(result);
            Ok(())
        }
    }
}

fn parse_optional_id(value: Option<String>) -> Result<Option<SynapseId>, SyndccError> {
    value.map(|id| id.parse()).transpose()
}
