use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use permit_desk_api::{ApiError, CollectionQuery, DeskConfig, DeskSession, PermitApiClient};
use permit_desk_core::audit_log::decode_with_report;
use permit_desk_core::record::parse_date;
use permit_desk_core::{
    DateRange, FilterSpec, PageSpec, PermitDomain, SortDirection, SortSpec, StatusCatalog,
    TransitionPolicy, ALL_KEY,
};
use serde_json::{json, Value};
use time::{Date, OffsetDateTime};
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "pd")]
#[command(about = "Permit Desk CLI")]
struct Cli {
    /// YAML file with `base_url`, `timeout_secs`, `updated_by`, `page_size`.
    #[arg(long, env = "PERMIT_DESK_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "PERMIT_DESK_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "PERMIT_DESK_ACTOR")]
    actor: Option<String>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Only allow a status to stay put, advance one stage, or be rejected.
    #[arg(long, default_value_t = false)]
    sequential: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Statuses(DomainArgs),
    List(ListArgs),
    Stats(StatsArgs),
    Show(ShowArgs),
    SetStatus(SetStatusArgs),
    History(HistoryArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DomainArg {
    Business,
    Building,
    #[value(alias = "transport")]
    Franchise,
    Barangay,
}

impl From<DomainArg> for PermitDomain {
    fn from(value: DomainArg) -> Self {
        match value {
            DomainArg::Business => Self::Business,
            DomainArg::Building => Self::Building,
            DomainArg::Franchise => Self::Franchise,
            DomainArg::Barangay => Self::Barangay,
        }
    }
}

#[derive(Debug, Args)]
struct DomainArgs {
    #[arg(long)]
    domain: DomainArg,
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[arg(long)]
    search: Option<String>,
    /// Restrict search to these fields instead of the domain defaults.
    #[arg(long = "search-field")]
    search_fields: Vec<String>,
    #[arg(long, default_value = ALL_KEY)]
    category: String,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    from: Option<String>,
    #[arg(long)]
    to: Option<String>,
    /// Anchor date for weekly/monthly buckets; defaults to today (UTC).
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long)]
    domain: DomainArg,
    #[command(flatten)]
    filter: FilterArgs,
    #[arg(long, default_value = "created_at")]
    sort: String,
    #[arg(long, default_value_t = false)]
    desc: bool,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long)]
    page_size: Option<usize>,
}

#[derive(Debug, Args)]
struct StatsArgs {
    #[arg(long)]
    domain: DomainArg,
    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Debug, Args)]
struct ShowArgs {
    #[arg(long)]
    id: String,
    /// Needed only when the id carries no domain prefix.
    #[arg(long)]
    domain: Option<DomainArg>,
}

#[derive(Debug, Args)]
struct SetStatusArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    status: String,
    /// Comment for the audit trail; required when rejecting.
    #[arg(long, default_value = "")]
    note: String,
    #[arg(long)]
    domain: Option<DomainArg>,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    /// File holding a remarks blob; `-` reads stdin.
    #[arg(long = "in")]
    input: PathBuf,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let catalog = StatusCatalog::new(if cli.sequential {
        TransitionPolicy::Sequential
    } else {
        TransitionPolicy::Permissive
    });

    match &cli.command {
        Command::Statuses(args) => run_statuses(&catalog, args.domain.into()),
        Command::History(args) => run_history(args),
        Command::List(args) => run_list(&cli, args).await,
        Command::Stats(args) => run_stats(&cli, args).await,
        Command::Show(args) => run_show(&cli, args).await,
        Command::SetStatus(args) => run_set_status(&cli, &catalog, args).await,
    }
}

fn load_config(cli: &Cli) -> Result<DeskConfig> {
    let mut config = match &cli.config {
        Some(path) => DeskConfig::load(path)?,
        None => DeskConfig::default(),
    };
    if let Some(base_url) = &cli.base_url {
        config.base_url.clone_from(base_url);
    }
    if let Some(actor) = &cli.actor {
        config.updated_by.clone_from(actor);
    }
    if cli.timeout_secs.is_some() {
        config.timeout_secs = cli.timeout_secs;
    }
    config.validate()?;
    Ok(config)
}

fn open_session(config: &DeskConfig, domain: PermitDomain) -> Result<DeskSession> {
    let client = PermitApiClient::from_config(config).map_err(describe)?;
    Ok(DeskSession::new(client, domain, config.updated_by.clone(), true))
}

fn describe(err: ApiError) -> anyhow::Error {
    let retry = if err.is_retryable() { " (retry may succeed)" } else { "" };
    anyhow!("{}{retry}", err.user_message()).context(err.to_string())
}

fn resolve_domain(explicit: Option<DomainArg>, application_id: &str) -> Result<PermitDomain> {
    explicit
        .map(PermitDomain::from)
        .or_else(|| PermitDomain::from_application_id(application_id))
        .ok_or_else(|| anyhow!("cannot infer the domain of {application_id}; pass --domain"))
}

fn parse_date_arg(flag: &str, value: &str) -> Result<Date> {
    parse_date(value).ok_or_else(|| anyhow!("--{flag} must be a date like 2024-05-31, got {value:?}"))
}

fn anchor_date(filter: &FilterArgs) -> Result<Date> {
    filter
        .as_of
        .as_deref()
        .map_or_else(|| Ok(OffsetDateTime::now_utc().date()), |value| parse_date_arg("as-of", value))
}

fn filter_spec(args: &FilterArgs) -> Result<FilterSpec> {
    let date_range = match (&args.from, &args.to) {
        (None, None) => None,
        (from, to) => {
            let start = from.as_deref().map(|value| parse_date_arg("from", value)).transpose()?;
            let end = to.as_deref().map(|value| parse_date_arg("to", value)).transpose()?;
            Some(DateRange::new(start.unwrap_or(Date::MIN), end.unwrap_or(Date::MAX))?)
        }
    };
    Ok(FilterSpec {
        search_term: args.search.clone().unwrap_or_default(),
        domain_fields: args.search_fields.clone(),
        category_key: args.category.clone(),
        date_range,
        status_key: args.status.clone(),
    })
}

fn run_statuses(catalog: &StatusCatalog, domain: PermitDomain) -> Result<()> {
    emit_json(json!({
        "domain": domain,
        "policy": catalog.policy(),
        "statuses": catalog.transitions(domain),
    }))
}

fn run_history(args: &HistoryArgs) -> Result<()> {
    let blob = if args.input.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("failed to read remarks blob from stdin")?
    } else {
        fs::read_to_string(&args.input)
            .with_context(|| format!("failed to read {}", args.input.display()))?
    };
    let report = decode_with_report(&blob);
    tracing::info!(
        entries = report.entries.len(),
        malformed_blocks = report.malformed_blocks,
        "remarks blob decoded"
    );
    let entries = report
        .entries
        .iter()
        .map(|entry| {
            json!({
                "timestamp": entry.timestamp,
                "actor": entry.display_actor(),
                "text": entry.text,
            })
        })
        .collect::<Vec<_>>();
    emit_json(json!({
        "entries": entries,
        "malformed_blocks": report.malformed_blocks,
    }))
}

async fn run_list(cli: &Cli, args: &ListArgs) -> Result<()> {
    let config = load_config(cli)?;
    let domain = PermitDomain::from(args.domain);
    let filter = filter_spec(&args.filter)?;
    let as_of = anchor_date(&args.filter)?;
    let sort = SortSpec {
        key: args.sort.clone(),
        direction: if args.desc { SortDirection::Descending } else { SortDirection::Ascending },
    };
    let page = PageSpec { page: args.page, page_size: args.page_size.unwrap_or(config.page_size) };

    let mut session = open_session(&config, domain)?;
    let fetched = session.refresh(&CollectionQuery::default()).await.map_err(describe)?;
    let view = session.view(&filter, &sort, &page, as_of);
    tracing::info!(domain = domain.as_str(), fetched, matched = view.total_count, "collection listed");

    emit_json(json!({
        "domain": domain,
        "page": view.page,
        "page_size": view.page_size,
        "total_count": view.total_count,
        "total_pages": view.total_pages,
        "per_category_counts": view.per_category_counts,
        "items": view.items,
    }))
}

async fn run_stats(cli: &Cli, args: &StatsArgs) -> Result<()> {
    let config = load_config(cli)?;
    let domain = PermitDomain::from(args.domain);
    let filter = filter_spec(&args.filter)?;
    let as_of = anchor_date(&args.filter)?;

    let mut session = open_session(&config, domain)?;
    let fetched = session.refresh(&CollectionQuery::default()).await.map_err(describe)?;
    let view = session.view(&filter, &SortSpec::default(), &PageSpec::default(), as_of);
    tracing::info!(domain = domain.as_str(), fetched, matched = view.total_count, "collection summarized");

    emit_json(json!({
        "domain": domain,
        "as_of": as_of.to_string(),
        "summary": view.summary,
        "per_category_counts": view.per_category_counts,
        "server_stats": session.server_stats(),
    }))
}

async fn run_show(cli: &Cli, args: &ShowArgs) -> Result<()> {
    let config = load_config(cli)?;
    let domain = resolve_domain(args.domain, &args.id)?;
    let mut session = open_session(&config, domain)?;
    let detail = session.open(&args.id).await.map_err(describe)?;
    emit_json(serde_json::to_value(detail)?)
}

async fn run_set_status(cli: &Cli, catalog: &StatusCatalog, args: &SetStatusArgs) -> Result<()> {
    let config = load_config(cli)?;
    let domain = resolve_domain(args.domain, &args.id)?;
    // Vocabulary and reason checks need no network round trip.
    catalog.validate(domain, &args.status, &args.note)?;

    let mut session = open_session(&config, domain)?.with_catalog(*catalog);
    let updated = session.change_status(&args.id, &args.status, &args.note).await.map_err(describe)?;
    let history = decode_with_report(updated.remarks_blob()).entries;
    tracing::info!(application_id = %updated.application_id, status = %updated.status, "status updated");

    emit_json(json!({
        "application_id": updated.application_id,
        "status": updated.status,
        "updated_by": config.updated_by,
        "history": history,
    }))
}
