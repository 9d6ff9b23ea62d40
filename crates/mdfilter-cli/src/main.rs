mod app;
mod host;
mod links;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use mdfilter_api::ReadingStatus;
use mdfilter_core::config::AppConfig;
use mdfilter_core::engine::SettleReport;
use mdfilter_core::events::SharedEventLog;
use mdfilter_core::models::{parse_title_id, StatusSelection};
use mdfilter_core::page::MemoryPage;
use mdfilter_core::route::Route;
use mdfilter_runtime::shell::UiEvent;

use app::App;

const SEARCH_URL: &str = "https://mangadex.org/titles";

#[derive(Parser)]
#[command(name = "mdfilter", version, about = "Filter MangaDex title search results by reading status")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Settings file holding credentials and the last filter
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show or change the MangaDex login
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Apply a filter to a page of title links and print the visible ones
    Filter {
        /// all, not-added, reading, on-hold, plan-to-read, dropped, re-reading, completed.
        /// Defaults to the last applied filter.
        status: Option<StatusSelection>,

        /// File with one title link per line ("-" or omitted: stdin)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Location of the page the links came from
        #[arg(long, default_value = SEARCH_URL)]
        url: String,

        /// Dump the filter event log to stderr afterwards
        #[arg(long)]
        events: bool,
    },
    /// Reading status of one title
    Status {
        /// Title id or title URL
        title: String,
    },
    /// Dump the status map as JSON
    Statuses {
        /// Only titles with this status
        #[arg(long, value_parser = parse_reading_status)]
        status: Option<ReadingStatus>,
    },
    /// Simulate navigating to a URL
    Navigate {
        url: String,

        /// Page links to re-filter when the URL is the search page
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    /// Save credentials; omitted fields keep their stored value
    Set {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        client_secret: Option<String>,
    },
}

fn parse_reading_status(s: &str) -> Result<ReadingStatus, String> {
    match s.parse::<StatusSelection>() {
        Ok(StatusSelection::Status(status)) => Ok(status),
        Ok(other) => Err(format!("{other} is not a reading status")),
        Err(e) => Err(e.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log_file.as_deref())?;

    let app = App::load(cli.settings.as_deref())?;

    match cli.command {
        Command::Config { action } => config(&app, action).await,
        Command::Filter {
            status,
            input,
            url,
            events,
        } => filter(&app, status, input, &url, events).await,
        Command::Status { title } => status(&app, &title).await,
        Command::Statuses { status } => {
            let map = app.client.fetch_status_map(status).await?;
            println!("{}", serde_json::to_string_pretty(&map)?);
            Ok(())
        }
        Command::Navigate { url, input } => navigate(&app, &url, input).await,
    }
}

async fn config(app: &App, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let creds = app.store.credentials();
            println!("config file:    {}", AppConfig::config_path().display());
            println!("settings file:  {}", app.settings_path.display());
            println!("username:       {}", or_unset(&creds.username));
            println!("password:       {}", masked(&creds.password));
            println!("client id:      {}", or_unset(&creds.client_id));
            println!("client secret:  {}", masked(&creds.client_secret));
            println!("last filter:    {}", app.store.last_selection());
            println!();
            print!("{}", toml::to_string_pretty(&app.config)?);
            Ok(())
        }
        ConfigAction::Set {
            username,
            password,
            client_id,
            client_secret,
        } => {
            let mut creds = app.store.credentials();
            let fields = [
                (&mut creds.username, username),
                (&mut creds.password, password),
                (&mut creds.client_id, client_id),
                (&mut creds.client_secret, client_secret),
            ];
            for (slot, value) in fields {
                if let Some(value) = value {
                    *slot = value;
                }
            }

            let (runtime, _) = app.runtime(Arc::new(MemoryPage::new()));
            runtime.handle(UiEvent::ConfigSaved(creds.clone())).await?;
            let missing = creds.missing_fields();
            if !missing.is_empty() {
                eprintln!("still missing: {}", missing.join(", "));
            }
            Ok(())
        }
    }
}

async fn filter(
    app: &App,
    status: Option<StatusSelection>,
    input: Option<PathBuf>,
    url: &str,
    events: bool,
) -> anyhow::Result<()> {
    if Route::from_location(url) != Route::Listing {
        bail!("{url} is not the title search page");
    }
    let page = Arc::new(MemoryPage::with_links(links::read_links(input.as_deref())?));
    let (runtime, _) = app.runtime(page.clone());

    let report = match status {
        None => runtime.start(url).await?,
        Some(selection) => {
            runtime.login().await;
            runtime.mount_controls(selection);
            runtime.handle(UiEvent::ApplyClicked).await?
        }
    };

    for href in page.visible_hrefs() {
        println!("{href}");
    }
    if let Some(report) = &report {
        summarize(report);
    }
    if events {
        dump_events(&runtime.engine().events());
    }
    Ok(())
}

async fn status(app: &App, title: &str) -> anyhow::Result<()> {
    let href = links::normalize_href(title);
    let id = parse_title_id(&href).with_context(|| format!("no title id in {title:?}"))?;
    let label = app
        .client
        .fetch_status(id)
        .await?
        .map(|s| s.as_str())
        .unwrap_or(StatusSelection::NotAdded.label());
    println!("{id}\t{label}");
    Ok(())
}

async fn navigate(app: &App, url: &str, input: Option<PathBuf>) -> anyhow::Result<()> {
    let links = match input {
        Some(path) => links::read_links(Some(&path))?,
        None => Vec::new(),
    };
    let page = Arc::new(MemoryPage::with_links(links));
    let (runtime, host) = app.runtime(page.clone());

    let route = Route::from_location(url);
    let report = runtime
        .handle(UiEvent::Navigated {
            url: url.to_string(),
        })
        .await?;

    println!("route:        {route:?}");
    println!("last filter:  {}", app.store.last_selection());
    println!("reloaded:     {}", host.reloads() > 0);
    if let Some(report) = &report {
        summarize(report);
        for href in page.visible_hrefs() {
            println!("{href}");
        }
    }
    Ok(())
}

fn summarize(report: &SettleReport) {
    tracing::info!(
        passes = report.passes,
        applied = report.applied,
        superseded = report.superseded,
        "filter settled"
    );
    for error in &report.errors {
        tracing::warn!(%error, "filter pass failed");
    }
}

fn dump_events(log: &SharedEventLog) {
    let entries = log.lock().map(|l| l.snapshot()).unwrap_or_default();
    for (at, event) in entries {
        eprintln!("{} {event:?}", at.format("%H:%M:%S%.3f"));
    }
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(unset)"
    } else {
        value
    }
}

fn masked(value: &str) -> &'static str {
    if value.is_empty() {
        "(unset)"
    } else {
        "********"
    }
}
