use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{info, warn};

use strava_export::{
    args::{Args, Command, SyncArgs},
    ask::{self, ChatCompletionsAgent},
    auth,
    cfg::{self, Cfg},
    job,
    strava::{AccountSummary, StravaApi},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;
    load_env_file(args.env_file.as_deref())?;

    info!("Starting strava_export");

    let cfg = Cfg::load(&args)?;
    cfg.validate()?;

    match args.command() {
        Command::Sync(sync_args) => run_sync(&cfg, &sync_args).await?,
        Command::Stats => {
            let api = connect(&cfg).await?;
            print_summary(&api.account_summary().await?);
        }
        Command::Ask { question } => {
            let api_key = cfg::agent_api_key_from_env()?;
            let agent = ChatCompletionsAgent::new(
                &cfg.agent.base_url,
                cfg.agent.model.clone(),
                api_key,
                cfg.agent.max_rows,
            );
            let answer = ask::ask(&agent, Path::new(&cfg.output_csv.path), &question).await?;
            println!("{answer}");
        }
    }

    info!("strava_export completed successfully");
    Ok(())
}

async fn connect(cfg: &Cfg) -> Result<StravaApi> {
    // Credentials are checked before any request goes out.
    let credentials = cfg::credentials_from_env()?;
    let session = auth::establish_session(&cfg.token_url, &credentials).await?;
    Ok(StravaApi::new(&cfg.api_base_url, session))
}

async fn run_sync(cfg: &Cfg, sync_args: &SyncArgs) -> Result<()> {
    let api = connect(cfg).await?;

    if !sync_args.skip_stats {
        match api.account_summary().await {
            Ok(summary) => print_summary(&summary),
            Err(e) => {
                warn!("Stats lookup failed: {}", e);
                println!("Failed to retrieve stats.");
            }
        }
    }

    if !sync_args.yes && !confirm("Do you want to refresh the data? y/n")? {
        println!("no updates");
        return Ok(());
    }

    let result = job::run_job(cfg, api).await?;
    if result.rate_limited {
        println!("Rate limit exceeded. Stopped early; run again later to continue.");
    }
    println!("{}", result.summary());
    Ok(())
}

fn print_summary(summary: &AccountSummary) {
    let name = [
        summary.athlete.firstname.as_deref(),
        summary.athlete.lastname.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");
    println!("Athlete Details: {} (id {})", name, summary.athlete.id);
    println!("Athlete Stats:");
    match serde_json::to_string_pretty(&summary.stats) {
        Ok(pretty) => println!("{pretty}"),
        Err(_) => println!("{}", summary.stats),
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}

fn load_env_file(path: Option<&str>) -> Result<()> {
    match path {
        Some(p) => {
            dotenvy::from_path(p)?;
            info!("Loaded environment from {}", p);
        }
        // Best-effort .env load; ignore if missing
        None => {
            let _ = dotenvy::dotenv();
        }
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match level {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_writer(io::stderr)
        .init();

    Ok(())
}
