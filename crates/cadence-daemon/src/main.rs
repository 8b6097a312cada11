use std::time::Duration;

use cadence_core::config::CadenceConfig;
use cadence_host::{deferred, Host};
use cadence_ranking::{scores::ScoreBook, RankJob};
use cadence_scheduler::{
    types::{ConfigureArgs, OperationFlagArgs, OperationIdArgs},
    OperationRegistry, SchedulerContract, SELF_CALL_INTERVAL_PARAM,
};
use clap::Parser;
use serde_json::json;
use tracing::info;

mod app;
mod cli;

use app::{open_host, push};
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > CADENCE_CONFIG env > ~/.cadence/cadence.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("CADENCE_CONFIG").ok());
    let config = CadenceConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        CadenceConfig::default()
    });

    let mut host = open_host(&config)?;
    let admin = config.scheduler.admin.clone();
    let scheduler = config.scheduler.identity.clone();
    let ranking = config.ranking.identity.clone();

    match cli.cmd {
        Command::Run { start } => {
            if start {
                push(&mut host, &admin, &scheduler, "start", &json!({}))?;
            }
            run(host, &config).await?;
        }
        Command::Configure {
            id,
            action,
            target,
            period,
            start_time,
        } => {
            let args = ConfigureArgs {
                id,
                action,
                target,
                period,
                start_time,
            };
            push(&mut host, &admin, &scheduler, "configure", &args)?;
            println!("configured {}", args.id);
        }
        Command::Pause { id, resume } => {
            let args = OperationFlagArgs { id, flag: !resume };
            push(&mut host, &admin, &scheduler, "pause", &args)?;
        }
        Command::Protect { id, off } => {
            let args = OperationFlagArgs { id, flag: !off };
            push(&mut host, &admin, &scheduler, "protect", &args)?;
        }
        Command::Remove { id } => {
            push(&mut host, &admin, &scheduler, "remove", &OperationIdArgs { id })?;
        }
        Command::Confirm { id } => {
            push(&mut host, &admin, &scheduler, "confirm", &OperationIdArgs { id })?;
        }
        Command::Start => {
            push(&mut host, &admin, &scheduler, "start", &json!({}))?;
            print_state(&host, &config)?;
        }
        Command::Stop => {
            push(&mut host, &admin, &scheduler, "cancel", &json!({}))?;
            print_state(&host, &config)?;
        }
        Command::Reset => {
            push(&mut host, &admin, &scheduler, "reset", &json!({}))?;
            print_operations(&host)?;
        }
        Command::UpdateOps => {
            push(&mut host, &admin, &scheduler, "updateops", &json!({}))?;
            print_operations(&host)?;
        }
        Command::List => {
            print_state(&host, &config)?;
            print_operations(&host)?;
            print_deferred(&host)?;
        }
        Command::Rank { job } => {
            let job = job.job();
            push(&mut host, &admin, &ranking, job.start_action, &json!({}))?;
            println!("rank scan of {} requested", job.name);
        }
        Command::ResetScan { job } => {
            let job = job.job();
            push(&mut host, &admin, &ranking, "resetscan", &json!({ "job": job.name }))?;
        }
        Command::SetScore {
            job,
            account,
            score,
        } => {
            ScoreBook::new(host.conn(), job.job()).set_score(&account, score)?;
        }
        Command::Ranks { job } => {
            print_ranks(&host, job.job())?;
        }
        Command::SetInterval { secs } => {
            cadence_host::settings::set(host.conn(), SELF_CALL_INTERVAL_PARAM, secs)?;
        }
    }
    Ok(())
}

/// Poll deferred calls until ctrl-c.
async fn run(host: Host, config: &CadenceConfig) -> anyhow::Result<()> {
    let poll = Duration::from_millis(config.host.poll_interval_ms.max(1));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { host.run(poll, shutdown_rx).await });

    info!("Cadence host running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}

fn print_state(host: &Host, config: &CadenceConfig) -> anyhow::Result<()> {
    let state = SchedulerContract::state(host.conn(), &config.scheduler.identity)?;
    println!("scheduler: {state}");
    Ok(())
}

fn print_operations(host: &Host) -> anyhow::Result<()> {
    let ops = OperationRegistry::new(host.conn()).list()?;
    if ops.is_empty() {
        println!("no operations");
        return Ok(());
    }
    let now = host.now();
    println!(
        "{:<16} {:<16} {:<12} {:>8}  {:<20} {}",
        "ID", "TARGET", "ACTION", "PERIOD", "LAST RUN", "FLAGS"
    );
    for op in ops {
        let mut flags = Vec::new();
        if op.paused {
            flags.push("paused");
        }
        if op.protected {
            flags.push("protected");
        }
        if op.is_ready(now) {
            flags.push("ready");
        }
        println!(
            "{:<16} {:<16} {:<12} {:>8}  {:<20} {}",
            op.id.as_str(),
            op.target.as_str(),
            op.action.as_str(),
            op.period,
            timestamp(op.last_run),
            flags.join(",")
        );
    }
    Ok(())
}

fn print_ranks(host: &Host, job: &'static RankJob) -> anyhow::Result<()> {
    let entries = ScoreBook::new(host.conn(), job).list()?;
    if entries.is_empty() {
        println!("no {} scores", job.name);
        return Ok(());
    }
    println!("{:<16} {:>12} {:>8}", "ACCOUNT", "SCORE", "RANK");
    for entry in entries {
        println!(
            "{:<16} {:>12} {:>8}",
            entry.account.as_str(),
            entry.score,
            format_rank(entry.rank)
        );
    }
    Ok(())
}

/// Basis points as a percentage with two decimals.
fn format_rank(bps: u64) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

fn print_deferred(host: &Host) -> anyhow::Result<()> {
    for call in deferred::list(host.conn())? {
        println!(
            "deferred: {} -> {}::{} due {}",
            call.owner,
            call.request.target,
            call.request.action,
            timestamp(call.due_at)
        );
    }
    Ok(())
}

fn timestamp(secs: u64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}
