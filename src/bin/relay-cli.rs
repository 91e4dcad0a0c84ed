//! Operator-facing CLI surface (§6): start the consumer pool's ambient
//! recovery sweep, run one sweep pass on demand, or print a health snapshot.
//! Subscriptions themselves are declared by embedding `relay` as a library
//! and calling `RelayContext::start_pool` with application-specific
//! `Subscriber`s — this binary has none of its own to register.

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use relay::{health::HealthReport, RelayContext};
use relay_config::RelayConfig;

#[derive(Parser)]
#[command(name = "relay-cli", about = "Operate the relay outbox/inbox pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile topology and run the recovery sweep until interrupted.
    PoolStart,
    /// Run one recovery-sweep pass and exit.
    OutboxSweep,
    /// Print a JSON health snapshot and exit.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).json().init();

    let cli = Cli::parse();
    let config = RelayConfig::from_env()?;

    match cli.command {
        Command::PoolStart => pool_start(config).await,
        Command::OutboxSweep => outbox_sweep(config).await,
        Command::Health => health(config).await,
    }
}

async fn pool_start(config: RelayConfig) -> anyhow::Result<()> {
    let ctx = RelayContext::connect(config).await?;
    ctx.topology.ensure_streams().await?;

    let (tx, rx) = watch::channel(false);
    let sweep_handle = ctx.spawn_recovery_sweep(rx);

    tokio::signal::ctrl_c().await?;
    let _ = tx.send(true);
    sweep_handle.await?;
    Ok(())
}

async fn outbox_sweep(config: RelayConfig) -> anyhow::Result<()> {
    let ctx = RelayContext::connect(config).await?;
    let report = ctx.recovery_sweep.run_once().await?;
    println!("{}", serde_json::json!({ "reset_count": report.reset_count }));
    Ok(())
}

async fn health(config: RelayConfig) -> anyhow::Result<()> {
    let ctx = RelayContext::connect(config).await?;
    let report =
        HealthReport::collect(&ctx.config, ctx.broker.as_ref(), ctx.outbox_store.as_ref(), ctx.inbox_store.as_ref(), &[])
            .await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
