use clap::Parser;
use rank_scoring_engine::{
    args::{Args, Command},
    config::ScoringConfig,
    database::db::DbClient,
    error::Result,
    model::processor::ScoringEngine
};
use serde::Serialize;
use std::{process, sync::Arc};
use tracing::{error, info};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let client = match DbClient::connect(&args.connection_string).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(args.command, client).await {
        error!("{}", e);
        process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    let indicatif_layer = IndicatifLayer::new();
    let filter = EnvFilter::try_new(format!("rank_scoring_engine={}", log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

async fn run(command: Command, client: DbClient) -> Result<()> {
    match command {
        Command::InitDb => client.ensure_schema().await,
        Command::Process { date } => {
            let report = engine(client)?.process_date(date).await?;
            print_json(&report)
        }
        Command::Reactivate { player_id, score, date } => {
            match engine(client)?.reactivate_player(player_id, score, date).await? {
                Some(entry) => print_json(&entry),
                None => {
                    info!("Player {} is not deactivated, nothing changed", player_id);
                    Ok(())
                }
            }
        }
    }
}

fn engine(client: DbClient) -> Result<ScoringEngine<DbClient>> {
    let config = ScoringConfig::from_env()?;
    info!("Scoring with {:?}", config);

    Ok(ScoringEngine::with_config(Arc::new(client), config).with_progress(true))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
