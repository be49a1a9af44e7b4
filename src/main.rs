use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gameshelf::api::ApiServer;
use gameshelf::database_ops::db::Db;
use gameshelf::database_ops::steam::batch::{self, BatchOptions};
use gameshelf::database_ops::steam::client::SteamClient;
use gameshelf::database_ops::steam::denylist::Denylist;
use gameshelf::database_ops::steam::import::Importer;
use gameshelf::util::env as env_util;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "gameshelf", about = "Personal game-library tracker: Steam import pipeline + catalog API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve,
    /// Import a single app by its Steam appid
    ImportApp {
        appid: i64,
    },
    /// Import one page of the owned-games list
    ImportOwned {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 25)]
        limit: usize,
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        #[arg(long, default_value_t = 0)]
        group_delay_ms: u64,
        #[arg(long, default_value_t = 10_000)]
        backoff_delay_ms: u64,
        /// Include bounded per-reason debug samples in the report
        #[arg(long)]
        verbose: bool,
        /// Overrides STEAM_USER_ID
        #[arg(long)]
        steam_id: Option<String>,
        /// Overrides STEAM_API_KEY
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    gameshelf::tracing::init_tracing("info,sqlx=warn")?;

    let cli = Cli::parse();

    let database_url = env_util::db_url().context("DATABASE_URL not configured")?;
    let max_conns: u32 = env_util::env_parse("DB_MAX_CONNS", 10u32);
    let db = Db::connect(&database_url, max_conns)
        .await
        .context("Db::connect failed")?;

    match cli.command {
        Command::Serve => {
            let server = ApiServer::from_env()?;
            server.run(db).await?;
        }
        Command::ImportApp { appid } => {
            let importer = build_importer(db);
            let outcome = importer.import_one(appid).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::ImportOwned {
            offset,
            limit,
            concurrency,
            group_delay_ms,
            backoff_delay_ms,
            verbose,
            steam_id,
            api_key,
        } => {
            let api_key = api_key
                .or_else(|| env_util::env_opt("STEAM_API_KEY"))
                .context("missing api key: pass --api-key or set STEAM_API_KEY")?;
            let steam_id = steam_id
                .or_else(|| env_util::env_opt("STEAM_USER_ID"))
                .context("missing account id: pass --steam-id or set STEAM_USER_ID")?;
            let importer = build_importer(db);
            let opts = BatchOptions {
                offset,
                limit,
                concurrency,
                group_delay_ms,
                backoff_delay_ms,
                verbose,
            };
            let page = batch::run_page(&importer, &api_key, &steam_id, &opts).await?;
            info!(
                processed = page.processed,
                imported = page.imported_count,
                skipped = page.skipped_count,
                errors = page.error_count,
                next_offset = page.next_offset,
                has_more = page.has_more,
                "owned-list import page complete"
            );
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
    }

    Ok(())
}

fn build_importer(db: Db) -> Importer {
    let denylist = Arc::new(Denylist::from_env());
    if !denylist.is_empty() {
        info!(entries = denylist.len(), "denylist loaded");
    }
    Importer::new(db, SteamClient::new(), denylist)
}
