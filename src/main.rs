//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `crawl_store` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - User-facing output formatting
//!
//! All store access goes through the library managers.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use mongodb::bson::{Bson, Document};
use std::process;
use tokio_util::sync::CancellationToken;

use crawl_store::app::{shutdown_gracefully, spawn_ctrl_c_listener};
use crawl_store::config::{Command, Opt, CHECK_STATEMENT};
use crawl_store::initialization::init_logger_with;
use crawl_store::{DocumentManager, RelationalManager, SqlParams};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    // Try loading from current directory first, then from the executable's directory
    if dotenvy::dotenv().is_err() {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let env_path = exe_dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                }
            }
        }
    }

    let opt = Opt::parse();

    init_logger_with(opt.log_level.clone().into(), opt.log_format.clone())
        .context("Failed to initialize logger")?;

    let stop = CancellationToken::new();
    let signal_task = spawn_ctrl_c_listener(stop.clone());

    let documents = opt
        .mongo
        .settings()
        .map(|settings| DocumentManager::from_settings(stop.clone(), &settings));
    let relational = match opt.mysql.settings() {
        Some(settings) => Some(
            RelationalManager::from_settings(stop.clone(), &settings)
                .with_context(|| format!("Invalid SQL settings {settings}"))?,
        ),
        None => None,
    };

    let outcome = run(&opt.command, documents.as_ref(), relational.as_ref()).await;

    shutdown_gracefully(stop, Some(signal_task), documents.as_ref(), relational.as_ref()).await;

    if let Err(e) = outcome {
        eprintln!("crawl_store error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(
    command: &Command,
    documents: Option<&DocumentManager>,
    relational: Option<&RelationalManager>,
) -> Result<()> {
    match command {
        Command::Check { collection } => check(collection, documents, relational).await,
        Command::Sql {
            statement,
            params,
            execute,
        } => {
            let manager = relational.context("No SQL database configured (set --mysql-db or MYSQL_DB)")?;
            manager.init().await.context("Failed to connect to the SQL store")?;
            let params: SqlParams = params.iter().cloned().collect();
            let params = (!params.is_empty()).then_some(&params);
            if *execute {
                manager
                    .execute(statement, params)
                    .await
                    .context("Statement failed")?;
                println!("✅ Statement committed");
            } else {
                let rows = manager
                    .fetchall(statement, params)
                    .await
                    .context("Query failed")?;
                for row in &rows {
                    println!("{}", serde_json::to_string(row)?);
                }
                info!("{} row(s)", rows.len());
            }
            Ok(())
        }
        Command::Find { collection, filter } => {
            let manager =
                documents.context("No MongoDB database configured (set --mongo-db or MONGODB_DB)")?;
            let filter = parse_filter(filter)?;
            manager.init().await.context("Failed to connect to MongoDB")?;
            match manager
                .find_one(collection, filter)
                .await
                .context("find_one failed")?
            {
                Some(document) => println!("{}", Bson::Document(document).into_relaxed_extjson()),
                None => println!("null"),
            }
            Ok(())
        }
    }
}

async fn check(
    collection: &str,
    documents: Option<&DocumentManager>,
    relational: Option<&RelationalManager>,
) -> Result<()> {
    if documents.is_none() && relational.is_none() {
        bail!("No store configured; set MONGODB_DB and/or MYSQL_DB");
    }
    if let Some(manager) = documents {
        manager.init().await.context("Failed to connect to MongoDB")?;
        manager
            .find_one(collection, Document::new())
            .await
            .context("MongoDB check failed")?;
        println!("✅ MongoDB reachable ({})", manager.connector().settings().database);
    }
    if let Some(manager) = relational {
        manager.init().await.context("Failed to connect to the SQL store")?;
        manager
            .fetchone(CHECK_STATEMENT, None)
            .await
            .context("SQL check failed")?;
        println!("✅ SQL reachable ({})", manager.connector().redacted_url());
    }
    Ok(())
}

fn parse_filter(raw: &str) -> Result<Document> {
    let value: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("Filter is not valid JSON: {raw}"))?;
    match Bson::try_from(value).context("Filter is not valid extended JSON")? {
        Bson::Document(document) => Ok(document),
        other => bail!("Filter must be a JSON object, got {other}"),
    }
}
