//! Command-line options.
//!
//! Every connection flag can also come from the environment (or a `.env` file loaded
//! before parsing), which is how crawler deployments usually supply credentials.

use clap::{Args, Parser, Subcommand};

use crate::config::constants::{
    CHECK_COLLECTION, DEFAULT_MONGODB_URI, DEFAULT_MYSQL_HOST, DEFAULT_MYSQL_PORT,
    DEFAULT_SQL_SCHEME,
};
use crate::config::types::{LogFormat, LogLevel, MongoSettings, MysqlSettings};
use crate::storage::relational::SqlValue;

/// Command-line options and configuration.
///
/// # Examples
///
/// ```bash
/// # Check both stores
/// crawl_store --mongo-db crawl --mysql-db crawl check
///
/// # Run a query with named parameters
/// crawl_store --mysql-db crawl sql "SELECT * FROM pages WHERE host = :host" --param host=example.com
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "crawl_store",
    about = "Resilient MongoDB / MySQL access for crawlers."
)]
pub struct Opt {
    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain, global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub mongo: MongoArgs,

    #[command(flatten)]
    pub mysql: MysqlArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Document store flags.
#[derive(Debug, Args)]
pub struct MongoArgs {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = DEFAULT_MONGODB_URI)]
    pub mongo_uri: String,

    /// MongoDB database name (document store is disabled when unset)
    #[arg(long, env = "MONGODB_DB")]
    pub mongo_db: Option<String>,
}

impl MongoArgs {
    /// Settings for the document store, if a database was configured.
    pub fn settings(&self) -> Option<MongoSettings> {
        self.mongo_db
            .as_ref()
            .map(|db| MongoSettings::new(self.mongo_uri.clone(), db.clone()))
    }
}

/// Relational store flags.
#[derive(Debug, Args)]
pub struct MysqlArgs {
    /// URL scheme selecting the SQL driver
    #[arg(long, env = "SQL_SCHEME", default_value = DEFAULT_SQL_SCHEME)]
    pub sql_scheme: String,

    #[arg(long, env = "MYSQL_HOST", default_value = DEFAULT_MYSQL_HOST)]
    pub mysql_host: String,

    #[arg(long, env = "MYSQL_PORT", default_value_t = DEFAULT_MYSQL_PORT)]
    pub mysql_port: u16,

    #[arg(long, env = "MYSQL_USER", default_value = "root")]
    pub mysql_user: String,

    #[arg(long, env = "MYSQL_PASSWORD", default_value = "", hide_env_values = true)]
    pub mysql_password: String,

    /// MySQL database name (relational store is disabled when unset)
    #[arg(long, env = "MYSQL_DB")]
    pub mysql_db: Option<String>,
}

impl MysqlArgs {
    /// Settings for the relational store, if a database was configured.
    pub fn settings(&self) -> Option<MysqlSettings> {
        self.mysql_db.as_ref().map(|db| {
            let mut settings = MysqlSettings::new(
                self.mysql_host.clone(),
                self.mysql_port,
                self.mysql_user.clone(),
                self.mysql_password.clone(),
                db.clone(),
            );
            settings.scheme = self.sql_scheme.clone();
            settings
        })
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to every configured store and run a trivial operation against it
    Check {
        /// Collection used for the document store check
        #[arg(long, default_value = CHECK_COLLECTION)]
        collection: String,
    },
    /// Run a SQL statement through the relational manager
    Sql {
        /// Statement text; `:name` placeholders are bound from --param
        statement: String,

        /// Named parameter as name=value (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, SqlValue)>,

        /// Commit the statement instead of fetching rows
        #[arg(long)]
        execute: bool,
    },
    /// Fetch one document from a collection
    Find {
        collection: String,

        /// Filter as a JSON object
        #[arg(long, default_value = "{}")]
        filter: String,
    },
}

/// Parses `name=value`, inferring integers, floats, booleans and `null`.
pub fn parse_param(raw: &str) -> Result<(String, SqlValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name is empty in `{raw}`"));
    }
    let value = if value == "null" {
        SqlValue::Null
    } else if let Ok(i) = value.parse::<i64>() {
        SqlValue::Int(i)
    } else if let Ok(f) = value.parse::<f64>() {
        SqlValue::Float(f)
    } else if let Ok(b) = value.parse::<bool>() {
        SqlValue::Bool(b)
    } else {
        SqlValue::Text(value.to_string())
    };
    Ok((name.to_string(), value))
}
