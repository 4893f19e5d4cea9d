//! CLI front-end: the `load`/`help` command surface that drives a run.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::catalog::{run_catalog, RunOptions};
use crate::config::{load_config_from_path, TableConfigEntry};
use crate::db::DbConn;
use crate::errors::Result;
use crate::extract::{Extractor, Source};

const LDP_CATALOG_SCHEMAS: &[&str] = &["ldp_catalog", "history", "local"];

#[derive(Parser, Debug)]
#[command(
    name = "ldp-stage",
    version,
    about = "Two-pass JSON-to-relational staging pipeline: infer a schema, load typed rows, publish atomically.",
    long_about = "Pulls paginated JSON records from a tenant HTTP service, infers a column \
schema from a corpus of page files, writes typed batched SQL inserts, builds \
indexes, and atomically publishes the loaded table, per table in its own \
transaction."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full table catalog for this invocation.
    Load(LoadArgs),
    /// Print extended usage and exit.
    Help,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Direct single-source override: stage one ad hoc table from this file,
    /// bypassing the configured catalog.
    #[arg(long, value_name = "FILE")]
    pub source: Option<PathBuf>,

    /// YAML run configuration.
    #[arg(long, value_name = "FILE", default_value = "ldp.yaml")]
    pub config: PathBuf,

    /// Load from an already-populated staging directory instead of
    /// extracting from the tenant service; also honors `<table>_test.json`.
    #[arg(long, value_name = "DIR")]
    pub sourcedir: Option<PathBuf>,

    /// Disable TLS certificate verification on the extraction client and
    /// the database connection.
    #[arg(long)]
    pub nossl: bool,

    /// Keep the staging directory after the run instead of deleting it.
    #[arg(long)]
    pub savetemps: bool,

    /// Skip the config's role/grant validation. Dangerous; local
    /// development only.
    #[arg(long = "unsafe")]
    pub unsafe_mode: bool,

    /// Raise the tracing filter to `info` regardless of `LDP_LOG_LEVEL`.
    #[arg(short, long)]
    pub verbose: bool,

    /// Raise the tracing filter to `debug` regardless of `LDP_LOG_LEVEL`.
    #[arg(long)]
    pub debug: bool,
}

pub async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Help => {
            print_help();
            Ok(0)
        }
        Command::Load(args) => run_load(args).await,
    }
}

fn print_help() {
    println!(
        "ldp-stage load [--source FILE] [--config FILE] [--sourcedir DIR] \
[--nossl] [--savetemps] [--unsafe] [--verbose] [--debug]\n\
ldp-stage help\n\n\
Runs the fixed table catalog from a YAML run configuration, staging each \
table inside its own transaction: extract or read staged pages, infer a \
column schema, load typed rows, index, and publish."
    );
}

async fn run_load(args: LoadArgs) -> Result<i32> {
    if args.debug {
        std::env::set_var("LDP_LOG_LEVEL", "debug");
    } else if args.verbose {
        std::env::set_var("LDP_LOG_LEVEL", "info");
    }

    let mut config = load_config_from_path(&args.config)?;

    if let Some(source_file) = &args.source {
        let table_name = source_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("adhoc_table")
            .to_string();
        config.tables = vec![TableConfigEntry {
            table_name,
            module_name: "mod-adhoc".into(),
            source_path: source_file.display().to_string(),
        }];
    }

    let use_sourcedir = args.sourcedir.is_some();
    let staging_dir = args
        .sourcedir
        .clone()
        .unwrap_or_else(|| config.staging_dir.clone());
    tokio::fs::create_dir_all(&staging_dir).await?;

    if let Some(source_file) = &args.source {
        if !use_sourcedir {
            let table_name = &config.tables[0].table_name;
            let bytes = tokio::fs::read(source_file).await?;
            tokio::fs::write(staging_dir.join(format!("{table_name}_0.json")), &bytes).await?;
            tokio::fs::write(staging_dir.join(format!("{table_name}_count.txt")), "1").await?;
        }
    }

    let mut db = DbConn::connect(&config.database.connection_url()?, config.database.flavor())
        .await?;
    for schema in LDP_CATALOG_SCHEMAS {
        db.create_schema_if_not_exists(schema).await?;
    }

    if !args.unsafe_mode && config.roles.iter().any(|r| r.trim().is_empty()) {
        return Err(crate::errors::Error::Config(
            "configured roles must be non-empty; pass --unsafe to skip this check".into(),
        ));
    }

    let extractor = if use_sourcedir || args.source.is_some() {
        None
    } else {
        let auth_token = config.tenant_service.resolve_auth_token()?;
        Some(Extractor::new(
            Source {
                base_url: config.tenant_service.base_url.clone(),
                auth_token,
                page_size: config.tenant_service.page_size,
            },
            args.nossl,
        )?)
    };

    let options = RunOptions {
        staging_dir: &staging_dir,
        roles: &config.roles,
        include_test_file: use_sourcedir,
        extract: extractor.is_some(),
    };

    let summary = tokio::select! {
        result = run_catalog(&config, &mut db, &options, extractor.as_ref()) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, rolling back in-progress table");
            let _ = db.rollback_table().await;
            return Ok(130);
        }
    };

    for (table, outcome) in &summary.outcomes {
        tracing::info!(table = %table, outcome = ?outcome, "table outcome");
    }

    if !args.savetemps && !use_sourcedir {
        let _ = tokio::fs::remove_dir_all(&staging_dir).await;
    }

    Ok(if summary.failures() > 0 { 1 } else { 0 })
}
