//! TeamForge Migration CLI Tool
//!
//! Operator interface to the schema version gate: inspect status, produce the
//! SQL for pending migrations, verify and record applied versions, and serve
//! the version API.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use teamforge::http::{self, VersionApi};
use teamforge::migration::{check_status, list_history, MigrationPlanner, MigrationVerifier};
use teamforge::{Session, Settings};
use teamforge_migrate::context::{GateContext, Overrides};
use teamforge_migrate::render;

#[derive(Parser)]
#[command(name = "teamforge-migrate")]
#[command(about = "Schema version gate tool for TeamForge")]
#[command(version = "0.1.0")]
struct Cli {
    /// Privileged database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Migrations directory path
    #[arg(long)]
    migrations_dir: Option<PathBuf>,

    /// Migration catalog file (defaults to catalog.json in the migrations directory)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Configuration file
    #[arg(long, default_value = teamforge::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Print JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the application version with the database
    Status {
        /// Application version (default: newest catalog version)
        #[arg(long)]
        app_version: Option<String>,
    },

    /// Print the combined SQL for migrations between two versions
    Plan {
        /// Current database version (exclusive)
        #[arg(long)]
        from: String,

        /// Target version (inclusive)
        #[arg(long)]
        to: String,

        /// Write the combined SQL here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the verification SQL here
        #[arg(long)]
        verification_output: Option<PathBuf>,
    },

    /// Run verification scripts and record passing versions
    Verify {
        /// Versions to verify
        #[arg(required = true)]
        versions: Vec<String>,
    },

    /// Check the migration catalog for inconsistencies
    Validate,

    /// List recorded migration history
    History {
        /// Only show one version
        #[arg(long)]
        version: Option<String>,
    },

    /// Serve the version API over HTTP
    Serve {
        /// Listen address (default from configuration)
        #[arg(long)]
        bind: Option<String>,

        /// Coroutine worker threads
        #[arg(long)]
        workers: Option<usize>,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    if cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
    } else if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match run(cli) {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load_from(&cli.config).context("loading configuration")?;
    let app_version = match &cli.command {
        Commands::Status { app_version } => app_version.clone(),
        _ => None,
    };
    let ctx = GateContext::build(
        settings,
        Overrides {
            database_url: cli.database_url,
            migrations_dir: cli.migrations_dir,
            catalog: cli.catalog,
            app_version,
        },
    )?;

    match cli.command {
        Commands::Status { .. } => handle_status(&ctx, cli.json),
        Commands::Plan {
            from,
            to,
            output,
            verification_output,
        } => handle_plan(&ctx, &from, &to, output, verification_output, cli.json),
        Commands::Verify { versions } => handle_verify(&ctx, &versions, cli.json),
        Commands::Validate => handle_validate(&ctx, cli.json),
        Commands::History { version } => handle_history(&ctx, version.as_deref(), cli.json),
        Commands::Serve { bind, workers } => handle_serve(ctx, bind, workers),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serializing output")?);
    Ok(())
}

fn handle_status(ctx: &GateContext, json: bool) -> Result<()> {
    let session = Session::open(ctx.connector.as_ref(), "status")?;
    let status = check_status(&ctx.catalog, &ctx.app_version, &session)?;
    if json {
        return print_json(&status);
    }
    print!("{}", render::status(&status));
    Ok(())
}

fn handle_plan(
    ctx: &GateContext,
    from: &str,
    to: &str,
    output: Option<PathBuf>,
    verification_output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let plan = MigrationPlanner::new(&ctx.catalog, ctx.scripts.as_ref()).plan(from, to)?;
    if json {
        return print_json(&plan);
    }

    if let Some(path) = &verification_output {
        std::fs::write(path, &plan.verification_sql)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    match &output {
        Some(path) => {
            std::fs::write(path, &plan.combined_sql)
                .with_context(|| format!("writing {}", path.display()))?;
            print!("{}", render::plan_summary(&plan));
            println!("\nCombined SQL written to {}", path.display());
        }
        None => {
            eprint!("{}", render::plan_summary(&plan));
            println!("{}", plan.combined_sql);
            if verification_output.is_none() && !plan.is_empty() {
                println!("\n{}", plan.verification_sql);
            }
        }
    }
    Ok(())
}

fn handle_verify(ctx: &GateContext, versions: &[String], json: bool) -> Result<()> {
    let report = MigrationVerifier::new(&ctx.catalog, ctx.connector.as_ref()).verify(versions)?;
    if json {
        print_json(&report)?;
    } else {
        print!("{}", render::report(&report));
    }
    if !report.success {
        bail!("{}", report.message);
    }
    Ok(())
}

fn handle_validate(ctx: &GateContext, json: bool) -> Result<()> {
    let issues = ctx.catalog.validate()?;
    if json {
        print_json(&issues)?;
    } else {
        print!("{}", render::issues(&issues));
    }
    let errors = issues.iter().filter(|i| i.is_error()).count();
    if errors > 0 {
        bail!("catalog has {} error(s)", errors);
    }
    Ok(())
}

fn handle_history(ctx: &GateContext, version: Option<&str>, json: bool) -> Result<()> {
    let session = Session::open(ctx.connector.as_ref(), "history")?;
    let records = list_history(&session, version)?;
    if json {
        return print_json(&records);
    }
    print!("{}", render::history(&records));
    Ok(())
}

fn handle_serve(ctx: GateContext, bind: Option<String>, workers: Option<usize>) -> Result<()> {
    if !ctx.connector.is_configured() {
        log::warn!("no database URL configured; status and verify requests will fail");
    }
    let bind = bind.unwrap_or_else(|| ctx.settings.server.bind.clone());
    let workers = workers.unwrap_or(ctx.settings.server.workers);

    let api = VersionApi::new(
        ctx.catalog.clone(),
        ctx.scripts.clone(),
        ctx.connector.clone(),
        Some(ctx.app_version.clone()),
    );
    http::serve(Arc::new(api), &bind, workers).with_context(|| format!("serving on {}", bind))
}
