//! Operator CLI for the satellite catalog ingestion core.

use std::path::PathBuf;
use std::process::ExitCode;

use catalog_infra::archive::import_archive;
use catalog_infra::config::AppConfig;
use catalog_infra::health::check_health;
use catalog_infra::runtime::Runtime;
use catalog_infra::status::build_status_snapshot;
use clap::{Parser, Subcommand};

const DEFAULT_BASE_URL: &str = "https://www.space-track.org";

#[derive(Parser)]
#[command(name = "catalog-ingest", about = "Satellite catalog ingestion core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the persisted schema if it does not already exist.
    InitDb,
    /// Populate the constellation registry.
    Seed,
    /// Run one GP-refresh pass against the configured constellations.
    UpdateTle {
        /// Restrict to these constellation slugs (default: all registered).
        #[arg(long, value_delimiter = ',')]
        constellations: Vec<String>,
    },
    /// Import historical TLEs from an archive.
    ImportHistory {
        #[arg(long)]
        zip: PathBuf,
        #[arg(long, value_delimiter = ',')]
        years: Vec<i32>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print account, job, and catalog health.
    Status,
    /// Run the scheduler loop until a shutdown signal is received.
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::InitDb => match catalog_infra::store::CatalogWriter::connect(&config.database_url).await {
            Ok(writer) => match writer.init_schema().await {
                Ok(()) => {
                    println!("schema initialized");
                    ExitCode::SUCCESS
                }
                Err(err) => fail(&err),
            },
            Err(err) => fail(&err),
        },
        Command::Seed => match catalog_infra::store::CatalogWriter::connect(&config.database_url).await {
            Ok(writer) => match writer.seed_registry().await {
                Ok(inserted) => {
                    println!("seeded {inserted} new constellations");
                    ExitCode::SUCCESS
                }
                Err(err) => fail(&err),
            },
            Err(err) => fail(&err),
        },
        Command::UpdateTle { constellations } => {
            let runtime = match Runtime::bootstrap(config, DEFAULT_BASE_URL).await {
                Ok(r) => r,
                Err(err) => return fail(&err),
            };
            let slugs: Vec<&str> = if constellations.is_empty() {
                catalog_core::registry::initial_loader_priority_order()
            } else {
                constellations.iter().map(String::as_str).collect()
            };
            let mut touched = 0u64;
            for slug in slugs {
                let Some(entry) = catalog_core::registry::find(slug) else {
                    eprintln!("skipping unregistered constellation {slug}");
                    continue;
                };
                match runtime.upstream.fetch_gp_refresh(&runtime.pool, slug, entry.name_patterns).await {
                    Ok(raw) => {
                        let normalized: Vec<_> = raw
                            .iter()
                            .filter_map(|r| catalog_core::normalize::normalize_gp_record(r).ok())
                            .collect();
                        match runtime.writer.upsert_gp_batch(&normalized, slug).await {
                            Ok((new_count, updated_count)) => {
                                println!("{slug}: {new_count} new, {updated_count} updated");
                                touched += new_count + updated_count;
                            }
                            Err(err) => eprintln!("{slug}: persistence failed: {err}"),
                        }
                    }
                    Err(err) => eprintln!("{slug}: fetch failed: {err}"),
                }
            }
            println!("total touched: {touched}");
            ExitCode::SUCCESS
        }
        Command::ImportHistory { zip, years, dry_run } => {
            match catalog_infra::store::CatalogWriter::connect(&config.database_url).await {
                Ok(writer) => match import_archive(&writer, &zip, &years, dry_run).await {
                    Ok(summary) => {
                        println!("{summary:#?}");
                        ExitCode::SUCCESS
                    }
                    Err(err) => fail(&err),
                },
                Err(err) => fail(&err),
            }
        }
        Command::Status => {
            let runtime = match Runtime::bootstrap(config, DEFAULT_BASE_URL).await {
                Ok(r) => r,
                Err(err) => return fail(&err),
            };
            let health = check_health(env!("CARGO_PKG_VERSION"), &runtime.writer).await;
            println!(
                "health: ok={} schema_version={} detail={:?}",
                health.ok, health.schema_version, health.detail
            );
            let snapshot = build_status_snapshot(&runtime.pool, &runtime.scheduler, &runtime.writer).await;
            print!("{}", snapshot.render_text());
            ExitCode::SUCCESS
        }
        Command::Run => {
            let runtime = match Runtime::bootstrap(config, DEFAULT_BASE_URL).await {
                Ok(r) => r,
                Err(err) => return fail(&err),
            };
            let configured: Vec<String> = Vec::new();
            runtime.run(&configured).await;
            ExitCode::SUCCESS
        }
    }
}

fn fail(err: &impl std::fmt::Display) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::FAILURE
}
