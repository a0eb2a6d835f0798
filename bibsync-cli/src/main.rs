//! # bibsync CLI
//!
//! Command-line interface for mirroring a reference-manager export into a
//! document repository and checking bibliography health.

mod commands;
mod presence;

use bibsync_core::config::{Config, ConfigOverrides};
use bibsync_core::health::CheckOptions;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const DEFAULT_CONFIG: &str = "bibsync.yml";

#[derive(Parser)]
#[command(name = "bibsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults to bibsync.yml when present)
    #[arg(long, global = true, env = "BIBSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the export and publish changed entries to the repository
    Sync {
        /// Only sync while a process with this name is running
        #[arg(long)]
        require_running: Option<String>,

        /// Fetch and diff without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Export URL
        #[arg(long, env = "BIBSYNC_API_ENDPOINT", hide_env_values = true)]
        api_endpoint: Option<String>,

        /// Working copy of the document repository
        #[arg(long, env = "BIBSYNC_REPO_PATH")]
        repo_path: Option<PathBuf>,

        /// Export file name inside the repository
        #[arg(long, env = "BIBSYNC_EXPORT_FILENAME")]
        export_filename: Option<String>,

        /// Username embedded in the remote URL for pull/push
        #[arg(long, env = "BIBSYNC_CREDENTIAL_USERNAME")]
        username: Option<String>,

        /// Password embedded in the remote URL (environment only)
        #[arg(long, env = "BIBSYNC_CREDENTIAL_PASSWORD", hide = true, hide_env_values = true)]
        password: Option<String>,

        /// Abort on the first malformed entry
        #[arg(long)]
        strict: bool,

        /// Rebase/push rounds before giving up
        #[arg(long, env = "BIBSYNC_MAX_PUSH_ATTEMPTS")]
        max_push_attempts: Option<u32>,

        /// Commit deltas that only remove entries
        #[arg(long)]
        publish_removals: bool,
    },

    /// Check entries for missing fields and style problems
    Health {
        /// BibTeX file to check
        bib: PathBuf,

        /// Only check entries cited under this directory
        #[arg(long)]
        sources: Option<PathBuf>,

        /// Source file extensions to scan (comma separated)
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,

        /// Abort on the first malformed entry
        #[arg(long)]
        strict: bool,

        /// Where to write the JSON report
        #[arg(long, env = "BIBSYNC_REPORT_PATH")]
        report: Option<PathBuf>,

        /// Print every issue message
        #[arg(long)]
        details: bool,

        /// Accept a title period inside trailing braces, e.g. `{{Title.}}`
        #[arg(long)]
        period_inside_braces: bool,
    },

    /// Compare two BibTeX files by citation key
    Diff {
        old: PathBuf,
        new: PathBuf,

        /// Compare parsed fields instead of raw text
        #[arg(long)]
        semantic: bool,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List citation keys used in a source tree
    Usage {
        dir: PathBuf,

        /// Source file extensions to scan (comma separated)
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(2);
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync {
            require_running,
            dry_run,
            api_endpoint,
            repo_path,
            export_filename,
            username,
            password,
            strict,
            max_push_attempts,
            publish_removals,
        } => {
            config.apply(ConfigOverrides {
                api_endpoint,
                repo_path,
                export_filename,
                credential_username: username,
                credential_password: password,
                parse_mode: strict.then_some(bibsync_core::ParseMode::Strict),
                max_push_attempts,
                publish_removals: publish_removals.then_some(true),
                report_path: None,
            });
            let opts = commands::SyncOptions {
                require_running,
                dry_run,
            };
            commands::sync(&config, &presence::PgrepProbe, opts)
        }
        Commands::Health {
            bib,
            sources,
            ext,
            strict,
            report,
            details,
            period_inside_braces,
        } => {
            config.apply(ConfigOverrides {
                parse_mode: strict.then_some(bibsync_core::ParseMode::Strict),
                report_path: report,
                ..Default::default()
            });
            let opts = commands::HealthOptions {
                sources,
                extensions: extensions_or(ext, &config),
                details,
                rules: CheckOptions {
                    period_inside_braces,
                },
            };
            commands::health(&config, &bib, opts)
        }
        Commands::Diff {
            old,
            new,
            semantic,
            json,
        } => commands::diff(&config, &old, &new, semantic, json),
        Commands::Usage { dir, ext, json } => {
            commands::usage(&dir, &extensions_or(ext, &config), json)
        }
    }
}

/// Load the explicit config file, or `bibsync.yml` when it exists.
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    use anyhow::Context;

    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).is_file() => Config::from_file(DEFAULT_CONFIG)
            .context("Failed to load configuration from bibsync.yml"),
        None => Ok(Config::default()),
    }
}

fn extensions_or(ext: Vec<String>, config: &Config) -> Vec<String> {
    if ext.is_empty() {
        config.source_extensions.clone()
    } else {
        ext
    }
}
