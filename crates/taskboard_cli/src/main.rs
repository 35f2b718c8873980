//! Operator entry point.
//!
//! # Responsibility
//! - Run the HTTP server.
//! - Provision users and their first bearer token, which have no HTTP
//!   endpoint.
//! - Purge expired tokens.
//! - Audit and repair column ranks.

use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use taskboard_core::{
    init_logging, init_stderr_logging, open_db_with_busy_timeout, AppConfig, BoardService,
    NewUser, SqliteTokenGate, TaskService,
};
use uuid::Uuid;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Task board server and maintenance tool
#[derive(Parser, Debug)]
#[command(name = "taskboard", version, about, long_about = None)]
struct Cli {
    /// TOML config file. Missing file means defaults.
    #[arg(short, long, global = true, default_value = "taskboard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Serve the JSON API
    Serve,
    /// Create an active user
    CreateUser {
        username: String,
        email: String,
        #[arg(long)]
        full_name: Option<String>,
    },
    /// Issue a bearer token for a user; the token is printed once
    IssueToken { user_id: Uuid },
    /// Delete expired bearer tokens
    PurgeTokens,
    /// Report columns whose ranks are not dense
    Check,
    /// Renumber one column's ranks to 0..n-1
    Compact {
        #[arg(long)]
        column: Uuid,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("event=cli_run module=cli status=error error={}", err);
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<ExitCode> {
    let config = AppConfig::load(Some(cli.config.as_path()))?;
    setup_logging(&config, &cli.command)?;

    match cli.command {
        Command::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(taskboard_api::serve(&config))?;
        }
        Command::CreateUser {
            username,
            email,
            full_name,
        } => {
            let conn = open_db_with_busy_timeout(&config.database_path, config.busy_timeout())?;
            let user = BoardService::new(&conn).create_user(NewUser {
                username,
                email,
                full_name,
            })?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::IssueToken { user_id } => {
            let conn = open_db_with_busy_timeout(&config.database_path, config.busy_timeout())?;
            let issued = SqliteTokenGate::with_ttl(&conn, config.token_ttl()).issue_token(user_id)?;
            println!("{}", serde_json::to_string_pretty(&issued)?);
        }
        Command::PurgeTokens => {
            let conn = open_db_with_busy_timeout(&config.database_path, config.busy_timeout())?;
            let purged = SqliteTokenGate::new(&conn).purge_expired()?;
            println!("{purged} expired token(s) purged");
        }
        Command::Check => {
            let conn = open_db_with_busy_timeout(&config.database_path, config.busy_timeout())?;
            let violations = TaskService::new(&conn, config.capacity_policy).audit_all()?;
            if violations.is_empty() {
                println!("all columns dense");
                return Ok(ExitCode::SUCCESS);
            }
            for violation in &violations {
                println!("{}", serde_json::to_string(violation)?);
            }
            return Ok(ExitCode::FAILURE);
        }
        Command::Compact { column } => {
            let conn = open_db_with_busy_timeout(&config.database_path, config.busy_timeout())?;
            let rewritten = TaskService::new(&conn, config.capacity_policy).repair_column(column)?;
            println!("column {column}: {rewritten} rank(s) rewritten");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn setup_logging(config: &AppConfig, command: &Command) -> CliResult<()> {
    match (&config.log_dir, command) {
        (Some(dir), Command::Serve) => init_logging(&config.log_level, &path_str(dir)?)?,
        _ => init_stderr_logging(&config.log_level)?,
    }
    Ok(())
}

fn path_str(path: &Path) -> CliResult<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| format!("log_dir is not valid UTF-8: {}", path.display()).into())
}
