//! CLI argument parsing and operator commands.

use std::io::BufRead;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use uuid::Uuid;

use crate::cleanup::{run_cleanup, spawn_cleanup_scheduler};
use crate::db::Database;
use crate::error::AuthError;
use crate::service::AuthService;

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Errors from operator commands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("failed to read password: {0}")]
    Stdin(#[from] std::io::Error),
    #[error("no user with email {0}")]
    UnknownUser(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "chirpy-auth",
    about = "Account and credential administration for chirpy"
)]
pub struct Args {
    /// Path to SQLite database file
    #[arg(short, long, default_value = "chirpy.db", env = "CHIRPY_DATABASE")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user. The password is read from stdin
    Register {
        #[arg(long)]
        email: String,
    },
    /// Replace a user's password and revoke all their sessions. The password is read from stdin
    SetPassword {
        #[arg(long)]
        email: String,
    },
    /// Revoke every session and refresh token of a user
    RevokeUser {
        #[arg(long)]
        email: String,
    },
    /// Check an access token and print the user it belongs to
    VerifyToken { token: String },
    /// Delete long-expired sessions and refresh tokens
    Cleanup {
        /// Keep running and clean up every hour
        #[arg(long)]
        watch: bool,
    },
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
///
/// Removes `JWT_SECRET` from the environment, so this must run while the
/// process is still single threaded, before any async runtime is built.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: only called from the synchronous main before the tokio
        // runtime is built, while the process has a single thread.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match read_secret_file(path) {
            Ok(secret) => secret,
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    check_secret_length(secret)
}

fn read_secret_file(path: &str) -> std::io::Result<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

fn check_secret_length(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Read a password from the first line of `input`.
pub fn read_password(mut input: impl BufRead) -> std::io::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn password_from_stdin() -> Result<String, CliError> {
    Ok(read_password(std::io::stdin().lock())?)
}

async fn user_id_for(service: &AuthService<Database>, email: &str) -> Result<Uuid, CliError> {
    service
        .find_user_by_email(email)
        .await?
        .map(|user| user.id)
        .ok_or_else(|| CliError::UnknownUser(email.to_string()))
}

/// Execute one operator command.
pub async fn run_command(service: &AuthService<Database>, command: Command) -> Result<(), CliError> {
    match command {
        Command::Register { email } => {
            let password = password_from_stdin()?;
            let user = service.register(&email, &password).await?;
            println!("Registered {} ({})", user.email, user.id);
        }
        Command::SetPassword { email } => {
            let user_id = user_id_for(service, &email).await?;
            let password = password_from_stdin()?;
            let revoked = service.set_password(user_id, &password).await?;
            println!("Password changed, {} credentials revoked", revoked);
        }
        Command::RevokeUser { email } => {
            let user_id = user_id_for(service, &email).await?;
            let revoked = service.revoke_all_for_user(user_id).await?;
            println!("Revoked {} credentials", revoked);
        }
        Command::VerifyToken { token } => {
            let user_id = service.validate_access_token(&token)?;
            println!("{}", user_id);
        }
        Command::Cleanup { watch } => {
            if watch {
                let handle =
                    spawn_cleanup_scheduler(Arc::clone(service.store()), Arc::clone(service.clock()));
                if let Err(e) = handle.await {
                    error!(error = %e, "Cleanup scheduler stopped");
                }
            } else {
                let deleted = run_cleanup(service.store().as_ref(), service.clock().as_ref()).await;
                println!("Deleted {} expired credentials", deleted);
            }
        }
    }
    Ok(())
}
