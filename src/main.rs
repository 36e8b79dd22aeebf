use std::sync::Arc;

use chirpy_auth::cli::{
    Args, CliError, init_logging, load_jwt_secret, open_database, run_command,
};
use chirpy_auth::clock::SystemClock;
use chirpy_auth::config::AuthConfig;
use chirpy_auth::service::AuthService;
use clap::Parser;
use tracing::error;

fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    // Read before the runtime starts its worker threads, since loading the
    // secret removes it from the environment.
    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(args, jwt_secret)) {
        error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}

async fn run(args: Args, jwt_secret: String) -> Result<(), CliError> {
    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let config = AuthConfig::new(jwt_secret.into_bytes());
    let service = AuthService::new(config, Arc::new(db), Arc::new(SystemClock));

    run_command(&service, args.command).await
}
