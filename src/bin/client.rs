use std::process::ExitCode;

use pdte::config::Config;
use pdte::protocol;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = match Config::from_args() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(%e, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    match protocol::run(&cfg) {
        Ok(Some(classification)) => {
            println!("{classification}");
            ExitCode::SUCCESS
        }
        Ok(None) => {
            tracing::warn!("no classification returned (are you running the client role?)");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(%e, "query failed");
            ExitCode::FAILURE
        }
    }
}
