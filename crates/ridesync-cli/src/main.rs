//! `ridesync` binary.

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use ridesync_cli::{Args, Runtime, StdioDriver};
use ridesync_client::transport::HttpApi;
use ridesync_core::SystemEnv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let timeout = Duration::from_secs(args.request_timeout_secs);
    let driver = StdioDriver::new(HttpApi::with_timeout(&args.api_url, &args.token, timeout));
    if let Err(err) = driver.spawn_stdin() {
        error!(error = %err, "failed to read stdin");
        return ExitCode::FAILURE;
    }

    info!(role = ?args.role, ws = %args.ws_url, api = %args.api_url, "starting");
    let mut runtime = Runtime::new(driver, SystemEnv, args.credentials(), args.runtime_config());
    match runtime.run().await {
        Ok(()) if runtime.app().auth_failed() => {
            error!("backend rejected the token");
            ExitCode::FAILURE
        },
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "runtime failed");
            ExitCode::FAILURE
        },
    }
}
