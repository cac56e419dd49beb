use std::env;
use std::process::ExitCode;

use forum_gate::config::{DEFAULT_CONFIG_PATH, GateConfig};
use forum_gate::server::{Gateway, Server};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "forum_gate=info,gate_http=info";

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let config = match GateConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let gateway = match Gateway::from_config(&config) {
        Ok(gateway) => gateway,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().worker_threads(config.threads).enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(cause = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let server = match Server::bind(config.socket_addr(), gateway).await {
            Ok(server) => server,
            Err(e) => {
                error!(cause = %e, "failed to start gateway");
                return ExitCode::FAILURE;
            }
        };

        tokio::select! {
            () = server.run() => ExitCode::SUCCESS,
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(cause = %e, "failed to listen for shutdown signal");
                    return ExitCode::FAILURE;
                }
                info!("shutting down");
                ExitCode::SUCCESS
            }
        }
    })
}
