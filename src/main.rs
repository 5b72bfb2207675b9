use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use sham::config::Settings;
use sham::{Dispatcher, HandlerSet, RequestLog};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::parse();

    let listen_addr = match settings.parsed_listen_addr() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let handler_set = Arc::new(HandlerSet::new());
    let request_log = Arc::new(RequestLog::new(settings.request_log_capacity));

    if let Some(config_dir) = &settings.config_dir {
        if let Err(err) = sham::loader::load_directory(config_dir, &handler_set) {
            error!(error = %err, "failed to load registration files");
            return ExitCode::FAILURE;
        }
        info!(handlers = handler_set.len(), "startup registration complete");
    }

    let dispatcher = Dispatcher::new(handler_set, request_log);

    if let Err(err) = sham::transport::serve(listen_addr, dispatcher).await {
        error!(error = %err, "server exited with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
