//! TDMA coordinator entry point

use std::process;

use tdma_link::core::CoordinatorConfig;
use tdma_link::coordinator::Coordinator;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut config = CoordinatorConfig::default();
    if let Some(arg) = std::env::args().nth(1) {
        match arg.parse() {
            Ok(addr) => config.bind_addr = addr,
            Err(_) => {
                eprintln!("Usage: coordinator [bind_addr]");
                eprintln!("Example: coordinator 0.0.0.0:8080");
                process::exit(1);
            }
        }
    }

    let coordinator = match Coordinator::bind(config).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!(error = %e, "failed to start coordinator");
            process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_cancel.cancel();
        }
    });

    if let Err(e) = coordinator.run(cancel).await {
        error!(error = %e, "coordinator failed");
        process::exit(1);
    }
}
