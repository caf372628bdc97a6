//! Route Optimizer - Axum Server

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use route_optimizer::api::{create_router, AppState};
use route_optimizer::config::AppConfig;
use route_optimizer::console;
use tracing::{error, info};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "route_optimizer=info";

#[tokio::main]
async fn main() -> ExitCode {
    let filter = match DEFAULT_DIRECTIVE.parse::<Directive>() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    console::print_banner();

    let config = AppConfig::parse();
    let solver = config.solver();
    info!(
        addr = %config.addr,
        time_limit = ?solver.time_limit,
        step_limit = ?solver.step_limit,
        plateau = solver.plateau_tolerance,
        daemon = solver.daemon,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::new(solver));
    let app = create_router(state.clone());

    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.addr, error = %e, "Could not bind");
            return ExitCode::FAILURE;
        }
    };
    println!("Server listening on http://{}", config.addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    let stopped = tokio::task::spawn_blocking(move || state.optimizer.shutdown()).await;
    if let Ok(Err(e)) = stopped {
        error!(error = %e, "Solver did not stop cleanly");
    }

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
