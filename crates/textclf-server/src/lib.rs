//! textclf Server
//!
//! HTTP front end for a single pretrained text classifier: liveness and
//! readiness checks, `/predict`, Prometheus metrics and a small embedded UI.

pub mod app;
pub mod cli;
pub mod config;
pub mod routes;
pub mod smoke;
pub mod state;
pub mod static_files;
pub mod telemetry;

pub use app::{build_router, run_server, start_service, MAX_BODY_BYTES};
pub use config::ServerConfig;
pub use state::AppState;
