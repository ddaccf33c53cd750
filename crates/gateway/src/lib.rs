pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod state;
pub mod uploads;

pub use server::{build_router, run_server};
pub use state::AppState;
