pub mod config;
pub mod server;
pub mod subscription;

mod session;

pub use config::ServerConfig;
pub use server::{build_router, start, AppState, ServerHandle};
