pub mod cli;

pub mod config;
pub mod mime;
pub mod script;
pub mod server;
pub mod worker_pool;
pub mod workers;

pub use config::ServerConfig;
pub use script::{parse, ScriptEngine};
pub use server::{ResponseContext, ServerHandle, SmartServer};
