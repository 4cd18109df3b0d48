//! Server configuration: a properties file naming the listen address,
//! pool size, session timeout and document root, plus two companion
//! properties files mapping extensions to MIME types and URL paths to
//! worker identifiers.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Default coroutine stack size (64 KB).
const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Settings the server is started with.
///
/// Recognized keys: `server.address`, `server.port`,
/// `server.workerThreads`, `session.timeout` (seconds),
/// `server.documentRoot`, `server.mimeConfig` and `server.workers`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub worker_threads: usize,
    /// Session timeout in seconds; also the client socket read timeout.
    pub session_timeout: u64,
    pub document_root: PathBuf,
    /// Extension → MIME type overrides from `server.mimeConfig`.
    pub mime_types: HashMap<String, String>,
    /// URL path → worker identifier map from `server.workers`.
    pub workers: HashMap<String, String>,
}

impl ServerConfig {
    /// Loads the configuration from a properties file. The MIME and
    /// workers files are resolved relative to the main file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let properties = load_properties(path)
            .with_context(|| format!("error loading config file {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let address = required(&properties, "server.address")?.to_string();
        let port = required(&properties, "server.port")?
            .parse()
            .context("server.port is not a valid port number")?;
        let worker_threads = required(&properties, "server.workerThreads")?
            .parse()
            .context("server.workerThreads is not a valid count")?;
        let session_timeout = required(&properties, "session.timeout")?
            .parse()
            .context("session.timeout is not a valid number of seconds")?;
        let document_root = base.join(required(&properties, "server.documentRoot")?);

        let mime_path = base.join(required(&properties, "server.mimeConfig")?);
        let mime_types = load_properties(&mime_path)
            .with_context(|| format!("error loading MIME config {}", mime_path.display()))?;

        let workers_path = base.join(required(&properties, "server.workers")?);
        let workers = load_properties(&workers_path)
            .with_context(|| format!("error loading workers config {}", workers_path.display()))?;

        Ok(Self {
            address,
            port,
            worker_threads,
            session_timeout,
            document_root,
            mime_types,
            workers,
        })
    }
}

fn required<'a>(properties: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    properties
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing required config key `{key}`"))
}

/// Parses a simple properties file: `key=value` lines, `#`/`!` comments
/// and blank lines ignored, later duplicate keys winning.
pub fn load_properties<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let mut properties = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            properties.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(properties)
}

/// Coroutine stack size from the `SMARTSERVE_STACK_SIZE` environment
/// variable, in decimal or `0x`-prefixed hex. Defaults to 64 KB.
pub fn stack_size_from_env() -> usize {
    env::var("SMARTSERVE_STACK_SIZE")
        .ok()
        .and_then(|value| {
            if let Some(hex) = value.strip_prefix("0x") {
                usize::from_str_radix(hex, 16).ok()
            } else {
                value.parse().ok()
            }
        })
        .unwrap_or(DEFAULT_STACK_SIZE)
}
