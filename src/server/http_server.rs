use super::service::AppService;
use super::session::{spawn_sweeper, SessionRegistry};
use crate::config::{stack_size_from_env, ServerConfig};
use crate::mime::MimeTypes;
use crate::worker_pool::ClientPool;
use crate::workers::{self, WebWorker};
use anyhow::{anyhow, Context};
use may::coroutine::JoinHandle;
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

/// The HTTP application server: listener coroutine plus a fixed pool of
/// client workers, sharing the session registry and worker map.
pub struct SmartServer {
    config: ServerConfig,
    workers: HashMap<String, Arc<dyn WebWorker>>,
}

/// Handle to a running server
///
/// Provides methods for waiting until the server is ready, stopping it
/// gracefully, or joining the listener coroutine.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Address the listener is bound to. Useful when the configured port
    /// was `0`.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stops accepting connections and joins the listener. In-flight
    /// requests run to completion on their pool workers.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        unsafe {
            self.handle.coroutine().cancel();
        }
        let _ = self.handle.join();
    }

    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl SmartServer {
    /// Validates the configuration: the document root must exist and
    /// every configured worker identifier must resolve.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let document_root = config.document_root.canonicalize().with_context(|| {
            format!(
                "document root {} is not accessible",
                config.document_root.display()
            )
        })?;

        let mut resolved = HashMap::new();
        for (path, identifier) in &config.workers {
            let worker = workers::resolve(identifier).ok_or_else(|| {
                anyhow!("unknown worker identifier `{identifier}` mapped to {path}")
            })?;
            resolved.insert(path.clone(), worker);
        }

        let mut config = config;
        config.document_root = document_root;
        Ok(Self {
            config,
            workers: resolved,
        })
    }

    /// Binds the listen socket, spawns the client pool and the session
    /// sweeper, and starts accepting in a listener coroutine.
    pub fn start(self) -> io::Result<ServerHandle> {
        let listener =
            may::net::TcpListener::bind((self.config.address.as_str(), self.config.port))?;
        let addr = listener.local_addr()?;

        let sessions = Arc::new(SessionRegistry::new(Duration::from_secs(
            self.config.session_timeout,
        )));
        spawn_sweeper(sessions.clone());

        let service = AppService {
            document_root: self.config.document_root.clone(),
            mime_types: Arc::new(MimeTypes::with_overrides(&self.config.mime_types)),
            workers: Arc::new(self.workers),
            sessions,
            address: self.config.address.clone(),
            read_timeout: Duration::from_secs(self.config.session_timeout),
        };

        let stack_size = stack_size_from_env();
        let pool =
            unsafe { ClientPool::new(self.config.worker_threads, stack_size, move |stream| service.handle(stream)) };

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let handle = unsafe {
            may::coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || {
                    info!(addr = %addr, workers = pool.workers(), "server listening");
                    loop {
                        match listener.accept() {
                            Ok((stream, peer)) => {
                                if flag.load(Ordering::SeqCst) {
                                    break;
                                }
                                info!(peer = %peer, "accepted connection");
                                pool.dispatch(stream);
                            }
                            Err(e) => {
                                if flag.load(Ordering::SeqCst) {
                                    break;
                                }
                                error!(error = %e, "accept failed");
                            }
                        }
                    }
                })
        }?;

        Ok(ServerHandle {
            addr,
            handle,
            shutdown,
        })
    }
}
