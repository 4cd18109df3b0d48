//! # Server Module
//!
//! The HTTP/1.x server built on the `may` coroutine runtime.
//!
//! A listener coroutine accepts connections and hands each one to a
//! fixed-size pool of client workers. Every worker parses the request
//! head, resolves the session, and dispatches to a static file, a
//! registered worker, a dynamic `/ext/` worker or the Smart Script
//! engine. Responses stream through a [`ResponseContext`] whose headers
//! are generated exactly once, on the first body write.

pub mod context;
pub mod http_server;
pub mod request;
pub mod response;
pub mod service;
pub mod session;

pub use context::{ContextError, Cookie, ResponseContext, SessionStore};
pub use http_server::{ServerHandle, SmartServer};
pub use service::AppService;
pub use session::{SessionRegistry, SID_LEN};
