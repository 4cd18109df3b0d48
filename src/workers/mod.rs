//! Pluggable request handlers. A worker receives the response context
//! and produces the whole response body; the configured worker map and
//! the `/ext/` namespace both resolve identifiers through
//! [`resolve`].

mod echo_params;
mod hello;
mod visits;

pub use echo_params::EchoParams;
pub use hello::Hello;
pub use visits::Visits;

use crate::server::ResponseContext;
use std::sync::Arc;

/// A pluggable request handler.
///
/// Workers may read request parameters and mutate persistent and
/// temporary parameters. Header-affecting context fields must not be
/// touched after the first write; the context enforces this.
pub trait WebWorker: Send + Sync {
    fn process(&self, ctx: &mut ResponseContext) -> anyhow::Result<()>;
}

/// Resolves a class-like worker identifier to a fresh worker instance.
/// Returns `None` for unknown identifiers.
pub fn resolve(identifier: &str) -> Option<Arc<dyn WebWorker>> {
    match identifier {
        "EchoParams" => Some(Arc::new(EchoParams)),
        "Hello" => Some(Arc::new(Hello)),
        "Visits" => Some(Arc::new(Visits)),
        _ => None,
    }
}
