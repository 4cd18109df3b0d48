use super::WebWorker;
use crate::server::ResponseContext;
use std::sync::atomic::{AtomicU64, Ordering};

/// Server-wide visit count. Kept global so the counter survives the
/// per-request instantiation of `/ext/` workers.
static VISIT_COUNT: AtomicU64 = AtomicU64::new(0);

/// Counts how many times it has been invoked across all sessions.
pub struct Visits;

impl WebWorker for Visits {
    fn process(&self, ctx: &mut ResponseContext) -> anyhow::Result<()> {
        ctx.set_mime_type("text/plain")?;

        let current = VISIT_COUNT.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.write_str(&format!("Site visited {current} times globally.\r\n"))?;
        ctx.write_str("Try running from different web browsers.")?;
        Ok(())
    }
}
