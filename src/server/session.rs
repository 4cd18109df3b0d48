//! Session tracking: opaque SIDs carried in a cookie, a validity deadline
//! per entry, and a periodic sweep that evicts expired sessions.

use super::context::{Cookie, SessionStore};
use may::coroutine;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info};

/// Length of a session identifier.
pub const SID_LEN: usize = 20;
const SID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Interval between two sweeps of the session map.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(5 * 60);

struct SessionEntry {
    /// Wall-clock deadline in milliseconds since the epoch.
    valid_until: u64,
    store: SessionStore,
}

/// Mints, refreshes and expires sessions.
///
/// Lookup-or-mint runs under a single mutex so concurrent requests with
/// the same missing or stale SID either mint once or refresh the same
/// entry. The per-session parameter store is handed out as a shared
/// [`SessionStore`] so the request in flight mutates it without holding
/// the registry lock.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    timeout: Duration,
}

/// Outcome of resolving a request's session.
pub struct ResolvedSession {
    pub sid: String,
    pub store: SessionStore,
    /// Present when a new session was minted and the client needs the
    /// cookie.
    pub cookie: Option<Cookie>,
}

impl SessionRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Looks up the candidate SID, minting a fresh session when the
    /// candidate is absent, unknown or expired, and refreshing the
    /// deadline otherwise. `domain` becomes the cookie domain on mint.
    pub fn resolve(&self, candidate: Option<&str>, domain: &str) -> ResolvedSession {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let deadline = now_ms() + self.timeout.as_millis() as u64;

        if let Some(sid) = candidate {
            if let Some(entry) = sessions.get_mut(sid) {
                if now_ms() < entry.valid_until {
                    entry.valid_until = deadline;
                    return ResolvedSession {
                        sid: sid.to_string(),
                        store: entry.store.clone(),
                        cookie: None,
                    };
                }
                sessions.remove(sid);
            }
        }

        let sid = loop {
            let minted = mint_sid();
            if !sessions.contains_key(&minted) {
                break minted;
            }
        };
        let store = SessionStore::default();
        sessions.insert(
            sid.clone(),
            SessionEntry {
                valid_until: deadline,
                store: store.clone(),
            },
        );

        let mut cookie = Cookie::new("sid", &sid);
        cookie.domain = Some(domain.to_string());
        cookie.path = Some("/".to_string());
        cookie.max_age = Some(self.timeout.as_secs());
        cookie.http_only = true;

        ResolvedSession {
            sid,
            store,
            cookie: Some(cookie),
        }
    }

    /// Removes entries whose deadline has passed and returns how many
    /// were evicted.
    pub fn sweep(&self) -> usize {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = now_ms();
        let before = sessions.len();
        sessions.retain(|_, entry| now < entry.valid_until);
        before - sessions.len()
    }

    /// Number of live entries, expired or not.
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawns the background sweep coroutine. Failures are logged and the
/// sweep retries on the next tick.
pub fn spawn_sweeper(registry: Arc<SessionRegistry>) {
    let spawned = unsafe {
        coroutine::Builder::new().spawn::<_, ()>(move || loop {
            coroutine::sleep(SWEEP_PERIOD);
            let evicted = registry.sweep();
            if evicted > 0 {
                info!(evicted, "removed expired session entries");
            }
        })
    };
    if let Err(e) = spawned {
        error!(error = %e, "failed to spawn session sweeper");
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn mint_sid() -> String {
    let mut rng = rand::thread_rng();
    (0..SID_LEN)
        .map(|_| SID_ALPHABET[rng.gen_range(0..SID_ALPHABET.len())] as char)
        .collect()
}
