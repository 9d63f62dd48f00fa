use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use evalgate_core::ids::generate_session_id;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, mpsc};

use crate::dispatch::ToolDispatcher;
use crate::session::{CloseReason, SessionContext, SessionEvent};

/// Sessions with no request for this long are evicted.
pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(3600);
const SWEEP_INTERVAL_MIN: Duration = Duration::from_millis(10);
const SWEEP_INTERVAL_MAX: Duration = Duration::from_secs(60);

/// One live client session. The context lock serializes every request on this id.
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_seen: Mutex<Instant>,
    closed: AtomicBool,
    context: AsyncMutex<SessionContext>,
}

impl Session {
    fn new(id: String, context: SessionContext) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            last_seen: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
            context: AsyncMutex::new(context),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Record client activity; resets the idle clock.
    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    /// Returns true only for the call that flipped the flag.
    fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Wait for exclusive access to the protocol context. Waiters are served FIFO.
    pub async fn context(&self) -> AsyncMutexGuard<'_, SessionContext> {
        self.context.lock().await
    }

    /// Close the context once any in-flight request on it has finished.
    pub async fn close(&self, reason: CloseReason) -> bool {
        self.mark_closed();
        self.context.lock().await.close(reason)
    }
}

struct StoreInner {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    dispatcher: Arc<ToolDispatcher>,
    events: mpsc::UnboundedSender<SessionEvent>,
    idle_ttl: Duration,
}

/// Owned session table. Cheap to clone; all clones share one table.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> (Self, SessionReaper) {
        Self::with_idle_ttl(dispatcher, DEFAULT_SESSION_IDLE_TTL)
    }

    /// Build a store plus the reaper that consumes its contexts' close events and
    /// evicts idle sessions. The reaper must be spawned for either to happen.
    pub fn with_idle_ttl(
        dispatcher: Arc<ToolDispatcher>,
        idle_ttl: Duration,
    ) -> (Self, SessionReaper) {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(StoreInner {
            sessions: Mutex::new(HashMap::new()),
            dispatcher,
            events,
            idle_ttl,
        });
        let reaper = SessionReaper {
            events: receiver,
            store: Arc::downgrade(&inner),
            sweep_interval: (idle_ttl / 2).clamp(SWEEP_INTERVAL_MIN, SWEEP_INTERVAL_MAX),
        };
        (Self { inner }, reaper)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.inner.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.inner.dispatcher
    }

    pub fn idle_ttl(&self) -> Duration {
        self.inner.idle_ttl
    }

    pub fn create(&self) -> Arc<Session> {
        let mut sessions = self.sessions();
        let id = loop {
            let candidate = generate_session_id();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let context = SessionContext::new(
            id.clone(),
            Arc::clone(&self.inner.dispatcher),
            self.inner.events.clone(),
        );
        let session = Arc::new(Session::new(id.clone(), context));
        sessions.insert(id, Arc::clone(&session));

        tracing::info!(
            event = "mcp_session_created",
            session_id = %session.id(),
            active_sessions = sessions.len(),
            "MCP session created"
        );
        session
    }

    /// Closed and idle-expired sessions are reported as absent even before they leave the table.
    pub fn lookup(&self, session_id: &str) -> Option<Arc<Session>> {
        let ttl = self.inner.idle_ttl;
        self.sessions()
            .get(session_id)
            .filter(|session| session.is_open() && session.idle_for() < ttl)
            .cloned()
    }

    /// Idempotent. Returns true if the session was present.
    pub fn remove(&self, session_id: &str) -> bool {
        let (removed, remaining) = {
            let mut sessions = self.sessions();
            let removed = sessions.remove(session_id);
            (removed, sessions.len())
        };
        let Some(session) = removed else {
            return false;
        };
        session.mark_closed();
        tracing::info!(
            event = "mcp_session_removed",
            session_id = %session_id,
            lifetime_ms = (Utc::now() - session.created_at()).num_milliseconds(),
            active_sessions = remaining,
            "MCP session removed"
        );
        true
    }

    /// Remove every session idle past the TTL. Sessions with a request in flight are kept.
    pub fn expire_idle(&self) -> usize {
        let ttl = self.inner.idle_ttl;
        let expired: Vec<String> = self
            .sessions()
            .values()
            .filter(|session| session.idle_for() >= ttl && session.context.try_lock().is_ok())
            .map(|session| session.id().to_string())
            .collect();

        let removed = expired.iter().filter(|id| self.remove(id)).count();
        if removed > 0 {
            tracing::info!(
                event = "mcp_sessions_expired",
                expired = removed,
                idle_ttl_secs = ttl.as_secs(),
                "Evicted idle MCP sessions"
            );
        }
        removed
    }

    /// Close and remove every live session, waiting for each context to finish.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = self.sessions().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close(CloseReason::Shutdown).await;
        }
        tracing::info!(
            event = "mcp_sessions_closed",
            closed = drained.len(),
            "Closed all MCP sessions"
        );
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}

/// Single consumer of session close events; removes closed sessions from the store
/// and periodically evicts idle ones.
pub struct SessionReaper {
    events: mpsc::UnboundedReceiver<SessionEvent>,
    store: Weak<StoreInner>,
    sweep_interval: Duration,
}

impl SessionReaper {
    /// Runs until every store handle and context has been dropped.
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(SessionEvent::Closed { session_id, reason }) = event else {
                        break;
                    };
                    let Some(inner) = self.store.upgrade() else {
                        break;
                    };
                    let removed = SessionStore { inner }.remove(&session_id);
                    tracing::debug!(
                        event = "mcp_session_reaped",
                        session_id = %session_id,
                        reason = reason.as_str(),
                        removed = removed,
                        "Processed session close event"
                    );
                }
                _ = sweep.tick() => {
                    let Some(inner) = self.store.upgrade() else {
                        break;
                    };
                    SessionStore { inner }.expire_idle();
                }
            }
        }
    }
}
