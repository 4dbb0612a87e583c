//! Session registry: opens, tracks, and looks up live sessions.
//!
//! The registry maps each hosting thread to at most one live session and
//! enforces the duplicate-session rule: the same two users may not have
//! two live sessions of the same game type in the same guild. Every
//! operation runs in a single critical section, so two challenges racing
//! for the same thread or pair cannot both succeed.
//!
//! Ended sessions leave a final snapshot behind, up to
//! `SessionConfig::ended_retention` of them, oldest dropped first. Lookups
//! on those threads fail with `Terminated`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parlor_protocol::{ForceCloseCause, GameType, GuildId, ThreadId, UserId};
use tokio::sync::Mutex;

use crate::actor::{SpawnContext, spawn_session};
use crate::{
    NoticeSender, ReplayArchive, RuleBook, SessionConfig, SessionError, SessionHandle,
    SessionSnapshot, SessionSpec,
};

/// Counter for registry entries. Lets an actor release only its own entry.
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

struct RegistryInner {
    sessions: HashMap<ThreadId, SessionHandle>,
    ended: HashMap<ThreadId, SessionSnapshot>,
    ended_order: VecDeque<ThreadId>,
    closed: bool,
}

impl RegistryInner {
    fn remember_ended(&mut self, snapshot: SessionSnapshot, retention: usize) {
        let thread = snapshot.thread;
        if self.ended.insert(thread, snapshot).is_none() {
            self.ended_order.push_back(thread);
        }
        while self.ended_order.len() > retention {
            if let Some(oldest) = self.ended_order.pop_front() {
                self.ended.remove(&oldest);
            }
        }
    }

    fn forget_ended(&mut self, thread: ThreadId) {
        if self.ended.remove(&thread).is_some() {
            self.ended_order.retain(|t| *t != thread);
        }
    }

    fn find_duplicate(
        &self,
        users: [UserId; 2],
        game: GameType,
        guild: GuildId,
    ) -> Option<&SessionHandle> {
        self.sessions.values().find(|h| {
            h.is_live() && h.game() == game && h.guild() == guild && h.pairs(users)
        })
    }
}

struct Shared {
    inner: Mutex<RegistryInner>,
    config: SessionConfig,
    rules: RuleBook,
    archive: Arc<dyn ReplayArchive>,
    notices: NoticeSender,
}

/// The process-wide table of live sessions.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<Shared>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    ///
    /// Sessions it opens get their rule engine from `rules`, hand their
    /// records to `archive`, and publish notices on `notices`.
    pub fn new(
        config: SessionConfig,
        rules: RuleBook,
        archive: Arc<dyn ReplayArchive>,
        notices: NoticeSender,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(RegistryInner {
                    sessions: HashMap::new(),
                    ended: HashMap::new(),
                    ended_order: VecDeque::new(),
                    closed: false,
                }),
                config,
                rules,
                archive,
                notices,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn rules(&self) -> &RuleBook {
        &self.shared.rules
    }

    /// Opens a session and registers it under `spec.thread`.
    ///
    /// The duplicate checks, the actor spawn, and the insert happen under
    /// one lock.
    ///
    /// # Errors
    /// - [`SessionError::DuplicateSession`] if the thread is occupied or
    ///   the pair already plays this game in this guild. Carries the
    ///   existing session's thread.
    /// - [`SessionError::UnknownGame`] if no engine is registered.
    /// - [`SessionError::Unavailable`] after [`shutdown`](Self::shutdown).
    pub async fn register(&self, spec: SessionSpec) -> Result<SessionHandle, SessionError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.closed {
            return Err(SessionError::Unavailable(spec.thread));
        }
        // An entry that ended but has not released yet does not hold the thread.
        if inner.sessions.get(&spec.thread).is_some_and(SessionHandle::is_live) {
            return Err(SessionError::DuplicateSession(spec.thread));
        }
        if let Some(existing) = inner.find_duplicate(spec.users(), spec.game, spec.guild) {
            tracing::debug!(
                thread = %spec.thread,
                existing = %existing.thread(),
                "duplicate session rejected"
            );
            return Err(SessionError::DuplicateSession(existing.thread()));
        }

        let engine = self.shared.rules.engine(spec.game)?;
        let thread = spec.thread;
        let game = spec.game;
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        let ctx = SpawnContext {
            config: self.shared.config.clone(),
            engine,
            archive: Arc::clone(&self.shared.archive),
            notices: self.shared.notices.clone(),
            link: RegistryLink {
                shared: Arc::downgrade(&self.shared),
                thread,
                serial,
            },
        };
        let handle = spawn_session(spec, serial, ctx)?;

        inner.forget_ended(thread);
        inner.sessions.insert(thread, handle.clone());
        tracing::info!(%thread, %game, live = inner.sessions.len(), "session registered");
        Ok(handle)
    }

    /// The live session hosted in `thread`.
    ///
    /// # Errors
    /// - [`SessionError::Terminated`] if the session there has ended.
    /// - [`SessionError::NotFound`] if the thread is unknown.
    pub async fn lookup(&self, thread: ThreadId) -> Result<SessionHandle, SessionError> {
        let inner = self.shared.inner.lock().await;
        match inner.sessions.get(&thread) {
            Some(handle) if handle.is_live() => Ok(handle.clone()),
            Some(_) => Err(SessionError::Terminated(thread)),
            None if inner.ended.contains_key(&thread) => Err(SessionError::Terminated(thread)),
            None => Err(SessionError::NotFound(thread)),
        }
    }

    /// A read-only copy of the session in `thread`, live or recently ended.
    pub async fn snapshot(&self, thread: ThreadId) -> Result<SessionSnapshot, SessionError> {
        let handle = {
            let inner = self.shared.inner.lock().await;
            match inner.sessions.get(&thread) {
                Some(handle) => handle.clone(),
                None => {
                    return inner
                        .ended
                        .get(&thread)
                        .cloned()
                        .ok_or(SessionError::NotFound(thread));
                }
            }
        };
        handle.snapshot().await
    }

    /// Any live session between `users` (either order) for `game` in `guild`.
    pub async fn lookup_duplicate(
        &self,
        users: [UserId; 2],
        game: GameType,
        guild: GuildId,
    ) -> Option<SessionHandle> {
        let inner = self.shared.inner.lock().await;
        inner.find_duplicate(users, game, guild).cloned()
    }

    /// Removes the entry for `thread`. No-op if absent.
    ///
    /// If the session was still live and nobody else holds a handle, its
    /// actor closes it with cause `Shutdown`. A deregistered session leaves
    /// no ended snapshot behind.
    pub async fn deregister(&self, thread: ThreadId) -> Option<SessionHandle> {
        let removed = self.shared.inner.lock().await.sessions.remove(&thread);
        if removed.is_some() {
            tracing::info!(%thread, "session deregistered");
        }
        removed
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let inner = self.shared.inner.lock().await;
        inner.sessions.values().filter(|h| h.is_live()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Threads hosting a live session.
    pub async fn thread_ids(&self) -> Vec<ThreadId> {
        let inner = self.shared.inner.lock().await;
        let mut threads: Vec<ThreadId> = inner
            .sessions
            .values()
            .filter(|h| h.is_live())
            .map(SessionHandle::thread)
            .collect();
        threads.sort();
        threads
    }

    /// Live sessions `user` is playing in.
    pub async fn sessions_for(&self, user: UserId) -> Vec<SessionHandle> {
        let inner = self.shared.inner.lock().await;
        inner
            .sessions
            .values()
            .filter(|h| h.is_live() && h.involves(user))
            .cloned()
            .collect()
    }

    /// Stops accepting sessions and force-closes every live one.
    ///
    /// Returns the number of sessions closed. Safe to call repeatedly.
    pub async fn shutdown(&self) -> usize {
        let handles: Vec<SessionHandle> = {
            let mut inner = self.shared.inner.lock().await;
            inner.closed = true;
            inner.sessions.values().filter(|h| h.is_live()).cloned().collect()
        };

        let mut closed = 0;
        for handle in handles {
            match handle.force_close(ForceCloseCause::Shutdown).await {
                Ok(_) => closed += 1,
                Err(e) => {
                    tracing::debug!(thread = %handle.thread(), error = %e, "session already over at shutdown");
                }
            }
        }
        tracing::info!(closed, "session registry shut down");
        closed
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.shared.config)
            .field("rules", &self.shared.rules)
            .finish_non_exhaustive()
    }
}

/// An actor's back-reference to its registry entry.
///
/// Weak, so that a dropped registry does not stay alive through its
/// actors.
pub(crate) struct RegistryLink {
    shared: Weak<Shared>,
    thread: ThreadId,
    serial: u64,
}

impl RegistryLink {
    /// Swaps the entry for the final snapshot if it still belongs to this
    /// actor. A deregistered or reused thread is left alone.
    pub(crate) async fn release(&self, last: SessionSnapshot) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut inner = shared.inner.lock().await;
        let ours = inner
            .sessions
            .get(&self.thread)
            .is_some_and(|h| h.serial() == self.serial);
        if ours {
            inner.sessions.remove(&self.thread);
            inner.remember_ended(last, shared.config.ended_retention);
            tracing::info!(thread = %self.thread, live = inner.sessions.len(), "session released");
        }
    }
}
