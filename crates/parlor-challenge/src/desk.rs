//! The challenge desk: issues challenges and routes commands to them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parlor_protocol::{ChallengeId, UserId};
use parlor_session::{NoticeSender, SessionRegistry};
use tokio::sync::Mutex;

use crate::challenge::{ChallengeContext, ChallengeTable, spawn_challenge};
use crate::{
    AccountDirectory, AccountKind, Challenge, ChallengeConfig, ChallengeError, ChallengeHandle,
    ChallengeOutcome, ChallengeRequest,
};

/// Counter for generating unique challenge IDs.
static NEXT_CHALLENGE_ID: AtomicU64 = AtomicU64::new(1);

struct DeskInner<A> {
    directory: A,
    registry: SessionRegistry,
    config: ChallengeConfig,
    notices: NoticeSender,
    table: ChallengeTable,
}

/// Entry point for the challenge handshake.
///
/// Cheap to clone; clones share the same table of open challenges.
pub struct ChallengeDesk<A: AccountDirectory> {
    inner: Arc<DeskInner<A>>,
}

impl<A: AccountDirectory> Clone for ChallengeDesk<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: AccountDirectory> ChallengeDesk<A> {
    /// Creates a desk that opens accepted sessions in `registry`.
    pub fn new(
        directory: A,
        registry: SessionRegistry,
        config: ChallengeConfig,
        notices: NoticeSender,
    ) -> Self {
        Self {
            inner: Arc::new(DeskInner {
                directory,
                registry,
                config: config.validated(),
                notices,
                table: Arc::new(Mutex::new(HashMap::new())),
            }),
        }
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.inner.config
    }

    /// Opens a `Pending` challenge and prompts the challenger to confirm.
    ///
    /// # Errors
    /// - [`ChallengeError::SelfChallenge`] if both sides are the same user.
    /// - [`ChallengeError::TargetNotHuman`] if the target is the bot or
    ///   another automated account.
    /// - [`ChallengeError::DuplicateSession`] if the pair already plays
    ///   this game in this guild, or the thread already hosts a session.
    pub async fn propose(&self, request: ChallengeRequest) -> Result<ChallengeHandle, ChallengeError> {
        let challenger = request.challenger.user;
        let target = request.target.user;
        if challenger == target {
            return Err(ChallengeError::SelfChallenge(challenger));
        }
        match self.inner.directory.classify(target).await? {
            AccountKind::Human => {}
            kind => {
                tracing::debug!(%target, ?kind, "challenge target rejected");
                return Err(ChallengeError::TargetNotHuman(target));
            }
        }

        let registry = &self.inner.registry;
        if let Some(existing) = registry
            .lookup_duplicate([challenger, target], request.game, request.guild)
            .await
        {
            return Err(ChallengeError::DuplicateSession(existing));
        }
        if let Ok(existing) = registry.lookup(request.thread).await {
            return Err(ChallengeError::DuplicateSession(existing));
        }

        let id = ChallengeId(NEXT_CHALLENGE_ID.fetch_add(1, Ordering::Relaxed));
        let game = request.game;

        // Hold the table while spawning so the actor cannot resolve and
        // remove itself before it is inserted.
        let mut table = self.inner.table.lock().await;
        let handle = spawn_challenge(
            id,
            request,
            ChallengeContext {
                config: self.inner.config.clone(),
                registry: registry.clone(),
                notices: self.inner.notices.clone(),
                table: Arc::clone(&self.inner.table),
            },
        );
        table.insert(id, handle.clone());

        tracing::info!(challenge = %id, %challenger, %target, %game, "challenge issued");
        Ok(handle)
    }

    /// The handle for an open challenge.
    pub async fn get(&self, id: ChallengeId) -> Result<ChallengeHandle, ChallengeError> {
        self.inner
            .table
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(ChallengeError::NotFound(id))
    }

    pub async fn confirm(&self, id: ChallengeId, by: UserId) -> Result<(), ChallengeError> {
        self.get(id).await?.confirm(by).await
    }

    pub async fn respond(
        &self,
        id: ChallengeId,
        by: UserId,
        accept: bool,
    ) -> Result<ChallengeOutcome, ChallengeError> {
        self.get(id).await?.respond(by, accept).await
    }

    pub async fn cancel(&self, id: ChallengeId, by: UserId) -> Result<(), ChallengeError> {
        self.get(id).await?.cancel(by).await
    }

    /// Views of every open challenge.
    pub async fn open_challenges(&self) -> Vec<Challenge> {
        let handles: Vec<ChallengeHandle> =
            self.inner.table.lock().await.values().cloned().collect();
        let mut open = Vec::with_capacity(handles.len());
        for handle in handles {
            // Skips challenges that resolved since the table was read.
            if let Ok(challenge) = handle.snapshot().await {
                open.push(challenge);
            }
        }
        open.sort_by_key(|c| c.id);
        open
    }

    /// Number of open challenges.
    pub async fn len(&self) -> usize {
        self.inner.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
