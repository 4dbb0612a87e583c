//! `Coordinator` builder and the operations the command layer calls.
//!
//! This is the entry point for a chat bot hosting Parlor games. It ties
//! together the layers: challenge desk → session registry → session actors.

use std::sync::Arc;

use parlor_challenge::{
    AccountDirectory, ChallengeDesk, ChallengeHandle, ChallengeOutcome, ChallengeRequest,
};
use parlor_protocol::{
    ChallengeId, ForceCloseCause, GameType, GuildId, Notice, Termination, ThreadId, UserId,
};
use parlor_session::{
    MoveOutcome, MoveRequest, NullArchive, ReadyOutcome, ReplayArchive, RuleBook, RuleEngine,
    SessionError, SessionHandle, SessionRegistry, SessionSnapshot,
};
use tokio::sync::mpsc;

use crate::{ParlorConfig, ParlorError};

/// Receiving end of the notice channel returned by
/// [`CoordinatorBuilder::build`].
pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

/// Builder for a [`Coordinator`].
///
/// # Example
///
/// ```rust,ignore
/// let (coordinator, notices) = CoordinatorBuilder::new(config.clone())
///     .rule_engine(GameType::ConnectFour, ConnectFour)
///     .archive(JsonLinesArchive::new(file))
///     .build(KnownAccounts::new(config.bot_user))?;
/// ```
pub struct CoordinatorBuilder {
    config: ParlorConfig,
    rules: RuleBook,
    archive: Arc<dyn ReplayArchive>,
}

impl CoordinatorBuilder {
    /// Creates a builder with no rule engines and a discarding archive.
    pub fn new(config: ParlorConfig) -> Self {
        Self {
            config: config.validated(),
            rules: RuleBook::new(),
            archive: Arc::new(NullArchive),
        }
    }

    /// Registers the rules for one game type.
    pub fn rule_engine(mut self, game: GameType, engine: impl RuleEngine) -> Self {
        self.rules.insert(game, Arc::new(engine));
        self
    }

    /// Replaces the whole rule book.
    pub fn rules(mut self, rules: RuleBook) -> Self {
        self.rules = rules;
        self
    }

    /// Sets where finished sessions are recorded.
    pub fn archive(mut self, archive: impl ReplayArchive) -> Self {
        self.archive = Arc::new(archive);
        self
    }

    /// Builds the coordinator and the channel its notices arrive on.
    ///
    /// # Errors
    /// [`ParlorError::Config`] if no rule engine was registered.
    pub fn build<A: AccountDirectory>(
        self,
        directory: A,
    ) -> Result<(Coordinator<A>, NoticeReceiver), ParlorError> {
        if GameType::ALL.iter().all(|g| !self.rules.supports(*g)) {
            return Err(ParlorError::Config(
                "at least one rule engine must be registered".into(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let registry =
            SessionRegistry::new(self.config.session.clone(), self.rules, self.archive, tx.clone());
        let desk = ChallengeDesk::new(
            directory,
            registry.clone(),
            self.config.challenge.clone(),
            tx,
        );

        tracing::info!(bot = %self.config.bot_user, "coordinator ready");
        Ok((
            Coordinator {
                config: Arc::new(self.config),
                registry,
                desk,
            },
            rx,
        ))
    }
}

/// The session-coordination core, as seen by the command layer.
///
/// Cheap to clone; every clone drives the same registry and desk.
pub struct Coordinator<A: AccountDirectory> {
    config: Arc<ParlorConfig>,
    registry: SessionRegistry,
    desk: ChallengeDesk<A>,
}

impl<A: AccountDirectory> Clone for Coordinator<A> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            registry: self.registry.clone(),
            desk: self.desk.clone(),
        }
    }
}

impl<A: AccountDirectory> Coordinator<A> {
    pub fn config(&self) -> &ParlorConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn desk(&self) -> &ChallengeDesk<A> {
        &self.desk
    }

    // -- Challenges -------------------------------------------------------

    /// Opens a challenge. If the pair already has a live session of this
    /// game in this guild, fails with `ChallengeError::DuplicateSession`
    /// carrying that session.
    pub async fn propose_challenge(
        &self,
        request: ChallengeRequest,
    ) -> Result<ChallengeHandle, ParlorError> {
        Ok(self.desk.propose(request).await?)
    }

    pub async fn confirm_challenge(
        &self,
        challenge: ChallengeId,
        by: UserId,
    ) -> Result<(), ParlorError> {
        Ok(self.desk.confirm(challenge, by).await?)
    }

    /// The target accepts (opening the session) or declines.
    pub async fn respond_to_challenge(
        &self,
        challenge: ChallengeId,
        by: UserId,
        accept: bool,
    ) -> Result<ChallengeOutcome, ParlorError> {
        Ok(self.desk.respond(challenge, by, accept).await?)
    }

    pub async fn cancel_challenge(
        &self,
        challenge: ChallengeId,
        by: UserId,
    ) -> Result<(), ParlorError> {
        Ok(self.desk.cancel(challenge, by).await?)
    }

    /// Any live session between `users` for `game` in `guild`, so the
    /// presentation layer can link to it instead of starting a challenge.
    pub async fn find_existing_session(
        &self,
        users: [UserId; 2],
        game: GameType,
        guild: GuildId,
    ) -> Option<SessionHandle> {
        self.registry.lookup_duplicate(users, game, guild).await
    }

    // -- Sessions ---------------------------------------------------------

    pub async fn signal_ready(
        &self,
        thread: ThreadId,
        user: UserId,
    ) -> Result<ReadyOutcome, ParlorError> {
        Ok(self.session(thread).await?.signal_ready(user).await?)
    }

    pub async fn submit_move(
        &self,
        thread: ThreadId,
        user: UserId,
        request: MoveRequest,
    ) -> Result<MoveOutcome, ParlorError> {
        Ok(self.session(thread).await?.submit_move(user, request).await?)
    }

    pub async fn propose_draw(&self, thread: ThreadId, user: UserId) -> Result<(), ParlorError> {
        Ok(self.session(thread).await?.propose_draw(user).await?)
    }

    pub async fn rescind_draw(&self, thread: ThreadId, user: UserId) -> Result<(), ParlorError> {
        Ok(self.session(thread).await?.rescind_draw(user).await?)
    }

    pub async fn accept_draw(
        &self,
        thread: ThreadId,
        user: UserId,
    ) -> Result<Termination, ParlorError> {
        Ok(self.session(thread).await?.accept_draw(user).await?)
    }

    pub async fn forfeit(&self, thread: ThreadId, user: UserId) -> Result<Termination, ParlorError> {
        Ok(self.session(thread).await?.forfeit(user).await?)
    }

    /// Closes the session in `thread` for a platform-side reason.
    ///
    /// Platform events can arrive more than once, so a thread with no live
    /// session is not an error: returns `Ok(None)` and the registry entry,
    /// if any, is dropped.
    pub async fn force_close(
        &self,
        thread: ThreadId,
        cause: ForceCloseCause,
    ) -> Result<Option<Termination>, ParlorError> {
        let handle = match self.registry.lookup(thread).await {
            Ok(handle) => handle,
            Err(SessionError::NotFound(_)) => {
                tracing::debug!(%thread, %cause, "force-close for a thread with no live session");
                self.registry.deregister(thread).await;
                return Ok(None);
            }
            Err(SessionError::Terminated(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match handle.force_close(cause).await {
            Ok(termination) => Ok(Some(termination)),
            Err(SessionError::Terminated(_) | SessionError::Unavailable(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The hosting thread was deleted.
    pub async fn thread_deleted(&self, thread: ThreadId) -> Result<Option<Termination>, ParlorError> {
        self.force_close(thread, ForceCloseCause::ThreadDeleted).await
    }

    /// `user` left the hosting thread. Ignored unless they are playing there.
    pub async fn participant_left(
        &self,
        thread: ThreadId,
        user: UserId,
    ) -> Result<Option<Termination>, ParlorError> {
        match self.registry.lookup(thread).await {
            Ok(handle) if handle.involves(user) => {
                self.force_close(thread, ForceCloseCause::ParticipantLeft { user })
                    .await
            }
            _ => Ok(None),
        }
    }

    /// A read-only copy of the session in `thread`. A recently ended session
    /// still answers with its final state.
    pub async fn get_session(&self, thread: ThreadId) -> Result<SessionSnapshot, ParlorError> {
        Ok(self.registry.snapshot(thread).await?)
    }

    /// Live sessions `user` is playing in.
    pub async fn sessions_for(&self, user: UserId) -> Vec<SessionHandle> {
        self.registry.sessions_for(user).await
    }

    /// Force-closes every live session with cause `Shutdown`. Each one is
    /// archived exactly once. New sessions are refused afterwards.
    pub async fn shutdown(&self) -> usize {
        let closed = self.registry.shutdown().await;
        tracing::info!(closed, "coordinator shut down");
        closed
    }

    async fn session(&self, thread: ThreadId) -> Result<SessionHandle, SessionError> {
        self.registry.lookup(thread).await
    }
}
