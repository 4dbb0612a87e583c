//! Session actor: an isolated Tokio task that owns one [`Session`].
//!
//! Every operation on a session becomes a [`SessionCommand`] on the
//! actor's channel, so operations on one session run one at a time while
//! different sessions proceed independently. The actor also owns the
//! session's [`InactivityWatchdog`] and selects on it next to the channel.
//!
//! When the session reaches a terminal state the actor disarms the
//! watchdog, hands the record to the archive, and releases its registry
//! entry, in that order and exactly once. It then keeps answering (reads
//! succeed, mutations fail with `Terminated`) until every handle is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parlor_protocol::{ForceCloseCause, GameType, GuildId, Notice, Termination, ThreadId, UserId};
use parlor_watchdog::InactivityWatchdog;
use tokio::sync::{mpsc, oneshot};

use crate::registry::RegistryLink;
use crate::{
    LobbyTimeoutPolicy, MoveOutcome, MoveRequest, ReadyOutcome, ReplayArchive, RuleEngine,
    Session, SessionConfig, SessionError, SessionSnapshot, SessionSpec,
};

/// Channel the session layer publishes [`Notice`]s on.
pub type NoticeSender = mpsc::UnboundedSender<Notice>;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Commands sent to a session actor through its channel.
pub(crate) enum SessionCommand {
    Ready {
        user: UserId,
        reply: Reply<ReadyOutcome>,
    },
    Move {
        user: UserId,
        request: MoveRequest,
        reply: Reply<MoveOutcome>,
    },
    ProposeDraw {
        user: UserId,
        reply: Reply<()>,
    },
    RescindDraw {
        user: UserId,
        reply: Reply<()>,
    },
    AcceptDraw {
        user: UserId,
        reply: Reply<Termination>,
    },
    Forfeit {
        user: UserId,
        reply: Reply<Termination>,
    },
    ForceClose {
        cause: ForceCloseCause,
        reply: Reply<Termination>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Handle to a running session actor.
///
/// Cheap to clone. The registry holds one per live session; callers get
/// clones from lookups.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    thread: ThreadId,
    guild: GuildId,
    game: GameType,
    users: [UserId; 2],
    serial: u64,
    ended: Arc<AtomicBool>,
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// The hosting thread, which is also the session id.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn guild(&self) -> GuildId {
        self.guild
    }

    pub fn game(&self) -> GameType {
        self.game
    }

    /// Participants' user ids in seat order.
    pub fn users(&self) -> [UserId; 2] {
        self.users
    }

    /// Whether `user` is one of the two participants.
    pub fn involves(&self, user: UserId) -> bool {
        self.users.contains(&user)
    }

    /// Whether the pair `users` (in either order) is playing here.
    pub fn pairs(&self, users: [UserId; 2]) -> bool {
        self.users == users || self.users == [users[1], users[0]]
    }

    /// `false` once the session has reached a terminal state.
    pub fn is_live(&self) -> bool {
        !self.ended.load(Ordering::Acquire)
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    /// Signals that `user` is ready to start.
    pub async fn signal_ready(&self, user: UserId) -> Result<ReadyOutcome, SessionError> {
        self.request(|reply| SessionCommand::Ready { user, reply })
            .await?
    }

    /// Submits a move for `user`.
    pub async fn submit_move(
        &self,
        user: UserId,
        request: MoveRequest,
    ) -> Result<MoveOutcome, SessionError> {
        self.request(|reply| SessionCommand::Move {
            user,
            request,
            reply,
        })
        .await?
    }

    pub async fn propose_draw(&self, user: UserId) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::ProposeDraw { user, reply })
            .await?
    }

    pub async fn rescind_draw(&self, user: UserId) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::RescindDraw { user, reply })
            .await?
    }

    pub async fn accept_draw(&self, user: UserId) -> Result<Termination, SessionError> {
        self.request(|reply| SessionCommand::AcceptDraw { user, reply })
            .await?
    }

    pub async fn forfeit(&self, user: UserId) -> Result<Termination, SessionError> {
        self.request(|reply| SessionCommand::Forfeit { user, reply })
            .await?
    }

    /// Closes the session for a platform-side reason.
    pub async fn force_close(&self, cause: ForceCloseCause) -> Result<Termination, SessionError> {
        self.request(|reply| SessionCommand::ForceClose { cause, reply })
            .await?
    }

    /// A read-only copy of the session. Works after the session ended.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable(self.thread))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Unavailable(self.thread))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<Result<T, SessionError>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable(self.thread))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Unavailable(self.thread))
    }
}

// ---------------------------------------------------------------------------
// SessionActor
// ---------------------------------------------------------------------------

/// The internal actor state. Runs inside a Tokio task.
struct SessionActor {
    session: Session,
    watchdog: InactivityWatchdog,
    lobby_timeout: LobbyTimeoutPolicy,
    archive: Arc<dyn ReplayArchive>,
    notices: NoticeSender,
    link: RegistryLink,
    ended: Arc<AtomicBool>,
    concluded: bool,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    /// Runs until every handle is dropped.
    async fn run(mut self) {
        let thread = self.session.thread();
        tracing::info!(%thread, game = %self.session.game(), "session actor started");
        self.flush();

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                expiry = self.watchdog.expired() => {
                    tracing::info!(
                        %thread,
                        idle_secs = expiry.idle_for.as_secs_f64(),
                        "session idle past deadline"
                    );
                    if let Err(e) = self.session.expire(self.lobby_timeout) {
                        tracing::debug!(%thread, error = %e, "timeout raced a terminal transition");
                    }
                    self.settle(false).await;
                }
            }
        }

        // Every handle is gone, including the registry's.
        if !self.session.is_terminal() {
            tracing::warn!(%thread, "all handles dropped on a live session, closing");
            let _ = self.session.force_close(ForceCloseCause::Shutdown);
            self.settle(false).await;
        }

        tracing::info!(%thread, "session actor stopped");
    }

    async fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Ready { user, reply } => {
                let result = self.session.signal_ready(user);
                self.settle(result.is_ok()).await;
                let _ = reply.send(result);
            }
            SessionCommand::Move {
                user,
                request,
                reply,
            } => {
                let result = self.session.submit_move(user, request);
                self.settle(matches!(result, Ok(MoveOutcome::Accepted(_))))
                    .await;
                let _ = reply.send(result);
            }
            SessionCommand::ProposeDraw { user, reply } => {
                let result = self.session.propose_draw(user);
                self.settle(result.is_ok()).await;
                let _ = reply.send(result);
            }
            SessionCommand::RescindDraw { user, reply } => {
                let result = self.session.rescind_draw(user);
                self.settle(result.is_ok()).await;
                let _ = reply.send(result);
            }
            SessionCommand::AcceptDraw { user, reply } => {
                let result = self.session.accept_draw(user);
                self.settle(false).await;
                let _ = reply.send(result);
            }
            SessionCommand::Forfeit { user, reply } => {
                let result = self.session.forfeit(user);
                self.settle(false).await;
                let _ = reply.send(result);
            }
            SessionCommand::ForceClose { cause, reply } => {
                let result = self.session.force_close(cause);
                self.settle(false).await;
                let _ = reply.send(result);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
        }
    }

    /// Runs after every command: feeds the watchdog on activity, publishes
    /// notices, and concludes a session that just ended. Replies go out
    /// after this, so a caller that sees a terminal result will no longer
    /// find the session in the registry.
    async fn settle(&mut self, activity: bool) {
        if activity && !self.session.is_terminal() {
            self.watchdog.feed();
        }
        self.flush();
        self.conclude().await;
    }

    fn flush(&mut self) {
        for notice in self.session.drain_notices() {
            if self.notices.send(notice).is_err() {
                tracing::trace!(thread = %self.session.thread(), "notice receiver gone, dropping");
            }
        }
    }

    async fn conclude(&mut self) {
        if self.concluded || !self.session.is_terminal() {
            return;
        }
        self.concluded = true;
        self.ended.store(true, Ordering::Release);
        self.watchdog.disarm();

        if let Some(record) = self.session.record() {
            self.archive.archive(record);
        }
        self.link.release(self.session.snapshot()).await;
    }
}

/// Everything the registry passes to a new actor.
pub(crate) struct SpawnContext {
    pub config: SessionConfig,
    pub engine: Arc<dyn RuleEngine>,
    pub archive: Arc<dyn ReplayArchive>,
    pub notices: NoticeSender,
    pub link: RegistryLink,
}

/// Builds the session, spawns its actor, and returns a handle.
///
/// # Errors
/// Whatever [`Session::new`] rejects; nothing is spawned in that case.
pub(crate) fn spawn_session(
    spec: SessionSpec,
    serial: u64,
    ctx: SpawnContext,
) -> Result<SessionHandle, SessionError> {
    let users = spec.users();
    let session = Session::new(spec, ctx.engine)?;
    let (tx, rx) = mpsc::channel(ctx.config.command_buffer.max(1));
    let ended = Arc::new(AtomicBool::new(false));

    let handle = SessionHandle {
        thread: session.thread(),
        guild: session.guild(),
        game: session.game(),
        users,
        serial,
        ended: Arc::clone(&ended),
        sender: tx,
    };

    let actor = SessionActor {
        session,
        watchdog: InactivityWatchdog::new(ctx.config.watchdog()),
        lobby_timeout: ctx.config.lobby_timeout,
        archive: ctx.archive,
        notices: ctx.notices,
        link: ctx.link,
        ended,
        concluded: false,
        receiver: rx,
    };
    tokio::spawn(actor.run());

    Ok(handle)
}
