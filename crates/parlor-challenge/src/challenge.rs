//! Challenge actor: one Tokio task per open challenge.
//!
//! ```text
//! Pending ──(challenger confirms)──→ ConfirmedByChallenger ──(target responds)──→ Accepted | Declined
//!    │                                        │
//!    └──────── cancel / phase deadline ───────┴──→ Canceled | Expired
//! ```
//!
//! Each phase has its own deadline. The actor `select!`s between its
//! command channel and that deadline, so a late response and an expiry
//! cannot both win. Once the challenge resolves the actor publishes the
//! outcome, removes itself from the desk's table, and exits, dropping its
//! receiver; commands still in flight fail with `Resolved`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parlor_protocol::{
    ChallengeId, Contestant, GameType, GuildId, Notice, NoticeEvent, ThreadId, UserId,
};
use parlor_session::{NoticeSender, SessionError, SessionHandle, SessionRegistry, SessionSpec};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::{self, Instant};

use crate::{ChallengeConfig, ChallengeError};

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

/// Where a challenge is in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeState {
    Pending,
    ConfirmedByChallenger,
    Accepted,
    Declined,
    Canceled,
    Expired,
}

impl ChallengeState {
    /// Returns `true` once the challenge can no longer change.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending | Self::ConfirmedByChallenger)
    }
}

impl fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::ConfirmedByChallenger => write!(f, "ConfirmedByChallenger"),
            Self::Accepted => write!(f, "Accepted"),
            Self::Declined => write!(f, "Declined"),
            Self::Canceled => write!(f, "Canceled"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}

/// A request to open a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequest {
    pub challenger: Contestant,
    pub target: Contestant,
    pub game: GameType,
    pub guild: GuildId,
    /// The thread the session will be hosted in if accepted.
    pub thread: ThreadId,
}

/// A read-only view of a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub id: ChallengeId,
    pub challenger: Contestant,
    pub target: Contestant,
    pub game: GameType,
    pub guild: GuildId,
    pub thread: ThreadId,
    pub state: ChallengeState,
    pub created_at_ms: u64,
}

impl Challenge {
    /// The user whose action the challenge is waiting on.
    pub fn awaiting(&self) -> Option<UserId> {
        match self.state {
            ChallengeState::Pending => Some(self.challenger.user),
            ChallengeState::ConfirmedByChallenger => Some(self.target.user),
            _ => None,
        }
    }
}

/// How a challenge resolved.
#[derive(Debug, Clone)]
pub enum ChallengeOutcome {
    /// The target accepted; the session is open in the challenge's thread.
    Accepted(SessionHandle),
    Declined,
    /// One side called it off.
    Canceled { by: UserId },
    /// `awaiting` did not act before the phase deadline.
    Expired { awaiting: UserId },
    /// The target accepted but the session could not be opened.
    Failed(SessionError),
}

impl ChallengeOutcome {
    /// The session, if one was opened.
    pub fn session(&self) -> Option<&SessionHandle> {
        match self {
            Self::Accepted(handle) => Some(handle),
            _ => None,
        }
    }
}

pub(crate) type ChallengeTable = Arc<Mutex<HashMap<ChallengeId, ChallengeHandle>>>;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<Result<T, ChallengeError>>;

pub(crate) enum ChallengeCommand {
    Confirm {
        by: UserId,
        reply: Reply<()>,
    },
    Respond {
        by: UserId,
        accept: bool,
        reply: Reply<ChallengeOutcome>,
    },
    Cancel {
        by: UserId,
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<Challenge>,
    },
}

/// Handle to an open challenge. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChallengeHandle {
    id: ChallengeId,
    thread: ThreadId,
    sender: mpsc::Sender<ChallengeCommand>,
    outcome: watch::Receiver<Option<ChallengeOutcome>>,
}

impl ChallengeHandle {
    pub fn id(&self) -> ChallengeId {
        self.id
    }

    /// The thread the session will be hosted in.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// The challenger confirms they meant to issue the challenge.
    pub async fn confirm(&self, by: UserId) -> Result<(), ChallengeError> {
        self.request(|reply| ChallengeCommand::Confirm { by, reply })
            .await?
    }

    /// The target accepts or declines. Accepting opens the session.
    pub async fn respond(
        &self,
        by: UserId,
        accept: bool,
    ) -> Result<ChallengeOutcome, ChallengeError> {
        self.request(|reply| ChallengeCommand::Respond { by, accept, reply })
            .await?
    }

    /// Either side calls the challenge off.
    pub async fn cancel(&self, by: UserId) -> Result<(), ChallengeError> {
        self.request(|reply| ChallengeCommand::Cancel { by, reply })
            .await?
    }

    /// The current view of the challenge.
    pub async fn snapshot(&self) -> Result<Challenge, ChallengeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(ChallengeCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| ChallengeError::Resolved(self.id))?;
        reply_rx.await.map_err(|_| ChallengeError::Resolved(self.id))
    }

    /// The outcome, if already resolved.
    pub fn try_outcome(&self) -> Option<ChallengeOutcome> {
        self.outcome.borrow().clone()
    }

    /// Waits until the challenge resolves.
    pub async fn outcome(&self) -> Result<ChallengeOutcome, ChallengeError> {
        let mut rx = self.outcome.clone();
        let resolved = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ChallengeError::Unavailable(self.id))?;
        let outcome: Option<ChallengeOutcome> = (*resolved).clone();
        outcome.ok_or(ChallengeError::Unavailable(self.id))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> ChallengeCommand,
    ) -> Result<Result<T, ChallengeError>, ChallengeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| ChallengeError::Resolved(self.id))?;
        reply_rx.await.map_err(|_| ChallengeError::Resolved(self.id))
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ChallengeActor {
    challenge: Challenge,
    deadline: Instant,
    config: ChallengeConfig,
    registry: SessionRegistry,
    notices: NoticeSender,
    table: ChallengeTable,
    outcome: watch::Sender<Option<ChallengeOutcome>>,
    receiver: mpsc::Receiver<ChallengeCommand>,
}

impl ChallengeActor {
    async fn run(mut self) {
        let id = self.challenge.id;
        tracing::debug!(challenge = %id, "challenge actor started");

        while !self.challenge.state.is_resolved() {
            let deadline = self.deadline;
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                () = time::sleep_until(deadline) => self.expire().await,
            }
        }

        tracing::debug!(challenge = %id, state = %self.challenge.state, "challenge actor stopped");
    }

    async fn handle(&mut self, cmd: ChallengeCommand) {
        match cmd {
            ChallengeCommand::Confirm { by, reply } => {
                let result = self.confirm(by);
                let _ = reply.send(result);
            }
            ChallengeCommand::Respond { by, accept, reply } => {
                let result = self.respond(by, accept).await;
                let _ = reply.send(result);
            }
            ChallengeCommand::Cancel { by, reply } => {
                let result = self.cancel(by).await;
                let _ = reply.send(result);
            }
            ChallengeCommand::Snapshot { reply } => {
                let _ = reply.send(self.challenge.clone());
            }
        }
    }

    fn confirm(&mut self, by: UserId) -> Result<(), ChallengeError> {
        if by != self.challenge.challenger.user {
            return Err(ChallengeError::NotChallenger(by));
        }
        if self.challenge.state != ChallengeState::Pending {
            return Err(ChallengeError::InvalidState(self.challenge.state));
        }

        self.challenge.state = ChallengeState::ConfirmedByChallenger;
        self.deadline = Instant::now() + self.config.response_timeout();
        let target = self.challenge.target.user;
        self.notify(Notice::to_user(
            self.challenge.thread,
            target,
            NoticeEvent::ChallengeReceived {
                challenge: self.challenge.id,
                challenger: by,
                game: self.challenge.game,
            },
        ));
        tracing::info!(challenge = %self.challenge.id, %by, %target, "challenge confirmed");
        Ok(())
    }

    async fn respond(
        &mut self,
        by: UserId,
        accept: bool,
    ) -> Result<ChallengeOutcome, ChallengeError> {
        if by != self.challenge.target.user {
            return Err(ChallengeError::NotTarget(by));
        }
        if self.challenge.state != ChallengeState::ConfirmedByChallenger {
            return Err(ChallengeError::InvalidState(self.challenge.state));
        }

        if !accept {
            self.notify(Notice::to_all(
                self.challenge.thread,
                NoticeEvent::ChallengeDeclined {
                    challenge: self.challenge.id,
                },
            ));
            tracing::info!(challenge = %self.challenge.id, %by, "challenge declined");
            let outcome = ChallengeOutcome::Declined;
            self.resolve(ChallengeState::Declined, outcome.clone()).await;
            return Ok(outcome);
        }

        let spec = SessionSpec::drawn(
            self.challenge.thread,
            self.challenge.guild,
            self.challenge.game,
            self.challenge.challenger.clone(),
            self.challenge.target.clone(),
        );
        match self.registry.register(spec).await {
            Ok(session) => {
                tracing::info!(
                    challenge = %self.challenge.id,
                    thread = %session.thread(),
                    game = %self.challenge.game,
                    "challenge accepted, session opened"
                );
                let outcome = ChallengeOutcome::Accepted(session);
                self.resolve(ChallengeState::Accepted, outcome.clone()).await;
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(challenge = %self.challenge.id, error = %e, "accepted challenge could not open a session");
                self.resolve(ChallengeState::Canceled, ChallengeOutcome::Failed(e.clone()))
                    .await;
                Err(ChallengeError::Session(e))
            }
        }
    }

    async fn cancel(&mut self, by: UserId) -> Result<(), ChallengeError> {
        if by != self.challenge.challenger.user && by != self.challenge.target.user {
            return Err(ChallengeError::NotInvolved(by));
        }

        self.notify(Notice::to_all(
            self.challenge.thread,
            NoticeEvent::ChallengeCanceled {
                challenge: self.challenge.id,
                by,
            },
        ));
        tracing::info!(challenge = %self.challenge.id, %by, "challenge canceled");
        self.resolve(ChallengeState::Canceled, ChallengeOutcome::Canceled { by })
            .await;
        Ok(())
    }

    async fn expire(&mut self) {
        let Some(awaiting) = self.challenge.awaiting() else {
            return;
        };
        self.notify(Notice::to_all(
            self.challenge.thread,
            NoticeEvent::ChallengeExpired {
                challenge: self.challenge.id,
                awaiting,
            },
        ));
        tracing::info!(
            challenge = %self.challenge.id,
            %awaiting,
            state = %self.challenge.state,
            "challenge expired"
        );
        self.resolve(ChallengeState::Expired, ChallengeOutcome::Expired { awaiting })
            .await;
    }

    /// Leaves the desk's table first, so a caller who sees the outcome
    /// will no longer find the challenge.
    async fn resolve(&mut self, state: ChallengeState, outcome: ChallengeOutcome) {
        self.challenge.state = state;
        self.table.lock().await.remove(&self.challenge.id);
        self.outcome.send_replace(Some(outcome));
    }

    fn notify(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            tracing::trace!(challenge = %self.challenge.id, "notice receiver gone, dropping");
        }
    }
}

/// Everything a challenge actor shares with its desk.
pub(crate) struct ChallengeContext {
    pub config: ChallengeConfig,
    pub registry: SessionRegistry,
    pub notices: NoticeSender,
    pub table: ChallengeTable,
}

/// Spawns the actor for a new `Pending` challenge and prompts the
/// challenger to confirm.
pub(crate) fn spawn_challenge(
    id: ChallengeId,
    request: ChallengeRequest,
    ctx: ChallengeContext,
) -> ChallengeHandle {
    let (tx, rx) = mpsc::channel(8);
    let (outcome_tx, outcome_rx) = watch::channel(None);

    let challenge = Challenge {
        id,
        challenger: request.challenger,
        target: request.target,
        game: request.game,
        guild: request.guild,
        thread: request.thread,
        state: ChallengeState::Pending,
        created_at_ms: now_ms(),
    };
    let actor = ChallengeActor {
        deadline: Instant::now() + ctx.config.confirm_timeout(),
        notices: ctx.notices,
        config: ctx.config,
        registry: ctx.registry,
        table: ctx.table,
        outcome: outcome_tx,
        receiver: rx,
        challenge,
    };
    actor.notify(Notice::to_user(
        actor.challenge.thread,
        actor.challenge.challenger.user,
        NoticeEvent::ConfirmChallenge {
            challenge: id,
            target: actor.challenge.target.user,
            game: actor.challenge.game,
        },
    ));

    let handle = ChallengeHandle {
        id,
        thread: actor.challenge.thread,
        sender: tx,
        outcome: outcome_rx,
    };
    tokio::spawn(actor.run());
    handle
}
