//! The session state machine for one game instance.
//!
//! [`Session`] is plain synchronous data: it owns the lobby latches, the
//! turn pointer, the move history, the draw proposal, and the termination
//! reason, and every mutation goes through one of its methods. It knows
//! nothing about tasks or channels; the actor in `actor.rs` owns one and
//! serializes access to it.
//!
//! Every method checks, in order: terminal state, membership, lifecycle
//! state, then the operation's own preconditions. A method that returns
//! `Err` has not changed anything, with one exception: a rule engine that
//! breaks the verdict contract stops the session (see [`Session::submit_move`]).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parlor_protocol::{
    Contestant, ForceCloseCause, ForfeitKind, GameType, GuildId, Notice, NoticeEvent,
    Participant, Seat, Termination, ThreadId, UserId,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    GameState, LobbyTimeoutPolicy, MovePayload, RuleEngine, SessionError, SessionRecord,
    SessionState, Verdict,
};

/// Wall-clock Unix milliseconds, used for record timestamps only.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// One entry in a session's append-only move history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// 1-based, strictly increasing.
    pub seq: u64,
    pub user: UserId,
    pub seat: Seat,
    pub payload: MovePayload,
    pub at_ms: u64,
}

/// A move submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub payload: MovePayload,
    /// The history length the mover saw. When set and out of date, the
    /// move fails with [`SessionError::StaleTurn`].
    #[serde(default)]
    pub ply: Option<u64>,
}

impl MoveRequest {
    /// A move with no staleness check.
    pub fn new(payload: MovePayload) -> Self {
        Self { payload, ply: None }
    }

    /// A move made against the board at `ply`.
    pub fn at_ply(payload: MovePayload, ply: u64) -> Self {
        Self {
            payload,
            ply: Some(ply),
        }
    }
}

/// Result of a successful readiness signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// Still waiting on the other participant.
    Waiting,
    /// Both are ready; the game is now active and `first` moves.
    Started { first: UserId },
}

/// A legal move that was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveAccepted {
    /// History length after the move.
    pub ply: u64,
    /// Board after the move.
    pub state: GameState,
    /// Set when the move ended the game.
    pub termination: Option<Termination>,
}

/// Result of a move submission that reached the rule engine.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Accepted(MoveAccepted),
    /// The engine refused the move. Nothing changed.
    Illegal { reason: String },
}

// ---------------------------------------------------------------------------
// SessionSpec
// ---------------------------------------------------------------------------

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub thread: ThreadId,
    pub guild: GuildId,
    pub game: GameType,
    /// Ordered by seat: index 0 moves first.
    pub participants: [Participant; 2],
}

impl SessionSpec {
    /// Draws seats at random between two contestants.
    pub fn drawn(
        thread: ThreadId,
        guild: GuildId,
        game: GameType,
        a: Contestant,
        b: Contestant,
    ) -> Self {
        let (first, second) = if rand::rng().random_bool(0.5) {
            (a, b)
        } else {
            (b, a)
        };
        Self::seated(thread, guild, game, first, second)
    }

    /// Uses a fixed seat order: `first` moves first.
    pub fn seated(
        thread: ThreadId,
        guild: GuildId,
        game: GameType,
        first: Contestant,
        second: Contestant,
    ) -> Self {
        Self {
            thread,
            guild,
            game,
            participants: [first.seated(Seat::First), second.seated(Seat::Second)],
        }
    }

    /// The two user ids, in seat order.
    pub fn users(&self) -> [UserId; 2] {
        [self.participants[0].user, self.participants[1].user]
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// A read-only copy of a session, safe to hand to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub thread: ThreadId,
    pub guild: GuildId,
    pub game: GameType,
    pub state: SessionState,
    pub participants: [Participant; 2],
    pub ready: [bool; 2],
    /// Seat to act; only set while `Active`.
    pub turn: Option<Seat>,
    pub board: GameState,
    pub history: Vec<MoveRecord>,
    /// Who has a draw proposal open.
    pub draw_offer: Option<UserId>,
    pub termination: Option<Termination>,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
}

impl SessionSnapshot {
    /// The participant for `user`, if they are playing.
    pub fn participant(&self, user: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user == user)
    }

    /// The participant expected to move, if the game is active.
    pub fn to_move(&self) -> Option<&Participant> {
        self.turn.map(|seat| &self.participants[seat.index()])
    }

    /// Current history length.
    pub fn ply(&self) -> u64 {
        self.history.len() as u64
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One game instance between exactly two participants.
pub struct Session {
    thread: ThreadId,
    guild: GuildId,
    game: GameType,
    participants: [Participant; 2],
    ready: [bool; 2],
    state: SessionState,
    turn: Seat,
    board: GameState,
    history: Vec<MoveRecord>,
    draw_offer: Option<UserId>,
    termination: Option<Termination>,
    created_at_ms: u64,
    last_activity_ms: u64,
    ended_at_ms: Option<u64>,
    engine: Arc<dyn RuleEngine>,
    outbox: Vec<Notice>,
}

impl Session {
    /// Creates a session in the lobby.
    ///
    /// # Errors
    /// [`SessionError::Fatal`] if `spec` does not hold two distinct
    /// participants seated first and second.
    pub fn new(spec: SessionSpec, engine: Arc<dyn RuleEngine>) -> Result<Self, SessionError> {
        let [first, second] = &spec.participants;
        if first.user == second.user {
            return Err(SessionError::Fatal(format!(
                "session in {} needs two distinct participants, got {} twice",
                spec.thread, first.user
            )));
        }
        if first.seat != Seat::First || second.seat != Seat::Second {
            return Err(SessionError::Fatal(format!(
                "session in {} has seats out of order",
                spec.thread
            )));
        }

        let now = now_ms();
        let board = engine.initial_state();
        let opened = Notice::to_all(
            spec.thread,
            NoticeEvent::SessionOpened {
                game: spec.game,
                first: first.user,
                second: second.user,
            },
        );

        Ok(Self {
            thread: spec.thread,
            guild: spec.guild,
            game: spec.game,
            participants: spec.participants,
            ready: [false, false],
            state: SessionState::Lobby,
            turn: Seat::First,
            board,
            history: Vec::new(),
            draw_offer: None,
            termination: None,
            created_at_ms: now,
            last_activity_ms: now,
            ended_at_ms: None,
            engine,
            outbox: vec![opened],
        })
    }

    // -- Lobby ------------------------------------------------------------

    /// Latches `user` as ready. Starts the game when both are ready.
    pub fn signal_ready(&mut self, user: UserId) -> Result<ReadyOutcome, SessionError> {
        self.ensure_live()?;
        let seat = self.seat_of(user)?;
        // Both latches are set once Active, so this also covers readying
        // up mid-game.
        if self.ready[seat.index()] {
            return Err(SessionError::AlreadyReady(user));
        }

        self.ready[seat.index()] = true;
        self.touch();
        self.notify_all(NoticeEvent::PlayerReady { user });
        tracing::debug!(thread = %self.thread, %user, "participant ready");

        if self.ready != [true, true] {
            return Ok(ReadyOutcome::Waiting);
        }

        self.state = SessionState::Active;
        self.turn = Seat::First;
        let first = self.participants[Seat::First.index()].user;
        self.notify_all(NoticeEvent::GameStarted { first });
        self.prompt_turn();
        tracing::info!(thread = %self.thread, game = %self.game, %first, "game started");
        Ok(ReadyOutcome::Started { first })
    }

    // -- Moves ------------------------------------------------------------

    /// Submits a move for the participant at the turn pointer.
    ///
    /// Illegal moves come back as `Ok(MoveOutcome::Illegal)` and change
    /// nothing. A verdict that breaks the engine contract stops the
    /// session as `ForceClosed` (cause `Fault`) and returns
    /// [`SessionError::Fatal`].
    pub fn submit_move(
        &mut self,
        user: UserId,
        request: MoveRequest,
    ) -> Result<MoveOutcome, SessionError> {
        self.ensure_live()?;
        let seat = self.seat_of(user)?;
        if !self.state.is_active() {
            return Err(SessionError::NotActive(self.state));
        }
        if seat != self.turn {
            return Err(SessionError::NotYourTurn(user));
        }
        let ply = self.ply();
        if let Some(got) = request.ply {
            if got != ply {
                return Err(SessionError::StaleTurn { expected: ply, got });
            }
        }

        let verdict = self.engine.apply(&self.board, seat, &request.payload);
        if let Some(breach) = verdict.contract_breach() {
            return Err(self.fault(breach));
        }

        match verdict {
            Verdict::Illegal { reason } => {
                tracing::debug!(thread = %self.thread, %user, %reason, "illegal move");
                Ok(MoveOutcome::Illegal { reason })
            }
            Verdict::Legal {
                state,
                terminal,
                winner,
                ..
            } => {
                let at_ms = now_ms();
                let seq = ply + 1;
                self.history.push(MoveRecord {
                    seq,
                    user,
                    seat,
                    payload: request.payload,
                    at_ms,
                });
                self.board = state;
                self.turn = seat.other();
                self.last_activity_ms = at_ms;
                self.notify_all(NoticeEvent::MovePlayed { user, ply: seq });
                tracing::debug!(thread = %self.thread, %user, ply = seq, "move accepted");

                let termination = if terminal {
                    let winner = winner.map(|s| self.participants[s.index()].user);
                    Some(self.finish(Termination::Completed { winner }))
                } else {
                    self.prompt_turn();
                    None
                };

                Ok(MoveOutcome::Accepted(MoveAccepted {
                    ply: seq,
                    state: self.board.clone(),
                    termination,
                }))
            }
        }
    }

    // -- Draws ------------------------------------------------------------

    /// Opens a draw proposal. Only one may be outstanding.
    pub fn propose_draw(&mut self, user: UserId) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.seat_of(user)?;
        if !self.state.is_active() {
            return Err(SessionError::NotActive(self.state));
        }
        if let Some(by) = self.draw_offer {
            return Err(SessionError::DrawAlreadyProposed(by));
        }

        self.draw_offer = Some(user);
        self.touch();
        self.notify_all(NoticeEvent::DrawProposed { by: user });
        tracing::info!(thread = %self.thread, %user, "draw proposed");
        Ok(())
    }

    /// Withdraws the caller's own draw proposal.
    pub fn rescind_draw(&mut self, user: UserId) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.seat_of(user)?;
        if self.draw_offer != Some(user) {
            return Err(SessionError::NoDrawProposal);
        }

        self.draw_offer = None;
        self.touch();
        self.notify_all(NoticeEvent::DrawRescinded { by: user });
        tracing::info!(thread = %self.thread, %user, "draw rescinded");
        Ok(())
    }

    /// Accepts the opponent's draw proposal, ending the game.
    pub fn accept_draw(&mut self, user: UserId) -> Result<Termination, SessionError> {
        self.ensure_live()?;
        self.seat_of(user)?;
        if !self.state.is_active() {
            return Err(SessionError::NotActive(self.state));
        }
        match self.draw_offer {
            None => Err(SessionError::NoDrawProposal),
            Some(by) if by == user => Err(SessionError::OwnDrawProposal),
            Some(_) => {
                self.touch();
                Ok(self.finish(Termination::DrawnByAgreement))
            }
        }
    }

    // -- Endings ----------------------------------------------------------

    /// Gives up. From the lobby nobody wins; mid-game the opponent does.
    pub fn forfeit(&mut self, user: UserId) -> Result<Termination, SessionError> {
        self.ensure_live()?;
        let seat = self.seat_of(user)?;
        let winner = match self.state {
            SessionState::Lobby => None,
            _ => Some(self.participants[seat.other().index()].user),
        };
        self.touch();
        Ok(self.finish(Termination::Forfeited {
            loser: Some(user),
            winner,
            kind: ForfeitKind::Voluntary,
        }))
    }

    /// Closes the session for a reason outside the game.
    pub fn force_close(&mut self, cause: ForceCloseCause) -> Result<Termination, SessionError> {
        self.ensure_live()?;
        Ok(self.finish(Termination::ForceClosed { cause }))
    }

    /// Applies an inactivity timeout.
    ///
    /// Mid-game, the participant at the turn pointer forfeits. In the
    /// lobby, `policy` decides; the idle participants are those not ready.
    pub fn expire(&mut self, policy: LobbyTimeoutPolicy) -> Result<Termination, SessionError> {
        self.ensure_live()?;

        let idle: Vec<UserId> = match self.state {
            SessionState::Active => vec![self.participants[self.turn.index()].user],
            _ => self
                .participants
                .iter()
                .filter(|p| !self.ready[p.seat.index()])
                .map(|p| p.user)
                .collect(),
        };
        self.notify_all(NoticeEvent::InactivityTimeout { idle: idle.clone() });
        tracing::warn!(thread = %self.thread, idle = ?idle, state = %self.state, "session timed out");

        let termination = match (self.state, policy) {
            (SessionState::Active, _) => Termination::Forfeited {
                loser: Some(self.participants[self.turn.index()].user),
                winner: Some(self.participants[self.turn.other().index()].user),
                kind: ForfeitKind::Inactivity,
            },
            (_, LobbyTimeoutPolicy::ForfeitUnready) => Termination::Forfeited {
                loser: match idle.as_slice() {
                    [only] => Some(*only),
                    _ => None,
                },
                winner: None,
                kind: ForfeitKind::Inactivity,
            },
            (_, LobbyTimeoutPolicy::CloseQuietly) => Termination::ForceClosed {
                cause: ForceCloseCause::LobbyAbandoned,
            },
        };
        Ok(self.finish(termination))
    }

    // -- Reads ------------------------------------------------------------

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn guild(&self) -> GuildId {
        self.guild
    }

    pub fn game(&self) -> GameType {
        self.game
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn participants(&self) -> &[Participant; 2] {
        &self.participants
    }

    /// Seat to act, only while `Active`.
    pub fn turn(&self) -> Option<Seat> {
        self.state.is_active().then_some(self.turn)
    }

    pub fn ply(&self) -> u64 {
        self.history.len() as u64
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    pub fn board(&self) -> &GameState {
        &self.board
    }

    pub fn draw_offer(&self) -> Option<UserId> {
        self.draw_offer
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Takes the notices produced since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.outbox)
    }

    /// A read-only copy of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            thread: self.thread,
            guild: self.guild,
            game: self.game,
            state: self.state,
            participants: self.participants.clone(),
            ready: self.ready,
            turn: self.turn(),
            board: self.board.clone(),
            history: self.history.clone(),
            draw_offer: self.draw_offer,
            termination: self.termination.clone(),
            created_at_ms: self.created_at_ms,
            last_activity_ms: self.last_activity_ms,
        }
    }

    /// The archive record, once the session has ended.
    pub fn record(&self) -> Option<SessionRecord> {
        let termination = self.termination.clone()?;
        Some(SessionRecord {
            thread: self.thread,
            guild: self.guild,
            game: self.game,
            participants: self.participants.clone(),
            moves: self.history.clone(),
            final_state: self.board.clone(),
            termination,
            created_at_ms: self.created_at_ms,
            ended_at_ms: self.ended_at_ms.unwrap_or(self.last_activity_ms),
        })
    }

    // -- Internals --------------------------------------------------------

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::Terminated(self.thread));
        }
        Ok(())
    }

    fn seat_of(&self, user: UserId) -> Result<Seat, SessionError> {
        self.participants
            .iter()
            .find(|p| p.user == user)
            .map(|p| p.seat)
            .ok_or(SessionError::NotParticipant(user))
    }

    fn touch(&mut self) {
        self.last_activity_ms = now_ms();
    }

    fn notify_all(&mut self, event: NoticeEvent) {
        self.outbox.push(Notice::to_all(self.thread, event));
    }

    fn prompt_turn(&mut self) {
        let user = self.participants[self.turn.index()].user;
        let ply = self.ply();
        self.outbox
            .push(Notice::to_user(self.thread, user, NoticeEvent::YourTurn { user, ply }));
    }

    /// Stops the session after an invariant breach.
    fn fault(&mut self, detail: String) -> SessionError {
        tracing::error!(
            thread = %self.thread,
            game = %self.game,
            %detail,
            "invariant violated, stopping session for inspection"
        );
        self.finish(Termination::ForceClosed {
            cause: ForceCloseCause::Fault {
                detail: detail.clone(),
            },
        });
        SessionError::Fatal(detail)
    }

    fn finish(&mut self, termination: Termination) -> Termination {
        let next = SessionState::ended_by(&termination);
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.draw_offer = None;
        self.ended_at_ms = Some(now_ms());
        self.termination = Some(termination.clone());
        self.notify_all(NoticeEvent::SessionEnded {
            termination: termination.clone(),
        });
        tracing::info!(
            thread = %self.thread,
            game = %self.game,
            state = %self.state,
            %termination,
            plies = self.history.len(),
            "session ended"
        );
        termination
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for the session state machine, driven directly without
    //! an actor. Naming: `test_{operation}_{scenario}_{expected}`.

    use super::*;
    use parlor_protocol::Recipient;
    use serde_json::json;

    // -- Helpers ----------------------------------------------------------

    /// Players alternately add 1–3 to a running total. Reaching exactly
    /// `target` wins; overshooting it is a drawn position.
    struct CountTo {
        target: u64,
    }

    impl RuleEngine for CountTo {
        fn initial_state(&self) -> GameState {
            json!({ "total": 0 })
        }

        fn apply(&self, state: &GameState, seat: Seat, mv: &MovePayload) -> Verdict {
            let step = match mv.as_u64() {
                Some(n @ 1..=3) => n,
                _ => return Verdict::illegal("add 1, 2, or 3"),
            };
            let total = state["total"].as_u64().unwrap_or(0) + step;
            let next = json!({ "total": total });
            if total == self.target {
                Verdict::won_by(next, seat)
            } else if total > self.target {
                Verdict::drawn(next)
            } else {
                Verdict::play_on(next)
            }
        }
    }

    /// Breaks the verdict contract on every move.
    struct Broken;

    impl RuleEngine for Broken {
        fn initial_state(&self) -> GameState {
            json!(null)
        }

        fn apply(&self, state: &GameState, seat: Seat, _mv: &MovePayload) -> Verdict {
            Verdict::Legal {
                state: state.clone(),
                terminal: false,
                winner: Some(seat),
                draw: false,
            }
        }
    }

    const ALICE: UserId = UserId(1);
    const BOB: UserId = UserId(2);
    const EVE: UserId = UserId(3);

    fn spec() -> SessionSpec {
        SessionSpec::seated(
            ThreadId(100),
            GuildId(7),
            GameType::ConnectFour,
            Contestant::new(ALICE, "alice"),
            Contestant::new(BOB, "bob"),
        )
    }

    fn lobby(target: u64) -> Session {
        Session::new(spec(), Arc::new(CountTo { target })).unwrap()
    }

    fn active(target: u64) -> Session {
        let mut s = lobby(target);
        s.signal_ready(ALICE).unwrap();
        s.signal_ready(BOB).unwrap();
        s.drain_notices();
        s
    }

    fn play(s: &mut Session, user: UserId, step: u64) -> MoveOutcome {
        s.submit_move(user, MoveRequest::new(json!(step))).unwrap()
    }

    // =====================================================================
    // new()
    // =====================================================================

    #[test]
    fn test_new_same_user_twice_is_fatal() {
        let mut bad = spec();
        bad.participants[1].user = ALICE;
        let result = Session::new(bad, Arc::new(CountTo { target: 10 }));
        assert!(matches!(result, Err(SessionError::Fatal(_))));
    }

    #[test]
    fn test_new_starts_in_lobby_with_opened_notice() {
        let mut s = lobby(10);
        assert_eq!(s.state(), SessionState::Lobby);
        assert_eq!(s.turn(), None);
        assert_eq!(s.board(), &json!({ "total": 0 }));
        let notices = s.drain_notices();
        assert!(matches!(
            notices.as_slice(),
            [Notice { event: NoticeEvent::SessionOpened { first: ALICE, second: BOB, .. }, .. }]
        ));
    }

    #[test]
    fn test_drawn_spec_seats_both_contestants_once() {
        let spec = SessionSpec::drawn(
            ThreadId(1),
            GuildId(1),
            GameType::Chess,
            Contestant::new(ALICE, "alice"),
            Contestant::new(BOB, "bob"),
        );
        let mut users = spec.users();
        users.sort();
        assert_eq!(users, [ALICE, BOB]);
        assert_eq!(spec.participants[0].seat, Seat::First);
        assert_eq!(spec.participants[1].seat, Seat::Second);
    }

    // =====================================================================
    // signal_ready()
    // =====================================================================

    #[test]
    fn test_signal_ready_both_starts_game_exactly_once() {
        let mut s = lobby(10);

        assert_eq!(s.signal_ready(BOB).unwrap(), ReadyOutcome::Waiting);
        assert_eq!(s.state(), SessionState::Lobby);
        assert_eq!(
            s.signal_ready(ALICE).unwrap(),
            ReadyOutcome::Started { first: ALICE }
        );
        assert_eq!(s.state(), SessionState::Active);
        assert_eq!(s.turn(), Some(Seat::First));

        let third = s.signal_ready(ALICE);
        assert_eq!(third, Err(SessionError::AlreadyReady(ALICE)));
        assert_eq!(s.state(), SessionState::Active);
    }

    #[test]
    fn test_signal_ready_twice_in_lobby_is_rejected_without_change() {
        let mut s = lobby(10);
        s.signal_ready(ALICE).unwrap();
        let before = s.snapshot();

        assert_eq!(s.signal_ready(ALICE), Err(SessionError::AlreadyReady(ALICE)));
        assert_eq!(s.snapshot().ready, before.ready);
        assert_eq!(s.state(), SessionState::Lobby);
    }

    #[test]
    fn test_signal_ready_outsider_is_rejected() {
        let mut s = lobby(10);
        assert_eq!(s.signal_ready(EVE), Err(SessionError::NotParticipant(EVE)));
    }

    #[test]
    fn test_signal_ready_start_prompts_first_mover() {
        let mut s = lobby(10);
        s.signal_ready(ALICE).unwrap();
        s.signal_ready(BOB).unwrap();
        let notices = s.drain_notices();
        let prompt = notices
            .iter()
            .find(|n| matches!(n.event, NoticeEvent::YourTurn { .. }))
            .expect("first mover should be prompted");
        assert_eq!(prompt.recipient, Recipient::User(ALICE));
    }

    // =====================================================================
    // submit_move()
    // =====================================================================

    #[test]
    fn test_submit_move_in_lobby_is_not_active() {
        let mut s = lobby(10);
        let result = s.submit_move(ALICE, MoveRequest::new(json!(1)));
        assert_eq!(result, Err(SessionError::NotActive(SessionState::Lobby)));
    }

    #[test]
    fn test_submit_move_out_of_turn_never_touches_history() {
        let mut s = active(10);
        for _ in 0..3 {
            let result = s.submit_move(BOB, MoveRequest::new(json!(1)));
            assert_eq!(result, Err(SessionError::NotYourTurn(BOB)));
        }
        assert!(s.history().is_empty());
        assert_eq!(s.turn(), Some(Seat::First));
    }

    #[test]
    fn test_submit_move_illegal_leaves_state_unchanged() {
        let mut s = active(10);
        let outcome = play(&mut s, ALICE, 7);
        assert!(matches!(outcome, MoveOutcome::Illegal { .. }));
        assert!(s.history().is_empty());
        assert_eq!(s.turn(), Some(Seat::First));
        assert_eq!(s.board(), &json!({ "total": 0 }));
    }

    #[test]
    fn test_submit_move_legal_appends_and_passes_turn() {
        let mut s = active(10);
        let outcome = play(&mut s, ALICE, 2);

        let MoveOutcome::Accepted(accepted) = outcome else {
            panic!("expected accepted move");
        };
        assert_eq!(accepted.ply, 1);
        assert_eq!(accepted.state, json!({ "total": 2 }));
        assert_eq!(accepted.termination, None);
        assert_eq!(s.turn(), Some(Seat::Second));
        assert_eq!(s.history()[0].seq, 1);
        assert_eq!(s.history()[0].user, ALICE);

        play(&mut s, BOB, 3);
        let seqs: Vec<u64> = s.history().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn test_submit_move_stale_ply_is_conflict() {
        let mut s = active(10);
        play(&mut s, ALICE, 1);
        let result = s.submit_move(BOB, MoveRequest::at_ply(json!(1), 0));
        assert_eq!(result, Err(SessionError::StaleTurn { expected: 1, got: 0 }));
        assert_eq!(s.ply(), 1);
    }

    #[test]
    fn test_submit_move_terminal_verdict_completes_with_winner() {
        let mut s = active(4);
        play(&mut s, ALICE, 3);
        let outcome = play(&mut s, BOB, 1);

        let MoveOutcome::Accepted(accepted) = outcome else {
            panic!("expected accepted move");
        };
        assert_eq!(
            accepted.termination,
            Some(Termination::Completed { winner: Some(BOB) })
        );
        assert_eq!(s.state(), SessionState::Completed);
        assert_eq!(s.turn(), None);
    }

    #[test]
    fn test_submit_move_drawn_position_completes_without_winner() {
        let mut s = active(2);
        play(&mut s, ALICE, 3);
        assert_eq!(
            s.termination(),
            Some(&Termination::Completed { winner: None })
        );
    }

    #[test]
    fn test_submit_move_contract_breach_stops_session() {
        let mut s = Session::new(spec(), Arc::new(Broken)).unwrap();
        s.signal_ready(ALICE).unwrap();
        s.signal_ready(BOB).unwrap();

        let result = s.submit_move(ALICE, MoveRequest::new(json!(1)));

        assert!(matches!(result, Err(SessionError::Fatal(_))));
        assert_eq!(s.state(), SessionState::ForceClosed);
        assert!(matches!(
            s.termination(),
            Some(Termination::ForceClosed { cause: ForceCloseCause::Fault { .. } })
        ));
        assert!(s.history().is_empty());
    }

    // =====================================================================
    // Draws
    // =====================================================================

    #[test]
    fn test_draw_proposal_survives_moves_then_accepted() {
        let mut s = active(50);
        s.propose_draw(ALICE).unwrap();
        play(&mut s, ALICE, 1);
        play(&mut s, BOB, 1);
        assert_eq!(s.draw_offer(), Some(ALICE));

        let termination = s.accept_draw(BOB).unwrap();

        assert_eq!(termination, Termination::DrawnByAgreement);
        assert_eq!(s.state(), SessionState::DrawnByAgreement);
    }

    #[test]
    fn test_draw_second_proposal_is_rejected() {
        let mut s = active(50);
        s.propose_draw(ALICE).unwrap();
        assert_eq!(s.propose_draw(ALICE), Err(SessionError::DrawAlreadyProposed(ALICE)));
        assert_eq!(s.propose_draw(BOB), Err(SessionError::DrawAlreadyProposed(ALICE)));
    }

    #[test]
    fn test_draw_proposer_cannot_accept_own() {
        let mut s = active(50);
        s.propose_draw(ALICE).unwrap();
        assert_eq!(s.accept_draw(ALICE), Err(SessionError::OwnDrawProposal));
        assert_eq!(s.state(), SessionState::Active);
    }

    #[test]
    fn test_draw_rescind_only_by_proposer() {
        let mut s = active(50);
        s.propose_draw(ALICE).unwrap();
        assert_eq!(s.rescind_draw(BOB), Err(SessionError::NoDrawProposal));

        s.rescind_draw(ALICE).unwrap();
        assert_eq!(s.draw_offer(), None);
        assert_eq!(s.accept_draw(BOB), Err(SessionError::NoDrawProposal));
        assert_eq!(s.state(), SessionState::Active);
    }

    #[test]
    fn test_draw_in_lobby_is_not_active() {
        let mut s = lobby(50);
        assert_eq!(
            s.propose_draw(ALICE),
            Err(SessionError::NotActive(SessionState::Lobby))
        );
    }

    // =====================================================================
    // forfeit() / force_close() / expire()
    // =====================================================================

    #[test]
    fn test_forfeit_from_lobby_has_no_winner() {
        let mut s = lobby(10);
        let t = s.forfeit(BOB).unwrap();
        assert_eq!(
            t,
            Termination::Forfeited {
                loser: Some(BOB),
                winner: None,
                kind: ForfeitKind::Voluntary
            }
        );
        assert_eq!(s.state(), SessionState::Forfeited);
    }

    #[test]
    fn test_forfeit_mid_game_opponent_wins() {
        let mut s = active(10);
        let t = s.forfeit(ALICE).unwrap();
        assert_eq!(t.winner(), Some(BOB));
    }

    #[test]
    fn test_terminal_state_rejects_every_mutation() {
        let mut s = active(10);
        s.forfeit(ALICE).unwrap();
        let thread = s.thread();

        assert_eq!(s.forfeit(BOB), Err(SessionError::Terminated(thread)));
        assert_eq!(s.signal_ready(BOB), Err(SessionError::Terminated(thread)));
        assert_eq!(
            s.submit_move(BOB, MoveRequest::new(json!(1))),
            Err(SessionError::Terminated(thread))
        );
        assert_eq!(s.propose_draw(BOB), Err(SessionError::Terminated(thread)));
        assert_eq!(
            s.force_close(ForceCloseCause::ThreadDeleted),
            Err(SessionError::Terminated(thread))
        );
        assert_eq!(
            s.expire(LobbyTimeoutPolicy::ForfeitUnready),
            Err(SessionError::Terminated(thread))
        );
        assert_eq!(s.state(), SessionState::Forfeited);
    }

    #[test]
    fn test_force_close_records_cause() {
        let mut s = active(10);
        let t = s.force_close(ForceCloseCause::ThreadDeleted).unwrap();
        assert_eq!(
            t,
            Termination::ForceClosed {
                cause: ForceCloseCause::ThreadDeleted
            }
        );
        let record = s.record().expect("terminal sessions have a record");
        assert_eq!(record.termination, t);
    }

    #[test]
    fn test_expire_mid_game_forfeits_player_to_move() {
        let mut s = active(10);
        play(&mut s, ALICE, 1);
        s.drain_notices();

        let t = s.expire(LobbyTimeoutPolicy::ForfeitUnready).unwrap();

        assert_eq!(
            t,
            Termination::Forfeited {
                loser: Some(BOB),
                winner: Some(ALICE),
                kind: ForfeitKind::Inactivity
            }
        );
        let notices = s.drain_notices();
        assert!(notices.iter().any(|n| n.event == NoticeEvent::InactivityTimeout { idle: vec![BOB] }));
    }

    #[test]
    fn test_expire_lobby_forfeits_single_unready_participant() {
        let mut s = lobby(10);
        s.signal_ready(ALICE).unwrap();
        let t = s.expire(LobbyTimeoutPolicy::ForfeitUnready).unwrap();
        assert_eq!(
            t,
            Termination::Forfeited {
                loser: Some(BOB),
                winner: None,
                kind: ForfeitKind::Inactivity
            }
        );
    }

    #[test]
    fn test_expire_lobby_close_quietly_policy() {
        let mut s = lobby(10);
        let t = s.expire(LobbyTimeoutPolicy::CloseQuietly).unwrap();
        assert_eq!(
            t,
            Termination::ForceClosed {
                cause: ForceCloseCause::LobbyAbandoned
            }
        );
    }

    #[test]
    fn test_record_absent_while_live() {
        let s = active(10);
        assert!(s.record().is_none());
    }
}
