//! End-to-end tests through the `Coordinator` façade.

use std::time::Duration;

use parlor::prelude::*;
use serde_json::json;

// =========================================================================
// Fixtures
// =========================================================================

/// First to push the counter to 3 wins. Moves are `"inc"`.
struct RaceToThree;

impl RuleEngine for RaceToThree {
    fn initial_state(&self) -> GameState {
        json!(0)
    }

    fn apply(&self, state: &GameState, seat: Seat, mv: &MovePayload) -> Verdict {
        if mv.as_str() != Some("inc") {
            return Verdict::illegal("only \"inc\" is a move");
        }
        let next = state.as_u64().unwrap_or(0) + 1;
        if next >= 3 {
            Verdict::won_by(json!(next), seat)
        } else {
            Verdict::play_on(json!(next))
        }
    }
}

const BOT: UserId = UserId(900);
const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);
const GUILD: GuildId = GuildId(10);

struct Harness {
    coordinator: Coordinator<KnownAccounts>,
    notices: NoticeReceiver,
    archive: MemoryArchive,
}

fn harness_with(session: SessionConfig) -> Harness {
    let mut config = ParlorConfig::new(BOT);
    config.session = session;
    let archive = MemoryArchive::new();
    let (coordinator, notices) = CoordinatorBuilder::new(config)
        .rule_engine(GameType::Cards, RaceToThree)
        .archive(archive.clone())
        .build(KnownAccounts::new(BOT))
        .unwrap();
    Harness {
        coordinator,
        notices,
        archive,
    }
}

fn harness() -> Harness {
    harness_with(SessionConfig::default())
}

fn request(thread: ThreadId) -> ChallengeRequest {
    ChallengeRequest {
        challenger: Contestant::new(ALICE, "alice"),
        target: Contestant::new(BOB, "bob"),
        game: GameType::Cards,
        guild: GUILD,
        thread,
    }
}

impl Harness {
    /// Runs the handshake through acceptance; the session is in its lobby.
    async fn open(&self, thread: ThreadId) {
        let handle = self.coordinator.propose_challenge(request(thread)).await.unwrap();
        self.coordinator.confirm_challenge(handle.id(), ALICE).await.unwrap();
        let outcome = self
            .coordinator
            .respond_to_challenge(handle.id(), BOB, true)
            .await
            .unwrap();
        assert!(outcome.session().is_some());
    }

    /// Opens and readies a session. Returns `(first, second)` movers.
    async fn start(&self, thread: ThreadId) -> (UserId, UserId) {
        self.open(thread).await;
        self.coordinator.signal_ready(thread, ALICE).await.unwrap();
        let ReadyOutcome::Started { first } =
            self.coordinator.signal_ready(thread, BOB).await.unwrap()
        else {
            panic!("second ready should start the game");
        };
        let second = if first == ALICE { BOB } else { ALICE };
        (first, second)
    }

    fn drain(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }
}

fn inc() -> MoveRequest {
    MoveRequest::new(json!("inc"))
}

// =========================================================================
// Builder and configuration
// =========================================================================

#[test]
fn test_build_without_engines_is_config_error() {
    let result = CoordinatorBuilder::new(ParlorConfig::new(BOT)).build(KnownAccounts::new(BOT));
    assert!(matches!(result, Err(ParlorError::Config(_))));
}

#[test]
fn test_config_from_json_fills_defaults() {
    let config = ParlorConfig::from_json_str(r#"{ "bot_user": 900 }"#).unwrap();
    assert_eq!(config.bot_user, BOT);
    assert_eq!(config.session.inactivity_timeout_secs, 600);
    assert_eq!(config.challenge.confirm_timeout_secs, 30);
}

// =========================================================================
// Challenges
// =========================================================================

#[tokio::test]
async fn test_propose_challenge_bot_target_rejected() {
    let h = harness();
    let mut req = request(ThreadId(1));
    req.target = Contestant::new(BOT, "parlor");

    let err = h.coordinator.propose_challenge(req).await.unwrap_err();
    assert!(matches!(
        err,
        ParlorError::Challenge(ChallengeError::TargetNotHuman(BOT))
    ));
}

#[tokio::test]
async fn test_respond_decline_opens_no_session() {
    let mut h = harness();
    let handle = h.coordinator.propose_challenge(request(ThreadId(1))).await.unwrap();
    h.coordinator.confirm_challenge(handle.id(), ALICE).await.unwrap();

    let outcome = h
        .coordinator
        .respond_to_challenge(handle.id(), BOB, false)
        .await
        .unwrap();
    assert!(matches!(outcome, ChallengeOutcome::Declined));
    assert!(h.coordinator.registry().is_empty().await);
    assert!(h.coordinator.get_session(ThreadId(1)).await.is_err());

    let declined = h.drain().into_iter().any(|n| {
        matches!(n.event, NoticeEvent::ChallengeDeclined { challenge } if challenge == handle.id())
    });
    assert!(declined);
}

#[tokio::test]
async fn test_propose_challenge_existing_pair_returns_session() {
    let h = harness();
    h.open(ThreadId(1)).await;

    // Roles swapped, different thread: still the same pair.
    let mut req = request(ThreadId(2));
    std::mem::swap(&mut req.challenger, &mut req.target);
    let err = h.coordinator.propose_challenge(req).await.unwrap_err();
    match err {
        ParlorError::Challenge(ChallengeError::DuplicateSession(existing)) => {
            assert_eq!(existing.thread(), ThreadId(1));
        }
        other => panic!("expected duplicate, got {other:?}"),
    }

    let found = h
        .coordinator
        .find_existing_session([BOB, ALICE], GameType::Cards, GUILD)
        .await
        .unwrap();
    assert_eq!(found.thread(), ThreadId(1));
}

// =========================================================================
// Lobby and play
// =========================================================================

#[tokio::test]
async fn test_signal_ready_twice_is_already_ready() {
    let h = harness();
    h.open(ThreadId(1)).await;

    let first = h.coordinator.signal_ready(ThreadId(1), ALICE).await.unwrap();
    assert_eq!(first, ReadyOutcome::Waiting);

    let err = h
        .coordinator
        .signal_ready(ThreadId(1), ALICE)
        .await
        .unwrap_err();
    assert_eq!(err.as_session(), Some(&SessionError::AlreadyReady(ALICE)));

    let snapshot = h.coordinator.get_session(ThreadId(1)).await.unwrap();
    assert_eq!(snapshot.state, SessionState::Lobby);
}

#[tokio::test]
async fn test_submit_move_out_of_turn_leaves_history_alone() {
    let h = harness();
    let (_, second) = h.start(ThreadId(1)).await;

    let err = h
        .coordinator
        .submit_move(ThreadId(1), second, inc())
        .await
        .unwrap_err();
    assert_eq!(err.as_session(), Some(&SessionError::NotYourTurn(second)));

    let snapshot = h.coordinator.get_session(ThreadId(1)).await.unwrap();
    assert_eq!(snapshot.ply(), 0);
    assert_eq!(snapshot.board, json!(0));
}

#[tokio::test]
async fn test_full_game_archives_and_replays() {
    let h = harness();
    let (first, second) = h.start(ThreadId(1)).await;

    for user in [first, second] {
        let outcome = h
            .coordinator
            .submit_move(ThreadId(1), user, inc())
            .await
            .unwrap();
        assert!(matches!(outcome, MoveOutcome::Accepted(ref a) if a.termination.is_none()));
    }
    let last = h
        .coordinator
        .submit_move(ThreadId(1), first, MoveRequest::at_ply(json!("inc"), 2))
        .await
        .unwrap();
    let MoveOutcome::Accepted(accepted) = last else {
        panic!("winning move should be accepted");
    };
    assert_eq!(
        accepted.termination,
        Some(Termination::Completed {
            winner: Some(first)
        })
    );

    assert!(h.coordinator.registry().is_empty().await);
    let record = h.archive.get(ThreadId(1)).unwrap();
    assert_eq!(record.moves.len(), 3);
    let replayed = verify_replay(&RaceToThree, &record).unwrap();
    assert_eq!(replayed.state, json!(3));
}

#[tokio::test]
async fn test_accept_draw_after_intervening_move_draws() {
    let h = harness();
    let (first, second) = h.start(ThreadId(1)).await;

    h.coordinator.propose_draw(ThreadId(1), first).await.unwrap();
    h.coordinator
        .submit_move(ThreadId(1), first, inc())
        .await
        .unwrap();

    let termination = h.coordinator.accept_draw(ThreadId(1), second).await.unwrap();
    assert_eq!(termination, Termination::DrawnByAgreement);

    let record = h.archive.get(ThreadId(1)).unwrap();
    assert_eq!(record.termination, Termination::DrawnByAgreement);
    assert_eq!(record.moves.len(), 1);
}

#[tokio::test]
async fn test_rescind_draw_then_accept_has_no_proposal() {
    let h = harness();
    let (first, second) = h.start(ThreadId(1)).await;

    h.coordinator.propose_draw(ThreadId(1), first).await.unwrap();
    h.coordinator.rescind_draw(ThreadId(1), first).await.unwrap();

    let err = h
        .coordinator
        .accept_draw(ThreadId(1), second)
        .await
        .unwrap_err();
    assert_eq!(err.as_session(), Some(&SessionError::NoDrawProposal));
}

#[tokio::test]
async fn test_forfeit_racing_one_terminated() {
    let h = harness();
    let (first, second) = h.start(ThreadId(1)).await;

    let c1 = h.coordinator.clone();
    let c2 = h.coordinator.clone();
    let (r1, r2) = tokio::join!(
        c1.forfeit(ThreadId(1), first),
        c2.forfeit(ThreadId(1), second)
    );

    let (won, lost) = match (r1, r2) {
        (Ok(t), Err(e)) | (Err(e), Ok(t)) => (t, e),
        other => panic!("expected exactly one forfeit to land, got {other:?}"),
    };
    assert!(matches!(won, Termination::Forfeited { .. }));
    assert_eq!(lost.as_session(), Some(&SessionError::Terminated(ThreadId(1))));
    assert_eq!(h.archive.len(), 1);
}

#[tokio::test]
async fn test_calls_after_game_end_report_terminated() {
    let h = harness();
    let (first, second) = h.start(ThreadId(1)).await;
    for user in [first, second, first] {
        h.coordinator.submit_move(ThreadId(1), user, inc()).await.unwrap();
    }
    assert!(h.coordinator.registry().is_empty().await);

    let terminated = Some(&SessionError::Terminated(ThreadId(1)));
    let err = h.coordinator.forfeit(ThreadId(1), second).await.unwrap_err();
    assert_eq!(err.as_session(), terminated);
    let err = h
        .coordinator
        .submit_move(ThreadId(1), second, inc())
        .await
        .unwrap_err();
    assert_eq!(err.as_session(), terminated);
    let err = h.coordinator.signal_ready(ThreadId(1), first).await.unwrap_err();
    assert_eq!(err.as_session(), terminated);

    let snapshot = h.coordinator.get_session(ThreadId(1)).await.unwrap();
    assert_eq!(snapshot.state, SessionState::Completed);
    assert_eq!(
        snapshot.termination,
        Some(Termination::Completed {
            winner: Some(first)
        })
    );
    assert_eq!(snapshot.board, json!(3));
    assert_eq!(h.archive.len(), 1);
}

// =========================================================================
// Platform events
// =========================================================================

#[tokio::test]
async fn test_thread_deleted_closes_and_is_idempotent() {
    let mut h = harness();
    h.start(ThreadId(1)).await;

    let termination = h.coordinator.thread_deleted(ThreadId(1)).await.unwrap();
    assert_eq!(
        termination,
        Some(Termination::ForceClosed {
            cause: ForceCloseCause::ThreadDeleted
        })
    );
    assert!(h.coordinator.registry().lookup(ThreadId(1)).await.is_err());

    let record = h.archive.get(ThreadId(1)).unwrap();
    assert_eq!(
        record.termination,
        Termination::ForceClosed {
            cause: ForceCloseCause::ThreadDeleted
        }
    );

    // The platform may deliver the same event again.
    assert_eq!(h.coordinator.thread_deleted(ThreadId(1)).await.unwrap(), None);
    assert_eq!(h.archive.len(), 1);

    let ended = h
        .drain()
        .into_iter()
        .filter(|n| matches!(n.event, NoticeEvent::SessionEnded { .. }))
        .count();
    assert_eq!(ended, 1);
}

#[tokio::test]
async fn test_participant_left_bystander_ignored() {
    let h = harness();
    h.start(ThreadId(1)).await;

    let ignored = h
        .coordinator
        .participant_left(ThreadId(1), UserId(77))
        .await
        .unwrap();
    assert_eq!(ignored, None);

    let closed = h
        .coordinator
        .participant_left(ThreadId(1), BOB)
        .await
        .unwrap();
    assert_eq!(
        closed,
        Some(Termination::ForceClosed {
            cause: ForceCloseCause::ParticipantLeft { user: BOB }
        })
    );
}

#[tokio::test]
async fn test_shutdown_closes_everything_and_refuses_new_sessions() {
    let h = harness();
    h.start(ThreadId(1)).await;

    assert_eq!(h.coordinator.shutdown().await, 1);
    assert_eq!(h.archive.len(), 1);
    assert!(h.coordinator.sessions_for(ALICE).await.is_empty());

    let handle = h.coordinator.propose_challenge(request(ThreadId(2))).await.unwrap();
    h.coordinator.confirm_challenge(handle.id(), ALICE).await.unwrap();
    let err = h
        .coordinator
        .respond_to_challenge(handle.id(), BOB, true)
        .await
        .unwrap_err();
    assert_eq!(
        err.as_session(),
        Some(&SessionError::Unavailable(ThreadId(2)))
    );
    assert!(matches!(
        handle.try_outcome(),
        Some(ChallengeOutcome::Failed(_))
    ));
}

// =========================================================================
// Inactivity
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_inactivity_forfeits_player_to_move() {
    let mut h = harness_with(SessionConfig {
        inactivity_timeout_secs: 60,
        ..SessionConfig::default()
    });
    let (first, second) = h.start(ThreadId(1)).await;
    h.drain();

    tokio::time::sleep(Duration::from_secs(61)).await;
    tokio::task::yield_now().await;

    let record = h.archive.get(ThreadId(1)).unwrap();
    assert_eq!(
        record.termination,
        Termination::Forfeited {
            loser: Some(first),
            winner: Some(second),
            kind: ForfeitKind::Inactivity,
        }
    );
    assert!(h.coordinator.registry().is_empty().await);

    let events: Vec<NoticeEvent> = h.drain().into_iter().map(|n| n.event).collect();
    let timeout_at = events
        .iter()
        .position(|e| matches!(e, NoticeEvent::InactivityTimeout { idle } if idle == &vec![first]))
        .unwrap();
    let ended_at = events
        .iter()
        .position(|e| matches!(e, NoticeEvent::SessionEnded { .. }))
        .unwrap();
    assert!(timeout_at < ended_at);
}
