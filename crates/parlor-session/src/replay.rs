//! Deterministic replay of archived sessions.
//!
//! A [`SessionRecord`] plus the game's rule engine is enough to rebuild
//! every intermediate board. Replaying checks that the recorded history is
//! consistent: seats alternate starting with the first seat, every move is
//! legal, and nothing is recorded after a game-ending move.

use parlor_protocol::{Seat, Termination};

use crate::{GameState, RuleEngine, SessionError, SessionRecord, Verdict};

/// The outcome of replaying a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayResult {
    /// Board after the last recorded move.
    pub state: GameState,
    /// Set when the last move ended the game on the board.
    pub termination: Option<Termination>,
    pub plies: u64,
}

/// Rebuilds the board from the initial state by re-applying every move.
///
/// # Errors
/// [`SessionError::ReplayDiverged`] at the first inconsistent ply.
pub fn replay(
    engine: &dyn RuleEngine,
    record: &SessionRecord,
) -> Result<ReplayResult, SessionError> {
    let mut state = engine.initial_state();
    let mut termination = None;
    let mut expected_seat = Seat::First;

    for (i, mv) in record.moves.iter().enumerate() {
        let ply = i as u64 + 1;
        let diverged = |reason: String| SessionError::ReplayDiverged { ply, reason };

        if termination.is_some() {
            return Err(diverged("move recorded after the game ended".into()));
        }
        if mv.seq != ply {
            return Err(diverged(format!("sequence number {} out of order", mv.seq)));
        }
        if mv.seat != expected_seat {
            return Err(diverged(format!(
                "expected {expected_seat} to move, record says {}",
                mv.seat
            )));
        }
        let seated = &record.participants[mv.seat.index()];
        if seated.user != mv.user {
            return Err(diverged(format!("{} does not sit in {}", mv.user, mv.seat)));
        }

        let verdict = engine.apply(&state, mv.seat, &mv.payload);
        if let Some(breach) = verdict.contract_breach() {
            return Err(diverged(breach));
        }
        match verdict {
            Verdict::Illegal { reason } => {
                return Err(diverged(format!("recorded move is illegal: {reason}")));
            }
            Verdict::Legal {
                state: next,
                terminal,
                winner,
                ..
            } => {
                state = next;
                if terminal {
                    termination = Some(Termination::Completed {
                        winner: winner.map(|s| record.participants[s.index()].user),
                    });
                }
            }
        }
        expected_seat = expected_seat.other();
    }

    Ok(ReplayResult {
        state,
        termination,
        plies: record.moves.len() as u64,
    })
}

/// Replays `record` and checks that it reproduces the recorded ending.
///
/// The final board must match, and a `Completed` record must have been
/// completed on the board with the same winner.
pub fn verify_replay(
    engine: &dyn RuleEngine,
    record: &SessionRecord,
) -> Result<ReplayResult, SessionError> {
    let result = replay(engine, record)?;
    let plies = result.plies;

    if result.state != record.final_state {
        return Err(SessionError::ReplayDiverged {
            ply: plies,
            reason: "final board differs from the recorded one".into(),
        });
    }

    match (&record.termination, &result.termination) {
        (Termination::Completed { .. }, Some(replayed)) if replayed == &record.termination => {}
        (Termination::Completed { .. }, _) => {
            return Err(SessionError::ReplayDiverged {
                ply: plies,
                reason: format!("record says {}, board disagrees", record.termination),
            });
        }
        (_, Some(replayed)) => {
            return Err(SessionError::ReplayDiverged {
                ply: plies,
                reason: format!(
                    "board ended the game ({replayed}) but record says {}",
                    record.termination
                ),
            });
        }
        (_, None) => {}
    }

    tracing::debug!(thread = %record.thread, plies, "replay verified");
    Ok(result)
}
