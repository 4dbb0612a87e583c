use parlor::prelude::*;
use parlor::telemetry;
use serde::Deserialize;
use serde_json::json;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

const COLS: usize = 7;
const ROWS: usize = 6;

/// Columns are stacks, bottom first. `1` is the first seat's disc, `2` the second's.
#[derive(Deserialize)]
struct Board {
    columns: Vec<Vec<u8>>,
}

impl Board {
    fn empty() -> Self {
        Self {
            columns: vec![Vec::new(); COLS],
        }
    }

    fn to_state(&self) -> GameState {
        json!({ "columns": self.columns })
    }

    fn cell(&self, col: i32, row: i32) -> Option<u8> {
        if col < 0 || row < 0 {
            return None;
        }
        self.columns.get(col as usize)?.get(row as usize).copied()
    }

    fn is_full(&self) -> bool {
        self.columns.iter().all(|c| c.len() >= ROWS)
    }

    /// Whether the disc at (`col`, `row`) completes a line of four.
    fn wins_at(&self, col: usize, row: usize) -> bool {
        let Some(disc) = self.cell(col as i32, row as i32) else {
            return false;
        };
        // horizontal, vertical, diagonal /, diagonal \
        [(1, 0), (0, 1), (1, 1), (1, -1)].iter().any(|&(dc, dr)| {
            let run = |sign: i32| {
                (1..4)
                    .take_while(|&i| {
                        self.cell(col as i32 + sign * i * dc, row as i32 + sign * i * dr)
                            == Some(disc)
                    })
                    .count()
            };
            1 + run(1) + run(-1) >= 4
        })
    }
}

#[derive(Deserialize)]
struct DropDisc {
    column: usize,
}

struct ConnectFour;

impl RuleEngine for ConnectFour {
    fn initial_state(&self) -> GameState {
        Board::empty().to_state()
    }

    fn apply(&self, state: &GameState, seat: Seat, mv: &MovePayload) -> Verdict {
        let Ok(mut board) = serde_json::from_value::<Board>(state.clone()) else {
            return Verdict::illegal("board is unreadable");
        };
        let Ok(DropDisc { column }) = serde_json::from_value::<DropDisc>(mv.clone()) else {
            return Verdict::illegal("expected {\"column\": 0-6}");
        };
        if column >= COLS {
            return Verdict::illegal(format!("column must be 0-{}", COLS - 1));
        }
        if board.columns.len() != COLS || board.columns[column].len() >= ROWS {
            return Verdict::illegal(format!("column {column} is full"));
        }

        let disc = seat.index() as u8 + 1;
        board.columns[column].push(disc);
        let row = board.columns[column].len() - 1;

        if board.wins_at(column, row) {
            Verdict::won_by(board.to_state(), seat)
        } else if board.is_full() {
            Verdict::drawn(board.to_state())
        } else {
            Verdict::play_on(board.to_state())
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted game
// ---------------------------------------------------------------------------

const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);

#[tokio::main]
async fn main() -> Result<(), ParlorError> {
    let config = match std::env::args().nth(1) {
        Some(path) => ParlorConfig::from_json_file(path)?,
        None => ParlorConfig::new(UserId(1000)),
    };
    telemetry::init_tracing(&config.log_filter)?;

    let archive = MemoryArchive::new();
    let (coordinator, mut notices) = CoordinatorBuilder::new(config.clone())
        .rule_engine(GameType::ConnectFour, ConnectFour)
        .archive(archive.clone())
        .build(KnownAccounts::new(config.bot_user))?;

    let sink = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            tracing::info!(thread = %notice.thread, recipient = ?notice.recipient, event = ?notice.event, "notice");
        }
    });

    let thread = ThreadId(500);
    let challenge = coordinator
        .propose_challenge(ChallengeRequest {
            challenger: Contestant::new(ALICE, "alice"),
            target: Contestant::new(BOB, "bob"),
            game: GameType::ConnectFour,
            guild: GuildId(1),
            thread,
        })
        .await?;
    coordinator.confirm_challenge(challenge.id(), ALICE).await?;
    coordinator
        .respond_to_challenge(challenge.id(), BOB, true)
        .await?;

    coordinator.signal_ready(thread, ALICE).await?;
    let first = match coordinator.signal_ready(thread, BOB).await? {
        ReadyOutcome::Started { first } => first,
        ReadyOutcome::Waiting => return Err(ParlorError::Config("game did not start".into())),
    };
    let second = if first == ALICE { BOB } else { ALICE };

    // First player stacks column 3; second wastes moves in column 0.
    let script = [
        (first, 3),
        (second, 0),
        (first, 3),
        (second, 0),
        (first, 3),
        (second, 0),
        (first, 3),
    ];
    for (user, column) in script {
        match coordinator
            .submit_move(thread, user, MoveRequest::new(json!({ "column": column })))
            .await?
        {
            MoveOutcome::Accepted(accepted) => {
                if let Some(termination) = accepted.termination {
                    tracing::info!(%termination, "game over");
                }
            }
            MoveOutcome::Illegal { reason } => tracing::warn!(%user, %reason, "move refused"),
        }
    }

    coordinator.shutdown().await;
    // The notice channel closes once the last session handle is gone.
    drop(challenge);
    drop(coordinator);
    let _ = sink.await;

    for record in archive.records() {
        let replayed = verify_replay(&ConnectFour, &record)?;
        tracing::info!(thread = %record.thread, plies = replayed.plies, "replay verified");
        println!(
            "{}",
            serde_json::to_string(&record).map_err(|e| ParlorError::Config(e.to_string()))?
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(columns: &[usize]) -> Verdict {
        let engine = ConnectFour;
        let mut state = engine.initial_state();
        let mut seat = Seat::First;
        let mut last = Verdict::play_on(state.clone());
        for &column in columns {
            last = engine.apply(&state, seat, &json!({ "column": column }));
            if let Verdict::Legal { state: next, .. } = &last {
                state = next.clone();
            }
            seat = seat.other();
        }
        last
    }

    #[test]
    fn test_apply_vertical_four_wins() {
        let verdict = play(&[3, 0, 3, 0, 3, 0, 3]);
        assert!(matches!(
            verdict,
            Verdict::Legal { terminal: true, winner: Some(Seat::First), .. }
        ));
    }

    #[test]
    fn test_apply_diagonal_four_wins() {
        // Second seat builds the staircase 0,1,2,3 for first seat's diagonal.
        let verdict = play(&[0, 1, 1, 2, 2, 3, 2, 3, 3, 6, 3]);
        assert!(matches!(
            verdict,
            Verdict::Legal { terminal: true, winner: Some(Seat::First), .. }
        ));
    }

    #[test]
    fn test_apply_full_column_illegal() {
        let verdict = play(&[0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(verdict, Verdict::Illegal { .. }));
    }

    #[test]
    fn test_apply_out_of_range_column_illegal() {
        assert!(matches!(play(&[7]), Verdict::Illegal { .. }));
    }

    #[test]
    fn test_apply_malformed_move_illegal() {
        let engine = ConnectFour;
        let verdict = engine.apply(&engine.initial_state(), Seat::First, &json!("left"));
        assert!(matches!(verdict, Verdict::Illegal { .. }));
    }
}
