//! The `RuleEngine` capability and the per-game-type `RuleBook`.
//!
//! Game rules live outside the session core. A session hands the current
//! board, the mover's seat, and the opaque move to its engine and trusts
//! the [`Verdict`] that comes back. Boards and moves are opaque JSON
//! values; only the engine knows what is inside them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parlor_protocol::{GameType, Seat};
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Opaque board/state representation owned by a rule engine.
pub type GameState = serde_json::Value;

/// Opaque move representation owned by a rule engine.
pub type MovePayload = serde_json::Value;

/// What a rule engine says about one move attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// The move is legal. `state` is the board after it.
    ///
    /// Contract: when `terminal` is false, `winner` is `None` and `draw`
    /// is false; when `terminal` is true, at most one of `winner` / `draw`
    /// is set. A terminal verdict with neither is read as a draw.
    Legal {
        state: GameState,
        terminal: bool,
        winner: Option<Seat>,
        draw: bool,
    },
    /// The move is illegal; the board is unchanged.
    Illegal { reason: String },
}

impl Verdict {
    /// A legal, non-terminal move.
    pub fn play_on(state: GameState) -> Self {
        Self::Legal {
            state,
            terminal: false,
            winner: None,
            draw: false,
        }
    }

    /// A legal move that ends the game with `seat` winning.
    pub fn won_by(state: GameState, seat: Seat) -> Self {
        Self::Legal {
            state,
            terminal: true,
            winner: Some(seat),
            draw: false,
        }
    }

    /// A legal move that ends the game in a drawn position.
    pub fn drawn(state: GameState) -> Self {
        Self::Legal {
            state,
            terminal: true,
            winner: None,
            draw: true,
        }
    }

    /// An illegal move.
    pub fn illegal(reason: impl Into<String>) -> Self {
        Self::Illegal {
            reason: reason.into(),
        }
    }

    /// Checks the verdict contract. Returns a description of the breach.
    pub fn contract_breach(&self) -> Option<String> {
        match self {
            Self::Legal {
                terminal: false,
                winner: Some(seat),
                ..
            } => Some(format!("non-terminal verdict names a winner ({seat})")),
            Self::Legal {
                terminal: false,
                draw: true,
                ..
            } => Some("non-terminal verdict is flagged as a draw".to_string()),
            Self::Legal {
                terminal: true,
                winner: Some(seat),
                draw: true,
                ..
            } => Some(format!("terminal verdict names a winner ({seat}) and a draw")),
            _ => None,
        }
    }
}

/// Rules for one game type.
///
/// Implementations must be pure with respect to their inputs: the same
/// state, seat, and move always produce the same verdict. Replay
/// verification depends on it.
pub trait RuleEngine: Send + Sync + 'static {
    /// The board a fresh session starts from.
    fn initial_state(&self) -> GameState;

    /// Judges a move by `seat` against `state`.
    fn apply(&self, state: &GameState, seat: Seat, mv: &MovePayload) -> Verdict;
}

/// The set of rule engines the bot can host, keyed by game type.
///
/// Cheap to clone: engines are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct RuleBook {
    engines: HashMap<GameType, Arc<dyn RuleEngine>>,
}

impl RuleBook {
    /// An empty rule book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the engine for `game`.
    pub fn with(mut self, game: GameType, engine: impl RuleEngine) -> Self {
        self.insert(game, Arc::new(engine));
        self
    }

    /// Registers (or replaces) a shared engine for `game`.
    pub fn insert(&mut self, game: GameType, engine: Arc<dyn RuleEngine>) {
        self.engines.insert(game, engine);
    }

    /// The engine for `game`.
    ///
    /// # Errors
    /// [`SessionError::UnknownGame`] if nothing is registered.
    pub fn engine(&self, game: GameType) -> Result<Arc<dyn RuleEngine>, SessionError> {
        self.engines
            .get(&game)
            .cloned()
            .ok_or(SessionError::UnknownGame(game))
    }

    /// Whether an engine is registered for `game`.
    pub fn supports(&self, game: GameType) -> bool {
        self.engines.contains_key(&game)
    }
}

impl fmt::Debug for RuleBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleBook")
            .field("games", &self.engines.keys().collect::<Vec<_>>())
            .finish()
    }
}
