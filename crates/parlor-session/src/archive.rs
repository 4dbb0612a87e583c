//! Replay archive sinks.
//!
//! When a session reaches a terminal state its actor hands a
//! [`SessionRecord`] to the registry's [`ReplayArchive`], exactly once.
//! The archive is fire-and-forget from the session's point of view:
//! storage failures are logged by the sink and never reach players.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use parlor_protocol::{
    Codec, GameType, GuildId, JsonCodec, Participant, Termination, ThreadId,
};
use serde::{Deserialize, Serialize};

use crate::{GameState, MoveRecord};

/// Everything needed to replay and audit one finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub thread: ThreadId,
    pub guild: GuildId,
    pub game: GameType,
    pub participants: [Participant; 2],
    pub moves: Vec<MoveRecord>,
    pub final_state: GameState,
    pub termination: Termination,
    pub created_at_ms: u64,
    pub ended_at_ms: u64,
}

/// A sink for finished sessions.
///
/// Called from the session actor's task; implementations should not block
/// for long.
pub trait ReplayArchive: Send + Sync + 'static {
    fn archive(&self, record: SessionRecord);
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullArchive;

impl ReplayArchive for NullArchive {
    fn archive(&self, record: SessionRecord) {
        tracing::trace!(thread = %record.thread, "record discarded");
    }
}

/// Keeps records in memory. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    records: Arc<Mutex<Vec<SessionRecord>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records archived so far, oldest first.
    pub fn records(&self) -> Vec<SessionRecord> {
        self.lock().clone()
    }

    /// The record for `thread`, if archived.
    pub fn get(&self, thread: ThreadId) -> Option<SessionRecord> {
        self.lock().iter().find(|r| r.thread == thread).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SessionRecord>> {
        // A panic while pushing cannot leave the Vec half-written.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ReplayArchive for MemoryArchive {
    fn archive(&self, record: SessionRecord) {
        tracing::debug!(thread = %record.thread, "record archived in memory");
        self.lock().push(record);
    }
}

/// Writes one JSON document per line to any writer.
pub struct JsonLinesArchive<W> {
    writer: Mutex<W>,
    codec: JsonCodec,
}

impl<W: Write + Send + 'static> JsonLinesArchive<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            codec: JsonCodec,
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send + 'static> ReplayArchive for JsonLinesArchive<W> {
    fn archive(&self, record: SessionRecord) {
        let mut line = match self.codec.encode(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(thread = %record.thread, error = %e, "failed to encode session record");
                return;
            }
        };
        line.push(b'\n');

        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writer.write_all(&line).and_then(|()| writer.flush()) {
            tracing::error!(thread = %record.thread, error = %e, "failed to write session record");
        }
    }
}
