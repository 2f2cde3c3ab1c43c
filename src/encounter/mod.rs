//! Encounters: combatants, turn order and the engine that drives them

mod combatant;
mod engine;
mod error;
mod model;
mod repository;
mod sqlite;

pub use combatant::{ActionSlot, Combatant, CombatantKind, MonsterTemplate, TurnFlags};
pub use engine::{
    AttackOutcome, CallContext, ConcentrationOutcome, DamageOutcome, HpChange, NewEncounter,
    TurnEngine, TurnMode,
};
pub use error::{EngineError, ErrorKind};
pub use model::{
    Difficulty, DungeonRoom, Encounter, EncounterContext, EncounterStatus, LogEntry, Outcome,
    RoomState,
};
pub use repository::{EncounterRepository, MemoryEncounterStore, StorageError};
pub use sqlite::SqliteEncounterStore;

#[cfg(test)]
pub use repository::MockEncounterRepository;
