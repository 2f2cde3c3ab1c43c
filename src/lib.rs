//! skirmish - turn-based tabletop RPG encounter engine
//!
//! Initiative, turn order, attacks, damage and status effects for
//! encounters between player characters and monsters.

pub mod character;
pub mod clock;
pub mod combat;
pub mod config;
pub mod db;
pub mod effects;
pub mod encounter;
pub mod sim;

pub use config::Config;
pub use encounter::{CallContext, EngineError, TurnEngine};
