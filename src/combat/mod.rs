//! Combat math
//!
//! Implements D&D-style combat with:
//! - Dice rolling (e.g., "2d6+3") through a swappable roller
//! - Attack resolution with to-hit, criticals and damage
//! - Damage types with immunity, resistance, and vulnerability
//! - Saving throws

mod damage;
mod dice;
mod resolver;

pub use damage::{DamageModifier, DamageProfile, DamageResult, DamageType};
pub use dice::{
    is_critical, is_fumble, parse_dice, DiceError, DiceExpr, DiceRoller, RandomRoller,
    RollResult, ScriptedRoller, MAX_DICE, MAX_ROLLED_DICE,
};
pub use resolver::{
    defense_against, AttackKind, AttackResult, AttackSpec, CombatResolver, DamageComponent,
    DamageRoll, DefenderView, RollMode, SaveResult,
};
