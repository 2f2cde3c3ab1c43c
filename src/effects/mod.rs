//! Status effect engine
//!
//! Buffs, debuffs and conditions attached to one actor:
//! - Stacking rules on insertion (replace, stack, take-highest, take-lowest)
//! - Round/rest/concentration based expiry
//! - Conditional modifier lookup for attack, damage and save resolution

mod builders;
mod condition;
mod manager;
mod model;

use thiserror::Error;

pub use builders::{
    build_bless_effect, build_favored_enemy_effect, build_hunters_mark_effect,
    build_poisoned_condition, build_rage_effect, build_shield_effect,
    build_weapon_mastery_effect, rage_damage_bonus,
};
pub use condition::{
    ConditionSet, EffectCondition, ModifierCondition, ATTACK_TYPE, ENEMY_TYPE, WEAPON,
};
pub use manager::{AddOutcome, EffectManager, EffectRegistry};
pub use model::{
    DurationKind, EffectDuration, EffectSource, Modifier, ModifierTarget, ModifierValue,
    StackingRule, StatusEffect,
};

/// Effect validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    #[error("effect ID must not be empty")]
    EmptyId,

    #[error("unknown effect source '{0}'")]
    UnknownSource(String),

    #[error("unknown modifier target '{0}'")]
    UnknownTarget(String),

    #[error("unknown modifier condition '{0}'")]
    UnknownCondition(String),

    #[error("invalid modifier value '{0}'")]
    BadValue(String),

    #[error("character level must be 1-20, got {0}")]
    Level(u32),
}
