//! Situational conditions that gate modifiers
//!
//! Callers describe the situation of a roll as a [`ConditionSet`]
//! (`attack_type=melee`, `weapon=longsword`, `enemy_type=orc`). Effects gate
//! on it twice: effect-level `(type, value)` pairs must all match, and each
//! modifier may carry a [`ModifierCondition`] from a small fixed grammar.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::EffectError;

pub const ATTACK_TYPE: &str = "attack_type";
pub const ENEMY_TYPE: &str = "enemy_type";
pub const WEAPON: &str = "weapon";

/// Key/value description of the situation a roll is made in.
///
/// Keys and values are compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSet(HashMap<String, String>);

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) {
        self.0
            .insert(normalize(key.as_ref()), normalize(value.as_ref()));
    }

    pub fn with(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&normalize(key)).map(String::as_str)
    }

    /// True if `key` is present with exactly `value`
    pub fn matches(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(normalize(value).as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = ConditionSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

impl From<HashMap<String, String>> for ConditionSet {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Effect-level gate: the whole effect applies only if the situation has
/// this key with this value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl EffectCondition {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn is_satisfied(&self, conditions: &ConditionSet) -> bool {
        conditions.matches(&self.kind, &self.value)
    }
}

/// Per-modifier gate.
///
/// Grammar: `melee_only`, `vs_enemy_type:<X>`, `with_weapon:<X>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModifierCondition {
    MeleeOnly,
    VsEnemyType(String),
    WithWeapon(String),
}

impl ModifierCondition {
    pub fn is_satisfied(&self, conditions: &ConditionSet) -> bool {
        match self {
            ModifierCondition::MeleeOnly => conditions.matches(ATTACK_TYPE, "melee"),
            ModifierCondition::VsEnemyType(kind) => conditions.matches(ENEMY_TYPE, kind),
            ModifierCondition::WithWeapon(weapon) => conditions.matches(WEAPON, weapon),
        }
    }
}

impl FromStr for ModifierCondition {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unknown = || EffectError::UnknownCondition(s.to_string());

        if s.eq_ignore_ascii_case("melee_only") {
            return Ok(ModifierCondition::MeleeOnly);
        }
        let (head, arg) = s.split_once(':').ok_or_else(unknown)?;
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(unknown());
        }
        match head.trim().to_lowercase().as_str() {
            "vs_enemy_type" => Ok(ModifierCondition::VsEnemyType(arg.to_lowercase())),
            "with_weapon" => Ok(ModifierCondition::WithWeapon(arg.to_lowercase())),
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for ModifierCondition {
    type Error = EffectError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModifierCondition> for String {
    fn from(c: ModifierCondition) -> Self {
        c.to_string()
    }
}

impl std::fmt::Display for ModifierCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModifierCondition::MeleeOnly => write!(f, "melee_only"),
            ModifierCondition::VsEnemyType(kind) => write!(f, "vs_enemy_type:{}", kind),
            ModifierCondition::WithWeapon(weapon) => write!(f, "with_weapon:{}", weapon),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grammar() {
        assert_eq!("melee_only".parse(), Ok(ModifierCondition::MeleeOnly));
        assert_eq!(
            "vs_enemy_type:Orc".parse(),
            Ok(ModifierCondition::VsEnemyType("orc".into()))
        );
        assert_eq!(
            "with_weapon: longsword".parse(),
            Ok(ModifierCondition::WithWeapon("longsword".into()))
        );
        assert!("ranged_only".parse::<ModifierCondition>().is_err());
        assert!("vs_enemy_type:".parse::<ModifierCondition>().is_err());
        assert!("with_shield:kite".parse::<ModifierCondition>().is_err());
    }

    #[test]
    fn test_display_round_trips_grammar() {
        let cond = ModifierCondition::VsEnemyType("goblin".into());
        assert_eq!(cond.to_string(), "vs_enemy_type:goblin");
        assert_eq!(ModifierCondition::MeleeOnly.to_string(), "melee_only");
    }

    #[test]
    fn test_modifier_condition_satisfaction() {
        let melee = ConditionSet::new()
            .with(ATTACK_TYPE, "Melee")
            .with(WEAPON, "Longsword");
        let ranged = ConditionSet::new().with(ATTACK_TYPE, "ranged");

        assert!(ModifierCondition::MeleeOnly.is_satisfied(&melee));
        assert!(!ModifierCondition::MeleeOnly.is_satisfied(&ranged));
        assert!(!ModifierCondition::MeleeOnly.is_satisfied(&ConditionSet::new()));
        assert!(ModifierCondition::WithWeapon("longsword".into()).is_satisfied(&melee));
        assert!(!ModifierCondition::WithWeapon("dagger".into()).is_satisfied(&melee));
    }

    #[test]
    fn test_effect_condition() {
        let set: ConditionSet = [("enemy_type", "orc")].into_iter().collect();
        assert!(EffectCondition::new("enemy_type", "ORC").is_satisfied(&set));
        assert!(!EffectCondition::new("enemy_type", "goblin").is_satisfied(&set));
        assert!(!EffectCondition::new("weapon", "axe").is_satisfied(&set));
    }
}
