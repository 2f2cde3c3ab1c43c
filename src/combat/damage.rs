//! Damage types and defenses
//!
//! A hit's damage passes through the defender's innate profile plus any
//! defenses granted by status effects: immune takes none, resistant takes
//! half (rounded down), vulnerable takes double.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Slashing,
    Piercing,
    Bludgeoning,
    Fire,
    Cold,
    Lightning,
    Thunder,
    Acid,
    Poison,
    Necrotic,
    Radiant,
    Psychic,
    Force,
}

/// Canonical name and accepted aliases, in declaration order
const NAMES: [(DamageType, &str, &[&str]); 13] = [
    (DamageType::Slashing, "slashing", &[]),
    (DamageType::Piercing, "piercing", &[]),
    (DamageType::Bludgeoning, "bludgeoning", &[]),
    (DamageType::Fire, "fire", &[]),
    (DamageType::Cold, "cold", &["ice"]),
    (DamageType::Lightning, "lightning", &["electric"]),
    (DamageType::Thunder, "thunder", &["sonic"]),
    (DamageType::Acid, "acid", &[]),
    (DamageType::Poison, "poison", &[]),
    (DamageType::Necrotic, "necrotic", &["death"]),
    (DamageType::Radiant, "radiant", &["holy"]),
    (DamageType::Psychic, "psychic", &["mental"]),
    (DamageType::Force, "force", &["magic"]),
];

impl DamageType {
    pub fn as_str(&self) -> &'static str {
        NAMES[*self as usize].1
    }
}

impl FromStr for DamageType {
    type Err = ();

    /// Case-insensitive, accepting aliases like "ice" for cold
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        NAMES
            .iter()
            .find(|(_, name, aliases)| *name == wanted || aliases.contains(&wanted.as_str()))
            .map(|(dtype, _, _)| *dtype)
            .ok_or(())
    }
}

impl std::fmt::Display for DamageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a defender takes one type of damage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DamageModifier {
    /// Takes 0% damage
    Immune,
    /// Takes 50% damage (rounded down)
    Resistant,
    #[default]
    Normal,
    /// Takes 200% damage
    Vulnerable,
}

impl DamageModifier {
    pub fn apply(&self, damage: i32) -> i32 {
        match self {
            DamageModifier::Immune => 0,
            DamageModifier::Resistant => damage / 2,
            DamageModifier::Normal => damage,
            DamageModifier::Vulnerable => damage * 2,
        }
    }

    /// Fold several defenses that apply to the same hit into one.
    ///
    /// Immunity wins outright; resistance and vulnerability cancel.
    pub fn combine(modifiers: impl IntoIterator<Item = DamageModifier>) -> DamageModifier {
        let (mut resistant, mut vulnerable) = (false, false);
        for modifier in modifiers {
            match modifier {
                DamageModifier::Immune => return DamageModifier::Immune,
                DamageModifier::Resistant => resistant = true,
                DamageModifier::Vulnerable => vulnerable = true,
                DamageModifier::Normal => {}
            }
        }
        match (resistant, vulnerable) {
            (true, false) => DamageModifier::Resistant,
            (false, true) => DamageModifier::Vulnerable,
            _ => DamageModifier::Normal,
        }
    }
}

/// Result of a damage calculation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageResult {
    /// Rolled damage before defenses
    pub base_damage: i32,
    /// Damage after defenses
    pub final_damage: i32,
    pub damage_type: DamageType,
    /// Defense applied
    pub modifier: DamageModifier,
}

impl DamageResult {
    /// Create a new damage result. Critical hits are handled by rolling
    /// extra dice, not here.
    pub fn new(base: i32, dtype: DamageType, modifier: DamageModifier) -> Self {
        Self {
            base_damage: base,
            final_damage: modifier.apply(base.max(0)),
            damage_type: dtype,
            modifier,
        }
    }
}

/// Innate defenses of one combatant; types not listed take normal damage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageProfile {
    modifiers: HashMap<DamageType, DamageModifier>,
}

impl DamageProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Setting `Normal` removes the entry
    pub fn set(&mut self, dtype: DamageType, modifier: DamageModifier) {
        if modifier == DamageModifier::Normal {
            self.modifiers.remove(&dtype);
        } else {
            self.modifiers.insert(dtype, modifier);
        }
    }

    pub fn get(&self, dtype: DamageType) -> DamageModifier {
        self.modifiers.get(&dtype).copied().unwrap_or_default()
    }

    pub fn add_immunity(&mut self, dtype: DamageType) {
        self.set(dtype, DamageModifier::Immune);
    }

    pub fn add_resistance(&mut self, dtype: DamageType) {
        self.set(dtype, DamageModifier::Resistant);
    }

    pub fn add_vulnerability(&mut self, dtype: DamageType) {
        self.set(dtype, DamageModifier::Vulnerable);
    }

    /// Calculate damage after innate defenses and any extra ones (from
    /// status effects) for this hit
    pub fn calculate_damage(
        &self,
        base: i32,
        dtype: DamageType,
        extra: impl IntoIterator<Item = DamageModifier>,
    ) -> DamageResult {
        let modifier =
            DamageModifier::combine(std::iter::once(self.get(dtype)).chain(extra));
        DamageResult::new(base, dtype, modifier)
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_scaling() {
        let applied: Vec<i32> = [
            DamageModifier::Immune,
            DamageModifier::Resistant,
            DamageModifier::Normal,
            DamageModifier::Vulnerable,
        ]
        .iter()
        .map(|m| m.apply(7))
        .collect();
        assert_eq!(applied, vec![0, 3, 7, 14]);
    }

    #[test]
    fn test_combine_defenses() {
        use DamageModifier::*;
        assert_eq!(DamageModifier::combine([]), Normal);
        assert_eq!(DamageModifier::combine([Resistant, Resistant]), Resistant);
        assert_eq!(DamageModifier::combine([Resistant, Vulnerable]), Normal);
        assert_eq!(DamageModifier::combine([Vulnerable, Immune]), Immune);
    }

    #[test]
    fn test_calculate_damage_with_effect_defenses() {
        let mut profile = DamageProfile::new();
        profile.add_vulnerability(DamageType::Fire);
        profile.add_immunity(DamageType::Poison);

        let result = profile.calculate_damage(10, DamageType::Fire, []);
        assert_eq!(result.final_damage, 20);

        // Resistance from an effect cancels innate vulnerability
        let result =
            profile.calculate_damage(10, DamageType::Fire, [DamageModifier::Resistant]);
        assert_eq!(result.final_damage, 10);
        assert_eq!(result.modifier, DamageModifier::Normal);

        let result = profile.calculate_damage(10, DamageType::Poison, []);
        assert_eq!(result.final_damage, 0);

        let result =
            profile.calculate_damage(9, DamageType::Slashing, [DamageModifier::Resistant]);
        assert_eq!(result.final_damage, 4);
    }

    #[test]
    fn test_set_normal_clears() {
        let mut profile = DamageProfile::new();
        profile.add_resistance(DamageType::Cold);
        profile.set(DamageType::Cold, DamageModifier::Normal);
        assert!(profile.is_empty());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(" SLASHING ".parse::<DamageType>(), Ok(DamageType::Slashing));
        assert_eq!("holy".parse::<DamageType>(), Ok(DamageType::Radiant));
        assert_eq!("banana".parse::<DamageType>(), Err(()));
        for (dtype, name, _) in NAMES {
            assert_eq!(dtype.to_string(), name);
            assert_eq!(name.parse::<DamageType>(), Ok(dtype));
        }
    }
}
