//! Attack and saving throw resolution
//!
//! The resolver owns every roll of an attack: the d20 (or 2d20 with
//! advantage/disadvantage), any dice granted by effects, and each damage
//! component. Status effects on both sides are folded in through their
//! effect managers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::damage::{DamageModifier, DamageProfile, DamageResult, DamageType};
use super::dice::{is_critical, is_fumble, DiceError, DiceExpr, DiceRoller, RollResult};
use crate::character::Ability;
use crate::effects::{
    ConditionSet, EffectManager, Modifier, ModifierTarget, ModifierValue, ATTACK_TYPE,
    ENEMY_TYPE, WEAPON,
};

/// Melee or ranged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    #[default]
    Melee,
    Ranged,
}

impl AttackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackKind::Melee => "melee",
            AttackKind::Ranged => "ranged",
        }
    }
}

impl std::fmt::Display for AttackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed damage roll of an attack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageComponent {
    pub dice: DiceExpr,
    pub damage_type: DamageType,
}

impl DamageComponent {
    pub fn new(dice: DiceExpr, damage_type: DamageType) -> Self {
        Self { dice, damage_type }
    }
}

/// Everything needed to roll one attack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackSpec {
    pub name: String,
    #[serde(default)]
    pub kind: AttackKind,
    /// Lowercase weapon key, matched by `with_weapon:` conditions
    #[serde(default)]
    pub weapon: Option<String>,
    pub attack_bonus: i32,
    pub damage: Vec<DamageComponent>,
}

/// How many d20s to roll and which to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RollMode {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl RollMode {
    /// Advantage and disadvantage from any number of sources cancel out
    pub fn from_modifiers<'a>(modifiers: impl IntoIterator<Item = &'a Modifier>) -> Self {
        let (mut adv, mut dis) = (false, false);
        for m in modifiers {
            match m.value {
                ModifierValue::Advantage => adv = true,
                ModifierValue::Disadvantage => dis = true,
                _ => {}
            }
        }
        match (adv, dis) {
            (true, false) => RollMode::Advantage,
            (false, true) => RollMode::Disadvantage,
            _ => RollMode::Normal,
        }
    }
}

/// The defending side of an attack
#[derive(Debug, Clone, Copy)]
pub struct DefenderView<'a> {
    pub armor_class: i32,
    pub creature_type: Option<&'a str>,
    pub profile: &'a DamageProfile,
    pub effects: Option<&'a EffectManager>,
}

/// Rolled damage for one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRoll {
    /// Expression actually rolled (dice doubled on a critical)
    pub dice: DiceExpr,
    pub roll: RollResult,
    pub result: DamageResult,
}

/// Result of an attack roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackResult {
    pub attack: String,
    /// The kept d20
    pub roll: u32,
    /// Every d20 rolled
    pub d20s: Vec<u32>,
    pub mode: RollMode,
    /// Kept d20 + attack bonus + effect bonuses
    pub attack_total: i32,
    /// Target AC including effect bonuses
    pub target_ac: i32,
    pub hit: bool,
    pub critical: bool,
    pub fumble: bool,
    /// Empty on a miss
    pub damage: Vec<DamageRoll>,
}

impl AttackResult {
    /// Apply the hit rule to a kept d20: a natural 20 always hits, a
    /// natural 1 always misses, anything else compares against AC.
    pub fn new(roll: u32, attack_bonus: i32, target_ac: i32) -> Self {
        let critical = is_critical(roll);
        let fumble = is_fumble(roll);
        let attack_total = roll as i32 + attack_bonus;
        let hit = critical || (!fumble && attack_total >= target_ac);

        Self {
            attack: String::new(),
            roll,
            d20s: vec![roll],
            mode: RollMode::Normal,
            attack_total,
            target_ac,
            hit,
            critical,
            fumble,
            damage: Vec::new(),
        }
    }

    /// Damage after defenses, summed over components
    pub fn total_damage(&self) -> i32 {
        self.damage.iter().map(|d| d.result.final_damage).sum()
    }

    /// Short human-readable summary
    pub fn describe(&self) -> String {
        let mut line = format!(
            "{} ({}{} = {} vs AC {})",
            self.attack,
            self.roll,
            signed(self.attack_total - self.roll as i32),
            self.attack_total,
            self.target_ac
        );
        if self.critical {
            line.push_str(": critical hit");
        } else if self.fumble {
            line.push_str(": natural 1");
        } else if self.hit {
            line.push_str(": hit");
        } else {
            line.push_str(": miss");
        }
        if !self.damage.is_empty() {
            let parts: Vec<String> = self
                .damage
                .iter()
                .map(|d| format!("{} {}", d.result.final_damage, d.result.damage_type))
                .collect();
            line.push_str(&format!(" for {}", parts.join(" + ")));
        }
        line
    }
}

fn signed(n: i32) -> String {
    if n < 0 {
        format!(" - {}", -n)
    } else {
        format!(" + {}", n)
    }
}

/// Result of a saving throw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub ability: Ability,
    pub dc: i32,
    pub roll: u32,
    pub d20s: Vec<u32>,
    pub mode: RollMode,
    pub total: i32,
    pub success: bool,
}

/// Rolls attacks and saves through a dice collaborator
#[derive(Clone)]
pub struct CombatResolver {
    dice: Arc<dyn DiceRoller>,
}

impl std::fmt::Debug for CombatResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatResolver").finish_non_exhaustive()
    }
}

impl CombatResolver {
    pub fn new(dice: Arc<dyn DiceRoller>) -> Self {
        Self { dice }
    }

    pub fn dice(&self) -> &Arc<dyn DiceRoller> {
        &self.dice
    }

    /// Roll initiative: 1d20 + bonus
    pub fn roll_initiative(&self, bonus: i32) -> Result<RollResult, DiceError> {
        self.dice.roll(1, 20, bonus)
    }

    /// Resolve one attack.
    ///
    /// Roll order: d20s, attack-roll effect dice, then damage components in
    /// order followed by damage dice from effects.
    pub fn resolve_attack(
        &self,
        spec: &AttackSpec,
        attacker_effects: Option<&EffectManager>,
        target: DefenderView<'_>,
    ) -> Result<AttackResult, DiceError> {
        let conditions = attack_conditions(spec, target.creature_type);

        let attack_mods = modifiers(attacker_effects, ModifierTarget::AttackRoll, &conditions);
        let mode = RollMode::from_modifiers(&attack_mods);
        let (roll, d20s) = self.roll_d20(mode)?;
        let bonus = spec.attack_bonus + self.numeric_total(&attack_mods)?;

        let ac_mods = modifiers(target.effects, ModifierTarget::ArmorClass, &conditions);
        let target_ac = target.armor_class + flat_total(&ac_mods);

        let mut result = AttackResult::new(roll, bonus, target_ac);
        result.attack = spec.name.clone();
        result.d20s = d20s;
        result.mode = mode;

        if result.hit {
            let damage_mods = modifiers(attacker_effects, ModifierTarget::Damage, &conditions);
            let defenses = modifiers(target.effects, ModifierTarget::Resistance, &conditions);
            for component in damage_components(spec, &damage_mods) {
                let dice = if result.critical {
                    component.dice.doubled_dice()
                } else {
                    component.dice.clone()
                };
                let roll = self.dice.roll_expr(&dice)?;
                let dtype = component.damage_type;
                let granted = defenses
                    .iter()
                    .filter(|m| m.covers(&dtype.to_string()))
                    .filter_map(|m| m.value.damage_modifier());
                let damage = target
                    .profile
                    .calculate_damage(roll.total.max(0), dtype, granted);
                result.damage.push(DamageRoll {
                    dice,
                    roll,
                    result: damage,
                });
            }
        }

        debug!(
            "Resolved {}: d20 {:?} total {} vs AC {} hit={} damage={}",
            spec.name,
            result.d20s,
            result.attack_total,
            result.target_ac,
            result.hit,
            result.total_damage()
        );
        Ok(result)
    }

    /// Resolve a saving throw against `dc`. Naturals have no special meaning.
    pub fn resolve_saving_throw(
        &self,
        ability: Ability,
        dc: i32,
        bonus: i32,
        effects: Option<&EffectManager>,
        conditions: &ConditionSet,
    ) -> Result<SaveResult, DiceError> {
        let mods: Vec<Modifier> = modifiers(effects, ModifierTarget::SavingThrow, conditions)
            .into_iter()
            .filter(|m| m.covers(ability.key()))
            .collect();
        let mode = RollMode::from_modifiers(&mods);
        let (roll, d20s) = self.roll_d20(mode)?;
        let total = roll as i32 + bonus + self.numeric_total(&mods)?;

        Ok(SaveResult {
            ability,
            dc,
            roll,
            d20s,
            mode,
            total,
            success: total >= dc,
        })
    }

    fn roll_d20(&self, mode: RollMode) -> Result<(u32, Vec<u32>), DiceError> {
        match mode {
            RollMode::Normal => {
                let roll = self.dice.d20()?;
                Ok((roll, vec![roll]))
            }
            RollMode::Advantage | RollMode::Disadvantage => {
                let rolls = self.dice.roll(2, 20, 0)?.rolls;
                let kept = if mode == RollMode::Advantage {
                    rolls.iter().max()
                } else {
                    rolls.iter().min()
                };
                Ok((kept.copied().unwrap_or(0), rolls))
            }
        }
    }

    /// Flat values plus freshly rolled dice values
    fn numeric_total(&self, mods: &[Modifier]) -> Result<i32, DiceError> {
        let mut total = 0;
        for m in mods {
            match &m.value {
                ModifierValue::Flat(n) => total += n,
                ModifierValue::Dice(expr) => total += self.dice.roll_expr(expr)?.total,
                _ => {}
            }
        }
        Ok(total)
    }
}

fn attack_conditions(spec: &AttackSpec, enemy_type: Option<&str>) -> ConditionSet {
    let mut conditions = ConditionSet::new().with(ATTACK_TYPE, spec.kind.as_str());
    if let Some(weapon) = &spec.weapon {
        conditions.insert(WEAPON, weapon);
    }
    if let Some(enemy) = enemy_type {
        conditions.insert(ENEMY_TYPE, enemy);
    }
    conditions
}

fn modifiers(
    effects: Option<&EffectManager>,
    target: ModifierTarget,
    conditions: &ConditionSet,
) -> Vec<Modifier> {
    effects
        .map(|m| m.get_modifiers(target, conditions))
        .unwrap_or_default()
}

fn flat_total(mods: &[Modifier]) -> i32 {
    mods.iter()
        .filter_map(|m| match m.value {
            ModifierValue::Flat(n) => Some(n),
            _ => None,
        })
        .sum()
}

/// The attack's own components with flat damage bonuses folded into the
/// first one and effect dice appended using the first component's type
fn damage_components(spec: &AttackSpec, damage_mods: &[Modifier]) -> Vec<DamageComponent> {
    let mut components = spec.damage.clone();
    let Some(primary) = components.first_mut() else {
        return components;
    };
    primary.dice.modifier += flat_total(damage_mods);
    let primary_type = primary.damage_type;

    components.extend(damage_mods.iter().filter_map(|m| match &m.value {
        ModifierValue::Dice(expr) => Some(DamageComponent::new(expr.clone(), primary_type)),
        _ => None,
    }));
    components
}

/// Combined defense a target has against one damage type right now
pub fn defense_against(
    profile: &DamageProfile,
    effects: Option<&EffectManager>,
    dtype: DamageType,
) -> DamageModifier {
    let granted = modifiers(effects, ModifierTarget::Resistance, &ConditionSet::new())
        .into_iter()
        .filter(|m| m.covers(&dtype.to_string()))
        .filter_map(|m| m.value.damage_modifier());
    DamageModifier::combine(std::iter::once(profile.get(dtype)).chain(granted))
}
