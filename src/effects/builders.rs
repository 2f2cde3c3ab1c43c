//! Ready-made effects for common class features, spells and conditions

use super::condition::ModifierCondition;
use super::model::{
    EffectDuration, EffectSource, Modifier, ModifierTarget, ModifierValue, StackingRule,
    StatusEffect,
};
use super::EffectError;
use crate::combat::{DamageType, DiceExpr};

/// Rage damage bonus by barbarian level
pub fn rage_damage_bonus(level: u32) -> Result<i32, EffectError> {
    match level {
        1..=8 => Ok(2),
        9..=15 => Ok(3),
        16..=20 => Ok(4),
        _ => Err(EffectError::Level(level)),
    }
}

/// Barbarian rage: melee damage bonus, resistance to weapon damage,
/// advantage on Strength checks and saves
pub fn build_rage_effect(level: u32) -> Result<StatusEffect, EffectError> {
    let bonus = rage_damage_bonus(level)?;

    let mut effect = StatusEffect::new("Rage", EffectSource::Ability, "rage")
        .with_description("Primal fury: harder hits, tougher hide")
        .lasting(EffectDuration::rounds(10))
        .stacking(StackingRule::Replace)
        .with_modifier(
            Modifier::new(ModifierTarget::Damage, ModifierValue::Flat(bonus))
                .when(ModifierCondition::MeleeOnly)
                .described("Rage damage"),
        );

    for dtype in [DamageType::Bludgeoning, DamageType::Piercing, DamageType::Slashing] {
        effect = effect.with_modifier(
            Modifier::new(ModifierTarget::Resistance, ModifierValue::Resistance)
                .on(dtype.to_string()),
        );
    }

    Ok(effect
        .with_modifier(
            Modifier::new(ModifierTarget::AbilityCheck, ModifierValue::Advantage).on("strength"),
        )
        .with_modifier(
            Modifier::new(ModifierTarget::SavingThrow, ModifierValue::Advantage).on("strength"),
        ))
}

/// Bless: +1d4 to attack rolls and saving throws
pub fn build_bless_effect() -> StatusEffect {
    let d4 = ModifierValue::Dice(DiceExpr::new(1, 4, 0));
    StatusEffect::new("Bless", EffectSource::Spell, "bless")
        .lasting(EffectDuration::rounds(10).with_concentration())
        .with_modifier(Modifier::new(ModifierTarget::AttackRoll, d4.clone()))
        .with_modifier(Modifier::new(ModifierTarget::SavingThrow, d4))
}

/// Hunter's Mark: +1d6 weapon damage for an hour
pub fn build_hunters_mark_effect() -> StatusEffect {
    StatusEffect::new("Hunter's Mark", EffectSource::Spell, "hunters_mark")
        .lasting(EffectDuration::rounds(600).with_concentration())
        .with_modifier(Modifier::new(
            ModifierTarget::Damage,
            ModifierValue::Dice(DiceExpr::new(1, 6, 0)),
        ))
}

/// Shield: +5 AC until the start of the caster's next turn
pub fn build_shield_effect() -> StatusEffect {
    StatusEffect::new("Shield", EffectSource::Spell, "shield")
        .lasting(EffectDuration::rounds(1))
        .with_modifier(Modifier::new(ModifierTarget::ArmorClass, ModifierValue::Flat(5)))
}

/// Poisoned: disadvantage on attack rolls and ability checks
pub fn build_poisoned_condition(rounds: u32) -> StatusEffect {
    StatusEffect::new("Poisoned", EffectSource::Condition, "poisoned")
        .lasting(EffectDuration::rounds(rounds))
        .stacking(StackingRule::Replace)
        .with_modifier(Modifier::new(ModifierTarget::AttackRoll, ModifierValue::Disadvantage))
        .with_modifier(Modifier::new(ModifierTarget::AbilityCheck, ModifierValue::Disadvantage))
}

/// Favored enemy: +2 damage against one creature type
pub fn build_favored_enemy_effect(enemy_type: &str) -> StatusEffect {
    let enemy_type = enemy_type.trim().to_lowercase();
    StatusEffect::new(
        format!("Favored Enemy ({})", enemy_type),
        EffectSource::Feature,
        "favored_enemy",
    )
    .with_modifier(
        Modifier::new(ModifierTarget::Damage, ModifierValue::Flat(2))
            .when(ModifierCondition::VsEnemyType(enemy_type)),
    )
}

/// Attack bonus with one specific weapon while it stays equipped
pub fn build_weapon_mastery_effect(weapon: &str, bonus: i32) -> StatusEffect {
    let weapon = weapon.trim().to_lowercase();
    StatusEffect::new(
        format!("Weapon Mastery ({})", weapon),
        EffectSource::Item,
        weapon.clone(),
    )
    .lasting(EffectDuration::while_equipped())
    .stacking(StackingRule::TakeHighest)
    .with_modifier(
        Modifier::new(ModifierTarget::AttackRoll, ModifierValue::Flat(bonus))
            .when(ModifierCondition::WithWeapon(weapon)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{ConditionSet, DurationKind};

    #[test]
    fn test_rage_bonus_by_level() {
        for level in 1..=8 {
            assert_eq!(rage_damage_bonus(level), Ok(2));
        }
        for level in 9..=15 {
            assert_eq!(rage_damage_bonus(level), Ok(3));
        }
        for level in 16..=20 {
            assert_eq!(rage_damage_bonus(level), Ok(4));
        }
        assert_eq!(rage_damage_bonus(0), Err(EffectError::Level(0)));
        assert_eq!(rage_damage_bonus(21), Err(EffectError::Level(21)));
    }

    #[test]
    fn test_rage_shape() {
        let rage = build_rage_effect(9).unwrap();
        assert_eq!(rage.source, EffectSource::Ability);
        assert_eq!(rage.source_id, "rage");
        assert_eq!(rage.duration.kind, DurationKind::Rounds(10));

        let damage: Vec<_> = rage
            .modifiers
            .iter()
            .filter(|m| m.target == ModifierTarget::Damage)
            .collect();
        assert_eq!(damage.len(), 1);
        assert_eq!(damage[0].condition, Some(ModifierCondition::MeleeOnly));
        assert_eq!(damage[0].condition.as_ref().unwrap().to_string(), "melee_only");
        assert_eq!(damage[0].value.to_string(), "+3");

        let resisted: Vec<_> = rage
            .modifiers
            .iter()
            .filter(|m| m.target == ModifierTarget::Resistance)
            .filter_map(|m| m.sub_target.clone())
            .collect();
        assert_eq!(resisted, vec!["bludgeoning", "piercing", "slashing"]);
    }

    #[test]
    fn test_favored_enemy_condition() {
        let effect = build_favored_enemy_effect("Orc");
        let m = &effect.modifiers[0];
        assert!(m.applies(&ConditionSet::new().with("enemy_type", "orc")));
        assert!(!m.applies(&ConditionSet::new().with("enemy_type", "goblin")));
    }

    #[test]
    fn test_weapon_mastery_condition() {
        let effect = build_weapon_mastery_effect("Longsword", 1);
        assert_eq!(effect.duration.kind, DurationKind::WhileEquipped);
        assert_eq!(
            effect.modifiers[0].condition,
            Some(ModifierCondition::WithWeapon("longsword".into()))
        );
    }

    #[test]
    fn test_bless_is_concentration() {
        let bless = build_bless_effect();
        assert!(bless.duration.concentration);
        assert_eq!(bless.magnitude(), Some(5.0));
    }
}
