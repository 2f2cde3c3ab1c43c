//! Status effect values
//!
//! A [`StatusEffect`] is built once (see `builders`) and then handed to an
//! `EffectManager`, which stamps its creation and expiry times. After that
//! it is only ever read.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::condition::{ConditionSet, EffectCondition, ModifierCondition};
use super::EffectError;
use crate::combat::{parse_dice, DamageModifier, DiceExpr};

/// What created an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectSource {
    Ability,
    Spell,
    Item,
    Condition,
    Feature,
    Other,
}

impl FromStr for EffectSource {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ability" => Ok(EffectSource::Ability),
            "spell" => Ok(EffectSource::Spell),
            "item" => Ok(EffectSource::Item),
            "condition" => Ok(EffectSource::Condition),
            "feature" => Ok(EffectSource::Feature),
            "other" => Ok(EffectSource::Other),
            _ => Err(EffectError::UnknownSource(s.to_string())),
        }
    }
}

impl std::fmt::Display for EffectSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EffectSource::Ability => "ability",
            EffectSource::Spell => "spell",
            EffectSource::Item => "item",
            EffectSource::Condition => "condition",
            EffectSource::Feature => "feature",
            EffectSource::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// How long an effect lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DurationKind {
    Permanent,
    Rounds(u32),
    UntilRest,
    WhileEquipped,
    /// Expires the moment it is applied
    Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectDuration {
    pub kind: DurationKind,
    /// Ends early if the caster's concentration breaks
    #[serde(default)]
    pub concentration: bool,
}

impl EffectDuration {
    pub fn permanent() -> Self {
        DurationKind::Permanent.into()
    }

    pub fn rounds(n: u32) -> Self {
        DurationKind::Rounds(n).into()
    }

    pub fn until_rest() -> Self {
        DurationKind::UntilRest.into()
    }

    pub fn while_equipped() -> Self {
        DurationKind::WhileEquipped.into()
    }

    pub fn instant() -> Self {
        DurationKind::Instant.into()
    }

    pub fn with_concentration(mut self) -> Self {
        self.concentration = true;
        self
    }

    /// Absolute expiry for an effect created at `now`. `None` never expires
    /// on its own, which includes round counts too long to represent.
    pub fn expires_at(
        &self,
        now: DateTime<Utc>,
        round_length: chrono::Duration,
    ) -> Option<DateTime<Utc>> {
        match self.kind {
            DurationKind::Rounds(n) => round_length
                .num_milliseconds()
                .checked_mul(i64::from(n))
                .and_then(chrono::Duration::try_milliseconds)
                .and_then(|span| now.checked_add_signed(span)),
            DurationKind::Instant => Some(now),
            DurationKind::Permanent | DurationKind::UntilRest | DurationKind::WhileEquipped => {
                None
            }
        }
    }
}

impl From<DurationKind> for EffectDuration {
    fn from(kind: DurationKind) -> Self {
        Self {
            kind,
            concentration: false,
        }
    }
}

/// What happens when an effect with the same name and source is added again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StackingRule {
    /// The new effect replaces the old one
    #[default]
    Replace,
    /// Both stay active
    Stack,
    /// Keep whichever has the larger numeric magnitude
    TakeHighest,
    /// Keep whichever has the smaller numeric magnitude
    TakeLowest,
}

/// Roll or statistic a modifier adjusts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierTarget {
    AttackRoll,
    Damage,
    SavingThrow,
    AbilityCheck,
    ArmorClass,
    /// Damage taken (resistance/immunity/vulnerability keywords)
    Resistance,
    Speed,
}

impl FromStr for ModifierTarget {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "attack_roll" => Ok(ModifierTarget::AttackRoll),
            "damage" => Ok(ModifierTarget::Damage),
            "saving_throw" => Ok(ModifierTarget::SavingThrow),
            "ability_check" => Ok(ModifierTarget::AbilityCheck),
            "armor_class" | "ac" => Ok(ModifierTarget::ArmorClass),
            "resistance" => Ok(ModifierTarget::Resistance),
            "speed" => Ok(ModifierTarget::Speed),
            _ => Err(EffectError::UnknownTarget(s.to_string())),
        }
    }
}

/// Value carried by a modifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModifierValue {
    Flat(i32),
    Dice(DiceExpr),
    Advantage,
    Disadvantage,
    Resistance,
    Immunity,
    Vulnerability,
}

impl ModifierValue {
    /// Numeric size used by take-highest/take-lowest. Keywords have none.
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            ModifierValue::Flat(n) => Some(*n as f64),
            ModifierValue::Dice(d) => {
                Some(d.count as f64 * (d.sides as f64 + 1.0) / 2.0 + d.modifier as f64)
            }
            _ => None,
        }
    }

    /// Defense granted by a keyword value
    pub fn damage_modifier(&self) -> Option<DamageModifier> {
        match self {
            ModifierValue::Resistance => Some(DamageModifier::Resistant),
            ModifierValue::Immunity => Some(DamageModifier::Immune),
            ModifierValue::Vulnerability => Some(DamageModifier::Vulnerable),
            _ => None,
        }
    }
}

impl FromStr for ModifierValue {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "advantage" => return Ok(ModifierValue::Advantage),
            "disadvantage" => return Ok(ModifierValue::Disadvantage),
            "resistance" => return Ok(ModifierValue::Resistance),
            "immunity" => return Ok(ModifierValue::Immunity),
            "vulnerability" => return Ok(ModifierValue::Vulnerability),
            _ => {}
        }
        if let Ok(n) = trimmed.parse::<i32>() {
            return Ok(ModifierValue::Flat(n));
        }
        parse_dice(trimmed)
            .map(ModifierValue::Dice)
            .map_err(|_| EffectError::BadValue(s.to_string()))
    }
}

impl TryFrom<String> for ModifierValue {
    type Error = EffectError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModifierValue> for String {
    fn from(v: ModifierValue) -> Self {
        v.to_string()
    }
}

impl std::fmt::Display for ModifierValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModifierValue::Flat(n) => write!(f, "{:+}", n),
            ModifierValue::Dice(d) => write!(f, "{}", d),
            ModifierValue::Advantage => write!(f, "advantage"),
            ModifierValue::Disadvantage => write!(f, "disadvantage"),
            ModifierValue::Resistance => write!(f, "resistance"),
            ModifierValue::Immunity => write!(f, "immunity"),
            ModifierValue::Vulnerability => write!(f, "vulnerability"),
        }
    }
}

/// One adjustment carried by an effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifier {
    pub target: ModifierTarget,
    pub value: ModifierValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ModifierCondition>,
    /// Narrower target: an ability ("strength") or a damage type ("fire")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Modifier {
    pub fn new(target: ModifierTarget, value: ModifierValue) -> Self {
        Self {
            target,
            value,
            condition: None,
            sub_target: None,
            description: None,
        }
    }

    /// Parse the string form used by data files, e.g. `("damage", "+2")`
    pub fn parse(target: &str, value: &str) -> Result<Self, EffectError> {
        Ok(Self::new(target.parse()?, value.parse()?))
    }

    pub fn when(mut self, condition: ModifierCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn on(mut self, sub_target: impl Into<String>) -> Self {
        self.sub_target = Some(sub_target.into().to_lowercase());
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn applies(&self, conditions: &ConditionSet) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|c| c.is_satisfied(conditions))
    }

    /// True if the modifier has no sub-target or targets `what`
    pub fn covers(&self, what: &str) -> bool {
        self.sub_target
            .as_deref()
            .is_none_or(|s| s.eq_ignore_ascii_case(what))
    }
}

/// A named, timed bundle of modifiers on one actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source: EffectSource,
    /// e.g. the ability key that created it ("rage")
    #[serde(default)]
    pub source_id: String,
    pub duration: EffectDuration,
    #[serde(default)]
    pub stacking: StackingRule,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub conditions: Vec<EffectCondition>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StatusEffect {
    /// New permanent, replace-stacking effect with a fresh ID
    pub fn new(name: impl Into<String>, source: EffectSource, source_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            source,
            source_id: source_id.into(),
            duration: EffectDuration::permanent(),
            stacking: StackingRule::default(),
            modifiers: Vec::new(),
            conditions: Vec::new(),
            active: false,
            created_at: None,
            expires_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn lasting(mut self, duration: EffectDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn stacking(mut self, rule: StackingRule) -> Self {
        self.stacking = rule;
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn with_condition(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(EffectCondition::new(kind, value));
        self
    }

    /// Same name and same kind of source
    pub fn same_kind(&self, other: &StatusEffect) -> bool {
        self.name == other.name && self.source == other.source
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired_at(now)
    }

    pub fn is_round_based(&self) -> bool {
        matches!(self.duration.kind, DurationKind::Rounds(_))
    }

    /// Whole-effect gate; an effect without conditions always passes
    pub fn gate_passes(&self, conditions: &ConditionSet) -> bool {
        self.conditions.iter().all(|c| c.is_satisfied(conditions))
    }

    /// Sum of numeric modifier sizes, or `None` if there are none
    pub fn magnitude(&self) -> Option<f64> {
        self.modifiers
            .iter()
            .filter_map(|m| m.value.magnitude())
            .fold(None, |acc, m| Some(acc.unwrap_or(0.0) + m))
    }
}
