//! Character collaborator
//!
//! The engine reads a few numbers off a persistent character: AC, hit
//! points, initiative bonus and the attacks its equipped weapons allow.
//! Equipment is a closed set of item kinds so AC and attack math match on
//! them exhaustively.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::combat::{AttackKind, AttackSpec, DamageComponent, DamageType, DiceExpr};
use crate::encounter::StorageError;

/// The six ability scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn key(&self) -> &'static str {
        match self {
            Ability::Strength => "strength",
            Ability::Dexterity => "dexterity",
            Ability::Constitution => "constitution",
            Ability::Intelligence => "intelligence",
            Ability::Wisdom => "wisdom",
            Ability::Charisma => "charisma",
        }
    }
}

impl std::str::FromStr for Ability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strength" | "str" => Ok(Ability::Strength),
            "dexterity" | "dex" => Ok(Ability::Dexterity),
            "constitution" | "con" => Ok(Ability::Constitution),
            "intelligence" | "int" => Ok(Ability::Intelligence),
            "wisdom" | "wis" => Ok(Ability::Wisdom),
            "charisma" | "cha" => Ok(Ability::Charisma),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Ability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
        }
    }
}

impl AbilityScores {
    pub fn score(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    /// Standard modifier: (score - 10) / 2, rounded down
    pub fn modifier(&self, ability: Ability) -> i32 {
        (self.score(ability) - 10).div_euclid(2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    pub damage: DiceExpr,
    pub damage_type: DamageType,
    #[serde(default = "melee")]
    pub kind: AttackKind,
    /// May use Dexterity instead of Strength
    #[serde(default)]
    pub finesse: bool,
    /// +1/+2/+3 magic weapons
    #[serde(default)]
    pub magic_bonus: i32,
}

fn melee() -> AttackKind {
    AttackKind::Melee
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmorCategory {
    Light,
    Medium,
    Heavy,
    Shield,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Armor {
    pub name: String,
    pub category: ArmorCategory,
    /// Base AC for body armor, bonus for shields
    pub base_ac: i32,
    #[serde(default)]
    pub magic_bonus: i32,
}

/// Anything a character can carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum Item {
    Weapon(Weapon),
    Armor(Armor),
    Other { name: String },
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Weapon(w) => &w.name,
            Item::Armor(a) => &a.name,
            Item::Other { name } => name,
        }
    }
}

/// What the engine needs from a persistent character record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub id: String,
    pub name: String,
    #[serde(default = "first_level")]
    pub level: u32,
    pub max_hp: i32,
    /// Defaults to max_hp when absent
    #[serde(default)]
    pub current_hp: Option<i32>,
    #[serde(default)]
    pub abilities: AbilityScores,
    #[serde(default = "walking_speed")]
    pub speed: u32,
    /// Equipped items
    #[serde(default)]
    pub equipment: Vec<Item>,
}

fn first_level() -> u32 {
    1
}

fn walking_speed() -> u32 {
    30
}

impl CharacterSheet {
    pub fn proficiency_bonus(&self) -> i32 {
        2 + (self.level.clamp(1, 20) as i32 - 1) / 4
    }

    pub fn hp(&self) -> i32 {
        self.current_hp.unwrap_or(self.max_hp).clamp(0, self.max_hp)
    }

    pub fn initiative_bonus(&self) -> i32 {
        self.abilities.modifier(Ability::Dexterity)
    }

    /// AC from worn armor and shield; 10 + Dex when unarmored
    pub fn armor_class(&self) -> i32 {
        let dex = self.abilities.modifier(Ability::Dexterity);
        let mut body: Option<i32> = None;
        let mut shield = 0;

        for item in &self.equipment {
            match item {
                Item::Armor(armor) => {
                    let value = armor.base_ac + armor.magic_bonus;
                    match armor.category {
                        ArmorCategory::Light => body = Some(body.unwrap_or(0).max(value + dex)),
                        ArmorCategory::Medium => {
                            body = Some(body.unwrap_or(0).max(value + dex.min(2)))
                        }
                        ArmorCategory::Heavy => body = Some(body.unwrap_or(0).max(value)),
                        ArmorCategory::Shield => shield = shield.max(value),
                    }
                }
                Item::Weapon(_) | Item::Other { .. } => {}
            }
        }

        body.unwrap_or(10 + dex) + shield
    }

    /// One attack per equipped weapon, or an unarmed strike if none
    pub fn attacks(&self) -> Vec<AttackSpec> {
        let strength = self.abilities.modifier(Ability::Strength);
        let dexterity = self.abilities.modifier(Ability::Dexterity);
        let proficiency = self.proficiency_bonus();

        let mut attacks: Vec<AttackSpec> = self
            .equipment
            .iter()
            .filter_map(|item| match item {
                Item::Weapon(w) => Some(w),
                Item::Armor(_) | Item::Other { .. } => None,
            })
            .map(|w| {
                let ability = match (w.kind, w.finesse) {
                    (AttackKind::Ranged, _) => dexterity,
                    (AttackKind::Melee, true) => strength.max(dexterity),
                    (AttackKind::Melee, false) => strength,
                };
                let mut damage = w.damage.clone();
                damage.modifier += ability + w.magic_bonus;
                AttackSpec {
                    name: w.name.clone(),
                    kind: w.kind,
                    weapon: Some(w.name.to_lowercase()),
                    attack_bonus: ability + proficiency + w.magic_bonus,
                    damage: vec![DamageComponent::new(damage, w.damage_type)],
                }
            })
            .collect();

        if attacks.is_empty() {
            attacks.push(AttackSpec {
                name: "Unarmed Strike".to_string(),
                kind: AttackKind::Melee,
                weapon: None,
                attack_bonus: strength + proficiency,
                damage: vec![DamageComponent::new(
                    DiceExpr::new(1, 1, strength),
                    DamageType::Bludgeoning,
                )],
            });
        }
        attacks
    }
}

/// Read-only access to persistent characters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CharacterProvider: Send + Sync {
    async fn character(&self, id: &str) -> Result<Option<CharacterSheet>, StorageError>;
}

/// In-memory character records
#[derive(Debug, Default)]
pub struct MemoryCharacterStore {
    characters: RwLock<HashMap<String, CharacterSheet>>,
}

impl MemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, sheet: CharacterSheet) {
        self.characters.write().await.insert(sheet.id.clone(), sheet);
    }
}

#[async_trait]
impl CharacterProvider for MemoryCharacterStore {
    async fn character(&self, id: &str) -> Result<Option<CharacterSheet>, StorageError> {
        Ok(self.characters.read().await.get(id).cloned())
    }
}
