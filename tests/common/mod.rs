//! Shared fixtures: a goblin, a hero and an engine on scripted dice

#![allow(dead_code)]

use std::sync::Arc;

use skirmish::character::{
    AbilityScores, Armor, ArmorCategory, CharacterSheet, Item, MemoryCharacterStore, Weapon,
};
use skirmish::clock::ManualClock;
use skirmish::combat::{
    AttackKind, AttackSpec, DamageComponent, DamageType, DiceExpr, ScriptedRoller,
};
use skirmish::config::EngineConfig;
use skirmish::encounter::{
    CallContext, EncounterContext, EncounterRepository, MemoryEncounterStore, MonsterTemplate,
    NewEncounter, TurnEngine, TurnMode,
};

pub const HERO_ID: &str = "char-hero";

/// AC 15, HP 7, Scimitar +4 for 1d6+2 slashing
pub fn goblin() -> MonsterTemplate {
    MonsterTemplate {
        name: "Goblin".into(),
        creature_type: Some("goblinoid".into()),
        armor_class: 15,
        max_hp: 7,
        initiative_bonus: 2,
        speed: 30,
        actions: vec![AttackSpec {
            name: "Scimitar".into(),
            kind: AttackKind::Melee,
            weapon: Some("scimitar".into()),
            attack_bonus: 4,
            damage: vec![DamageComponent::new(
                DiceExpr::new(1, 6, 2),
                DamageType::Slashing,
            )],
        }],
        resistances: vec![],
        immunities: vec![],
        vulnerabilities: vec![],
        saves: Default::default(),
    }
}

/// AC 14 (leather + Dex 16), HP 11, Shortsword +5 for 1d6+3 piercing
pub fn hero() -> CharacterSheet {
    CharacterSheet {
        id: HERO_ID.into(),
        name: "Hero".into(),
        level: 1,
        max_hp: 11,
        current_hp: None,
        abilities: AbilityScores {
            dexterity: 16,
            ..Default::default()
        },
        speed: 30,
        equipment: vec![
            Item::Weapon(Weapon {
                name: "Shortsword".into(),
                damage: DiceExpr::new(1, 6, 0),
                damage_type: DamageType::Piercing,
                kind: AttackKind::Melee,
                finesse: true,
                magic_bonus: 0,
            }),
            Item::Armor(Armor {
                name: "Leather".into(),
                category: ArmorCategory::Light,
                base_ac: 11,
                magic_bonus: 0,
            }),
        ],
    }
}

pub fn ctx() -> CallContext {
    CallContext::new("dm-1")
}

/// An engine with its collaborators exposed
pub struct Table {
    pub engine: TurnEngine,
    pub dice: Arc<ScriptedRoller>,
    pub clock: Arc<ManualClock>,
    pub characters: Arc<MemoryCharacterStore>,
}

impl Table {
    pub async fn new(mode: TurnMode) -> Self {
        Self::with_repo(mode, Arc::new(MemoryEncounterStore::new())).await
    }

    pub async fn with_repo(mode: TurnMode, repo: Arc<dyn EncounterRepository>) -> Self {
        let dice = Arc::new(ScriptedRoller::default());
        let clock = Arc::new(ManualClock::default());
        let characters = Arc::new(MemoryCharacterStore::new());
        characters.insert(hero()).await;
        let config = EngineConfig {
            turn_mode: mode,
            round_seconds: 6,
        };
        let engine = TurnEngine::new(
            repo,
            characters.clone(),
            dice.clone(),
            clock.clone(),
            &config,
        );
        Self {
            engine,
            dice,
            clock,
            characters,
        }
    }

    pub async fn encounter(&self) -> String {
        self.engine
            .create_encounter(
                &ctx(),
                NewEncounter {
                    name: "Roadside Ambush".into(),
                    description: "Goblins jump out of the brush".into(),
                    context: EncounterContext::new("session-1"),
                },
            )
            .await
            .expect("create encounter")
            .id()
            .to_string()
    }
}
