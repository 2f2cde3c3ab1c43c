//! Scripted skirmish between a party and a monster group
//!
//! Every acting combatant attacks the standing enemy with the fewest hit
//! points, then passes the turn, until one side falls or the round limit
//! runs out.

use std::path::Path;
use std::sync::Arc;

use figment::providers::{Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::character::{CharacterSheet, MemoryCharacterStore};
use crate::clock::Clock;
use crate::combat::DiceRoller;
use crate::config::EngineConfig;
use crate::encounter::{
    CallContext, Combatant, Encounter, EncounterContext, EncounterRepository, EncounterStatus,
    EngineError, MonsterTemplate, NewEncounter, Outcome, TurnEngine,
};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to read scenario {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] Box<figment::Error>),

    #[error("invalid scenario: {0}")]
    Invalid(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A party and the monsters it faces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub heroes: Vec<CharacterSheet>,
    #[serde(default)]
    pub monsters: Vec<MonsterTemplate>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path).map_err(|source| SimError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, SimError> {
        let scenario: Scenario = Figment::from(Toml::string(text))
            .extract()
            .map_err(Box::new)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.heroes.is_empty() {
            return Err(SimError::Invalid(format!("{} has no heroes", self.name)));
        }
        if self.monsters.is_empty() {
            return Err(SimError::Invalid(format!("{} has no monsters", self.name)));
        }
        Ok(())
    }
}

/// How a simulated encounter went
#[derive(Debug, Clone)]
pub struct SimReport {
    pub encounter: Encounter,
    pub attacks: u32,
}

impl SimReport {
    pub fn outcome(&self) -> Option<Outcome> {
        self.encounter.outcome()
    }

    pub fn summary(&self) -> String {
        let verdict = match self.outcome() {
            Some(Outcome::PlayersWon) => "the heroes won",
            Some(Outcome::MonstersWon) => "the monsters won",
            Some(Outcome::Ended) | None => "nobody won",
        };
        format!(
            "{}: {} in round {} after {} attacks",
            self.encounter.name(),
            verdict,
            self.encounter.round(),
            self.attacks
        )
    }
}

/// A turn engine wired to an in-memory character store
pub struct Simulation {
    engine: TurnEngine,
    characters: Arc<MemoryCharacterStore>,
}

impl Simulation {
    pub fn new(
        repo: Arc<dyn EncounterRepository>,
        dice: Arc<dyn DiceRoller>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        let characters = Arc::new(MemoryCharacterStore::new());
        let engine = TurnEngine::new(repo, characters.clone(), dice, clock, config);
        Self { engine, characters }
    }

    pub fn engine(&self) -> &TurnEngine {
        &self.engine
    }

    /// Fight the scenario out. Past `max_rounds` the encounter is ended
    /// without a winner.
    pub async fn run(&self, scenario: &Scenario, max_rounds: u32) -> Result<SimReport, SimError> {
        if max_rounds == 0 {
            return Err(SimError::Invalid("max_rounds must be at least 1".into()));
        }
        let ctx = CallContext::new("simulator");
        let engine = &self.engine;

        let encounter = engine
            .create_encounter(
                &ctx,
                NewEncounter {
                    name: scenario.name.clone(),
                    description: format!(
                        "{} heroes against {} monsters",
                        scenario.heroes.len(),
                        scenario.monsters.len()
                    ),
                    context: EncounterContext::new("simulation"),
                },
            )
            .await?;
        let id = encounter.id().to_string();

        for hero in &scenario.heroes {
            self.characters.insert(hero.clone()).await;
            engine.add_player(&ctx, &id, &hero.id, None).await?;
        }
        for monster in &scenario.monsters {
            engine.add_monster(&ctx, &id, monster).await?;
        }
        engine.roll_initiative(&ctx, &id).await?;
        let mut encounter = engine.start_encounter(&ctx, &id).await?;
        info!("Simulating {} ({})", scenario.name, id);

        let mut attacks = 0;
        loop {
            if encounter.status() == EncounterStatus::Completed {
                break;
            }
            if encounter.round() > max_rounds {
                encounter = engine.end_encounter(&ctx, &id).await?;
                break;
            }
            if encounter.round_pending() {
                encounter = engine.continue_round(&ctx, &id).await?;
                continue;
            }

            let planned = encounter.current_combatant().and_then(|actor| {
                let able = actor.is_player() || actor.can_act();
                let target = weakest_enemy(&encounter, actor)?;
                able.then(|| (actor.id().to_string(), target.id().to_string()))
            });
            if let Some((attacker, target)) = planned {
                let outcome = engine.attack(&ctx, &id, &attacker, &target, None).await?;
                attacks += 1;
                debug!("{}", outcome.result.describe());
                if outcome.combat_end.0 {
                    encounter = engine.get_encounter(&ctx, &id).await?;
                    continue;
                }
            }
            encounter = engine.next_turn(&ctx, &id).await?;
        }

        Ok(SimReport { encounter, attacks })
    }
}

/// Standing combatant on the other side with the fewest hit points
fn weakest_enemy<'a>(encounter: &'a Encounter, actor: &Combatant) -> Option<&'a Combatant> {
    encounter
        .combatants()
        .iter()
        .filter(|c| c.kind() != actor.kind() && c.is_standing())
        .min_by_key(|c| (c.current_hp(), c.join_order()))
}
