//! Encounter turn engine
//!
//! Every operation on an encounter runs under that encounter's lock as
//! load, mutate a working copy, save. A failure anywhere before the save
//! leaves the stored encounter untouched. Status effects live outside the
//! stored encounter, so changes to them are staged and only applied once
//! the save has succeeded.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::combatant::{ActionSlot, Combatant, MonsterTemplate, TurnFlags};
use super::model::{Advance, Encounter, EncounterContext, EncounterStatus, Outcome};
use super::repository::EncounterRepository;
use super::EngineError;
use crate::character::{Ability, CharacterProvider};
use crate::clock::Clock;
use crate::combat::{
    AttackResult, AttackSpec, CombatResolver, DefenderView, DiceRoller, SaveResult,
};
use crate::config::EngineConfig;
use crate::effects::{AddOutcome, ConditionSet, EffectRegistry, StatusEffect};

/// What happens when the last combatant of a round finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    /// Stop with the round pending until `continue_round`
    #[default]
    Checkpoint,
    /// Start the next round immediately
    Auto,
}

/// Who is calling, and a signal to give up before starting
#[derive(Debug, Clone)]
pub struct CallContext {
    pub actor_id: String,
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self::with_cancel(actor_id, CancellationToken::new())
    }

    pub fn with_cancel(actor_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            actor_id: actor_id.into(),
            cancel,
        }
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}

/// Fields for a new encounter
#[derive(Debug, Clone, Default)]
pub struct NewEncounter {
    pub name: String,
    pub description: String,
    pub context: EncounterContext,
}

/// Hit point change on one combatant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HpChange {
    pub combatant_id: String,
    pub previous: i32,
    pub current: i32,
    pub max: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DamageOutcome {
    pub hp: HpChange,
    /// `(should_end, players_won)` after the damage landed
    pub combat_end: (bool, bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttackOutcome {
    pub result: AttackResult,
    /// Set when the attack hit
    pub hp: Option<HpChange>,
    pub combat_end: (bool, bool),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcentrationOutcome {
    pub save: SaveResult,
    /// Effects lost when the save failed
    pub dropped: Vec<StatusEffect>,
}

type Guard = OwnedMutexGuard<()>;

/// Effect registry change applied after the encounter is saved
#[derive(Debug)]
enum EffectChange {
    Add {
        combatant_id: String,
        effect: StatusEffect,
    },
    Remove {
        combatant_id: String,
        effect_id: String,
    },
    ClearConcentration(String),
    RoundEnd(Vec<String>),
}

/// The encounter state machine
pub struct TurnEngine {
    repo: Arc<dyn EncounterRepository>,
    characters: Arc<dyn CharacterProvider>,
    resolver: CombatResolver,
    effects: Arc<EffectRegistry>,
    clock: Arc<dyn Clock>,
    mode: TurnMode,
    locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl std::fmt::Debug for TurnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnEngine")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl TurnEngine {
    pub fn new(
        repo: Arc<dyn EncounterRepository>,
        characters: Arc<dyn CharacterProvider>,
        dice: Arc<dyn DiceRoller>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            repo,
            characters,
            resolver: CombatResolver::new(dice),
            effects: EffectRegistry::shared(clock.clone(), config.round_length()),
            clock,
            mode: config.turn_mode,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> TurnMode {
        self.mode
    }

    /// Effect managers of every combatant this engine has seen
    pub fn effects(&self) -> &Arc<EffectRegistry> {
        &self.effects
    }

    // ---- plumbing ----

    async fn lock(&self, id: &str) -> Guard {
        let lock = self.locks.lock().entry(id.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    async fn load(&self, id: &str) -> Result<Encounter, EngineError> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("encounter", id))
    }

    /// Take the encounter lock and load a working copy
    async fn open(&self, ctx: &CallContext, id: &str) -> Result<(Guard, Encounter), EngineError> {
        ctx.check()?;
        let guard = self.lock(id).await;
        ctx.check()?;
        let encounter = self.load(id).await?;
        Ok((guard, encounter))
    }

    async fn commit(&self, encounter: &mut Encounter) -> Result<(), EngineError> {
        encounter.touch(self.clock.now());
        self.repo.save(encounter).await.map_err(|err| {
            warn!("Failed to save encounter {}: {}", encounter.id(), err);
            EngineError::from(err)
        })
    }

    /// Run `op` on a working copy, save it, then apply the effect changes
    /// `op` staged. The lock is held until the changes are applied.
    async fn staged<T>(
        &self,
        ctx: &CallContext,
        id: &str,
        op: impl FnOnce(&mut Encounter, &mut Vec<EffectChange>) -> Result<T, EngineError>,
    ) -> Result<(T, Encounter), EngineError> {
        let (_guard, mut encounter) = self.open(ctx, id).await?;
        let mut changes = Vec::new();
        let out = op(&mut encounter, &mut changes)?;
        self.commit(&mut encounter).await?;
        for change in changes {
            self.apply_change(change);
        }
        Ok((out, encounter))
    }

    async fn mutate<T>(
        &self,
        ctx: &CallContext,
        id: &str,
        op: impl FnOnce(&mut Encounter) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let (out, _) = self.staged(ctx, id, |e, _| op(e)).await?;
        Ok(out)
    }

    /// Like `mutate`, returning the saved encounter
    async fn transition(
        &self,
        ctx: &CallContext,
        id: &str,
        op: impl FnOnce(&mut Encounter, &mut Vec<EffectChange>) -> Result<(), EngineError>,
    ) -> Result<Encounter, EngineError> {
        let ((), encounter) = self.staged(ctx, id, op).await?;
        Ok(encounter)
    }

    fn apply_change(&self, change: EffectChange) {
        match change {
            EffectChange::Add {
                combatant_id,
                effect,
            } => {
                let name = effect.name.clone();
                if let Err(err) = self.effects.manager(&combatant_id).add_effect(effect) {
                    warn!("Could not add {} to {}: {}", name, combatant_id, err);
                }
            }
            EffectChange::Remove {
                combatant_id,
                effect_id,
            } => {
                if let Some(m) = self.effects.get(&combatant_id) {
                    m.remove_effect(&effect_id);
                }
            }
            EffectChange::ClearConcentration(combatant_id) => {
                if let Some(m) = self.effects.get(&combatant_id) {
                    m.clear_concentration();
                }
            }
            EffectChange::RoundEnd(combatant_ids) => {
                for m in combatant_ids.iter().filter_map(|cid| self.effects.get(cid)) {
                    m.process_round_end();
                }
            }
        }
    }

    fn require_roster_open(encounter: &Encounter) -> Result<(), EngineError> {
        encounter.require_status(EncounterStatus::Setup)?;
        if encounter.initiative_rolled() {
            return Err(EngineError::InvalidState(
                "combatants cannot join after initiative is rolled".into(),
            ));
        }
        Ok(())
    }

    /// Complete an active encounter if one side is down
    fn settle(&self, encounter: &mut Encounter) -> (bool, bool) {
        let (should_end, players_won) = encounter.combat_outcome();
        if should_end && encounter.status() == EncounterStatus::Active {
            let (outcome, text) = if players_won {
                (Outcome::PlayersWon, "Combat is over: the heroes are victorious!")
            } else {
                (Outcome::MonstersWon, "Combat is over: the heroes have fallen.")
            };
            encounter.complete(outcome);
            encounter.push_log(self.clock.now(), text);
            info!("Encounter {} completed: {:?}", encounter.id(), outcome);
        }
        (should_end, players_won)
    }

    fn hurt(
        &self,
        encounter: &mut Encounter,
        target_id: &str,
        amount: i32,
    ) -> Result<HpChange, EngineError> {
        let now = self.clock.now();
        let target = encounter.combatant_mut(target_id)?;
        let previous = target.current_hp();
        target.take_damage(amount);
        let (name, current, max) = (
            target.name().to_string(),
            target.current_hp(),
            target.max_hp(),
        );

        encounter.push_log(
            now,
            format!("{} takes {} damage ({}/{} HP)", name, amount, current, max),
        );
        if current == 0 && previous > 0 {
            encounter.push_log(now, format!("{} falls!", name));
        }
        Ok(HpChange {
            combatant_id: target_id.to_string(),
            previous,
            current,
            max,
        })
    }

    /// Log the round-based effects that ran out and stage their sweep
    fn end_round_effects(&self, encounter: &mut Encounter, changes: &mut Vec<EffectChange>) {
        let now = self.clock.now();
        let expired: Vec<(String, String)> = encounter
            .combatants()
            .iter()
            .filter_map(|c| self.effects.get(c.id()).map(|m| (c.name().to_string(), m)))
            .flat_map(|(name, m)| {
                m.expired_round_effects()
                    .into_iter()
                    .map(move |e| (name.clone(), e.name))
            })
            .collect();
        for (who, effect) in expired {
            encounter.push_log(now, format!("{} on {} has ended", effect, who));
        }
        changes.push(EffectChange::RoundEnd(
            encounter.combatants().iter().map(|c| c.id().to_string()).collect(),
        ));
    }

    fn announce_turn(&self, encounter: &mut Encounter) {
        if let Some(name) = encounter.current_combatant().map(|c| c.name().to_string()) {
            encounter.push_log(self.clock.now(), format!("{}'s turn", name));
            debug!(
                "Encounter {} round {} turn {}: {}",
                encounter.id(),
                encounter.round(),
                encounter.turn(),
                name
            );
        }
    }

    // ---- encounter lifecycle ----

    pub async fn create_encounter(
        &self,
        ctx: &CallContext,
        new: NewEncounter,
    ) -> Result<Encounter, EngineError> {
        ctx.check()?;
        if new.name.trim().is_empty() {
            return Err(EngineError::Validation("encounter name must not be empty".into()));
        }
        let now = self.clock.now();
        let mut encounter = Encounter::new(
            uuid::Uuid::new_v4().to_string(),
            new.name,
            new.description,
            new.context,
            ctx.actor_id.clone(),
            now,
        );
        encounter.push_log(now, format!("Encounter '{}' created", encounter.name()));
        self.repo.create(&encounter).await?;
        info!(
            "Created encounter {} ({}) for session {}",
            encounter.id(),
            encounter.name(),
            encounter.session_id()
        );
        Ok(encounter)
    }

    pub async fn get_encounter(&self, ctx: &CallContext, id: &str) -> Result<Encounter, EngineError> {
        ctx.check()?;
        self.load(id).await
    }

    pub async fn list_encounters(
        &self,
        ctx: &CallContext,
        session_id: &str,
    ) -> Result<Vec<Encounter>, EngineError> {
        ctx.check()?;
        Ok(self.repo.list_for_session(session_id).await?)
    }

    /// Spawn a monster from a template. Repeated names get a numeric suffix.
    pub async fn add_monster(
        &self,
        ctx: &CallContext,
        id: &str,
        template: &MonsterTemplate,
    ) -> Result<Combatant, EngineError> {
        if template.name.trim().is_empty() {
            return Err(EngineError::Validation("monster name must not be empty".into()));
        }
        if template.max_hp <= 0 {
            return Err(EngineError::Validation(format!(
                "{} must have positive max HP",
                template.name
            )));
        }
        let now = self.clock.now();
        self.mutate(ctx, id, |e| {
            Self::require_roster_open(e)?;
            let name = e.unique_name(template.name.trim());
            let combatant = Combatant::from_template(
                uuid::Uuid::new_v4().to_string(),
                name,
                template,
                e.next_join_order(),
            );
            e.push_log(
                now,
                format!(
                    "{} joins the encounter (AC {}, HP {})",
                    combatant.name(),
                    combatant.armor_class(),
                    combatant.max_hp()
                ),
            );
            e.add_combatant(combatant.clone());
            Ok(combatant)
        })
        .await
    }

    /// Add a player's character. A character joins an encounter once.
    pub async fn add_player(
        &self,
        ctx: &CallContext,
        id: &str,
        character_id: &str,
        player_id: Option<&str>,
    ) -> Result<Combatant, EngineError> {
        ctx.check()?;
        let sheet = self
            .characters
            .character(character_id)
            .await?
            .ok_or_else(|| EngineError::not_found("character", character_id))?;

        let now = self.clock.now();
        self.mutate(ctx, id, |e| {
            Self::require_roster_open(e)?;
            if e
                .combatants()
                .iter()
                .any(|c| c.character_id() == Some(character_id))
            {
                return Err(EngineError::InvalidState(format!(
                    "{} is already in this encounter",
                    sheet.name
                )));
            }
            let combatant = Combatant::from_character(
                uuid::Uuid::new_v4().to_string(),
                &sheet,
                player_id.map(str::to_string),
                e.next_join_order(),
            );
            e.push_log(
                now,
                format!(
                    "{} joins the encounter (AC {}, HP {}/{})",
                    combatant.name(),
                    combatant.armor_class(),
                    combatant.current_hp(),
                    combatant.max_hp()
                ),
            );
            e.add_combatant(combatant.clone());
            Ok(combatant)
        })
        .await
    }

    /// Take a combatant out of play. It keeps its place in the record.
    pub async fn remove_combatant(
        &self,
        ctx: &CallContext,
        id: &str,
        combatant_id: &str,
    ) -> Result<(bool, bool), EngineError> {
        let now = self.clock.now();
        self.mutate(ctx, id, |e| {
            e.require_not_completed()?;
            let combatant = e.combatant_mut(combatant_id)?;
            combatant.deactivate();
            let name = combatant.name().to_string();
            e.push_log(now, format!("{} leaves the fight", name));
            Ok(self.settle(e))
        })
        .await
    }

    /// Roll 1d20 + bonus for everyone and fix the turn order
    pub async fn roll_initiative(&self, ctx: &CallContext, id: &str) -> Result<Encounter, EngineError> {
        let now = self.clock.now();
        self.transition(ctx, id, |e, _| {
            e.require_status(EncounterStatus::Setup)?;
            if e.initiative_rolled() {
                return Err(EngineError::InvalidState("initiative was already rolled".into()));
            }
            if e.combatants().is_empty() {
                return Err(EngineError::InvalidState("no combatants to roll for".into()));
            }

            let roster: Vec<(String, i32)> = e
                .combatants()
                .iter()
                .map(|c| (c.id().to_string(), c.initiative_bonus()))
                .collect();
            for (cid, bonus) in roster {
                let roll = self.resolver.roll_initiative(bonus)?;
                let combatant = e.combatant_mut(&cid)?;
                combatant.set_initiative(roll.total);
                let line = format!(
                    "{} rolls initiative: {} (d20 {} {:+})",
                    combatant.name(),
                    roll.total,
                    roll.natural(),
                    bonus
                );
                e.push_log(now, line);
            }

            e.fix_turn_order();
            let order: Vec<String> = e
                .turn_order()
                .iter()
                .filter_map(|cid| e.combatant(cid).map(|c| c.name().to_string()))
                .collect();
            e.push_log(now, format!("Turn order: {}", order.join(", ")));
            Ok(())
        })
        .await
    }

    pub async fn start_encounter(&self, ctx: &CallContext, id: &str) -> Result<Encounter, EngineError> {
        let now = self.clock.now();
        let encounter = self
            .transition(ctx, id, |e, _| {
                e.begin()?;
                e.push_log(now, "Combat begins! Round 1");
                self.announce_turn(e);
                Ok(())
            })
            .await?;
        info!("Encounter {} started by {}", id, ctx.actor_id);
        Ok(encounter)
    }

    pub async fn get_current_combatant(
        &self,
        ctx: &CallContext,
        id: &str,
    ) -> Result<Option<Combatant>, EngineError> {
        let encounter = self.get_encounter(ctx, id).await?;
        Ok(encounter.current_combatant().cloned())
    }

    /// Move to the next eligible combatant
    pub async fn next_turn(&self, ctx: &CallContext, id: &str) -> Result<Encounter, EngineError> {
        let checkpoint = self.mode == TurnMode::Checkpoint;
        let now = self.clock.now();
        self.transition(ctx, id, |e, changes| {
            match e.advance(checkpoint)? {
                Advance::Turn => self.announce_turn(e),
                Advance::Pending => {
                    e.push_log(now, format!("Round {} complete", e.round()));
                }
                Advance::Wrapped => {
                    self.end_round_effects(e, changes);
                    e.push_log(now, format!("Round {} begins", e.round()));
                    self.announce_turn(e);
                }
            }
            Ok(())
        })
        .await
    }

    /// Start the next round after a checkpoint
    pub async fn continue_round(&self, ctx: &CallContext, id: &str) -> Result<Encounter, EngineError> {
        let now = self.clock.now();
        self.transition(ctx, id, |e, changes| {
            e.wrap_round()?;
            self.end_round_effects(e, changes);
            e.push_log(now, format!("Round {} begins", e.round()));
            self.announce_turn(e);
            Ok(())
        })
        .await
    }

    /// DM abort: complete the encounter without a winner
    pub async fn end_encounter(&self, ctx: &CallContext, id: &str) -> Result<Encounter, EngineError> {
        let now = self.clock.now();
        let actor = ctx.actor_id.clone();
        let encounter = self
            .transition(ctx, id, |e, _| {
                e.require_not_completed()?;
                e.complete(Outcome::Ended);
                e.push_log(now, format!("Encounter ended by {}", actor));
                Ok(())
            })
            .await?;
        info!("Encounter {} ended by {}", id, ctx.actor_id);
        Ok(encounter)
    }

    // ---- hit points ----

    pub async fn apply_damage(
        &self,
        ctx: &CallContext,
        id: &str,
        target_id: &str,
        amount: i32,
    ) -> Result<DamageOutcome, EngineError> {
        if amount < 0 {
            return Err(EngineError::Validation(format!(
                "damage must not be negative, got {}",
                amount
            )));
        }
        self.mutate(ctx, id, |e| {
            e.require_not_completed()?;
            let hp = self.hurt(e, target_id, amount)?;
            let combat_end = self.settle(e);
            Ok(DamageOutcome { hp, combat_end })
        })
        .await
    }

    pub async fn heal_combatant(
        &self,
        ctx: &CallContext,
        id: &str,
        target_id: &str,
        amount: i32,
    ) -> Result<HpChange, EngineError> {
        if amount < 0 {
            return Err(EngineError::Validation(format!(
                "healing must not be negative, got {}",
                amount
            )));
        }
        let now = self.clock.now();
        self.mutate(ctx, id, |e| {
            e.require_not_completed()?;
            let target = e.combatant_mut(target_id)?;
            let previous = target.current_hp();
            let healed = target.heal(amount);
            let change = HpChange {
                combatant_id: target_id.to_string(),
                previous,
                current: target.current_hp(),
                max: target.max_hp(),
            };
            let line = format!(
                "{} heals {} HP ({}/{} HP)",
                target.name(),
                healed,
                change.current,
                change.max
            );
            e.push_log(now, line);
            Ok(change)
        })
        .await
    }

    /// `(should_end, players_won)`; completes an active encounter that
    /// should end
    pub async fn check_combat_end(&self, ctx: &CallContext, id: &str) -> Result<(bool, bool), EngineError> {
        self.mutate(ctx, id, |e| Ok(self.settle(e))).await
    }

    pub async fn log_combat_action(
        &self,
        ctx: &CallContext,
        id: &str,
        text: &str,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        self.mutate(ctx, id, |e| {
            e.push_log(now, text);
            Ok(())
        })
        .await
    }

    // ---- actions ----

    async fn player_attack(
        &self,
        attacker: &Combatant,
        action: Option<&str>,
    ) -> Result<AttackSpec, EngineError> {
        let character_id = attacker.character_id().ok_or_else(|| {
            EngineError::InvalidState(format!("{} has no character record", attacker.name()))
        })?;
        let sheet = self
            .characters
            .character(character_id)
            .await?
            .ok_or_else(|| EngineError::not_found("character", character_id))?;

        let mut attacks = sheet.attacks().into_iter();
        match action {
            Some(name) => attacks
                .find(|a| a.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| EngineError::not_found("attack", name)),
            None => attacks
                .next()
                .ok_or_else(|| EngineError::not_found("attack", sheet.name.as_str())),
        }
    }

    /// The current combatant attacks `target_id` with its action
    pub async fn attack(
        &self,
        ctx: &CallContext,
        id: &str,
        attacker_id: &str,
        target_id: &str,
        action: Option<&str>,
    ) -> Result<AttackOutcome, EngineError> {
        let (_guard, mut e) = self.open(ctx, id).await?;
        e.require_status(EncounterStatus::Active)?;
        if e.round_pending() {
            return Err(EngineError::InvalidState(
                "the round is complete; continue the round first".into(),
            ));
        }
        if attacker_id == target_id {
            return Err(EngineError::Validation("a combatant cannot attack itself".into()));
        }

        let attacker = e.require(attacker_id)?.clone();
        let target = e.require(target_id)?.clone();
        if e.current_combatant().map(|c| c.id()) != Some(attacker_id) {
            return Err(EngineError::InvalidState(format!(
                "it is not {}'s turn",
                attacker.name()
            )));
        }
        if !attacker.is_standing() {
            return Err(EngineError::InvalidState(format!(
                "{} cannot act",
                attacker.name()
            )));
        }
        if attacker.turn_flags().action {
            return Err(EngineError::InvalidState(format!(
                "{} already used their action this turn",
                attacker.name()
            )));
        }
        if !target.is_standing() {
            return Err(EngineError::InvalidState(format!(
                "{} is already down",
                target.name()
            )));
        }

        let spec = if attacker.is_monster() {
            if !attacker.can_act() {
                return Err(EngineError::InvalidState(format!(
                    "{} has no actions",
                    attacker.name()
                )));
            }
            attacker
                .action(action)
                .cloned()
                .ok_or_else(|| EngineError::not_found("action", action.unwrap_or_default()))?
        } else {
            self.player_attack(&attacker, action).await?
        };

        let attacker_fx = self.effects.get(attacker_id);
        let target_fx = self.effects.get(target_id);
        let result = self.resolver.resolve_attack(
            &spec,
            attacker_fx.as_deref(),
            DefenderView {
                armor_class: target.armor_class(),
                creature_type: target.creature_type(),
                profile: target.damage_profile(),
                effects: target_fx.as_deref(),
            },
        )?;

        e.combatant_mut(attacker_id)?.use_slot(ActionSlot::Action)?;
        e.push_log(
            self.clock.now(),
            format!("{} attacks {}: {}", attacker.name(), target.name(), result.describe()),
        );
        let hp = if result.hit {
            Some(self.hurt(&mut e, target_id, result.total_damage())?)
        } else {
            None
        };
        let combat_end = self.settle(&mut e);
        self.commit(&mut e).await?;

        debug!(
            "{} attacked {} in {}: hit={} damage={}",
            attacker.name(),
            target.name(),
            id,
            result.hit,
            result.total_damage()
        );
        Ok(AttackOutcome {
            result,
            hp,
            combat_end,
        })
    }

    /// Roll a save using the combatant's own bonus plus `bonus`
    pub async fn saving_throw(
        &self,
        ctx: &CallContext,
        id: &str,
        combatant_id: &str,
        ability: Ability,
        dc: i32,
        bonus: i32,
    ) -> Result<SaveResult, EngineError> {
        let now = self.clock.now();
        self.mutate(ctx, id, |e| {
            e.require_not_completed()?;
            let save = self.roll_save(e, combatant_id, ability, dc, bonus)?;
            let name = e.require(combatant_id)?.name().to_string();
            e.push_log(
                now,
                format!(
                    "{} makes a {} save: {} vs DC {} ({})",
                    name,
                    ability,
                    save.total,
                    dc,
                    if save.success { "success" } else { "failure" }
                ),
            );
            Ok(save)
        })
        .await
    }

    fn roll_save(
        &self,
        e: &Encounter,
        combatant_id: &str,
        ability: Ability,
        dc: i32,
        bonus: i32,
    ) -> Result<SaveResult, EngineError> {
        let combatant = e.require(combatant_id)?;
        let effects = self.effects.get(combatant_id);
        Ok(self.resolver.resolve_saving_throw(
            ability,
            dc,
            combatant.save_bonus(ability) + bonus,
            effects.as_deref(),
            &ConditionSet::new(),
        )?)
    }

    /// Constitution save against DC max(10, damage / 2); failure drops
    /// every concentration effect on the combatant
    pub async fn concentration_check(
        &self,
        ctx: &CallContext,
        id: &str,
        combatant_id: &str,
        damage: i32,
    ) -> Result<ConcentrationOutcome, EngineError> {
        if damage < 0 {
            return Err(EngineError::Validation(format!(
                "damage must not be negative, got {}",
                damage
            )));
        }
        let dc = (damage / 2).max(10);
        let now = self.clock.now();
        let (outcome, _) = self.staged(ctx, id, |e, changes| {
            e.require_not_completed()?;
            let save = self.roll_save(e, combatant_id, Ability::Constitution, dc, 0)?;
            let name = e.require(combatant_id)?.name().to_string();

            let dropped = if save.success {
                e.push_log(
                    now,
                    format!("{} keeps concentration ({} vs DC {})", name, save.total, dc),
                );
                Vec::new()
            } else {
                let dropped = self
                    .effects
                    .get(combatant_id)
                    .map(|m| m.concentration_effects())
                    .unwrap_or_default();
                changes.push(EffectChange::ClearConcentration(combatant_id.to_string()));
                let names: Vec<&str> = dropped.iter().map(|fx| fx.name.as_str()).collect();
                let line = if names.is_empty() {
                    format!("{} fails a concentration check ({} vs DC {})", name, save.total, dc)
                } else {
                    format!(
                        "{} loses concentration on {} ({} vs DC {})",
                        name,
                        names.join(", "),
                        save.total,
                        dc
                    )
                };
                e.push_log(now, line);
                dropped
            };
            Ok(ConcentrationOutcome { save, dropped })
        })
        .await?;
        Ok(outcome)
    }

    /// Spend a per-turn slot during the combatant's own encounter
    pub async fn use_slot(
        &self,
        ctx: &CallContext,
        id: &str,
        combatant_id: &str,
        slot: &str,
    ) -> Result<TurnFlags, EngineError> {
        let slot: ActionSlot = slot.parse()?;
        self.mutate(ctx, id, |e| {
            e.require_status(EncounterStatus::Active)?;
            let combatant = e.combatant_mut(combatant_id)?;
            combatant.use_slot(slot)?;
            debug!("{} used their {}", combatant.name(), slot);
            Ok(combatant.turn_flags())
        })
        .await
    }

    // ---- status effects ----

    pub async fn apply_effect(
        &self,
        ctx: &CallContext,
        id: &str,
        combatant_id: &str,
        effect: StatusEffect,
    ) -> Result<AddOutcome, EngineError> {
        let now = self.clock.now();
        let (outcome, _) = self.staged(ctx, id, |e, changes| {
            e.require_not_completed()?;
            let name = e.require(combatant_id)?.name().to_string();
            let effect_name = effect.name.clone();
            let outcome = self.effects.manager(combatant_id).preview_add(&effect)?;
            let line = match &outcome {
                AddOutcome::Rejected { .. } => {
                    format!("{} already has a stronger {}", name, effect_name)
                }
                AddOutcome::Inserted | AddOutcome::Replaced { .. } => {
                    format!("{} gains {}", name, effect_name)
                }
            };
            e.push_log(now, line);
            if !matches!(outcome, AddOutcome::Rejected { .. }) {
                changes.push(EffectChange::Add {
                    combatant_id: combatant_id.to_string(),
                    effect,
                });
            }
            Ok(outcome)
        })
        .await?;
        Ok(outcome)
    }

    pub async fn remove_effect(
        &self,
        ctx: &CallContext,
        id: &str,
        combatant_id: &str,
        effect_id: &str,
    ) -> Result<bool, EngineError> {
        let now = self.clock.now();
        let (removed, _) = self.staged(ctx, id, |e, changes| {
            let name = e.require(combatant_id)?.name().to_string();
            let effect_name = self
                .effects
                .get(combatant_id)
                .and_then(|m| m.get_active_effects().into_iter().find(|fx| fx.id == effect_id))
                .map(|fx| fx.name);
            let Some(effect_name) = effect_name else {
                return Ok(false);
            };
            e.push_log(now, format!("{} is no longer affected by {}", name, effect_name));
            changes.push(EffectChange::Remove {
                combatant_id: combatant_id.to_string(),
                effect_id: effect_id.to_string(),
            });
            Ok(true)
        })
        .await?;
        Ok(removed)
    }

    pub async fn active_effects(
        &self,
        ctx: &CallContext,
        id: &str,
        combatant_id: &str,
    ) -> Result<Vec<StatusEffect>, EngineError> {
        let encounter = self.get_encounter(ctx, id).await?;
        encounter.require(combatant_id)?;
        Ok(self
            .effects
            .get(combatant_id)
            .map(|m| m.get_active_effects())
            .unwrap_or_default())
    }
}
