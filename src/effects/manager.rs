//! Per-actor effect sets
//!
//! Every actor gets one [`EffectManager`]. Reads take the shared lock and
//! filter out anything past its expiry; mutations take the exclusive lock and
//! evict expired effects before doing their own work. Nothing blocks under
//! either lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::condition::ConditionSet;
use super::model::{DurationKind, EffectSource, Modifier, ModifierTarget, StackingRule, StatusEffect};
use super::EffectError;
use crate::clock::Clock;

/// What `add_effect` did with the incoming effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    /// Inserted after removing these effect IDs
    Replaced { previous: Vec<String> },
    /// Not inserted; the existing effect with this ID won
    Rejected { kept: String },
}

impl AddOutcome {
    fn from_evicted(previous: Vec<String>) -> Self {
        if previous.is_empty() {
            AddOutcome::Inserted
        } else {
            AddOutcome::Replaced { previous }
        }
    }
}

/// How an incoming effect stacks against live effects of the same kind
enum Stacking {
    /// Insert after removing these IDs
    Evict(Vec<String>),
    /// Keep this existing effect and drop the incoming one
    Reject(String),
}

#[derive(Debug)]
struct Slot {
    seq: u64,
    effect: StatusEffect,
}

#[derive(Debug, Default)]
struct EffectSet {
    effects: HashMap<String, Slot>,
    next_seq: u64,
}

impl EffectSet {
    fn evict_expired(&mut self, now: DateTime<Utc>) -> Vec<StatusEffect> {
        self.remove_where(|e| e.is_expired_at(now))
    }

    fn remove_where(&mut self, pred: impl Fn(&StatusEffect) -> bool) -> Vec<StatusEffect> {
        let ids: Vec<String> = self
            .effects
            .iter()
            .filter(|(_, slot)| pred(&slot.effect))
            .map(|(id, _)| id.clone())
            .collect();
        let mut removed: Vec<Slot> = ids
            .iter()
            .filter_map(|id| self.effects.remove(id))
            .collect();
        removed.sort_by_key(|s| s.seq);
        removed.into_iter().map(|s| s.effect).collect()
    }

    fn insert(&mut self, effect: StatusEffect) -> Option<StatusEffect> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.effects
            .insert(effect.id.clone(), Slot { seq, effect })
            .map(|old| old.effect)
    }

    fn stacking(&self, effect: &StatusEffect, now: DateTime<Utc>) -> Stacking {
        let rivals: Vec<(String, Option<f64>)> = self
            .live(now)
            .into_iter()
            .filter(|e| e.same_kind(effect) && e.id != effect.id)
            .map(|e| (e.id.clone(), e.magnitude()))
            .collect();

        match effect.stacking {
            StackingRule::Stack => Stacking::Evict(Vec::new()),
            StackingRule::Replace => Stacking::Evict(rivals.into_iter().map(|(id, _)| id).collect()),
            rule @ (StackingRule::TakeHighest | StackingRule::TakeLowest) => {
                let strongest = rivals
                    .iter()
                    .cloned()
                    .reduce(|best, r| if outranks(rule, r.1, best.1) { r } else { best });
                match strongest {
                    // Without numbers to compare the existing effect stays
                    Some((kept, kept_mag)) if !outranks(rule, effect.magnitude(), kept_mag) => {
                        Stacking::Reject(kept)
                    }
                    _ => Stacking::Evict(rivals.into_iter().map(|(id, _)| id).collect()),
                }
            }
        }
    }

    /// Live effects in insertion order
    fn live(&self, now: DateTime<Utc>) -> Vec<&StatusEffect> {
        let mut slots: Vec<&Slot> = self
            .effects
            .values()
            .filter(|s| s.effect.is_live_at(now))
            .collect();
        slots.sort_by_key(|s| s.seq);
        slots.into_iter().map(|s| &s.effect).collect()
    }
}

/// Active effects for one actor
pub struct EffectManager {
    actor_id: String,
    set: RwLock<EffectSet>,
    clock: Arc<dyn Clock>,
    round_length: chrono::Duration,
}

impl std::fmt::Debug for EffectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectManager")
            .field("actor_id", &self.actor_id)
            .field("effects", &self.set.read().effects.len())
            .finish()
    }
}

impl EffectManager {
    /// Create an empty manager. `round_length` converts round durations into
    /// wall-clock expiry.
    pub fn new(
        actor_id: impl Into<String>,
        clock: Arc<dyn Clock>,
        round_length: chrono::Duration,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            set: RwLock::new(EffectSet::default()),
            clock,
            round_length,
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Add an effect, applying the incoming effect's stacking rule against
    /// live effects with the same name and source.
    pub fn add_effect(&self, mut effect: StatusEffect) -> Result<AddOutcome, EffectError> {
        if effect.id.trim().is_empty() {
            return Err(EffectError::EmptyId);
        }

        let now = self.clock.now();
        effect.created_at = Some(now);
        effect.expires_at = effect.duration.expires_at(now, self.round_length);
        effect.active = true;

        let mut set = self.set.write();
        set.evict_expired(now);

        let mut previous = match set.stacking(&effect, now) {
            Stacking::Evict(ids) => ids,
            Stacking::Reject(kept) => {
                debug!(
                    "Rejected effect {} on {}: existing {} kept",
                    effect.name, self.actor_id, kept
                );
                return Ok(AddOutcome::Rejected { kept });
            }
        };

        for id in &previous {
            set.effects.remove(id);
        }
        if let Some(old) = set.insert(effect.clone()) {
            previous.push(old.id);
        }

        debug!(
            "Added effect {} ({}) to {} expiring {:?}",
            effect.name, effect.id, self.actor_id, effect.expires_at
        );

        Ok(AddOutcome::from_evicted(previous))
    }

    /// What `add_effect` would do with `effect` right now, without adding it
    pub fn preview_add(&self, effect: &StatusEffect) -> Result<AddOutcome, EffectError> {
        if effect.id.trim().is_empty() {
            return Err(EffectError::EmptyId);
        }
        let now = self.clock.now();
        let set = self.set.read();
        match set.stacking(effect, now) {
            Stacking::Reject(kept) => Ok(AddOutcome::Rejected { kept }),
            Stacking::Evict(mut previous) => {
                let same_id = set
                    .effects
                    .get(&effect.id)
                    .is_some_and(|slot| !slot.effect.is_expired_at(now));
                if same_id {
                    previous.push(effect.id.clone());
                }
                Ok(AddOutcome::from_evicted(previous))
            }
        }
    }

    /// Remove an effect by ID. Removing a missing ID is not an error.
    pub fn remove_effect(&self, id: &str) -> bool {
        let mut set = self.set.write();
        set.evict_expired(self.clock.now());
        set.effects.remove(id).is_some()
    }

    /// Remove every effect from one source, returning how many went
    pub fn remove_effects_by_source(&self, source: EffectSource, source_id: &str) -> usize {
        let mut set = self.set.write();
        set.evict_expired(self.clock.now());
        set.remove_where(|e| e.source == source && e.source_id == source_id)
            .len()
    }

    /// Active, unexpired effects in the order they were added
    pub fn get_active_effects(&self) -> Vec<StatusEffect> {
        let now = self.clock.now();
        let set = self.set.read();
        set.live(now).into_iter().cloned().collect()
    }

    /// Modifiers for `target` from every live effect whose gate passes under
    /// `conditions` and whose own condition (if any) is satisfied
    pub fn get_modifiers(&self, target: ModifierTarget, conditions: &ConditionSet) -> Vec<Modifier> {
        let now = self.clock.now();
        let set = self.set.read();
        set.live(now)
            .into_iter()
            .filter(|e| e.gate_passes(conditions))
            .flat_map(|e| e.modifiers.iter())
            .filter(|m| m.target == target && m.applies(conditions))
            .cloned()
            .collect()
    }

    /// Sweep round-based effects whose time is up
    pub fn process_round_end(&self) -> Vec<StatusEffect> {
        let now = self.clock.now();
        let mut set = self.set.write();
        let removed = set.remove_where(|e| e.is_round_based() && e.is_expired_at(now));
        set.evict_expired(now);
        if !removed.is_empty() {
            debug!("{} round effects expired on {}", removed.len(), self.actor_id);
        }
        removed
    }

    /// Round-based effects `process_round_end` would sweep right now
    pub fn expired_round_effects(&self) -> Vec<StatusEffect> {
        let now = self.clock.now();
        let set = self.set.read();
        let mut slots: Vec<&Slot> = set
            .effects
            .values()
            .filter(|s| s.effect.is_round_based() && s.effect.is_expired_at(now))
            .collect();
        slots.sort_by_key(|s| s.seq);
        slots.into_iter().map(|s| s.effect.clone()).collect()
    }

    /// Live concentration effects, which `clear_concentration` would drop
    pub fn concentration_effects(&self) -> Vec<StatusEffect> {
        let now = self.clock.now();
        self.set
            .read()
            .live(now)
            .into_iter()
            .filter(|e| e.duration.concentration)
            .cloned()
            .collect()
    }

    /// Drop every concentration effect
    pub fn clear_concentration(&self) -> Vec<StatusEffect> {
        let now = self.clock.now();
        let mut set = self.set.write();
        set.evict_expired(now);
        set.remove_where(|e| e.duration.concentration)
    }

    /// Drop every until-rest effect
    pub fn end_rest(&self) -> Vec<StatusEffect> {
        let now = self.clock.now();
        let mut set = self.set.write();
        set.evict_expired(now);
        set.remove_where(|e| e.duration.kind == DurationKind::UntilRest)
    }

    pub fn get_effect_by_source_and_name(
        &self,
        source: EffectSource,
        name: &str,
    ) -> Option<StatusEffect> {
        let now = self.clock.now();
        let set = self.set.read();
        set.live(now)
            .into_iter()
            .find(|e| e.source == source && e.name == name)
            .cloned()
    }

    pub fn has_concentration(&self) -> bool {
        let now = self.clock.now();
        self.set
            .read()
            .live(now)
            .iter()
            .any(|e| e.duration.concentration)
    }
}

/// Strict comparison of magnitudes under a take-highest/lowest rule
fn outranks(rule: StackingRule, candidate: Option<f64>, current: Option<f64>) -> bool {
    match (candidate, current, rule) {
        (Some(c), Some(k), StackingRule::TakeHighest) => c > k,
        (Some(c), Some(k), StackingRule::TakeLowest) => c < k,
        _ => false,
    }
}

/// Effect managers for every actor, created on first use
pub struct EffectRegistry {
    managers: RwLock<HashMap<String, Arc<EffectManager>>>,
    clock: Arc<dyn Clock>,
    round_length: chrono::Duration,
}

impl EffectRegistry {
    pub fn new(clock: Arc<dyn Clock>, round_length: chrono::Duration) -> Self {
        Self {
            managers: RwLock::new(HashMap::new()),
            clock,
            round_length,
        }
    }

    /// Create a shared instance
    pub fn shared(clock: Arc<dyn Clock>, round_length: chrono::Duration) -> Arc<Self> {
        Arc::new(Self::new(clock, round_length))
    }

    /// Manager for an actor, creating an empty one if needed
    pub fn manager(&self, actor_id: &str) -> Arc<EffectManager> {
        if let Some(m) = self.managers.read().get(actor_id) {
            return m.clone();
        }
        self.managers
            .write()
            .entry(actor_id.to_string())
            .or_insert_with(|| {
                Arc::new(EffectManager::new(
                    actor_id,
                    self.clock.clone(),
                    self.round_length,
                ))
            })
            .clone()
    }

    pub fn get(&self, actor_id: &str) -> Option<Arc<EffectManager>> {
        self.managers.read().get(actor_id).cloned()
    }

    pub fn remove(&self, actor_id: &str) -> Option<Arc<EffectManager>> {
        self.managers.write().remove(actor_id)
    }
}
