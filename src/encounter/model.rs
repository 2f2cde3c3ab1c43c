//! Encounter state and the pure parts of the turn state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::combatant::{Combatant, CombatantKind};
use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    Setup,
    Active,
    Completed,
}

impl EncounterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncounterStatus::Setup => "setup",
            EncounterStatus::Active => "active",
            EncounterStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for EncounterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a completed encounter ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    PlayersWon,
    MonstersWon,
    /// Ended by hand before either side fell
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    Unexplored,
    Exploring,
    Combat,
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Deadly,
}

/// Dungeon room an encounter takes place in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DungeonRoom {
    pub room_number: u32,
    pub room_state: RoomState,
    pub difficulty: Difficulty,
}

/// Where an encounter lives on the chat side. Stored and returned as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterContext {
    pub session_id: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub dungeon: Option<DungeonRoom>,
}

impl EncounterContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub round: u32,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[Round {}] {}", self.round, self.text)
    }
}

/// Result of moving the turn pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    /// Another combatant in the same round is up
    Turn,
    /// Round finished; waiting for an explicit continue
    Pending,
    /// A new round started
    Wrapped,
}

/// One complete combat instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encounter {
    id: String,
    name: String,
    description: String,
    context: EncounterContext,
    status: EncounterStatus,
    combatants: Vec<Combatant>,
    turn_order: Vec<String>,
    round: u32,
    turn: usize,
    round_pending: bool,
    initiative_rolled: bool,
    outcome: Option<Outcome>,
    log: Vec<LogEntry>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Encounter {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        context: EncounterContext,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            context,
            status: EncounterStatus::Setup,
            combatants: Vec::new(),
            turn_order: Vec::new(),
            round: 1,
            turn: 0,
            round_pending: false,
            initiative_rolled: false,
            outcome: None,
            log: Vec::new(),
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn context(&self) -> &EncounterContext {
        &self.context
    }

    pub fn session_id(&self) -> &str {
        &self.context.session_id
    }

    pub fn status(&self) -> EncounterStatus {
        self.status
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Combatants in join order
    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    pub fn combatant(&self, id: &str) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id() == id)
    }

    pub fn turn_order(&self) -> &[String] {
        &self.turn_order
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn turn(&self) -> usize {
        self.turn
    }

    pub fn round_pending(&self) -> bool {
        self.round_pending
    }

    pub fn initiative_rolled(&self) -> bool {
        self.initiative_rolled
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Combatant at `turn_order[turn]`, or `None` before initiative
    pub fn current_combatant(&self) -> Option<&Combatant> {
        self.turn_order
            .get(self.turn)
            .and_then(|id| self.combatant(id))
    }

    /// `(should_end, players_won)` for the current hit points.
    ///
    /// A side is defeated when it has members and none of them is standing.
    /// Only a defeated side facing a standing one ends the fight.
    pub fn combat_outcome(&self) -> (bool, bool) {
        let side = |kind: CombatantKind| {
            let members: Vec<&Combatant> =
                self.combatants.iter().filter(|c| c.kind() == kind).collect();
            let standing = members.iter().any(|c| c.is_standing());
            (!members.is_empty() && !standing, standing)
        };
        let (players_down, players_up) = side(CombatantKind::Player);
        let (monsters_down, monsters_up) = side(CombatantKind::Monster);

        if monsters_down && players_up {
            (true, true)
        } else if players_down && monsters_up {
            (true, false)
        } else {
            (false, false)
        }
    }

    pub(crate) fn combatant_mut(&mut self, id: &str) -> Result<&mut Combatant, EngineError> {
        self.combatants
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| EngineError::not_found("combatant", id))
    }

    pub(crate) fn require(&self, id: &str) -> Result<&Combatant, EngineError> {
        self.combatant(id)
            .ok_or_else(|| EngineError::not_found("combatant", id))
    }

    pub(crate) fn require_status(&self, expected: EncounterStatus) -> Result<(), EngineError> {
        if self.status != expected {
            return Err(EngineError::InvalidState(format!(
                "encounter {} is {}, expected {}",
                self.id, self.status, expected
            )));
        }
        Ok(())
    }

    pub(crate) fn require_not_completed(&self) -> Result<(), EngineError> {
        if self.status == EncounterStatus::Completed {
            return Err(EngineError::InvalidState(format!(
                "encounter {} is already completed",
                self.id
            )));
        }
        Ok(())
    }

    pub(crate) fn add_combatant(&mut self, combatant: Combatant) {
        self.combatants.push(combatant);
    }

    pub(crate) fn next_join_order(&self) -> u32 {
        self.combatants.len() as u32
    }

    /// `base`, or `base N` with the smallest N >= 2 not yet taken
    pub(crate) fn unique_name(&self, base: &str) -> String {
        let taken = |name: &str| self.combatants.iter().any(|c| c.name() == name);
        if !taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{} {}", base, n))
            .find(|name| !taken(name))
            .unwrap_or_else(|| base.to_string())
    }

    /// Fix the turn order from the combatants' initiative values.
    ///
    /// Ties fall to the higher bonus, then to whoever joined first.
    pub(crate) fn fix_turn_order(&mut self) {
        let mut order: Vec<&Combatant> = self.combatants.iter().collect();
        order.sort_by(|a, b| {
            b.initiative()
                .unwrap_or(i32::MIN)
                .cmp(&a.initiative().unwrap_or(i32::MIN))
                .then(b.initiative_bonus().cmp(&a.initiative_bonus()))
                .then(a.join_order().cmp(&b.join_order()))
        });
        self.turn_order = order.into_iter().map(|c| c.id().to_string()).collect();
        self.initiative_rolled = true;
    }

    fn eligible_at(&self, index: usize) -> bool {
        self.turn_order
            .get(index)
            .and_then(|id| self.combatant(id))
            .is_some_and(|c| c.is_standing())
    }

    pub(crate) fn any_eligible(&self) -> bool {
        (0..self.turn_order.len()).any(|i| self.eligible_at(i))
    }

    /// Move to the first eligible slot at or after `from` in this round
    fn seek_from(&mut self, from: usize) -> bool {
        match (from..self.turn_order.len()).find(|&i| self.eligible_at(i)) {
            Some(i) => {
                self.turn = i;
                if let Some(id) = self.turn_order.get(i).cloned() {
                    if let Ok(c) = self.combatant_mut(&id) {
                        c.start_new_turn();
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Begin round 1 with the first eligible combatant
    pub(crate) fn begin(&mut self) -> Result<(), EngineError> {
        self.require_status(EncounterStatus::Setup)?;
        if self.turn_order.is_empty() {
            return Err(EngineError::InvalidState(
                "roll initiative before starting the encounter".into(),
            ));
        }
        self.round = 1;
        self.round_pending = false;
        if !self.seek_from(0) {
            return Err(EngineError::InvalidState(
                "no combatant is able to take a turn".into(),
            ));
        }
        self.status = EncounterStatus::Active;
        Ok(())
    }

    /// Advance the turn pointer. At the end of a round either wait for
    /// [`Encounter::wrap_round`] (`checkpoint`) or wrap right away.
    pub(crate) fn advance(&mut self, checkpoint: bool) -> Result<Advance, EngineError> {
        self.require_status(EncounterStatus::Active)?;
        if self.round_pending {
            return Err(EngineError::InvalidState(format!(
                "round {} is complete; continue the round first",
                self.round
            )));
        }
        if !self.any_eligible() {
            return Err(EngineError::InvalidState(
                "no combatant is able to take a turn".into(),
            ));
        }
        if self.seek_from(self.turn + 1) {
            return Ok(Advance::Turn);
        }
        if checkpoint {
            self.round_pending = true;
            return Ok(Advance::Pending);
        }
        self.wrap()?;
        Ok(Advance::Wrapped)
    }

    /// Perform a deferred round wrap
    pub(crate) fn wrap_round(&mut self) -> Result<(), EngineError> {
        self.require_status(EncounterStatus::Active)?;
        if !self.round_pending {
            return Err(EngineError::InvalidState(format!(
                "round {} is still in progress",
                self.round
            )));
        }
        self.wrap()
    }

    fn wrap(&mut self) -> Result<(), EngineError> {
        if !self.any_eligible() {
            return Err(EngineError::InvalidState(
                "no combatant is able to take a turn".into(),
            ));
        }
        self.round += 1;
        self.turn = 0;
        self.round_pending = false;
        self.seek_from(0);
        Ok(())
    }

    pub(crate) fn complete(&mut self, outcome: Outcome) {
        self.status = EncounterStatus::Completed;
        self.round_pending = false;
        self.outcome = Some(outcome);
    }

    pub(crate) fn push_log(&mut self, now: DateTime<Utc>, text: impl Into<String>) {
        self.log.push(LogEntry {
            round: self.round,
            timestamp: now,
            text: text.into(),
        });
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encounter::combatant::MonsterTemplate;

    fn template(name: &str, hp: i32) -> MonsterTemplate {
        MonsterTemplate {
            name: name.into(),
            creature_type: None,
            armor_class: 12,
            max_hp: hp,
            initiative_bonus: 0,
            speed: 30,
            actions: vec![],
            resistances: vec![],
            immunities: vec![],
            vulnerabilities: vec![],
            saves: Default::default(),
        }
    }

    fn encounter_with(monsters: &[(&str, i32, i32)]) -> Encounter {
        let mut e = Encounter::new(
            "enc-1",
            "Test",
            "",
            EncounterContext::new("session"),
            "dm",
            Utc::now(),
        );
        for (name, hp, init) in monsters {
            let mut c = Combatant::from_template(
                format!("id-{}", name),
                name.to_string(),
                &template(name, *hp),
                e.next_join_order(),
            );
            c.set_initiative(*init);
            e.add_combatant(c);
        }
        e.fix_turn_order();
        e
    }

    #[test]
    fn test_unique_names() {
        let mut e = encounter_with(&[]);
        for n in 0..3 {
            let name = e.unique_name("Goblin");
            e.add_combatant(Combatant::from_template(
                format!("g{}", n),
                name,
                &template("Goblin", 7),
                n,
            ));
        }
        let names: Vec<&str> = e.combatants().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Goblin", "Goblin 2", "Goblin 3"]);
    }

    #[test]
    fn test_turn_order_ties_break_by_join_order() {
        let e = encounter_with(&[("a", 5, 10), ("b", 5, 15), ("c", 5, 10)]);
        assert_eq!(e.turn_order(), &["id-b", "id-a", "id-c"]);
    }

    #[test]
    fn test_checkpoint_round() {
        let mut e = encounter_with(&[("a", 5, 20), ("b", 5, 10)]);
        e.begin().unwrap();
        assert_eq!(e.current_combatant().unwrap().name(), "a");
        assert_eq!(e.advance(true).unwrap(), Advance::Turn);
        assert_eq!(e.advance(true).unwrap(), Advance::Pending);
        assert!(e.round_pending());
        assert!(matches!(e.advance(true), Err(EngineError::InvalidState(_))));
        e.wrap_round().unwrap();
        assert_eq!(e.round(), 2);
        assert_eq!(e.turn(), 0);
        assert!(matches!(e.wrap_round(), Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn test_downed_combatants_skipped() {
        let mut e = encounter_with(&[("a", 5, 20), ("b", 5, 15), ("c", 5, 10)]);
        e.begin().unwrap();
        e.combatant_mut("id-b").unwrap().take_damage(5);
        assert_eq!(e.advance(false).unwrap(), Advance::Turn);
        assert_eq!(e.current_combatant().unwrap().name(), "c");

        e.combatant_mut("id-a").unwrap().deactivate();
        assert_eq!(e.advance(false).unwrap(), Advance::Wrapped);
        assert_eq!(e.round(), 2);
        assert_eq!(e.current_combatant().unwrap().name(), "c");
    }

    #[test]
    fn test_outcome_rules() {
        let e = encounter_with(&[("a", 5, 20)]);
        // No players at all: nobody is defeated
        assert_eq!(e.combat_outcome(), (false, false));

        let mut e = encounter_with(&[("a", 5, 20), ("b", 5, 10)]);
        e.combatant_mut("id-a").unwrap().take_damage(5);
        assert_eq!(e.combat_outcome(), (false, false));
    }

    #[test]
    fn test_begin_requires_order() {
        let mut e = Encounter::new("e", "n", "", EncounterContext::default(), "dm", Utc::now());
        assert!(matches!(e.begin(), Err(EngineError::InvalidState(_))));
    }
}
