//! Combatants: one participant's snapshot inside one encounter

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::EngineError;
use crate::character::{Ability, CharacterSheet};
use crate::combat::{AttackSpec, DamageProfile, DamageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatantKind {
    Player,
    Monster,
}

impl std::fmt::Display for CombatantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombatantKind::Player => write!(f, "player"),
            CombatantKind::Monster => write!(f, "monster"),
        }
    }
}

/// Per-turn resource a combatant can spend once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSlot {
    Action,
    BonusAction,
    Reaction,
    LimitedResource,
}

impl FromStr for ActionSlot {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "action" => Ok(ActionSlot::Action),
            "bonus_action" | "bonus" => Ok(ActionSlot::BonusAction),
            "reaction" => Ok(ActionSlot::Reaction),
            "limited_resource" | "resource" => Ok(ActionSlot::LimitedResource),
            _ => Err(EngineError::Validation(format!("unknown action slot '{}'", s))),
        }
    }
}

impl std::fmt::Display for ActionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionSlot::Action => "action",
            ActionSlot::BonusAction => "bonus action",
            ActionSlot::Reaction => "reaction",
            ActionSlot::LimitedResource => "limited resource",
        };
        f.write_str(s)
    }
}

/// Slots spent this turn; cleared when the combatant's turn starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFlags {
    pub action: bool,
    pub bonus_action: bool,
    pub reaction: bool,
    pub limited_resource: bool,
}

impl TurnFlags {
    pub fn used(&self, slot: ActionSlot) -> bool {
        match slot {
            ActionSlot::Action => self.action,
            ActionSlot::BonusAction => self.bonus_action,
            ActionSlot::Reaction => self.reaction,
            ActionSlot::LimitedResource => self.limited_resource,
        }
    }

    fn mark(&mut self, slot: ActionSlot) {
        match slot {
            ActionSlot::Action => self.action = true,
            ActionSlot::BonusAction => self.bonus_action = true,
            ActionSlot::Reaction => self.reaction = true,
            ActionSlot::LimitedResource => self.limited_resource = true,
        }
    }
}

/// Stat block a monster combatant is spawned from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterTemplate {
    pub name: String,
    /// Matched by `vs_enemy_type:` conditions; defaults to the lowercase name
    #[serde(default)]
    pub creature_type: Option<String>,
    pub armor_class: i32,
    pub max_hp: i32,
    #[serde(default)]
    pub initiative_bonus: i32,
    #[serde(default = "default_speed")]
    pub speed: u32,
    #[serde(default)]
    pub actions: Vec<AttackSpec>,
    #[serde(default)]
    pub resistances: Vec<DamageType>,
    #[serde(default)]
    pub immunities: Vec<DamageType>,
    #[serde(default)]
    pub vulnerabilities: Vec<DamageType>,
    #[serde(default)]
    pub saves: HashMap<Ability, i32>,
}

fn default_speed() -> u32 {
    30
}

impl MonsterTemplate {
    pub fn damage_profile(&self) -> DamageProfile {
        let mut profile = DamageProfile::new();
        for dtype in &self.resistances {
            profile.add_resistance(*dtype);
        }
        for dtype in &self.vulnerabilities {
            profile.add_vulnerability(*dtype);
        }
        for dtype in &self.immunities {
            profile.add_immunity(*dtype);
        }
        profile
    }
}

/// A participant in one encounter
///
/// Only the turn engine mutates a combatant; everyone else sees copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    id: String,
    name: String,
    kind: CombatantKind,
    creature_type: Option<String>,
    current_hp: i32,
    max_hp: i32,
    armor_class: i32,
    initiative: Option<i32>,
    initiative_bonus: i32,
    speed: u32,
    /// Persistent character behind a player combatant
    character_id: Option<String>,
    /// Chat identity of the owning player
    player_id: Option<String>,
    actions: Vec<AttackSpec>,
    damage_profile: DamageProfile,
    save_bonuses: HashMap<Ability, i32>,
    is_active: bool,
    join_order: u32,
    turn_flags: TurnFlags,
}

impl Combatant {
    pub(crate) fn from_template(
        id: String,
        display_name: String,
        template: &MonsterTemplate,
        join_order: u32,
    ) -> Self {
        let max_hp = template.max_hp.max(1);
        Self {
            id,
            name: display_name,
            kind: CombatantKind::Monster,
            creature_type: Some(
                template
                    .creature_type
                    .clone()
                    .unwrap_or_else(|| template.name.clone())
                    .to_lowercase(),
            ),
            current_hp: max_hp,
            max_hp,
            armor_class: template.armor_class,
            initiative: None,
            initiative_bonus: template.initiative_bonus,
            speed: template.speed,
            character_id: None,
            player_id: None,
            actions: template.actions.clone(),
            damage_profile: template.damage_profile(),
            save_bonuses: template.saves.clone(),
            is_active: true,
            join_order,
            turn_flags: TurnFlags::default(),
        }
    }

    pub(crate) fn from_character(
        id: String,
        sheet: &CharacterSheet,
        player_id: Option<String>,
        join_order: u32,
    ) -> Self {
        let save_bonuses = [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
        .into_iter()
        .map(|a| (a, sheet.abilities.modifier(a)))
        .collect();

        let max_hp = sheet.max_hp.max(1);
        Self {
            id,
            name: sheet.name.clone(),
            kind: CombatantKind::Player,
            creature_type: None,
            current_hp: sheet.hp().clamp(0, max_hp),
            max_hp,
            armor_class: sheet.armor_class(),
            initiative: None,
            initiative_bonus: sheet.initiative_bonus(),
            speed: sheet.speed,
            character_id: Some(sheet.id.clone()),
            player_id,
            actions: Vec::new(),
            damage_profile: DamageProfile::new(),
            save_bonuses,
            is_active: true,
            join_order,
            turn_flags: TurnFlags::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CombatantKind {
        self.kind
    }

    pub fn is_player(&self) -> bool {
        self.kind == CombatantKind::Player
    }

    pub fn is_monster(&self) -> bool {
        self.kind == CombatantKind::Monster
    }

    pub fn creature_type(&self) -> Option<&str> {
        self.creature_type.as_deref()
    }

    pub fn current_hp(&self) -> i32 {
        self.current_hp
    }

    pub fn max_hp(&self) -> i32 {
        self.max_hp
    }

    pub fn armor_class(&self) -> i32 {
        self.armor_class
    }

    pub fn initiative(&self) -> Option<i32> {
        self.initiative
    }

    pub fn initiative_bonus(&self) -> i32 {
        self.initiative_bonus
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn character_id(&self) -> Option<&str> {
        self.character_id.as_deref()
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn actions(&self) -> &[AttackSpec] {
        &self.actions
    }

    pub fn damage_profile(&self) -> &DamageProfile {
        &self.damage_profile
    }

    pub fn save_bonus(&self, ability: Ability) -> i32 {
        self.save_bonuses.get(&ability).copied().unwrap_or(0)
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn join_order(&self) -> u32 {
        self.join_order
    }

    pub fn turn_flags(&self) -> TurnFlags {
        self.turn_flags
    }

    /// A monster with hit points left and something to do
    pub fn can_act(&self) -> bool {
        self.kind == CombatantKind::Monster && self.current_hp > 0 && !self.actions.is_empty()
    }

    /// Still in play and on its feet
    pub fn is_standing(&self) -> bool {
        self.is_active && self.current_hp > 0
    }

    /// Monster action by name (case-insensitive), or the first one
    pub fn action(&self, name: Option<&str>) -> Option<&AttackSpec> {
        match name {
            Some(n) => self.actions.iter().find(|a| a.name.eq_ignore_ascii_case(n)),
            None => self.actions.first(),
        }
    }

    /// Returns the hit points actually lost
    pub(crate) fn take_damage(&mut self, amount: i32) -> i32 {
        let before = self.current_hp;
        self.current_hp = self
            .current_hp
            .saturating_sub(amount.max(0))
            .clamp(0, self.max_hp);
        before - self.current_hp
    }

    /// Returns the hit points actually restored
    pub(crate) fn heal(&mut self, amount: i32) -> i32 {
        let before = self.current_hp;
        self.current_hp = self
            .current_hp
            .saturating_add(amount.max(0))
            .clamp(0, self.max_hp);
        self.current_hp - before
    }

    pub(crate) fn set_initiative(&mut self, value: i32) {
        self.initiative = Some(value);
    }

    pub(crate) fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub(crate) fn start_new_turn(&mut self) {
        self.turn_flags = TurnFlags::default();
    }

    pub(crate) fn use_slot(&mut self, slot: ActionSlot) -> Result<(), EngineError> {
        if self.turn_flags.used(slot) {
            return Err(EngineError::InvalidState(format!(
                "{} already used their {} this turn",
                self.name, slot
            )));
        }
        self.turn_flags.mark(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::{AttackKind, DamageComponent, DiceExpr};

    fn goblin() -> MonsterTemplate {
        MonsterTemplate {
            name: "Goblin".into(),
            creature_type: None,
            armor_class: 15,
            max_hp: 7,
            initiative_bonus: 2,
            speed: 30,
            actions: vec![AttackSpec {
                name: "Scimitar".into(),
                kind: AttackKind::Melee,
                weapon: Some("scimitar".into()),
                attack_bonus: 4,
                damage: vec![DamageComponent::new(DiceExpr::new(1, 6, 2), DamageType::Slashing)],
            }],
            resistances: vec![],
            immunities: vec![DamageType::Poison],
            vulnerabilities: vec![],
            saves: HashMap::new(),
        }
    }

    #[test]
    fn test_hp_clamps() {
        let mut c = Combatant::from_template("c1".into(), "Goblin".into(), &goblin(), 0);
        assert_eq!(c.take_damage(5), 5);
        assert_eq!(c.current_hp(), 2);
        assert_eq!(c.take_damage(10), 2);
        assert_eq!(c.current_hp(), 0);
        assert_eq!(c.heal(100), 7);
        assert_eq!(c.current_hp(), 7);
        assert_eq!(c.take_damage(-3), 0);
        assert_eq!(c.heal(-3), 0);
    }

    #[test]
    fn test_extreme_amounts_saturate() {
        let mut c = Combatant::from_template("c1".into(), "Goblin".into(), &goblin(), 0);
        c.take_damage(1);
        assert_eq!(c.heal(i32::MAX), 1);
        assert_eq!(c.current_hp(), 7);
        assert_eq!(c.take_damage(i32::MAX), 7);
        assert_eq!(c.current_hp(), 0);
        assert_eq!(c.heal(i32::MAX), 7);
    }

    #[test]
    fn test_can_act() {
        let mut c = Combatant::from_template("c1".into(), "Goblin".into(), &goblin(), 0);
        assert!(c.can_act());
        c.take_damage(7);
        assert!(!c.can_act());

        let mut statue = goblin();
        statue.actions.clear();
        let statue = Combatant::from_template("c2".into(), "Statue".into(), &statue, 1);
        assert!(!statue.can_act());
    }

    #[test]
    fn test_template_defaults() {
        let c = Combatant::from_template("c1".into(), "Goblin 2".into(), &goblin(), 3);
        assert_eq!(c.creature_type(), Some("goblin"));
        assert_eq!(c.name(), "Goblin 2");
        assert_eq!(c.join_order(), 3);
        assert_eq!(
            c.damage_profile().get(DamageType::Poison),
            crate::combat::DamageModifier::Immune
        );
        assert_eq!(c.action(Some("SCIMITAR")).unwrap().attack_bonus, 4);
        assert!(c.action(Some("bite")).is_none());
    }

    #[test]
    fn test_slots() {
        let mut c = Combatant::from_template("c1".into(), "Goblin".into(), &goblin(), 0);
        c.use_slot(ActionSlot::Action).unwrap();
        assert!(matches!(
            c.use_slot(ActionSlot::Action),
            Err(EngineError::InvalidState(_))
        ));
        c.use_slot(ActionSlot::Reaction).unwrap();
        c.start_new_turn();
        assert_eq!(c.turn_flags(), TurnFlags::default());
        c.use_slot(ActionSlot::Action).unwrap();
    }

    #[test]
    fn test_slot_parsing() {
        assert_eq!("Bonus Action".parse::<ActionSlot>().unwrap(), ActionSlot::BonusAction);
        assert_eq!("limited-resource".parse::<ActionSlot>().unwrap(), ActionSlot::LimitedResource);
        assert!(matches!(
            "lair".parse::<ActionSlot>(),
            Err(EngineError::Validation(_))
        ));
    }
}
