//! Whole-encounter scenarios driven through the public engine API

mod common;

use chrono::Duration;
use common::{ctx, goblin, Table, HERO_ID};
use skirmish::effects::{build_bless_effect, build_shield_effect};
use skirmish::encounter::{EncounterStatus, ErrorKind, Outcome, TurnMode};

/// Hero and one goblin with initiative rolled so the hero goes first.
/// Returns (encounter, hero, goblin) IDs.
async fn hero_vs_goblin(table: &Table) -> (String, String, String) {
    let id = table.encounter().await;
    let hero = table
        .engine
        .add_player(&ctx(), &id, HERO_ID, Some("player-1"))
        .await
        .unwrap();
    let goblin = table.engine.add_monster(&ctx(), &id, &goblin()).await.unwrap();
    assert_eq!(hero.armor_class(), 14);
    assert_eq!(hero.current_hp(), 11);

    // Hero 15+3, goblin 5+2
    table.dice.push([15, 5]);
    table.engine.roll_initiative(&ctx(), &id).await.unwrap();
    let started = table.engine.start_encounter(&ctx(), &id).await.unwrap();
    assert_eq!(started.status(), EncounterStatus::Active);
    assert_eq!(started.round(), 1);
    assert_eq!(started.current_combatant().unwrap().id(), hero.id());

    (id, hero.id().to_string(), goblin.id().to_string())
}

/// Hero hits for 5, goblin hits back for 4
async fn trade_blows(table: &Table, id: &str, hero: &str, goblin: &str) {
    // 12+5 = 17 vs AC 15, 1d6 rolls 2 (+3)
    table.dice.push([12, 2]);
    let blow = table.engine.attack(&ctx(), id, hero, goblin, None).await.unwrap();
    assert!(blow.result.hit);
    assert_eq!(blow.result.attack, "Shortsword");
    assert_eq!(blow.result.attack_total, 17);
    assert_eq!(blow.hp.as_ref().unwrap().current, 2);
    assert_eq!(blow.combat_end, (false, false));

    let e = table.engine.next_turn(&ctx(), id).await.unwrap();
    assert_eq!(e.current_combatant().unwrap().id(), goblin);
    assert_eq!(e.current_combatant().unwrap().current_hp(), 2);
    assert!(e.current_combatant().unwrap().is_active());

    // 10+4 = 14 vs AC 14, 1d6 rolls 2 (+2)
    table.dice.push([10, 2]);
    let blow = table.engine.attack(&ctx(), id, goblin, hero, None).await.unwrap();
    assert!(blow.result.hit);
    assert_eq!(blow.result.total_damage(), 4);
    assert_eq!(blow.hp.as_ref().unwrap().current, 7);
}

#[tokio::test]
async fn test_goblin_ambush_auto_wraps() {
    let table = Table::new(TurnMode::Auto).await;
    let (id, hero, goblin) = hero_vs_goblin(&table).await;
    trade_blows(&table, &id, &hero, &goblin).await;

    let e = table.engine.next_turn(&ctx(), &id).await.unwrap();
    assert_eq!(e.round(), 2);
    assert_eq!(e.turn(), 0);
    assert!(!e.round_pending());
    assert_eq!(e.current_combatant().unwrap().id(), hero);
    assert_eq!(table.dice.remaining(), 0);
}

#[tokio::test]
async fn test_goblin_ambush_checkpoint() {
    let table = Table::new(TurnMode::Checkpoint).await;
    let (id, hero, goblin) = hero_vs_goblin(&table).await;
    trade_blows(&table, &id, &hero, &goblin).await;

    let e = table.engine.next_turn(&ctx(), &id).await.unwrap();
    assert!(e.round_pending());
    assert_eq!(e.round(), 1);

    let err = table.engine.next_turn(&ctx(), &id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = table
        .engine
        .attack(&ctx(), &id, &goblin, &hero, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let e = table.engine.continue_round(&ctx(), &id).await.unwrap();
    assert_eq!(e.round(), 2);
    assert!(!e.round_pending());
    assert_eq!(e.current_combatant().unwrap().id(), hero);
    assert!(e.log().iter().any(|l| l.text == "Round 2 begins"));
}

#[tokio::test]
async fn test_critical_hit_ends_combat() {
    let table = Table::new(TurnMode::Auto).await;
    let (id, hero, goblin) = hero_vs_goblin(&table).await;

    // Natural 20 doubles the dice: 2d6 rolls 4 and 3 (+3)
    table.dice.push([20, 4, 3]);
    let blow = table.engine.attack(&ctx(), &id, &hero, &goblin, None).await.unwrap();
    assert!(blow.result.critical);
    assert_eq!(blow.result.total_damage(), 10);
    assert_eq!(blow.hp.unwrap().current, 0);
    assert_eq!(blow.combat_end, (true, true));

    let e = table.engine.get_encounter(&ctx(), &id).await.unwrap();
    assert_eq!(e.status(), EncounterStatus::Completed);
    assert_eq!(e.outcome(), Some(Outcome::PlayersWon));
    assert!(e.log().iter().any(|l| l.text == "Goblin falls!"));

    let err = table.engine.next_turn(&ctx(), &id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = table
        .engine
        .apply_damage(&ctx(), &id, &hero, 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_natural_one_misses() {
    let table = Table::new(TurnMode::Auto).await;
    let (id, hero, goblin) = hero_vs_goblin(&table).await;

    table.dice.push([1]);
    let blow = table.engine.attack(&ctx(), &id, &hero, &goblin, None).await.unwrap();
    assert!(blow.result.fumble);
    assert!(!blow.result.hit);
    assert!(blow.hp.is_none());

    let err = table
        .engine
        .attack(&ctx(), &id, &hero, &goblin, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_dead_monster_is_skipped() {
    let table = Table::new(TurnMode::Auto).await;
    let id = table.encounter().await;
    table
        .engine
        .add_player(&ctx(), &id, HERO_ID, None)
        .await
        .unwrap();
    let first = table.engine.add_monster(&ctx(), &id, &goblin()).await.unwrap();
    let second = table.engine.add_monster(&ctx(), &id, &goblin()).await.unwrap();
    assert_eq!(second.name(), "Goblin 2");

    // Hero 18, Goblin 12, Goblin 2 7
    table.dice.push([15, 10, 5]);
    table.engine.roll_initiative(&ctx(), &id).await.unwrap();
    table.engine.start_encounter(&ctx(), &id).await.unwrap();

    let hit = table
        .engine
        .apply_damage(&ctx(), &id, first.id(), 50)
        .await
        .unwrap();
    assert_eq!(hit.hp.current, 0);
    assert_eq!(hit.combat_end, (false, false));

    let e = table.engine.next_turn(&ctx(), &id).await.unwrap();
    let current = e.current_combatant().unwrap();
    assert_eq!(current.id(), second.id());
    assert!(!e.combatant(first.id()).unwrap().can_act());
    assert_eq!(e.turn_order().len(), 3);

    let current = table
        .engine
        .get_current_combatant(&ctx(), &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.id(), second.id());
}

#[tokio::test]
async fn test_failed_roll_changes_nothing() {
    let table = Table::new(TurnMode::Auto).await;
    let (id, hero, goblin) = hero_vs_goblin(&table).await;
    let before = table.engine.get_encounter(&ctx(), &id).await.unwrap();

    // No faces queued: the dice collaborator fails
    let err = table
        .engine
        .attack(&ctx(), &id, &hero, &goblin, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let after = table.engine.get_encounter(&ctx(), &id).await.unwrap();
    assert_eq!(after, before);
    assert!(!after.combatant(&hero).unwrap().turn_flags().action);

    table.dice.push([12, 2]);
    table.engine.attack(&ctx(), &id, &hero, &goblin, None).await.unwrap();
}

#[tokio::test]
async fn test_attack_rules() {
    let table = Table::new(TurnMode::Auto).await;
    let (id, hero, goblin) = hero_vs_goblin(&table).await;

    let err = table
        .engine
        .attack(&ctx(), &id, &goblin, &hero, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = table
        .engine
        .attack(&ctx(), &id, &hero, &hero, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = table
        .engine
        .attack(&ctx(), &id, &hero, &goblin, Some("Greataxe"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_bless_and_shield() {
    let table = Table::new(TurnMode::Auto).await;
    let (id, hero, goblin) = hero_vs_goblin(&table).await;

    table
        .engine
        .apply_effect(&ctx(), &id, &hero, build_bless_effect())
        .await
        .unwrap();
    table
        .engine
        .apply_effect(&ctx(), &id, &goblin, build_shield_effect())
        .await
        .unwrap();

    // 14+5 plus Bless d4 2 = 21 vs AC 20
    table.dice.push([14, 2, 1]);
    let blow = table.engine.attack(&ctx(), &id, &hero, &goblin, None).await.unwrap();
    assert_eq!(blow.result.target_ac, 20);
    assert_eq!(blow.result.attack_total, 21);
    assert!(blow.result.hit);
    assert_eq!(blow.hp.unwrap().current, 3);

    // Shield lasts one round
    table.engine.next_turn(&ctx(), &id).await.unwrap();
    table.clock.advance(Duration::seconds(7));
    let e = table.engine.next_turn(&ctx(), &id).await.unwrap();
    assert_eq!(e.round(), 2);
    assert!(e.log().iter().any(|l| l.text == "Shield on Goblin has ended"));
    assert!(table
        .engine
        .active_effects(&ctx(), &id, &goblin)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        table
            .engine
            .active_effects(&ctx(), &id, &hero)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_removed_combatant_ends_fight() {
    let table = Table::new(TurnMode::Auto).await;
    let (id, _hero, goblin) = hero_vs_goblin(&table).await;

    let end = table
        .engine
        .remove_combatant(&ctx(), &id, &goblin)
        .await
        .unwrap();
    assert_eq!(end, (true, true));
    let e = table.engine.get_encounter(&ctx(), &id).await.unwrap();
    assert_eq!(e.outcome(), Some(Outcome::PlayersWon));
    assert_eq!(e.combatants().len(), 2);
}

#[tokio::test]
async fn test_concurrent_damage_is_serialized() {
    let table = std::sync::Arc::new(Table::new(TurnMode::Auto).await);
    let id = table.encounter().await;
    let mut template = goblin();
    template.max_hp = 100;
    let ogre = table.engine.add_monster(&ctx(), &id, &template).await.unwrap();

    let hits = (0..20).map(|_| {
        let table = table.clone();
        let id = id.clone();
        let target = ogre.id().to_string();
        tokio::spawn(async move {
            table
                .engine
                .apply_damage(&ctx(), &id, &target, 3)
                .await
                .unwrap();
        })
    });
    for hit in hits.collect::<Vec<_>>() {
        hit.await.unwrap();
    }

    let e = table.engine.get_encounter(&ctx(), &id).await.unwrap();
    assert_eq!(e.combatant(ogre.id()).unwrap().current_hp(), 40);
}
