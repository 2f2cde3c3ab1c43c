//! Property-based tests for the turn engine
//!
//! Invariants:
//! - Same rolls and roster give the same turn order
//! - Hit points stay within 0..=max
//! - Every standing combatant acts exactly once per round
//! - Downed combatants never hold the turn
//! - Combat end follows which sides are still standing

mod common;

use std::collections::BTreeSet;

use proptest::prelude::*;

use common::{ctx, goblin, Table, HERO_ID};
use skirmish::encounter::TurnMode;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

/// (initiative bonus, d20 face) per monster
fn arb_roster() -> impl Strategy<Value = Vec<(i32, u32)>> {
    prop::collection::vec((-2i32..6, 1u32..=20), 1..7)
}

/// Damage or healing, mostly small with the occasional huge value
fn arb_amount() -> impl Strategy<Value = i32> {
    prop_oneof![
        4 => 0i32..30,
        1 => Just(i32::MAX),
        1 => (i32::MAX - 100)..=i32::MAX,
    ]
}

/// Monsters join in order, then initiative is rolled. Returns the turn
/// order as join positions.
async fn turn_order(roster: &[(i32, u32)]) -> Vec<u32> {
    let table = Table::new(TurnMode::Auto).await;
    let id = table.encounter().await;
    for (bonus, _) in roster {
        let mut template = goblin();
        template.initiative_bonus = *bonus;
        table.engine.add_monster(&ctx(), &id, &template).await.unwrap();
    }
    table.dice.push(roster.iter().map(|(_, face)| *face));
    let e = table.engine.roll_initiative(&ctx(), &id).await.unwrap();

    let initiatives: Vec<i32> = e
        .turn_order()
        .iter()
        .map(|cid| e.combatant(cid).unwrap().initiative().unwrap())
        .collect();
    assert!(initiatives.windows(2).all(|w| w[0] >= w[1]));

    e.turn_order()
        .iter()
        .map(|cid| e.combatant(cid).unwrap().join_order())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_initiative_is_deterministic(roster in arb_roster()) {
        let rt = runtime();
        let first = rt.block_on(turn_order(&roster));
        let second = rt.block_on(turn_order(&roster));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_hp_stays_in_bounds(
        max_hp in 1i32..40,
        ops in prop::collection::vec((any::<bool>(), arb_amount()), 1..25),
    ) {
        runtime().block_on(async {
            let table = Table::new(TurnMode::Auto).await;
            let id = table.encounter().await;
            let mut template = goblin();
            template.max_hp = max_hp;
            let target = table.engine.add_monster(&ctx(), &id, &template).await.unwrap();

            for (heal, amount) in ops {
                let hp = if heal {
                    table.engine.heal_combatant(&ctx(), &id, target.id(), amount).await.unwrap()
                } else {
                    table.engine.apply_damage(&ctx(), &id, target.id(), amount).await.unwrap().hp
                };
                assert!(hp.current >= 0 && hp.current <= max_hp, "hp {} of {}", hp.current, max_hp);
            }
        });
    }

    #[test]
    fn prop_every_standing_combatant_acts_once_per_round(
        roster in arb_roster(),
        downed in prop::collection::vec(any::<bool>(), 7),
        mode in prop_oneof![Just(TurnMode::Auto), Just(TurnMode::Checkpoint)],
    ) {
        runtime().block_on(async {
            let table = Table::new(mode).await;
            let id = table.encounter().await;
            table.engine.add_player(&ctx(), &id, HERO_ID, None).await.unwrap();
            let mut monsters = Vec::new();
            for (bonus, _) in &roster {
                let mut template = goblin();
                template.initiative_bonus = *bonus;
                monsters.push(table.engine.add_monster(&ctx(), &id, &template).await.unwrap());
            }
            // Keep the first monster up so the fight cannot end
            for (monster, down) in monsters.iter().zip(&downed).skip(1) {
                if *down {
                    table.engine.apply_damage(&ctx(), &id, monster.id(), 100).await.unwrap();
                }
            }

            table.dice.push(std::iter::once(10).chain(roster.iter().map(|(_, face)| *face)));
            table.engine.roll_initiative(&ctx(), &id).await.unwrap();
            let mut e = table.engine.start_encounter(&ctx(), &id).await.unwrap();

            let standing: BTreeSet<String> = e
                .combatants()
                .iter()
                .filter(|c| c.current_hp() > 0)
                .map(|c| c.id().to_string())
                .collect();

            let mut round = e.round();
            let mut seen = Vec::new();
            while e.round() <= 3 {
                assert!(e.round() >= round);
                if e.round() != round {
                    let visited: BTreeSet<String> = seen.iter().cloned().collect();
                    assert_eq!(visited.len(), seen.len(), "someone acted twice in round {}", round);
                    assert_eq!(visited, standing);
                    seen.clear();
                    round = e.round();
                }
                let current = e.current_combatant().unwrap();
                assert!(current.current_hp() > 0);
                seen.push(current.id().to_string());

                e = table.engine.next_turn(&ctx(), &id).await.unwrap();
                if e.round_pending() {
                    e = table.engine.continue_round(&ctx(), &id).await.unwrap();
                }
            }
        });
    }

    #[test]
    fn prop_combat_end_follows_standing_sides(
        monsters in 1usize..5,
        downed in prop::collection::vec(any::<bool>(), 4),
        hero_down in any::<bool>(),
    ) {
        runtime().block_on(async {
            let table = Table::new(TurnMode::Auto).await;
            let id = table.encounter().await;
            let hero = table.engine.add_player(&ctx(), &id, HERO_ID, None).await.unwrap();
            let mut alive = 0;
            for down in downed.iter().take(monsters) {
                let monster = table.engine.add_monster(&ctx(), &id, &goblin()).await.unwrap();
                if *down {
                    table.engine.apply_damage(&ctx(), &id, monster.id(), 7).await.unwrap();
                } else {
                    alive += 1;
                }
            }
            if hero_down {
                table.engine.apply_damage(&ctx(), &id, hero.id(), 11).await.unwrap();
            }

            let expected = match (hero_down, alive == 0) {
                (false, true) => (true, true),
                (true, false) => (true, false),
                _ => (false, false),
            };
            let end = table.engine.check_combat_end(&ctx(), &id).await.unwrap();
            assert_eq!(end, expected);
        });
    }
}
