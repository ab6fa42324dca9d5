//! Built-in action catalog.
//!
//! Effects here are deliberately small: combat resolution and narrative
//! text belong to external services in a full deployment. These actions
//! satisfy the same contract (mutate the entity, return log lines,
//! chronicle notes and a success flag) so the pipeline runs end to end.

use crate::catalog::{ActionCatalog, ActionContext, ActionOutcome, ActionState, FnAction};
use crate::error::Result;
use crate::types::{ActionCategory, Enemy, EntityStatus};
use rand::Rng;
use std::sync::Arc;

/// Action ids referenced outside this module.
pub mod ids {
    pub const ATTACK: &str = "attack";
    pub const DEFEND: &str = "defend";
    pub const FLEE: &str = "flee";
    pub const RESPAWN: &str = "respawn";
    pub const BANDAGE: &str = "bandage";
    pub const REST: &str = "rest";
    pub const TRAVEL: &str = "travel";
    pub const EXPLORE: &str = "explore";
    pub const SELL_LOOT: &str = "sell_loot";
    pub const BUY_SUPPLIES: &str = "buy_supplies";
    pub const TAKE_QUEST: &str = "take_quest";
    pub const TURN_IN_QUEST: &str = "turn_in_quest";
    pub const CHAT: &str = "chat";
    pub const CRAFT: &str = "craft";
}

/// Fights a quest asks for before it can be turned in.
pub const QUEST_KILLS_REQUIRED: u32 = 2;

const TRAVEL_STAMINA: i32 = 5;
const EXPLORE_STAMINA: i32 = 10;
const SUPPLY_COST: u32 = 15;
const CRAFT_MATERIALS: u32 = 4;

/// Every built-in action, in catalog order.
pub fn default_catalog() -> Result<ActionCatalog> {
    let mut catalog = ActionCatalog::new();
    let mut add = |id: &str, category: ActionCategory, tags: &[&str], action: FnAction| {
        catalog.register(id, category, tags, Arc::new(action))
    };

    add(
        ids::ATTACK,
        ActionCategory::Combat,
        &["combat"],
        FnAction {
            can_perform: |s| s.world.in_combat && s.entity.enemy.is_some(),
            weight: Some(|s| 1.0 + s.world.health_ratio),
            perform: attack,
        },
    )?;
    add(
        ids::DEFEND,
        ActionCategory::Combat,
        &["combat"],
        FnAction {
            can_perform: |s| s.world.in_combat && s.entity.enemy.is_some(),
            weight: Some(|s| if s.world.stamina_ratio < 0.3 { 1.2 } else { 0.6 }),
            perform: defend,
        },
    )?;
    add(
        ids::FLEE,
        ActionCategory::Combat,
        &["combat", "safety"],
        FnAction {
            can_perform: |s| s.world.in_combat,
            weight: Some(flee_weight),
            perform: flee,
        },
    )?;
    add(
        ids::RESPAWN,
        ActionCategory::Recovery,
        &["safety"],
        FnAction {
            can_perform: |s| s.entity.is_dead(),
            weight: None,
            perform: respawn,
        },
    )?;
    add(
        ids::BANDAGE,
        ActionCategory::Recovery,
        &["safety"],
        FnAction {
            can_perform: |s| out_of_danger(s) && s.world.health_ratio < 0.9,
            weight: Some(|s| 1.0 + (1.0 - s.world.health_ratio) * 2.0),
            perform: bandage,
        },
    )?;
    add(
        ids::REST,
        ActionCategory::Rest,
        &["safety"],
        FnAction {
            can_perform: |s| {
                out_of_danger(s)
                    && (s.entity.stamina < s.entity.max_stamina
                        || s.entity.hp < s.entity.max_hp)
            },
            weight: Some(|s| 1.0 + (1.0 - s.world.stamina_ratio) * 2.0),
            perform: rest,
        },
    )?;
    add(
        ids::TRAVEL,
        ActionCategory::Travel,
        &["movement"],
        FnAction {
            can_perform: |s| {
                out_of_danger(s)
                    && s.entity.stamina >= TRAVEL_STAMINA
                    && s
                        .game
                        .locations
                        .get(&s.entity.location)
                        .map(|l| !l.neighbors.is_empty())
                        .unwrap_or(false)
            },
            weight: Some(|s| {
                if !s.world.location_safe && s.world.health_ratio < 0.5 {
                    2.0
                } else {
                    1.0
                }
            }),
            perform: travel,
        },
    )?;
    add(
        ids::EXPLORE,
        ActionCategory::Explore,
        &["movement", "loot"],
        FnAction {
            can_perform: |s| out_of_danger(s) && s.entity.stamina >= EXPLORE_STAMINA,
            weight: Some(|s| if s.world.location_safe { 0.7 } else { 1.2 }),
            perform: explore,
        },
    )?;
    add(
        ids::SELL_LOOT,
        ActionCategory::Trade,
        &["npc", "economy"],
        FnAction {
            can_perform: |s| {
                out_of_danger(s)
                    && s.world.npcs_open
                    && s.world.has_market
                    && s.entity.carried_weight > 0
            },
            weight: Some(|s| {
                let cap = s.entity.carry_capacity.max(1) as f64;
                1.0 + (s.entity.carried_weight as f64 / cap) * 2.0
            }),
            perform: sell_loot,
        },
    )?;
    add(
        ids::BUY_SUPPLIES,
        ActionCategory::Trade,
        &["npc", "economy"],
        FnAction {
            can_perform: |s| {
                out_of_danger(s)
                    && s.world.npcs_open
                    && s.world.has_market
                    && s.entity.gold >= SUPPLY_COST
                    && s.world.stamina_ratio < 0.7
            },
            weight: None,
            perform: buy_supplies,
        },
    )?;
    add(
        ids::TAKE_QUEST,
        ActionCategory::Quest,
        &["npc"],
        FnAction {
            can_perform: |s| out_of_danger(s) && s.world.quest_available && s.world.npcs_open,
            weight: None,
            perform: take_quest,
        },
    )?;
    add(
        ids::TURN_IN_QUEST,
        ActionCategory::Quest,
        &["npc"],
        FnAction {
            can_perform: |s| {
                out_of_danger(s)
                    && s.world.npcs_open
                    && s.entity.active_quest.is_some()
                    && s.entity.quest_kills >= QUEST_KILLS_REQUIRED
                    && s
                        .game
                        .locations
                        .get(&s.entity.location)
                        .map(|l| l.quest_board)
                        .unwrap_or(false)
            },
            weight: Some(|_| 2.0),
            perform: turn_in_quest,
        },
    )?;
    add(
        ids::CHAT,
        ActionCategory::Social,
        &["npc"],
        FnAction {
            can_perform: |s| out_of_danger(s) && s.world.npcs_open,
            weight: Some(|_| 0.6),
            perform: chat,
        },
    )?;
    add(
        ids::CRAFT,
        ActionCategory::Craft,
        &["economy"],
        FnAction {
            can_perform: |s| out_of_danger(s) && s.entity.carried_weight >= CRAFT_MATERIALS,
            weight: Some(|_| 0.8),
            perform: craft,
        },
    )?;

    Ok(catalog)
}

// ---------------------------------------------------------------------------
// Predicates and shared effects
// ---------------------------------------------------------------------------

fn out_of_danger(s: &ActionState<'_>) -> bool {
    !s.world.in_combat && !s.entity.is_dead()
}

fn flee_weight(s: &ActionState<'_>) -> f64 {
    if s.world.health_ratio < 0.3 {
        3.0
    } else if s.world.health_ratio < 0.5 {
        1.5
    } else {
        0.4
    }
}

fn start_fight(ctx: &mut ActionContext<'_>, out: &mut ActionOutcome) -> Result<bool> {
    let game = ctx.game;
    let loc = game.location(&ctx.entity.location)?;
    if loc.enemies.is_empty() || !ctx.rng.gen_bool(loc.danger.clamp(0.0, 1.0)) {
        return Ok(false);
    }
    let template = &loc.enemies[ctx.rng.gen_range(0..loc.enemies.len())];
    ctx.entity.enemy = Some(Enemy {
        name: template.name.clone(),
        hp: template.hp,
        max_hp: template.hp,
        attack: template.attack,
    });
    ctx.entity.status = EntityStatus::InCombat;
    out.line(format!(
        "A {} ambushes {} in {}!",
        template.name, ctx.entity.name, loc.name
    ));
    Ok(true)
}

/// Apply an enemy hit. Returns `true` if the entity died from it.
fn take_hit(ctx: &mut ActionContext<'_>, damage: i32, out: &mut ActionOutcome) -> bool {
    let enemy_name = ctx
        .entity
        .enemy
        .as_ref()
        .map(|e| e.name.clone())
        .unwrap_or_else(|| "something".into());
    ctx.entity.hp -= damage;
    out.line(format!(
        "{} hits {} for {damage}.",
        enemy_name, ctx.entity.name
    ));
    if ctx.entity.hp <= 0 {
        ctx.entity.hp = 0;
        ctx.entity.status = EntityStatus::Dead;
        ctx.entity.enemy = None;
        out.line(format!("{} has fallen.", ctx.entity.name));
        out.chronicle(
            "death",
            format!("{} was slain by a {}.", ctx.entity.name, enemy_name),
        );
        return true;
    }
    false
}

fn gain_xp(ctx: &mut ActionContext<'_>, amount: u32, out: &mut ActionOutcome) {
    ctx.entity.xp += amount;
    while ctx.entity.xp >= ctx.entity.level * 100 {
        ctx.entity.xp -= ctx.entity.level * 100;
        ctx.entity.level += 1;
        ctx.entity.max_hp += 10;
        ctx.entity.hp = ctx.entity.max_hp;
        out.line(format!("{} reached level {}!", ctx.entity.name, ctx.entity.level));
        out.chronicle(
            "level_up",
            format!("{} grew stronger and reached level {}.", ctx.entity.name, ctx.entity.level),
        );
    }
}

fn restore(value: &mut i32, amount: i32, max: i32) {
    *value = (*value + amount).min(max);
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

fn attack(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    let damage = ctx.rng.gen_range(5..=10) + ctx.entity.level as i32 * 2;
    let Some(enemy) = ctx.entity.enemy.as_mut() else {
        return Ok(ActionOutcome::failed());
    };
    enemy.hp -= damage;
    let (name, max_hp, attack_power, defeated) =
        (enemy.name.clone(), enemy.max_hp, enemy.attack, enemy.hp <= 0);
    out.line(format!("{} strikes the {name} for {damage}.", ctx.entity.name));

    if defeated {
        ctx.entity.enemy = None;
        ctx.entity.status = EntityStatus::Idle;
        ctx.entity.gold += (max_hp / 3).max(1) as u32;
        ctx.entity.carried_weight += 2;
        if ctx.entity.active_quest.is_some() {
            ctx.entity.quest_kills += 1;
        }
        out.line(format!("The {name} is defeated."));
        if max_hp >= 80 {
            out.chronicle("victory", format!("{} slew a {name}.", ctx.entity.name));
        }
        gain_xp(ctx, (max_hp / 2).max(1) as u32, &mut out);
        return Ok(out);
    }

    let retaliation = ctx.rng.gen_range((attack_power / 2).max(0)..=attack_power.max(0));
    take_hit(ctx, retaliation, &mut out);
    Ok(out)
}

fn defend(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    let attack_power = ctx.entity.enemy.as_ref().map(|e| e.attack).unwrap_or(0);
    out.line(format!("{} raises their guard.", ctx.entity.name));
    let max = ctx.entity.max_stamina;
    restore(&mut ctx.entity.stamina, 5, max);
    let damage = if attack_power > 0 { (attack_power / 3).max(1) } else { 0 };
    take_hit(ctx, damage, &mut out);
    Ok(out)
}

fn flee(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    ctx.entity.stamina = (ctx.entity.stamina - 10).max(0);
    if ctx.rng.gen_bool(0.6) {
        let mut out = ActionOutcome::succeeded();
        ctx.entity.enemy = None;
        ctx.entity.status = EntityStatus::Idle;
        out.line(format!("{} escapes.", ctx.entity.name));
        return Ok(out);
    }
    let mut out = ActionOutcome::failed();
    out.line(format!("{} fails to get away.", ctx.entity.name));
    let damage = ctx.entity.enemy.as_ref().map(|e| e.attack).unwrap_or(0);
    take_hit(ctx, damage, &mut out);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Recovery and rest
// ---------------------------------------------------------------------------

fn respawn(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    let game = ctx.game;
    let town = game.location(&game.respawn_location)?;
    ctx.entity.status = EntityStatus::Idle;
    ctx.entity.hp = (ctx.entity.max_hp / 2).max(1);
    ctx.entity.stamina = ctx.entity.max_stamina / 2;
    ctx.entity.gold -= ctx.entity.gold / 10;
    ctx.entity.location = town.id.clone();
    ctx.entity.arrived_at = Some(ctx.now);
    out.line(format!("{} wakes up in {}.", ctx.entity.name, town.name));
    Ok(out)
}

fn bandage(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    let max = ctx.entity.max_hp;
    restore(&mut ctx.entity.hp, (max / 5).max(1), max);
    out.line(format!("{} patches up their wounds.", ctx.entity.name));
    Ok(out)
}

fn rest(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    let (max_st, max_hp) = (ctx.entity.max_stamina, ctx.entity.max_hp);
    restore(&mut ctx.entity.stamina, 25, max_st);
    restore(&mut ctx.entity.hp, 5, max_hp);
    out.line(format!("{} rests for a while.", ctx.entity.name));
    Ok(out)
}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

fn travel(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    let game = ctx.game;
    let here = game.location(&ctx.entity.location)?;
    if here.neighbors.is_empty() {
        return Ok(ActionOutcome::failed());
    }
    let next_id = &here.neighbors[ctx.rng.gen_range(0..here.neighbors.len())];
    let next = game.location(next_id)?;
    ctx.entity.location = next.id.clone();
    ctx.entity.arrived_at = Some(ctx.now);
    ctx.entity.stamina = (ctx.entity.stamina - TRAVEL_STAMINA).max(0);
    out.line(format!(
        "{} travels from {} to {}.",
        ctx.entity.name, here.name, next.name
    ));
    start_fight(ctx, &mut out)?;
    Ok(out)
}

fn explore(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    ctx.entity.stamina = (ctx.entity.stamina - EXPLORE_STAMINA).max(0);
    out.line(format!("{} explores the surroundings.", ctx.entity.name));
    if start_fight(ctx, &mut out)? {
        return Ok(out);
    }
    let gold = ctx.rng.gen_range(1..=6);
    let loot = ctx.rng.gen_range(1..=4);
    ctx.entity.gold += gold;
    ctx.entity.carried_weight += loot;
    out.line(format!(
        "{} finds {gold} gold and some salvage.",
        ctx.entity.name
    ));
    gain_xp(ctx, 3, &mut out);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Town
// ---------------------------------------------------------------------------

fn sell_loot(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    let earned = ctx.entity.carried_weight * 2;
    ctx.entity.gold += earned;
    ctx.entity.carried_weight = 0;
    out.line(format!("{} sells their haul for {earned} gold.", ctx.entity.name));
    Ok(out)
}

fn buy_supplies(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    ctx.entity.gold = ctx.entity.gold.saturating_sub(SUPPLY_COST);
    ctx.entity.stamina = ctx.entity.max_stamina;
    out.line(format!("{} stocks up on supplies.", ctx.entity.name));
    Ok(out)
}

fn take_quest(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    let game = ctx.game;
    let wilds: Vec<_> = game.locations.values().filter(|l| !l.safe).collect();
    let target = if wilds.is_empty() {
        "the wilds".to_string()
    } else {
        wilds[ctx.rng.gen_range(0..wilds.len())].name.clone()
    };
    let quest = format!("Clear the threats in {target}");
    out.line(format!("{} accepts a quest: {quest}.", ctx.entity.name));
    ctx.entity.active_quest = Some(quest);
    ctx.entity.quest_kills = 0;
    Ok(out)
}

fn turn_in_quest(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    let quest = ctx.entity.active_quest.take().unwrap_or_default();
    ctx.entity.quest_kills = 0;
    ctx.entity.gold += 30;
    out.line(format!("{} completes '{quest}'.", ctx.entity.name));
    out.chronicle(
        "quest_complete",
        format!("{} completed the quest '{quest}'.", ctx.entity.name),
    );
    gain_xp(ctx, 40, &mut out);
    Ok(out)
}

fn chat(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    let mut out = ActionOutcome::succeeded();
    out.line(format!("{} trades gossip with the locals.", ctx.entity.name));
    gain_xp(ctx, 1, &mut out);
    Ok(out)
}

fn craft(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome> {
    ctx.entity.carried_weight = ctx.entity.carried_weight.saturating_sub(CRAFT_MATERIALS);
    if ctx.rng.gen_bool(0.8) {
        let mut out = ActionOutcome::succeeded();
        ctx.entity.gold += 10;
        out.line(format!("{} crafts something worth selling.", ctx.entity.name));
        return Ok(out);
    }
    let mut out = ActionOutcome::failed();
    out.line(format!("{} ruins the materials.", ctx.entity.name));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_data::GameData;
    use crate::types::Entity;
    use crate::world::WorldState;
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn perform(id: &str, entity: &mut Entity, game: &GameData, seed: u64) -> ActionOutcome {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let catalog = default_catalog().unwrap();
        let world = WorldState::derive(entity, game, now);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ctx = ActionContext {
            entity,
            world: &world,
            game,
            rng: &mut rng,
            now,
        };
        catalog.require(id).unwrap().action.perform(&mut ctx).unwrap()
    }

    fn state_allows(id: &str, entity: &Entity, game: &GameData) -> bool {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let world = WorldState::derive(entity, game, now);
        let state = ActionState {
            entity,
            world: &world,
            game,
        };
        default_catalog().unwrap().require(id).unwrap().action.can_perform(&state)
    }

    fn fighting() -> Entity {
        let mut e = Entity::new("hero", "eu", "Hero", "forest", Utc::now());
        e.status = EntityStatus::InCombat;
        e.enemy = Some(Enemy {
            name: "Grey Wolf".into(),
            hp: 5,
            max_hp: 30,
            attack: 6,
        });
        e
    }

    #[test]
    fn catalog_has_every_builtin_once() {
        let catalog = default_catalog().unwrap();
        assert_eq!(catalog.len(), 14);
        assert_eq!(catalog.in_category(ActionCategory::Combat).count(), 3);
    }

    #[test]
    fn attack_finishes_weak_enemy() {
        let game = GameData::builtin();
        let mut hero = fighting();
        hero.active_quest = Some("Clear the threats".into());
        let out = perform(ids::ATTACK, &mut hero, &game, 1);
        assert!(out.success);
        assert_eq!(hero.status, EntityStatus::Idle);
        assert!(hero.enemy.is_none());
        assert_eq!(hero.quest_kills, 1);
    }

    #[test]
    fn lethal_hit_kills_and_chronicles() {
        let game = GameData::builtin();
        let mut hero = fighting();
        hero.hp = 1;
        let out = perform(ids::DEFEND, &mut hero, &game, 7);
        assert_eq!(hero.status, EntityStatus::Dead);
        assert_eq!(hero.hp, 0);
        assert!(out.chronicle.iter().any(|c| c.kind == "death"));
    }

    #[test]
    fn respawn_returns_to_town_at_half_health() {
        let game = GameData::builtin();
        let mut hero = Entity::new("hero", "eu", "Hero", "caves", Utc::now());
        hero.status = EntityStatus::Dead;
        hero.hp = 0;
        assert!(state_allows(ids::RESPAWN, &hero, &game));
        perform(ids::RESPAWN, &mut hero, &game, 3);
        assert_eq!(hero.location, "town");
        assert_eq!(hero.hp, hero.max_hp / 2);
        assert_eq!(hero.status, EntityStatus::Idle);
    }

    #[test]
    fn travel_moves_to_a_neighbor() {
        let game = GameData::builtin();
        let mut hero = Entity::new("hero", "eu", "Hero", "town", Utc::now());
        let out = perform(ids::TRAVEL, &mut hero, &game, 11);
        assert!(out.success);
        assert!(["village", "forest"].contains(&hero.location.as_str()));
        assert!(hero.arrived_at.is_some());
        assert_eq!(hero.stamina, 100 - TRAVEL_STAMINA);
    }

    #[test]
    fn combat_actions_need_combat() {
        let game = GameData::builtin();
        let idle = Entity::new("hero", "eu", "Hero", "town", Utc::now());
        assert!(!state_allows(ids::ATTACK, &idle, &game));
        assert!(!state_allows(ids::FLEE, &idle, &game));
        let hero = fighting();
        assert!(state_allows(ids::FLEE, &hero, &game));
        assert!(!state_allows(ids::REST, &hero, &game));
    }

    #[test]
    fn quest_turn_in_needs_kills() {
        let game = GameData::builtin();
        let mut hero = Entity::new("hero", "eu", "Hero", "town", Utc::now());
        hero.active_quest = Some("Clear the threats in Whisperwood".into());
        assert!(!state_allows(ids::TURN_IN_QUEST, &hero, &game));
        hero.quest_kills = QUEST_KILLS_REQUIRED;
        assert!(state_allows(ids::TURN_IN_QUEST, &hero, &game));
        let out = perform(ids::TURN_IN_QUEST, &mut hero, &game, 5);
        assert!(hero.active_quest.is_none());
        assert!(out.chronicle.iter().any(|c| c.kind == "quest_complete"));
    }

    #[test]
    fn gain_xp_levels_up() {
        let game = GameData::builtin();
        let mut hero = Entity::new("hero", "eu", "Hero", "town", Utc::now());
        hero.xp = 99;
        let out = perform(ids::CHAT, &mut hero, &game, 2);
        assert_eq!(hero.level, 2);
        assert_eq!(hero.xp, 0);
        assert!(out.chronicle.iter().any(|c| c.kind == "level_up"));
    }
}
