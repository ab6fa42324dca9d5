use crate::output::{print_json, print_table, truncate};
use anyhow::Context;
use clap::Subcommand;
use realmtick_core::config::Config;
use realmtick_core::profile::ProfileRegistry;
use realmtick_core::types::Entity;
use realmtick_runtime::Runtime;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum EntitySubcommand {
    /// Create a level-1 character
    Add {
        /// Entity id (no '/' or ':')
        id: String,
        /// Realm the entity lives in
        #[arg(long)]
        realm: String,
        /// Display name (defaults to the id)
        #[arg(long)]
        name: Option<String>,
        /// Starting location
        #[arg(long, default_value = "town")]
        location: String,
        /// Play-style profile (warrior, explorer, merchant, scholar)
        #[arg(long)]
        profile: Option<String>,
    },

    /// List all entities
    List,

    /// Show one entity with its recent activity
    Show {
        id: String,
        /// How many log lines and chronicle entries to include
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: EntitySubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load_effective(root).context("failed to load config")?;
    let runtime = Runtime::open(root, config)?;
    match subcmd {
        EntitySubcommand::Add {
            id,
            realm,
            name,
            location,
            profile,
        } => add(&runtime, &id, &realm, name, &location, profile, json),
        EntitySubcommand::List => list(&runtime, json),
        EntitySubcommand::Show { id, limit } => show(&runtime, &id, limit, json),
    }
}

// ---------------------------------------------------------------------------
// add
// ---------------------------------------------------------------------------

fn add(
    runtime: &Runtime,
    id: &str,
    realm: &str,
    name: Option<String>,
    location: &str,
    profile: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let store = runtime.store();
    if store.get(id)?.is_some() {
        anyhow::bail!("entity '{id}' already exists");
    }
    let game = runtime
        .game_source()
        .load()
        .context("failed to load game data")?;
    game.location(location)?;
    if let Some(code) = profile.as_deref() {
        let profiles = ProfileRegistry::builtin();
        if profiles.get(code).is_none() {
            anyhow::bail!(
                "unknown profile '{code}' (expected one of: {})",
                profiles.codes().join(", ")
            );
        }
    }

    let mut entity = Entity::new(
        id,
        realm,
        name.unwrap_or_else(|| id.to_string()),
        location,
        chrono::Utc::now(),
    );
    entity.profile = profile;
    store.put(&entity)?;

    if json {
        print_json(&entity)?;
    } else {
        println!("Added {} ({}) in realm {} at {}", entity.id, entity.name, realm, location);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(runtime: &Runtime, json: bool) -> anyhow::Result<()> {
    let entities = runtime.store().list()?;
    if json {
        return print_json(&entities);
    }
    if entities.is_empty() {
        println!("No entities.");
        return Ok(());
    }
    let rows = entities
        .iter()
        .map(|e| {
            vec![
                e.id.clone(),
                e.realm_id.clone(),
                truncate(&e.name, 24),
                e.status.to_string(),
                e.location.clone(),
                e.level.to_string(),
                format!("{}/{}", e.hp, e.max_hp),
                if e.active { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(
        &["ID", "REALM", "NAME", "STATUS", "LOCATION", "LVL", "HP", "ACTIVE"],
        rows,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(runtime: &Runtime, id: &str, limit: usize, json: bool) -> anyhow::Result<()> {
    let store = runtime.store();
    let entity = store.require(id)?;
    let logs = store.recent_logs(id, limit)?;
    let chronicle = store.chronicle(id, limit)?;

    if json {
        return print_json(&serde_json::json!({
            "entity": entity,
            "logs": logs,
            "chronicle": chronicle,
        }));
    }

    println!("{} ({})", entity.name, entity.id);
    println!("  realm:    {}", entity.realm_id);
    println!("  status:   {}", entity.status);
    println!("  location: {}", entity.location);
    println!("  level:    {} ({} xp)", entity.level, entity.xp);
    println!("  hp:       {}/{}", entity.hp, entity.max_hp);
    println!("  stamina:  {}/{}", entity.stamina, entity.max_stamina);
    println!("  gold:     {}", entity.gold);
    if let Some(profile) = &entity.profile {
        println!("  profile:  {profile}");
    }
    if let Some(quest) = &entity.active_quest {
        println!("  quest:    {quest} ({} kills)", entity.quest_kills);
    }
    if let Some(enemy) = &entity.enemy {
        println!("  fighting: {} ({} hp)", enemy.name, enemy.hp);
    }

    if !logs.is_empty() {
        println!("\nRecent activity:");
        for r in &logs {
            println!("  {}  {}", r.at.format("%Y-%m-%d %H:%M:%S"), r.message);
        }
    }
    if !chronicle.is_empty() {
        println!("\nChronicle:");
        for c in &chronicle {
            println!("  {}  [{}] {}", c.at.format("%Y-%m-%d %H:%M"), c.kind, c.text);
        }
    }
    Ok(())
}
