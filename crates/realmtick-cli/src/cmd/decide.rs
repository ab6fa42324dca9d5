use crate::output::{print_json, print_table};
use anyhow::Context;
use realmtick_core::config::Config;
use realmtick_runtime::Runtime;
use std::path::Path;

/// Preview the next decision for `entity_id`. Nothing is performed or
/// recorded.
pub fn run(root: &Path, entity_id: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load_effective(root).context("failed to load config")?;
    let runtime = Runtime::open(root, config)?;
    let entity = runtime.store().require(entity_id)?;
    let game = runtime
        .game_source()
        .load()
        .context("failed to load game data")?;

    let decision = runtime
        .pipeline()
        .preview(&entity, &game, chrono::Utc::now())
        .with_context(|| format!("failed to decide for '{entity_id}'"))?;

    if json {
        return print_json(&serde_json::json!({
            "entity_id": entity.id,
            "status": entity.status,
            "decision": decision,
        }));
    }

    let Some(decision) = decision else {
        println!("{} ({}) has nothing to do.", entity.name, entity.status);
        return Ok(());
    };

    println!(
        "{} ({}) -> {} [{}] via {} branch, score {:.3}",
        entity.name,
        entity.status,
        decision.action_id,
        decision.category,
        decision.branch,
        decision.score
    );
    let rows = decision
        .ranked
        .iter()
        .map(|s| {
            let b = &s.breakdown;
            vec![
                s.action_id.clone(),
                s.category.to_string(),
                format!("{:.3}", s.score),
                b.rule.to_string(),
                format!("{:.2}", b.base),
                format!("{:.2}", b.profile),
                format!("{:.2}", b.fatigue),
                format!("{:.2}", b.modifier),
                format!("{:.2}", b.learning),
                format!("{:.2}", b.recent),
            ]
        })
        .collect();
    println!();
    print_table(
        &[
            "ACTION", "CATEGORY", "SCORE", "RULE", "BASE", "PROFILE", "FATIGUE", "MOD", "LEARN",
            "RECENT",
        ],
        rows,
    );
    Ok(())
}
