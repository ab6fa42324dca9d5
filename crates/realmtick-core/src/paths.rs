use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const REALMTICK_DIR: &str = ".realmtick";
pub const CONFIG_FILE: &str = ".realmtick/config.yaml";
pub const ENTITY_DB_FILE: &str = ".realmtick/entities.redb";
pub const QUEUE_DB_FILE: &str = ".realmtick/queue.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn realmtick_dir(root: &Path) -> PathBuf {
    root.join(REALMTICK_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn entity_db_path(root: &Path) -> PathBuf {
    root.join(ENTITY_DB_FILE)
}

pub fn queue_db_path(root: &Path) -> PathBuf {
    root.join(QUEUE_DB_FILE)
}

/// Resolve a config-relative path (e.g. `game_data`) against the project root.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_live_under_realmtick_dir() {
        let root = Path::new("/srv/world");
        assert_eq!(config_path(root), PathBuf::from("/srv/world/.realmtick/config.yaml"));
        assert!(queue_db_path(root).starts_with(realmtick_dir(root)));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let root = Path::new("/srv/world");
        assert_eq!(resolve(root, Path::new("/etc/game.yaml")), PathBuf::from("/etc/game.yaml"));
        assert_eq!(resolve(root, Path::new("game.yaml")), PathBuf::from("/srv/world/game.yaml"));
    }
}
