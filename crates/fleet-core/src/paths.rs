use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const FLEET_DIR: &str = ".fleet";
pub const CONFIG_FILE: &str = ".fleet/config.yaml";
pub const INVENTORY_FILE: &str = ".fleet/inventory.csv";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn fleet_dir(root: &Path) -> PathBuf {
    root.join(FLEET_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn default_inventory_path(root: &Path) -> PathBuf {
    root.join(INVENTORY_FILE)
}

/// Resolve a path from the config file: relative paths are taken from `root`.
pub fn resolve_from_root(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
