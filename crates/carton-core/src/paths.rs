use dirs::home_dir;
use std::path::PathBuf;

/// Returns the carton home directory (`~/.carton`), or None if the user's home
/// cannot be resolved. `CARTON_HOME` overrides it.
pub fn try_carton_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("CARTON_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".carton"))
}

/// Cache path: ~/.carton/cache
pub fn cache_path() -> Option<PathBuf> {
    try_carton_home().map(|home| home.join("cache"))
}

/// Default runtime workspace: ~/.carton/cache/runtime
pub fn runtime_cache_path() -> Option<PathBuf> {
    cache_path().map(|cache| cache.join("runtime"))
}
