use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "prism";
const DB_FILE: &str = "database.db";

/// `<data dir>/prism/database.db`, next to the other per-user application data.
pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR).join(DB_FILE))
}

/// Picks the database file and makes sure its directory exists.
pub fn resolve_db_path(explicit: Option<&Path>) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => std::env::current_dir()
            .context("Failed to read current directory")?
            .join(path),
        None => default_db_path()
            .context("No data directory on this platform; pass --db or set PRISM_DB_PATH")?,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_absolute_path_is_kept_and_parent_created() {
        let dir = tempfile::tempdir().expect("temp dir");
        let wanted = dir.path().join("nested").join("profile.db");

        let resolved = resolve_db_path(Some(&wanted)).expect("resolve");
        assert_eq!(resolved, wanted);
        assert!(wanted.parent().expect("parent").is_dir());
        assert!(!wanted.exists());
    }

    #[test]
    fn relative_path_is_anchored_at_the_working_directory() {
        let resolved = resolve_db_path(Some(Path::new("profile.db"))).expect("resolve");
        let cwd = std::env::current_dir().expect("cwd");
        assert_eq!(resolved, cwd.join("profile.db"));
    }

    #[test]
    fn default_path_lives_under_the_app_directory() {
        if let Some(path) = default_db_path() {
            assert!(path.ends_with(Path::new("prism").join("database.db")));
        }
    }
}
