use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories_next::ProjectDirs;
use fieldconfig::FieldConfig;

pub const ENV_CONFIG_DIR: &str = "DRIFTFIELD_CONFIG_DIR";
pub const CONFIG_FILE: &str = "field.toml";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Driftfield";
const APPLICATION: &str = "driftfield";

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// `--config` or an explicit `config check FILE`.
    Explicit(PathBuf),
    /// `field.toml` under the override or platform config directory.
    Discovered(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::Explicit(path) | ConfigOrigin::Discovered(path) => {
                write!(f, "{}", path.display())
            }
            ConfigOrigin::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// Directory searched for `field.toml`: the env override, else the platform
/// config dir. `None` when neither can be determined.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(value) = env_override(ENV_CONFIG_DIR) {
        return Some(value);
    }
    ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Resolves which file (if any) supplies the configuration.
pub fn locate_config(explicit: Option<&Path>) -> ConfigOrigin {
    if let Some(path) = explicit {
        return ConfigOrigin::Explicit(path.to_path_buf());
    }
    match config_dir().map(|dir| dir.join(CONFIG_FILE)) {
        Some(path) if path.is_file() => ConfigOrigin::Discovered(path),
        _ => ConfigOrigin::Defaults,
    }
}

/// Loads and validates the configuration `locate_config` points at.
pub fn load_config(explicit: Option<&Path>) -> Result<(FieldConfig, ConfigOrigin)> {
    let origin = locate_config(explicit);
    let config = match &origin {
        ConfigOrigin::Explicit(path) | ConfigOrigin::Discovered(path) => read_config(path)?,
        ConfigOrigin::Defaults => FieldConfig::default(),
    };
    tracing::debug!(origin = %origin, seed = config.seed, "loaded field configuration");
    Ok((config, origin))
}

fn read_config(path: &Path) -> Result<FieldConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    FieldConfig::from_toml_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::{Mutex, OnceLock};
    use tempfile::TempDir;

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        key: &'static str,
        previous: Option<OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &Path) -> Self {
            let previous = env::var_os(key);
            env::set_var(key, value);
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = self.previous.take() {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    #[test]
    fn explicit_path_wins() {
        let origin = locate_config(Some(Path::new("/tmp/elsewhere.toml")));
        assert_eq!(
            origin,
            ConfigOrigin::Explicit(PathBuf::from("/tmp/elsewhere.toml"))
        );
    }

    #[test]
    fn env_dir_without_file_falls_back_to_defaults() {
        let _guard = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();
        let _env = EnvGuard::set(ENV_CONFIG_DIR, root.path());

        assert_eq!(config_dir().as_deref(), Some(root.path()));
        let (config, origin) = load_config(None).unwrap();
        assert_eq!(origin, ConfigOrigin::Defaults);
        assert_eq!(config.version, 1);
    }

    #[test]
    fn env_dir_file_is_discovered() {
        let _guard = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();
        let file = root.path().join(CONFIG_FILE);
        fs::write(&file, "version = 1\nseed = 99\n").unwrap();
        let _env = EnvGuard::set(ENV_CONFIG_DIR, root.path());

        let (config, origin) = load_config(None).unwrap();
        assert_eq!(origin, ConfigOrigin::Discovered(file));
        assert_eq!(config.seed, 99);
    }

    #[test]
    fn invalid_file_reports_its_path() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("broken.toml");
        fs::write(&file, "version = 2\n").unwrap();

        let err = load_config(Some(&file)).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }
}
