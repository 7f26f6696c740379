use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

/// Full path of the configuration file to load.
pub const ENV_CONFIG: &str = "LEDSHADER_CONFIG";
pub const ENV_CONFIG_DIR: &str = "LEDSHADER_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "ledshader";
const APPLICATION: &str = "ledshader";
const CONFIG_FILE: &str = "config.toml";

/// Where the configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    /// Set when the user named the file; a missing explicit file is an error.
    pub explicit: bool,
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        if let Some(dir) = env_override(ENV_CONFIG_DIR) {
            return Ok(Self { config_dir: dir });
        }
        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self {
            config_dir: project_dirs.config_dir().to_path_buf(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// CLI flag first, then `LEDSHADER_CONFIG`, then `<config dir>/config.toml`.
    pub fn config_location(&self, cli: Option<&Path>) -> ConfigLocation {
        if let Some(path) = cli {
            return ConfigLocation {
                path: path.to_path_buf(),
                explicit: true,
            };
        }
        if let Some(path) = env_override(ENV_CONFIG) {
            return ConfigLocation { path, explicit: true };
        }
        ConfigLocation {
            path: self.config_dir.join(CONFIG_FILE),
            explicit: false,
        }
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
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

        fn clear(key: &'static str) -> Self {
            let previous = env::var_os(key);
            env::remove_var(key);
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
    fn env_overrides_take_precedence() {
        let _guard = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();
        let config_dir = root.path().join("config");
        let config_file = root.path().join("custom.toml");

        let _dir_guard = EnvGuard::set(ENV_CONFIG_DIR, &config_dir);
        let _file_guard = EnvGuard::set(ENV_CONFIG, &config_file);

        let paths = AppPaths::discover().unwrap();
        assert_eq!(paths.config_dir(), config_dir.as_path());
        assert_eq!(
            paths.config_location(None),
            ConfigLocation {
                path: config_file,
                explicit: true
            }
        );
        let cli = root.path().join("cli.toml");
        assert_eq!(paths.config_location(Some(&cli)).path, cli);
    }

    #[test]
    fn default_location_is_inside_config_dir() {
        let _guard = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();
        let _dir_guard = EnvGuard::set(ENV_CONFIG_DIR, root.path());
        let _file_guard = EnvGuard::clear(ENV_CONFIG);

        let location = AppPaths::discover().unwrap().config_location(None);
        assert_eq!(location.path, root.path().join("config.toml"));
        assert!(!location.explicit);
    }
}
