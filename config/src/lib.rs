//! Load configuration for the assistant from XDG `config.toml` and a project `.env`,
//! then apply it to the process environment with priority: **existing env > .env > XDG**.
//!
//! The typed, immutable settings snapshot lives in the core crate; this crate only
//! layers key/value sources into the environment so that snapshot sees one surface.

mod dotenv;
mod xdg_toml;

#[cfg(feature = "tracing-init")]
mod tracing_init;

#[cfg(feature = "tracing-init")]
pub use tracing_init::init_tracing;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("xdg config path: {0}")]
    XdgPath(String),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads config from XDG `config.toml` and an optional project `.env`, then sets environment
/// variables only for keys that are **not** already set, so existing env has highest priority.
///
/// Order of precedence when a key is missing in the process environment:
/// 1. Value from project `.env` (current directory, or `override_dir` when given)
/// 2. Value from `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]` table
///
/// * `app_name`: e.g. `"valet"` for `~/.config/valet/config.toml`.
/// * `override_dir`: when `Some`, look for `.env` there instead of `std::env::current_dir()`.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg_toml::load_env_map(app_name)?;
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<String> = xdg_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue; // existing env wins
        }
        let value = dotenv_map.get(&key).or_else(|| xdg_map.get(&key)).cloned();
        if let Some(v) = value {
            std::env::set_var(&key, v);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn restore_var(key: &str, prev: Option<String>) {
        match prev {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    #[test]
    fn existing_env_wins_over_files() {
        env::set_var("VALET_CONF_TEST_EXISTING", "from_env");
        let _ = load_and_apply("valet", None);
        assert_eq!(
            env::var("VALET_CONF_TEST_EXISTING").as_deref(),
            Ok("from_env")
        );
        env::remove_var("VALET_CONF_TEST_EXISTING");
    }

    #[test]
    fn no_config_anywhere_is_ok() {
        let r = load_and_apply("valet-test-app-without-config", None::<&std::path::Path>);
        assert!(r.is_ok());
    }

    #[test]
    fn dotenv_beats_xdg() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("valet");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nVALET_CONF_TEST_PRIO = \"from_xdg\"\n",
        )
        .unwrap();

        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dotenv_dir.path().join(".env"),
            "VALET_CONF_TEST_PRIO=from_dotenv\n",
        )
        .unwrap();

        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        env::remove_var("VALET_CONF_TEST_PRIO");

        let _ = load_and_apply("valet", Some(dotenv_dir.path()));
        let val = env::var("VALET_CONF_TEST_PRIO").unwrap();
        env::remove_var("VALET_CONF_TEST_PRIO");
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert_eq!(val, "from_dotenv");
    }

    #[test]
    fn xdg_applies_when_dotenv_missing() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("valet");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nVALET_CONF_TEST_XDG = \"from_xdg\"\n",
        )
        .unwrap();

        let empty_dir = tempfile::tempdir().unwrap();

        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        env::remove_var("VALET_CONF_TEST_XDG");

        let _ = load_and_apply("valet", Some(empty_dir.path()));
        let val = env::var("VALET_CONF_TEST_XDG").unwrap();
        env::remove_var("VALET_CONF_TEST_XDG");
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert_eq!(val, "from_xdg");
    }

    #[test]
    fn broken_xdg_toml_is_a_parse_error() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("valet");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), "broken [[[\n").unwrap();

        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());

        let result = load_and_apply("valet", None::<&std::path::Path>);
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert!(matches!(result, Err(LoadError::XdgParse(_))));
    }
}
