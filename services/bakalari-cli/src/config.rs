//! Configuration types and loading
//!
//! The password is never read from the TOML itself: it comes from the
//! BAKALARI_PASSWORD env var or from `password_file`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub account: AccountConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// School server base URL
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// File holding the password (alternative to BAKALARI_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from a TOML file and resolve the password.
    ///
    /// Password resolution order:
    /// 1. BAKALARI_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| common::Error::read_file(path, e))?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.server.url.starts_with("http://") && !config.server.url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "server.url must start with http:// or https://, got: {}",
                config.server.url
            )));
        }

        if config.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "server.timeout_secs must be greater than 0".into(),
            ));
        }

        if let Ok(password) = std::env::var("BAKALARI_PASSWORD") {
            config.account.password = Some(Secret::new(password));
        } else if let Some(ref password_file) = config.account.password_file {
            let password = std::fs::read_to_string(password_file)
                .map_err(|e| common::Error::read_file(password_file, e))?;
            let password = password.trim().to_owned();
            if !password.is_empty() {
                config.account.password = Some(Secret::new(password));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("bakalari.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch BAKALARI_PASSWORD / CONFIG_PATH.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("bakalari.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    const VALID: &str = r#"
[server]
url = "https://bakalari.example.cz"

[account]
username = "student"
"#;

    #[test]
    fn loads_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("BAKALARI_PASSWORD") };
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load(&write_config(&dir, VALID)).unwrap();

        assert_eq!(config.server.url, "https://bakalari.example.cz");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.account.username.as_deref(), Some("student"));
        assert!(config.account.password.is_none());
    }

    #[test]
    fn account_section_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write_config(
            &dir,
            "[server]\nurl = \"http://localhost:8080\"\ntimeout_secs = 3\n",
        ))
        .unwrap();
        assert!(config.account.username.is_none());
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn rejects_non_http_url() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&write_config(&dir, "[server]\nurl = \"ftp://school\"\n"))
            .unwrap_err();
        assert!(err.to_string().contains("server.url"), "got: {err}");
    }

    #[test]
    fn rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&write_config(
            &dir,
            "[server]\nurl = \"https://school\"\ntimeout_secs = 0\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("timeout_secs"), "got: {err}");
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = Config::load(Path::new("/nonexistent/bakalari.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/bakalari.toml"), "got: {err}");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&write_config(&dir, "not valid {{{{ toml")).unwrap_err();
        assert!(matches!(err, common::Error::Toml(_)));
    }

    #[test]
    fn password_from_file_is_trimmed() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("BAKALARI_PASSWORD") };
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("password");
        std::fs::write(&secret, "hunter2\n").unwrap();

        let path = write_config(
            &dir,
            &format!(
                "[server]\nurl = \"https://school\"\n\n[account]\nusername = \"student\"\npassword_file = \"{}\"\n",
                secret.display()
            ),
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.account.password.as_ref().unwrap().expose(), "hunter2");
    }

    #[test]
    fn empty_password_file_means_no_password() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("BAKALARI_PASSWORD") };
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("password");
        std::fs::write(&secret, "  \n").unwrap();

        let path = write_config(
            &dir,
            &format!(
                "[server]\nurl = \"https://school\"\n\n[account]\npassword_file = \"{}\"\n",
                secret.display()
            ),
        );
        assert!(Config::load(&path).unwrap().account.password.is_none());
    }

    #[test]
    fn env_password_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("password");
        std::fs::write(&secret, "from-file").unwrap();
        let path = write_config(
            &dir,
            &format!(
                "[server]\nurl = \"https://school\"\n\n[account]\npassword_file = \"{}\"\n",
                secret.display()
            ),
        );

        unsafe { set_env("BAKALARI_PASSWORD", "from-env") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("BAKALARI_PASSWORD") };

        assert_eq!(config.account.password.as_ref().unwrap().expose(), "from-env");
    }

    #[test]
    fn resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("bakalari.toml"));

        unsafe { set_env("CONFIG_PATH", "/env/bakalari.toml") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("/env/bakalari.toml"));
        assert_eq!(
            Config::resolve_path(Some("/cli/wins.toml")),
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
