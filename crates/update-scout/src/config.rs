//! Configuration loading and validation.
//!
//! Settings come from a TOML file, overridden by `UPDATE_SCOUT_*`
//! environment variables. Every required setting is checked before any
//! network activity; all missing keys are reported together.

use crate::auth::LoginForm;
use crate::error::ConfigError;
use crate::navigator::{ClickRetryPolicy, NavigationTimeouts, UpdatePageLayout};
use crate::session::{PollPolicy, MAX_WAIT};
use crate::store::{WriteMode, UPDATE_INDEX};
use crate::types::Credentials;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "UPDATE_SCOUT_CONFIG";

/// Resolve the config file path.
///
/// Priority: explicit path, `UPDATE_SCOUT_CONFIG`, `./update-scout.toml`,
/// then `<config dir>/update-scout/config.toml`. Returns `None` when no
/// candidate exists, in which case the environment alone supplies settings.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }
    let cwd = PathBuf::from("update-scout.toml");
    if cwd.exists() {
        return Some(cwd);
    }
    dirs::config_dir()
        .map(|d| d.join("update-scout").join("config.toml"))
        .filter(|p| p.exists())
}

/// Settings as they appear in the file, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub target: RawTarget,
    pub browser: RawBrowser,
    pub store: RawStore,
    pub archive: RawArchive,
    pub navigation: RawNavigation,
    pub layout: RawLayout,
    pub extract: RawExtract,
    pub run_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawTarget {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawBrowser {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub debugger_url: Option<String>,
    pub accept_invalid_certs: bool,
    pub navigation_timeout_secs: u64,
}

impl Default for RawBrowser {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            debugger_url: None,
            accept_invalid_certs: false,
            navigation_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawStore {
    pub url: Option<String>,
    pub index: String,
    pub write_mode: WriteMode,
    pub create_index: bool,
    pub timeout_secs: u64,
}

impl Default for RawStore {
    fn default() -> Self {
        Self {
            url: None,
            index: UPDATE_INDEX.to_string(),
            write_mode: WriteMode::default(),
            create_index: true,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawArchive {
    pub download_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawNavigation {
    pub landing_timeout_secs: u64,
    pub table_timeout_secs: u64,
    pub settle_delay_secs: u64,
    pub click_max_attempts: u32,
    pub click_backoff_ms: u64,
    pub click_max_elapsed_secs: u64,
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    pub dialog_grace_ms: u64,
}

impl Default for RawNavigation {
    fn default() -> Self {
        Self {
            landing_timeout_secs: 500,
            table_timeout_secs: 500,
            settle_delay_secs: 10,
            click_max_attempts: 120,
            click_backoff_ms: 1000,
            click_max_elapsed_secs: 300,
            poll_initial_ms: 250,
            poll_max_ms: 5000,
            dialog_grace_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLayout {
    pub login: LoginForm,
    #[serde(flatten)]
    pub update_page: UpdatePageLayout,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawExtract {
    pub link_pattern: Option<String>,
}

/// Browser launch settings.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Attach to an already running browser instead of launching one.
    pub debugger_url: Option<String>,
    pub accept_invalid_certs: bool,
    pub navigation_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        let raw = RawBrowser::default();
        Self {
            executable: raw.executable,
            headless: raw.headless,
            debugger_url: raw.debugger_url,
            accept_invalid_certs: raw.accept_invalid_certs,
            navigation_timeout: Duration::from_secs(raw.navigation_timeout_secs),
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub url: Url,
    pub index: String,
    pub write_mode: WriteMode,
    pub create_index: bool,
    pub timeout: Duration,
}

/// Validated configuration for one discovery run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Console root, e.g. `https://10.0.0.1/`.
    pub console: Url,
    pub credentials: Credentials,
    pub browser: BrowserSettings,
    pub store: StoreSettings,
    pub download_dir: PathBuf,
    pub login_form: LoginForm,
    pub layout: UpdatePageLayout,
    pub click_retry: ClickRetryPolicy,
    pub timeouts: NavigationTimeouts,
    pub poll: PollPolicy,
    /// How long after submitting the login a warning dialog may appear.
    pub dialog_grace: Duration,
    pub link_pattern: Option<String>,
    pub run_log: Option<PathBuf>,
}

impl Config {
    /// Load from the resolved file (if any) plus the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let raw = match resolve_config_path(explicit) {
            Some(path) => RawConfig::from_file(&path)?,
            None => RawConfig::default(),
        };
        raw.with_env(|key| std::env::var(key).ok())?.validate()
    }

    /// Filesystem checks that need no network: the browser binary and the
    /// download directory must exist.
    pub fn preflight(&self) -> Result<(), ConfigError> {
        if self.browser.debugger_url.is_none() {
            if let Some(exe) = &self.browser.executable {
                if !exe.is_file() {
                    return Err(ConfigError::Invalid {
                        key: "browser.executable",
                        reason: format!("{} is not a file", exe.display()),
                    });
                }
            }
        }
        if !self.download_dir.is_dir() {
            return Err(ConfigError::Invalid {
                key: "archive.download_dir",
                reason: format!("{} is not a directory", self.download_dir.display()),
            });
        }
        Ok(())
    }
}

impl RawConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `UPDATE_SCOUT_*` overrides from an environment lookup.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("UPDATE_SCOUT_HOST") {
            self.target.host = Some(v);
        }
        if let Some(v) = lookup("UPDATE_SCOUT_USERNAME") {
            self.target.username = Some(v);
        }
        if let Some(v) = lookup("UPDATE_SCOUT_PASSWORD") {
            self.target.password = Some(v);
        }
        if let Some(v) = lookup("UPDATE_SCOUT_HEADLESS") {
            self.browser.headless = parse_bool(&v).ok_or_else(|| ConfigError::Invalid {
                key: "browser.headless",
                reason: format!("UPDATE_SCOUT_HEADLESS={v:?} is not a boolean"),
            })?;
        }
        if let Some(v) = lookup("UPDATE_SCOUT_BROWSER") {
            self.browser.executable = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("UPDATE_SCOUT_DEBUGGER_URL") {
            self.browser.debugger_url = Some(v);
        }
        if let Some(v) = lookup("UPDATE_SCOUT_STORE_URL") {
            self.store.url = Some(v);
        }
        if let Some(v) = lookup("UPDATE_SCOUT_DOWNLOAD_DIR") {
            self.archive.download_dir = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    pub fn validate(self) -> Result<Config, ConfigError> {
        let mut missing = Vec::new();
        let host = required(&mut missing, "target.host", self.target.host);
        let username = required(&mut missing, "target.username", self.target.username);
        // An empty password is accepted; only its absence is an error.
        let password = self.target.password;
        if password.is_none() {
            missing.push("target.password");
        }
        if self.browser.executable.is_none() && self.browser.debugger_url.is_none() {
            missing.push("browser.executable");
        }
        let store_url = required(&mut missing, "store.url", self.store.url);
        let download_dir = self.archive.download_dir;
        if download_dir.is_none() {
            missing.push("archive.download_dir");
        }

        let (Some(host), Some(username), Some(password), Some(store_url), Some(download_dir)) =
            (host, username, password, store_url, download_dir)
        else {
            return Err(ConfigError::Missing(missing));
        };

        let console = console_url(&host)?;
        let store_url = Url::parse(&store_url).map_err(|e| ConfigError::Invalid {
            key: "store.url",
            reason: e.to_string(),
        })?;
        if let Some(pattern) = &self.extract.link_pattern {
            regex::Regex::new(pattern).map_err(|e| ConfigError::Invalid {
                key: "extract.link_pattern",
                reason: e.to_string(),
            })?;
        }
        let nav = &self.navigation;
        if nav.click_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "navigation.click_max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        let day = MAX_WAIT.as_secs();
        let navigation_timeout =
            bounded("browser.navigation_timeout_secs", self.browser.navigation_timeout_secs, 1, day)?;
        let store_timeout = bounded("store.timeout_secs", self.store.timeout_secs, 1, day)?;
        let landing = bounded("navigation.landing_timeout_secs", nav.landing_timeout_secs, 0, day)?;
        let table = bounded("navigation.table_timeout_secs", nav.table_timeout_secs, 0, day)?;
        let settle = bounded("navigation.settle_delay_secs", nav.settle_delay_secs, 0, day)?;
        let click_backoff = bounded("navigation.click_backoff_ms", nav.click_backoff_ms, 0, day * 1000)?;
        let click_elapsed =
            bounded("navigation.click_max_elapsed_secs", nav.click_max_elapsed_secs, 0, day)?;
        let poll_initial = bounded("navigation.poll_initial_ms", nav.poll_initial_ms, 1, day * 1000)?;
        let poll_max = bounded("navigation.poll_max_ms", nav.poll_max_ms, poll_initial, day * 1000)?;
        let dialog_grace = bounded("navigation.dialog_grace_ms", nav.dialog_grace_ms, 0, day * 1000)?;

        Ok(Config {
            console,
            credentials: Credentials::new(username, password),
            browser: BrowserSettings {
                executable: self.browser.executable,
                headless: self.browser.headless,
                debugger_url: self.browser.debugger_url,
                accept_invalid_certs: self.browser.accept_invalid_certs,
                navigation_timeout: Duration::from_secs(navigation_timeout),
            },
            store: StoreSettings {
                url: store_url,
                index: self.store.index,
                write_mode: self.store.write_mode,
                create_index: self.store.create_index,
                timeout: Duration::from_secs(store_timeout),
            },
            download_dir,
            login_form: self.layout.login,
            layout: self.layout.update_page,
            click_retry: ClickRetryPolicy {
                max_attempts: nav.click_max_attempts,
                backoff: Duration::from_millis(click_backoff),
                max_elapsed: Duration::from_secs(click_elapsed),
            },
            timeouts: NavigationTimeouts {
                landing: Duration::from_secs(landing),
                table: Duration::from_secs(table),
                settle: Duration::from_secs(settle),
            },
            poll: PollPolicy {
                initial: Duration::from_millis(poll_initial),
                max: Duration::from_millis(poll_max),
            },
            dialog_grace: Duration::from_millis(dialog_grace),
            link_pattern: self.extract.link_pattern,
            run_log: self.run_log,
        })
    }
}

fn required(
    missing: &mut Vec<&'static str>,
    key: &'static str,
    value: Option<String>,
) -> Option<String> {
    let value = value.filter(|v| !v.trim().is_empty());
    if value.is_none() {
        missing.push(key);
    }
    value
}

fn bounded(key: &'static str, value: u64, min: u64, max: u64) -> Result<u64, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("{value} is outside {min}..={max}"),
        })
    }
}

/// Console root URL for a bare host (`10.0.0.1`) or a full URL.
fn console_url(host: &str) -> Result<Url, ConfigError> {
    let host = host.trim();
    let candidate = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}/")
    };
    let url = Url::parse(&candidate).map_err(|e| ConfigError::Invalid {
        key: "target.host",
        reason: format!("{host:?}: {e}"),
    })?;
    if url.host_str().is_none() {
        return Err(ConfigError::Invalid {
            key: "target.host",
            reason: format!("{host:?} has no host part"),
        });
    }
    Ok(url)
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Locator;
    use std::collections::HashMap;

    const FULL: &str = r#"
        run_log = "/var/log/update-scout/runs.jsonl"

        [target]
        host = "10.1.2.3"
        username = "admin"
        password = "admin"

        [browser]
        executable = "/usr/bin/chromium"
        headless = false

        [store]
        url = "http://localhost:9200"
        write_mode = "upsert_by_version"

        [archive]
        download_dir = "/srv/notes"

        [navigation]
        click_max_attempts = 10

        [layout]
        update_table = { by = "id", value = "ext-gen500-gp-type-anti-virus-bd" }

        [layout.login]
        username = { by = "css", value = "input[name=user]" }
    "#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_full_file() {
        let config = RawConfig::from_toml(FULL)
            .unwrap()
            .with_env(no_env)
            .unwrap()
            .validate()
            .unwrap();

        assert_eq!(config.console.as_str(), "https://10.1.2.3/");
        assert_eq!(config.credentials.username, "admin");
        assert!(!config.browser.headless);
        assert_eq!(config.store.index, "update-details");
        assert_eq!(config.store.write_mode, WriteMode::UpsertByVersion);
        assert_eq!(config.click_retry.max_attempts, 10);
        assert_eq!(config.click_retry.backoff, Duration::from_secs(1));
        assert_eq!(config.timeouts.landing, Duration::from_secs(500));
        assert_eq!(
            config.layout.update_table,
            Locator::id("ext-gen500-gp-type-anti-virus-bd")
        );
        assert_eq!(config.layout.section_tab, Locator::id("device"));
        assert_eq!(config.login_form.username, Locator::css("input[name=user]"));
        assert_eq!(config.login_form.password, Locator::id("passwd"));
        assert_eq!(
            config.run_log.as_deref(),
            Some(Path::new("/var/log/update-scout/runs.jsonl"))
        );
    }

    #[test]
    fn test_missing_settings_reported_together() {
        let err = RawConfig::from_toml("[target]\nhost = \"fw\"\n")
            .unwrap()
            .validate()
            .unwrap_err();
        match err {
            ConfigError::Missing(keys) => assert_eq!(
                keys,
                vec![
                    "target.username",
                    "target.password",
                    "browser.executable",
                    "store.url",
                    "archive.download_dir",
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_environment_only() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("UPDATE_SCOUT_HOST", "https://fw.example.net:4443"),
            ("UPDATE_SCOUT_USERNAME", "scout"),
            ("UPDATE_SCOUT_PASSWORD", "pw"),
            ("UPDATE_SCOUT_DEBUGGER_URL", "ws://127.0.0.1:9222/devtools/browser/abc"),
            ("UPDATE_SCOUT_HEADLESS", "no"),
            ("UPDATE_SCOUT_STORE_URL", "http://es:9200"),
            ("UPDATE_SCOUT_DOWNLOAD_DIR", "/tmp/notes"),
        ]);
        let config = RawConfig::default()
            .with_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap()
            .validate()
            .unwrap();

        assert_eq!(config.console.as_str(), "https://fw.example.net:4443/");
        assert!(config.browser.executable.is_none());
        assert!(!config.browser.headless);
        assert_eq!(config.download_dir, PathBuf::from("/tmp/notes"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let config = RawConfig::from_toml(FULL)
            .unwrap()
            .with_env(|k| (k == "UPDATE_SCOUT_HOST").then(|| "192.168.1.1".to_string()))
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(config.console.as_str(), "https://192.168.1.1/");
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = RawConfig::default()
            .with_env(|k| (k == "UPDATE_SCOUT_HEADLESS").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "browser.headless", .. }));

        let bad_pattern = FULL.replace("[navigation]", "[extract]\nlink_pattern = \"(\"\n\n[navigation]");
        let err = RawConfig::from_toml(&bad_pattern)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "extract.link_pattern", .. }));
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        let cases = [
            ("landing_timeout_secs = 9223372036854775807", "navigation.landing_timeout_secs"),
            ("click_backoff_ms = 9223372036854775807", "navigation.click_backoff_ms"),
            ("poll_initial_ms = 0", "navigation.poll_initial_ms"),
            ("poll_initial_ms = 500\npoll_max_ms = 100", "navigation.poll_max_ms"),
        ];
        for (line, key) in cases {
            let toml = FULL.replace("click_max_attempts = 10", line);
            let err = RawConfig::from_toml(&toml).unwrap().validate().unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { key: k, .. } if *k == key),
                "{line}: {err}"
            );
        }

        let toml = FULL.replace("[store]", "[store]\ntimeout_secs = 0");
        let err = RawConfig::from_toml(&toml).unwrap().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "store.timeout_secs", .. }));
    }

    #[test]
    fn test_navigation_defaults() {
        let config = RawConfig::from_toml(FULL).unwrap().validate().unwrap();
        assert_eq!(config.timeouts.settle, Duration::from_secs(10));
        assert_eq!(config.dialog_grace, Duration::from_secs(3));
        assert_eq!(config.poll, PollPolicy::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(
            RawConfig::from_toml("[target]\nhots = \"fw\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_preflight_checks_download_dir() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("chrome");
        std::fs::write(&exe, "").unwrap();

        let mut config = RawConfig::from_toml(FULL)
            .unwrap()
            .validate()
            .unwrap();
        config.browser.executable = Some(exe);
        config.download_dir = dir.path().join("missing");
        assert!(matches!(
            config.preflight(),
            Err(ConfigError::Invalid { key: "archive.download_dir", .. })
        ));

        config.download_dir = dir.path().to_path_buf();
        assert!(config.preflight().is_ok());
    }
}
