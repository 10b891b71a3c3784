//! Environment readiness check.

use std::path::Path;

use anyhow::{bail, Result};
use serde::Serialize;

use update_scout::config::Config;
use update_scout::driver::chromium::find_chromium;
use update_scout::error::ConfigError;
use update_scout::ElasticStore;

#[derive(Serialize)]
struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
}

impl Check {
    fn new(name: &'static str, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok,
            detail: detail.into(),
        }
    }
}

/// Validate configuration, browser binary, download directory and store
/// reachability without touching the console.
pub async fn run(config_path: Option<&Path>, json: bool) -> Result<()> {
    let checks = collect(config_path).await;
    let ready = checks.iter().all(|c| c.ok);

    if json {
        let out = serde_json::json!({ "ready": ready, "checks": checks });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("update-scout doctor");
        println!("===================");
        println!();
        for check in &checks {
            let mark = if check.ok { "[OK]" } else { "[!!]" };
            println!("{mark} {}: {}", check.name, check.detail);
        }
        println!();
        println!("Status: {}", if ready { "READY" } else { "NOT READY" });
    }

    if !ready {
        bail!("{} check(s) failed", checks.iter().filter(|c| !c.ok).count());
    }
    Ok(())
}

async fn collect(config_path: Option<&Path>) -> Vec<Check> {
    let mut checks = Vec::new();

    let config = match Config::load(config_path) {
        Ok(config) => {
            checks.push(Check::new("config", true, format!("console {}", config.console)));
            config
        }
        Err(e) => {
            if let ConfigError::Missing(keys) = &e {
                if keys.contains(&"browser.executable") {
                    if let Some(found) = find_chromium() {
                        checks.push(Check::new(
                            "browser",
                            false,
                            format!("set browser.executable; found {}", found.display()),
                        ));
                    }
                }
            }
            checks.insert(0, Check::new("config", false, e.to_string()));
            return checks;
        }
    };

    checks.push(match (&config.browser.debugger_url, &config.browser.executable) {
        (Some(url), _) => Check::new("browser", true, format!("attaching to {url}")),
        (None, Some(exe)) if exe.is_file() => Check::new("browser", true, exe.display().to_string()),
        (None, Some(exe)) => Check::new("browser", false, format!("{} is not a file", exe.display())),
        (None, None) => Check::new("browser", false, "no executable configured"),
    });

    let dir = &config.download_dir;
    checks.push(if dir.is_dir() {
        Check::new("download_dir", true, dir.display().to_string())
    } else {
        Check::new("download_dir", false, format!("{} is not a directory", dir.display()))
    });

    let store = ElasticStore::new(
        config.store.url.clone(),
        config.store.index.clone(),
        config.store.timeout,
    );
    checks.push(match store {
        Ok(store) => match store.ping().await {
            Ok(version) => Check::new(
                "store",
                true,
                format!("{} (version {version}, index {})", config.store.url, store.index()),
            ),
            Err(e) => Check::new("store", false, format!("{}: {e}", config.store.url)),
        },
        Err(e) => Check::new("store", false, e.to_string()),
    });

    checks
}
