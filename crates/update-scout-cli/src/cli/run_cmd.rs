//! The default command: one full discovery run.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::json;

use update_scout::{
    ChromiumDriver, Config, DiscoveryError, DriverSession, ElasticStore, RunEntry, RunLog,
    RunReport, Scout,
};

pub async fn run(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = Config::load(config_path).context("loading configuration")?;
    config.preflight()?;

    let store = ElasticStore::new(
        config.store.url.clone(),
        config.store.index.clone(),
        config.store.timeout,
    )?;
    let driver = ChromiumDriver::start(&config.browser)
        .await
        .context("starting browser")?;
    let session = DriverSession::new(Box::new(driver));
    let mut scout = Scout::from_config(&config, session, Arc::new(store))?;

    let started = Instant::now();
    let result = scout.run().await;
    let entry = run_entry(&config, &scout, &result, started);

    if let Err(e) = scout.close().await {
        tracing::warn!("failed to close browser: {e}");
    }
    if let Some(path) = &config.run_log {
        if let Err(e) = RunLog::open(path).and_then(|mut log| log.append(&entry)) {
            tracing::warn!(path = %path.display(), "failed to write run log: {e}");
        }
    }

    match result {
        Ok(report) => {
            print_report(&report, json)?;
            Ok(())
        }
        Err(e) => {
            if json {
                let out = json!({
                    "ok": false,
                    "stage": e.stage(),
                    "error": e.to_string(),
                    "version": entry.version,
                    "document_id": entry.document_id,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            Err(e.into())
        }
    }
}

fn run_entry(
    config: &Config,
    scout: &Scout,
    result: &Result<RunReport, DiscoveryError>,
    started: Instant,
) -> RunEntry {
    let mut entry = RunEntry::now(config.console.host_str().unwrap_or_default());
    entry.duration_ms = started.elapsed().as_millis() as u64;
    entry.version = scout.latest().map(|r| r.version.to_string());
    entry.document_id = scout.stored().map(|d| d.id.clone());
    match result {
        Ok(report) => {
            entry.ok = true;
            entry.archive_path = Some(report.archive_path.display().to_string());
        }
        Err(e) => {
            entry.failed_stage = Some(e.stage());
            entry.error = Some(e.to_string());
        }
    }
    entry
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let mut out = serde_json::to_value(report)?;
        out["ok"] = json!(true);
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Latest update:  {}", report.record.version);
    println!("Released:       {}", report.record.stamp);
    println!("Release notes:  {}", report.record.download_link);
    println!("Stored as:      {}", report.document.id);
    println!("Archived to:    {}", report.archive_path.display());
    if !report.navigation.table_refreshed {
        println!("(update table did not change after Check Now)");
    }
    if report.navigation.check_now_attempts > 1 {
        println!(
            "(Check Now needed {} clicks)",
            report.navigation.check_now_attempts
        );
    }
    Ok(())
}
