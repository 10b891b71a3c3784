//! Error types for every stage of a discovery run.

use std::path::PathBuf;
use std::time::Duration;

use crate::driver::Locator;

/// A version string that is not of the form `NNNN-NNNN`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid update version: {0:?}")]
pub struct InvalidVersion(pub String);

/// Failures reported by a UI driver.
#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("element not found: {0}")]
    NotFound(Locator),

    #[error("click on {target} intercepted by <{by}>")]
    ClickIntercepted { target: Locator, by: String },

    #[error("failed to start browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("unexpected script result: {0}")]
    Script(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Failures while logging in to the console.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("login form field missing: {0}")]
    FieldNotFound(Locator),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Failures while reaching the update table.
#[derive(thiserror::Error, Debug)]
pub enum NavigationError {
    #[error("expected page element missing: {0}")]
    ElementNotFound(Locator),

    #[error("click on {target} still intercepted after {attempts} attempts ({elapsed:?})")]
    ClickNeverSucceeded {
        target: Locator,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("update table {table} not populated after {waited:?}")]
    TableNotReady { table: Locator, waited: Duration },

    #[error(transparent)]
    Driver(DriverError),
}

impl From<DriverError> for NavigationError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::NotFound(locator) => NavigationError::ElementNotFound(locator),
            other => NavigationError::Driver(other),
        }
    }
}

/// The part of an update row that failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowField {
    Date,
    Timezone,
    Version,
    DownloadLink,
}

impl std::fmt::Display for RowField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RowField::Date => "date",
            RowField::Timezone => "timezone",
            RowField::Version => "version",
            RowField::DownloadLink => "download link",
        })
    }
}

/// Failures while reading the update table.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("update table has no rows")]
    NoUpdatesFound,

    #[error("row {row} has no parseable {field}")]
    MalformedRow { row: usize, field: RowField },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Failures while writing to the document store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("document store unreachable: {0}")]
    Unreachable(String),

    #[error("document store rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to encode document: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Unreachable(e.to_string())
    }
}

/// Failures while archiving release notes.
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("failed to load release notes: {0}")]
    Fetch(DriverError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// The stage of a discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Login,
    Navigate,
    Extract,
    Persist,
    Archive,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Login => "login",
            Stage::Navigate => "navigate",
            Stage::Extract => "extract",
            Stage::Persist => "persist",
            Stage::Archive => "archive",
        })
    }
}

/// A discovery run that terminated early.
#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("navigation failed: {0}")]
    Navigation(#[from] NavigationError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("archive failed: {0}")]
    Archive(#[from] ArchiveError),
}

impl DiscoveryError {
    pub fn stage(&self) -> Stage {
        match self {
            DiscoveryError::Authentication(_) => Stage::Login,
            DiscoveryError::Navigation(_) => Stage::Navigate,
            DiscoveryError::Extraction(_) => Stage::Extract,
            DiscoveryError::Persistence(_) => Stage::Persist,
            DiscoveryError::Archive(_) => Stage::Archive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_becomes_element_not_found() {
        let err: NavigationError = DriverError::NotFound(Locator::id("device")).into();
        assert!(matches!(err, NavigationError::ElementNotFound(l) if l == Locator::id("device")));

        let err: NavigationError = DriverError::Protocol("gone".into()).into();
        assert!(matches!(err, NavigationError::Driver(_)));
    }

    #[test]
    fn test_missing_lists_every_key() {
        let err = ConfigError::Missing(vec!["target.host", "store.url"]);
        assert_eq!(err.to_string(), "missing required settings: target.host, store.url");
    }

    #[test]
    fn test_discovery_error_stage() {
        let err: DiscoveryError = ExtractError::NoUpdatesFound.into();
        assert_eq!(err.stage(), Stage::Extract);
        let err: DiscoveryError = StoreError::Unreachable("refused".into()).into();
        assert_eq!(err.stage(), Stage::Persist);
    }
}
