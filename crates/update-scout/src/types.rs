//! Core data types for discovered updates and stored version documents.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::InvalidVersion;

/// Login credentials for the administrative console.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An update version of the form `NNNN-NNNN`, e.g. `3009-3519`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UpdateVersion(String);

impl UpdateVersion {
    /// Separator between the two numeric segments.
    pub const SEPARATOR: char = '-';

    pub fn parse(raw: &str) -> Result<Self, InvalidVersion> {
        let well_formed = raw.split_once(Self::SEPARATOR).is_some_and(|(major, minor)| {
            major.len() == 4
                && minor.len() == 4
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        });
        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidVersion(raw.to_string()))
        }
    }

    /// The segment preceding the separator (`3009` for `3009-3519`).
    pub fn short(&self) -> &str {
        self.0
            .split(Self::SEPARATOR)
            .next()
            .unwrap_or(self.0.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpdateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UpdateVersion {
    type Error = InvalidVersion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UpdateVersion> for String {
    fn from(v: UpdateVersion) -> Self {
        v.0
    }
}

/// One row of the update table, as seen during a single extraction pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateRecord {
    /// The date exactly as rendered, e.g. `2019/06/14 04:02:07 PDT`.
    ///
    /// Fixed-width and zero-padded, so comparing stamps as strings orders
    /// them chronologically (for rows sharing a timezone).
    pub stamp: String,
    /// The stamp resolved to an absolute point in time.
    pub date: DateTime<FixedOffset>,
    pub version: UpdateVersion,
    pub download_link: Url,
}

/// Update metadata stored in the `update-details` index.
///
/// `analyzed` starts out `false`; the release-notes analysis job flips it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDocument {
    pub id: String,
    #[serde(rename = "shortversion")]
    pub short_version: String,
    pub version: String,
    pub date: DateTime<FixedOffset>,
    pub analyzed: bool,
}

impl VersionDocument {
    pub fn from_record(id: impl Into<String>, record: &UpdateRecord) -> Self {
        Self {
            id: id.into(),
            short_version: record.version.short().to_string(),
            version: record.version.to_string(),
            date: record.date,
            analyzed: false,
        }
    }
}
