//! Parse update table rows into records and pick the newest one.
//!
//! Each row's visible text carries the release date and the version; the
//! release-notes link sits in an attribute, so it is matched against the raw
//! markup. A row missing any of the three means the console layout changed,
//! and the whole extraction fails rather than guessing.

use crate::driver::Locator;
use crate::error::{ExtractError, RowField};
use crate::session::DriverSession;
use crate::types::{UpdateRecord, UpdateVersion};
use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use regex::Regex;
use scraper::Html;
use url::Url;

/// Release-notes link template used by the antivirus update table.
pub const DEFAULT_LINK_PATTERN: &str = r"https://downloads\.paloaltonetworks\.com/virus/AntiVirusExternal-[0-9]*\.html\?__gda__=[0-9]*_[a-z0-9]*";

const DATE_PATTERN: &str =
    r"(?P<stamp>[0-9]{4}/[0-9]{2}/[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}) (?P<tz>[A-Z]{2,5})\b";
const VERSION_PATTERN: &str = r"\b[0-9]{4}-[0-9]{4}\b";
const STAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// UTC offset in hours for the timezone abbreviations consoles print.
fn utc_offset_hours(abbrev: &str) -> Option<i32> {
    Some(match abbrev {
        "UTC" | "GMT" => 0,
        "PST" => -8,
        "PDT" | "MST" => -7,
        "MDT" | "CST" => -6,
        "CDT" | "EST" => -5,
        "EDT" => -4,
        "AKST" => -9,
        "AKDT" => -8,
        "HST" => -10,
        "CET" => 1,
        "CEST" => 2,
        "JST" => 9,
        _ => return None,
    })
}

#[derive(Debug, Clone)]
pub struct VersionExtractor {
    date: Regex,
    version: Regex,
    link: Regex,
}

impl Default for VersionExtractor {
    fn default() -> Self {
        Self::with_link_pattern(DEFAULT_LINK_PATTERN)
            .unwrap_or_else(|e| unreachable!("built-in link pattern is valid: {e}"))
    }
}

impl VersionExtractor {
    /// Extractor that recognises release-notes links with a custom pattern.
    pub fn with_link_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            date: Regex::new(DATE_PATTERN)?,
            version: Regex::new(VERSION_PATTERN)?,
            link: Regex::new(pattern)?,
        })
    }

    /// Read every row of the update table and return the newest record.
    pub async fn extract_latest(
        &self,
        session: &DriverSession,
        table: &Locator,
    ) -> Result<UpdateRecord, ExtractError> {
        let rows = session.driver().children_html(table).await?;
        tracing::debug!(rows = rows.len(), %table, "read update table");
        let latest = self.select_latest(&rows)?;
        tracing::info!(
            version = %latest.version,
            date = %latest.stamp,
            "latest update found"
        );
        Ok(latest)
    }

    /// The record with the greatest date stamp. On equal stamps the earlier
    /// row wins.
    pub fn select_latest<S: AsRef<str>>(&self, rows: &[S]) -> Result<UpdateRecord, ExtractError> {
        let mut latest: Option<UpdateRecord> = None;
        for (index, markup) in rows.iter().enumerate() {
            let record = self.parse_row(index, markup.as_ref())?;
            if latest.as_ref().map_or(true, |best| best.stamp < record.stamp) {
                latest = Some(record);
            }
        }
        latest.ok_or(ExtractError::NoUpdatesFound)
    }

    /// Parse one row's inner markup.
    pub fn parse_row(&self, index: usize, markup: &str) -> Result<UpdateRecord, ExtractError> {
        let malformed = |field| ExtractError::MalformedRow { row: index, field };

        let text = row_text(markup);

        let date = self.date.captures(&text).ok_or_else(|| malformed(RowField::Date))?;
        let stamp = &date["stamp"];
        let tz = &date["tz"];
        let naive = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
            .map_err(|_| malformed(RowField::Date))?;
        let offset = utc_offset_hours(tz)
            .and_then(|h| FixedOffset::east_opt(h * 3600))
            .ok_or_else(|| malformed(RowField::Timezone))?;
        let at = offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| malformed(RowField::Date))?;

        let version = self
            .version
            .find(&text)
            .and_then(|m| UpdateVersion::parse(m.as_str()).ok())
            .ok_or_else(|| malformed(RowField::Version))?;

        let download_link = self
            .link
            .find(markup)
            .and_then(|m| Url::parse(m.as_str()).ok())
            .ok_or_else(|| malformed(RowField::DownloadLink))?;

        Ok(UpdateRecord {
            stamp: date[0].to_string(),
            date: at,
            version,
            download_link,
        })
    }
}

/// Visible text of a row's inner markup, one space between text nodes.
///
/// A `<tr>`'s inner markup is a run of bare `<td>` cells. Parsed in body
/// context the cell tags are dropped and neighbouring cell texts fuse, so
/// the markup is parsed inside a table row instead.
fn row_text(markup: &str) -> String {
    let wrapped = format!("<table><tbody><tr>{markup}</tr></tbody></table>");
    let fragment = Html::parse_fragment(&wrapped);
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
