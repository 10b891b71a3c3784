//! The discovery run: login, navigate, extract, persist, archive.
//!
//! Stages run strictly in order and the first failure ends the run. Each
//! `Scout` owns its browser session; nothing is shared between instances.

use crate::auth::{Authenticator, LoginOutcome};
use crate::config::Config;
use crate::error::{ConfigError, DiscoveryError, Stage};
use crate::extract::VersionExtractor;
use crate::navigator::{NavigationReport, UpdatePageNavigator};
use crate::persist::RecordPersister;
use crate::session::DriverSession;
use crate::store::DocumentStore;
use crate::types::{Credentials, UpdateRecord, VersionDocument};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub login: LoginOutcome,
    pub navigation: NavigationReport,
    pub record: UpdateRecord,
    pub document: VersionDocument,
    pub archive_path: PathBuf,
}

pub struct Scout {
    session: DriverSession,
    console: Url,
    credentials: Credentials,
    auth: Authenticator,
    navigator: UpdatePageNavigator,
    extractor: VersionExtractor,
    persister: RecordPersister,
    latest: Option<UpdateRecord>,
    stored: Option<VersionDocument>,
}

impl Scout {
    pub fn new(
        session: DriverSession,
        console: Url,
        credentials: Credentials,
        persister: RecordPersister,
    ) -> Self {
        Self {
            session,
            console,
            credentials,
            auth: Authenticator::default(),
            navigator: UpdatePageNavigator::default(),
            extractor: VersionExtractor::default(),
            persister,
            latest: None,
            stored: None,
        }
    }

    /// Wire a scout from validated configuration. The session's driver is
    /// supplied by the caller so the browser backend stays swappable.
    pub fn from_config(
        config: &Config,
        session: DriverSession,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, ConfigError> {
        let extractor = match &config.link_pattern {
            Some(pattern) => {
                VersionExtractor::with_link_pattern(pattern).map_err(|e| ConfigError::Invalid {
                    key: "extract.link_pattern",
                    reason: e.to_string(),
                })?
            }
            None => VersionExtractor::default(),
        };
        let persister = RecordPersister::new(store, &config.download_dir)
            .with_mode(config.store.write_mode)
            .with_create_index(config.store.create_index);

        Ok(Self::new(
            session.with_poll(config.poll),
            config.console.clone(),
            config.credentials.clone(),
            persister,
        )
        .with_authenticator(
            Authenticator::new(config.login_form.clone()).with_dialog_grace(config.dialog_grace),
        )
        .with_navigator(UpdatePageNavigator::new(
            config.layout.clone(),
            config.click_retry,
            config.timeouts,
        ))
        .with_extractor(extractor))
    }

    pub fn with_authenticator(mut self, auth: Authenticator) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_navigator(mut self, navigator: UpdatePageNavigator) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_extractor(mut self, extractor: VersionExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Newest update found by the most recent run, if it got that far.
    pub fn latest(&self) -> Option<&UpdateRecord> {
        self.latest.as_ref()
    }

    /// Document written by the most recent run, if it got that far.
    pub fn stored(&self) -> Option<&VersionDocument> {
        self.stored.as_ref()
    }

    pub async fn run(&mut self) -> Result<RunReport, DiscoveryError> {
        self.latest = None;
        self.stored = None;

        tracing::debug!(stage = %Stage::Login, "stage started");
        let login = self
            .auth
            .login(&mut self.session, &self.console, &self.credentials)
            .await?;
        tracing::info!(?login, "login submitted");

        tracing::debug!(stage = %Stage::Navigate, "stage started");
        let navigation = self.navigator.open_updates(&mut self.session).await?;
        tracing::info!(
            attempts = navigation.check_now_attempts,
            "update table ready"
        );

        tracing::debug!(stage = %Stage::Extract, "stage started");
        let record = self
            .extractor
            .extract_latest(&self.session, &self.navigator.layout().update_table)
            .await?;
        self.latest = Some(record.clone());

        tracing::debug!(stage = %Stage::Persist, "stage started");
        let document = self.persister.persist(&record).await?;
        tracing::info!(id = %document.id, version = %document.version, "version recorded");
        self.stored = Some(document.clone());

        tracing::debug!(stage = %Stage::Archive, "stage started");
        let archive_path = self.persister.archive(&record, &mut self.session).await?;

        Ok(RunReport {
            login,
            navigation,
            record,
            document,
            archive_path,
        })
    }

    /// End the run and release the browser.
    pub async fn close(self) -> Result<(), crate::error::DriverError> {
        self.session.close().await
    }
}
