//! Login to the administrative console.

use crate::driver::Locator;
use crate::error::{AuthError, DriverError};
use crate::session::DriverSession;
use crate::types::Credentials;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Pause between checks for the post-submit dialog.
const DIALOG_POLL: Duration = Duration::from_millis(250);

/// Where the login form's inputs live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: Locator,
    pub password: Locator,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            username: Locator::id("user"),
            password: Locator::id("passwd"),
        }
    }
}

/// What happened after the credentials were submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginOutcome {
    Submitted,
    /// The console warned about factory-default credentials and the
    /// warning was dismissed.
    DismissedDefaultCredentialsWarning,
}

/// Drives the login form. Never retries: resubmitting credentials blindly
/// risks locking the account.
#[derive(Debug, Clone)]
pub struct Authenticator {
    form: LoginForm,
    /// How long after submit a warning dialog may still show up.
    dialog_grace: Duration,
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new(LoginForm::default())
    }
}

impl Authenticator {
    pub fn new(form: LoginForm) -> Self {
        Self {
            form,
            dialog_grace: Duration::from_secs(3),
        }
    }

    pub fn with_dialog_grace(mut self, grace: Duration) -> Self {
        self.dialog_grace = grace;
        self
    }

    pub async fn login(
        &self,
        session: &mut DriverSession,
        console: &Url,
        credentials: &Credentials,
    ) -> Result<LoginOutcome, AuthError> {
        tracing::info!(console = %console, user = %credentials.username, "logging in");
        session.open(console.as_str()).await?;

        for field in [&self.form.username, &self.form.password] {
            if !session.driver().is_present(field).await? {
                return Err(AuthError::FieldNotFound(field.clone()));
            }
        }

        let driver = session.driver_mut();
        driver
            .fill(&self.form.username, &credentials.username)
            .await
            .map_err(field_error)?;
        driver
            .fill(&self.form.password, &credentials.password)
            .await
            .map_err(field_error)?;
        driver.submit(&self.form.password).await.map_err(field_error)?;

        if self.dismiss_warning(session).await? {
            tracing::warn!("console warned about default credentials; dismissed");
            Ok(LoginOutcome::DismissedDefaultCredentialsWarning)
        } else {
            Ok(LoginOutcome::Submitted)
        }
    }

    /// Accept a dialog if one opens within the grace period.
    async fn dismiss_warning(&self, session: &mut DriverSession) -> Result<bool, AuthError> {
        let deadline = Instant::now() + self.dialog_grace;
        loop {
            if session.driver_mut().accept_dialog().await? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(DIALOG_POLL.min(deadline - now)).await;
        }
    }
}

fn field_error(e: DriverError) -> AuthError {
    match e {
        DriverError::NotFound(locator) => AuthError::FieldNotFound(locator),
        other => AuthError::Driver(other),
    }
}
