//! Profile and password operations for the signed-in account

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::api::{ApiRequest, Gateway};
use crate::error::{Error, Result, StoreError};
use crate::types::{ProfilePatch, User, Validate};

use super::lock;

/// Shortest accepted new password
pub const MIN_PASSWORD_LEN: usize = 8;

/// Body for `POST /auth/change-password`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl PasswordChange {
    pub fn new(current: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            current_password: current.into(),
            new_password: new.into(),
        }
    }
}

impl Validate for PasswordChange {
    fn validate(&self) -> Result<()> {
        if self.current_password.is_empty() {
            return Err(Error::validation("current password is required"));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "new password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.new_password == self.current_password {
            return Err(Error::validation(
                "new password must differ from the current one",
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
struct ProfileState {
    is_saving: bool,
    error: Option<StoreError>,
}

pub struct ProfileStore {
    gateway: Arc<Gateway>,
    state: Mutex<ProfileState>,
}

impl ProfileStore {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            state: Mutex::new(ProfileState::default()),
        }
    }

    /// The cached user of the current session
    pub fn user(&self) -> Option<User> {
        self.gateway.credentials().user()
    }

    pub fn is_saving(&self) -> bool {
        lock(&self.state).is_saving
    }

    pub fn error(&self) -> Option<StoreError> {
        lock(&self.state).error.clone()
    }

    pub fn clear_error(&self) {
        lock(&self.state).error = None;
    }

    /// Save profile fields and refresh the session's cached user
    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<User> {
        const NOTICE: &str = "Failed to update profile";
        if let Err(e) = patch.validate() {
            return Err(self.fail(NOTICE, e));
        }
        let request = match ApiRequest::put("/me").json(patch) {
            Ok(request) => request,
            Err(e) => return Err(self.fail(NOTICE, e)),
        };

        self.begin();
        match self.gateway.fetch::<User>(&request).await {
            Ok(user) => {
                self.finish();
                tracing::info!(user_id = %user.id, "Profile updated");
                self.gateway.credentials().set_user(user.clone());
                Ok(user)
            }
            Err(e) => Err(self.fail(NOTICE, e)),
        }
    }

    pub async fn change_password(&self, change: &PasswordChange) -> Result<()> {
        const NOTICE: &str = "Failed to change password";
        if let Err(e) = change.validate() {
            return Err(self.fail(NOTICE, e));
        }
        let request = match ApiRequest::post("/auth/change-password").json(change) {
            Ok(request) => request,
            Err(e) => return Err(self.fail(NOTICE, e)),
        };

        self.begin();
        match self.gateway.send::<User>(&request).await {
            Ok(envelope) => {
                self.finish();
                tracing::info!("Password changed");
                if let Some(user) = envelope.data {
                    self.gateway.credentials().set_user(user);
                }
                Ok(())
            }
            Err(e) => Err(self.fail(NOTICE, e)),
        }
    }

    fn begin(&self) {
        let mut state = lock(&self.state);
        state.is_saving = true;
        state.error = None;
    }

    fn finish(&self) {
        lock(&self.state).is_saving = false;
    }

    fn fail(&self, notice: &str, error: Error) -> Error {
        tracing::warn!(error = %error, "{}", notice);
        let mut state = lock(&self.state);
        state.is_saving = false;
        state.error = Some(StoreError::new(notice, &error));
        error
    }
}
