use std::sync::Arc;

use anyhow::{Context, Result};
use kgfl_session::{FileCredentialStore, SessionConfig, SessionContext, SessionExpiryHook};

use crate::config;
use crate::output::print_warning;

/// Tells the terminal user to log in again once a refresh has failed.
struct LoginAgainNotice {
    profile: String,
}

impl SessionExpiryHook for LoginAgainNotice {
    fn on_session_expired(&self) {
        print_warning(&format!(
            "Session expired. Run: kgfl login --profile {} --username <name>",
            self.profile
        ));
    }
}

pub fn credential_store(profile: &str) -> Result<FileCredentialStore> {
    Ok(FileCredentialStore::new(config::credentials_path(profile)?))
}

/// Session context backed by the profile's credential file.
pub fn open(settings: SessionConfig, profile: &str) -> Result<SessionContext> {
    SessionContext::builder(settings)
        .credential_store(Arc::new(credential_store(profile)?))
        .expiry_hook(Arc::new(LoginAgainNotice {
            profile: profile.to_string(),
        }))
        .build()
        .context("Failed to start session")
}
