use crate::error::Res;
use crate::utils;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// An OAuth access token obtained by another tool. Only `access_token` is required; when `scopes`
/// are listed they must include the spreadsheets scope.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub(crate) struct AccessToken {
    access_token: String,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub(crate) async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let token: Self = utils::deserialize(path)
            .await
            .context("Unable to deserialize the token JSON file")?;
        token.validate()?;
        if token.is_expired() {
            tracing::warn!(
                "The access token in {} has expired, requests will likely be rejected",
                path.display()
            );
        }
        Ok(token)
    }

    fn validate(&self) -> Res<()> {
        if self.access_token.trim().is_empty() {
            bail!("The token file has an empty access_token");
        }
        if !self.scopes.is_empty() && !self.scopes.iter().any(|s| s == SPREADSHEETS_SCOPE) {
            bail!("OAuth scope '{SPREADSHEETS_SCOPE}' is missing.");
        }
        Ok(())
    }

    pub(crate) fn access_token(&self) -> &str {
        &self.access_token
    }

    /// True if the token expires within 5 minutes or already has.
    pub(crate) fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= Utc::now() + chrono::Duration::minutes(5),
            None => false,
        }
    }
}
