//! Browser sessions.
//!
//! Sessions are managed by `tower-sessions`: an in-memory [`MemoryStore`]
//! behind a [`SessionManagerLayer`] that issues the `sessionid` cookie.
//! Each session lives for `server.session_ttl_secs` after its last use.
//! Everything the site keeps between requests is one [`SessionData`] value
//! under a single key.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tower_sessions::cookie::time::Duration;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};

use crate::models::{SearchTerms, StashItem};
use crate::zotero::RequestToken;

pub const COOKIE_NAME: &str = "sessionid";

const DATA_KEY: &str = "serendip";

/// Everything a browser session carries between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub request_token: Option<RequestToken>,
    pub oauth_verifier: Option<String>,
    pub search_terms: Option<SearchTerms>,
    #[serde(default)]
    pub stash: Vec<StashItem>,
    pub zotero_username: Option<String>,
}

/// Session layer with inactivity expiry of `ttl_secs`.
pub fn layer(ttl_secs: u64) -> Result<SessionManagerLayer<MemoryStore>> {
    let ttl = i64::try_from(ttl_secs).context("session ttl out of range")?;
    Ok(SessionManagerLayer::new(MemoryStore::default())
        .with_name(COOKIE_NAME)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(ttl))))
}

/// Data of the current session, empty for a new one.
pub async fn load(session: &Session) -> Result<SessionData> {
    Ok(session
        .get::<SessionData>(DATA_KEY)
        .await
        .context("Failed to read session")?
        .unwrap_or_default())
}

pub async fn save(session: &Session, data: &SessionData) -> Result<()> {
    session
        .insert(DATA_KEY, data)
        .await
        .context("Failed to write session")
}

/// Delete the session from the store and expire its cookie.
pub async fn destroy(session: &Session) -> Result<()> {
    session.flush().await.context("Failed to delete session")
}
