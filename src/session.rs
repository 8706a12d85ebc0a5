//! Bearer token / session id handling shared by the API clients.

use async_trait::async_trait;

use crate::errors::LocalError;
use crate::models::Tokens;
use crate::store::Store;

/// Something that can hand out a fresh credential.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Name used for logging and as the cache key.
    fn service(&self) -> &'static str;

    async fn login(&self) -> Result<String, LocalError>;
}

pub struct Session<S> {
    source: S,
    store: Store,
    token: Option<String>,
}

impl<S: SessionSource> Session<S> {
    pub fn new(source: S, store: Store) -> Self {
        Session {
            source,
            store,
            token: None,
        }
    }

    /// Returns the cached token, logging in only when nothing is cached.
    pub async fn token(&mut self) -> Result<String, LocalError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        if let Some(tokens) = self.store.tokens(self.source.service())? {
            log::debug!(
                "{} - using token obtained at {}",
                self.source.service(),
                tokens.obtained_at
            );
            self.token = Some(tokens.access_token.clone());
            return Ok(tokens.access_token);
        }
        self.refresh().await
    }

    /// Logs in again and replaces whatever was cached.
    pub async fn refresh(&mut self) -> Result<String, LocalError> {
        log::info!("{} - logging in", self.source.service());
        let token = self.source.login().await?;
        self.store
            .save_tokens(self.source.service(), &Tokens::new(token.clone()))?;
        self.token = Some(token.clone());
        Ok(token)
    }
}
