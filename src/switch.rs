// Host-side away switch
// Fronts the Netatmo client with the read cache so reads answer immediately

use std::sync::Arc;

use crate::cache::AwayModeCache;
use crate::error::NetatmoError;
use crate::http_client::NetatmoHttpClient;

/// Value reported when the state is not known yet
const DEFAULT_AWAY: bool = false;

/// State read from the switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchState {
    pub away: bool,
    /// `false` when the value is the default returned on a cache miss
    pub cached: bool,
}

/// Away switch exposed to the host
#[derive(Clone)]
pub struct AwaySwitch {
    client: Arc<NetatmoHttpClient>,
    cache: AwayModeCache,
}

impl AwaySwitch {
    pub fn new(client: Arc<NetatmoHttpClient>, cache: AwayModeCache) -> Self {
        Self { client, cache }
    }

    /// Current state without waiting on the network
    ///
    /// On a cache miss a background fetch is started and the default
    /// (not away) is returned right away.
    pub fn get(&self) -> SwitchState {
        let home_id = self.client.home_id();

        if let Some(away) = self.cache.get(home_id) {
            tracing::debug!("Get away mode `{}` from cache", away);
            return SwitchState { away, cached: true };
        }

        let switch = self.clone();
        tokio::spawn(async move {
            if let Err(e) = switch.refresh().await {
                tracing::error!("Background away mode refresh failed: {}", e);
            }
        });

        SwitchState {
            away: DEFAULT_AWAY,
            cached: false,
        }
    }

    /// Fetch the state from Netatmo and cache it
    pub async fn refresh(&self) -> Result<bool, NetatmoError> {
        let away = self.client.is_away().await?;
        self.cache.set(self.client.home_id(), away);
        tracing::info!("Get away mode `{}` from API", away);
        Ok(away)
    }

    /// Switch away mode on or off
    pub async fn set(&self, away: bool) -> Result<(), NetatmoError> {
        match self.client.set_away(away).await {
            Ok(()) => {
                tracing::info!("Set away mode `{}`", away);
                self.cache.set(self.client.home_id(), away);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to set away mode `{}`: {}", away, e);
                Err(e)
            }
        }
    }

    /// Home the switch controls
    pub fn home_id(&self) -> &str {
        self.client.home_id()
    }

    /// Read cache in front of the client
    pub fn cache(&self) -> &AwayModeCache {
        &self.cache
    }
}
