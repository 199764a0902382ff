// Away / schedule mode operations on top of the authenticated client

use reqwest::Method;
use std::fmt;

use crate::error::NetatmoError;
use crate::http_client::NetatmoHttpClient;
use crate::models::homestatus::{HomeStatusResponse, RoomStatus};

const HOME_STATUS_PATH: &str = "/api/homestatus";
const SET_THERM_MODE_PATH: &str = "/api/setthermmode";

/// Home-wide thermostat mode written by `setthermmode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermMode {
    Away,
    Schedule,
}

impl ThermMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThermMode::Away => "away",
            ThermMode::Schedule => "schedule",
        }
    }
}

impl From<bool> for ThermMode {
    fn from(away: bool) -> Self {
        if away {
            ThermMode::Away
        } else {
            ThermMode::Schedule
        }
    }
}

impl fmt::Display for ThermMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A home is away if any of its rooms follows an away setpoint
pub fn is_away_mode(rooms: &[RoomStatus]) -> bool {
    rooms.iter().any(RoomStatus::is_away)
}

impl NetatmoHttpClient {
    /// Fetch and parse `/api/homestatus` for the configured home
    pub async fn home_status(&self) -> Result<HomeStatusResponse, NetatmoError> {
        let response = self
            .authenticated_request(Method::GET, HOME_STATUS_PATH, &[("home_id", self.home_id())])
            .await?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Unexpected homestatus payload");
            NetatmoError::Parse(format!("Invalid homestatus response: {}", e))
        })
    }

    /// Whether the home is currently in away mode
    pub async fn is_away(&self) -> Result<bool, NetatmoError> {
        let status = self.home_status().await?;
        let rooms = status.body.home.rooms();
        let away = is_away_mode(rooms);

        tracing::debug!(rooms = rooms.len(), away = away, "Evaluated home status");
        Ok(away)
    }

    /// Switch the home to away mode (`true`) or back to its schedule (`false`)
    pub async fn set_away(&self, away: bool) -> Result<(), NetatmoError> {
        let mode = ThermMode::from(away);

        self.authenticated_request(
            Method::POST,
            SET_THERM_MODE_PATH,
            &[("home_id", self.home_id()), ("mode", mode.as_str())],
        )
        .await?;

        tracing::info!("Thermostat mode set to `{}`", mode);
        Ok(())
    }
}
