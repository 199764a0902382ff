// `/api/homestatus` response model

use serde::Deserialize;
use serde_json::Value;

/// Top-level envelope: `{"body": {"home": {...}}}`
#[derive(Debug, Deserialize)]
pub struct HomeStatusResponse {
    pub body: HomeStatusBody,
}

#[derive(Debug, Deserialize)]
pub struct HomeStatusBody {
    pub home: HomeStatus,
}

#[derive(Debug, Deserialize)]
pub struct HomeStatus {
    /// Missing or `null` is treated as no rooms
    #[serde(default)]
    pub rooms: Option<Vec<RoomStatus>>,
}

/// Room entry; Netatmo sends string ids, older payloads numeric ones
#[derive(Debug, Clone, Deserialize)]
pub struct RoomStatus {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub therm_setpoint_mode: Option<String>,
}

impl HomeStatus {
    pub fn rooms(&self) -> &[RoomStatus] {
        self.rooms.as_deref().unwrap_or_default()
    }
}

impl RoomStatus {
    pub fn is_away(&self) -> bool {
        self.therm_setpoint_mode
            .as_deref()
            .is_some_and(|mode| mode.contains("away"))
    }
}
