// src/models/dataset.rs
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use super::user::UserId;

pub type DatasetId = i64;

// ==================== DATASET ====================

/// One uploaded equipment file, owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner: Option<DatasetOwner>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetOwner {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Dataset {
    pub fn owner_id(&self) -> Option<UserId> {
        self.owner.as_ref().map(|o| o.id)
    }

    pub fn owner_username(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.username.as_str())
    }

    /// List label; owner details are only shown to administrators.
    pub fn display_label(&self, show_owner: bool) -> String {
        match (&self.owner, show_owner) {
            (Some(owner), true) => format!("Dataset #{} - Owner: {} (#{})", self.id, owner.username, owner.id),
            _ => format!("Dataset #{}", self.id),
        }
    }
}
