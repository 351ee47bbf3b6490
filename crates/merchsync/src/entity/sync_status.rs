//! Sync status enum for type-safe write-back state handling.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Migration state of one source record.
///
/// Written back into the source store as each record moves through the
/// engine; `Synced` means both the remote product and price exist and
/// their identifiers are recorded on the row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Never touched by the engine.
    #[default]
    #[sea_orm(string_value = "unset")]
    Unset,
    /// Selected for migration; remote write not yet confirmed.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Remote product and price created, identifiers written back.
    #[sea_orm(string_value = "synced")]
    Synced,
    /// Migration failed; `sync_error` holds the reason.
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::Unset => "unset",
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unset" => Ok(SyncStatus::Unset),
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            _ => Err(format!("unknown sync status: {s}")),
        }
    }
}
