//! Product entity - the source store's sellable items awaiting migration.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::sync_status::SyncStatus;

/// Product model - one row per sellable item in the source store.
///
/// The `price` column is free text as entered upstream ("25,50 €",
/// "$19.99"); the validator parses it into integer minor units before any
/// remote call. `remote_product_id` / `remote_price_id` are written back
/// once the remote platform confirms creation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    // ─── Content ─────────────────────────────────────────────────────────────
    /// Display title.
    pub title: String,
    /// Long description.
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    /// Raw price text as entered upstream.
    pub price: String,
    /// ISO currency code.
    #[sea_orm(default_value = "usd")]
    pub currency: String,

    // ─── Classification ──────────────────────────────────────────────────────
    /// Category name.
    pub category: Option<String>,
    /// Subcategory name.
    pub subcategory: Option<String>,

    // ─── Physical attributes ─────────────────────────────────────────────────
    /// Free-text dimensions ("120x80x40 cm").
    pub dimensions: Option<String>,
    /// Weight in grams.
    pub weight_grams: Option<i32>,
    /// Whether the item is currently available for sale.
    #[sea_orm(default_value = true)]
    pub available: bool,

    // ─── Remote mapping ──────────────────────────────────────────────────────
    /// Identifier of the product on the remote platform, once created.
    pub remote_product_id: Option<String>,
    /// Identifier of the price on the remote platform, once created.
    pub remote_price_id: Option<String>,
    /// Migration state of this row.
    pub sync_status: SyncStatus,
    /// Failure reason when `sync_status` is `Failed`.
    #[sea_orm(column_type = "Text", nullable)]
    pub sync_error: Option<String>,
    /// When the row was last written back by the engine.
    pub synced_at: Option<DateTimeUtc>,

    // ─── Timestamps ──────────────────────────────────────────────────────────
    /// When the row was created upstream.
    pub created_at: DateTimeUtc,
    /// When the row was last updated upstream.
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn model_serializes_to_json() {
        let model = Model {
            id: Uuid::new_v4(),
            title: "Walnut desk".to_string(),
            description: None,
            price: "249,00".to_string(),
            currency: "eur".to_string(),
            category: Some("furniture".to_string()),
            subcategory: None,
            dimensions: Some("120x80x75 cm".to_string()),
            weight_grams: Some(24_000),
            available: true,
            remote_product_id: None,
            remote_price_id: None,
            sync_status: SyncStatus::Unset,
            sync_error: None,
            synced_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&model).expect("model should serialize");
        assert_eq!(json["title"], "Walnut desk");
        assert_eq!(json["sync_status"], "unset");
    }
}
