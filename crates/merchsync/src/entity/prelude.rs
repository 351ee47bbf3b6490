//! Common re-exports for convenient entity usage.

pub use super::product::{
    ActiveModel as ProductActiveModel, Column as ProductColumn, Entity as Product,
    Model as ProductModel,
};
pub use super::sync_status::SyncStatus;
