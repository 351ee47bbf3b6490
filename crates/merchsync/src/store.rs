//! Source store reads and sync-status write-backs.
//!
//! Paginated batch reads of pending product rows plus point writes of sync
//! results. These are the only database touch points the engine uses during
//! a run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::entity::prelude::{Product, ProductActiveModel, ProductColumn, ProductModel};
use crate::entity::sync_status::SyncStatus;
use crate::error::{Result, SyncError};

/// Which slice of the source table a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStrategy {
    /// Every row.
    #[default]
    Full,
    /// Rows updated within the filter's date range.
    Incremental,
    /// Only the rows named in the filter's id list.
    Selective,
}

/// Filter criteria for batch reads.
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub strategy: SyncStrategy,
    pub updated_since: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub ids: Vec<Uuid>,
    /// Skip rows already marked synced.
    pub skip_synced: bool,
}

impl BatchFilter {
    fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        match self.strategy {
            SyncStrategy::Full => {}
            SyncStrategy::Incremental => {
                if let Some(since) = self.updated_since {
                    cond = cond.add(ProductColumn::UpdatedAt.gte(since));
                }
                if let Some(before) = self.updated_before {
                    cond = cond.add(ProductColumn::UpdatedAt.lt(before));
                }
            }
            SyncStrategy::Selective => {
                cond = cond.add(ProductColumn::Id.is_in(self.ids.clone()));
            }
        }
        if self.skip_synced {
            cond = cond.add(ProductColumn::SyncStatus.ne(SyncStatus::Synced));
        }
        cond
    }
}

/// Remote identifiers and status written back after processing one record.
#[derive(Debug, Clone)]
pub struct SyncWriteBack {
    pub remote_product_id: String,
    pub remote_price_id: String,
    pub status: SyncStatus,
    pub timestamp: DateTime<Utc>,
}

/// Source store service over the sea-orm connection.
///
/// The connection is held behind an `Arc` so clones handed to spawned
/// record pipelines share one pool.
#[derive(Clone)]
pub struct SourceStore {
    db: Arc<DatabaseConnection>,
}

impl SourceStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Count the rows a run with this filter would cover.
    pub async fn count_pending(&self, filter: &BatchFilter) -> Result<u64> {
        let count = Product::find()
            .filter(filter.condition())
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    /// Fetch one page of pending rows, ordered by id so pagination is
    /// stable across a resumed run.
    pub async fn fetch_batch(
        &self,
        offset: u64,
        limit: u64,
        filter: &BatchFilter,
    ) -> Result<Vec<ProductModel>> {
        let rows = Product::find()
            .filter(filter.condition())
            .order_by_asc(ProductColumn::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    /// Record a successful sync: remote identifiers, status, and timestamp.
    pub async fn write_sync_result(&self, id: Uuid, result: &SyncWriteBack) -> Result<()> {
        let updated = Product::update_many()
            .set(ProductActiveModel {
                remote_product_id: Set(Some(result.remote_product_id.clone())),
                remote_price_id: Set(Some(result.remote_price_id.clone())),
                sync_status: Set(result.status),
                sync_error: Set(None),
                synced_at: Set(Some(result.timestamp)),
                ..Default::default()
            })
            .filter(ProductColumn::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if updated.rows_affected == 0 {
            return Err(SyncError::not_found(format!("product {id}")));
        }
        Ok(())
    }

    /// Record a per-record failure with its reason.
    pub async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        let updated = Product::update_many()
            .set(ProductActiveModel {
                sync_status: Set(SyncStatus::Failed),
                sync_error: Set(Some(reason.to_string())),
                ..Default::default()
            })
            .filter(ProductColumn::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if updated.rows_affected == 0 {
            return Err(SyncError::not_found(format!("product {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, QueryTrait};
    use std::collections::BTreeMap;

    fn filter_sql(filter: &BatchFilter) -> String {
        Product::find()
            .filter(filter.condition())
            .build(DatabaseBackend::Sqlite)
            .to_string()
    }

    #[test]
    fn full_strategy_with_skip_synced_excludes_synced_rows() {
        let filter = BatchFilter {
            skip_synced: true,
            ..Default::default()
        };
        let sql = filter_sql(&filter);
        assert!(sql.contains("\"sync_status\" <> 'synced'"), "sql: {sql}");
    }

    #[test]
    fn incremental_strategy_bounds_updated_at() {
        let filter = BatchFilter {
            strategy: SyncStrategy::Incremental,
            updated_since: Some(Utc::now()),
            ..Default::default()
        };
        let sql = filter_sql(&filter);
        assert!(sql.contains("\"updated_at\" >="), "sql: {sql}");
    }

    #[test]
    fn selective_strategy_filters_on_id_list() {
        let filter = BatchFilter {
            strategy: SyncStrategy::Selective,
            ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            ..Default::default()
        };
        let sql = filter_sql(&filter);
        assert!(sql.contains("\"id\" IN"), "sql: {sql}");
    }

    #[tokio::test]
    async fn count_pending_reads_count_row() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![BTreeMap::from([(
                "num_items",
                sea_orm::Value::from(7i32),
            )])]])
            .into_connection();

        let store = SourceStore::new(db);
        let count = store.count_pending(&BatchFilter::default()).await.unwrap();
        assert_eq!(count, 7);
    }

    #[tokio::test]
    async fn clones_share_the_underlying_connection() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![BTreeMap::from([(
                "num_items",
                sea_orm::Value::from(3i32),
            )])]])
            .into_connection();

        let store = SourceStore::new(db);
        let clone = store.clone();
        let count = clone.count_pending(&BatchFilter::default()).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn write_sync_result_errors_when_row_is_missing() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([MockExecResult {
                rows_affected: 0,
                last_insert_id: 0,
            }])
            .into_connection();

        let store = SourceStore::new(db);
        let result = SyncWriteBack {
            remote_product_id: "prod_1".into(),
            remote_price_id: "price_1".into(),
            status: SyncStatus::Synced,
            timestamp: Utc::now(),
        };
        let err = store
            .write_sync_result(Uuid::new_v4(), &result)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
    }

    #[tokio::test]
    async fn mark_failed_updates_status_and_reason() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([MockExecResult {
                rows_affected: 1,
                last_insert_id: 0,
            }])
            .into_connection();

        let store = SourceStore::new(db);
        store
            .mark_failed(Uuid::new_v4(), "price: amount must be positive")
            .await
            .unwrap();
    }
}
