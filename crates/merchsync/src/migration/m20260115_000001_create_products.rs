//! Initial migration to create the products table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                    // Content
                    .col(ColumnDef::new(Products::Title).string().not_null())
                    .col(ColumnDef::new(Products::Description).text().null())
                    .col(ColumnDef::new(Products::Price).string().not_null())
                    .col(
                        ColumnDef::new(Products::Currency)
                            .string()
                            .not_null()
                            .default("usd"),
                    )
                    // Classification
                    .col(ColumnDef::new(Products::Category).string().null())
                    .col(ColumnDef::new(Products::Subcategory).string().null())
                    // Physical attributes
                    .col(ColumnDef::new(Products::Dimensions).string().null())
                    .col(ColumnDef::new(Products::WeightGrams).integer().null())
                    .col(
                        ColumnDef::new(Products::Available)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    // Remote mapping
                    .col(ColumnDef::new(Products::RemoteProductId).string().null())
                    .col(ColumnDef::new(Products::RemotePriceId).string().null())
                    .col(
                        ColumnDef::new(Products::SyncStatus)
                            .string()
                            .not_null()
                            .default("unset"),
                    )
                    .col(ColumnDef::new(Products::SyncError).text().null())
                    .col(ColumnDef::new(Products::SyncedAt).timestamp().null())
                    // Timestamps
                    .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Products::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // The batch loop filters on status; updated_at serves incremental runs.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_products_sync_status")
                    .table(Products::Table)
                    .col(Products::SyncStatus)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_products_updated_at")
                    .table(Products::Table)
                    .col(Products::UpdatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Title,
    Description,
    Price,
    Currency,
    Category,
    Subcategory,
    Dimensions,
    WeightGrams,
    Available,
    RemoteProductId,
    RemotePriceId,
    SyncStatus,
    SyncError,
    SyncedAt,
    CreatedAt,
    UpdatedAt,
}
