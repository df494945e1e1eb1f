//! Migration to create the review_invites table.
//!
//! This migration creates the review_invites table holding the review
//! invitation produced for each completed storefront order, with a unique
//! guard on (store_uid, order_id).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReviewInvites::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReviewInvites::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReviewInvites::StoreUid).text().not_null())
                    .col(ColumnDef::new(ReviewInvites::OrderId).text().not_null())
                    .col(ColumnDef::new(ReviewInvites::CustomerName).text().null())
                    .col(ColumnDef::new(ReviewInvites::Phone).text().null())
                    .col(ColumnDef::new(ReviewInvites::Email).text().null())
                    .col(ColumnDef::new(ReviewInvites::ReviewUrl).text().not_null())
                    .col(
                        ColumnDef::new(ReviewInvites::Status)
                            .text()
                            .not_null()
                            .default("created"),
                    )
                    .col(
                        ColumnDef::new(ReviewInvites::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ReviewInvites::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One invite per order; duplicate webhook deliveries must collide here
        manager
            .create_index(
                Index::create()
                    .name("idx_review_invites_store_order_unique")
                    .table(ReviewInvites::Table)
                    .col(ReviewInvites::StoreUid)
                    .col(ReviewInvites::OrderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_review_invites_store_order_unique")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ReviewInvites::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ReviewInvites {
    Table,
    Id,
    StoreUid,
    OrderId,
    CustomerName,
    Phone,
    Email,
    ReviewUrl,
    Status,
    CreatedAt,
    UpdatedAt,
}
