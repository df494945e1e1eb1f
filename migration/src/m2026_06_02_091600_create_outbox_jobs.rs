//! Migration to create the outbox_jobs table.
//!
//! This migration creates the outbox_jobs table, the durable queue of
//! pending notification deliveries. Jobs carry the requested channels and
//! payload, retry bookkeeping, and the soft worker lease columns.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OutboxJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OutboxJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OutboxJobs::InviteId).uuid().not_null())
                    .col(ColumnDef::new(OutboxJobs::StoreUid).text().not_null())
                    .col(
                        ColumnDef::new(OutboxJobs::Channels)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxJobs::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(OutboxJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(OutboxJobs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OutboxJobs::NextAttemptAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(OutboxJobs::LastError).json_binary().null())
                    .col(ColumnDef::new(OutboxJobs::LockedBy).text().null())
                    .col(
                        ColumnDef::new(OutboxJobs::LockedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OutboxJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(OutboxJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Covers the worker poll: due pending jobs in due-time order
        manager
            .create_index(
                Index::create()
                    .name("idx_outbox_jobs_status_next_attempt")
                    .table(OutboxJobs::Table)
                    .col(OutboxJobs::Status)
                    .col(OutboxJobs::NextAttemptAt)
                    .to_owned(),
            )
            .await?;

        // Covers operator listing scoped to one store
        manager
            .create_index(
                Index::create()
                    .name("idx_outbox_jobs_store_created")
                    .table(OutboxJobs::Table)
                    .col(OutboxJobs::StoreUid)
                    .col(OutboxJobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_outbox_jobs_status_next_attempt")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_outbox_jobs_store_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(OutboxJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OutboxJobs {
    Table,
    Id,
    InviteId,
    StoreUid,
    Channels,
    Payload,
    Status,
    Attempts,
    NextAttemptAt,
    LastError,
    LockedBy,
    LockedAt,
    CreatedAt,
    UpdatedAt,
}
