//! Migration to create the webhook_dlq table.
//!
//! This migration creates the webhook_dlq table holding webhooks that
//! exhausted their retry budget. Rows are never auto-deleted; operators
//! resolve them through the admin API.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookDlq::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookDlq::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WebhookDlq::Platform).text().not_null())
                    .col(ColumnDef::new(WebhookDlq::EventKey).text().not_null())
                    .col(ColumnDef::new(WebhookDlq::Payload).json_binary().not_null())
                    .col(ColumnDef::new(WebhookDlq::Headers).json_binary().not_null())
                    .col(ColumnDef::new(WebhookDlq::Attempts).integer().not_null())
                    .col(ColumnDef::new(WebhookDlq::LastError).json_binary().null())
                    .col(
                        ColumnDef::new(WebhookDlq::FirstFailedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookDlq::Resolution)
                            .text()
                            .not_null()
                            .default("unresolved"),
                    )
                    .col(ColumnDef::new(WebhookDlq::ResolvedBy).text().null())
                    .col(
                        ColumnDef::new(WebhookDlq::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(WebhookDlq::ResolutionNotes).text().null())
                    .col(
                        ColumnDef::new(WebhookDlq::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Covers the unreviewed-first admin listing
        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_dlq_resolution_created")
                    .table(WebhookDlq::Table)
                    .col(WebhookDlq::Resolution)
                    .col(WebhookDlq::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_dlq_resolution_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WebhookDlq::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WebhookDlq {
    Table,
    Id,
    Platform,
    EventKey,
    Payload,
    Headers,
    Attempts,
    LastError,
    FirstFailedAt,
    Resolution,
    ResolvedBy,
    ResolvedAt,
    ResolutionNotes,
    CreatedAt,
}
