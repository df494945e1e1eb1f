//! Migration to create the webhook_retries table.
//!
//! This migration creates the webhook_retries table, the secondary queue
//! for inbound webhooks whose processing failed after verification. Entries
//! are deleted on successful replay or promoted to the DLQ on exhaustion.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookRetries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookRetries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WebhookRetries::Platform).text().not_null())
                    .col(ColumnDef::new(WebhookRetries::EventKey).text().not_null())
                    .col(
                        ColumnDef::new(WebhookRetries::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookRetries::Headers)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookRetries::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WebhookRetries::NextRetryAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WebhookRetries::LastError)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WebhookRetries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WebhookRetries::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Covers the cron scan for due entries
        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_retries_next_retry")
                    .table(WebhookRetries::Table)
                    .col(WebhookRetries::NextRetryAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_retries_next_retry")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WebhookRetries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WebhookRetries {
    Table,
    Id,
    Platform,
    EventKey,
    Payload,
    Headers,
    Attempts,
    NextRetryAt,
    LastError,
    CreatedAt,
    UpdatedAt,
}
