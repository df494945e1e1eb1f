//! Database migrations for the mirsal delivery service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_06_02_091500_create_review_invites;
mod m2026_06_02_091600_create_outbox_jobs;
mod m2026_06_02_091700_create_processed_events;
mod m2026_06_09_140000_create_webhook_retries;
mod m2026_06_09_140100_create_webhook_dlq;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_06_02_091500_create_review_invites::Migration),
            Box::new(m2026_06_02_091600_create_outbox_jobs::Migration),
            Box::new(m2026_06_02_091700_create_processed_events::Migration),
            Box::new(m2026_06_09_140000_create_webhook_retries::Migration),
            Box::new(m2026_06_09_140100_create_webhook_dlq::Migration),
        ]
    }
}
