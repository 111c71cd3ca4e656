// migration/src/lib.rs
pub use sea_orm_migration::prelude::*;

// 課金関連マイグレーション
mod m20250801_000001_create_customers_table;
mod m20250801_000002_create_subscriptions_table;
mod m20250801_000003_create_subscription_items_table;
mod m20250801_000004_create_invoices_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            // 1. 顧客マッピング（ユーザー ↔ Stripe顧客）
            Box::new(m20250801_000001_create_customers_table::Migration),
            // 2. サブスクリプション本体と明細
            Box::new(m20250801_000002_create_subscriptions_table::Migration),
            Box::new(m20250801_000003_create_subscription_items_table::Migration),
            // 3. 請求書（追記のみ）
            Box::new(m20250801_000004_create_invoices_table::Migration),
        ]
    }
}
