use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 請求書は追記のみ。stripe_invoice_id のUNIQUE制約で再配信時の重複を防ぐ
        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invoices::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Invoices::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Invoices::StripeInvoiceId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Invoices::StripeCustomerId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Invoices::SubscriptionId).uuid().null())
                    .col(
                        ColumnDef::new(Invoices::AmountPaid)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Invoices::AmountDue)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Invoices::Currency).string().not_null())
                    .col(ColumnDef::new(Invoices::Status).string().not_null())
                    .col(
                        ColumnDef::new(Invoices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoices_user_id")
                    .table(Invoices::Table)
                    .col(Invoices::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Invoices {
    Table,
    Id,
    UserId,
    StripeInvoiceId,
    StripeCustomerId,
    SubscriptionId,
    AmountPaid,
    AmountDue,
    Currency,
    Status,
    CreatedAt,
}
