use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SubscriptionItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionItems::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionItems::StripeSubscriptionItemId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionItems::StripeSubscriptionId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionItems::StripePriceId)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionItems::Quantity)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(SubscriptionItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionItems::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subscription_items_stripe_subscription_id")
                    .table(SubscriptionItems::Table)
                    .col(SubscriptionItems::StripeSubscriptionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SubscriptionItems::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SubscriptionItems {
    Table,
    Id,
    StripeSubscriptionItemId,
    StripeSubscriptionId,
    StripePriceId,
    Quantity,
    CreatedAt,
    UpdatedAt,
}
