use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CreditAccounts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CreditAccounts::UserId).string().not_null().primary_key())
                    .col(ColumnDef::new(CreditAccounts::Email).string().null())
                    .col(ColumnDef::new(CreditAccounts::Credits).big_integer().not_null())
                    .col(ColumnDef::new(CreditAccounts::Plan).string().not_null())
                    .col(ColumnDef::new(CreditAccounts::SubscriptionStatus).string().not_null())
                    .col(
                        ColumnDef::new(CreditAccounts::PlanExpiryDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(CreditAccounts::Version).big_integer().not_null())
                    .col(
                        ColumnDef::new(CreditAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditAccounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ActiveSubscribers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ActiveSubscribers::UserId).string().not_null().primary_key())
                    .col(
                        ColumnDef::new(ActiveSubscribers::PlanExpiryDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_active_subscribers_expiry")
                    .table(ActiveSubscribers::Table)
                    .col(ActiveSubscribers::PlanExpiryDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ConsumedKeys::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ConsumedKeys::Key).string().not_null().primary_key())
                    .col(ColumnDef::new(ConsumedKeys::UserId).string().not_null())
                    .col(ColumnDef::new(ConsumedKeys::Plan).string().not_null())
                    .col(ColumnDef::new(ConsumedKeys::Source).string().not_null())
                    .col(
                        ColumnDef::new(ConsumedKeys::ConsumedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LedgerEntries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(LedgerEntries::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(LedgerEntries::UserId).string().not_null())
                    .col(ColumnDef::new(LedgerEntries::AccountVersion).big_integer().not_null())
                    .col(ColumnDef::new(LedgerEntries::Kind).string().not_null())
                    .col(ColumnDef::new(LedgerEntries::Delta).big_integer().not_null())
                    .col(ColumnDef::new(LedgerEntries::BalanceAfter).big_integer().not_null())
                    .col(ColumnDef::new(LedgerEntries::Reference).string().null())
                    .col(
                        ColumnDef::new(LedgerEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ledger_entries_user_version")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::UserId)
                    .col(LedgerEntries::AccountVersion)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProcessedWebhookEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProcessedWebhookEvents::EventId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProcessedWebhookEvents::ProcessedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GalleryImages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(GalleryImages::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(GalleryImages::UserId).string().not_null())
                    .col(ColumnDef::new(GalleryImages::Prompt).text().not_null())
                    .col(ColumnDef::new(GalleryImages::NegativePrompt).text().null())
                    .col(ColumnDef::new(GalleryImages::Style).string().null())
                    .col(ColumnDef::new(GalleryImages::Width).integer().not_null())
                    .col(ColumnDef::new(GalleryImages::Height).integer().not_null())
                    .col(ColumnDef::new(GalleryImages::Seed).big_integer().null())
                    .col(ColumnDef::new(GalleryImages::Url).text().not_null())
                    .col(ColumnDef::new(GalleryImages::Provider).string().not_null())
                    .col(ColumnDef::new(GalleryImages::CreditsSpent).big_integer().not_null())
                    .col(
                        ColumnDef::new(GalleryImages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_gallery_images_user_created")
                    .table(GalleryImages::Table)
                    .col(GalleryImages::UserId)
                    .col(GalleryImages::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Bundles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Bundles::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Bundles::Slug).string().not_null().unique_key())
                    .col(ColumnDef::new(Bundles::Title).string().not_null())
                    .col(ColumnDef::new(Bundles::Description).text().not_null())
                    .col(ColumnDef::new(Bundles::PriceCents).big_integer().not_null())
                    .col(ColumnDef::new(Bundles::Currency).string().not_null())
                    .col(ColumnDef::new(Bundles::PreviewUrls).json().not_null())
                    .col(ColumnDef::new(Bundles::AssetUrls).json().not_null())
                    .col(ColumnDef::new(Bundles::Active).boolean().not_null())
                    .col(
                        ColumnDef::new(Bundles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BundlePurchases::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BundlePurchases::OrderId).string().not_null().primary_key())
                    .col(ColumnDef::new(BundlePurchases::UserId).string().not_null())
                    .col(ColumnDef::new(BundlePurchases::BundleId).string().not_null())
                    .col(
                        ColumnDef::new(BundlePurchases::PurchasedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bundle_purchases_user_bundle")
                    .table(BundlePurchases::Table)
                    .col(BundlePurchases::UserId)
                    .col(BundlePurchases::BundleId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BundlePurchases::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Bundles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GalleryImages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProcessedWebhookEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ConsumedKeys::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ActiveSubscribers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CreditAccounts::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum CreditAccounts {
    Table,
    UserId,
    Email,
    Credits,
    Plan,
    SubscriptionStatus,
    PlanExpiryDate,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ActiveSubscribers {
    Table,
    UserId,
    PlanExpiryDate,
}

#[derive(DeriveIden)]
enum ConsumedKeys {
    Table,
    Key,
    UserId,
    Plan,
    Source,
    ConsumedAt,
}

#[derive(DeriveIden)]
enum LedgerEntries {
    Table,
    Id,
    UserId,
    AccountVersion,
    Kind,
    Delta,
    BalanceAfter,
    Reference,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ProcessedWebhookEvents {
    Table,
    EventId,
    ProcessedAt,
}

#[derive(DeriveIden)]
enum GalleryImages {
    Table,
    Id,
    UserId,
    Prompt,
    NegativePrompt,
    Style,
    Width,
    Height,
    Seed,
    Url,
    Provider,
    CreditsSpent,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Bundles {
    Table,
    Id,
    Slug,
    Title,
    Description,
    PriceCents,
    Currency,
    PreviewUrls,
    AssetUrls,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BundlePurchases {
    Table,
    OrderId,
    UserId,
    BundleId,
    PurchasedAt,
}
