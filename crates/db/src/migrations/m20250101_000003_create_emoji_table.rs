//! Create emoji table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Emoji::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Emoji::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Emoji::Shortcode).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Emoji::Domain)
                            .string_len(256)
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Emoji::Uri).string_len(1024).not_null().unique_key())
                    .col(ColumnDef::new(Emoji::ImagePath).string_len(512))
                    .col(ColumnDef::new(Emoji::ImageUrl).string_len(1024))
                    .col(ColumnDef::new(Emoji::ImageRemoteUrl).string_len(1024))
                    .col(ColumnDef::new(Emoji::ImageStaticPath).string_len(512))
                    .col(ColumnDef::new(Emoji::ImageStaticUrl).string_len(1024))
                    .col(ColumnDef::new(Emoji::ImageStaticRemoteUrl).string_len(1024))
                    .col(
                        ColumnDef::new(Emoji::ImageContentType)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Emoji::ImageStaticContentType)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Emoji::ImageFileSize)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Emoji::ImageStaticFileSize)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Emoji::ImageUpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Emoji::Disabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Emoji::VisibleInPicker)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Emoji::Category).string_len(128))
                    .col(
                        ColumnDef::new(Emoji::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Emoji::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Unique index: (shortcode, domain) - empty domain means local emoji
        manager
            .create_index(
                Index::create()
                    .name("idx_emoji_shortcode_domain")
                    .table(Emoji::Table)
                    .col(Emoji::Shortcode)
                    .col(Emoji::Domain)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: category (for listing by category)
        manager
            .create_index(
                Index::create()
                    .name("idx_emoji_category")
                    .table(Emoji::Table)
                    .col(Emoji::Category)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Emoji::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Emoji {
    Table,
    Id,
    Shortcode,
    Domain,
    Uri,
    ImagePath,
    ImageUrl,
    ImageRemoteUrl,
    ImageStaticPath,
    ImageStaticUrl,
    ImageStaticRemoteUrl,
    ImageContentType,
    ImageStaticContentType,
    ImageFileSize,
    ImageStaticFileSize,
    ImageUpdatedAt,
    Disabled,
    VisibleInPicker,
    Category,
    CreatedAt,
    UpdatedAt,
}
