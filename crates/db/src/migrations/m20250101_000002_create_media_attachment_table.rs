//! Create `media_attachment` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MediaAttachment::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MediaAttachment::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MediaAttachment::AccountId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(MediaAttachment::StatusId).string_len(32))
                    .col(ColumnDef::new(MediaAttachment::Kind).string_len(16).not_null())
                    .col(
                        ColumnDef::new(MediaAttachment::Processing)
                            .string_len(16)
                            .not_null()
                            .default("received"),
                    )
                    .col(ColumnDef::new(MediaAttachment::Description).text())
                    .col(ColumnDef::new(MediaAttachment::RemoteUrl).string_len(1024))
                    .col(ColumnDef::new(MediaAttachment::ThumbnailRemoteUrl).string_len(1024))
                    .col(ColumnDef::new(MediaAttachment::StagingKey).string_len(512))
                    .col(
                        ColumnDef::new(MediaAttachment::UploadContentType)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(ColumnDef::new(MediaAttachment::FilePath).string_len(512))
                    .col(ColumnDef::new(MediaAttachment::FileUrl).string_len(1024))
                    .col(ColumnDef::new(MediaAttachment::FileContentType).string_len(128))
                    .col(ColumnDef::new(MediaAttachment::FileSize).big_integer())
                    .col(ColumnDef::new(MediaAttachment::FileUpdatedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(MediaAttachment::ThumbnailPath).string_len(512))
                    .col(ColumnDef::new(MediaAttachment::ThumbnailUrl).string_len(1024))
                    .col(ColumnDef::new(MediaAttachment::ThumbnailContentType).string_len(128))
                    .col(ColumnDef::new(MediaAttachment::ThumbnailSize).big_integer())
                    .col(
                        ColumnDef::new(MediaAttachment::ThumbnailUpdatedAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(ColumnDef::new(MediaAttachment::OriginalWidth).integer())
                    .col(ColumnDef::new(MediaAttachment::OriginalHeight).integer())
                    .col(ColumnDef::new(MediaAttachment::OriginalSize).big_integer())
                    .col(ColumnDef::new(MediaAttachment::OriginalAspect).double())
                    .col(ColumnDef::new(MediaAttachment::OriginalDuration).double())
                    .col(ColumnDef::new(MediaAttachment::SmallWidth).integer())
                    .col(ColumnDef::new(MediaAttachment::SmallHeight).integer())
                    .col(ColumnDef::new(MediaAttachment::SmallSize).big_integer())
                    .col(ColumnDef::new(MediaAttachment::SmallAspect).double())
                    .col(ColumnDef::new(MediaAttachment::FocusX).float())
                    .col(ColumnDef::new(MediaAttachment::FocusY).float())
                    .col(ColumnDef::new(MediaAttachment::Blurhash).string_len(128))
                    .col(ColumnDef::new(MediaAttachment::ErrorReason).text())
                    .col(
                        ColumnDef::new(MediaAttachment::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(MediaAttachment::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_media_attachment_account")
                            .from(MediaAttachment::Table, MediaAttachment::AccountId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: account_id (for listing an account's attachments)
        manager
            .create_index(
                Index::create()
                    .name("idx_media_attachment_account_id")
                    .table(MediaAttachment::Table)
                    .col(MediaAttachment::AccountId)
                    .to_owned(),
            )
            .await?;

        // Index: (processing, created_at) - requeue and purge sweeps
        manager
            .create_index(
                Index::create()
                    .name("idx_media_attachment_processing_created_at")
                    .table(MediaAttachment::Table)
                    .col(MediaAttachment::Processing)
                    .col(MediaAttachment::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: status_id (for loading a status' attachments)
        manager
            .create_index(
                Index::create()
                    .name("idx_media_attachment_status_id")
                    .table(MediaAttachment::Table)
                    .col(MediaAttachment::StatusId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MediaAttachment::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum MediaAttachment {
    Table,
    Id,
    AccountId,
    StatusId,
    Kind,
    Processing,
    Description,
    RemoteUrl,
    ThumbnailRemoteUrl,
    StagingKey,
    UploadContentType,
    FilePath,
    FileUrl,
    FileContentType,
    FileSize,
    FileUpdatedAt,
    ThumbnailPath,
    ThumbnailUrl,
    ThumbnailContentType,
    ThumbnailSize,
    ThumbnailUpdatedAt,
    OriginalWidth,
    OriginalHeight,
    OriginalSize,
    OriginalAspect,
    OriginalDuration,
    SmallWidth,
    SmallHeight,
    SmallSize,
    SmallAspect,
    FocusX,
    FocusY,
    Blurhash,
    ErrorReason,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
