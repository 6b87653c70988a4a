use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UploadSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UploadSessions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UploadSessions::UploadToken)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(UploadSessions::Filename).string().not_null())
                    .col(ColumnDef::new(UploadSessions::TotalSize).big_integer().not_null())
                    .col(
                        ColumnDef::new(UploadSessions::UploadedSize)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UploadSessions::ChunkCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(UploadSessions::TempFilePath).string_len(500).null())
                    .col(
                        ColumnDef::new(UploadSessions::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(UploadSessions::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(UploadSessions::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_upload_sessions_status")
                    .table(UploadSessions::Table)
                    .col(UploadSessions::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_upload_sessions_updated_at")
                    .table(UploadSessions::Table)
                    .col(UploadSessions::UpdatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UploadSessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UploadSessions {
    Table,
    Id,
    UploadToken,
    Filename,
    TotalSize,
    UploadedSize,
    ChunkCount,
    TempFilePath,
    Status,
    CreatedAt,
    UpdatedAt,
}
