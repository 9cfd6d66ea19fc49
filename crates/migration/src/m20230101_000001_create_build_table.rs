use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Build::Table)
                    .col(
                        ColumnDef::new(Build::BuildId)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Build::Branch).string_len(100).not_null())
                    .col(ColumnDef::new(Build::Revision).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Build::Version)
                            .string_len(100)
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Build::BuildOutputTx).text())
                    .col(ColumnDef::new(Build::BuildExitStatus).integer())
                    .col(ColumnDef::new(Build::BuildExecSec).decimal())
                    .col(ColumnDef::new(Build::BuildSize).decimal())
                    // Soft link by version label, deliberately without a foreign key.
                    .col(ColumnDef::new(Build::PreviousVersion).string_len(100))
                    .col(ColumnDef::new(Build::DeployDttm).timestamp())
                    .col(ColumnDef::new(Build::DeployOutputTx).text())
                    .col(ColumnDef::new(Build::DeployExitStatus).integer())
                    .col(ColumnDef::new(Build::RevertDttm).timestamp())
                    .col(ColumnDef::new(Build::RevertOutputTx).text())
                    .col(ColumnDef::new(Build::RevertExitStatus).integer())
                    .col(
                        ColumnDef::new(Build::CreateDttm)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .col(
                        ColumnDef::new(Build::UpdateDttm)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .col(ColumnDef::new(Build::DeleteDttm).timestamp())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Build::Table).to_owned())
            .await
    }
}

/// Learn more at https://docs.rs/sea-query#iden
#[derive(Iden)]
enum Build {
    Table,
    BuildId,
    Branch,
    Revision,
    Version,
    BuildOutputTx,
    BuildExitStatus,
    BuildExecSec,
    BuildSize,
    PreviousVersion,
    DeployDttm,
    DeployOutputTx,
    DeployExitStatus,
    RevertDttm,
    RevertOutputTx,
    RevertExitStatus,
    CreateDttm,
    UpdateDttm,
    DeleteDttm,
}
