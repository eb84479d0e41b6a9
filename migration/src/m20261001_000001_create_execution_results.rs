use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One summary row per pipeline run
        manager
            .create_table(
                Table::create()
                    .table(ExecutionResults::Table)
                    .if_not_exists()
                    .col(pk_auto(ExecutionResults::Id))
                    .col(string_len(ExecutionResults::ExecutionArn, 255).not_null().unique_key())
                    .col(string_len(ExecutionResults::Status, 50).not_null())
                    .col(integer_null(ExecutionResults::TotalSymbols))
                    .col(integer_null(ExecutionResults::TotalOrders))
                    .col(text_null(ExecutionResults::ArtifactUri))
                    .col(text_null(ExecutionResults::PublicUrl))
                    .col(text_null(ExecutionResults::ResultData))
                    .col(double_null(ExecutionResults::ProcessingTimeSeconds))
                    .col(timestamp(ExecutionResults::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp(ExecutionResults::UpdatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_execution_results_status")
                    .table(ExecutionResults::Table)
                    .col(ExecutionResults::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExecutionResults::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ExecutionResults {
    Table,
    Id,
    ExecutionArn,
    Status,
    TotalSymbols,
    TotalOrders,
    ArtifactUri,
    PublicUrl,
    ResultData,
    ProcessingTimeSeconds,
    CreatedAt,
    UpdatedAt,
}
