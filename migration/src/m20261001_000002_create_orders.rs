//! Orders extracted per execution. Exchange numeric fields stay as strings so the
//! exchange's own precision survives the round trip.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(pk_auto(Orders::Id))
                    .col(string_len(Orders::ExecutionArn, 255).not_null())
                    .col(string_len(Orders::Symbol, 50).not_null())
                    .col(string_len(Orders::OrderId, 64).not_null())
                    .col(string_len_null(Orders::Size, 50))
                    .col(string_len_null(Orders::Price, 50))
                    .col(string_len_null(Orders::PriceAvg, 50))
                    .col(string_len_null(Orders::BaseVolume, 50))
                    .col(string_len_null(Orders::QuoteVolume, 50))
                    .col(string_len_null(Orders::Status, 30))
                    .col(string_len_null(Orders::Side, 20))
                    .col(string_len_null(Orders::OrderType, 30))
                    .col(string_len_null(Orders::Force, 20))
                    .col(string_len_null(Orders::Leverage, 10))
                    .col(string_len_null(Orders::MarginMode, 30))
                    .col(string_len_null(Orders::MarginCoin, 20))
                    .col(string_len_null(Orders::PosSide, 20))
                    .col(string_len_null(Orders::PosMode, 30))
                    .col(string_len_null(Orders::TradeSide, 30))
                    .col(string_len_null(Orders::ReduceOnly, 10))
                    .col(string_len_null(Orders::PosAvg, 50))
                    .col(string_len_null(Orders::Fee, 50))
                    .col(string_len_null(Orders::TotalProfits, 50))
                    .col(string_len_null(Orders::ClientOid, 64))
                    .col(string_len_null(Orders::OrderSource, 30))
                    .col(string_len_null(Orders::EnterPointSource, 30))
                    .col(string_len_null(Orders::PresetStopSurplusPrice, 50))
                    .col(string_len_null(Orders::PresetStopLossPrice, 50))
                    .col(big_integer_null(Orders::CTime))
                    .col(big_integer_null(Orders::UTime))
                    .col(timestamp(Orders::CreatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        // Dedup guard: one row per (execution, order id)
        manager
            .create_index(
                Index::create()
                    .name("u_execution_order")
                    .table(Orders::Table)
                    .col(Orders::ExecutionArn)
                    .col(Orders::OrderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_symbol")
                    .table(Orders::Table)
                    .col(Orders::Symbol)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    ExecutionArn,
    Symbol,
    OrderId,
    Size,
    Price,
    PriceAvg,
    BaseVolume,
    QuoteVolume,
    Status,
    Side,
    OrderType,
    Force,
    Leverage,
    MarginMode,
    MarginCoin,
    PosSide,
    PosMode,
    TradeSide,
    ReduceOnly,
    PosAvg,
    Fee,
    TotalProfits,
    ClientOid,
    OrderSource,
    EnterPointSource,
    PresetStopSurplusPrice,
    PresetStopLossPrice,
    #[sea_orm(iden = "c_time")]
    CTime,
    #[sea_orm(iden = "u_time")]
    UTime,
    CreatedAt,
}
