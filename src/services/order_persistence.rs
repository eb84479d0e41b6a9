//! Relational persistence for execution summaries and extracted orders.

use std::collections::HashSet;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, QueryFilter,
    Set, SqlErr, TryInsertResult,
};
use serde::Serialize;
use serde_json::Value;

use crate::entities::{execution_results, orders, prelude::*};
use crate::models::order::OrderRecord;

/// Rows per multi-row INSERT
pub const INSERT_CHUNK_SIZE: usize = 200;

pub const STATUS_SUCCEEDED: &str = "SUCCEEDED";

/// Summary of one pipeline run, as stored in `execution_results`
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub status: String,
    pub total_symbols: usize,
    pub total_orders: usize,
    pub artifact_uri: Option<String>,
    pub result_data: Value,
    pub processing_time_seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub inserted: u64,
    /// Already stored for this execution, or repeated within the batch
    pub duplicates: u64,
    /// Missing an order id or a symbol
    pub skipped: u64,
    pub failed: u64,
}

/// Create or update the row for `summary.execution_id`
pub async fn upsert_execution_result(
    db: &DatabaseConnection,
    summary: &ExecutionSummary,
) -> Result<(), DbErr> {
    let now = Utc::now().naive_utc();
    let result_data = summary.result_data.to_string();

    let existing = ExecutionResults::find()
        .filter(execution_results::Column::ExecutionArn.eq(summary.execution_id.as_str()))
        .one(db)
        .await?;

    match existing {
        Some(record) => {
            let mut active_model: execution_results::ActiveModel = record.into();
            active_model.status = Set(summary.status.clone());
            active_model.total_symbols = Set(Some(summary.total_symbols as i32));
            active_model.total_orders = Set(Some(summary.total_orders as i32));
            active_model.artifact_uri = Set(summary.artifact_uri.clone());
            active_model.result_data = Set(Some(result_data));
            active_model.processing_time_seconds = Set(summary.processing_time_seconds);
            active_model.updated_at = Set(now);
            active_model.update(db).await?;
            tracing::info!("Updated execution result {}", summary.execution_id);
        }
        None => {
            let new_record = execution_results::ActiveModel {
                execution_arn: Set(summary.execution_id.clone()),
                status: Set(summary.status.clone()),
                total_symbols: Set(Some(summary.total_symbols as i32)),
                total_orders: Set(Some(summary.total_orders as i32)),
                artifact_uri: Set(summary.artifact_uri.clone()),
                public_url: Set(None),
                result_data: Set(Some(result_data)),
                processing_time_seconds: Set(summary.processing_time_seconds),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            new_record.insert(db).await?;
            tracing::info!("Saved execution result {}", summary.execution_id);
        }
    }

    Ok(())
}

pub async fn find_execution_result(
    db: &DatabaseConnection,
    execution_id: &str,
) -> Result<Option<execution_results::Model>, DbErr> {
    ExecutionResults::find()
        .filter(execution_results::Column::ExecutionArn.eq(execution_id))
        .one(db)
        .await
}

fn to_active_model(record: OrderRecord, created_at: chrono::NaiveDateTime) -> orders::ActiveModel {
    orders::ActiveModel {
        id: NotSet,
        execution_arn: Set(record.execution_id),
        symbol: Set(record.symbol),
        order_id: Set(record.order_id),
        size: Set(record.size),
        price: Set(record.price),
        price_avg: Set(record.price_avg),
        base_volume: Set(record.base_volume),
        quote_volume: Set(record.quote_volume),
        status: Set(record.status),
        side: Set(record.side),
        order_type: Set(record.order_type),
        force: Set(record.force),
        leverage: Set(record.leverage),
        margin_mode: Set(record.margin_mode),
        margin_coin: Set(record.margin_coin),
        pos_side: Set(record.pos_side),
        pos_mode: Set(record.pos_mode),
        trade_side: Set(record.trade_side),
        reduce_only: Set(record.reduce_only),
        pos_avg: Set(record.pos_avg),
        fee: Set(record.fee),
        total_profits: Set(record.total_profits),
        client_oid: Set(record.client_oid),
        order_source: Set(record.order_source),
        enter_point_source: Set(record.enter_point_source),
        preset_stop_surplus_price: Set(record.preset_stop_surplus_price),
        preset_stop_loss_price: Set(record.preset_stop_loss_price),
        c_time: Set(record.c_time),
        u_time: Set(record.u_time),
        created_at: Set(created_at),
    }
}

fn conflict_target() -> OnConflict {
    OnConflict::columns([orders::Column::ExecutionArn, orders::Column::OrderId])
        .do_nothing()
        .to_owned()
}

/// Insert orders for one execution. Existing (execution, order id) pairs are
/// left untouched. A failed chunk is retried row by row so one bad order does
/// not lose its neighbours.
pub async fn insert_orders(
    db: &DatabaseConnection,
    execution_id: &str,
    raw_orders: &[Value],
) -> Result<InsertReport, DbErr> {
    let mut report = InsertReport::default();
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(raw_orders.len());

    for raw in raw_orders {
        match OrderRecord::from_raw(execution_id, raw) {
            Some(record) if seen.insert(record.order_id.clone()) => records.push(record),
            Some(_) => report.duplicates += 1,
            None => report.skipped += 1,
        }
    }

    let created_at = Utc::now().naive_utc();

    for chunk in records.chunks(INSERT_CHUNK_SIZE) {
        let models: Vec<orders::ActiveModel> = chunk
            .iter()
            .cloned()
            .map(|record| to_active_model(record, created_at))
            .collect();

        let result = Orders::insert_many(models)
            .on_conflict(conflict_target())
            .do_nothing()
            .exec_without_returning(db)
            .await;

        match result {
            Ok(TryInsertResult::Inserted(rows)) => {
                report.inserted += rows;
                report.duplicates += chunk.len() as u64 - rows.min(chunk.len() as u64);
            }
            Ok(TryInsertResult::Conflicted) => report.duplicates += chunk.len() as u64,
            Ok(TryInsertResult::Empty) => {}
            Err(e) => {
                tracing::warn!(
                    "Bulk insert of {} orders failed ({}), inserting one at a time",
                    chunk.len(),
                    e
                );
                insert_one_by_one(db, chunk, created_at, &mut report).await;
            }
        }
    }

    tracing::info!(
        "Orders for {}: {} inserted, {} duplicates, {} skipped, {} failed",
        execution_id,
        report.inserted,
        report.duplicates,
        report.skipped,
        report.failed
    );

    Ok(report)
}

async fn insert_one_by_one(
    db: &DatabaseConnection,
    chunk: &[OrderRecord],
    created_at: chrono::NaiveDateTime,
    report: &mut InsertReport,
) {
    for record in chunk {
        let order_id = record.order_id.clone();
        let result = Orders::insert(to_active_model(record.clone(), created_at))
            .exec_without_returning(db)
            .await;

        match result {
            Ok(rows) => report.inserted += rows,
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => report.duplicates += 1,
                _ => {
                    report.failed += 1;
                    tracing::error!("Failed to insert order {}: {}", order_id, e);
                }
            },
        }
    }
}
