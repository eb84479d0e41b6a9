//! `SeaORM` Entity for orders table
//!
//! Unique on (execution_arn, order_id).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub execution_arn: String,
    pub symbol: String,
    pub order_id: String,
    pub size: Option<String>,
    pub price: Option<String>,
    pub price_avg: Option<String>,
    pub base_volume: Option<String>,
    pub quote_volume: Option<String>,
    pub status: Option<String>,
    pub side: Option<String>,
    pub order_type: Option<String>,
    pub force: Option<String>,
    pub leverage: Option<String>,
    pub margin_mode: Option<String>,
    pub margin_coin: Option<String>,
    pub pos_side: Option<String>,
    pub pos_mode: Option<String>,
    pub trade_side: Option<String>,
    pub reduce_only: Option<String>,
    pub pos_avg: Option<String>,
    pub fee: Option<String>,
    pub total_profits: Option<String>,
    pub client_oid: Option<String>,
    pub order_source: Option<String>,
    pub enter_point_source: Option<String>,
    pub preset_stop_surplus_price: Option<String>,
    pub preset_stop_loss_price: Option<String>,
    pub c_time: Option<i64>,
    pub u_time: Option<i64>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
