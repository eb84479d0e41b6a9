//! `SeaORM` Entity for execution_results table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "execution_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub execution_arn: String,
    pub status: String,
    pub total_symbols: Option<i32>,
    pub total_orders: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub artifact_uri: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub public_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub result_data: Option<String>,
    #[sea_orm(column_type = "Double", nullable)]
    pub processing_time_seconds: Option<f64>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
