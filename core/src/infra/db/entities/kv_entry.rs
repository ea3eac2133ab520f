//! Key/value entry entity
//!
//! Each row holds one serialized document (the inspection tree, the sync queue,
//! the divergence log), addressed by a fixed key.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "kv_store")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub key: String,

	/// JSON document
	#[sea_orm(column_type = "Text")]
	pub value: String,

	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
