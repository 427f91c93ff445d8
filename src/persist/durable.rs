//! Postgres-backed storage via sea-orm. Reads go straight to the
//! primary key; writes use an upsert so the caller never has to know
//! whether a chat row already exists.

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::Value;

use crate::persist::entities::{chat_context, chat_state};
use crate::persist::StorageBackend;
use crate::state_machine::types::{ChatId, StateCode};
use crate::util::error::{Result, StorageErrorKind};

pub struct DurableStorage {
    db: DatabaseConnection,
}

impl DurableStorage {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StorageBackend for DurableStorage {
    async fn get_state(&self, chat_id: ChatId) -> Result<Option<StateCode>> {
        let row = chat_state::Entity::find_by_id(chat_id)
            .one(&self.db)
            .await
            .map_err(StorageErrorKind::from)?;
        Ok(row.map(|m| m.state_code))
    }

    async fn set_state(&self, chat_id: ChatId, state_code: &str) -> Result<()> {
        chat_state::Entity::insert(chat_state::ActiveModel {
            chat_id: Set(chat_id),
            state_code: Set(state_code.to_owned()),
        })
        .on_conflict(
            OnConflict::column(chat_state::Column::ChatId)
                .update_column(chat_state::Column::StateCode)
                .to_owned(),
        )
        .exec(&self.db)
        .await
        .map_err(StorageErrorKind::from)?;
        Ok(())
    }

    async fn get_context(&self, chat_id: ChatId) -> Result<Value> {
        let row = chat_context::Entity::find_by_id(chat_id)
            .one(&self.db)
            .await
            .map_err(StorageErrorKind::from)?;
        Ok(row.map(|m| m.context).unwrap_or(Value::Null))
    }

    async fn set_context(&self, chat_id: ChatId, context: Value) -> Result<()> {
        chat_context::Entity::insert(chat_context::ActiveModel {
            chat_id: Set(chat_id),
            context: Set(context),
        })
        .on_conflict(
            OnConflict::column(chat_context::Column::ChatId)
                .update_column(chat_context::Column::Context)
                .to_owned(),
        )
        .exec(&self.db)
        .await
        .map_err(StorageErrorKind::from)?;
        Ok(())
    }

    async fn forget(&self, chat_id: ChatId) -> Result<()> {
        chat_state::Entity::delete_many()
            .filter(chat_state::Column::ChatId.eq(chat_id))
            .exec(&self.db)
            .await
            .map_err(StorageErrorKind::from)?;
        chat_context::Entity::delete_many()
            .filter(chat_context::Column::ChatId.eq(chat_id))
            .exec(&self.db)
            .await
            .map_err(StorageErrorKind::from)?;
        Ok(())
    }
}
