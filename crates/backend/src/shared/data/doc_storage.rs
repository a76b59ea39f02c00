use anyhow::Result;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};

use super::db::get_connection;
use crate::shared::docstore::Document;

/// Generic storage row for JSON documents, one row per document.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "document_storage")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub collection: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub doc: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn conn() -> &'static DatabaseConnection {
    get_connection()
}

fn parse_document(row: &Model) -> Option<Document> {
    match serde_json::from_str::<serde_json::Value>(&row.doc) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => {
            tracing::warn!(
                "Skipping malformed document {}/{} in storage",
                row.collection,
                row.id
            );
            None
        }
    }
}

/// Load every document of a collection.
pub async fn load_collection(collection: &str) -> Result<Vec<Document>> {
    let rows = Entity::find()
        .filter(Column::Collection.eq(collection))
        .all(conn())
        .await?;
    Ok(rows.iter().filter_map(parse_document).collect())
}

/// Fetch one document by id, bypassing any query scoping.
pub async fn get(collection: &str, id: &str) -> Result<Option<Document>> {
    let row = Entity::find_by_id((collection.to_string(), id.to_string()))
        .one(conn())
        .await?;
    Ok(row.as_ref().and_then(parse_document))
}

pub async fn insert(collection: &str, id: &str, doc: &Document) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let active = ActiveModel {
        collection: Set(collection.to_string()),
        id: Set(id.to_string()),
        doc: Set(serde_json::to_string(doc)?),
        created_at: Set(now.clone()),
        updated_at: Set(now),
    };
    active.insert(conn()).await?;

    tracing::debug!("Inserted document {}/{}", collection, id);
    Ok(())
}

pub async fn update(collection: &str, id: &str, doc: &Document) -> Result<()> {
    let active = ActiveModel {
        collection: Set(collection.to_string()),
        id: Set(id.to_string()),
        doc: Set(serde_json::to_string(doc)?),
        updated_at: Set(Utc::now().to_rfc3339()),
        ..Default::default()
    };
    active.update(conn()).await?;

    tracing::debug!("Updated document {}/{}", collection, id);
    Ok(())
}

/// Delete one document. Returns false when nothing matched.
pub async fn delete(collection: &str, id: &str) -> Result<bool> {
    let result = Entity::delete_by_id((collection.to_string(), id.to_string()))
        .exec(conn())
        .await?;
    Ok(result.rows_affected > 0)
}
