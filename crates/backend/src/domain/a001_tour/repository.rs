use serde_json::Value;
use uuid::Uuid;

use contracts::domain::a001_tour::aggregate::Tour;

use super::hooks;
use crate::shared::data::doc_storage;
use crate::shared::docstore::{Collection, DocQuery, Document, Stage, StoreError, ID_FIELD};

pub const COLLECTION: &str = "a001_tour";

/// Коллекция туров с полным набором хуков жизненного цикла.
/// Конструируется на каждый вызов: состояние не разделяется между
/// параллельными запросами.
fn collection() -> Collection {
    Collection::new(COLLECTION, hooks::tour_hooks())
}

/// Пустой query handle коллекции
pub fn query() -> DocQuery {
    DocQuery::new()
}

pub async fn find(query: DocQuery) -> Result<Vec<Document>, StoreError> {
    collection().find(query).await
}

pub async fn aggregate(pipeline: Vec<Stage>) -> Result<Vec<Document>, StoreError> {
    collection().aggregate(pipeline).await
}

/// Поиск по id через обычный find-путь: секретные туры не видны.
pub async fn find_by_id(id: Uuid) -> Result<Option<Document>, StoreError> {
    let mut query = DocQuery::new();
    query
        .filter
        .insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Ok(collection().find(query).await?.into_iter().next())
}

/// Прямое чтение по id мимо хуков области видимости — явный обход для
/// путей update/delete.
pub async fn get_raw(id: Uuid) -> anyhow::Result<Option<Document>> {
    doc_storage::get(COLLECTION, &id.to_string()).await
}

pub async fn insert(tour: &Tour) -> Result<Document, StoreError> {
    collection().insert(to_document(tour)?).await
}

pub async fn update(tour: &Tour) -> Result<Document, StoreError> {
    collection().update(to_document(tour)?).await
}

pub async fn delete(id: Uuid) -> Result<bool, StoreError> {
    collection().delete(&id.to_string()).await
}

/// Проверка уникальности имени (уровень хранилища)
pub async fn name_exists(name: &str, exclude_id: Option<Uuid>) -> anyhow::Result<bool> {
    let docs = doc_storage::load_collection(COLLECTION).await?;
    let exclude = exclude_id.map(|id| id.to_string());
    Ok(docs.iter().any(|doc| {
        doc.get("name").and_then(Value::as_str) == Some(name)
            && doc.get(ID_FIELD).and_then(Value::as_str).map(str::to_string) != exclude
    }))
}

fn to_document(tour: &Tour) -> Result<Document, StoreError> {
    match serde_json::to_value(tour) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Storage(anyhow::anyhow!(
            "tour did not serialize to an object"
        ))),
        Err(e) => Err(StoreError::Storage(e.into())),
    }
}

pub fn from_document(doc: &Document) -> anyhow::Result<Tour> {
    Ok(serde_json::from_value(Value::Object(doc.clone()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::domain::a001_tour::aggregate::TourDto;

    #[test]
    fn test_document_round_trip() {
        let tour = TourDto {
            name: Some("Forest Hiker".to_string()),
            price: Some(297.0),
            duration: Some(5),
            max_group_size: Some(25),
            difficulty: Some("easy".to_string()),
            summary: Some("x".to_string()),
            image_cover: Some("y".to_string()),
            discount_price: Some(200.0),
            ..TourDto::default()
        }
        .into_tour()
        .unwrap();

        let doc = to_document(&tour).unwrap();
        assert_eq!(doc["name"], "Forest Hiker");
        assert_eq!(doc["slug"], "forest-hiker");

        let back = from_document(&doc).unwrap();
        assert_eq!(back.id, tour.id);
        assert_eq!(back.price, tour.price);
        assert_eq!(back.discount_price, Some(200.0));
    }

    #[test]
    fn test_from_document_ignores_storage_fields() {
        let tour = TourDto {
            name: Some("Forest Hiker".to_string()),
            price: Some(297.0),
            duration: Some(5),
            max_group_size: Some(25),
            difficulty: Some("easy".to_string()),
            summary: Some("x".to_string()),
            image_cover: Some("y".to_string()),
            ..TourDto::default()
        }
        .into_tour()
        .unwrap();

        let mut doc = to_document(&tour).unwrap();
        doc.insert("__v".to_string(), Value::from(3));
        let back = from_document(&doc).unwrap();
        assert_eq!(back.name, "Forest Hiker");
    }
}
