use serde_json::{json, Value};
use uuid::Uuid;

use contracts::domain::a001_tour::aggregate::{attach_virtual_fields, Tour, TourDto, TourPatch};
use contracts::domain::common::ValidationError;

use super::{repository, TourError};
use crate::shared::api_features::{ApiFeatures, QueryParams};
use crate::shared::docstore::{object, Accumulator, Document, SortKey, Stage, VERSION_FIELD};

/// Получение списка туров по параметрам запроса
pub async fn list(params: QueryParams) -> Result<Vec<Document>, TourError> {
    let query = ApiFeatures::new(repository::query(), params).apply();
    let mut docs = repository::find(query).await?;
    for doc in &mut docs {
        attach_virtual_fields(doc);
    }
    Ok(docs)
}

/// Предустановка "топ-5 туров" поверх параметров клиента
pub fn top_tours_params(mut params: QueryParams) -> QueryParams {
    params.insert("limit".to_string(), Value::String("5".to_string()));
    params.insert(
        "sort".to_string(),
        Value::String("-ratingAverage,price".to_string()),
    );
    params.insert(
        "fields".to_string(),
        Value::String("name,price,ratingAverage,summary,difficulty".to_string()),
    );
    params
}

/// Получение тура по ID (через обычный find-путь: секретные не видны)
pub async fn get_by_id(id: Uuid) -> Result<Option<Document>, TourError> {
    let mut doc = repository::find_by_id(id).await?;
    if let Some(doc) = doc.as_mut() {
        attach_virtual_fields(doc);
    }
    Ok(doc)
}

/// Создание нового тура
pub async fn create(dto: TourDto) -> Result<Document, TourError> {
    let tour = dto.into_tour()?;
    tour.validate()?;
    if repository::name_exists(&tour.name, None).await? {
        return Err(TourError::Validation(ValidationError::new(
            "name",
            "A tour with this name already exists",
        )));
    }
    let doc = repository::insert(&tour).await?;
    tracing::info!("Created tour {} ({})", tour.name, tour.id.value());
    Ok(present(doc))
}

/// Частичное обновление тура: валидаторы агрегата выполняются заново,
/// slug пересчитывается хуком записи.
pub async fn update(id: Uuid, patch: TourPatch) -> Result<Option<Document>, TourError> {
    let Some(raw) = repository::get_raw(id).await? else {
        return Ok(None);
    };
    let mut tour: Tour = repository::from_document(&raw)?;
    tour.apply_patch(&patch)?;
    tour.validate()?;
    if repository::name_exists(&tour.name, Some(id)).await? {
        return Err(TourError::Validation(ValidationError::new(
            "name",
            "A tour with this name already exists",
        )));
    }
    let doc = repository::update(&tour).await?;
    Ok(Some(present(doc)))
}

/// Удаление тура по ID. Терминальная операция, без корзины.
pub async fn delete(id: Uuid) -> Result<bool, TourError> {
    Ok(repository::delete(id).await?)
}

/// Статистика по сложности: только туры с рейтингом от 4.5
pub async fn stats() -> Result<Vec<Document>, TourError> {
    let pipeline = vec![
        Stage::Match(object(json!({"ratingAverage": {"$gte": 4.5}}))),
        Stage::Group {
            by: "difficulty".to_string(),
            fields: vec![
                ("numTours".to_string(), Accumulator::Count),
                (
                    "avgRating".to_string(),
                    Accumulator::Avg("ratingAverage".to_string()),
                ),
                ("avgPrice".to_string(), Accumulator::Avg("price".to_string())),
                ("minPrice".to_string(), Accumulator::Min("price".to_string())),
                ("maxPrice".to_string(), Accumulator::Max("price".to_string())),
            ],
        },
        Stage::Sort(vec![SortKey::asc("avgPrice")]),
    ];
    Ok(repository::aggregate(pipeline).await?)
}

/// Вставка тестовых данных (уже существующие имена пропускаются)
pub async fn insert_test_data() -> Result<(), TourError> {
    for dto in sample_tours() {
        let name = dto.name.clone().unwrap_or_default();
        if repository::name_exists(&name, None).await? {
            continue;
        }
        create(dto).await?;
    }
    Ok(())
}

fn present(mut doc: Document) -> Document {
    doc.remove(VERSION_FIELD);
    attach_virtual_fields(&mut doc);
    doc
}

fn sample_tours() -> Vec<TourDto> {
    vec![
        TourDto {
            name: Some("The Forest Hiker".to_string()),
            price: Some(397.0),
            duration: Some(5),
            max_group_size: Some(25),
            difficulty: Some("easy".to_string()),
            rating_average: Some(4.7),
            ratings_quantity: Some(37),
            summary: Some("Breathtaking hike through the Canadian Banff National Park".to_string()),
            image_cover: Some("tour-1-cover.jpg".to_string()),
            ..TourDto::default()
        },
        TourDto {
            name: Some("The Sea Explorer".to_string()),
            price: Some(497.0),
            duration: Some(7),
            max_group_size: Some(15),
            difficulty: Some("medium".to_string()),
            rating_average: Some(4.8),
            ratings_quantity: Some(23),
            summary: Some("Exploring the jaw-dropping US east coast by foot and by boat".to_string()),
            image_cover: Some("tour-2-cover.jpg".to_string()),
            ..TourDto::default()
        },
        TourDto {
            name: Some("The Snow Adventurer".to_string()),
            price: Some(997.0),
            discount_price: Some(870.0),
            duration: Some(4),
            max_group_size: Some(10),
            difficulty: Some("difficult".to_string()),
            rating_average: Some(4.5),
            ratings_quantity: Some(13),
            summary: Some("Exciting adventure in the snow with snowboarding and skiing".to_string()),
            image_cover: Some("tour-3-cover.jpg".to_string()),
            ..TourDto::default()
        },
        TourDto {
            name: Some("The Secret Valley".to_string()),
            price: Some(297.0),
            duration: Some(3),
            max_group_size: Some(8),
            difficulty: Some("easy".to_string()),
            summary: Some("Members-only valley retreat, hidden from the catalog".to_string()),
            image_cover: Some("tour-4-cover.jpg".to_string()),
            secret_tour: Some(true),
            ..TourDto::default()
        },
    ]
}
