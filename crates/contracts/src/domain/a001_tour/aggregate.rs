use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::common::ValidationError;

// ============================================================================
// ID Type
// ============================================================================

/// Уникальный идентификатор тура
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TourId(pub Uuid);

impl TourId {
    pub fn new(value: Uuid) -> Self {
        Self(value)
    }

    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

// ============================================================================
// Difficulty
// ============================================================================

/// Сложность тура
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Difficult => "difficult",
        }
    }

    /// Парсинг из строки
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "difficult" => Some(Difficulty::Difficult),
            _ => None,
        }
    }
}

// ============================================================================
// Aggregate Root
// ============================================================================

/// Тур (единица каталога)
///
/// Сериализуется в camelCase — это и форма документа в хранилище,
/// и форма ответа API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: TourId,
    pub name: String,
    pub slug: String,
    pub rating_average: f64,
    pub ratings_quantity: i64,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<f64>,
    pub duration: i64,
    pub max_group_size: i64,
    pub difficulty: Difficulty,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub start_dates: Vec<DateTime<Utc>>,
    pub secret_tour: bool,
}

impl Tour {
    /// Производное поле: длительность в неделях (не хранится)
    pub fn duration_weeks(&self) -> f64 {
        self.duration as f64 / 7.0
    }

    /// Обновить данные из патча
    ///
    /// Пропущенные поля остаются без изменений. id и createdAt
    /// клиентом не изменяются, slug пересчитывается перед записью.
    pub fn apply_patch(&mut self, patch: &TourPatch) -> Result<(), ValidationError> {
        if let Some(name) = &patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(rating) = patch.rating_average {
            self.rating_average = rating;
        }
        if let Some(quantity) = patch.ratings_quantity {
            self.ratings_quantity = quantity;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(discount) = &patch.discount_price {
            self.discount_price = *discount;
        }
        if let Some(duration) = patch.duration {
            self.duration = duration;
        }
        if let Some(size) = patch.max_group_size {
            self.max_group_size = size;
        }
        if let Some(difficulty) = &patch.difficulty {
            self.difficulty = parse_difficulty(difficulty)?;
        }
        if let Some(summary) = &patch.summary {
            self.summary = summary.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.trim().to_string());
        }
        if let Some(cover) = &patch.image_cover {
            self.image_cover = cover.clone();
        }
        if let Some(images) = &patch.images {
            self.images = images.clone();
        }
        if let Some(dates) = &patch.start_dates {
            self.start_dates = dates.clone();
        }
        if let Some(secret) = patch.secret_tour {
            self.secret_tour = secret;
        }
        Ok(())
    }

    /// Валидация данных
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name_len = self.name.chars().count();
        if name_len < 7 {
            return Err(ValidationError::new(
                "name",
                "A tour must have at least 7 characters or more",
            ));
        }
        if name_len > 40 {
            return Err(ValidationError::new(
                "name",
                "A tour must have less or equal than 40 characters",
            ));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_alphabetic() || c.is_whitespace())
        {
            return Err(ValidationError::new(
                "name",
                "A tour must not contain a number",
            ));
        }
        if self.rating_average < 1.0 {
            return Err(ValidationError::new(
                "ratingAverage",
                "A rating must be above 1.0",
            ));
        }
        if self.rating_average > 5.0 {
            return Err(ValidationError::new(
                "ratingAverage",
                "A rating must be below 5.0",
            ));
        }
        if self.ratings_quantity < 0 {
            return Err(ValidationError::new(
                "ratingsQuantity",
                "Ratings quantity can not be negative",
            ));
        }
        if self.price <= 0.0 {
            return Err(ValidationError::new("price", "A tour must have a price"));
        }
        if self.duration <= 0 {
            return Err(ValidationError::new(
                "duration",
                "A tour must have a duration",
            ));
        }
        if self.max_group_size <= 0 {
            return Err(ValidationError::new(
                "maxGroupSize",
                "A tour must have a group size",
            ));
        }
        if self.summary.trim().is_empty() {
            return Err(ValidationError::new(
                "summary",
                "A tour must have a summary",
            ));
        }
        if self.image_cover.trim().is_empty() {
            return Err(ValidationError::new(
                "imageCover",
                "A tour must have a cover image",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// DTO создания тура
///
/// Все поля опциональны на уровне десериализации: отсутствие
/// обязательного поля превращается в ValidationError, а не в отказ
/// разбора тела запроса.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourDto {
    pub name: Option<String>,
    pub rating_average: Option<f64>,
    pub ratings_quantity: Option<i64>,
    pub price: Option<f64>,
    pub discount_price: Option<f64>,
    pub duration: Option<i64>,
    pub max_group_size: Option<i64>,
    pub difficulty: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTime<Utc>>>,
    pub secret_tour: Option<bool>,
}

impl TourDto {
    /// Построить агрегат для вставки: id, slug, createdAt и значения
    /// по умолчанию назначаются сервером.
    pub fn into_tour(self) -> Result<Tour, ValidationError> {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ValidationError::new("name", "A tour must have a name"))?
            .to_string();
        let price = self
            .price
            .ok_or_else(|| ValidationError::new("price", "A tour must have a price"))?;
        let duration = self
            .duration
            .ok_or_else(|| ValidationError::new("duration", "A tour must have a duration"))?;
        let max_group_size = self.max_group_size.ok_or_else(|| {
            ValidationError::new("maxGroupSize", "A tour must have a group size")
        })?;
        let difficulty = self
            .difficulty
            .as_deref()
            .ok_or_else(|| ValidationError::new("difficulty", DIFFICULTY_MESSAGE))
            .and_then(parse_difficulty)?;
        let summary = self
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ValidationError::new("summary", "A tour must have a summary"))?
            .to_string();
        let image_cover = self
            .image_cover
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ValidationError::new("imageCover", "A tour must have a cover image"))?
            .to_string();

        let slug = slugify(&name);
        Ok(Tour {
            id: TourId::new_v4(),
            name,
            slug,
            rating_average: self.rating_average.unwrap_or(4.5),
            ratings_quantity: self.ratings_quantity.unwrap_or(0),
            price,
            discount_price: self.discount_price,
            duration,
            max_group_size,
            difficulty,
            summary,
            description: self.description.map(|d| d.trim().to_string()),
            image_cover,
            images: self.images.unwrap_or_default(),
            created_at: Utc::now(),
            start_dates: self.start_dates.unwrap_or_default(),
            secret_tour: self.secret_tour.unwrap_or(false),
        })
    }
}

/// DTO частичного обновления тура
///
/// discountPrice отличает "не прислано" от "сброшено в null" двойным
/// Option.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourPatch {
    pub name: Option<String>,
    pub rating_average: Option<f64>,
    pub ratings_quantity: Option<i64>,
    pub price: Option<f64>,
    #[serde(default, with = "double_option")]
    pub discount_price: Option<Option<f64>>,
    pub duration: Option<i64>,
    pub max_group_size: Option<i64>,
    pub difficulty: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTime<Utc>>>,
    pub secret_tour: Option<bool>,
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

// ============================================================================
// Derivations
// ============================================================================

const DIFFICULTY_MESSAGE: &str = "a tour difficulty must be: easy, medium or difficult";

fn parse_difficulty(value: &str) -> Result<Difficulty, ValidationError> {
    Difficulty::parse(value.trim())
        .ok_or_else(|| ValidationError::new("difficulty", DIFFICULTY_MESSAGE))
}

/// Слаг из названия: нижний регистр, разделители слов нормализуются
/// в дефис, остальное отбрасывается.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_separator = true;
        }
    }
    slug
}

/// Добавить производные поля в документ ответа.
///
/// durationWeeks вычисляется только когда duration пережил проекцию —
/// по усечённому документу его восстановить нельзя.
pub fn attach_virtual_fields(doc: &mut Map<String, Value>) {
    if let Some(duration) = doc.get("duration").and_then(Value::as_f64) {
        if let Some(weeks) = serde_json::Number::from_f64(duration / 7.0) {
            doc.insert("durationWeeks".to_string(), Value::Number(weeks));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_dto() -> TourDto {
        TourDto {
            name: Some("Forest Hiker".to_string()),
            price: Some(297.0),
            duration: Some(5),
            max_group_size: Some(25),
            difficulty: Some("easy".to_string()),
            summary: Some("x".to_string()),
            image_cover: Some("y".to_string()),
            ..TourDto::default()
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Forest Hiker"), "forest-hiker");
        assert_eq!(slugify("The Sea  Explorer"), "the-sea-explorer");
        assert_eq!(slugify("  Snow Adventurer "), "snow-adventurer");
        assert_eq!(slugify("UPPER case"), "upper-case");
    }

    #[test]
    fn test_into_tour_defaults() {
        let tour = base_dto().into_tour().unwrap();
        assert_eq!(tour.slug, "forest-hiker");
        assert_eq!(tour.rating_average, 4.5);
        assert_eq!(tour.ratings_quantity, 0);
        assert!(!tour.secret_tour);
        assert!(tour.images.is_empty());
        assert_eq!(tour.duration_weeks(), 5.0 / 7.0);
    }

    #[test]
    fn test_into_tour_requires_fields() {
        let mut dto = base_dto();
        dto.name = None;
        assert_eq!(dto.into_tour().unwrap_err().field, "name");

        let mut dto = base_dto();
        dto.price = None;
        assert_eq!(dto.into_tour().unwrap_err().field, "price");

        let mut dto = base_dto();
        dto.difficulty = Some("extreme".to_string());
        let err = dto.into_tour().unwrap_err();
        assert_eq!(err.field, "difficulty");
        assert_eq!(err.message, DIFFICULTY_MESSAGE);
    }

    #[test]
    fn test_validate_name_rules() {
        let mut tour = base_dto().into_tour().unwrap();
        tour.name = "Short".to_string();
        assert_eq!(tour.validate().unwrap_err().field, "name");

        tour.name = "x".repeat(41);
        assert_eq!(tour.validate().unwrap_err().field, "name");

        tour.name = "Tour number 9".to_string();
        let err = tour.validate().unwrap_err();
        assert_eq!(err.message, "A tour must not contain a number");

        tour.name = "Forest Hiker".to_string();
        assert!(tour.validate().is_ok());
    }

    #[test]
    fn test_validate_rating_bounds() {
        let mut tour = base_dto().into_tour().unwrap();
        tour.rating_average = 0.9;
        assert_eq!(tour.validate().unwrap_err().field, "ratingAverage");
        tour.rating_average = 5.1;
        assert_eq!(tour.validate().unwrap_err().field, "ratingAverage");
        tour.rating_average = 1.0;
        assert!(tour.validate().is_ok());
        tour.rating_average = 5.0;
        assert!(tour.validate().is_ok());
    }

    #[test]
    fn test_apply_patch_partial() {
        let mut tour = base_dto().into_tour().unwrap();
        let old_slug = tour.slug.clone();
        let patch = TourPatch {
            price: Some(350.0),
            difficulty: Some("medium".to_string()),
            ..TourPatch::default()
        };
        tour.apply_patch(&patch).unwrap();
        assert_eq!(tour.price, 350.0);
        assert_eq!(tour.difficulty, Difficulty::Medium);
        // name untouched, slug is recomputed later by the write hook
        assert_eq!(tour.name, "Forest Hiker");
        assert_eq!(tour.slug, old_slug);

        let bad = TourPatch {
            difficulty: Some("impossible".to_string()),
            ..TourPatch::default()
        };
        assert!(tour.apply_patch(&bad).is_err());
    }

    #[test]
    fn test_patch_can_clear_discount() {
        let mut tour = base_dto().into_tour().unwrap();
        tour.discount_price = Some(100.0);
        let patch: TourPatch = serde_json::from_str(r#"{"discountPrice": null}"#).unwrap();
        assert_eq!(patch.discount_price, Some(None));
        tour.apply_patch(&patch).unwrap();
        assert_eq!(tour.discount_price, None);

        // absent key leaves the value alone
        tour.discount_price = Some(100.0);
        let patch: TourPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(patch.discount_price, None);
        tour.apply_patch(&patch).unwrap();
        assert_eq!(tour.discount_price, Some(100.0));
    }

    #[test]
    fn test_document_shape_is_camel_case() {
        let tour = base_dto().into_tour().unwrap();
        let value = serde_json::to_value(&tour).unwrap();
        let doc = value.as_object().unwrap();
        assert!(doc.contains_key("maxGroupSize"));
        assert!(doc.contains_key("ratingAverage"));
        assert!(doc.contains_key("imageCover"));
        assert!(doc.contains_key("createdAt"));
        assert_eq!(doc["difficulty"], "easy");
        // derived field is never part of the stored document
        assert!(!doc.contains_key("durationWeeks"));
    }

    #[test]
    fn test_attach_virtual_fields() {
        let tour = base_dto().into_tour().unwrap();
        let mut doc = serde_json::to_value(&tour)
            .unwrap()
            .as_object()
            .cloned()
            .unwrap();
        attach_virtual_fields(&mut doc);
        assert_eq!(doc["durationWeeks"].as_f64().unwrap(), 5.0 / 7.0);

        // projected documents without duration stay untouched
        let mut projected = Map::new();
        projected.insert("name".to_string(), Value::from("Forest Hiker"));
        attach_virtual_fields(&mut projected);
        assert!(!projected.contains_key("durationWeeks"));
    }
}
