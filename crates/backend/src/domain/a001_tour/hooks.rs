//! Lifecycle hooks of the tour collection.
//!
//! Registration order is execution order: slug derivation runs before the
//! discount validator, so a rejected document never carries a stale slug.

use serde_json::{json, Value};

use contracts::domain::a001_tour::aggregate::slugify;
use contracts::domain::common::ValidationError;

use crate::shared::docstore::{object, DocQuery, Document, LifecycleHooks, Stage, WriteOp};

const SECRET_FLAG: &str = "secretTour";

/// Полный набор хуков коллекции туров
pub fn tour_hooks() -> LifecycleHooks {
    LifecycleHooks::new()
        .on_before_write(derive_slug)
        .on_before_write(validate_discount)
        .on_before_read(scope_secret_tours)
        .on_after_read(log_query_timing)
        .on_before_aggregate(scope_secret_aggregate)
}

/// Slug пересчитывается из текущего name перед КАЖДОЙ записью, даже
/// если name не менялся — slug никогда не отстаёт от name.
fn derive_slug(doc: &mut Document, _op: WriteOp) -> Result<(), ValidationError> {
    if let Some(name) = doc.get("name").and_then(Value::as_str) {
        let slug = slugify(name);
        doc.insert("slug".to_string(), Value::String(slug));
    }
    Ok(())
}

/// Инвариант скидки действует только при создании документа —
/// унаследованная асимметрия валидаторов хранилища.
fn validate_discount(doc: &mut Document, op: WriteOp) -> Result<(), ValidationError> {
    if op != WriteOp::Create {
        return Ok(());
    }
    if let (Some(discount), Some(price)) = (
        doc.get("discountPrice").and_then(Value::as_f64),
        doc.get("price").and_then(Value::as_f64),
    ) {
        if discount >= price {
            return Err(ValidationError::new(
                "discountPrice",
                format!("Discount price ({discount}) should be below the regular price"),
            ));
        }
    }
    Ok(())
}

/// Секретные туры исключаются из всякого find-запроса. Явное условие
/// `secretTour: false` уже строже и сохраняется; любое другое условие
/// клиента на флаге заменяется.
fn scope_secret_tours(query: &mut DocQuery) {
    let already_narrower = matches!(query.filter.get(SECRET_FLAG), Some(Value::Bool(false)));
    if !already_narrower {
        query
            .filter
            .insert(SECRET_FLAG.to_string(), json!({"$ne": true}));
    }
}

fn log_query_timing(docs: &[Document], elapsed: std::time::Duration) {
    tracing::debug!(
        "Tour query returned {} documents in {} ms",
        docs.len(),
        elapsed.as_millis()
    );
}

/// Для агрегаций match-стадия безусловно вставляется в начало пайплайна.
fn scope_secret_aggregate(pipeline: &mut Vec<Stage>) {
    pipeline.insert(0, Stage::Match(object(json!({SECRET_FLAG: {"$ne": true}}))));
}
