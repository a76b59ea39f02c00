//! In-process evaluation of `DocQuery` handles and aggregate pipelines.
//!
//! Query-string operands arrive untyped, so comparisons coerce numeric
//! strings to numbers before comparing. Unknown fields or incomparable
//! values simply fail to match; this layer never errors.

use std::cmp::Ordering;

use serde_json::Value;

use super::{Accumulator, DocQuery, Document, Projection, SortDir, SortKey, Stage, ID_FIELD, VERSION_FIELD};

const COMPARISON_OPERATORS: [&str; 6] = ["$gte", "$gt", "$lte", "$lt", "$ne", "$eq"];

/// Apply a fully-assembled query to a loaded collection:
/// filter, then sort, then window, then project.
pub fn apply(query: &DocQuery, docs: Vec<Document>) -> Vec<Document> {
    let mut matched: Vec<Document> = docs
        .into_iter()
        .filter(|doc| matches_filter(doc, &query.filter))
        .collect();
    if !query.sort.is_empty() {
        sort_documents(&mut matched, &query.sort);
    }
    let mut windowed: Vec<Document> = matched.into_iter().skip(query.skip as usize).collect();
    if let Some(limit) = query.limit {
        windowed.truncate(limit as usize);
    }
    windowed
        .into_iter()
        .map(|doc| project(doc, &query.projection))
        .collect()
}

/// True when the document satisfies every condition of the filter.
pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(field, cond)| matches_condition(doc.get(field), cond))
}

fn matches_condition(value: Option<&Value>, cond: &Value) -> bool {
    // an object whose keys are all comparison operators is a range
    // condition; any other shape is literal equality
    if let Value::Object(ops) = cond {
        if !ops.is_empty()
            && ops
                .keys()
                .all(|key| COMPARISON_OPERATORS.contains(&key.as_str()))
        {
            return ops
                .iter()
                .all(|(op, operand)| apply_operator(value, op, operand));
        }
    }
    loose_eq(value.unwrap_or(&Value::Null), cond)
}

fn apply_operator(value: Option<&Value>, op: &str, operand: &Value) -> bool {
    match op {
        "$eq" => loose_eq(value.unwrap_or(&Value::Null), operand),
        "$ne" => !loose_eq(value.unwrap_or(&Value::Null), operand),
        _ => {
            let Some(value) = value else {
                return false;
            };
            let Some(ordering) = compare_values(value, operand) else {
                return false;
            };
            match op {
                "$gt" => ordering == Ordering::Greater,
                "$gte" => ordering != Ordering::Less,
                "$lt" => ordering == Ordering::Less,
                "$lte" => ordering != Ordering::Greater,
                _ => false,
            }
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (as_bool(a), as_bool(b)) {
        return x == y;
    }
    false
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Stable multi-key sort; documents missing a sort field order after
/// documents that carry it.
pub fn sort_documents(docs: &mut [Document], keys: &[SortKey]) {
    docs.sort_by(|a, b| {
        for key in keys {
            let ordering = match (a.get(&key.field), b.get(&key.field)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match key.dir {
                SortDir::Asc => ordering,
                SortDir::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn project(mut doc: Document, projection: &Projection) -> Document {
    match projection {
        Projection::DefaultHidden => {
            doc.remove(VERSION_FIELD);
            doc
        }
        Projection::Include(fields) => {
            let mut out = Document::new();
            if let Some(id) = doc.get(ID_FIELD) {
                out.insert(ID_FIELD.to_string(), id.clone());
            }
            for field in fields {
                if field == ID_FIELD {
                    continue;
                }
                if let Some(value) = doc.get(field) {
                    out.insert(field.clone(), value.clone());
                }
            }
            out
        }
    }
}

/// Run an aggregate pipeline stage by stage over a loaded collection.
pub fn run_pipeline(stages: &[Stage], docs: Vec<Document>) -> Vec<Document> {
    let mut current = docs;
    for stage in stages {
        current = match stage {
            Stage::Match(filter) => current
                .into_iter()
                .filter(|doc| matches_filter(doc, filter))
                .collect(),
            Stage::Group { by, fields } => group_documents(&current, by, fields),
            Stage::Sort(keys) => {
                let mut sorted = current;
                sort_documents(&mut sorted, keys);
                sorted
            }
        };
    }
    current
}

fn group_documents(docs: &[Document], by: &str, fields: &[(String, Accumulator)]) -> Vec<Document> {
    // buckets keyed by serialized group value, ordered by first occurrence
    let mut buckets: Vec<(String, Value, Vec<&Document>)> = Vec::new();
    for doc in docs {
        let key_value = doc.get(by).cloned().unwrap_or(Value::Null);
        let key = key_value.to_string();
        match buckets.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, members)) => members.push(doc),
            None => buckets.push((key, key_value, vec![doc])),
        }
    }
    buckets
        .into_iter()
        .map(|(_, key_value, members)| {
            let mut out = Document::new();
            out.insert("_id".to_string(), key_value);
            for (name, accumulator) in fields {
                out.insert(name.clone(), accumulate(accumulator, &members));
            }
            out
        })
        .collect()
}

fn accumulate(accumulator: &Accumulator, docs: &[&Document]) -> Value {
    match accumulator {
        Accumulator::Count => Value::from(docs.len() as u64),
        Accumulator::Sum(field) => number_value(numeric_values(docs, field).iter().sum()),
        Accumulator::Avg(field) => {
            let nums = numeric_values(docs, field);
            if nums.is_empty() {
                Value::Null
            } else {
                number_value(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        Accumulator::Min(field) => numeric_values(docs, field)
            .into_iter()
            .reduce(f64::min)
            .map(number_value)
            .unwrap_or(Value::Null),
        Accumulator::Max(field) => numeric_values(docs, field)
            .into_iter()
            .reduce(f64::max)
            .map(number_value)
            .unwrap_or(Value::Null),
    }
}

fn numeric_values(docs: &[&Document], field: &str) -> Vec<f64> {
    docs.iter()
        .filter_map(|doc| doc.get(field).and_then(as_number))
        .collect()
}

fn number_value(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    fn sample_docs() -> Vec<Document> {
        vec![
            doc(json!({"id": "1", "name": "Alpine Trek", "price": 400, "difficulty": "medium", "__v": 0})),
            doc(json!({"id": "2", "name": "City Stroll", "price": 100, "difficulty": "easy", "__v": 0})),
            doc(json!({"id": "3", "name": "Beach Walk", "price": 100, "difficulty": "easy", "__v": 0})),
            doc(json!({"id": "4", "name": "Desert Crossing", "price": 900, "difficulty": "difficult", "__v": 0})),
        ]
    }

    #[test]
    fn test_equality_filter() {
        let filter = doc(json!({"difficulty": "easy"}));
        let matched: Vec<_> = sample_docs()
            .into_iter()
            .filter(|d| matches_filter(d, &filter))
            .collect();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_numeric_string_coercion() {
        // operands parsed from a query string are strings
        let filter = doc(json!({"price": {"$gte": "400"}}));
        let matched: Vec<_> = sample_docs()
            .into_iter()
            .filter(|d| matches_filter(d, &filter))
            .collect();
        assert_eq!(matched.len(), 2);

        let filter = doc(json!({"price": "100"}));
        let matched: Vec<_> = sample_docs()
            .into_iter()
            .filter(|d| matches_filter(d, &filter))
            .collect();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_range_operators() {
        let docs = sample_docs();
        let gt = doc(json!({"price": {"$gt": 100}}));
        assert_eq!(docs.iter().filter(|d| matches_filter(d, &gt)).count(), 2);
        let lte = doc(json!({"price": {"$lte": 100}}));
        assert_eq!(docs.iter().filter(|d| matches_filter(d, &lte)).count(), 2);
        let band = doc(json!({"price": {"$gte": 100, "$lt": 900}}));
        assert_eq!(docs.iter().filter(|d| matches_filter(d, &band)).count(), 3);
    }

    #[test]
    fn test_missing_field_never_matches_ranges() {
        let filter = doc(json!({"discountPrice": {"$gte": 1}}));
        assert_eq!(
            sample_docs()
                .iter()
                .filter(|d| matches_filter(d, &filter))
                .count(),
            0
        );
    }

    #[test]
    fn test_ne_matches_missing_field() {
        let filter = doc(json!({"secretTour": {"$ne": true}}));
        // none of the sample docs carry the flag at all
        assert_eq!(
            sample_docs()
                .iter()
                .filter(|d| matches_filter(d, &filter))
                .count(),
            4
        );
        let secret = doc(json!({"id": "9", "secretTour": true}));
        assert!(!matches_filter(&secret, &filter));
        let open = doc(json!({"id": "8", "secretTour": false}));
        assert!(matches_filter(&open, &filter));
    }

    #[test]
    fn test_non_operator_object_is_literal_equality() {
        let filter = doc(json!({"price": {"weird": 1}}));
        assert_eq!(
            sample_docs()
                .iter()
                .filter(|d| matches_filter(d, &filter))
                .count(),
            0
        );
    }

    #[test]
    fn test_multi_key_sort_with_tie_break() {
        let mut docs = sample_docs();
        sort_documents(
            &mut docs,
            &[SortKey::desc("price"), SortKey::asc("name")],
        );
        let names: Vec<_> = docs
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        // non-increasing by price, ties broken by ascending name
        assert_eq!(
            names,
            vec!["Desert Crossing", "Alpine Trek", "Beach Walk", "City Stroll"]
        );
    }

    #[test]
    fn test_default_projection_hides_version_field() {
        let query = DocQuery::new();
        let out = apply(&query, sample_docs());
        assert_eq!(out.len(), 4);
        for d in &out {
            assert!(!d.contains_key("__v"));
            assert!(d.contains_key("name"));
        }
    }

    #[test]
    fn test_inclusion_projection_keeps_id() {
        let mut query = DocQuery::new();
        query.projection = Projection::Include(vec!["name".to_string(), "price".to_string()]);
        let out = apply(&query, sample_docs());
        for d in &out {
            let mut keys: Vec<_> = d.keys().cloned().collect();
            keys.sort();
            assert_eq!(keys, vec!["id", "name", "price"]);
        }
    }

    #[test]
    fn test_window() {
        let mut query = DocQuery::new();
        query.sort = vec![SortKey::asc("price"), SortKey::asc("name")];
        query.skip = 1;
        query.limit = Some(2);
        let out = apply(&query, sample_docs());
        let names: Vec<_> = out.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["City Stroll", "Alpine Trek"]);
    }

    #[test]
    fn test_window_past_end_is_empty() {
        let mut query = DocQuery::new();
        query.skip = 10;
        query.limit = Some(5);
        assert!(apply(&query, sample_docs()).is_empty());
    }

    #[test]
    fn test_pipeline_match_then_group() {
        let stages = vec![
            Stage::Match(doc(json!({"price": {"$lte": 400}}))),
            Stage::Group {
                by: "difficulty".to_string(),
                fields: vec![
                    ("numTours".to_string(), Accumulator::Count),
                    ("avgPrice".to_string(), Accumulator::Avg("price".to_string())),
                    ("minPrice".to_string(), Accumulator::Min("price".to_string())),
                    ("maxPrice".to_string(), Accumulator::Max("price".to_string())),
                    ("total".to_string(), Accumulator::Sum("price".to_string())),
                ],
            },
            Stage::Sort(vec![SortKey::asc("avgPrice")]),
        ];
        let out = run_pipeline(&stages, sample_docs());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["_id"], "easy");
        assert_eq!(out[0]["numTours"], 2);
        assert_eq!(out[0]["avgPrice"].as_f64().unwrap(), 100.0);
        assert_eq!(out[0]["total"].as_f64().unwrap(), 200.0);
        assert_eq!(out[1]["_id"], "medium");
        assert_eq!(out[1]["minPrice"].as_f64().unwrap(), 400.0);
        assert_eq!(out[1]["maxPrice"].as_f64().unwrap(), 400.0);
    }

    #[test]
    fn test_group_on_missing_field_buckets_as_null() {
        let docs = vec![doc(json!({"id": "1", "price": 10}))];
        let stages = vec![Stage::Group {
            by: "difficulty".to_string(),
            fields: vec![("numTours".to_string(), Accumulator::Count)],
        }];
        let out = run_pipeline(&stages, docs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["_id"], Value::Null);
        assert_eq!(out[0]["numTours"], 1);
    }
}
