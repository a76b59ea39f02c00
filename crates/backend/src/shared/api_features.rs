//! Query-string → query translation.
//!
//! Turns an arbitrary, untrusted URL query string into a fully-specified
//! `DocQuery` through four pure stages applied in a fixed order:
//! filter → sort → fields → paginate. Call order is not part of the public
//! surface; `ApiFeatures::apply` is. Malformed input never errors — every
//! stage degrades to its default.

use serde_json::{Map, Value};

use super::docstore::{DocQuery, Projection, SortKey};

/// Control keys consumed by the non-filter stages.
const RESERVED_KEYS: [&str; 4] = ["page", "limit", "sort", "fields"];

/// Comparison tokens rewritten to store operators.
const COMPARISON_TOKENS: [&str; 4] = ["gte", "gt", "lte", "lt"];

const DEFAULT_PAGE: u64 = 1;
const DEFAULT_LIMIT: u64 = 5;

/// Parsed query-string parameters: scalar strings, arrays for repeated
/// keys, one-level maps for bracket keys (`price[gte]=100`).
pub type QueryParams = Map<String, Value>;

/// Parse a raw query string into structured parameters.
pub fn parse_query_string(raw: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = Value::String(decode_component(value));

        match split_bracket_key(&key) {
            Some((field, op)) => {
                let entry = params
                    .entry(field)
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(map) = entry {
                    map.insert(op, value);
                }
            }
            None => insert_param(&mut params, key, value),
        }
    }
    params
}

/// `price[gte]` → `("price", "gte")`
fn split_bracket_key(key: &str) -> Option<(String, String)> {
    let (field, rest) = key.split_once('[')?;
    let op = rest.strip_suffix(']')?;
    if field.is_empty() {
        return None;
    }
    Some((field.to_string(), op.to_string()))
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced.clone(),
    }
}

fn insert_param(params: &mut QueryParams, key: String, value: Value) {
    match params.entry(key) {
        serde_json::map::Entry::Vacant(slot) => {
            slot.insert(value);
        }
        serde_json::map::Entry::Occupied(mut slot) => {
            let current = slot.get_mut();
            if let Value::Array(items) = current {
                items.push(value);
            } else if current.is_string() {
                let previous = current.take();
                *current = Value::Array(vec![previous, value]);
            } else {
                *current = value;
            }
        }
    }
}

/// Builder pairing a query handle with request parameters. The handle is
/// returned unexecuted; execution belongs to the collection.
pub struct ApiFeatures {
    query: DocQuery,
    params: QueryParams,
}

impl ApiFeatures {
    pub fn new(query: DocQuery, params: QueryParams) -> Self {
        Self { query, params }
    }

    /// Run all four stages in the mandated order and hand back the
    /// narrowed, still-unexecuted handle.
    pub fn apply(self) -> DocQuery {
        let query = filter(self.query, &self.params);
        let query = sort(query, &self.params);
        let query = fields(query, &self.params);
        paginate(query, &self.params)
    }
}

/// Stage 1: everything that is not a control key becomes a filter
/// condition, with comparison tokens rewritten to store operators.
/// Unknown fields pass through verbatim; the store decides their fate.
pub fn filter(mut query: DocQuery, params: &QueryParams) -> DocQuery {
    for (key, value) in params {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        query
            .filter
            .insert(key.clone(), rewrite_comparison_tokens(value));
    }
    query
}

/// Recursive walk over the structured predicate: reserved comparison
/// tokens are renamed at the key level, everything else is untouched.
fn rewrite_comparison_tokens(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let key = if COMPARISON_TOKENS.contains(&key.as_str()) {
                        format!("${}", key)
                    } else {
                        key.clone()
                    };
                    (key, rewrite_comparison_tokens(inner))
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(rewrite_comparison_tokens).collect())
        }
        other => other.clone(),
    }
}

/// Stage 2: comma-separated sort terms, `-` prefix for descending,
/// left-to-right priority. Defaults to newest first.
pub fn sort(mut query: DocQuery, params: &QueryParams) -> DocQuery {
    let terms: Vec<SortKey> = params
        .get("sort")
        .and_then(Value::as_str)
        .map(|spec| {
            spec.split(',')
                .map(str::trim)
                .filter(|term| !term.is_empty() && *term != "-")
                .map(|term| match term.strip_prefix('-') {
                    Some(field) => SortKey::desc(field),
                    None => SortKey::asc(term),
                })
                .collect()
        })
        .unwrap_or_default();

    query.sort = if terms.is_empty() {
        vec![SortKey::desc("createdAt")]
    } else {
        terms
    };
    query
}

/// Stage 3: comma-separated inclusion projection. Defaults to hiding the
/// internal version field only.
pub fn fields(mut query: DocQuery, params: &QueryParams) -> DocQuery {
    let listed: Vec<String> = params
        .get("fields")
        .and_then(Value::as_str)
        .map(|spec| {
            spec.split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    query.projection = if listed.is_empty() {
        Projection::DefaultHidden
    } else {
        Projection::Include(listed)
    };
    query
}

/// Stage 4: pagination window. Anything that does not coerce to a
/// positive integer falls back to page 1 / limit 5.
pub fn paginate(mut query: DocQuery, params: &QueryParams) -> DocQuery {
    let page = positive_int(params.get("page")).unwrap_or(DEFAULT_PAGE);
    let limit = positive_int(params.get("limit")).unwrap_or(DEFAULT_LIMIT);
    query.skip = (page - 1) * limit;
    query.limit = Some(limit);
    query
}

fn positive_int(value: Option<&Value>) -> Option<u64> {
    let parsed = match value? {
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    };
    parsed.filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_flat_and_bracket_keys() {
        let params = parse_query_string("difficulty=easy&price[gte]=100&price[lt]=900");
        assert_eq!(params["difficulty"], "easy");
        assert_eq!(params["price"], json!({"gte": "100", "lt": "900"}));
    }

    #[test]
    fn test_parse_decodes_and_collects_duplicates() {
        let params = parse_query_string("name=Forest%20Hiker&tag=a&tag=b&flag");
        assert_eq!(params["name"], "Forest Hiker");
        assert_eq!(params["tag"], json!(["a", "b"]));
        assert_eq!(params["flag"], "");
    }

    #[test]
    fn test_filter_strips_reserved_keys() {
        let params = parse_query_string("difficulty=easy&page=2&limit=3&sort=price&fields=name");
        let query = filter(DocQuery::new(), &params);
        assert_eq!(query.filter.len(), 1);
        assert_eq!(query.filter["difficulty"], "easy");
    }

    #[test]
    fn test_filter_rewrites_comparison_tokens() {
        let params = parse_query_string("price[gte]=100&duration[lt]=10");
        let query = filter(DocQuery::new(), &params);
        assert_eq!(query.filter["price"], json!({"$gte": "100"}));
        assert_eq!(query.filter["duration"], json!({"$lt": "10"}));
    }

    #[test]
    fn test_unknown_tokens_pass_through_untouched() {
        let params = parse_query_string("price[between]=1&rating[gte]=4");
        let query = filter(DocQuery::new(), &params);
        assert_eq!(query.filter["price"], json!({"between": "1"}));
        assert_eq!(query.filter["rating"], json!({"$gte": "4"}));
    }

    #[test]
    fn test_sort_parses_terms_in_priority_order() {
        let params = parse_query_string("sort=-price,name");
        let query = sort(DocQuery::new(), &params);
        assert_eq!(
            query.sort,
            vec![SortKey::desc("price"), SortKey::asc("name")]
        );
    }

    #[test]
    fn test_sort_defaults_to_newest_first() {
        let query = sort(DocQuery::new(), &QueryParams::new());
        assert_eq!(query.sort, vec![SortKey::desc("createdAt")]);

        // an unusable sort value degrades to the same default
        let params = parse_query_string("sort=,");
        let query = sort(DocQuery::new(), &params);
        assert_eq!(query.sort, vec![SortKey::desc("createdAt")]);
    }

    #[test]
    fn test_fields_inclusion_and_default() {
        let params = parse_query_string("fields=name,price");
        let query = fields(DocQuery::new(), &params);
        assert_eq!(
            query.projection,
            Projection::Include(vec!["name".to_string(), "price".to_string()])
        );

        let query = fields(DocQuery::new(), &QueryParams::new());
        assert_eq!(query.projection, Projection::DefaultHidden);
    }

    #[test]
    fn test_paginate_defaults_and_window() {
        let query = paginate(DocQuery::new(), &QueryParams::new());
        assert_eq!(query.skip, 0);
        assert_eq!(query.limit, Some(5));

        let params = parse_query_string("page=3&limit=10");
        let query = paginate(DocQuery::new(), &params);
        assert_eq!(query.skip, 20);
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn test_paginate_rejects_non_positive_input() {
        for raw in ["page=0&limit=0", "page=-2&limit=abc", "page=1.5&limit="] {
            let params = parse_query_string(raw);
            let query = paginate(DocQuery::new(), &params);
            assert_eq!(query.skip, 0, "raw: {raw}");
            assert_eq!(query.limit, Some(5), "raw: {raw}");
        }
    }

    #[test]
    fn test_stage_chain_is_idempotent() {
        let params =
            parse_query_string("difficulty=easy&price[gte]=100&sort=-price,name&fields=name,price&page=2&limit=2");
        let once = ApiFeatures::new(DocQuery::new(), params.clone()).apply();
        let twice = ApiFeatures::new(once.clone(), params).apply();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_full_chain_spec() {
        let params = parse_query_string("difficulty=easy&sort=price&fields=name,price&page=2&limit=2");
        let query = ApiFeatures::new(DocQuery::new(), params).apply();
        assert_eq!(query.filter["difficulty"], "easy");
        assert_eq!(query.sort, vec![SortKey::asc("price")]);
        assert_eq!(
            query.projection,
            Projection::Include(vec!["name".to_string(), "price".to_string()])
        );
        assert_eq!(query.skip, 2);
        assert_eq!(query.limit, Some(2));
    }
}
