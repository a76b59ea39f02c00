use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Статус ответа API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    /// Запрос выполнен
    Success,
    /// Ошибка на стороне клиента (4xx)
    Fail,
    /// Ошибка на стороне сервера (5xx)
    Error,
}

/// Конверт ответа API: `{status, results?, data?}` либо `{status, message}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ApiStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        Self {
            status: ApiStatus::Success,
            results: None,
            data: Some(data),
            message: None,
        }
    }

    /// Успех со счётчиком записей (для списков)
    pub fn success_with_results(results: usize, data: Value) -> Self {
        Self {
            status: ApiStatus::Success,
            results: Some(results),
            data: Some(data),
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Fail,
            results: None,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            results: None,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::success_with_results(
            2,
            json!({"tours": [1, 2]}),
        ))
        .unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["results"], 2);
        assert_eq!(body["data"]["tours"], json!([1, 2]));
        assert!(body.get("message").is_none());
    }

    #[test]
    fn test_fail_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::fail("No tour found with that ID")).unwrap();
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "No tour found with that ID");
        assert!(body.get("data").is_none());
        assert!(body.get("results").is_none());
    }
}
