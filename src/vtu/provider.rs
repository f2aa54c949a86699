use async_trait::async_trait;
use reqwest::Response;
use serde_json::Value as JsonValue;

use super::types::{ProviderReply, ReplyStatus, ServiceKind, VtuRequest};
use super::VtuError;

#[async_trait]
pub trait VtuProvider: Send + Sync {
    /// Matches `ProviderConfig::code`.
    fn code(&self) -> &'static str;

    fn supports(&self, service: ServiceKind) -> bool;

    /// Place a purchase. Never retried: upstream purchase endpoints are not idempotent.
    async fn purchase(&self, request: &VtuRequest) -> Result<ProviderReply, VtuError>;

    /// Ask for the final state of an earlier purchase by our reference.
    async fn query(&self, reference: &str) -> Result<ProviderReply, VtuError>;
}

/// Read a provider response into status code and JSON body.
///
/// Non-JSON bodies are kept as a JSON string so the interpreter can still
/// scan them.
pub(crate) async fn read_body(
    provider: &str,
    response: Response,
) -> Result<(u16, JsonValue), VtuError> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| VtuError::from_reqwest(provider, e))?;

    let body = serde_json::from_str::<JsonValue>(&text).unwrap_or(JsonValue::String(text));
    Ok((status, body))
}

pub(crate) fn str_at<'a>(body: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut current = body;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

/// Like [`str_at`] but also renders numbers, which some providers use for ids.
pub(crate) fn string_at(body: &JsonValue, path: &[&str]) -> Option<String> {
    let mut current = body;
    for key in path {
        current = current.get(*key)?;
    }
    match current {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map the usual provider status words onto [`ReplyStatus`].
pub(crate) fn status_from_word(word: &str) -> ReplyStatus {
    match word.trim().to_lowercase().as_str() {
        "success" | "successful" | "delivered" | "completed" | "true" => ReplyStatus::Success,
        "failed" | "fail" | "failure" | "error" | "reversed" | "false" | "cancelled" => {
            ReplyStatus::Failed
        }
        "pending" | "processing" | "initiated" | "queued" => ReplyStatus::Processing,
        other => ReplyStatus::Unrecognized(other.to_string()),
    }
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, VtuError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| VtuError::Transport {
            provider: "http".to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_words_are_normalized() {
        assert_eq!(status_from_word("SUCCESSFUL"), ReplyStatus::Success);
        assert_eq!(status_from_word("reversed"), ReplyStatus::Failed);
        assert_eq!(status_from_word(" initiated "), ReplyStatus::Processing);
        assert_eq!(
            status_from_word("maybe"),
            ReplyStatus::Unrecognized("maybe".to_string())
        );
    }

    #[test]
    fn string_at_renders_numeric_ids() {
        let body = json!({"data": {"id": 9912, "ref": "abc", "empty": ""}});
        assert_eq!(string_at(&body, &["data", "id"]), Some("9912".to_string()));
        assert_eq!(string_at(&body, &["data", "ref"]), Some("abc".to_string()));
        assert_eq!(string_at(&body, &["data", "empty"]), None);
        assert_eq!(str_at(&body, &["data", "missing"]), None);
    }
}
