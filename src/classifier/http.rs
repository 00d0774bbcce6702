//! A blocking HTTP adapter for an OpenAI-compatible chat-completions
//! endpoint.

use std::time::Duration;

use reqwest::{StatusCode, blocking::Client};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    classifier::{Classifier, SYSTEM_PROMPT, TransactionSummary, build_user_prompt},
};

/// How long one request may take before the transport gives up. A hung call
/// is otherwise unbounded, since the retry policy only counts attempts.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A [Classifier] that submits batches to an OpenAI-compatible
/// `/chat/completions` endpoint over blocking HTTP.
#[derive(Debug)]
pub struct HttpClassifier {
    client: Client,
    api_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl HttpClassifier {
    /// Create a classifier that posts to `api_url` using `model`,
    /// authenticating with `api_key` as a bearer token.
    pub fn new(api_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl Classifier for HttpClassifier {
    fn classify(&self, batch: &[TransactionSummary]) -> Result<String, Error> {
        let user_prompt = build_user_prompt(batch)?;
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
        };

        tracing::debug!("Submitting batch of {} transactions", batch.len());

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .map_err(|error| {
                if error.is_timeout() || error.is_connect() {
                    Error::ServiceUnreachable(error.to_string())
                } else {
                    Error::ClassifierRequest(error.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(format!(
                "classification service returned {status}"
            )));
        }
        if status.is_server_error() {
            return Err(Error::ServiceUnreachable(format!(
                "classification service returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(Error::ClassifierRequest(format!(
                "classification service returned {status}"
            )));
        }

        let text = response
            .text()
            .map_err(|error| Error::ServiceUnreachable(error.to_string()))?;
        let envelope: ChatResponse =
            serde_json::from_str(&text).map_err(|error| Error::UnparseableResponse {
                reason: format!("malformed chat completion envelope: {error}"),
                response_text: text.clone(),
            })?;

        let choice = envelope
            .choices
            .into_iter()
            .next()
            .ok_or(Error::UnparseableResponse {
                reason: "chat completion contained no choices".to_string(),
                response_text: text,
            })?;

        Ok(choice.message.content)
    }
}

#[cfg(test)]
mod http_classifier_tests {
    use crate::classifier::http::{ChatMessage, ChatRequest};

    #[test]
    fn chat_request_serializes_in_openai_shape() {
        let body = ChatRequest {
            model: "gpt-4.1-mini",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "instructions",
                },
                ChatMessage {
                    role: "user",
                    content: "transactions",
                },
            ],
        };

        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-4.1-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "transactions");
    }
}
