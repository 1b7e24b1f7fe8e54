//! memora-client — HTTP client for the workflow-automation webhook service.
//!
//! The backend owns storage, face recognition, and conversation generation;
//! this crate is the thin caller side: one generic `{action, user_id, data}`
//! endpoint for CRUD plus dedicated recognition and conversation endpoints.
//! The backend's responses are shape-shifty (empty bodies, bare values,
//! enveloped values), so parsing is deliberately lenient.

pub mod types;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

pub use types::{ApiResponse, Confidence, Patient, Person, RecognizeResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("could not read response body: {0}")]
    Body(#[from] std::io::Error),
    #[error("unexpected response format: {0}")]
    UnexpectedFormat(String),
}

impl From<ureq::Error> for ClientError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(code, _) => ClientError::Status(code),
            other => ClientError::Transport(other.to_string()),
        }
    }
}

/// Webhook endpoint URLs, one per concern.
#[derive(Debug, Clone)]
pub struct WebhookEndpoints {
    pub api_url: String,
    pub recognize_url: String,
    pub conversation_url: String,
}

impl Default for WebhookEndpoints {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5678/webhook/api".to_string(),
            recognize_url: "http://localhost:5678/webhook/recognize".to_string(),
            conversation_url: "http://localhost:5678/webhook/generate-conversation".to_string(),
        }
    }
}

/// Blocking webhook client. Cheap to clone per request site; holds only an
/// agent and configuration.
#[derive(Clone)]
pub struct WebhookClient {
    agent: ureq::Agent,
    endpoints: WebhookEndpoints,
    user_id: String,
}

impl WebhookClient {
    pub fn new(endpoints: WebhookEndpoints, user_id: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            endpoints,
            user_id: user_id.into(),
        }
    }

    fn post_json(&self, url: &str, body: Value) -> Result<String, ClientError> {
        let response = self.agent.post(url).send_json(body)?;
        Ok(response.into_string()?)
    }

    /// Generic call to the `/api` endpoint: `{action, user_id, data}`.
    pub fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        data: Value,
    ) -> Result<ApiResponse<T>, ClientError> {
        tracing::debug!(action, "webhook api call");
        let body = json!({
            "action": action,
            "user_id": self.user_id,
            "data": data,
        });
        let text = self.post_json(&self.endpoints.api_url, body)?;
        Ok(parse_api_response(&text))
    }

    /// Post a captured photo for recognition.
    ///
    /// Accepts either raw base64 or a `data:` URL; the prefix is stripped
    /// before posting. Malformed responses degrade to a non-match rather
    /// than an error — the user just taps "scan again".
    pub fn recognize(
        &self,
        patient_id: i64,
        photo_base64: &str,
    ) -> Result<RecognizeResponse, ClientError> {
        let clean = strip_data_url(photo_base64);
        tracing::debug!(patient_id, photo_len = clean.len(), "sending recognition request");
        // The backend expects patient_id as a string.
        let body = json!({
            "patient_id": patient_id.to_string(),
            "photo_base64": clean,
        });
        let text = self.post_json(&self.endpoints.recognize_url, body)?;
        Ok(parse_recognize_response(&text))
    }

    /// Ask the backend for an AI-generated conversation starter.
    pub fn generate_conversation(
        &self,
        context: &str,
        language: &str,
    ) -> Result<String, ClientError> {
        let body = json!({
            "context": context,
            "language": language,
        });
        let text = self.post_json(&self.endpoints.conversation_url, body)?;
        parse_conversation_response(&text)
    }

    // --- typed wrappers over `call` ---

    pub fn create_patient(&self, patient: &Patient) -> Result<ApiResponse<Patient>, ClientError> {
        self.call("create-patient", to_value(patient)?)
    }

    pub fn get_patient(&self) -> Result<ApiResponse<Patient>, ClientError> {
        self.call("get-patient", json!({}))
    }

    pub fn update_patient(&self, patient: &Patient) -> Result<ApiResponse<Patient>, ClientError> {
        self.call("update-patient", to_value(patient)?)
    }

    pub fn add_person(&self, person: &Person) -> Result<ApiResponse<Person>, ClientError> {
        self.call("add-person", to_value(person)?)
    }

    pub fn get_people(&self, patient_id: i64) -> Result<ApiResponse<Vec<Person>>, ClientError> {
        self.call("get-people", json!({ "patient_id": patient_id }))
    }

    pub fn update_person(
        &self,
        person_id: i64,
        updates: Value,
    ) -> Result<ApiResponse<Person>, ClientError> {
        let mut data = updates;
        if let Some(obj) = data.as_object_mut() {
            obj.insert("person_id".to_string(), json!(person_id));
        }
        self.call("update-person", data)
    }

    pub fn delete_person(&self, person_id: i64) -> Result<ApiResponse<Value>, ClientError> {
        self.call("delete-person", json!({ "person_id": person_id }))
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ClientError> {
    serde_json::to_value(value).map_err(|e| ClientError::UnexpectedFormat(e.to_string()))
}

/// Strip a `data:image/...;base64,` prefix if present.
pub fn strip_data_url(photo: &str) -> &str {
    match photo.split_once(',') {
        Some((_, rest)) => rest,
        None => photo,
    }
}

/// Lenient envelope parsing: empty body means success-with-nothing, a bare
/// JSON value is wrapped, an unparseable body is a failure.
fn parse_api_response<T: DeserializeOwned>(text: &str) -> ApiResponse<T> {
    if text.trim().is_empty() {
        return ApiResponse {
            success: true,
            data: None,
        };
    }

    let Ok(parsed) = serde_json::from_str::<Value>(text) else {
        tracing::warn!(body = text, "failed to parse api response");
        return ApiResponse {
            success: false,
            data: None,
        };
    };

    if parsed.is_object() && parsed.get("success").is_some() {
        match serde_json::from_value::<ApiResponse<T>>(parsed) {
            Ok(envelope) => return envelope,
            Err(e) => {
                tracing::warn!(error = %e, "api envelope did not deserialize");
                return ApiResponse {
                    success: false,
                    data: None,
                };
            }
        }
    }

    // Raw data (array or object): wrap it.
    match serde_json::from_value::<T>(parsed) {
        Ok(data) => ApiResponse {
            success: true,
            data: Some(data),
        },
        Err(e) => {
            tracing::warn!(error = %e, "raw api payload did not deserialize");
            ApiResponse {
                success: false,
                data: None,
            }
        }
    }
}

fn parse_recognize_response(text: &str) -> RecognizeResponse {
    if text.trim().is_empty() {
        tracing::warn!("empty response from recognition endpoint");
        return RecognizeResponse::no_match("empty response from server");
    }
    match serde_json::from_str(text) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, body = text, "failed to parse recognition response");
            RecognizeResponse::no_match("failed to parse response")
        }
    }
}

/// The conversation endpoint answers in several shapes: `{conversation}`,
/// `{success, data}`, a bare JSON string, or plain text.
fn parse_conversation_response(text: &str) -> Result<String, ClientError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ClientError::UnexpectedFormat(
            "empty response from server".to_string(),
        ));
    }

    let Ok(parsed) = serde_json::from_str::<Value>(trimmed) else {
        // Plain text is used as the conversation directly.
        return Ok(trimmed.to_string());
    };

    if let Some(conversation) = parsed.get("conversation").and_then(Value::as_str) {
        return Ok(conversation.to_string());
    }
    if parsed.get("success").and_then(Value::as_bool) == Some(true) {
        if let Some(data) = parsed.get("data").and_then(Value::as_str) {
            return Ok(data.to_string());
        }
    }
    if let Some(s) = parsed.as_str() {
        return Ok(s.to_string());
    }

    Err(ClientError::UnexpectedFormat(format!(
        "unrecognized conversation payload: {trimmed}"
    )))
}
