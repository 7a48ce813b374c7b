use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not permitted")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    Conflict,
    #[error("server returned {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn from_status(code: u16, body: &str) -> Self {
        match code {
            400 => ApiError::Validation(error_message(body).unwrap_or_else(|| "invalid request".into())),
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound,
            409 => ApiError::Conflict,
            other => ApiError::Status(other),
        }
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}

// RFC 3339, or the bare form SQLite emits. Anything else reads as absent.
fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BufferSummary {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteBuffer {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct CreatedBuffer {
    id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Updated,
    Created(String),
}

pub trait Backend: Send + Sync {
    fn list_buffers(&self) -> Result<Vec<BufferSummary>, ApiError>;
    fn get_buffer(&self, id: &str) -> Result<RemoteBuffer, ApiError>;
    fn create_buffer(&self, token: &str, name: &str, content: &str) -> Result<String, ApiError>;
    fn update_buffer(&self, token: &str, id: &str, content: &str) -> Result<(), ApiError>;
    fn delete_buffer(&self, token: &str, id: &str) -> Result<(), ApiError>;
    fn register(&self, username: &str, password: &str, email: &str) -> Result<AuthResponse, ApiError>;
    fn register_email(&self, email: &str, name: &str) -> Result<String, ApiError>;
    fn verify_registration_code(&self, code: &str) -> Result<(), ApiError>;
    fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError>;

    fn save_buffer(
        &self,
        token: &str,
        id: &str,
        name: &str,
        content: &str,
    ) -> Result<SaveOutcome, ApiError> {
        match self.update_buffer(token, id, content) {
            Ok(()) => Ok(SaveOutcome::Updated),
            Err(ApiError::NotFound) => {
                let created = self.create_buffer(token, name, content)?;
                Ok(SaveOutcome::Created(created))
            }
            Err(err) => Err(err),
        }
    }
}

pub struct HttpBackend {
    base_url: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{method} {url}");
        let mut request = ureq::request(method, &url)
            .set("Accept", "application/json")
            .timeout(self.timeout);
        if let Some(token) = token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        let result = match body {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => request.call(),
        };
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                tracing::debug!("{method} {url} -> {code}");
                return Err(ApiError::from_status(code, &body));
            }
            Err(ureq::Error::Transport(err)) => {
                tracing::debug!("{method} {url} failed: {err}");
                return Err(ApiError::Transport(err.to_string()));
            }
        };
        let text = response
            .into_string()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn encode_segment(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            other => {
                let mut buf = [0u8; 4];
                other
                    .encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{b:02X}"))
                    .collect()
            }
        })
        .collect()
}

impl Backend for HttpBackend {
    fn list_buffers(&self) -> Result<Vec<BufferSummary>, ApiError> {
        self.send("GET", "/api/buffers", None, None)
    }

    fn get_buffer(&self, id: &str) -> Result<RemoteBuffer, ApiError> {
        self.send("GET", &format!("/api/buffers/{}", encode_segment(id)), None, None)
    }

    fn create_buffer(&self, token: &str, name: &str, content: &str) -> Result<String, ApiError> {
        let created: CreatedBuffer = self.send(
            "POST",
            "/api/buffers",
            Some(token),
            Some(json!({ "name": name, "content": content })),
        )?;
        Ok(created.id)
    }

    fn update_buffer(&self, token: &str, id: &str, content: &str) -> Result<(), ApiError> {
        let _: Value = self.send(
            "PUT",
            &format!("/api/buffers/{}", encode_segment(id)),
            Some(token),
            Some(json!({ "content": content })),
        )?;
        Ok(())
    }

    fn delete_buffer(&self, token: &str, id: &str) -> Result<(), ApiError> {
        let _: Value = self.send(
            "DELETE",
            &format!("/api/buffers/{}", encode_segment(id)),
            Some(token),
            None,
        )?;
        Ok(())
    }

    fn register(&self, username: &str, password: &str, email: &str) -> Result<AuthResponse, ApiError> {
        self.send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": username, "password": password, "email": email })),
        )
    }

    fn register_email(&self, email: &str, name: &str) -> Result<String, ApiError> {
        let value: Value = self.send(
            "POST",
            "/api/auth/register-email",
            None,
            Some(json!({ "username": email, "name": name, "email": email })),
        )?;
        Ok(value
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or(email)
            .to_string())
    }

    fn verify_registration_code(&self, code: &str) -> Result<(), ApiError> {
        let _: Value = self.send(
            "POST",
            "/api/auth/verify-registration-code",
            None,
            Some(json!({ "code": code })),
        )?;
        Ok(())
    }

    fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        )
    }
}
