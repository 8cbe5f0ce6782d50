use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::session::{SessionContext, SessionUser};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        errors: Vec<Value>,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Both success and error bodies share this shape.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub errors: Option<Vec<Value>>,
    #[serde(default)]
    pub pagination: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Envelope {
    fn into_result(self, status: StatusCode) -> Result<Envelope, ClientError> {
        if status.is_success() && self.success {
            Ok(self)
        } else {
            Err(ClientError::Api {
                status: status.as_u16(),
                message: self.message.unwrap_or_else(|| status.to_string()),
                errors: self.errors.unwrap_or_default(),
            })
        }
    }
}

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` includes the API base path, e.g. `http://localhost:5000/api/v1`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Raw call: the status and the decoded envelope, whatever the outcome.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        session: Option<&SessionContext>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Envelope), ClientError> {
        let mut request = self.client.request(method, self.url(path));
        if let Some(session) = session {
            request = request.header("Authorization", session.bearer());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let envelope = serde_json::from_slice::<Envelope>(&bytes)?;
        Ok((status, envelope))
    }

    async fn request_ok(
        &self,
        method: Method,
        path: &str,
        session: Option<&SessionContext>,
        body: Option<Value>,
    ) -> Result<Envelope, ClientError> {
        let (status, envelope) = self.call(method, path, session, body).await?;
        envelope.into_result(status)
    }

    pub async fn get(
        &self,
        path: &str,
        session: Option<&SessionContext>,
    ) -> Result<Envelope, ClientError> {
        self.request_ok(Method::GET, path, session, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        session: Option<&SessionContext>,
        body: Value,
    ) -> Result<Envelope, ClientError> {
        self.request_ok(Method::POST, path, session, Some(body)).await
    }

    pub async fn put(
        &self,
        path: &str,
        session: Option<&SessionContext>,
        body: Value,
    ) -> Result<Envelope, ClientError> {
        self.request_ok(Method::PUT, path, session, Some(body)).await
    }

    pub async fn patch(
        &self,
        path: &str,
        session: Option<&SessionContext>,
        body: Value,
    ) -> Result<Envelope, ClientError> {
        self.request_ok(Method::PATCH, path, session, Some(body)).await
    }

    pub async fn delete(
        &self,
        path: &str,
        session: Option<&SessionContext>,
    ) -> Result<Envelope, ClientError> {
        self.request_ok(Method::DELETE, path, session, None).await
    }

    pub async fn health(&self) -> Result<Envelope, ClientError> {
        self.get("/health", None).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionContext, ClientError> {
        let envelope = self
            .post("/auth/login", None, json!({ "email": email, "password": password }))
            .await?;
        session_from(envelope.data)
    }

    /// Re-reads the profile; fails with 401 once the token has expired.
    pub async fn me(&self, session: &SessionContext) -> Result<SessionUser, ClientError> {
        let envelope = self.get("/auth/me", Some(session)).await?;
        Ok(serde_json::from_value(envelope.data)?)
    }
}

fn session_from(data: Value) -> Result<SessionContext, ClientError> {
    #[derive(Deserialize)]
    struct Login {
        user: SessionUser,
        token: String,
    }
    let login: Login = serde_json::from_value(data)?;
    Ok(SessionContext::new(login.user, login.token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:5000/api/v1/");
        assert_eq!(client.url("/patients"), "http://localhost:5000/api/v1/patients");
        assert_eq!(client.url("health"), "http://localhost:5000/api/v1/health");
    }

    #[test]
    fn test_error_envelope_becomes_api_error() {
        let envelope: Envelope = serde_json::from_value(json!({
            "success": false,
            "message": "Validation failed",
            "errors": [{ "field": "email", "message": "Must be a valid email address" }],
            "timestamp": "2024-01-01T00:00:00.000Z"
        }))
        .unwrap();

        let err = envelope.into_result(StatusCode::BAD_REQUEST).unwrap_err();
        assert_eq!(err.status(), Some(400));
        match err {
            ClientError::Api { message, errors, .. } => {
                assert_eq!(message, "Validation failed");
                assert_eq!(errors[0]["field"], "email");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_login_payload_becomes_session() {
        let id = uuid::Uuid::new_v4();
        let session = session_from(json!({
            "user": { "id": id, "name": "Dr. House", "email": "house@example.com", "role": "doctor",
                      "department": "Diagnostics", "isActive": true },
            "token": "abc"
        }))
        .unwrap();

        assert_eq!(session.user.id, id);
        assert_eq!(session.user.role, "doctor");
        assert_eq!(session.token, "abc");
    }
}
