use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::cookies::{self, CSRF_COOKIE, CSRF_HEADER};
use super::{Backend, ClientEvent};
use crate::error::ApiError;
use crate::models::{
    AuthResponse, Conversation, ConversationId, DataSource, DataSourceId, DataSourceUpdate,
    DataSourceUpload, LoginCredentials, Message, ProcessConfig, ProcessOutcome, ProfileUpdate,
    SignupData, User,
};

#[derive(Serialize)]
struct TitleRequest<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct ProcessRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a ProcessConfig>,
}

/// HTTP client for the chatbot backend.
///
/// Carries the session in a cookie jar and echoes the CSRF cookie back as a
/// header on every request. A 401 from any endpoint is broadcast to
/// subscribers as [`ClientEvent::Unauthorized`].
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    origin: Url,
    jar: Arc<Jar>,
    events: broadcast::Sender<ClientEvent>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let origin = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let jar = Arc::new(Jar::default());
        let client = Client::builder().cookie_provider(jar.clone()).build()?;
        let (events, _) = broadcast::channel(16);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            origin,
            jar,
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Receive out-of-band client events such as session loss.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Current `Cookie` header value for the API origin.
    pub fn cookie_header(&self) -> Option<String> {
        self.jar
            .cookies(&self.origin)
            .and_then(|header| header.to_str().ok().map(str::to_string))
    }

    pub fn restore_session(&self, path: &Path) -> std::io::Result<usize> {
        cookies::restore_session(path, &self.jar, &self.origin)
    }

    pub fn save_session(&self, path: &Path) -> std::io::Result<()> {
        cookies::save_session(path, self.cookie_header().as_deref())
    }

    fn csrf_token(&self) -> Option<String> {
        self.cookie_header()
            .and_then(|header| cookies::cookie_value(&header, CSRF_COOKIE))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "api request");

        let builder = self.client.request(method, url);
        match self.csrf_token() {
            Some(token) => builder.header(CSRF_HEADER, token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);

        if status == StatusCode::UNAUTHORIZED {
            warn!(?message, "backend answered 401, session is gone");
            // No subscribers is fine; the caller still gets the error.
            let _ = self.events.send(ClientEvent::Unauthorized);
            return Err(ApiError::Unauthorized { message });
        }

        warn!(status = status.as_u16(), ?message, "api request failed");
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.execute(builder).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Pull a human-readable message out of an error body.
///
/// Tries `{"error": ..}`, then `{"detail": ..}`, then the first entry of a
/// field-keyed validation map such as `{"email": ["Enter a valid email."]}`.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    for key in ["error", "detail"] {
        if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
            return Some(text.to_string());
        }
    }

    value.as_object()?.iter().find_map(|(field, entry)| {
        let text = match entry {
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Array(items) => items.first()?.as_str()?.to_string(),
            _ => return None,
        };
        Some(if field == "non_field_errors" {
            text
        } else {
            format!("{}: {}", field, text)
        })
    })
}

#[async_trait]
impl Backend for ApiClient {
    async fn signup(&self, data: &SignupData) -> Result<User, ApiError> {
        let request = self.request(Method::POST, "/auth/signup/").json(data);
        let response: AuthResponse = self.fetch(request).await?;
        Ok(response.user)
    }

    async fn login(&self, credentials: &LoginCredentials) -> Result<User, ApiError> {
        let request = self.request(Method::POST, "/auth/login/").json(credentials);
        let response: AuthResponse = self.fetch(request).await?;
        Ok(response.user)
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.execute(self.request(Method::POST, "/auth/logout/")).await?;
        Ok(())
    }

    async fn profile(&self) -> Result<User, ApiError> {
        self.fetch(self.request(Method::GET, "/auth/profile/")).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let request = self.request(Method::PUT, "/auth/profile/").json(update);
        self.fetch(request).await
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.fetch(self.request(Method::GET, "/admin/users/")).await
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.fetch(self.request(Method::GET, "/conversations/")).await
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, ApiError> {
        let request = self
            .request(Method::POST, "/conversations/")
            .json(&TitleRequest { title });
        self.fetch(request).await
    }

    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<Conversation, ApiError> {
        let request = self
            .request(Method::PATCH, &format!("/conversations/{}/", id))
            .json(&TitleRequest { title });
        self.fetch(request).await
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, &format!("/conversations/{}/", id));
        self.execute(request).await?;
        Ok(())
    }

    async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>, ApiError> {
        let path = format!("/conversations/{}/messages/", conversation);
        self.fetch(self.request(Method::GET, &path)).await
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        content: &str,
    ) -> Result<Message, ApiError> {
        let path = format!("/conversations/{}/messages/", conversation);
        let request = self
            .request(Method::POST, &path)
            .json(&MessageRequest { content });
        self.fetch(request).await
    }

    async fn list_datasources(&self) -> Result<Vec<DataSource>, ApiError> {
        self.fetch(self.request(Method::GET, "/datasources/")).await
    }

    async fn get_datasource(&self, id: DataSourceId) -> Result<DataSource, ApiError> {
        let path = format!("/datasources/{}/", id);
        self.fetch(self.request(Method::GET, &path)).await
    }

    async fn create_datasource(&self, upload: &DataSourceUpload) -> Result<DataSource, ApiError> {
        let file = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime)?;

        let mut form = Form::new()
            .text("title", upload.title.clone())
            .text("source_type", upload.source_type.as_str());
        if let Some(description) = upload.description.as_ref().filter(|d| !d.is_empty()) {
            form = form.text("description", description.clone());
        }
        let form = form.part("file", file);

        let request = self.request(Method::POST, "/datasources/").multipart(form);
        self.fetch(request).await
    }

    async fn update_datasource(
        &self,
        id: DataSourceId,
        update: &DataSourceUpdate,
    ) -> Result<DataSource, ApiError> {
        let request = self
            .request(Method::PATCH, &format!("/datasources/{}/", id))
            .json(update);
        self.fetch(request).await
    }

    async fn delete_datasource(&self, id: DataSourceId) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, &format!("/datasources/{}/", id));
        self.execute(request).await?;
        Ok(())
    }

    async fn process_datasource(
        &self,
        id: DataSourceId,
        config: Option<&ProcessConfig>,
    ) -> Result<ProcessOutcome, ApiError> {
        let request = self
            .request(Method::POST, &format!("/datasources/{}/process/", id))
            .json(&ProcessRequest { config });
        self.fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageRole, ProcessingStatus, SourceType};
    use axum::extract::Multipart;
    use axum::http::{header, HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn user_json() -> Value {
        json!({
            "id": 1,
            "username": "ana",
            "email": "ana@example.com",
            "first_name": "Ana",
            "last_name": "Silva",
            "user_type": "admin",
            "date_joined": "2024-05-01T10:00:00Z"
        })
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(r#"{"error": "Invalid credentials"}"#).as_deref(),
            Some("Invalid credentials")
        );
        assert_eq!(
            error_message(r#"{"detail": "Not found."}"#).as_deref(),
            Some("Not found.")
        );
        assert_eq!(
            error_message(r#"{"email": ["A user with that email already exists."]}"#).as_deref(),
            Some("email: A user with that email already exists.")
        );
        assert_eq!(
            error_message(r#"{"non_field_errors": ["Bad input"]}"#).as_deref(),
            Some("Bad input")
        );
        assert_eq!(error_message("<html>oops</html>"), None);
        assert_eq!(error_message(""), None);
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let err = ApiClient::new("not a url").err().unwrap();
        assert!(matches!(err, ApiError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_csrf_cookie_is_echoed_as_header() {
        async fn profile() -> impl IntoResponse {
            ([(header::SET_COOKIE, "csrftoken=tok123; Path=/")], Json(user_json()))
        }

        async fn update(headers: HeaderMap) -> AxumResponse {
            let token = headers.get("x-csrftoken").and_then(|v| v.to_str().ok());
            if token == Some("tok123") {
                let mut user = user_json();
                user["first_name"] = json!("Updated");
                Json(user).into_response()
            } else {
                (AxumStatus::FORBIDDEN, Json(json!({"detail": "CSRF Failed"}))).into_response()
            }
        }

        let base = serve(Router::new().route("/api/auth/profile/", get(profile).put(update))).await;
        let client = ApiClient::new(&base).unwrap();

        client.profile().await.unwrap();
        assert!(client.cookie_header().unwrap().contains("csrftoken=tok123"));

        let update = ProfileUpdate {
            first_name: Some("Updated".to_string()),
            ..Default::default()
        };
        let user = client.update_profile(&update).await.unwrap();
        assert_eq!(user.first_name, "Updated");
    }

    #[tokio::test]
    async fn test_unauthorized_is_broadcast() {
        async fn conversations() -> AxumResponse {
            (
                AxumStatus::UNAUTHORIZED,
                Json(json!({"detail": "Authentication credentials were not provided."})),
            )
                .into_response()
        }

        let base = serve(Router::new().route("/api/conversations/", get(conversations))).await;
        let client = ApiClient::new(&base).unwrap();
        let mut events = client.subscribe();

        let err = client.list_conversations().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(events.try_recv().unwrap(), ClientEvent::Unauthorized);
    }

    #[tokio::test]
    async fn test_server_error_text_is_kept() {
        async fn process() -> AxumResponse {
            (
                AxumStatus::BAD_REQUEST,
                Json(json!({"error": "Source can only be processed if unprocessed or previously failed"})),
            )
                .into_response()
        }

        let base = serve(Router::new().route("/api/datasources/4/process/", post(process))).await;
        let client = ApiClient::new(&base).unwrap();

        let err = client
            .process_datasource(DataSourceId(4), None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.user_message("Failed to process datasource"),
            "Source can only be processed if unprocessed or previously failed"
        );
    }

    #[tokio::test]
    async fn test_send_message_posts_content() {
        async fn send(Json(body): Json<Value>) -> AxumResponse {
            let content = body["content"].as_str().unwrap_or_default();
            (
                AxumStatus::CREATED,
                Json(json!({
                    "id": 77,
                    "conversation": 5,
                    "role": "assistant",
                    "content": format!("echo: {}", content),
                    "timestamp": "2024-05-01T10:00:01Z",
                    "metadata": {"confidence": 0.9}
                })),
            )
                .into_response()
        }

        let base = serve(Router::new().route("/api/conversations/5/messages/", post(send))).await;
        let client = ApiClient::new(&base).unwrap();

        let reply = client
            .send_message(ConversationId(5), "hello")
            .await
            .unwrap();
        assert_eq!(reply.role, MessageRole::Assistant);
        assert_eq!(reply.content, "echo: hello");
        assert_eq!(reply.conversation, ConversationId(5));
    }

    #[tokio::test]
    async fn test_upload_is_multipart() {
        async fn create(mut multipart: Multipart) -> AxumResponse {
            let mut title = String::new();
            let mut source_type = String::new();
            let mut file_len = 0;
            while let Some(field) = multipart.next_field().await.unwrap() {
                match field.name().unwrap_or_default() {
                    "title" => title = field.text().await.unwrap(),
                    "source_type" => source_type = field.text().await.unwrap(),
                    "file" => file_len = field.bytes().await.unwrap().len(),
                    _ => {}
                }
            }
            (
                AxumStatus::CREATED,
                Json(json!({
                    "id": 12,
                    "title": title,
                    "source_type": source_type,
                    "location": format!("uploads/{}", file_len),
                    "description": "",
                    "created_at": "2024-05-01T10:00:00Z",
                    "processing_status": "unprocessed",
                    "processing_config": null,
                    "created_by": 1
                })),
            )
                .into_response()
        }

        let base = serve(Router::new().route("/api/datasources/", post(create))).await;
        let client = ApiClient::new(&base).unwrap();

        let upload = DataSourceUpload {
            title: "Notes".to_string(),
            source_type: SourceType::Txt,
            description: None,
            file_name: "notes.txt".to_string(),
            mime: "text/plain".to_string(),
            bytes: b"hello world".to_vec(),
        };
        let created = client.create_datasource(&upload).await.unwrap();
        assert_eq!(created.title, "Notes");
        assert_eq!(created.source_type, SourceType::Txt);
        assert_eq!(created.location, "uploads/11");
        assert_eq!(created.processing_status, ProcessingStatus::Unprocessed);
    }
}
