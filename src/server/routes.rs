//! HTTP route handlers for the Vocalis API.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, get_service, post};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tower_http::services::{ServeDir, ServeFile};
use tracing::debug;

use crate::auth::accounts::IssuedSession;
use crate::chat::core::conversation::{Conversation, iso_utc};
use crate::chat::core::errors::ChatError;
use crate::chat::core::ids::{ConversationId, UserId};
use crate::chat::core::turn::{Sender, Turn};
use crate::chat::engine::core::{ChatReply, ConversationRef};
use crate::server::error::{ApiError, ApiJson};
use crate::server::session::{Session, clear_session_cookie, session_cookie, session_token};
use crate::server::state::AppState;

/// Create the router with API routes and static pages.
pub fn create_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.server.static_dir.clone();
    let page = |name: &str| get_service(ServeFile::new(static_dir.join(name)));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat))
        .route("/api/chat_history", get(chat_history))
        .route("/api/conversations", get(chat_history))
        .route("/api/conversation/{id}", get(conversation))
        .route("/api/new_conversation", post(new_conversation))
        .route("/api/set_current_conversation", post(set_current_conversation))
        .route("/api/save_chat", post(save_chat))
        .route("/api/text-to-speech", post(text_to_speech))
        .route("/tts", get(tts_audio))
        .route("/signup", post(signup))
        .route("/login", page("login.html").post(login))
        .route("/logout", post(logout))
        .route("/", page("index.html"))
        .route("/chat", page("chat.html"))
        .route("/about", page("about.html"))
        .fallback_service(ServeDir::new(&static_dir))
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the process answers.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Crate version.
    pub version: String,
    /// Completion credentials are configured.
    pub groq_api_key_present: bool,
    /// A database location is configured.
    pub mongodb_uri_set: bool,
    /// The database answered a trivial query.
    pub mongodb_ok: bool,
    /// The request carried a valid session.
    pub authenticated: bool,
}

async fn health_check(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<HealthResponse> {
    let authenticated = match session_token(&headers) {
        Some(token) => state.accounts.authenticate(&token).await.is_ok(),
        None => false,
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        groq_api_key_present: state.engine.completion_configured(),
        mongodb_uri_set: !state.config.storage.sqlite_path.as_os_str().is_empty(),
        mongodb_ok: state.db.ping().await.is_ok(),
        authenticated,
    })
}

/// Chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    #[serde(default)]
    pub message: String,
}

/// Conversation a chat reply was stored in.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationRefDto {
    /// Conversation id.
    pub conversation_id: ConversationId,
    /// Whether this request created it.
    pub created: bool,
    /// Current title.
    pub title: String,
}

impl From<ConversationRef> for ConversationRefDto {
    fn from(value: ConversationRef) -> Self {
        Self {
            conversation_id: value.conversation_id,
            created: value.created,
            title: value.title,
        }
    }
}

/// Chat response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Always true.
    pub success: bool,
    /// Assistant reply.
    pub response: String,
    /// `normal`, `elaborate`, `stop` or `help`.
    pub command: String,
    /// Whether both turns were stored.
    pub persisted: bool,
    /// Conversation the turns were stored in.
    pub conversation: Option<ConversationRefDto>,
    /// Same as `conversation.conversation_id`.
    pub conversation_id: Option<ConversationId>,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        let conversation_id = reply.conversation.as_ref().map(|c| c.conversation_id);
        Self {
            success: true,
            response: reply.response,
            command: reply.command.as_str().to_string(),
            persisted: reply.persisted,
            conversation: reply.conversation.map(ConversationRefDto::from),
            conversation_id,
        }
    }
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Session(ctx): Session,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state
        .engine
        .handle_chat(&ctx, &request.message)
        .await
        .map_err(|err| ApiError::from(err).for_chat())?;
    Ok(Json(reply.into()))
}

/// Conversation metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationDto {
    /// Conversation id.
    pub conversation_id: ConversationId,
    /// Title.
    pub title: String,
    /// Creation time, ISO-8601 UTC.
    pub created_at: String,
    /// Last write time, ISO-8601 UTC.
    pub updated_at: String,
    /// Stored turns.
    pub message_count: u64,
}

impl From<&Conversation> for ConversationDto {
    fn from(value: &Conversation) -> Self {
        Self {
            conversation_id: value.conversation_id,
            title: value.title.clone(),
            created_at: iso_utc(value.created_at),
            updated_at: iso_utc(value.updated_at),
            message_count: value.message_count,
        }
    }
}

/// Conversation listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Always true.
    pub success: bool,
    /// Newest first.
    pub conversations: Vec<ConversationDto>,
}

async fn chat_history(
    State(state): State<Arc<AppState>>,
    Session(ctx): Session,
) -> Result<Json<HistoryResponse>, ApiError> {
    let conversations = state.engine.history(ctx.user_id).await?;
    Ok(Json(HistoryResponse {
        success: true,
        conversations: conversations.iter().map(ConversationDto::from).collect(),
    }))
}

/// One stored message.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageDto {
    /// Text.
    pub message: String,
    /// `user` or `assistant`.
    pub sender: String,
    /// ISO-8601 UTC.
    pub timestamp: String,
}

impl From<&Turn> for MessageDto {
    fn from(value: &Turn) -> Self {
        Self {
            message: value.message.clone(),
            sender: value.sender.as_str().to_string(),
            timestamp: iso_utc(value.timestamp),
        }
    }
}

/// A conversation with its messages.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    /// Always true.
    pub success: bool,
    /// Metadata.
    pub conversation: ConversationDto,
    /// Messages, oldest first.
    pub messages: Vec<MessageDto>,
}

async fn conversation(
    State(state): State<Arc<AppState>>,
    Session(ctx): Session,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation_id = ConversationId::from_str(&id).map_err(|_| ChatError::NotFound)?;
    let (conversation, turns) = state
        .engine
        .conversation_with_turns(ctx.user_id, conversation_id)
        .await?;
    Ok(Json(ConversationResponse {
        success: true,
        conversation: ConversationDto::from(&conversation),
        messages: turns.iter().map(MessageDto::from).collect(),
    }))
}

/// Optional title for a new conversation.
#[derive(Debug, Default, Deserialize)]
pub struct NewConversationRequest {
    /// Title; defaults to the placeholder.
    #[serde(default)]
    pub title: Option<String>,
}

/// Created or selected conversation.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationSelected {
    /// Always true.
    pub success: bool,
    /// Conversation id.
    pub conversation_id: ConversationId,
    /// Title.
    pub title: String,
}

async fn new_conversation(
    State(state): State<Arc<AppState>>,
    Session(ctx): Session,
    request: Option<ApiJson<NewConversationRequest>>,
) -> Result<Json<ConversationSelected>, ApiError> {
    let request = request.map(|ApiJson(request)| request).unwrap_or_default();
    let conversation = state
        .engine
        .new_conversation(&ctx, request.title.as_deref())
        .await?;
    Ok(Json(ConversationSelected {
        success: true,
        conversation_id: conversation.conversation_id,
        title: conversation.title,
    }))
}

/// Conversation to bind to the session.
#[derive(Debug, Deserialize)]
pub struct SetCurrentRequest {
    /// Conversation id.
    #[serde(default)]
    pub conversation_id: String,
}

async fn set_current_conversation(
    State(state): State<Arc<AppState>>,
    Session(ctx): Session,
    ApiJson(request): ApiJson<SetCurrentRequest>,
) -> Result<Json<ConversationSelected>, ApiError> {
    let conversation_id = parse_conversation_id(&request.conversation_id)?;
    let conversation = state
        .engine
        .set_current_conversation(&ctx, conversation_id)
        .await?;
    Ok(Json(ConversationSelected {
        success: true,
        conversation_id: conversation.conversation_id,
        title: conversation.title,
    }))
}

/// Single message to store.
#[derive(Debug, Deserialize)]
pub struct SaveChatRequest {
    /// Text.
    #[serde(default)]
    pub message: String,
    /// `user` (default) or `assistant`.
    #[serde(default)]
    pub sender: Option<String>,
    /// Target conversation; defaults to the active one.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Stored message acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct SaveChatResponse {
    /// Always true.
    pub success: bool,
    /// Conversation the message was stored in.
    pub conversation_id: ConversationId,
    /// Whether this request created the conversation.
    pub created: bool,
    /// Stored message id.
    pub message_id: i64,
    /// ISO-8601 UTC.
    pub timestamp: String,
}

async fn save_chat(
    State(state): State<Arc<AppState>>,
    Session(ctx): Session,
    ApiJson(request): ApiJson<SaveChatRequest>,
) -> Result<Json<SaveChatResponse>, ApiError> {
    let sender = match request.sender.as_deref() {
        Some(sender) => Sender::from_str(sender)
            .map_err(|value| ApiError::bad_request(format!("Unknown sender: {value}")))?,
        None => Sender::User,
    };
    let conversation_id = request
        .conversation_id
        .as_deref()
        .map(parse_conversation_id)
        .transpose()?;

    let saved = state
        .engine
        .save_turn(&ctx, &request.message, sender, conversation_id)
        .await?;
    Ok(Json(SaveChatResponse {
        success: true,
        conversation_id: saved.conversation.conversation_id,
        created: saved.conversation.created,
        message_id: saved.turn.id,
        timestamp: iso_utc(saved.turn.timestamp),
    }))
}

/// Query of the audio endpoint.
#[derive(Debug, Deserialize)]
pub struct TtsQuery {
    /// Text to speak.
    #[serde(default)]
    pub text: String,
}

async fn tts_audio(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TtsQuery>,
) -> Result<Response, ApiError> {
    let audio = state.tts.synthesize(&query.text).await?;
    debug!(bytes = audio.len(), "Speech synthesized");
    Ok(([(CONTENT_TYPE, "audio/mpeg")], audio.as_ref().clone()).into_response())
}

/// Text for the base64 speech endpoint.
#[derive(Debug, Deserialize)]
pub struct TextToSpeechRequest {
    /// Text to speak.
    #[serde(default)]
    pub text: String,
}

/// Base64-encoded MP3.
#[derive(Debug, Serialize, Deserialize)]
pub struct TextToSpeechResponse {
    /// Always true.
    pub success: bool,
    /// MP3 bytes, base64.
    pub audio: String,
}

async fn text_to_speech(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TextToSpeechRequest>,
) -> Result<Json<TextToSpeechResponse>, ApiError> {
    let audio = state.tts.synthesize(&request.text).await?;
    Ok(Json(TextToSpeechResponse {
        success: true,
        audio: BASE64.encode(audio.as_slice()),
    }))
}

/// Username and password.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Password.
    #[serde(default)]
    pub password: String,
}

/// Issued session.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Always true.
    pub success: bool,
    /// Bearer token, also set as a cookie.
    pub token: String,
    /// Account id.
    pub user_id: UserId,
    /// Normalized username.
    pub username: String,
    /// Conversation bound to the session.
    pub conversation_id: Option<ConversationId>,
}

async fn signup(
    State(state): State<Arc<AppState>>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<Response, ApiError> {
    let issued = state
        .accounts
        .signup(&credentials.username, &credentials.password)
        .await?;
    Ok(session_response(issued))
}

async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<Response, ApiError> {
    let issued = state
        .accounts
        .login(&credentials.username, &credentials.password)
        .await?;
    Ok(session_response(issued))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_token(&headers) {
        state.accounts.logout(&token).await?;
    }
    Ok((
        [(SET_COOKIE, clear_session_cookie())],
        Json(serde_json::json!({ "success": true })),
    )
        .into_response())
}

fn session_response(issued: IssuedSession) -> Response {
    let cookie = session_cookie(&issued.token);
    let body = Json(AuthResponse {
        success: true,
        token: issued.token,
        user_id: issued.user_id,
        username: issued.username,
        conversation_id: issued.conversation_id,
    });
    match cookie {
        Some(cookie) => ([(SET_COOKIE, cookie)], body).into_response(),
        None => body.into_response(),
    }
}

fn parse_conversation_id(value: &str) -> Result<ConversationId, ApiError> {
    ConversationId::from_str(value)
        .map_err(|_| ApiError::bad_request("Invalid conversation id"))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::chat::core::config::AppConfig;
    use crate::chat::engine::core::ChatBackends;
    use crate::chat::storage::database::Database;
    use crate::llm::completion::testing::ScriptedBackend;

    async fn app_with_db(backend: ScriptedBackend, config: AppConfig) -> (Router, Database) {
        let db = Database::open_in_memory().await.unwrap();
        let backends = ChatBackends::with_completion(&db, &config, Arc::new(backend))
            .await
            .unwrap();
        let state = AppState::from_parts(config, db.clone(), &backends, None).unwrap();
        (create_router(Arc::new(state)), db)
    }

    async fn app_with(backend: ScriptedBackend, config: AppConfig) -> Router {
        app_with_db(backend, config).await.0
    }

    async fn drop_tables(db: &Database, tables: &'static str) {
        db.connection()
            .call(move |conn| {
                for table in tables.split(',') {
                    conn.execute_batch(&format!("DROP TABLE {table};"))?;
                }
                Ok(())
            })
            .await
            .unwrap();
    }

    async fn send_raw(app: &Router, uri: &str, token: &str, body: &'static str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn app(backend: ScriptedBackend) -> Router {
        app_with(backend, AppConfig::default()).await
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn signed_up(app: &Router, username: &str) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/signup",
            None,
            Some(json!({ "username": username, "password": "password1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_configuration() {
        let app = app(ScriptedBackend::unconfigured()).await;
        let (status, body) = send(&app, "GET", "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["groq_api_key_present"], false);
        assert_eq!(body["mongodb_uri_set"], true);
        assert_eq!(body["mongodb_ok"], true);
        assert_eq!(body["authenticated"], false);

        let token = signed_up(&app, "henry").await;
        let (_, body) = send(&app, "GET", "/health", Some(&token), None).await;
        assert_eq!(body["authenticated"], true);
    }

    #[tokio::test]
    async fn chat_requires_a_session() {
        let app = app(ScriptedBackend::replying("hi")).await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            None,
            Some(json!({ "message": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn chat_without_credentials_is_a_configuration_error() {
        let app = app(ScriptedBackend::unconfigured()).await;
        let token = signed_up(&app, "ivy").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({ "message": "hello" })),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("GROQ_API_KEY"));
        assert_eq!(body["command"], "error");
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let app = app(ScriptedBackend::replying("unused")).await;
        let token = signed_up(&app, "sam").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({ "message": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "No message provided");
    }

    #[tokio::test]
    async fn malformed_bodies_use_the_error_envelope() {
        let app = app(ScriptedBackend::replying("unused")).await;
        let token = signed_up(&app, "tara").await;

        for uri in ["/api/chat", "/api/save_chat", "/api/new_conversation", "/signup"] {
            let (status, body) = send_raw(&app, uri, &token, "{not json").await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["success"], false, "{uri}");
            assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()), "{uri}");
        }
    }

    #[tokio::test]
    async fn chat_answers_when_storage_is_gone() {
        let (app, db) =
            app_with_db(ScriptedBackend::replying("the answer"), AppConfig::default()).await;
        let token = signed_up(&app, "uma").await;
        drop_tables(&db, "chat_turns,conversations").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({ "message": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["response"], "the answer");
        assert_eq!(body["persisted"], false);
        assert!(body["conversation"].is_null());
    }

    #[tokio::test]
    async fn chat_answers_when_turns_cannot_be_written() {
        let (app, db) =
            app_with_db(ScriptedBackend::replying("still here"), AppConfig::default()).await;
        let token = signed_up(&app, "vera").await;
        drop_tables(&db, "chat_turns").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({ "message": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["response"], "still here");
        assert_eq!(body["persisted"], false);
        assert!(body["conversation"].is_null());
    }

    #[tokio::test]
    async fn chat_reply_carries_conversation() {
        let app = app(ScriptedBackend::replying("Four.")).await;
        let token = signed_up(&app, "jack").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({ "message": "What is two plus two?" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["response"], "Four.");
        assert_eq!(body["command"], "normal");
        assert_eq!(body["persisted"], true);
        assert_eq!(body["conversation"]["created"], true);
        assert_eq!(body["conversation"]["title"], "What is two plus two?");
        assert_eq!(body["conversation_id"], body["conversation"]["conversation_id"]);

        let (_, history) = send(&app, "GET", "/api/chat_history", Some(&token), None).await;
        assert_eq!(history["conversations"].as_array().unwrap().len(), 1);
        let created_at = history["conversations"][0]["created_at"].as_str().unwrap();
        assert!(created_at.ends_with('Z'));
    }

    #[tokio::test]
    async fn upstream_failure_returns_apology() {
        let app = app(ScriptedBackend::new(Vec::new())).await;
        let token = signed_up(&app, "kate").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({ "message": "hello" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["response"], crate::server::error::UPSTREAM_APOLOGY);
    }

    #[tokio::test]
    async fn new_conversations_are_distinct_and_retrievable() {
        let app = app(ScriptedBackend::new(Vec::new())).await;
        let token = signed_up(&app, "liam").await;

        let (_, first) = send(&app, "POST", "/api/new_conversation", Some(&token), None).await;
        let (_, second) = send(
            &app,
            "POST",
            "/api/new_conversation",
            Some(&token),
            Some(json!({})),
        )
        .await;
        assert_eq!(first["success"], true);
        assert_ne!(first["conversation_id"], second["conversation_id"]);

        for created in [&first, &second] {
            let id = created["conversation_id"].as_str().unwrap();
            let (status, body) =
                send(&app, "GET", &format!("/api/conversation/{id}"), Some(&token), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], true);
            assert!(body["messages"].as_array().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn saved_messages_round_trip() {
        let app = app(ScriptedBackend::new(Vec::new())).await;
        let token = signed_up(&app, "mia").await;

        let (status, saved) = send(
            &app,
            "POST",
            "/api/save_chat",
            Some(&token),
            Some(json!({ "message": "Good morning", "sender": "user" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["created"], true);
        let id = saved["conversation_id"].as_str().unwrap().to_string();

        send(
            &app,
            "POST",
            "/api/save_chat",
            Some(&token),
            Some(json!({ "message": "Morning!", "sender": "ai", "conversation_id": id })),
        )
        .await;

        let (_, body) =
            send(&app, "GET", &format!("/api/conversation/{id}"), Some(&token), None).await;
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["message"], "Good morning");
        assert_eq!(messages[0]["sender"], "user");
        assert_eq!(messages[1]["sender"], "assistant");
        assert!(messages[0]["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn other_users_conversations_are_not_found() {
        let app = app(ScriptedBackend::new(Vec::new())).await;
        let owner = signed_up(&app, "noah").await;
        let intruder = signed_up(&app, "olga").await;

        let (_, created) = send(&app, "POST", "/api/new_conversation", Some(&owner), None).await;
        let id = created["conversation_id"].as_str().unwrap();

        let (status, body) =
            send(&app, "GET", &format!("/api/conversation/{id}"), Some(&intruder), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            &app,
            "POST",
            "/api/set_current_conversation",
            Some(&intruder),
            Some(json!({ "conversation_id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            send(&app, "GET", "/api/conversation/not-a-uuid", Some(&owner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn login_cookie_authenticates() {
        let app = app(ScriptedBackend::new(Vec::new())).await;
        signed_up(&app, "pia").await;

        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({ "username": "pia", "password": "password1" }).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("vocalis_session="));

        let request = Request::builder()
            .uri("/api/conversations")
            .header("Cookie", cookie)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let app = app(ScriptedBackend::new(Vec::new())).await;
        let token = signed_up(&app, "quinn").await;

        let (status, _) = send(&app, "POST", "/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", "/api/chat_history", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = app(ScriptedBackend::new(Vec::new())).await;
        signed_up(&app, "rosa").await;
        let (status, body) = send(
            &app,
            "POST",
            "/login",
            None,
            Some(json!({ "username": "rosa", "password": "wrong-one" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn empty_speech_text_is_rejected() {
        let app = app(ScriptedBackend::new(Vec::new())).await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/text-to-speech",
            None,
            Some(json!({ "text": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, "GET", "/tts?text=", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn static_pages_are_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Vocalis</h1>").unwrap();
        std::fs::write(dir.path().join("style.css"), "body {}").unwrap();
        let mut config = AppConfig::default();
        config.server.static_dir = dir.path().to_path_buf();
        let app = app_with(ScriptedBackend::new(Vec::new()), config).await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"<h1>Vocalis</h1>");

        let response = app
            .oneshot(Request::builder().uri("/style.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
