use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use application::{
    ApplicationError, ConversationSummary, HistoryPage, MessagePayload, SendMessageRequest,
    UserPage, UserProfile,
};
use domain::{MessageId, UserId};

use crate::{
    auth::{bearer_token, AuthUser},
    error::ApiError,
    extract::{ApiJson, ApiQuery},
    state::AppState,
    ws_connection::WebSocketConnection,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagePayload {
    recipient_id: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct EditMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ListUsersQuery {
    page: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

const OK: Json<OkResponse> = Json(OkResponse { ok: true });

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/messages", post(send_message))
        .route(
            "/messages/{id}",
            get(get_history).put(edit_message).delete(delete_message),
        )
        .route("/messages/{id}/read", post(mark_read))
        .route("/users", get(list_users))
        .route("/users/search", get(search_users))
        .route("/users/{id}", get(get_user))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let summaries = state.conversations.summaries_for(caller).await?;
    Ok(Json(summaries))
}

/// `{id}` 为对方用户的 id
async fn get_history(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(peer_id): Path<String>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let peer_id = UserId::parse(&peer_id).map_err(ApplicationError::from)?;
    let page = state
        .conversations
        .history_with(caller, peer_id, query.page.unwrap_or(1))
        .await?;
    Ok(Json(page))
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(payload): ApiJson<SendMessagePayload>,
) -> Result<(StatusCode, Json<MessagePayload>), ApiError> {
    let message = state
        .dispatcher
        .send_message(
            caller,
            SendMessageRequest {
                to: payload.recipient_id,
                content: payload.content,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(MessagePayload::from(&message))))
}

async fn edit_message(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(message_id): Path<String>,
    ApiJson(payload): ApiJson<EditMessagePayload>,
) -> Result<Json<MessagePayload>, ApiError> {
    let message_id = MessageId::parse(&message_id).map_err(ApplicationError::from)?;
    let message = state
        .dispatcher
        .edit_message(caller, message_id, payload.content)
        .await?;
    Ok(Json(MessagePayload::from(&message)))
}

async fn delete_message(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let message_id = MessageId::parse(&message_id).map_err(ApplicationError::from)?;
    state.dispatcher.delete_message(caller, message_id).await?;
    Ok(OK)
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let message_id = MessageId::parse(&message_id).map_err(ApplicationError::from)?;
    state.dispatcher.mark_read(caller, message_id).await?;
    Ok(OK)
}

async fn list_users(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> Result<Json<UserPage>, ApiError> {
    let page = state
        .directory
        .list(caller, query.page, query.limit)
        .await?;
    Ok(Json(page))
}

async fn search_users(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<UserPage>, ApiError> {
    let page = state.directory.search(caller, &query.q).await?;
    Ok(Json(page))
}

async fn get_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let user_id = UserId::parse(&user_id).map_err(ApplicationError::from)?;
    let profile = state.directory.profile(user_id).await?;
    Ok(Json(profile))
}

/// 升级前完成身份解析，失败时直接返回 401
async fn websocket_upgrade(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let credential = query
        .token
        .as_deref()
        .filter(|token| !token.is_empty())
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| ApiError::unauthorized("missing credential"))?;

    let user_id = state.identity.resolve(credential).await.map_err(|err| {
        tracing::info!(error = %err, "websocket admission rejected");
        ApiError::from(err)
    })?;

    Ok(ws.on_upgrade(move |socket| async move {
        WebSocketConnection::open(state, user_id)
            .await
            .run(socket)
            .await;
    }))
}
