// src/routes.rs
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{HeaderMap, StatusCode};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers::Dispatcher;
use crate::telegram::Update;

/// Header Telegram uses to echo the secret given to `setWebhook`.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, webhook_secret: Option<String>) -> Self {
        Self {
            dispatcher,
            webhook_secret: webhook_secret.map(Arc::from),
        }
    }
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/telegram/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Acknowledge the update right away and handle it on its own task, so
/// Telegram never waits on the database.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    if let Some(secret) = &state.webhook_secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_ref()) {
            warn!(update_id = update.update_id, "Rejected webhook call with bad secret");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        dispatcher.handle_update(update).await;
    });
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gateway::testing::RecordingGateway;
    use crate::store::{MemoryPollStore, MemoryVoteStore};
    use axum::body::Body;
    use http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(secret: Option<&str>) -> (Router, Arc<RecordingGateway>) {
        let config = Config::from_lookup(|name| match name {
            "BOT_TOKEN" => Some("token".to_string()),
            "BOT_ADMINS" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(MemoryPollStore::new()),
            Arc::new(MemoryVoteStore::new()),
            gateway.clone(),
            &config,
        ));
        let state = AppState::new(dispatcher, secret.map(str::to_string));
        (create_routes(state), gateway)
    }

    fn update_request(secret: Option<&str>) -> Request<Body> {
        let body = serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
                "chat": {"id": 42, "type": "private"},
                "text": "/create"
            }
        });
        let mut builder = Request::builder()
            .method("POST")
            .uri("/telegram/webhook")
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SECRET_HEADER, secret);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn wait_for_reply(gateway: &RecordingGateway, chat_id: i64) -> Vec<String> {
        for _ in 0..50 {
            let texts = gateway.texts_to(chat_id);
            if !texts.is_empty() {
                return texts;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Vec::new()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(None);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_dispatches_update() {
        let (app, gateway) = app(None);
        let response = app.oneshot(update_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let replies = wait_for_reply(&gateway, 42).await;
        assert_eq!(replies, vec!["Good. Now send me the question."]);
    }

    #[tokio::test]
    async fn test_webhook_checks_secret() {
        let (app, gateway) = app(Some("s3cret"));
        let response = app.clone().oneshot(update_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.clone().oneshot(update_request(Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(gateway.texts_to(42).is_empty());

        let response = app.oneshot(update_request(Some("s3cret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_rejects_garbage() {
        let (app, _) = app(None);
        let request = Request::builder()
            .method("POST")
            .uri("/telegram/webhook")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
