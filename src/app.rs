use std::net::SocketAddr;
use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::state::AppState;
use crate::{analysis, billing, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1",
              Router::new()
                  .merge(users::router())
                  .merge(analysis::router())
                  .merge(billing::router())
                  .route("/health", get(|| async { "ok" }))
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
        .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use time::macros::date;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::claims::CallerRole;
    use crate::auth::jwt::JwtKeys;
    use crate::store::memory::MemoryStore;
    use crate::store::Store;

    struct TestApp {
        app: Router,
        store: Arc<MemoryStore>,
        frontend: String,
        payments: String,
    }

    fn test_app(transcript: Option<&'static str>) -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::fake(store.clone(), transcript);
        let keys = JwtKeys::new(&state.config.jwt);
        TestApp {
            app: build_app(state),
            store,
            frontend: keys.sign("chat-frontend", CallerRole::Frontend, 300),
            payments: keys.sign("payments", CallerRole::Payments, 300),
        }
    }

    async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn onboard(t: &TestApp, external_id: i64) {
        let (status, _) = call(
            &t.app,
            "POST",
            "/api/v1/users",
            Some(&t.frontend),
            Some(json!({ "external_id": external_id, "first_name": "Аня" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(
            &t.app,
            "PUT",
            &format!("/api/v1/users/{external_id}/goal"),
            Some(&t.frontend),
            Some(json!({ "daily_goal_calories": 1800 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["goal_confirmed"], json!(true));
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let t = test_app(None);
        let res = t
            .app
            .clone()
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn routes_require_a_valid_token() {
        let t = test_app(None);
        let (status, _) = call(&t.app, "GET", "/api/v1/users/1", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&t.app, "GET", "/api/v1/users/1", Some("nope"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn frontend_token_cannot_grant_credits() {
        let t = test_app(None);
        onboard(&t, 5).await;
        let (status, _) = call(
            &t.app,
            "POST",
            "/api/v1/users/5/credits",
            Some(&t.frontend),
            Some(json!({ "count": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let t = test_app(None);
        let (status, body) = call(&t.app, "GET", "/api/v1/users/404", Some(&t.frontend), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], json!("not_found"));
    }

    #[tokio::test]
    async fn goal_out_of_range_is_rejected() {
        let t = test_app(None);
        onboard(&t, 5).await;
        let (status, body) = call(
            &t.app,
            "PUT",
            "/api/v1/users/5/goal",
            Some(&t.frontend),
            Some(json!({ "daily_goal_calories": 300 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("validation_error"));
    }

    #[tokio::test]
    async fn analysis_before_goal_is_a_validation_error() {
        let t = test_app(None);
        call(
            &t.app,
            "POST",
            "/api/v1/users",
            Some(&t.frontend),
            Some(json!({ "external_id": 9 })),
        )
        .await;
        let (status, body) = call(
            &t.app,
            "POST",
            "/api/v1/users/9/analyses/text",
            Some(&t.frontend),
            Some(json!({ "text": "борщ" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("validation_error"));
    }

    #[tokio::test]
    async fn text_analysis_records_entry_and_updates_summary() {
        let t = test_app(None);
        onboard(&t, 5).await;

        let (status, body) = call(
            &t.app,
            "POST",
            "/api/v1/users/5/analyses/text",
            Some(&t.frontend),
            Some(json!({ "text": "тарелка борща" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], json!("food_detected"));
        assert_eq!(body["method"], json!("heuristic"));
        assert_eq!(body["estimate"]["total_calories"], json!(120));
        assert_eq!(body["charged"], json!("free"));
        assert_eq!(body["allowance"]["free_remaining"], json!(2));

        let (status, body) = call(&t.app, "GET", "/api/v1/users/5/today", Some(&t.frontend), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["date"], json!("2026-10-16"));
        assert_eq!(body["eaten"], json!(120));
        assert_eq!(body["remaining"], json!(1680));
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_user_is_blocked_until_credits_are_granted() {
        let t = test_app(None);
        onboard(&t, 5).await;
        let user = t.store.get_user(5).await.unwrap().unwrap();
        t.store.seed_counter(user.id, date!(2026 - 10 - 16), 3);

        let (status, body) = call(
            &t.app,
            "POST",
            "/api/v1/users/5/analyses/text",
            Some(&t.frontend),
            Some(json!({ "text": "суп" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], json!("blocked"));
        assert_eq!(body["allowance"]["allowed"], json!(false));

        let (status, body) = call(
            &t.app,
            "POST",
            "/api/v1/users/5/credits",
            Some(&t.payments),
            Some(json!({ "count": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["purchased_credits"], json!(10));
        assert_eq!(body["allowance"]["allowed"], json!(true));

        let (_, body) = call(
            &t.app,
            "POST",
            "/api/v1/users/5/analyses/text",
            Some(&t.frontend),
            Some(json!({ "text": "суп" })),
        )
        .await;
        assert_eq!(body["charged"], json!("purchased"));
        assert_eq!(body["allowance"]["purchased_remaining"], json!(9));
    }

    #[tokio::test]
    async fn unlimited_grant_reports_unbounded_balance() {
        let t = test_app(None);
        onboard(&t, 5).await;
        let (status, body) = call(
            &t.app,
            "POST",
            "/api/v1/users/5/unlimited",
            Some(&t.payments),
            Some(json!({ "days": 30 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["unlimited_until"], json!("2026-11-15"));
        assert_eq!(body["allowance"]["is_unlimited"], json!(true));
        assert_eq!(body["allowance"]["free_remaining"], json!("unbounded"));

        let (status, _) = call(&t.app, "GET", "/api/v1/users/5/balance", Some(&t.frontend), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn voice_analysis_returns_transcript() {
        let t = test_app(Some("два банана"));
        onboard(&t, 5).await;
        let (status, body) = call(
            &t.app,
            "POST",
            "/api/v1/users/5/analyses/voice",
            Some(&t.frontend),
            Some(json!({ "file_url": "https://files.test/v.ogg", "duration_seconds": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], json!("food_detected"));
        assert_eq!(body["transcript"], json!("два банана"));
        assert_eq!(body["estimate"]["total_calories"], json!(105));
    }

    #[tokio::test]
    async fn failed_transcription_is_reported_without_charge() {
        let t = test_app(None);
        onboard(&t, 5).await;
        let (status, body) = call(
            &t.app,
            "POST",
            "/api/v1/users/5/analyses/voice",
            Some(&t.frontend),
            Some(json!({ "file_url": "https://files.test/v.ogg", "duration_seconds": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], json!("transcription_failed"));

        let (_, body) = call(&t.app, "GET", "/api/v1/users/5/balance", Some(&t.frontend), None).await;
        assert_eq!(body["allowance"]["free_remaining"], json!(3));
    }

    #[tokio::test]
    async fn image_reasoning_outage_is_an_infra_error() {
        let t = test_app(None);
        onboard(&t, 5).await;
        let (status, body) = call(
            &t.app,
            "POST",
            "/api/v1/users/5/analyses/image",
            Some(&t.frontend),
            Some(json!({ "file_url": "https://files.test/p.jpg", "size_bytes": 1024 })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({ "kind": "infra_error" }));
    }
}
