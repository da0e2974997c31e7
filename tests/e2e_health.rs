//! E2E tests for health check, metrics and basic server behaviour

mod common;

use common::TestServer;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_cors_headers() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/health"))
        .header("Origin", "https://client.example.com")
        .send()
        .await
        .unwrap();

    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_404_for_unknown_routes() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/unknown/route"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_metrics_record_routed_requests() {
    let server = TestServer::new().await;

    let (status, _) = server.get_json(None, "/api/timeline").await;
    assert_eq!(status, 200);

    let response = server
        .client
        .get(server.url("/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    assert!(body.contains("threadline_http_requests_total"));
    assert!(body.contains("endpoint=\"/api/timeline\""));
}

#[tokio::test]
async fn test_invalid_token_is_rejected_where_required() {
    let server = TestServer::new().await;

    let (status, body) = server
        .post_json(
            "not-a-real-token",
            "/api/threads",
            serde_json::json!({ "content": "hello" }),
        )
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["kind"], "UNAUTHORIZED");

    // Optional-principal routes treat a bad token as anonymous
    let (status, _) = server
        .get_json(Some("not-a-real-token"), "/api/timeline")
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_locked_and_disabled_accounts_are_rejected() {
    let server = TestServer::new().await;
    let (ana, token) = server.create_user("ana").await;
    let thread_id = server.create_thread(&token, "before lock", None).await;

    let (status, _) = server
        .post_json(&token, &format!("/api/threads/{}/like", thread_id), serde_json::json!({}))
        .await;
    assert_eq!(status, 200);
    let (_, seen) = server
        .get_json(Some(&token), &format!("/api/threads/{}", thread_id))
        .await;
    assert_eq!(seen["liked"], true);

    server.state.db.set_user_flags(ana.id, true, true).await.unwrap();

    let (status, body) = server
        .post_json(&token, "/api/threads", serde_json::json!({ "content": "locked" }))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["kind"], "UNAUTHORIZED");

    // A locked principal is treated as anonymous where one is optional
    let (status, seen) = server
        .get_json(Some(&token), &format!("/api/threads/{}", thread_id))
        .await;
    assert_eq!(status, 200);
    assert_eq!(seen["liked"], false);

    server.state.db.set_user_flags(ana.id, false, false).await.unwrap();
    let (status, _) = server
        .post_json(&token, "/api/threads", serde_json::json!({ "content": "disabled" }))
        .await;
    assert_eq!(status, 401);
}
