//! E2E tests for the follow graph

mod common;

use common::TestServer;
use serde_json::json;

#[tokio::test]
async fn test_follow_twice_counts_once() {
    let server = TestServer::new().await;
    let (_, ana) = server.create_user("ana").await;
    let (ben_user, _) = server.create_user("ben").await;
    let path = format!("/api/users/{}/follow", ben_user.id);

    let (status, first) = server.post_json(&ana, &path, json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(
        first,
        json!({ "following": true, "followerCount": 1, "followingCount": 0 })
    );

    let (_, second) = server.post_json(&ana, &path, json!({})).await;
    assert_eq!(second["followerCount"], 1);

    let (_, anonymous) = server
        .get_json(None, &format!("/api/users/{}/follow-status", ben_user.id))
        .await;
    assert_eq!(anonymous["following"], false);
    assert_eq!(anonymous["followerCount"], 1);

    let response = server
        .client
        .delete(server.url(&path))
        .bearer_auth(&ana)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["following"], false);
    assert_eq!(body["followerCount"], 0);
}

#[tokio::test]
async fn test_self_follow_and_unknown_user() {
    let server = TestServer::new().await;
    let (ana_user, ana) = server.create_user("ana").await;

    let (status, body) = server
        .post_json(&ana, &format!("/api/users/{}/follow", ana_user.id), json!({}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "You cannot follow yourself");

    let (status, _) = server
        .post_json(&ana, "/api/users/999/follow", json!({}))
        .await;
    assert_eq!(status, 404);

    let (status, _) = server.get_json(None, "/api/users/999/followers").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_follower_and_following_lists() {
    let server = TestServer::new().await;
    let (ana_user, ana) = server.create_user("ana").await;
    let (ben_user, ben) = server.create_user("ben").await;
    let (cat_user, _) = server.create_user("cat").await;

    server
        .post_json(&ana, &format!("/api/users/{}/follow", cat_user.id), json!({}))
        .await;
    server
        .post_json(&ben, &format!("/api/users/{}/follow", cat_user.id), json!({}))
        .await;
    server
        .post_json(&ana, &format!("/api/users/{}/follow", ben_user.id), json!({}))
        .await;

    let (status, followers) = server
        .get_json(Some(&ana), &format!("/api/users/{}/followers", cat_user.id))
        .await;
    assert_eq!(status, 200);
    assert_eq!(followers["totalItems"], 2);
    for entry in followers["items"].as_array().unwrap() {
        let expected = entry["id"] == ben_user.id;
        assert_eq!(entry["following"], expected);
        assert!(entry["followedAt"].is_string());
    }

    let (_, following) = server
        .get_json(None, &format!("/api/users/{}/following", ana_user.id))
        .await;
    assert_eq!(following["totalItems"], 2);
    assert!(
        following["items"]
            .as_array()
            .unwrap()
            .iter()
            .all(|entry| entry["following"] == true)
    );
}
