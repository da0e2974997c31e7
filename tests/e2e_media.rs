//! E2E tests for thread media uploads (local blob storage)

mod common;

use common::TestServer;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

fn file(name: &str, bytes: &[u8]) -> Part {
    Part::bytes(bytes.to_vec()).file_name(name.to_string())
}

#[tokio::test]
async fn test_upload_creates_typed_media() {
    let server = TestServer::new().await;
    let (_, token) = server.create_user("ana").await;

    let form = Form::new()
        .text("content", "holiday #photos")
        .part("media", file("beach.JPG", b"jpeg bytes"))
        .part("media", file("clip.mp4", b"mp4 bytes"))
        .part("media", file("empty.png", b""))
        .part("media", file("notes.txt", b"text"));

    let response = server
        .client
        .post(server.url("/api/threads/media"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let thread: Value = response.json().await.unwrap();
    let media = thread["media"].as_array().unwrap();
    let types: Vec<&str> = media
        .iter()
        .map(|m| m["mediaType"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["IMAGE", "VIDEO", "OTHER"]);
    assert_eq!(media[0]["mediaAlt"], "beach.JPG");
    assert_eq!(thread["hashtags"], serde_json::json!(["photos"]));

    let url = media[0]["mediaUrl"].as_str().unwrap();
    assert!(url.starts_with("/uploads/"));
    assert!(url.ends_with(".jpg"));

    let served = server.client.get(server.url(url)).send().await.unwrap();
    assert_eq!(served.status(), 200);
    assert_eq!(served.bytes().await.unwrap().as_ref(), b"jpeg bytes");
}

#[tokio::test]
async fn test_delete_purges_stored_files() {
    let server = TestServer::new().await;
    let (_, token) = server.create_user("ana").await;

    let form = Form::new()
        .text("content", "short lived")
        .part("media", file("loop.gif", b"gif89a"));
    let thread: Value = server
        .client
        .post(server.url("/api/threads/media"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(thread["media"][0]["mediaType"], "GIF");
    let url = thread["media"][0]["mediaUrl"].as_str().unwrap().to_string();

    let response = server
        .client
        .delete(server.url(&format!("/api/threads/{}", thread["id"])))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let served = server.client.get(server.url(&url)).send().await.unwrap();
    assert_eq!(served.status(), 404);
}

#[tokio::test]
async fn test_upload_reply_to_missing_parent_stores_nothing() {
    let server = TestServer::new().await;
    let (_, token) = server.create_user("ana").await;

    let form = Form::new()
        .text("content", "reply with media")
        .text("parentId", "999")
        .part("media", file("a.png", b"png"));
    let response = server
        .client
        .post(server.url("/api/threads/media"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let uploads = server._temp_dir.path().join("uploads");
    let stored = std::fs::read_dir(uploads).unwrap().count();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_upload_requires_content() {
    let server = TestServer::new().await;
    let (_, token) = server.create_user("ana").await;

    let form = Form::new().part("media", file("a.png", b"png"));
    let response = server
        .client
        .post(server.url("/api/threads/media"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_upload_above_default_body_limit_is_accepted() {
    let server = TestServer::new().await;
    let (_, token) = server.create_user("ana").await;

    let large = vec![7_u8; 3 * 1024 * 1024];
    let form = Form::new()
        .text("content", "big picture")
        .part("media", file("poster.png", &large));

    let response = server
        .client
        .post(server.url("/api/threads/media"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let thread: Value = response.json().await.unwrap();
    assert_eq!(thread["media"][0]["mediaType"], "IMAGE");
}
