use std::sync::Arc;

use api_adapters::{build_router, AppState};
use auth_adapters::{Argon2PasswordHasher, RandomTokenGenerator};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use axum_extra::extract::cookie::Key;
use domains::{Clock, SystemClock};
use serde_json::{json, Value};
use services::{
    AttemptPolicy, AuthService, CollectionService, CommentService, PostService,
    ProgressionService, SessionService, SessionSettings, WatchlistService,
};
use storage_adapters::{LoggingEventEmitter, MemoryStore, NoopGeoLocator};
use tower::ServiceExt;

fn app() -> Router {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let events = Arc::new(LoggingEventEmitter);
    let sessions = Arc::new(SessionService::new(
        store.clone(),
        Arc::new(NoopGeoLocator),
        events.clone(),
        Arc::new(RandomTokenGenerator),
        clock.clone(),
        SessionSettings::default(),
    ));
    build_router(AppState {
        auth: Arc::new(AuthService::new(
            store.clone(),
            store.clone(),
            Arc::new(Argon2PasswordHasher::new()),
            sessions.clone(),
            clock.clone(),
            AttemptPolicy::default(),
        )),
        sessions,
        comments: Arc::new(CommentService::new(store.clone(), events, clock.clone(), "salt")),
        collections: Arc::new(CollectionService::new(store.clone())),
        posts: Arc::new(PostService::new(store.clone())),
        watchlist: Arc::new(WatchlistService::new(store.clone(), clock.clone())),
        progression: Arc::new(ProgressionService::new(store.clone(), clock)),
        users: store.clone(),
        session_logs: store,
        cookie_key: Key::generate(),
    })
}

fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "tests");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).header(header::USER_AGENT, "tests");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `name=value` of the session cookie set by a response.
fn session_cookie(response: &Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("ado-ident="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
        .expect("session cookie")
}

async fn signed_up(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/signup",
            None,
            json!({ "username": "rustacean", "email": "crab@example.com", "password": "ferris-rules" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    session_cookie(&response)
}

#[tokio::test]
async fn sign_up_starts_a_listed_session() {
    let app = app();
    let cookie = signed_up(&app).await;

    let response = app.oneshot(get("/sessions", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let sessions = body_json(response).await;
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["is_current_session"], json!(true));
    assert!(sessions[0].get("token").is_none());
}

#[tokio::test]
async fn invalid_sign_up_lists_fields() {
    let response = app()
        .oneshot(json_request(
            "POST",
            "/signup",
            None,
            json!({ "username": "x", "email": "nope", "password": "short" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["field"].as_str())
        .collect();
    assert!(fields.contains(&"username"));
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"password"));
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = app();
    signed_up(&app).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/signin",
            None,
            json!({ "uid": "rustacean", "password": "not-the-password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], json!("Invalid credentials"));
}

#[tokio::test]
async fn anonymous_comment_is_refused() {
    let response = app()
        .oneshot(json_request(
            "POST",
            "/comments",
            None,
            json!({ "postId": uuid::Uuid::now_v7(), "body": "hello" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn comment_list_needs_one_target() {
    let response = app().oneshot(get("/comments", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn signed_in_user_can_comment_and_sign_out() {
    let app = app();
    let cookie = signed_up(&app).await;
    let post_id = uuid::Uuid::now_v7();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/comments",
            Some(&cookie),
            json!({ "postId": post_id, "body": "<p>hi<script>x()</script></p>" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["body"], json!("<p>hi</p>"));

    let response = app
        .clone()
        .oneshot(json_request("POST", "/signout", Some(&cookie), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/sessions", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_home_feed() {
    let response = app().oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    for key in ["series", "lessons", "blogs", "snippets"] {
        assert_eq!(body[key], json!([]), "{key}");
    }
}

#[tokio::test]
async fn lesson_neighbours_at_the_index_bounds_are_not_found() {
    let series = uuid::Uuid::now_v7();
    let next = format!("/series/{series}/lessons/{}/next", i32::MAX);
    let response = app().oneshot(get(&next, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let previous = format!("/series/{series}/lessons/{}/previous", i32::MIN);
    let response = app().oneshot(get(&previous, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
