//! In-process fake of the storefront auth service.
//!
//! Sessions are opaque tokens in an `sid` cookie. `me` answers 401 without a
//! valid cookie, and can be forced to any status to exercise error paths.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::{Value, json};

pub const COOKIE_NAME: &str = "sid";

#[derive(Default)]
pub struct FakeAuth {
    /// email -> (password, user body)
    accounts: Mutex<HashMap<String, (String, Value)>>,
    /// session token -> email
    sessions: Mutex<HashMap<String, String>>,
    next_id: AtomicUsize,
    me_calls: AtomicUsize,
    /// Non-zero forces `me` to answer with this status.
    me_status: AtomicU16,
}

impl FakeAuth {
    pub fn me_calls(&self) -> usize {
        self.me_calls.load(Ordering::SeqCst)
    }

    pub fn force_me_status(&self, status: u16) {
        self.me_status.store(status, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn open_session(&self, email: &str) -> String {
        let token = format!("tok-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sessions
            .lock()
            .unwrap()
            .insert(token.clone(), email.to_owned());
        token
    }

    fn user_for(&self, jar: &CookieJar) -> Option<Value> {
        let token = jar.get(COOKIE_NAME).map(Cookie::value)?;
        let email = self.sessions.lock().unwrap().get(token).cloned()?;
        self.accounts
            .lock()
            .unwrap()
            .get(&email)
            .map(|(_, user)| user.clone())
    }
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token)).path("/").http_only(true).build()
}

async fn me(State(state): State<Arc<FakeAuth>>, jar: CookieJar) -> Response {
    state.me_calls.fetch_add(1, Ordering::SeqCst);
    let forced = state.me_status.load(Ordering::SeqCst);
    if forced != 0 {
        let status = StatusCode::from_u16(forced).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "forced failure").into_response();
    }
    match state.user_for(&jar) {
        Some(user) => Json(user).into_response(),
        None => (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Not authenticated" }))).into_response(),
    }
}

async fn signup(State(state): State<Arc<FakeAuth>>, jar: CookieJar, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    let password = body["password"].as_str().unwrap_or_default().to_owned();
    if email.is_empty() || password.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": "Email and password are required" })))
            .into_response();
    }
    let user = {
        let mut accounts = state.accounts.lock().unwrap();
        if accounts.contains_key(&email) {
            return (StatusCode::CONFLICT, Json(json!({ "message": "Email already registered" }))).into_response();
        }
        let id = format!("u{}", state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut user = json!({ "id": id, "email": email, "role": "customer" });
        if let Some(name) = body.get("name") {
            user["name"] = name.clone();
        }
        accounts.insert(email.clone(), (password, user.clone()));
        user
    };
    let token = state.open_session(&email);
    (StatusCode::CREATED, jar.add(session_cookie(token)), Json(user)).into_response()
}

async fn signin(State(state): State<Arc<FakeAuth>>, jar: CookieJar, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let user = state
        .accounts
        .lock()
        .unwrap()
        .get(email)
        .filter(|(stored, _)| stored == password)
        .map(|(_, user)| user.clone());
    let Some(user) = user else {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid credentials" }))).into_response();
    };
    let token = state.open_session(email);
    (StatusCode::OK, jar.add(session_cookie(token)), Json(user)).into_response()
}

async fn signout(State(state): State<Arc<FakeAuth>>, jar: CookieJar) -> Response {
    if let Some(token) = jar.get(COOKIE_NAME).map(Cookie::value) {
        state.sessions.lock().unwrap().remove(token);
    }
    let jar = jar.remove(Cookie::build((COOKIE_NAME, "")).path("/"));
    (StatusCode::OK, jar, Json(json!({ "message": "Signed out" }))).into_response()
}

/// Start the fake on an ephemeral port; returns its base URL and state.
pub async fn spawn_fake_auth() -> (String, Arc<FakeAuth>) {
    let state = Arc::new(FakeAuth::default());
    let app = Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/signin", post(signin))
        .route("/api/auth/signout", post(signout))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

/// A base URL nothing listens on.
pub async fn dead_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
