use super::*;
use serde_json::json;

fn local_api() -> HttpAuthApi {
    let config = AuthConfig::with_base_url("http://127.0.0.1:5000").unwrap();
    HttpAuthApi::new(&config).unwrap()
}

#[test]
fn endpoint_url_joins_without_double_slash() {
    assert_eq!(endpoint_url("http://shop.test/", ME_PATH), "http://shop.test/api/auth/me");
    assert_eq!(endpoint_url("http://shop.test", "api/auth/signin"), "http://shop.test/api/auth/signin");
}

#[test]
fn base_url_has_no_trailing_slash() {
    assert_eq!(local_api().base_url(), "http://127.0.0.1:5000");
}

#[test]
fn parse_user_accepts_bare_object() {
    let user = parse_user(r#"{"id":"u1","email":"ada@petals.test"}"#).unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(user.email.as_deref(), Some("ada@petals.test"));
}

#[test]
fn parse_user_unwraps_user_envelope() {
    let body = json!({ "user": { "id": 7, "name": "Ada" }, "message": "welcome" }).to_string();
    let user = parse_user(&body).unwrap();
    assert_eq!(user.id, "7");
    assert_eq!(user.name.as_deref(), Some("Ada"));
}

#[test]
fn parse_user_keeps_user_field_when_id_present() {
    let body = json!({ "id": "u1", "user": { "id": "other" } }).to_string();
    let user = parse_user(&body).unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(user.extra["user"]["id"], "other");
}

#[test]
fn parse_user_rejects_garbage() {
    assert!(matches!(parse_user("not json"), Err(AuthError::Decode(_))));
    assert!(matches!(parse_user("{}"), Err(AuthError::Decode(_))));
    assert!(matches!(parse_user("null"), Err(AuthError::Decode(_))));
}

#[test]
fn seeded_cookie_is_sent_back() {
    let api = local_api();
    assert_eq!(api.session_cookie_header(), None);
    api.seed_session_cookie("connect.sid=s%3Aabc; Path=/; HttpOnly").unwrap();
    assert_eq!(api.session_cookie_header().as_deref(), Some("connect.sid=s%3Aabc"));
}

#[test]
fn seed_rejects_malformed_cookie() {
    let api = local_api();
    assert!(matches!(api.seed_session_cookie("justtext"), Err(AuthError::ConfigParse(_))));
    assert!(matches!(api.seed_session_cookie("=value"), Err(AuthError::ConfigParse(_))));
    assert_eq!(api.session_cookie_header(), None);
}
