use super::*;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use barterlink_core::{Environment, OfferStatus, ProfileDraft, StorageConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{header as header_eq, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SALT: &str = "route-test-salt";
const SLOT_DATE: &str = "2099-06-01";

// -------------------------------------------------------------------------
// Unit tests (no DB)
// -------------------------------------------------------------------------

#[test]
fn normalize_limit_applies_defaults_and_bounds() {
    assert_eq!(normalize_limit(None), 50);
    assert_eq!(normalize_limit(Some(0)), 1);
    assert_eq!(normalize_limit(Some(1_000)), 200);
    assert_eq!(normalize_limit(Some(25)), 25);
}

#[test]
fn error_codes_map_to_statuses() {
    let cases = [
        ("unauthorized", StatusCode::UNAUTHORIZED),
        ("forbidden", StatusCode::FORBIDDEN),
        ("business_mismatch", StatusCode::FORBIDDEN),
        ("validation_error", StatusCode::BAD_REQUEST),
        ("invalid_payload", StatusCode::BAD_REQUEST),
        ("not_found", StatusCode::NOT_FOUND),
        ("conflict", StatusCode::CONFLICT),
        ("slot_taken", StatusCode::CONFLICT),
        ("already_checked_in", StatusCode::CONFLICT),
        ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
        ("storage_unavailable", StatusCode::BAD_GATEWAY),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, expected) in cases {
        let response = ApiError::new("req-1", code, "message").into_response();
        assert_eq!(response.status(), expected, "code {code}");
    }
}

#[test]
fn rule_errors_keep_their_field() {
    let err = map_db_error(
        "req-1".to_string(),
        &DbError::Rule(RuleError::Validation {
            field: "has_tagged_business",
            message: "you must confirm the business was tagged".to_string(),
        }),
    );
    assert_eq!(err.error.code, "validation_error");
    assert_eq!(err.error.field.as_deref(), Some("has_tagged_business"));

    let json = serde_json::to_value(&err).expect("serialize");
    assert_eq!(json["error"]["field"], "has_tagged_business");
    assert_eq!(json["meta"]["request_id"], "req-1");
}

#[test]
fn rejected_field_reads_serde_error_text() {
    assert_eq!(
        rejected_field("missing field `party_size` at line 1 column 40").as_deref(),
        Some("party_size")
    );
    assert_eq!(
        rejected_field("unknown field `tiktok_handle`, expected one of `a`, `b`").as_deref(),
        Some("tiktok_handle")
    );
    assert_eq!(
        rejected_field("party_size: invalid type: floating point `1.5`, expected i32 at line 1 column 52")
            .as_deref(),
        Some("party_size")
    );
    assert_eq!(
        rejected_field("requirements[2]: invalid type: integer `7`, expected a string").as_deref(),
        Some("requirements")
    );
    assert_eq!(rejected_field("invalid type: integer `1`, expected struct X"), None);
}

#[test]
fn lifecycle_conflicts_map_to_conflict_codes() {
    assert_eq!(
        map_db_error("r".to_string(), &DbError::SlotTaken).error.code,
        "slot_taken"
    );
    assert_eq!(
        map_rule_error("r".to_string(), &RuleError::ProofMissing).error.code,
        "conflict"
    );
    assert_eq!(
        map_rule_error("r".to_string(), &RuleError::AlreadyCheckedIn).error.code,
        "already_checked_in"
    );
    let plain = map_db_error("r".to_string(), &DbError::NotFound);
    assert_eq!(plain.error.code, "not_found");
    assert!(plain.error.field.is_none());
    let json = serde_json::to_value(&plain).expect("serialize");
    assert!(json["error"].get("field").is_none());
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

fn test_config(storage: Option<StorageConfig>) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        log_level: "debug".to_string(),
        session_hash_salt: SALT.to_string(),
        session_ttl_hours: 24,
        checkin_signing_key: "route-test-signing-key-0123456789abcdef".to_string(),
        checkin_token_ttl_secs: 3_600,
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 5,
        storage,
        max_video_bytes: 64,
        rate_limit_per_minute: 1_000,
    }
}

fn app_with(pool: PgPool, config: AppConfig, rate_limit: RateLimitState) -> Router {
    let auth = AuthState::new(pool.clone(), &config.session_hash_salt);
    let state = AppState::from_config(pool, Arc::new(config)).expect("app state");
    build_app(state, auth, rate_limit)
}

fn app(pool: PgPool) -> Router {
    let config = test_config(None);
    let rate_limit = rate_limit_state(&config);
    app_with(pool, config, rate_limit)
}

fn influencer_draft(email: &str) -> ProfileDraft {
    ProfileDraft {
        user_type: UserType::Influencer,
        email: email.to_string(),
        display_name: "Route Influencer".to_string(),
        avatar_url: None,
        instagram_handle: Some("routetester".to_string()),
        tiktok_handle: None,
        follower_count: Some(12_000),
        engagement_rate: None,
        niche: Some("food".to_string()),
        business_name: None,
        business_category: None,
        address: None,
        website_url: None,
        metadata: None,
    }
}

fn business_draft(email: &str) -> ProfileDraft {
    ProfileDraft {
        user_type: UserType::Business,
        email: email.to_string(),
        display_name: "Route Cafe".to_string(),
        avatar_url: None,
        instagram_handle: None,
        tiktok_handle: None,
        follower_count: None,
        engagement_rate: None,
        niche: None,
        business_name: Some("Route Cafe".to_string()),
        business_category: Some("restaurant".to_string()),
        address: Some("2 Harbour Rd".to_string()),
        website_url: None,
        metadata: None,
    }
}

/// Create a profile and return its id with a live session token.
async fn sign_in(pool: &PgPool, draft: ProfileDraft) -> (Uuid, String) {
    let profile = barterlink_db::create_profile(pool, draft)
        .await
        .expect("create profile");
    let session = barterlink_db::issue_session(pool, profile.id, SALT, 24, Utc::now())
        .await
        .expect("issue session");
    (profile.id, session.token)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json parse")
    };
    (status, json)
}

/// POST a raw, possibly malformed, JSON body.
async fn post_raw(app: &Router, uri: &str, token: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_owned()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&bytes).expect("json envelope"))
}

async fn create_offer(app: &Router, token: &str, title: &str) -> String {
    let (status, json) = send(
        app,
        Method::POST,
        "/api/v1/offers",
        Some(token),
        Some(serde_json::json!({
            "title": title,
            "description": "Tasting menu for two",
            "category": "food",
            "location": "Porto",
            "requirements": ["1 reel", "tag @routecafe"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["data"]["id"].as_str().expect("offer id").to_string()
}

async fn apply(app: &Router, token: &str, offer_id: &str, time: &str) -> String {
    let (status, json) = send(
        app,
        Method::POST,
        &format!("/api/v1/offers/{offer_id}/applications"),
        Some(token),
        Some(serde_json::json!({
            "date": SLOT_DATE,
            "time": time,
            "party_size": 2,
            "message": "  Would love to come by!  ",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["data"]["id"].as_str().expect("application id").to_string()
}

/// Business + influencer with an accepted application; returns
/// `(business_token, influencer_token, collaboration_id)`.
async fn active_collaboration(pool: &PgPool, app: &Router) -> (String, String, String) {
    let (_, business) = sign_in(pool, business_draft("biz@route.test")).await;
    let (_, influencer) = sign_in(pool, influencer_draft("inf@route.test")).await;
    let offer_id = create_offer(app, &business, "Brunch barter").await;
    let application_id = apply(app, &influencer, &offer_id, "11:00").await;

    let (status, json) = send(
        app,
        Method::POST,
        &format!("/api/v1/applications/{application_id}/accept"),
        Some(&business),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    let collaboration_id = json["data"]["collaboration"]["id"]
        .as_str()
        .expect("collaboration id")
        .to_string();
    (business, influencer, collaboration_id)
}

fn valid_proof() -> serde_json::Value {
    serde_json::json!({
        "video_url": "https://cdn.example.com/reels/1.mp4",
        "video_filename": "reel.mp4",
        "social_media_post_url": "https://instagram.com/p/route123",
        "has_tagged_business": true,
        "has_sent_collab_request": true,
    })
}

// -------------------------------------------------------------------------
// Health, auth and middleware
// -------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn health_is_public(pool: PgPool) {
    let app = app(pool);
    let (status, json) = send(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "ok");
    assert!(json["meta"]["request_id"].is_string());
}

#[sqlx::test(migrations = "../../migrations")]
async fn protected_routes_require_a_session(pool: PgPool) {
    let app = app(pool);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/me")
                .header("x-request-id", "req-from-client")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("req-from-client")
    );
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
    assert_eq!(json["error"]["code"], "unauthorized");
    assert_eq!(json["meta"]["request_id"], "req-from-client");

    let (status, _) = send(&app, Method::GET, "/api/v1/me", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn rate_limit_rejects_requests_over_the_window(pool: PgPool) {
    let (_, token) = sign_in(&pool, influencer_draft("limited@route.test")).await;
    let (_, other) = sign_in(&pool, business_draft("unaffected@route.test")).await;
    let app = app_with(
        pool,
        test_config(None),
        RateLimitState::new(1, Duration::from_secs(60)),
    );

    let (first, _) = send(&app, Method::GET, "/api/v1/me", Some(&token), None).await;
    assert_eq!(first, StatusCode::OK);
    let (second, json) = send(&app, Method::GET, "/api/v1/me", Some(&token), None).await;
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"]["code"], "rate_limited");

    let (status, _) = send(&app, Method::GET, "/api/v1/me", Some(&other), None).await;
    assert_eq!(status, StatusCode::OK, "other profiles keep their own window");
}

// -------------------------------------------------------------------------
// Me and session
// -------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn me_returns_and_patches_own_profile(pool: PgPool) {
    let (id, token) = sign_in(&pool, influencer_draft("me@route.test")).await;
    let app = app(pool);

    let (status, json) = send(&app, Method::GET, "/api/v1/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["id"], id.to_string());
    assert_eq!(json["data"]["user_type"], "influencer");

    let (status, json) = send(
        &app,
        Method::PATCH,
        "/api/v1/me",
        Some(&token),
        Some(serde_json::json!({ "display_name": "Renamed", "niche": "travel" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["display_name"], "Renamed");
    assert_eq!(json["data"]["niche"], "travel");

    let (status, json) = send(
        &app,
        Method::PATCH,
        "/api/v1/me",
        Some(&token),
        Some(serde_json::json!({ "business_name": "Not A Business" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
    assert_eq!(json["error"]["field"], "business_name");
}

#[sqlx::test(migrations = "../../migrations")]
async fn refresh_rotates_and_delete_revokes_the_session(pool: PgPool) {
    let (_, token) = sign_in(&pool, influencer_draft("session@route.test")).await;
    let app = app(pool);

    let (status, json) = send(
        &app,
        Method::POST,
        "/api/v1/session/refresh",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let fresh = json["data"]["token"].as_str().expect("token").to_string();
    assert_ne!(fresh, token);

    let (old, _) = send(&app, Method::GET, "/api/v1/me", Some(&token), None).await;
    assert_eq!(old, StatusCode::UNAUTHORIZED);
    let (new, _) = send(&app, Method::GET, "/api/v1/me", Some(&fresh), None).await;
    assert_eq!(new, StatusCode::OK);

    let (status, json) = send(&app, Method::DELETE, "/api/v1/session", Some(&fresh), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["revoked"], true);
    let (after, _) = send(&app, Method::GET, "/api/v1/me", Some(&fresh), None).await;
    assert_eq!(after, StatusCode::UNAUTHORIZED);
}

// -------------------------------------------------------------------------
// Offers
// -------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn only_businesses_create_offers_and_drafts_stay_private(pool: PgPool) {
    let (_, business) = sign_in(&pool, business_draft("offers@route.test")).await;
    let (_, influencer) = sign_in(&pool, influencer_draft("browser@route.test")).await;
    let app = app(pool);

    let (status, json) = send(
        &app,
        Method::POST,
        "/api/v1/offers",
        Some(&influencer),
        Some(serde_json::json!({ "title": "x", "category": "food", "location": "Porto" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "forbidden");

    let offer_id = create_offer(&app, &business, "Coffee tasting").await;

    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/offers?category=FOOD&location=porto",
        Some(&influencer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().map(Vec::len), Some(1));

    let (status, json) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/offers/{offer_id}"),
        Some(&business),
        Some(serde_json::json!({ "status": OfferStatus::Draft.as_str() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["status"], "draft");

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/offers/{offer_id}"),
        Some(&influencer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/offers?mine=true",
        Some(&business),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"][0]["id"], offer_id);

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/offers/{offer_id}"),
        Some(&influencer),
        Some(serde_json::json!({ "title": "Hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// -------------------------------------------------------------------------
// Applications
// -------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn accept_cancels_siblings_and_second_accept_reports_slot_taken(pool: PgPool) {
    let (_, business) = sign_in(&pool, business_draft("slots@route.test")).await;
    let (_, first) = sign_in(&pool, influencer_draft("first@route.test")).await;
    let (_, second) = sign_in(&pool, influencer_draft("second@route.test")).await;
    let app = app(pool.clone());

    let offer_id = create_offer(&app, &business, "Dinner slot").await;
    let a = apply(&app, &first, &offer_id, "19:00").await;
    let b = apply(&app, &second, &offer_id, "19:00").await;

    let (status, json) = send(
        &app,
        Method::POST,
        &format!("/api/v1/applications/{a}/accept"),
        Some(&business),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["application"]["status"], "accepted");
    assert_eq!(json["data"]["collaboration"]["status"], "active");
    assert_eq!(json["data"]["collaboration"]["scheduled_time"], "19:00");
    assert_eq!(json["data"]["cancelled_application_ids"][0], b);

    let (status, json) = send(
        &app,
        Method::POST,
        &format!("/api/v1/applications/{b}/accept"),
        Some(&business),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "slot_taken");

    let (_, late) = sign_in(&pool, influencer_draft("late@route.test")).await;
    let (status, json) = send(
        &app,
        Method::POST,
        &format!("/api/v1/offers/{offer_id}/applications"),
        Some(&late),
        Some(serde_json::json!({ "date": SLOT_DATE, "time": "19:00", "party_size": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "slot_taken");

    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/applications?status=cancelled",
        Some(&second),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"][0]["id"], b);
    assert_eq!(json["data"][0]["message"], "Would love to come by!");

    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/applications?status=archived",
        Some(&second),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["field"], "status");
}

#[sqlx::test(migrations = "../../migrations")]
async fn application_transitions_are_scoped_to_the_right_party(pool: PgPool) {
    let (_, business) = sign_in(&pool, business_draft("owner@route.test")).await;
    let (_, rival) = sign_in(&pool, business_draft("rival@route.test")).await;
    let (_, influencer) = sign_in(&pool, influencer_draft("applicant@route.test")).await;
    let app = app(pool);

    let offer_id = create_offer(&app, &business, "Spa day").await;
    let application_id = apply(&app, &influencer, &offer_id, "10:00").await;

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/applications/{application_id}/accept"),
        Some(&rival),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/offers/{offer_id}/applications"),
        Some(&rival),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(
        &app,
        Method::POST,
        &format!("/api/v1/applications/{application_id}/decline"),
        Some(&business),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "declined");

    let (status, json) = send(
        &app,
        Method::POST,
        &format!("/api/v1/applications/{application_id}/withdraw"),
        Some(&influencer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "conflict");

    let (status, json) = send(
        &app,
        Method::POST,
        &format!("/api/v1/offers/{offer_id}/applications"),
        Some(&influencer),
        Some(serde_json::json!({ "date": "2000-01-01", "time": "10:00", "party_size": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["field"], "date");
}

#[sqlx::test(migrations = "../../migrations")]
async fn undecodable_application_bodies_name_the_field(pool: PgPool) {
    let (_, business) = sign_in(&pool, business_draft("decode@route.test")).await;
    let (_, influencer) = sign_in(&pool, influencer_draft("decoder@route.test")).await;
    let app = app(pool);
    let offer_id = create_offer(&app, &business, "Decode dinner").await;
    let uri = format!("/api/v1/offers/{offer_id}/applications");

    let cases = [
        (
            serde_json::json!({ "date": SLOT_DATE, "time": "25:00", "party_size": 2 }),
            "time",
        ),
        (
            serde_json::json!({ "date": SLOT_DATE, "time": "19:00", "party_size": 1.5 }),
            "party_size",
        ),
        (
            serde_json::json!({ "date": SLOT_DATE, "time": "19:00" }),
            "party_size",
        ),
        (
            serde_json::json!({ "date": "June 1st", "time": "19:00", "party_size": 2 }),
            "date",
        ),
    ];
    for (body, field) in cases {
        let (status, json) = send(&app, Method::POST, &uri, Some(&influencer), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
        assert_eq!(json["error"]["code"], "validation_error", "{json}");
        assert_eq!(json["error"]["field"], field, "{json}");
        assert!(json["meta"]["request_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    let (status, json) = post_raw(&app, &uri, &influencer, "{\"date\": ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
    assert_eq!(json["error"]["field"], "body");

    let (status, json) = send(
        &app,
        Method::POST,
        "/api/v1/offers",
        Some(&business),
        Some(serde_json::json!({ "title": "No category", "location": "Porto" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["field"], "category");
}

// -------------------------------------------------------------------------
// Check-in, proof and completion
// -------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn check_in_without_a_token_string_is_invalid_payload(pool: PgPool) {
    let (_, business) = sign_in(&pool, business_draft("scanner@route.test")).await;
    let app = app(pool);

    for body in [serde_json::json!({}), serde_json::json!({ "token": 42 })] {
        let (status, json) =
            send(&app, Method::POST, "/api/v1/checkins", Some(&business), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
        assert_eq!(json["error"]["code"], "invalid_payload", "{json}");
    }

    let (status, json) = post_raw(&app, "/api/v1/checkins", &business, "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "invalid_payload");
}

#[sqlx::test(migrations = "../../migrations")]
async fn full_flow_from_checkin_to_completion(pool: PgPool) {
    let app = app(pool.clone());
    let (business, influencer, collaboration_id) = active_collaboration(&pool, &app).await;
    let (_, stranger) = sign_in(&pool, business_draft("stranger@route.test")).await;

    let (status, json) = send(
        &app,
        Method::POST,
        &format!("/api/v1/collaborations/{collaboration_id}/checkin-token"),
        Some(&influencer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["payload"]["type"], "collaboration-checkin");
    assert_eq!(json["data"]["payload"]["collaborationId"], collaboration_id);
    let token = json["data"]["token"].as_str().expect("token").to_string();

    let (status, json) = send(
        &app,
        Method::POST,
        "/api/v1/checkins",
        Some(&stranger),
        Some(serde_json::json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "business_mismatch");

    let (status, json) = send(
        &app,
        Method::POST,
        "/api/v1/checkins",
        Some(&business),
        Some(serde_json::json!({ "token": format!("{token}x") })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "invalid_payload");

    let (status, json) = send(
        &app,
        Method::POST,
        "/api/v1/checkins",
        Some(&business),
        Some(serde_json::json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    // The slot is decades away, so the arrival is far too early.
    assert_eq!(json["data"]["is_on_time"], false);
    assert!(json["data"]["collaboration"]["checked_in_at"].is_string());

    let (status, json) = send(
        &app,
        Method::POST,
        "/api/v1/checkins",
        Some(&business),
        Some(serde_json::json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "already_checked_in");

    let (status, json) = send(
        &app,
        Method::POST,
        &format!("/api/v1/collaborations/{collaboration_id}/complete"),
        Some(&business),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "completion needs proof first");
    assert_eq!(json["error"]["code"], "conflict");

    let mut untagged = valid_proof();
    untagged["has_tagged_business"] = serde_json::Value::Bool(false);
    let (status, json) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/collaborations/{collaboration_id}/proof"),
        Some(&influencer),
        Some(untagged),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["field"], "has_tagged_business");

    let (status, json) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/collaborations/{collaboration_id}/proof"),
        Some(&influencer),
        Some(valid_proof()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(
        json["data"]["social_media_post_url"],
        "https://instagram.com/p/route123"
    );

    let (status, json) = send(
        &app,
        Method::POST,
        &format!("/api/v1/collaborations/{collaboration_id}/complete"),
        Some(&business),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["status"], "completed");

    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/collaborations?status=completed",
        Some(&influencer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"][0]["id"], collaboration_id);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/collaborations/{collaboration_id}"),
        Some(&stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// -------------------------------------------------------------------------
// Proof video upload
// -------------------------------------------------------------------------

async fn upload(
    app: &Router,
    token: &str,
    collaboration_id: &str,
    bytes: &'static [u8],
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(format!(
                    "/api/v1/collaborations/{collaboration_id}/proof/video"
                ))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "video/mp4")
                .header("x-filename", "My Reel (final).mp4")
                .body(Body::from(bytes))
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&body).expect("json parse"))
}

#[sqlx::test(migrations = "../../migrations")]
async fn proof_video_is_uploaded_to_storage(pool: PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header_eq("authorization", "Bearer storage-key"))
        .and(header_eq("x-upsert", "true"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(Some(StorageConfig {
        base_url: server.uri(),
        service_key: "storage-key".to_string(),
        bucket: "collab-content".to_string(),
        timeout_secs: 5,
        max_retries: 0,
    }));
    let rate_limit = rate_limit_state(&config);
    let app = app_with(pool.clone(), config, rate_limit);
    let (_, influencer, collaboration_id) = active_collaboration(&pool, &app).await;

    let (status, json) = upload(&app, &influencer, &collaboration_id, b"tiny-video").await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["video_filename"], "My-Reel-final-.mp4");
    assert_eq!(json["data"]["size_bytes"], 10);
    let url = json["data"]["video_url"].as_str().expect("video url");
    assert!(
        url.starts_with(&format!(
            "{}/storage/v1/object/public/collab-content/collaborations/{collaboration_id}/",
            server.uri()
        )),
        "unexpected url {url}"
    );

    let oversized: &'static [u8] = &[0u8; 65];
    let (status, json) = upload(&app, &influencer, &collaboration_id, oversized).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["field"], "video");
}

#[sqlx::test(migrations = "../../migrations")]
async fn proof_video_without_storage_is_unavailable(pool: PgPool) {
    let app = app(pool.clone());
    let (business, influencer, collaboration_id) = active_collaboration(&pool, &app).await;

    let (status, json) = upload(&app, &business, &collaboration_id, b"abc").await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{json}");

    let (status, json) = upload(&app, &influencer, &collaboration_id, b"abc").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"]["code"], "storage_unavailable");
}

