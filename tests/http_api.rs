use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use ulid::Ulid;

use innkeep::config::ServerConfig;
use innkeep::engine::Engine;
use innkeep::http::{self, AppState};
use innkeep::notify::NotifyHub;

// ── Test infrastructure ──────────────────────────────────────

fn test_app() -> Router {
    let dir = std::env::temp_dir().join(format!("innkeep_http_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Engine::new(dir.join("innkeep.wal"), Arc::new(NotifyHub::new())).unwrap();
    http::router(AppState {
        engine: Arc::new(engine),
        config: Arc::new(ServerConfig::default()),
    })
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor", "front-desk");
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request(method, uri, body)).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_room(app: &Router, number: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/rooms",
        Some(json!({
            "number": number,
            "roomType": "double",
            "capacity": 2,
            "ratePerNight": 12000,
            "location": "east wing"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

fn booking(room_id: &str, check_in: &str, check_out: &str) -> Value {
    json!({
        "roomId": room_id,
        "checkIn": check_in,
        "checkOut": check_out,
        "guest": { "name": "Mary Jackson", "email": "mary@example.com" },
        "partySize": 2
    })
}

async fn create_booking(app: &Router, room_id: &str, check_in: &str, check_out: &str) -> (StatusCode, Value) {
    send(app, Method::POST, "/bookings", Some(booking(room_id, check_in, check_out))).await
}

// ── Admission over HTTP ──────────────────────────────────────

#[tokio::test]
async fn create_booking_returns_201_with_room_expanded() {
    let app = test_app();
    let room_id = create_room(&app, "101").await;

    let (status, body) = create_booking(&app, &room_id, "2030-01-01", "2030-01-03").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["roomId"], room_id.as_str());
    assert_eq!(body["room"]["number"], "101");
    assert_eq!(body["checkIn"], "2030-01-01T00:00:00Z");
    assert_eq!(body["checkOut"], "2030-01-03T00:00:00Z");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["nights"], 2);
    assert_eq!(body["totalPrice"], 24000);
}

#[tokio::test]
async fn overlapping_booking_is_rejected_with_400() {
    let app = test_app();
    let room_id = create_room(&app, "101").await;

    let (_, first) = create_booking(&app, &room_id, "2030-01-01", "2030-01-03").await;
    let (status, body) = create_booking(&app, &room_id, "2030-01-02T12:00:00Z", "2030-01-04").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "room already booked for this interval");
    assert_eq!(body["code"], "BOOKING_CONFLICT");
    assert_eq!(body["conflictingBookingId"], first["id"]);

    // Touching intervals are fine.
    let (status, _) = create_booking(&app, &room_id, "2030-01-03", "2030-01-04").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn unknown_room_is_404() {
    let app = test_app();
    let (status, body) = create_booking(&app, &Ulid::new().to_string(), "2030-01-01", "2030-01-02").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(&app, Method::GET, &format!("/bookings/{}", Ulid::new()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_input_is_400() {
    let app = test_app();
    let room_id = create_room(&app, "101").await;

    let (status, _) = create_booking(&app, &room_id, "2030-01-03", "2030-01-01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = create_booking(&app, &room_id, "soon", "2030-01-01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = send(&app, Method::GET, "/bookings/not-a-ulid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
    let (status, _) = send(&app, Method::POST, "/bookings", Some(json!({ "roomId": room_id }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn put_excludes_the_booking_being_updated() {
    let app = test_app();
    let room_id = create_room(&app, "101").await;
    let (_, a) = create_booking(&app, &room_id, "2030-01-01", "2030-01-03").await;
    let (_, b) = create_booking(&app, &room_id, "2030-01-05", "2030-01-07").await;

    let uri = format!("/bookings/{}", a["id"].as_str().unwrap());
    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "checkIn": "2030-01-02", "checkOut": "2030-01-04" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["checkIn"], "2030-01-02T00:00:00Z");

    let (status, body) = send(&app, Method::PUT, &uri, Some(json!({ "checkOut": "2030-01-06" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["conflictingBookingId"], b["id"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_double_booking_admits_exactly_one() {
    let app = test_app();
    let room_id = create_room(&app, "101").await;

    let first = app.clone().oneshot(request(
        Method::POST,
        "/bookings",
        Some(booking(&room_id, "2030-02-01", "2030-02-04")),
    ));
    let second = app.clone().oneshot(request(
        Method::POST,
        "/bookings",
        Some(booking(&room_id, "2030-02-02", "2030-02-05")),
    ));
    let (first, second) = tokio::join!(first, second);

    let mut statuses = [first.unwrap().status(), second.unwrap().status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::BAD_REQUEST]);

    let (_, overlaps) = send(&app, Method::GET, "/audit/overlaps", None).await;
    assert_eq!(overlaps, json!([]));
}

// ── Lifecycle ────────────────────────────────────────────────

#[tokio::test]
async fn stay_lifecycle_and_audit_log() {
    let app = test_app();
    let room_id = create_room(&app, "101").await;
    let (_, created) = create_booking(&app, &room_id, "2030-03-01", "2030-03-05").await;
    let base = format!("/bookings/{}", created["id"].as_str().unwrap());

    let (status, body) = send(&app, Method::POST, &format!("{base}/confirm"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{base}/check-in"),
        Some(json!({ "at": "2030-03-01T15:00:00Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkedInAt"], "2030-03-01T15:00:00Z");

    // Leaving two nights early frees them.
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{base}/check-out"),
        Some(json!({ "at": "2030-03-03T00:00:00Z", "note": "family emergency" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["checkOut"], "2030-03-03T00:00:00Z");
    assert_eq!(body["totalPrice"], 24000);

    let (status, _) = create_booking(&app, &room_id, "2030-03-03", "2030-03-05").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, Method::POST, &format!("{base}/cancel"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (status, log) = send(&app, Method::GET, &format!("{base}/logs"), None).await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = log
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["created", "confirmed", "checked_in", "checked_out"]);
    assert_eq!(log[3]["actor"], "front-desk");
    assert_eq!(log[3]["note"], "family emergency");
    assert_eq!(log[3]["from"], "confirmed");
    assert_eq!(log[3]["to"], "completed");
}

#[tokio::test]
async fn extend_and_cancel() {
    let app = test_app();
    let room_id = create_room(&app, "101").await;
    let (_, a) = create_booking(&app, &room_id, "2030-04-01", "2030-04-03").await;
    let (_, b) = create_booking(&app, &room_id, "2030-04-04", "2030-04-06").await;
    let a_uri = format!("/bookings/{}", a["id"].as_str().unwrap());

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{a_uri}/extend"),
        Some(json!({ "checkOut": "2030-04-05" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["conflictingBookingId"], b["id"]);

    let b_uri = format!("/bookings/{}", b["id"].as_str().unwrap());
    let (status, body) = send(&app, Method::POST, &format!("{b_uri}/cancel"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{a_uri}/extend"),
        Some(json!({ "checkOut": "2030-04-05" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nights"], 4);
}

// ── Queries ──────────────────────────────────────────────────

#[tokio::test]
async fn check_endpoint_writes_nothing() {
    let app = test_app();
    let room_id = create_room(&app, "101").await;
    let (_, a) = create_booking(&app, &room_id, "2030-05-01", "2030-05-03").await;

    let candidate = json!({ "roomId": room_id, "checkIn": "2030-05-02", "checkOut": "2030-05-04" });
    let (status, body) = send(&app, Method::POST, "/bookings/check", Some(candidate)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["conflict"]["id"], a["id"]);

    let candidate = json!({
        "roomId": room_id,
        "checkIn": "2030-05-02",
        "checkOut": "2030-05-04",
        "excludeBookingId": a["id"]
    });
    let (_, body) = send(&app, Method::POST, "/bookings/check", Some(candidate)).await;
    assert_eq!(body["conflict"], Value::Null);

    let (_, list) = send(&app, Method::GET, "/bookings", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn availability_and_listing() {
    let app = test_app();
    let r1 = create_room(&app, "101").await;
    let r2 = create_room(&app, "102").await;
    create_booking(&app, &r1, "2030-06-02", "2030-06-04").await;

    let (status, rooms) = send(
        &app,
        Method::GET,
        "/rooms/available?checkIn=2030-06-03&checkOut=2030-06-05&partySize=2",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = rooms.as_array().unwrap().iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![r2.as_str()]);

    let (status, free) = send(
        &app,
        Method::GET,
        &format!("/rooms/{r1}/availability?from=2030-06-01&to=2030-06-07"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        free,
        json!([
            { "from": "2030-06-01T00:00:00Z", "to": "2030-06-02T00:00:00Z" },
            { "from": "2030-06-04T00:00:00Z", "to": "2030-06-07T00:00:00Z" }
        ])
    );

    let (_, list) = send(&app, Method::GET, &format!("/bookings?roomId={r2}"), None).await;
    assert_eq!(list, json!([]));
    let (_, list) = send(&app, Method::GET, "/bookings?status=pending&guest=jackson", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (status, _) = send(&app, Method::GET, "/bookings?from=2030-06-01", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Rooms ────────────────────────────────────────────────────

#[tokio::test]
async fn room_crud() {
    let app = test_app();
    let id = create_room(&app, "101").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/rooms",
        Some(json!({ "number": "101", "capacity": 1, "ratePerNight": 5000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/rooms/{id}"),
        Some(json!({ "ratePerNight": 15000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ratePerNight"], 15000);

    let (_, booked) = create_booking(&app, &id, "2030-07-01", "2030-07-02").await;
    let (status, _) = send(&app, Method::DELETE, &format!("/rooms/{id}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let cancel = format!("/bookings/{}/cancel", booked["id"].as_str().unwrap());
    send(&app, Method::POST, &cancel, None).await;
    let (status, _) = send(&app, Method::DELETE, &format!("/rooms/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &format!("/rooms/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, rooms) = send(&app, Method::GET, "/rooms", None).await;
    assert_eq!(rooms, json!([]));

    // The cancelled booking still resolves, with its deleted room.
    let (status, body) = send(&app, Method::GET, &format!("/bookings/{}", booked["id"].as_str().unwrap()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["room"]["deletedAt"].is_string());
}

// ── Plumbing ─────────────────────────────────────────────────

#[tokio::test]
async fn health_and_request_id() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "abc-123");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["rooms"], 0);
}
