use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use slotbook::api::{create_router, AppState};
use slotbook::engine::Engine;
use slotbook::notify::NotifyHub;
use slotbook::store::EntityStore;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server(name: &str) -> (SocketAddr, reqwest::Client) {
    let dir = std::env::temp_dir()
        .join("slotbook_int_test")
        .join(format!("{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let store = Arc::new(EntityStore::open(&dir).unwrap());
    let engine = Arc::new(Engine::new(store, Arc::new(NotifyHub::new())));
    let app = create_router(AppState { engine });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, reqwest::Client::new())
}

async fn create_user(
    client: &reqwest::Client,
    addr: SocketAddr,
    email: &str,
    role: &str,
) -> String {
    let resp = client
        .post(format!("http://{addr}/users"))
        .json(&json!({
            "displayName": "Someone",
            "email": email,
            "role": role,
            "timezone": "UTC",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

/// Tutor at 60.00/h with a Monday 09:00–11:00 UTC block.
async fn seed_tutor(client: &reqwest::Client, addr: SocketAddr, email: &str) -> String {
    let id = create_user(client, addr, email, "TUTOR").await;

    let resp = client
        .put(format!("http://{addr}/tutors/{id}/profile"))
        .header("x-actor-id", &id)
        .header("x-actor-role", "TUTOR")
        .json(&json!({
            "hourlyRateCents": 6000,
            "currency": "USD",
            "subjects": ["algebra"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .put(format!("http://{addr}/tutors/{id}/availability"))
        .header("x-actor-id", &id)
        .header("x-actor-role", "TUTOR")
        .json(&json!({
            "blocks": [
                { "dayOfWeek": 1, "startTimeUTC": "09:00", "endTimeUTC": "11:00", "isRecurring": true },
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    id
}

fn booking_body(tutor_id: &str, start: &str, end: &str, price_cents: i64) -> Value {
    json!({
        "tutorId": tutor_id,
        "subjectId": "algebra",
        "startAtUTC": start,
        "endAtUTC": end,
        "priceCents": price_cents,
        "currency": "USD",
    })
}

fn parse_utc(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn health_check() {
    let (addr, client) = start_test_server("health").await;
    let resp = client.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn full_booking_flow() {
    let (addr, client) = start_test_server("full_flow").await;
    let tutor = seed_tutor(&client, addr, "tutor@example.com").await;
    let student = create_user(&client, addr, "student@example.com", "STUDENT").await;

    // Two hourly slots on the next Monday.
    let resp = client
        .get(format!(
            "http://{addr}/tutors/{tutor}/availability/slots?date=2026-08-10&duration=60"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let slots: Vec<DateTime<Utc>> = body["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| parse_utc(s.as_str().unwrap()))
        .collect();
    assert_eq!(
        slots,
        vec![parse_utc("2026-08-10T09:00:00Z"), parse_utc("2026-08-10T10:00:00Z")]
    );

    // Pre-submission check passes for an offered slot.
    let resp = client
        .post(format!("http://{addr}/tutors/{tutor}/availability/check"))
        .json(&json!({ "startTime": "2026-08-10T10:00:00Z", "duration": 60 }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["isAvailable"], json!(true));
    assert!(body.get("reason").is_none());

    // Student books 10:00–11:00.
    let resp = client
        .post(format!("http://{addr}/bookings"))
        .header("x-actor-id", &student)
        .header("x-actor-role", "STUDENT")
        .json(&booking_body(&tutor, "2026-08-10T10:00:00Z", "2026-08-10T11:00:00Z", 6000))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["booking"]["status"], json!("PENDING"));
    assert_eq!(body["booking"]["priceCents"], json!(6000));
    assert_eq!(parse_utc(body["booking"]["startAtUTC"].as_str().unwrap()), parse_utc("2026-08-10T10:00:00Z"));

    // The pending booking now blocks an overlapping check.
    let resp = client
        .post(format!("http://{addr}/tutors/{tutor}/availability/check"))
        .json(&json!({ "startTime": "2026-08-10T10:30:00Z", "duration": 30 }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["isAvailable"], json!(false));
    assert!(
        body["reason"].as_str().unwrap().contains("overlaps existing pending session"),
        "{body}"
    );

    // And only one slot remains.
    let resp = client
        .get(format!(
            "http://{addr}/tutors/{tutor}/availability/slots?date=2026-08-10&duration=60"
        ))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["slots"].as_array().unwrap().len(), 1);

    // A second student going for the same window gets a 409 with a reason.
    let rival = create_user(&client, addr, "rival@example.com", "STUDENT").await;
    let resp = client
        .post(format!("http://{addr}/bookings"))
        .header("x-actor-id", &rival)
        .header("x-actor-role", "STUDENT")
        .json(&booking_body(&tutor, "2026-08-10T10:00:00Z", "2026-08-10T11:00:00Z", 6000))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(error_code(&body), "conflict");
    assert!(body["error"]["message"].as_str().unwrap().contains("overlaps"));

    // Tutor confirms.
    let resp = client
        .put(format!("http://{addr}/bookings/{booking_id}/status"))
        .header("x-actor-id", &tutor)
        .header("x-actor-role", "TUTOR")
        .json(&json!({ "status": "CONFIRMED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["booking"]["status"], json!("CONFIRMED"));

    // CONFIRMED → PENDING is not an edge: 409.
    let resp = client
        .put(format!("http://{addr}/bookings/{booking_id}/status"))
        .header("x-actor-id", &student)
        .header("x-actor-role", "STUDENT")
        .json(&json!({ "status": "PENDING" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Student cancels their confirmed booking: allowed.
    let resp = client
        .put(format!("http://{addr}/bookings/{booking_id}/status"))
        .header("x-actor-id", &student)
        .header("x-actor-role", "STUDENT")
        .json(&json!({ "status": "CANCELLED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["booking"]["status"], json!("CANCELLED"));

    // Cancellation frees the slot again.
    let resp = client
        .get(format!(
            "http://{addr}/tutors/{tutor}/availability/slots?date=2026-08-10&duration=60"
        ))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["slots"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn booking_requires_actor_headers() {
    let (addr, client) = start_test_server("auth_headers").await;
    let tutor = seed_tutor(&client, addr, "tutor@example.com").await;

    let resp = client
        .post(format!("http://{addr}/bookings"))
        .json(&booking_body(&tutor, "2026-08-10T09:00:00Z", "2026-08-10T10:00:00Z", 6000))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(error_code(&body), "unauthorized");
}

#[tokio::test]
async fn only_students_create_bookings() {
    let (addr, client) = start_test_server("only_students").await;
    let tutor = seed_tutor(&client, addr, "tutor@example.com").await;

    let resp = client
        .post(format!("http://{addr}/bookings"))
        .header("x-actor-id", &tutor)
        .header("x-actor-role", "TUTOR")
        .json(&booking_body(&tutor, "2026-08-10T09:00:00Z", "2026-08-10T10:00:00Z", 6000))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn unknown_tutor_is_404() {
    let (addr, client) = start_test_server("unknown_tutor").await;

    let resp = client
        .get(format!(
            "http://{addr}/tutors/user-99/availability/slots?date=2026-08-10&duration=60"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("http://{addr}/tutors/user-99/availability/check"))
        .json(&json!({ "startTime": "2026-08-10T09:00:00Z", "duration": 60 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Malformed id is the caller's mistake, not a lookup miss.
    let resp = client
        .get(format!(
            "http://{addr}/tutors/banana/availability/slots?date=2026-08-10&duration=60"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn validation_failures_are_400() {
    let (addr, client) = start_test_server("validation").await;
    let tutor = seed_tutor(&client, addr, "tutor@example.com").await;
    let student = create_user(&client, addr, "student@example.com", "STUDENT").await;

    // 45 minutes is not a sellable granularity.
    let resp = client
        .post(format!("http://{addr}/bookings"))
        .header("x-actor-id", &student)
        .header("x-actor-role", "STUDENT")
        .json(&booking_body(&tutor, "2026-08-10T09:00:00Z", "2026-08-10T09:45:00Z", 4500))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Stale price.
    let resp = client
        .post(format!("http://{addr}/bookings"))
        .header("x-actor-id", &student)
        .header("x-actor-role", "STUDENT")
        .json(&booking_body(&tutor, "2026-08-10T09:00:00Z", "2026-08-10T10:00:00Z", 5000))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]["message"].as_str().unwrap().contains("price mismatch"));

    // Overlapping same-day blocks are rejected before anything is written.
    let resp = client
        .put(format!("http://{addr}/tutors/{tutor}/availability"))
        .header("x-actor-id", &tutor)
        .header("x-actor-role", "TUTOR")
        .json(&json!({
            "blocks": [
                { "dayOfWeek": 1, "startTimeUTC": "09:00", "endTimeUTC": "12:00" },
                { "dayOfWeek": 1, "startTimeUTC": "11:00", "endTimeUTC": "14:00" },
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn status_updates_enforce_ownership_and_existence() {
    let (addr, client) = start_test_server("status_auth").await;
    let tutor = seed_tutor(&client, addr, "tutor@example.com").await;
    let student = create_user(&client, addr, "student@example.com", "STUDENT").await;
    let stranger = create_user(&client, addr, "stranger@example.com", "STUDENT").await;

    let resp = client
        .post(format!("http://{addr}/bookings"))
        .header("x-actor-id", &student)
        .header("x-actor-role", "STUDENT")
        .json(&booking_body(&tutor, "2026-08-10T09:00:00Z", "2026-08-10T10:00:00Z", 6000))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    // A stranger cannot cancel someone else's booking.
    let resp = client
        .put(format!("http://{addr}/bookings/{booking_id}/status"))
        .header("x-actor-id", &stranger)
        .header("x-actor-role", "STUDENT")
        .json(&json!({ "status": "CANCELLED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Unknown booking: 404.
    let resp = client
        .put(format!("http://{addr}/bookings/booking-999/status"))
        .header("x-actor-id", &student)
        .header("x-actor-role", "STUDENT")
        .json(&json!({ "status": "CANCELLED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Admins transition any booking and may attach a reason.
    let admin = create_user(&client, addr, "admin@example.com", "ADMIN").await;
    let resp = client
        .put(format!("http://{addr}/bookings/{booking_id}/status"))
        .header("x-actor-id", &admin)
        .header("x-actor-role", "ADMIN")
        .json(&json!({ "status": "CANCELLED", "reason": "tutor unavailable" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["booking"]["statusReason"], json!("tutor unavailable"));
}

#[tokio::test]
async fn concurrent_bookings_one_wins() {
    let (addr, client) = start_test_server("concurrent").await;
    let tutor = seed_tutor(&client, addr, "tutor@example.com").await;
    let a = create_user(&client, addr, "a@example.com", "STUDENT").await;
    let b = create_user(&client, addr, "b@example.com", "STUDENT").await;

    let mut requests = Vec::new();
    for student in [&a, &b] {
        let client = client.clone();
        let student = student.clone();
        let tutor = tutor.clone();
        requests.push(async move {
            client
                .post(format!("http://{addr}/bookings"))
                .header("x-actor-id", &student)
                .header("x-actor-role", "STUDENT")
                .json(&booking_body(&tutor, "2026-08-10T10:00:00Z", "2026-08-10T11:00:00Z", 6000))
                .send()
                .await
                .unwrap()
        });
    }
    let responses = futures::future::join_all(requests).await;

    let statuses: Vec<u16> = responses.iter().map(|r| r.status().as_u16()).collect();
    assert!(statuses.contains(&201), "{statuses:?}");
    assert!(statuses.contains(&409), "{statuses:?}");
}
