use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::router::scheduling_routes;
use shared_utils::test_utils::{JwtTestUtils, MockClinicResponses, TestConfig, TestUser};

async fn test_app(mock_server: &MockServer) -> (Router, TestConfig) {
    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..TestConfig::default()
    };
    let app = scheduling_routes(Arc::new(config.to_app_config()));
    (app, config)
}

async fn calendar_for(app: Router, token: &str) -> Vec<Value> {
    let response = app
        .oneshot(
            Request::builder()
                .uri("/calendar")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn mount_rows(rows: Value) -> Mock {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
}

#[tokio::test]
async fn patient_sees_own_detail_and_redacted_foreign_slots() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("hasta@example.com");

    let mine = MockClinicResponses::appointment_response(
        Some(&patient.id),
        "Dolgu",
        "2025-03-10T10:00:00Z",
        "2025-03-10T10:45:00Z",
    );
    let mut foreign = MockClinicResponses::appointment_response(
        Some(&Uuid::new_v4().to_string()),
        "Kanal Tedavisi",
        "2025-03-10T11:00:00Z",
        "2025-03-10T12:00:00Z",
    );
    foreign["guest_name"] = json!("Mehmet Demir");
    foreign["guest_phone"] = json!("05559998877");

    mount_rows(json!([mine, foreign])).mount(&mock_server).await;

    let (app, config) = test_app(&mock_server).await;
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let events = calendar_for(app, &token).await;
    assert_eq!(events.len(), 2);

    // Own appointment: full detail, titled by procedure.
    assert_eq!(events[0]["title"], json!("Dolgu"));
    assert_eq!(events[0]["is_mine"], json!(true));
    assert_eq!(events[0]["procedure"], json!("Dolgu"));

    // Foreign appointment: busy placeholder, detail fields absent.
    assert_eq!(events[1]["title"], json!("DOLU"));
    assert_eq!(events[1]["is_mine"], json!(false));
    assert!(events[1].get("procedure").is_none());
    assert!(events[1].get("guest_name").is_none());
    assert!(events[1].get("guest_phone").is_none());
    assert!(events[1].get("notes").is_none());
}

#[tokio::test]
async fn staff_sees_contact_detail_on_every_slot() {
    let mock_server = MockServer::start().await;

    let mut row = MockClinicResponses::appointment_response(
        Some(&Uuid::new_v4().to_string()),
        "İmplant",
        "2025-03-10T13:00:00Z",
        "2025-03-10T14:30:00Z",
    );
    row["guest_name"] = json!("Mehmet Demir");
    row["guest_phone"] = json!("05559998877");

    mount_rows(json!([row])).mount(&mock_server).await;

    let (app, config) = test_app(&mock_server).await;
    let staff = TestUser::staff("hekim@klinik.com");
    let token = JwtTestUtils::create_test_token(&staff, &config.jwt_secret, None);

    let events = calendar_for(app, &token).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["title"], json!("Mehmet Demir"));
    assert_eq!(events[0]["procedure"], json!("İmplant"));
    assert_eq!(events[0]["guest_phone"], json!("05559998877"));
}
