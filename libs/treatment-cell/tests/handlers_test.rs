use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_utils::test_utils::{JwtTestUtils, MockClinicResponses, TestConfig, TestUser};
use treatment_cell::router::treatment_routes;

async fn test_app(mock_server: &MockServer) -> (Router, TestConfig) {
    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..TestConfig::default()
    };
    let app = treatment_routes(Arc::new(config.to_app_config()));
    (app, config)
}

#[tokio::test]
async fn staff_records_a_treatment() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/treatments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockClinicResponses::treatment_response(&patient_id.to_string(), "Dolgu", 1500.0)
        ])))
        .mount(&mock_server)
        .await;

    let (app, config) = test_app(&mock_server).await;
    let staff = TestUser::staff("hekim@klinik.com");
    let token = JwtTestUtils::create_test_token(&staff, &config.jwt_secret, None);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/treatments", patient_id))
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "procedure_name": "Dolgu",
                        "tooth_number": "16",
                        "cost": 1500.0,
                        "payment_received": 500.0
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    // Amounts default to zero when omitted; both were supplied here.
    let requests = mock_server.received_requests().await.unwrap();
    let insert = requests
        .iter()
        .find(|req| req.method.as_str() == "POST" && req.url.path() == "/rest/v1/treatments")
        .unwrap()
        .body_json::<Value>()
        .unwrap();
    assert_eq!(insert["cost"], json!(1500.0));
    assert_eq!(insert["payment_received"], json!(500.0));
}

#[tokio::test]
async fn patient_cannot_record_treatments() {
    let mock_server = MockServer::start().await;
    let (app, config) = test_app(&mock_server).await;

    let patient = TestUser::patient("hasta@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/treatments", Uuid::new_v4()))
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({"procedure_name": "Dolgu"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn negative_cost_is_rejected() {
    let mock_server = MockServer::start().await;
    let (app, config) = test_app(&mock_server).await;

    let staff = TestUser::staff("hekim@klinik.com");
    let token = JwtTestUtils::create_test_token(&staff, &config.jwt_secret, None);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/treatments", Uuid::new_v4()))
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"procedure_name": "Dolgu", "cost": -1.0}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patient_reads_their_own_history() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("hasta@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicResponses::treatment_response(&patient.id, "Kanal Tedavisi", 3000.0)
        ])))
        .mount(&mock_server)
        .await;

    let (app, config) = test_app(&mock_server).await;
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/{}/treatments", patient.id))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A different patient's history stays closed.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}/treatments", Uuid::new_v4()))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
