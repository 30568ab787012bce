use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use patient_cell::router::patient_routes;
use shared_utils::test_utils::{JwtTestUtils, MockClinicResponses, TestConfig, TestUser};

async fn test_app(mock_server: &MockServer) -> (Router, TestConfig) {
    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..TestConfig::default()
    };
    let app = patient_routes(Arc::new(config.to_app_config()));
    (app, config)
}

#[tokio::test]
async fn staff_can_read_any_patient() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicResponses::patient_response(&patient_id.to_string(), "05551112233", "Ayşe Yılmaz")
        ])))
        .mount(&mock_server)
        .await;

    let (app, config) = test_app(&mock_server).await;
    let staff = TestUser::staff("hekim@klinik.com");
    let token = JwtTestUtils::create_test_token(&staff, &config.jwt_secret, None);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}", patient_id))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn patient_cannot_read_foreign_record() {
    let mock_server = MockServer::start().await;
    let (app, config) = test_app(&mock_server).await;

    let patient = TestUser::patient("hasta@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}", Uuid::new_v4()))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let mock_server = MockServer::start().await;
    let (app, _config) = test_app(&mock_server).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
