use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use patient_cell::services::directory::PatientDirectoryService;
use shared_utils::test_utils::{MockClinicResponses, TestConfig};

const PHONE: &str = "05551112233";

fn test_service(mock_server: &MockServer) -> PatientDirectoryService {
    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..TestConfig::default()
    };
    PatientDirectoryService::new(&config.to_app_config())
}

#[tokio::test]
async fn resolve_reuses_existing_patient() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("username", format!("eq.{}", PHONE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicResponses::patient_response(&patient_id, PHONE, "Ayşe Yılmaz")
        ])))
        .mount(&mock_server)
        .await;

    let directory = test_service(&mock_server);
    let resolved = directory
        .resolve_or_create(PHONE, "Ayşe Yılmaz", PHONE, "token")
        .await
        .unwrap();

    assert_eq!(resolved.to_string(), patient_id);
}

#[tokio::test]
async fn resolve_creates_patient_on_first_contact() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockClinicResponses::patient_response(&patient_id, PHONE, "Ayşe Yılmaz")
        ])))
        .mount(&mock_server)
        .await;

    let directory = test_service(&mock_server);
    let resolved = directory
        .resolve_or_create(PHONE, "Ayşe Yılmaz", PHONE, "token")
        .await
        .unwrap();

    assert_eq!(resolved.to_string(), patient_id);
}

// A concurrent booking for the same phone number wins the insert race: the
// unique-constraint violation must resolve to the winner's row, not an error.
#[tokio::test]
async fn resolve_reuses_row_after_unique_violation() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    // First lookup misses.
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("username", format!("eq.{}", PHONE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    // Insert loses the race.
    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"patients_username_key\""
        })))
        .mount(&mock_server)
        .await;

    // Retry lookup finds the winner's row.
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("username", format!("eq.{}", PHONE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicResponses::patient_response(&patient_id, PHONE, "Ayşe Yılmaz")
        ])))
        .mount(&mock_server)
        .await;

    let directory = test_service(&mock_server);
    let resolved = directory
        .resolve_or_create(PHONE, "Ayşe Yılmaz", PHONE, "token")
        .await
        .unwrap();

    assert_eq!(resolved.to_string(), patient_id);
}
