use super::*;
use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode as HttpStatus},
    routing::{get, post},
    Json, Router,
};
use chrono::DateTime;
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

use shared::{
    domain::{DesignationId, DesignationStatus, EmployeeId, PromotionId, Role},
    protocol::{EmployeeRef, LetterRef},
};

fn admin_session() -> AuthSession {
    AuthSession::new("test-token", Role::Admin)
}

fn sample_employee(id: &str, designation: &str) -> Employee {
    Employee {
        id: EmployeeId::new(id),
        first_name: "Asha".to_string(),
        last_name: "Rao".to_string(),
        email: "asha.rao@example.com".to_string(),
        department: "Engineering".to_string(),
        designation: designation.to_string(),
        profile_image: None,
    }
}

fn sample_designation(id: &str, name: &str, status: DesignationStatus) -> Designation {
    Designation {
        id: DesignationId::new(id),
        name: name.to_string(),
        status,
    }
}

fn sample_record(id: &str, employee_id: &str, letter: Option<&str>) -> PromotionRecord {
    PromotionRecord {
        id: PromotionId::new(id),
        employee: EmployeeRef {
            id: EmployeeId::new(employee_id),
        },
        from_designation: "Engineer".to_string(),
        to_designation: "Senior Engineer".to_string(),
        effective_date: "2026-01-15T00:00:00Z".parse().expect("timestamp"),
        reason: "Annual review".to_string(),
        remarks: String::new(),
        promotion_letter: letter.map(|original_name| LetterRef {
            original_name: original_name.to_string(),
        }),
    }
}

async fn spawn_app(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

/// Bound then dropped immediately, so connections are refused and any
/// issued request surfaces as a transport failure.
async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

#[derive(Clone)]
struct HeaderCapture {
    tx: Arc<Mutex<Option<oneshot::Sender<Option<String>>>>>,
}

async fn handle_list_employees(
    State(state): State<HeaderCapture>,
    headers: HeaderMap,
) -> Json<Vec<Employee>> {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send(auth);
    }
    Json(vec![sample_employee("e1", "Engineer")])
}

#[tokio::test]
async fn list_employees_sends_bearer_token() {
    let (tx, rx) = oneshot::channel();
    let state = HeaderCapture {
        tx: Arc::new(Mutex::new(Some(tx))),
    };
    let app = Router::new()
        .route("/api/employees", get(handle_list_employees))
        .with_state(state);
    let server_url = spawn_app(app).await;

    let client = HrClient::new(server_url, admin_session());
    let employees = client.list_employees().await.expect("list employees");

    assert_eq!(employees.len(), 1);
    assert_eq!(employees[0].id, EmployeeId::new("e1"));
    let auth = rx.await.expect("captured header");
    assert_eq!(auth.as_deref(), Some("Bearer test-token"));
}

#[tokio::test]
async fn list_active_designations_filters_inactive() {
    let app = Router::new().route(
        "/api/designations",
        get(|| async {
            Json(DataEnvelope {
                data: vec![
                    sample_designation("d1", "Senior Engineer", DesignationStatus::Active),
                    sample_designation("d2", "Intern", DesignationStatus::Inactive),
                    sample_designation("d3", "Staff Engineer", DesignationStatus::Active),
                ],
            })
        }),
    );
    let server_url = spawn_app(app).await;

    let client = HrClient::new(server_url, admin_session());
    let designations = client
        .list_active_designations()
        .await
        .expect("list designations");

    let names: Vec<&str> = designations
        .iter()
        .map(|designation| designation.name.as_str())
        .collect();
    assert_eq!(names, ["Senior Engineer", "Staff Engineer"]);
}

#[tokio::test]
async fn list_promotions_unwraps_data_envelope() {
    let app = Router::new().route(
        "/api/promotions",
        get(|| async {
            Json(DataEnvelope {
                data: vec![sample_record("p1", "e1", Some("letter.pdf"))],
            })
        }),
    );
    let server_url = spawn_app(app).await;

    let client = HrClient::new(server_url, admin_session());
    let promotions = client.list_promotions().await.expect("list promotions");

    assert_eq!(promotions.len(), 1);
    assert_eq!(promotions[0].employee.id, EmployeeId::new("e1"));
    assert!(promotions[0].has_letter());
}

#[derive(Debug)]
struct CapturedSubmission {
    fields: HashMap<String, String>,
    letter: Option<(String, usize)>,
}

#[derive(Clone)]
struct SubmitCapture {
    tx: Arc<Mutex<Option<oneshot::Sender<CapturedSubmission>>>>,
}

async fn handle_submit(
    State(state): State<SubmitCapture>,
    mut multipart: Multipart,
) -> Json<PromotionRecord> {
    let mut fields = HashMap::new();
    let mut letter = None;
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        if name == "promotionLetter" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.expect("letter bytes");
            letter = Some((filename, bytes.len()));
        } else {
            fields.insert(name, field.text().await.expect("text field"));
        }
    }

    let record = PromotionRecord {
        id: PromotionId::new("p-created"),
        employee: EmployeeRef {
            id: EmployeeId::new(fields.get("employeeId").cloned().unwrap_or_default()),
        },
        from_designation: fields.get("fromDesignation").cloned().unwrap_or_default(),
        to_designation: fields.get("toDesignation").cloned().unwrap_or_default(),
        effective_date: fields
            .get("effectiveDate")
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
            .expect("effectiveDate parses"),
        reason: fields.get("reason").cloned().unwrap_or_default(),
        remarks: fields.get("remarks").cloned().unwrap_or_default(),
        promotion_letter: letter
            .as_ref()
            .map(|(filename, _)| LetterRef {
                original_name: filename.clone(),
            }),
    };

    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send(CapturedSubmission { fields, letter });
    }
    Json(record)
}

fn submission_without_letter() -> PromotionSubmission {
    PromotionSubmission {
        employee_id: EmployeeId::new("e1"),
        from_designation: "Engineer".to_string(),
        to_designation: "Senior Engineer".to_string(),
        effective_date: "2026-02-01T09:00:00Z".parse().expect("timestamp"),
        reason: "Annual review".to_string(),
        remarks: "Strong delivery record".to_string(),
        letter: None,
    }
}

async fn spawn_submit_server() -> (String, oneshot::Receiver<CapturedSubmission>) {
    let (tx, rx) = oneshot::channel();
    let state = SubmitCapture {
        tx: Arc::new(Mutex::new(Some(tx))),
    };
    let app = Router::new()
        .route("/api/promotions", post(handle_submit))
        .with_state(state);
    (spawn_app(app).await, rx)
}

#[tokio::test]
async fn submit_promotion_posts_expected_multipart_fields() {
    let (server_url, captured_rx) = spawn_submit_server().await;

    let client = HrClient::new(server_url, admin_session());
    let record = client
        .submit_promotion(submission_without_letter())
        .await
        .expect("submit");

    assert_eq!(record.id, PromotionId::new("p-created"));
    assert_eq!(record.from_designation, "Engineer");

    let captured = captured_rx.await.expect("captured submission");
    assert_eq!(captured.fields.get("employeeId").map(String::as_str), Some("e1"));
    assert_eq!(
        captured.fields.get("fromDesignation").map(String::as_str),
        Some("Engineer")
    );
    assert_eq!(
        captured.fields.get("toDesignation").map(String::as_str),
        Some("Senior Engineer")
    );
    assert_eq!(
        captured.fields.get("reason").map(String::as_str),
        Some("Annual review")
    );
    let effective_date = captured.fields.get("effectiveDate").expect("effectiveDate");
    assert!(DateTime::parse_from_rfc3339(effective_date).is_ok());
    assert!(captured.letter.is_none(), "no promotionLetter part expected");
}

#[tokio::test]
async fn submit_promotion_includes_letter_part_when_attached() {
    let (server_url, captured_rx) = spawn_submit_server().await;

    let mut submission = submission_without_letter();
    submission.letter = Some(LetterUpload {
        filename: "signed-letter.pdf".to_string(),
        mime_type: Some("application/pdf".to_string()),
        bytes: b"%PDF-1.4 promotion letter".to_vec(),
    });

    let client = HrClient::new(server_url, admin_session());
    let record = client.submit_promotion(submission).await.expect("submit");

    assert_eq!(
        record
            .promotion_letter
            .as_ref()
            .map(|letter| letter.original_name.as_str()),
        Some("signed-letter.pdf")
    );

    let captured = captured_rx.await.expect("captured submission");
    let (filename, size) = captured.letter.expect("promotionLetter part");
    assert_eq!(filename, "signed-letter.pdf");
    assert_eq!(size, b"%PDF-1.4 promotion letter".len());
}

#[tokio::test]
async fn submit_promotion_surfaces_backend_validation_message() {
    let app = Router::new().route(
        "/api/promotions",
        post(|| async {
            (
                HttpStatus::BAD_REQUEST,
                Json(serde_json::json!({ "message": "Designation not found" })),
            )
        }),
    );
    let server_url = spawn_app(app).await;

    let client = HrClient::new(server_url, admin_session());
    let err = client
        .submit_promotion(submission_without_letter())
        .await
        .expect_err("must fail");

    match err {
        ClientError::Validation(message) => assert_eq!(message, "Designation not found"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn download_letter_without_attachment_fails_before_any_request() {
    // Unreachable backend: a NotFound (rather than Network) proves the
    // local check fired and no request was issued.
    let client = HrClient::new(unreachable_url().await, admin_session());
    let record = sample_record("p1", "e1", None);

    let err = client
        .download_letter(&record)
        .await
        .expect_err("must fail");
    assert!(err.is_not_found(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn download_letter_returns_bytes_and_original_filename() {
    let app = Router::new().route(
        "/api/promotions/p1/download-letter",
        get(|| async { b"%PDF-1.4 stored letter".to_vec() }),
    );
    let server_url = spawn_app(app).await;

    let client = HrClient::new(server_url, admin_session());
    let record = sample_record("p1", "e1", Some("offer-letter.pdf"));
    let download = client.download_letter(&record).await.expect("download");

    assert_eq!(download.filename, "offer-letter.pdf");
    assert_eq!(download.bytes, b"%PDF-1.4 stored letter");
}

#[tokio::test]
async fn download_letter_maps_backend_404_to_not_found() {
    let app = Router::new().route(
        "/api/promotions/p1/download-letter",
        get(|| async {
            (
                HttpStatus::NOT_FOUND,
                Json(serde_json::json!({ "message": "Letter blob missing" })),
            )
        }),
    );
    let server_url = spawn_app(app).await;

    let client = HrClient::new(server_url, admin_session());
    let record = sample_record("p1", "e1", Some("offer-letter.pdf"));
    let err = client
        .download_letter(&record)
        .await
        .expect_err("must fail");

    match err {
        ClientError::NotFound(message) => assert_eq!(message, "Letter blob missing"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn employee_role_is_refused_before_any_request() {
    let client = HrClient::new(
        unreachable_url().await,
        AuthSession::new("test-token", Role::Employee),
    );

    let err = client.list_employees().await.expect_err("must fail");
    assert!(
        matches!(err, ClientError::Permission(_)),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn transport_failure_maps_to_network_error() {
    let client = HrClient::new(unreachable_url().await, admin_session());

    let err = client.list_employees().await.expect_err("must fail");
    assert!(
        matches!(err, ClientError::Network(_)),
        "unexpected error: {err:?}"
    );
}
