use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use backend_client::{BackendConfig, HttpBackend, StaticToken};
use chrono::{NaiveDate, TimeZone, Utc};
use domain::config::WorkflowConfig;
use domain::enrollment::{Attachment, EnrollmentPayload, IMAGE_CONTENT_TYPE};
use domain::orders::{
    Assignment, OrderItem, OrderResource, OrderStatus, OrderWorkflow, ServiceRequest,
};
use domain::ports::{DateRange, EnrollmentGateway, GatewayError, OrderGateway, ReservationGateway};
use serde_json::{json, Value};
use ulid::Ulid;

#[derive(Debug)]
struct Field {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct Recorded {
    orders: Vec<OrderResource>,
    next_id: usize,
    request_ids: Vec<String>,
    tokens: Vec<Option<String>>,
    reservations: Vec<Value>,
    enrollments: Vec<(String, Vec<Field>)>,
    assignments: Vec<Value>,
}

type Shared = Arc<Mutex<Recorded>>;

fn note(mock: &mut Recorded, headers: &HeaderMap) {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    mock.request_ids.push(header("x-request-id").unwrap_or_default());
    mock.tokens.push(header(AUTHORIZATION.as_str()));
}

fn refuse(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "code": code, "message": message }))).into_response()
}

async fn create_reservation(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut mock = mock.lock().unwrap();
    note(&mut mock, &headers);
    mock.reservations.push(body);
    Json(json!({ "id": format!("res-{}", mock.reservations.len()) }))
}

async fn enroll(
    State(mock): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> StatusCode {
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.unwrap().to_vec();
        fields.push(Field { name, file_name, content_type, bytes });
    }
    let mut mock = mock.lock().unwrap();
    note(&mut mock, &headers);
    mock.enrollments.push((id, fields));
    StatusCode::CREATED
}

async fn list_orders(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Vec<OrderResource>> {
    let mut mock = mock.lock().unwrap();
    note(&mut mock, &headers);
    let booking_id = query.get("booking_id").cloned();
    Json(mock.orders.iter().filter(|o| o.booking_id == booking_id).cloned().collect())
}

async fn create_order(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut mock = mock.lock().unwrap();
    note(&mut mock, &headers);
    mock.next_id += 1;
    let order = OrderResource {
        id: format!("ord-{}", mock.next_id),
        booking_id: body["booking_id"].as_str().map(str::to_string),
        status: OrderStatus::Pending,
        items: Vec::new(),
    };
    let id = order.id.clone();
    mock.orders.push(order);
    (StatusCode::CREATED, Json(json!({ "id": id })))
}

async fn get_order(
    State(mock): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut mock = mock.lock().unwrap();
    note(&mut mock, &headers);
    if id == "ord-legacy" {
        return Json(json!({ "id": id, "status": "open", "items": [] })).into_response();
    }
    match mock.orders.iter().find(|o| o.id == id) {
        Some(order) => Json(order.clone()).into_response(),
        None => refuse(StatusCode::NOT_FOUND, "NOT_FOUND", "order does not exist"),
    }
}

async fn add_item(
    State(mock): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(item): Json<ServiceRequest>,
) -> Response {
    let mut mock = mock.lock().unwrap();
    note(&mut mock, &headers);
    if item.quantity > 99 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }
    let Some(order) = mock.orders.iter_mut().find(|o| o.id == id) else {
        return refuse(StatusCode::NOT_FOUND, "NOT_FOUND", "order does not exist");
    };
    if !order.status.is_modifiable() {
        return refuse(StatusCode::CONFLICT, "ORDER_NOT_MODIFIABLE", "Order cannot be modified");
    }
    order.items.push(OrderItem { service_id: item.service_id, quantity: item.quantity });
    StatusCode::CREATED.into_response()
}

async fn assign(
    State(mock): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut mock = mock.lock().unwrap();
    note(&mut mock, &headers);
    match mock.orders.iter().find(|o| o.id == id) {
        None => refuse(StatusCode::NOT_FOUND, "NOT_FOUND", "order does not exist"),
        Some(order) if order.items.is_empty() => {
            refuse(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION", "Item not found on order")
        }
        Some(_) => {
            mock.assignments.push(body);
            StatusCode::OK.into_response()
        }
    }
}

async fn spawn(mock: Shared) -> String {
    let app = Router::new()
        .route("/reservations", post(create_reservation))
        .route("/reservations/:id/enrollment", post(enroll))
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/items", post(add_item))
        .route("/orders/:id/assignment", post(assign))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", addr)
}

async fn backend(token: Option<&str>) -> (HttpBackend, Shared) {
    let mock = Shared::default();
    let url = spawn(mock.clone()).await;
    let backend = HttpBackend::new(
        &BackendConfig::new(url),
        Arc::new(StaticToken(token.map(str::to_string))),
    )
    .unwrap();
    (backend, mock)
}

fn seed(mock: &Shared, id: &str, booking_id: &str, status: OrderStatus) {
    mock.lock().unwrap().orders.push(OrderResource {
        id: id.to_string(),
        booking_id: Some(booking_id.to_string()),
        status,
        items: Vec::new(),
    });
}

fn attachment(slot_id: &str, file_name: &str, byte: u8) -> Attachment {
    Attachment {
        slot_id: slot_id.to_string(),
        file_name: file_name.to_string(),
        content_type: IMAGE_CONTENT_TYPE.to_string(),
        bytes: vec![byte; 8],
    }
}

fn assignment() -> Assignment {
    Assignment::new("staff-7".into(), Utc.with_ymd_and_hms(2026, 5, 4, 15, 0, 0).unwrap(), None)
}

#[tokio::test]
async fn reservation_carries_auth_and_request_id() {
    let (backend, mock) = backend(Some("secret")).await;
    let dates = DateRange::new(
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 6, 3).unwrap(),
    );

    let id = backend.create_reservation("room-12", &dates).await.unwrap();

    assert_eq!(id, "res-1");
    let mock = mock.lock().unwrap();
    assert_eq!(
        mock.reservations[0],
        json!({ "room_id": "room-12", "check_in": "2026-06-01", "check_out": "2026-06-03" })
    );
    assert_eq!(mock.tokens[0].as_deref(), Some("Bearer secret"));
    assert!(Ulid::from_string(&mock.request_ids[0]).is_ok());
}

#[tokio::test]
async fn enrollment_is_a_single_multipart_upload() {
    let (backend, mock) = backend(None).await;
    let payload = EnrollmentPayload {
        reservation_id: "res-4".to_string(),
        biometric: vec![
            attachment("face-front", "face-front.jpg", 1),
            attachment("face-front", "face-front-pad1.jpg", 1),
            attachment("face-front", "face-front-pad2.jpg", 1),
        ],
        documents: vec![attachment("id-card", "id-card.jpg", 9)],
    };

    backend.submit_enrollment(&payload).await.unwrap();

    let mock = mock.lock().unwrap();
    assert_eq!(mock.enrollments.len(), 1);
    assert_eq!(mock.tokens[0], None);
    let (id, fields) = &mock.enrollments[0];
    assert_eq!(id, "res-4");
    assert_eq!(fields[0].name, "reservation_id");
    assert_eq!(fields[0].bytes, b"res-4");
    let biometric: Vec<&Field> = fields.iter().filter(|f| f.name == "biometric").collect();
    assert_eq!(biometric.len(), 3);
    assert_eq!(biometric[2].file_name.as_deref(), Some("face-front-pad2.jpg"));
    assert!(biometric.iter().all(|f| f.content_type.as_deref() == Some("image/jpeg")));
    let documents: Vec<&Field> = fields.iter().filter(|f| f.name == "document").collect();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].bytes, vec![9u8; 8]);
}

#[tokio::test]
async fn order_endpoints_round_trip() {
    let (backend, mock) = backend(Some("secret")).await;

    let id = backend.create_resource("bk-1").await.unwrap();
    assert_eq!(id, "ord-1");

    let listed = backend.list_resources("bk-1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, OrderStatus::Pending);
    assert!(backend.list_resources("bk-2").await.unwrap().is_empty());

    backend.add_item(&id, &ServiceRequest::new("spa".into(), 1)).await.unwrap();
    let fresh = backend.get_resource(&id).await.unwrap();
    assert!(fresh.contains_service("spa"));

    backend.assign_handler(&id, &assignment()).await.unwrap();
    let mock = mock.lock().unwrap();
    assert_eq!(mock.assignments[0]["handler_id"], "staff-7");
    assert_eq!(mock.assignments[0]["note"], Value::Null);
    let unique: std::collections::HashSet<&String> = mock.request_ids.iter().collect();
    assert_eq!(unique.len(), mock.request_ids.len());
}

#[tokio::test]
async fn error_responses_are_classified() {
    let (backend, mock) = backend(None).await;
    seed(&mock, "ord-locked", "bk-1", OrderStatus::Confirmed);
    seed(&mock, "ord-empty", "bk-1", OrderStatus::Pending);

    let err = backend.get_resource("ord-missing").await.unwrap_err();
    assert_eq!(err, GatewayError::NotFound { entity: "ord-missing".to_string() });

    let err = backend
        .add_item("ord-locked", &ServiceRequest::new("spa".into(), 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::NotModifiable { ref resource_id, .. } if resource_id == "ord-locked"
    ));

    let err = backend.assign_handler("ord-empty", &assignment()).await.unwrap_err();
    assert!(matches!(err, GatewayError::ItemNotFound { .. }));

    let err = backend
        .add_item("ord-empty", &ServiceRequest::new("spa".into(), 500))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GatewayError::Rejected { status: 500, message: "database unavailable".to_string() }
    );
}

#[tokio::test]
async fn legacy_status_spelling_is_understood() {
    let (backend, _mock) = backend(None).await;

    let resource = backend.get_resource("ord-legacy").await.unwrap();

    assert_eq!(resource.status, OrderStatus::Pending);
    assert!(resource.booking_id.is_none());
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let config = BackendConfig::new(format!("http://{}", addr));
    let backend = HttpBackend::from_config(&config).unwrap();

    let err = backend.create_resource("bk-1").await.unwrap_err();

    assert!(matches!(err, GatewayError::Transport(_)));
}

#[tokio::test]
async fn workflow_runs_over_http() {
    let (backend, mock) = backend(Some("secret")).await;
    seed(&mock, "ord-old", "bk-9", OrderStatus::Completed);
    let config =
        WorkflowConfig { consistency_delay: Duration::from_millis(10), require_enrollment: false };
    let workflow = OrderWorkflow::new(Arc::new(backend), config, "bk-9");

    let outcome = workflow
        .run(&ServiceRequest::new("laundry".into(), 2), &assignment())
        .await
        .unwrap();

    assert_eq!(outcome.resource_id, "ord-1");
    let mock = mock.lock().unwrap();
    let order = mock.orders.iter().find(|o| o.id == "ord-1").unwrap();
    assert_eq!(order.items, vec![OrderItem { service_id: "laundry".into(), quantity: 2 }]);
    assert_eq!(mock.assignments.len(), 1);
    assert!(mock.tokens.iter().all(|t| t.as_deref() == Some("Bearer secret")));
}
