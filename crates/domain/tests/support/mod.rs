#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use domain::capture::analyzer::{BoundingBox, Detection, Landmark};
use domain::capture::{FaceDetector, Frame, FrameSource, Services};
use domain::clock::FixedClock;
use domain::enrollment::EnrollmentPayload;
use domain::orders::{Assignment, OrderItem, OrderResource, OrderStatus, ServiceRequest};
use domain::ports::{DateRange, EnrollmentGateway, GatewayError, OrderGateway, ReservationGateway};
use domain::DeviceFault;

pub fn fixed_services() -> Services {
    Services::new(Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap())))
}

pub fn image(byte: u8) -> Frame {
    Frame::new(4, 4, vec![byte; 16])
}

/// Replays face counts, repeating the last one forever.
pub struct ScriptedDetector {
    script: Vec<usize>,
    pub calls: Arc<AtomicUsize>,
    load_error: Option<DeviceFault>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<usize>) -> Self {
        Self { script, calls: Arc::new(AtomicUsize::new(0)), load_error: None }
    }

    pub fn steady_face() -> Self {
        Self::new(vec![1])
    }

    pub fn failing_load(fault: DeviceFault) -> Self {
        Self { load_error: Some(fault), ..Self::new(vec![1]) }
    }
}

#[async_trait]
impl FaceDetector for ScriptedDetector {
    async fn load(&mut self) -> Result<(), DeviceFault> {
        match &self.load_error {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    async fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DeviceFault> {
        let tick = self.calls.fetch_add(1, Ordering::SeqCst);
        let faces = self
            .script
            .get(tick)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(0);
        let detection = Detection {
            bounds: BoundingBox { x: 10.0, y: 10.0, width: 50.0, height: 60.0 },
            landmarks: vec![Landmark { x: 20.0, y: 25.0 }, Landmark { x: 40.0, y: 25.0 }],
        };
        Ok(vec![detection; faces])
    }
}

/// Yields frames whose bytes carry the frame number.
pub struct FakeCamera {
    pub frames: Arc<AtomicUsize>,
    pub opens: Arc<AtomicUsize>,
    open_error: Option<DeviceFault>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(AtomicUsize::new(0)),
            opens: Arc::new(AtomicUsize::new(0)),
            open_error: None,
        }
    }

    pub fn denied() -> Self {
        Self { open_error: Some(DeviceFault::PermissionDenied), ..Self::new() }
    }
}

#[async_trait]
impl FrameSource for FakeCamera {
    async fn open(&mut self) -> Result<(), DeviceFault> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match &self.open_error {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    async fn next_frame(&mut self) -> Result<Frame, DeviceFault> {
        let n = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(image((n % 251) as u8))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    List(String),
    Create(String),
    Get(String),
    Add(String),
    Assign(String),
}

#[derive(Default)]
struct BackendState {
    resources: Vec<OrderResource>,
    calls: Vec<Call>,
    created: usize,
    add_failures: VecDeque<GatewayError>,
    assign_failures: VecDeque<GatewayError>,
    dropped_adds: usize,
}

/// In-memory order backend that records every call.
#[derive(Default)]
pub struct FakeOrderBackend {
    state: Mutex<BackendState>,
    latency: Duration,
}

impl FakeOrderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency, ..Self::default() }
    }

    pub fn seed(&self, id: &str, booking_id: &str, status: OrderStatus) {
        self.state.lock().unwrap().resources.push(OrderResource {
            id: id.to_string(),
            booking_id: Some(booking_id.to_string()),
            status,
            items: Vec::new(),
        });
    }

    pub fn set_status(&self, id: &str, status: OrderStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(resource) = state.resources.iter_mut().find(|r| r.id == id) {
            resource.status = status;
        }
    }

    pub fn fail_next_add(&self, err: GatewayError) {
        self.state.lock().unwrap().add_failures.push_back(err);
    }

    pub fn fail_next_assign(&self, err: GatewayError) {
        self.state.lock().unwrap().assign_failures.push_back(err);
    }

    /// Accept the next add-item call without listing the item.
    pub fn drop_next_add(&self) {
        self.state.lock().unwrap().dropped_adds += 1;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn resource(&self, id: &str) -> Option<OrderResource> {
        self.state.lock().unwrap().resources.iter().find(|r| r.id == id).cloned()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

pub fn not_modifiable(resource_id: &str) -> GatewayError {
    GatewayError::NotModifiable {
        resource_id: resource_id.to_string(),
        message: "order cannot be modified".to_string(),
    }
}

pub fn item_not_found(resource_id: &str) -> GatewayError {
    GatewayError::ItemNotFound {
        resource_id: resource_id.to_string(),
        message: "item not found".to_string(),
    }
}

#[async_trait]
impl OrderGateway for FakeOrderBackend {
    async fn list_resources(&self, booking_id: &str) -> Result<Vec<OrderResource>, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List(booking_id.to_string()));
        Ok(state
            .resources
            .iter()
            .filter(|r| r.booking_id.as_deref() == Some(booking_id))
            .cloned()
            .collect())
    }

    async fn create_resource(&self, booking_id: &str) -> Result<String, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(booking_id.to_string()));
        state.created += 1;
        let id = format!("ord-new-{}", state.created);
        state.resources.push(OrderResource {
            id: id.clone(),
            booking_id: Some(booking_id.to_string()),
            status: OrderStatus::Pending,
            items: Vec::new(),
        });
        Ok(id)
    }

    async fn get_resource(&self, resource_id: &str) -> Result<OrderResource, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Get(resource_id.to_string()));
        state
            .resources
            .iter()
            .find(|r| r.id == resource_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound { entity: format!("order {}", resource_id) })
    }

    async fn add_item(&self, resource_id: &str, item: &ServiceRequest) -> Result<(), GatewayError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Add(resource_id.to_string()));
        if let Some(err) = state.add_failures.pop_front() {
            return Err(err);
        }
        if state.dropped_adds > 0 {
            state.dropped_adds -= 1;
            return Ok(());
        }
        let resource = state
            .resources
            .iter_mut()
            .find(|r| r.id == resource_id)
            .ok_or_else(|| GatewayError::NotFound { entity: format!("order {}", resource_id) })?;
        if !resource.status.is_modifiable() {
            return Err(not_modifiable(resource_id));
        }
        resource
            .items
            .push(OrderItem { service_id: item.service_id.clone(), quantity: item.quantity });
        Ok(())
    }

    async fn assign_handler(
        &self,
        resource_id: &str,
        _assignment: &Assignment,
    ) -> Result<(), GatewayError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Assign(resource_id.to_string()));
        if let Some(err) = state.assign_failures.pop_front() {
            return Err(err);
        }
        match state.resources.iter().find(|r| r.id == resource_id) {
            Some(resource) if !resource.items.is_empty() => Ok(()),
            Some(_) => Err(item_not_found(resource_id)),
            None => Err(GatewayError::NotFound { entity: format!("order {}", resource_id) }),
        }
    }
}

#[derive(Default)]
pub struct RecordingEnrollment {
    pub payloads: Mutex<Vec<EnrollmentPayload>>,
    pub failure: Mutex<Option<GatewayError>>,
}

#[async_trait]
impl EnrollmentGateway for RecordingEnrollment {
    async fn submit_enrollment(&self, payload: &EnrollmentPayload) -> Result<(), GatewayError> {
        if let Some(err) = self.failure.lock().unwrap().take() {
            return Err(err);
        }
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeReservations {
    pub created: Mutex<Vec<(String, DateRange)>>,
}

#[async_trait]
impl ReservationGateway for FakeReservations {
    async fn create_reservation(
        &self,
        room_id: &str,
        dates: &DateRange,
    ) -> Result<String, GatewayError> {
        let mut created = self.created.lock().unwrap();
        created.push((room_id.to_string(), dates.clone()));
        Ok(format!("res-{}", created.len()))
    }
}
