//! Four-phase order workflow against the external order resource.
//!
//! ```text
//! CREATE ──▶ ADD_ITEM ──▶ ASSIGN ──▶ CONFIRM
//!   ▲           │  ▲         │
//!   └───────────┘  └─────────┘   (fallback on exhausted recovery)
//! ```
//!
//! The resource can change status at any time through other actors, so every
//! write that depends on an earlier read re-reads first. Each recovery branch
//! retries exactly once; nothing here loops on failure.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::WorkflowConfig;
use crate::enrollment::EnrollmentReceipt;
use crate::errors::{Error, Result};
use crate::ports::{GatewayError, OrderGateway};

use super::{Assignment, ServiceRequest};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Create,
    AddItem,
    Assign,
    Confirm,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Create => "CREATE",
            Phase::AddItem => "ADD_ITEM",
            Phase::Assign => "ASSIGN",
            Phase::Confirm => "CONFIRM",
        };
        f.write_str(name)
    }
}

/// One value per phase.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct PerPhase<T> {
    pub create: T,
    pub add_item: T,
    pub assign: T,
    pub confirm: T,
}

impl<T> PerPhase<T> {
    pub fn get(&self, phase: Phase) -> &T {
        match phase {
            Phase::Create => &self.create,
            Phase::AddItem => &self.add_item,
            Phase::Assign => &self.assign,
            Phase::Confirm => &self.confirm,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut T {
        match phase {
            Phase::Create => &mut self.create,
            Phase::AddItem => &mut self.add_item,
            Phase::Assign => &mut self.assign,
            Phase::Confirm => &mut self.confirm,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct WorkflowState {
    pub booking_id: String,
    pub phase: Phase,
    /// Cached id of the order resource; may be stale at any moment
    pub resource_id: Option<String>,
    pub retry_count: PerPhase<u32>,
    pub submitting: PerPhase<bool>,
    pub last_error: Option<String>,
    /// Item added during ADD_ITEM, verified again before assignment
    pub service: Option<ServiceRequest>,
    pub enrollment_verified: bool,
    pub confirmed: bool,
}

impl WorkflowState {
    fn new(booking_id: String) -> Self {
        Self {
            booking_id,
            phase: Phase::Create,
            resource_id: None,
            retry_count: PerPhase::default(),
            submitting: PerPhase::default(),
            last_error: None,
            service: None,
            enrollment_verified: false,
            confirmed: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct WorkflowOutcome {
    pub booking_id: String,
    pub resource_id: String,
    pub service: ServiceRequest,
}

/// Clears a phase's submitting flag when the call finishes or its future is
/// dropped.
struct Submitting<'a> {
    state: &'a Mutex<WorkflowState>,
    phase: Phase,
}

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        *lock(self.state).submitting.get_mut(self.phase) = false;
    }
}

fn lock(state: &Mutex<WorkflowState>) -> MutexGuard<'_, WorkflowState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Error surfaced to the user once recovery is no longer possible.
fn surface(err: GatewayError) -> Error {
    Error::UnrecoverableBackend { message: err.to_string() }
}

fn exhausted(err: GatewayError) -> Error {
    Error::UnrecoverableBackend { message: format!("still failing after one retry: {}", err) }
}

pub struct OrderWorkflow {
    gateway: Arc<dyn OrderGateway>,
    config: WorkflowConfig,
    state: Mutex<WorkflowState>,
    token: CancellationToken,
}

impl OrderWorkflow {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        config: WorkflowConfig,
        booking_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            config,
            state: Mutex::new(WorkflowState::new(booking_id.into())),
            token: CancellationToken::new(),
        }
    }

    /// Snapshot for rendering.
    pub fn state(&self) -> WorkflowState {
        lock(&self.state).clone()
    }

    pub fn record_enrollment(&self, receipt: &EnrollmentReceipt) {
        tracing::info!(
            reservation_id = %receipt.reservation_id,
            "Enrollment recorded for order workflow"
        );
        lock(&self.state).enrollment_verified = true;
    }

    /// Abandons the workflow. Pending delays and gateway calls are dropped;
    /// resources already created on the backend are left as they are.
    pub fn dismiss(&self) {
        let state = self.state();
        tracing::info!(
            booking_id = %state.booking_id,
            phase = %state.phase,
            resource_id = ?state.resource_id,
            "Order workflow dismissed"
        );
        self.token.cancel();
    }

    pub fn is_dismissed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drives the remaining phases in order, resuming from the current one.
    pub async fn run(
        &self,
        request: &ServiceRequest,
        assignment: &Assignment,
    ) -> Result<WorkflowOutcome> {
        request.validate()?;
        assignment.validate()?;

        if self.state().phase == Phase::Create {
            self.create().await?;
        }
        if self.state().phase == Phase::AddItem {
            self.add_item(request).await?;
        }
        if self.state().phase == Phase::Assign {
            self.assign(assignment).await?;
        }
        self.confirm()
    }

    /// CREATE: reuse a verified pending resource for the booking, or create
    /// one. Returns the resource id now cached.
    pub async fn create(&self) -> Result<String> {
        let _guard = self.begin(Phase::Create)?;
        let (booking_id, cached, enrolled) = {
            let state = lock(&self.state);
            (state.booking_id.clone(), state.resource_id.clone(), state.enrollment_verified)
        };
        if booking_id.trim().is_empty() {
            return Err(self.record(Error::validation("booking id is required")));
        }
        if self.config.require_enrollment && !enrolled {
            return Err(self.record(Error::validation("enrollment must succeed before ordering")));
        }

        let reusable = match self.find_reusable(&booking_id, cached.as_deref()).await {
            Ok(found) => found,
            Err(err) => return Err(self.record(err)),
        };
        let resource_id = match reusable {
            Some(id) => {
                tracing::info!(
                    booking_id = %booking_id,
                    resource_id = %id,
                    "Reusing pending order resource"
                );
                id
            }
            None => match self.call(self.gateway.create_resource(&booking_id)).await? {
                Ok(id) => {
                    tracing::info!(
                        booking_id = %booking_id,
                        resource_id = %id,
                        "Order resource created"
                    );
                    id
                }
                Err(err) => return Err(self.record(surface(err))),
            },
        };

        let mut state = lock(&self.state);
        state.resource_id = Some(resource_id.clone());
        state.phase = Phase::AddItem;
        state.last_error = None;
        Ok(resource_id)
    }

    /// ADD_ITEM: add the service to the cached resource, recreating the
    /// resource once if it stopped accepting items.
    pub async fn add_item(&self, request: &ServiceRequest) -> Result<()> {
        request.validate()?;
        let _guard = self.begin(Phase::AddItem)?;
        let cached = self.cached_resource(Phase::AddItem)?;

        match self.add_item_with_recovery(&cached, request).await {
            Ok(resource_id) => {
                tracing::info!(
                    resource_id = %resource_id,
                    service_id = %request.service_id,
                    "Item added"
                );
                let mut state = lock(&self.state);
                state.resource_id = Some(resource_id);
                state.service = Some(request.clone());
                state.phase = Phase::Assign;
                state.last_error = None;
                Ok(())
            }
            Err(Error::Dismissed) => Err(Error::Dismissed),
            Err(err) => Err(self.fall_back(Phase::Create, err)),
        }
    }

    /// ASSIGN: wait out backend propagation, verify the item is listed, then
    /// assign the handler.
    pub async fn assign(&self, assignment: &Assignment) -> Result<()> {
        assignment.validate()?;
        let _guard = self.begin(Phase::Assign)?;
        let resource_id = self.cached_resource(Phase::Assign)?;
        let service = self.state().service.ok_or_else(|| Error::InvalidStateTransition {
            from: Phase::AddItem.to_string(),
            to: Phase::Assign.to_string(),
        })?;

        match self.assign_with_recovery(&resource_id, &service, assignment).await {
            Ok(()) => {
                tracing::info!(
                    resource_id = %resource_id,
                    handler_id = %assignment.handler_id,
                    "Handler assigned"
                );
                let mut state = lock(&self.state);
                state.phase = Phase::Confirm;
                state.last_error = None;
                Ok(())
            }
            Err(Error::Dismissed) => Err(Error::Dismissed),
            Err(err) => Err(self.fall_back(Phase::AddItem, err)),
        }
    }

    /// CONFIRM: local only. Marks the workflow finished.
    pub fn confirm(&self) -> Result<WorkflowOutcome> {
        let _guard = self.begin(Phase::Confirm)?;
        let mut state = lock(&self.state);
        let (Some(resource_id), Some(service)) = (state.resource_id.clone(), state.service.clone())
        else {
            return Err(Error::InvalidStateTransition {
                from: state.phase.to_string(),
                to: Phase::Confirm.to_string(),
            });
        };
        state.confirmed = true;
        tracing::info!(
            booking_id = %state.booking_id,
            resource_id = %resource_id,
            "Order workflow confirmed"
        );

        Ok(WorkflowOutcome { booking_id: state.booking_id.clone(), resource_id, service })
    }

    async fn find_reusable(
        &self,
        booking_id: &str,
        cached: Option<&str>,
    ) -> Result<Option<String>> {
        let mut candidates = self
            .call(self.gateway.list_resources(booking_id))
            .await?
            .map_err(surface)?;
        candidates.retain(|r| r.status.is_modifiable());
        // Prefer the resource this workflow already used.
        candidates.sort_by_key(|r| Some(r.id.as_str()) != cached);

        for candidate in candidates {
            match self.call(self.gateway.get_resource(&candidate.id)).await? {
                Ok(fresh) if fresh.status.is_modifiable() => return Ok(Some(fresh.id)),
                Ok(fresh) => {
                    tracing::debug!(
                        resource_id = %fresh.id,
                        status = %fresh.status,
                        "Candidate no longer pending"
                    );
                }
                Err(GatewayError::NotFound { .. }) => {
                    tracing::debug!(resource_id = %candidate.id, "Candidate vanished");
                }
                Err(err) => return Err(surface(err)),
            }
        }
        Ok(None)
    }

    async fn add_item_with_recovery(
        &self,
        cached: &str,
        request: &ServiceRequest,
    ) -> Result<String> {
        let mut target = cached.to_string();
        let mut recovered = false;

        match self.call(self.gateway.get_resource(cached)).await? {
            Ok(resource) if resource.status.is_modifiable() => {}
            Ok(resource) => {
                tracing::warn!(
                    resource_id = %cached,
                    status = %resource.status,
                    "Cached resource no longer modifiable"
                );
                target = self.force_recreate(Phase::AddItem).await?;
                recovered = true;
            }
            Err(GatewayError::NotFound { .. }) => {
                tracing::warn!(resource_id = %cached, "Cached resource vanished");
                target = self.force_recreate(Phase::AddItem).await?;
                recovered = true;
            }
            Err(err) => return Err(surface(err)),
        }

        match self.call(self.gateway.add_item(&target, request)).await? {
            Ok(()) => return Ok(target),
            Err(err @ GatewayError::NotModifiable { .. }) if !recovered => {
                tracing::warn!(resource_id = %target, "Add item refused: {}", err);
            }
            Err(err) if recovered => return Err(exhausted(err)),
            Err(err) => return Err(surface(err)),
        }

        let fresh = self.force_recreate(Phase::AddItem).await?;
        self.call(self.gateway.add_item(&fresh, request)).await?.map_err(exhausted)?;
        Ok(fresh)
    }

    async fn assign_with_recovery(
        &self,
        resource_id: &str,
        service: &ServiceRequest,
        assignment: &Assignment,
    ) -> Result<()> {
        let mut re_added = false;

        self.settle().await?;
        if !self.item_listed(resource_id, service).await? {
            tracing::warn!(
                resource_id,
                service_id = %service.service_id,
                "Item missing after add, adding again"
            );
            self.add_again(resource_id, service).await?;
            re_added = true;
        }

        match self.call(self.gateway.assign_handler(resource_id, assignment)).await? {
            Ok(()) => return Ok(()),
            Err(err @ GatewayError::ItemNotFound { .. }) if !re_added => {
                tracing::warn!(resource_id, "Assignment could not find the item: {}", err);
            }
            Err(err) if re_added => return Err(exhausted(err)),
            Err(err) => return Err(surface(err)),
        }

        self.add_again(resource_id, service).await?;
        self.call(self.gateway.assign_handler(resource_id, assignment))
            .await?
            .map_err(exhausted)
    }

    /// The single add-item retry of the ASSIGN phase, followed by the same
    /// settle-and-verify step as the first attempt.
    async fn add_again(&self, resource_id: &str, service: &ServiceRequest) -> Result<()> {
        self.bump_retry(Phase::Assign);
        self.call(self.gateway.add_item(resource_id, service))
            .await?
            .map_err(exhausted)?;
        self.settle().await?;
        if !self.item_listed(resource_id, service).await? {
            return Err(Error::UnrecoverableBackend {
                message: format!(
                    "service {} still missing from resource {} after retry",
                    service.service_id, resource_id
                ),
            });
        }
        Ok(())
    }

    async fn item_listed(&self, resource_id: &str, service: &ServiceRequest) -> Result<bool> {
        let resource = self
            .call(self.gateway.get_resource(resource_id))
            .await?
            .map_err(surface)?;
        Ok(resource.contains_service(&service.service_id))
    }

    /// Creates a brand-new resource for the booking, bypassing reuse.
    async fn force_recreate(&self, phase: Phase) -> Result<String> {
        self.bump_retry(phase);
        let booking_id = self.state().booking_id;
        let id = self
            .call(self.gateway.create_resource(&booking_id))
            .await?
            .map_err(surface)?;
        tracing::info!(booking_id = %booking_id, resource_id = %id, "Forced new order resource");
        lock(&self.state).resource_id = Some(id.clone());
        Ok(id)
    }

    async fn settle(&self) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Dismissed),
            _ = tokio::time::sleep(self.config.consistency_delay) => Ok(()),
        }
    }

    /// Runs a gateway call unless the workflow is dismissed first. The outer
    /// result carries dismissal, the inner one the backend outcome.
    async fn call<T, F>(&self, request: F) -> Result<std::result::Result<T, GatewayError>>
    where
        F: Future<Output = std::result::Result<T, GatewayError>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Dismissed),
            result = request => Ok(result),
        }
    }

    fn begin(&self, phase: Phase) -> Result<Submitting<'_>> {
        if self.token.is_cancelled() {
            return Err(Error::Dismissed);
        }
        let mut state = lock(&self.state);
        if state.confirmed || state.phase != phase {
            return Err(Error::InvalidStateTransition {
                from: state.phase.to_string(),
                to: phase.to_string(),
            });
        }
        let submitting = state.submitting.get_mut(phase);
        if *submitting {
            return Err(Error::AlreadySubmitting { phase: phase.to_string() });
        }
        *submitting = true;
        Ok(Submitting { state: &self.state, phase })
    }

    fn cached_resource(&self, phase: Phase) -> Result<String> {
        self.state().resource_id.ok_or_else(|| Error::InvalidStateTransition {
            from: Phase::Create.to_string(),
            to: phase.to_string(),
        })
    }

    fn bump_retry(&self, phase: Phase) {
        *lock(&self.state).retry_count.get_mut(phase) += 1;
    }

    fn record(&self, err: Error) -> Error {
        lock(&self.state).last_error = Some(err.to_string());
        err
    }

    fn fall_back(&self, to: Phase, err: Error) -> Error {
        let mut state = lock(&self.state);
        tracing::error!(from = %state.phase, to = %to, "Order workflow step failed: {}", err);
        state.phase = to;
        state.last_error = Some(err.to_string());
        err
    }
}
