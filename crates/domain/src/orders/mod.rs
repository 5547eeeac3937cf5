/// Service item and handler assignment inputs
pub mod inputs;

/// External order resource model
pub mod resource;

/// Four-phase order workflow
pub mod workflow;

pub use inputs::{Assignment, ServiceRequest};
pub use resource::{OrderItem, OrderResource, OrderStatus};
pub use workflow::{OrderWorkflow, PerPhase, Phase, WorkflowOutcome, WorkflowState};
