//! Service layer: workflow and transfer orchestration over the repository ports.

pub mod action_router;
pub mod progress_tracker;
pub mod transfer_coordinator;
pub mod workflow_engine;

pub use action_router::ActionRouter;
pub use progress_tracker::ProgressTracker;
pub use transfer_coordinator::{TransferCoordinator, TransferOutcome};
pub use workflow_engine::{
    AvailableStep, StepForm, StepOutcome, StepSubmission, WorkflowEngine, WorkflowState,
};
