//! Unified meeting booking across every connected meeting provider.

pub mod confirmation;
pub mod orchestrator;

pub use orchestrator::{BookingOrchestrator, NO_PROVIDERS_MESSAGE};
