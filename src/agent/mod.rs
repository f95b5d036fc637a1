//! The specialist panel.
//!
//! Specialists answer queries through an [`crate::llm::InferenceClient`]; the
//! manager decides who takes part and merges their answers through the
//! coordinator.

pub mod coordinator;
pub mod manager;
pub mod roster;
pub mod specialist;

pub use coordinator::Coordinator;
pub use manager::AgentManager;
pub use roster::{default_profiles, AgentProfile, GENERAL_SPECIALIST};
