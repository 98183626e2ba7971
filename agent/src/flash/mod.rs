pub mod orchestrator;
pub mod programmer;
