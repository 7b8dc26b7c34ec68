//! Application layer for tshotkey-trigger.
//!
//! Orchestrates one trigger run: it knows *what* happens in which order, and
//! delegates the *how* to the infrastructure adapters it is handed.

pub mod trigger_service;

pub use trigger_service::{run_trigger, run_trigger_until};
