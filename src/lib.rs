pub mod controller;
pub mod crd;
pub mod server;

// Re-export for main.rs and the CRD generator
pub use crate::controller::{error_policy, Context, ReconcileError};
