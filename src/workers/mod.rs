//! Store-backed worker loops.
//!
//! Three roles poll the shared task store: the orchestrator fans queued
//! scans out into pending result rows, validators drain pending rows
//! through the external evaluator, and the reporter finalizes scans whose
//! results are all resolved. Each role is an independent, restart-safe
//! loop; a failed iteration is logged and followed by a fixed sleep, never
//! a crash.

pub mod orchestrator;
pub mod reporter;
pub mod validator;

pub use orchestrator::OrchestratorWorker;
pub use reporter::ReporterWorker;
pub use validator::ValidatorWorker;
