//! complyscan: compliance auditing in two concurrency regimes.
//!
//! The store-backed pipeline (`workers`, `repository`) coordinates
//! independent orchestrator/validator/reporter processes through a shared
//! SQLite task store. The in-process scheduler (`audit`) runs one audit
//! over local rule sets and artifacts with bounded concurrency, retry, and
//! fallback redistribution. Both regimes share the retry primitive and the
//! evaluator abstraction.

pub mod audit;
pub mod cli;
pub mod config;
pub mod evaluator;
pub mod models;
pub mod report;
pub mod repository;
pub mod retry;
pub mod schema;
pub mod workers;
