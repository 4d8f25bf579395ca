//! The Public API Facade and Worker Supervisor: the library surface
//! embedding applications call into, and the detached-process
//! machinery that actually runs a session (spec.md 2, 5).

pub mod facade;
pub mod job;
pub mod worker_supervisor;

pub use facade::GatewayFacade;
pub use job::{JobKind, JobSpec};
pub use worker_supervisor::WorkerSupervisor;
