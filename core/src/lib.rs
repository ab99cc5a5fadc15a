//! Job lifecycle engine: configuration, command execution, the worker loop,
//! worker-process supervision, and the control-plane facade over the store.

pub mod config;
pub mod control;
mod error;
pub mod executor;
pub mod process_group;
pub mod stop_signal;
pub mod supervisor;
pub mod worker;

pub use config::ConfigProvider;
pub use control::QueueControl;
pub use error::QueueError;
pub use executor::ExecOutcome;
pub use stop_signal::StopSignal;
pub use supervisor::WorkerSupervisor;
pub use worker::Worker;
