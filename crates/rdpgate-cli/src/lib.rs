//! Host adapters and terminal output for the `rdpgate` binary

pub mod output;
pub mod preflight;
pub mod service;
pub mod timer;

mod command;

pub use service::SystemdSupervisor;
pub use timer::SystemdTimerScheduler;
