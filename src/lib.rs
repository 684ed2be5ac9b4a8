// Library exports for the binary and integration tests

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod logging;
pub mod monitor;
pub mod upload;
pub mod upload_record;
pub mod validation;

pub use controller::{Controller, MonitorState, MonitorStatus};
