//! Lyngdorf Control
//!
//! Network control client for Lyngdorf MP and TDAI processors.
//!
//! This library provides:
//! - A persistent TCP connection with automatic reconnect and keep-alive
//! - Command/reply correlation over the line-based control protocol
//! - A state cache fed by the processor's status notifications
//! - Typed operations per processor family

pub mod bus;
pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod model;
pub mod protocol;
pub mod state;

pub use client::LinkStatus;
pub use device::{probe, Lyngdorf};
pub use error::{LyngdorfError, Result};
pub use model::DeviceModel;
pub use protocol::commands::{Command, Query};
pub use state::{Param, Value};
