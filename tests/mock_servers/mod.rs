//! Mock servers for integration testing
//!
//! The mock processor speaks the Lyngdorf control protocol over a real TCP
//! socket, allowing full integration testing without hardware.

pub mod lyngdorf;

pub use lyngdorf::{MockLyngdorf, MockLyngdorfState};
