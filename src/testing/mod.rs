//! Testing utilities and mock implementations
//!
//! Mocks for the broker transport and the vendor API so the bridge can be
//! exercised without an MQTT broker or network access.

pub mod mocks;

pub use mocks::*;
