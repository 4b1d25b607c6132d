//! Domain layer - Core data model and port definitions
//!
//! This module defines the storage device model and the core traits (ports)
//! that adapters implement, following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
