//! Configuration layer
//!
//! The shared configuration store read at startup to discover requested
//! device counts, servers and the load-balancing policy, and written at the
//! end of allocation with the derived addresses/paths/ids.

pub mod sections;
pub mod store;

pub use sections::*;
pub use store::*;
