//! Provisioning engines
//!
//! - [`selector`]: picks storage servers under the active load-balancing policy
//! - [`allocator`]: provisions device pools per configured section
//! - [`synchronizer`]: writes allocation results back into the config store
//! - [`cleanup`]: best-effort teardown of everything the allocator created

pub mod allocator;
pub mod cleanup;
pub mod selector;
pub mod synchronizer;

pub use allocator::*;
pub use cleanup::*;
pub use selector::*;
pub use synchronizer::*;
