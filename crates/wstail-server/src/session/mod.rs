//! Session lifecycle: per-connection coordination and the live registry.

pub mod coordinator;
pub mod registry;

pub use coordinator::SessionCoordinator;
pub use registry::SessionRegistry;
