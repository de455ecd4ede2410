//! Service layer: the service activator.

pub mod activator;

pub use activator::ServiceActivator;
