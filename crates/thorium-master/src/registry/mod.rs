//! Worker machine registry.

pub mod machines;

pub use machines::{MachineRegistry, RegistryError};
