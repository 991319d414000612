//! Configured camera slots and open device handles.

mod handle;
mod registry;

pub use handle::DeviceHandle;
pub use registry::{DeviceDescriptor, DeviceRegistry};
