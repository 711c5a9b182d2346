// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod id;
mod image_ref;
mod pipeline_name;
mod port_binding;

pub use id::{ContainerId, Id, RunId};
pub use image_ref::{ImageReference, ParseImageRefError};
pub use pipeline_name::{PipelineName, PipelineNameError};
pub use port_binding::{PortBinding, PortBindingError, Protocol};
