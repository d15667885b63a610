mod backend;
mod backends;
pub mod filter;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::scripted::read_script;
pub use backends::{ScriptedBackend, ScriptedFrame};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use filter::{filter_by_label, DOOR_LABEL};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection};
