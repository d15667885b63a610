use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Backends own the translation from their native output into validated
/// [`Detection`] records. Nothing past this boundary sees raw model tensors.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class labels this backend can emit.
    fn labels(&self) -> &[String];

    /// Returns true when the backend can emit `label`.
    fn supports_label(&self, label: &str) -> bool {
        self.labels().iter().any(|l| l == label)
    }

    /// Run detection on a frame. Output order carries no meaning.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
