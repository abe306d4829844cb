use crate::error::{ChunkError, Result};

pub use tokio_util::sync::CancellationToken;

/// Turns a cancelled token into `Err(Cancelled)` at an I/O boundary.
pub trait CancelCheck {
    fn check(&self) -> Result<()>;
}

impl CancelCheck for CancellationToken {
    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ChunkError::Cancelled)
        } else {
            Ok(())
        }
    }
}
