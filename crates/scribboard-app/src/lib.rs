//! Scribboard host binding.
//!
//! Wires pointer input, pinch zoom, a stroke store and the raster renderer
//! into a single [`Whiteboard`].

mod config;
mod whiteboard;

pub use config::AppConfig;
pub use whiteboard::{Notice, Whiteboard};

use scribboard_core::StoreError;
use scribboard_render::RendererError;
use thiserror::Error;

/// Host errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RendererError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timed out waiting for board {0}")]
    Timeout(String),
}
