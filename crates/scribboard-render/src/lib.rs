//! Scribboard Render Library
//!
//! CPU raster rendering of strokes, with a live layer for the gesture in
//! progress and PNG export.

mod raster;
mod renderer;

pub use raster::{RasterRenderer, encode_png};
pub use renderer::{DEFAULT_BACKGROUND, RenderContext, RenderResult, Renderer, RendererError};
