//! Renderer trait abstraction.

use kurbo::Size;
use peniko::Color;
use scribboard_core::{Stroke, ViewTransform};
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Initialization failed: {0}")]
    InitFailed(String),
    #[error("Render failed: {0}")]
    RenderFailed(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Paper color used when none is configured.
pub const DEFAULT_BACKGROUND: Color = Color::from_rgba8(255, 255, 255, 255);

/// Context for a single full render.
pub struct RenderContext<'a> {
    /// Committed strokes, oldest first.
    pub strokes: &'a [Stroke],
    /// Canvas to screen mapping.
    pub view: ViewTransform,
    /// Viewport size in physical pixels.
    pub viewport_size: Size,
    /// Paper color. Eraser strokes are painted with it.
    pub background_color: Color,
}

impl<'a> RenderContext<'a> {
    pub fn new(strokes: &'a [Stroke], viewport_size: Size) -> Self {
        Self {
            strokes,
            view: ViewTransform::default(),
            viewport_size,
            background_color: DEFAULT_BACKGROUND,
        }
    }

    pub fn with_view(mut self, view: ViewTransform) -> Self {
        self.view = view;
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }
}

/// Trait for rendering backends.
pub trait Renderer {
    /// Redraw every stroke from scratch, discarding live ink.
    ///
    /// Rendering the same context twice yields the same pixels.
    fn render(&mut self, ctx: &RenderContext) -> RenderResult<()>;

    /// Resize the drawing surface. Content is lost until the next render.
    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()>;
}
