//! Scribboard Core Library
//!
//! Platform-agnostic stroke capture, gesture recognition and stroke storage
//! for the Scribboard drawing surface.

pub mod camera;
pub mod geometry;
pub mod input;
pub mod pinch;
pub mod scribble;
pub mod storage;
pub mod stroke;
pub mod sync;
pub mod tools;

pub use camera::{MAX_SCALE, MIN_SCALE, ViewTransform};
pub use input::{GestureState, InkSurface, InputController, InputOutcome, PointerEvent, PointerKind};
pub use pinch::PinchZoom;
pub use scribble::{MotionBuffer, ScribbleDetector};
pub use storage::{StoreError, StoreResult, StoreStatus, StrokeStore, Subscription};
pub use stroke::{Board, InkColor, Stroke, StrokeError, StrokeId, StrokePoint};
pub use tools::{InkStyle, Session, ToolState};
