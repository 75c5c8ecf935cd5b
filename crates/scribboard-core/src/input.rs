//! Pointer input: turns raw pointer events into live ink and committed strokes.
//!
//! The controller is a two-state machine (`Idle`, `Drawing`). Only pen and
//! mouse pointers draw; touch pointers are rejected here and left to the
//! pinch handler.

use crate::camera::ViewTransform;
use crate::scribble::{MotionBuffer, ScribbleDetector};
use crate::stroke::{InkColor, Stroke, StrokePoint};
use crate::tools::{InkStyle, Session, ToolState};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Device that produced a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Pen,
    Mouse,
    Touch,
}

impl PointerKind {
    pub fn is_touch(self) -> bool {
        self == PointerKind::Touch
    }
}

impl FromStr for PointerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pen" => Ok(PointerKind::Pen),
            "mouse" => Ok(PointerKind::Mouse),
            "touch" => Ok(PointerKind::Touch),
            other => Err(format!("Unknown pointer type: {}", other)),
        }
    }
}

/// Pointer event in surface-local screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerEvent {
    Down {
        position: Point,
        kind: PointerKind,
        #[serde(default)]
        pressure: Option<f64>,
    },
    Move {
        position: Point,
        kind: PointerKind,
        #[serde(default)]
        pressure: Option<f64>,
    },
    Up {
        kind: PointerKind,
    },
    Leave,
}

/// Target of the live-draw fast path.
///
/// Coordinates are in canvas space; implementations map them through `view`.
pub trait InkSurface {
    /// Draw one segment of the gesture in progress.
    fn draw_segment(&mut self, from: Point, to: Point, style: &InkStyle, view: &ViewTransform);

    /// Wipe everything drawn inside `region`.
    fn clear_region(&mut self, region: Rect, view: &ViewTransform);
}

/// Surface that discards live ink (headless hosts).
impl InkSurface for () {
    fn draw_segment(&mut self, _from: Point, _to: Point, _style: &InkStyle, _view: &ViewTransform) {}

    fn clear_region(&mut self, _region: Rect, _view: &ViewTransform) {}
}

/// The gesture being captured.
#[derive(Debug, Clone)]
pub struct Gesture {
    /// Device that started the gesture.
    pub kind: PointerKind,
    /// Style captured at pointer-down.
    pub style: InkStyle,
    /// Last canvas position drawn to.
    pub last: Point,
    /// Full captured path, committed at pointer-up.
    path: Vec<StrokePoint>,
    /// Recent motion for scribble detection.
    window: MotionBuffer,
}

impl Gesture {
    pub fn path(&self) -> &[StrokePoint] {
        &self.path
    }

    pub fn window(&self) -> &MotionBuffer {
        &self.window
    }
}

/// Controller state.
#[derive(Debug, Clone, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Drawing(Gesture),
}

/// What a single event did.
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    /// The event was rejected or irrelevant in the current state.
    Ignored,
    /// A drawing gesture began.
    Started,
    /// A live segment was drawn.
    Drew,
    /// A scribble cleared the given canvas region.
    Erased(Rect),
    /// The gesture ended with a stroke ready to persist.
    Committed(Stroke),
    /// The gesture ended without enough points to form a stroke.
    Discarded,
}

/// Pointer state machine owning the session.
#[derive(Debug, Clone, Default)]
pub struct InputController {
    session: Session,
    state: GestureState,
    detector: ScribbleDetector,
}

impl InputController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session,
            ..Self::default()
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn view(&self) -> &ViewTransform {
        &self.session.view
    }

    pub fn view_mut(&mut self) -> &mut ViewTransform {
        &mut self.session.view
    }

    pub fn tools(&self) -> &ToolState {
        &self.session.tools
    }

    /// Pick an ink color for gestures started from now on.
    pub fn set_color(&mut self, color: InkColor) {
        self.session.tools.set_color(color);
    }

    /// Flip the eraser for gestures started from now on.
    pub fn toggle_eraser(&mut self) -> bool {
        self.session.tools.toggle_eraser()
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, GestureState::Drawing(_))
    }

    /// The gesture in progress, if any.
    pub fn active_gesture(&self) -> Option<&Gesture> {
        match &self.state {
            GestureState::Drawing(gesture) => Some(gesture),
            GestureState::Idle => None,
        }
    }

    /// Dispatch one pointer event.
    pub fn handle(&mut self, event: PointerEvent, surface: &mut dyn InkSurface) -> InputOutcome {
        match event {
            PointerEvent::Down {
                position,
                kind,
                pressure,
            } => self.pointer_down(position, kind, pressure),
            PointerEvent::Move {
                position,
                kind,
                pressure,
            } => self.pointer_move(position, kind, pressure, surface),
            PointerEvent::Up { kind } => self.pointer_up(kind),
            PointerEvent::Leave => self.pointer_leave(),
        }
    }

    fn capture(&self, position: Point, pressure: Option<f64>) -> StrokePoint {
        let canvas = self.session.view.screen_to_canvas(position);
        match pressure {
            Some(p) => StrokePoint::with_pressure(canvas.x, canvas.y, p),
            None => StrokePoint::new(canvas.x, canvas.y),
        }
    }

    /// Start a gesture. Touch pointers and a second pointer are ignored.
    pub fn pointer_down(&mut self, position: Point, kind: PointerKind, pressure: Option<f64>) -> InputOutcome {
        if kind.is_touch() {
            log::debug!("Rejected touch pointer-down");
            return InputOutcome::Ignored;
        }
        if self.is_drawing() {
            log::debug!("Ignored {:?} pointer-down while drawing", kind);
            return InputOutcome::Ignored;
        }

        let point = self.capture(position, pressure);
        let mut window = MotionBuffer::new();
        window.push(point.position());

        self.state = GestureState::Drawing(Gesture {
            kind,
            style: self.session.tools.ink_style(),
            last: point.position(),
            path: vec![point],
            window,
        });
        InputOutcome::Started
    }

    /// Extend the gesture, drawing live ink or clearing a scribbled region.
    pub fn pointer_move(
        &mut self,
        position: Point,
        kind: PointerKind,
        pressure: Option<f64>,
        surface: &mut dyn InkSurface,
    ) -> InputOutcome {
        if kind.is_touch() || !self.is_drawing() {
            return InputOutcome::Ignored;
        }

        let point = self.capture(position, pressure);
        let view = self.session.view;
        let GestureState::Drawing(gesture) = &mut self.state else {
            return InputOutcome::Ignored;
        };

        let canvas = point.position();
        gesture.path.push(point);
        gesture.window.push(canvas);

        if let Some(region) = self.detector.detect(&gesture.window) {
            surface.clear_region(region, &view);
            // Ink before the scribble is wiped, not committed.
            gesture.window.clear();
            gesture.path.clear();
            gesture.path.push(point);
            gesture.last = canvas;
            return InputOutcome::Erased(region);
        }

        surface.draw_segment(gesture.last, canvas, &gesture.style, &view);
        gesture.last = canvas;
        InputOutcome::Drew
    }

    /// End the gesture. A touch pointer lifting during a pen gesture is ignored.
    pub fn pointer_up(&mut self, kind: PointerKind) -> InputOutcome {
        match &self.state {
            GestureState::Idle => InputOutcome::Ignored,
            GestureState::Drawing(gesture) if kind.is_touch() && !gesture.kind.is_touch() => {
                InputOutcome::Ignored
            }
            GestureState::Drawing(_) => self.finish(),
        }
    }

    /// The pointer left the surface; treated like pointer-up.
    pub fn pointer_leave(&mut self) -> InputOutcome {
        if self.is_drawing() {
            self.finish()
        } else {
            InputOutcome::Ignored
        }
    }

    fn finish(&mut self) -> InputOutcome {
        let GestureState::Drawing(gesture) = std::mem::take(&mut self.state) else {
            return InputOutcome::Ignored;
        };

        let Gesture { style, path, .. } = gesture;
        match Stroke::new(path, style.color, style.width, style.is_eraser) {
            Ok(stroke) => {
                log::debug!("Gesture committed with {} points", stroke.points().len());
                InputOutcome::Committed(stroke)
            }
            Err(e) => {
                log::debug!("Gesture discarded: {}", e);
                InputOutcome::Discarded
            }
        }
    }
}
