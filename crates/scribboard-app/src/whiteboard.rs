//! Whiteboard host binding.
//!
//! Owns the input controller, pinch handler and raster surface for one
//! board, and keeps the surface in step with the board's stroke store.

use crate::AppError;
use crate::config::AppConfig;
use kurbo::{Point, Rect};
use scribboard_core::tools::ToolState;
use scribboard_core::{
    InkColor, InkSurface, InputController, InputOutcome, PinchZoom, PointerEvent, Session, Stroke,
    StoreStatus, StrokeId, StrokeStore, Subscription,
};
use scribboard_render::RasterRenderer;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Non-fatal conditions the host may want to show.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A write failed; `pending` strokes are kept for retry.
    SaveFailed { message: String, pending: usize },
    /// Queued strokes reached the store.
    Saved { flushed: usize },
    /// A scribble-erase or clear could not be stored.
    EditFailed(String),
    /// The store lost its connection; `queued` writes are held for it.
    Offline { queued: usize },
    /// The store is reachable again after an `Offline` notice.
    Reconnected,
    /// The store refused a write after accepting it.
    Rejected(String),
}

type Inbox = Arc<Mutex<Option<Vec<Stroke>>>>;

/// One board on one drawing surface.
pub struct Whiteboard {
    board_id: String,
    store: Arc<dyn StrokeStore>,
    controller: InputController,
    pinch: PinchZoom,
    renderer: RasterRenderer,
    palette: Vec<InkColor>,
    /// Last snapshot delivered by the store.
    strokes: Vec<Stroke>,
    /// Latest undelivered snapshot, written by the subscription.
    inbox: Inbox,
    /// Committed strokes the store has not accepted yet, oldest first.
    pending: VecDeque<Stroke>,
    save_failing: bool,
    store_offline: bool,
    snapshots: usize,
    notices: Vec<Notice>,
    _subscription: Subscription,
}

impl Whiteboard {
    /// Open `board_id` on `store` and render whatever it already holds.
    pub fn new(
        board_id: impl Into<String>,
        store: Arc<dyn StrokeStore>,
        config: &AppConfig,
    ) -> Result<Self, AppError> {
        let board_id = board_id.into();
        let renderer =
            RasterRenderer::with_background(config.width, config.height, config.background_color)?;

        let inbox: Inbox = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&inbox);
        let subscription = store.subscribe(
            &board_id,
            Box::new(move |strokes: &[Stroke]| {
                if let Ok(mut slot) = slot.lock() {
                    *slot = Some(strokes.to_vec());
                }
            }),
        )?;

        let session = Session {
            tools: ToolState::new().with_widths(config.pen_width, config.eraser_width),
            ..Session::default()
        };
        let palette = if config.palette.is_empty() {
            scribboard_core::tools::PALETTE.to_vec()
        } else {
            config.palette.clone()
        };

        let mut whiteboard = Self {
            board_id,
            store,
            controller: InputController::with_session(session),
            pinch: PinchZoom::new(),
            renderer,
            palette,
            strokes: Vec::new(),
            inbox,
            pending: VecDeque::new(),
            save_failing: false,
            store_offline: false,
            snapshots: 0,
            notices: Vec::new(),
            _subscription: subscription,
        };
        if !whiteboard.apply_inbox() {
            whiteboard.render();
        }
        log::info!("Opened board {}", whiteboard.board_id);
        Ok(whiteboard)
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// Strokes currently shown, including ones still waiting to be saved.
    pub fn strokes(&self) -> Vec<Stroke> {
        self.strokes.iter().chain(self.pending.iter()).cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether at least one snapshot has arrived from the store.
    pub fn is_synced(&self) -> bool {
        self.snapshots > 0
    }

    /// Number of snapshots applied so far.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots
    }

    pub fn controller(&self) -> &InputController {
        &self.controller
    }

    pub fn renderer(&self) -> &RasterRenderer {
        &self.renderer
    }

    pub fn palette(&self) -> &[InkColor] {
        &self.palette
    }

    /// Feed one pointer event.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> InputOutcome {
        let outcome = self.controller.handle(event, &mut self.renderer);
        match &outcome {
            InputOutcome::Erased(region) => self.erase_region(*region),
            InputOutcome::Committed(stroke) => self.commit(stroke.clone()),
            _ => {}
        }
        outcome
    }

    /// Feed the current touch contacts. Returns true if the view zoomed.
    pub fn handle_touch(&mut self, contacts: &[Point]) -> bool {
        let zoomed = self.pinch.touch_move(contacts, self.controller.view_mut());
        if zoomed {
            self.render();
        }
        zoomed
    }

    pub fn touch_end(&mut self) {
        self.pinch.touch_end();
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), AppError> {
        use scribboard_render::Renderer;
        self.renderer.resize(width, height)?;
        self.render();
        Ok(())
    }

    pub fn set_color(&mut self, color: InkColor) {
        self.controller.set_color(color);
    }

    /// Pick a palette entry. Returns false for an out-of-range index.
    pub fn select_palette(&mut self, index: usize) -> bool {
        match self.palette.get(index).copied() {
            Some(color) => {
                self.set_color(color);
                true
            }
            None => false,
        }
    }

    pub fn toggle_eraser(&mut self) -> bool {
        self.controller.toggle_eraser()
    }

    /// Empty the whole board.
    pub fn clear_board(&mut self) {
        self.pending.clear();
        self.strokes.clear();
        if let Err(e) = self.store.clear(&self.board_id) {
            log::error!("Failed to clear board {}: {}", self.board_id, e);
            self.notices.push(Notice::EditFailed(e.to_string()));
        }
        if !self.apply_inbox() {
            self.render();
        }
        self.check_store();
    }

    /// Pump store work: deliver snapshots and retry queued strokes.
    pub fn poll(&mut self) {
        self.store.poll();
        self.check_store();
        if !self.pending.is_empty() {
            self.flush_pending();
        }
        self.apply_inbox();
    }

    /// Notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// PNG of the surface as currently shown.
    pub fn export_png(&self) -> Result<Vec<u8>, AppError> {
        Ok(self.renderer.encode_png()?)
    }

    fn commit(&mut self, stroke: Stroke) {
        log::info!("Committing stroke {} to board {}", stroke.id(), self.board_id);
        self.pending.push_back(stroke);
        self.flush_pending();
        self.apply_inbox();
        self.check_store();
    }

    /// Raise notices for store errors and connectivity changes.
    fn check_store(&mut self) {
        for e in self.store.take_errors() {
            log::error!("Store error on board {}: {}", self.board_id, e);
            self.notices.push(Notice::Rejected(e.to_string()));
        }
        match self.store.status() {
            StoreStatus::Offline { queued } if queued > 0 && !self.store_offline => {
                log::warn!("Board {} offline, {} write(s) held", self.board_id, queued);
                self.store_offline = true;
                self.notices.push(Notice::Offline { queued });
            }
            StoreStatus::Ready if self.store_offline => {
                log::info!("Board {} back online", self.board_id);
                self.store_offline = false;
                self.notices.push(Notice::Reconnected);
            }
            _ => {}
        }
    }

    /// Append queued strokes in order, stopping at the first failure.
    fn flush_pending(&mut self) {
        let mut flushed = 0;
        while let Some(stroke) = self.pending.front() {
            match self.store.append(&self.board_id, stroke) {
                Ok(()) => {
                    if let Some(stroke) = self.pending.pop_front() {
                        self.strokes.push(stroke);
                    }
                    flushed += 1;
                }
                Err(e) => {
                    log::error!("Failed to save stroke on board {}: {}", self.board_id, e);
                    if !self.save_failing {
                        self.notices.push(Notice::SaveFailed {
                            message: e.to_string(),
                            pending: self.pending.len(),
                        });
                    }
                    self.save_failing = true;
                    return;
                }
            }
        }
        if self.save_failing && flushed > 0 {
            self.notices.push(Notice::Saved { flushed });
        }
        self.save_failing = false;
    }

    /// Remove committed and queued strokes crossing a scribbled region.
    fn erase_region(&mut self, region: Rect) {
        let ids: Vec<StrokeId> = self
            .strokes
            .iter()
            .filter(|s| s.intersects(region))
            .map(Stroke::id)
            .collect();
        self.strokes.retain(|s| !ids.contains(&s.id()));
        self.pending.retain(|s| !s.intersects(region));

        if !ids.is_empty() {
            log::info!("Scribble erased {} stroke(s) on board {}", ids.len(), self.board_id);
            if let Err(e) = self.store.remove(&self.board_id, &ids) {
                log::error!("Failed to erase strokes on board {}: {}", self.board_id, e);
                self.notices.push(Notice::EditFailed(e.to_string()));
            }
        }
        // The live layer still holds the gesture's pre-trigger ink.
        if !self.apply_inbox() {
            self.render();
        }
        self.check_store();
    }

    /// Render the newest delivered snapshot, if any. Returns true if it rendered.
    fn apply_inbox(&mut self) -> bool {
        let snapshot = match self.inbox.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(strokes) = snapshot else {
            return false;
        };
        log::debug!("Board {} snapshot: {} strokes", self.board_id, strokes.len());
        self.strokes = strokes;
        self.snapshots += 1;
        self.render();
        true
    }

    /// Full re-render, then restore the gesture in progress on the live layer.
    fn render(&mut self) {
        let shown = self.strokes();
        let view = *self.controller.view();
        self.renderer.render_all(&shown, &view);

        if let Some(gesture) = self.controller.active_gesture() {
            for pair in gesture.path().windows(2) {
                self.renderer
                    .draw_segment(pair[0].position(), pair[1].position(), &gesture.style, &view);
            }
        }
    }
}
