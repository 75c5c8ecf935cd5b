//! CPU raster renderer built on tiny-skia.
//!
//! Two layers: `base` holds committed strokes and is rebuilt by every full
//! render, `live` holds the gesture in progress and is composited on top.

use crate::renderer::{DEFAULT_BACKGROUND, RenderContext, RenderResult, Renderer, RendererError};
use kurbo::{Point, Rect, Size};
use peniko::Color;
use scribboard_core::{InkColor, InkSurface, InkStyle, Stroke, ViewTransform};
use tiny_skia::{
    BlendMode, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint, Transform,
};

/// Raster drawing surface.
pub struct RasterRenderer {
    base: Pixmap,
    live: Pixmap,
    background: Color,
}

impl RasterRenderer {
    /// Create a surface of `width` x `height` pixels.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        Self::with_background(width, height, DEFAULT_BACKGROUND)
    }

    pub fn with_background(width: u32, height: u32, background: Color) -> RenderResult<Self> {
        let (base, live) = allocate(width, height)?;
        let mut renderer = Self { base, live, background };
        renderer.base.fill(skia_color(background));
        Ok(renderer)
    }

    pub fn width(&self) -> u32 {
        self.base.width()
    }

    pub fn height(&self) -> u32 {
        self.base.height()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width() as f64, self.height() as f64)
    }

    pub fn background(&self) -> Color {
        self.background
    }

    /// Full re-render of committed strokes with the current background.
    pub fn render_all(&mut self, strokes: &[Stroke], view: &ViewTransform) {
        let ctx = RenderContext::new(strokes, self.size())
            .with_view(*view)
            .with_background(self.background);
        self.paint_base(&ctx);
    }

    fn paint_base(&mut self, ctx: &RenderContext) {
        self.background = ctx.background_color;
        self.base.fill(skia_color(self.background));
        self.live.fill(tiny_skia::Color::TRANSPARENT);

        for stroke in ctx.strokes {
            let color = if stroke.is_eraser() {
                self.background
            } else {
                Color::from(stroke.color())
            };
            let points: Vec<Point> = stroke.positions().collect();
            draw_polyline(&mut self.base, &points, color, stroke.width(), &ctx.view);
        }
        log::debug!("Rendered {} strokes", ctx.strokes.len());
    }

    /// Live layer composited over the base layer.
    pub fn composite(&self) -> Pixmap {
        let mut out = self.base.clone();
        out.draw_pixmap(
            0,
            0,
            self.live.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        out
    }

    /// Straight-alpha RGBA of the composited surface.
    pub fn to_rgba(&self) -> Vec<u8> {
        unpremultiply_alpha(self.composite().data())
    }

    /// Composited color at a pixel, if inside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<InkColor> {
        let composite = self.composite();
        let px = composite.pixel(x, y)?.demultiply();
        Some(InkColor::new(px.red(), px.green(), px.blue()))
    }

    /// Encode the composited surface as PNG.
    pub fn encode_png(&self) -> RenderResult<Vec<u8>> {
        encode_png(&self.to_rgba(), self.width(), self.height())
    }
}

impl Renderer for RasterRenderer {
    fn render(&mut self, ctx: &RenderContext) -> RenderResult<()> {
        let (width, height) = (ctx.viewport_size.width, ctx.viewport_size.height);
        if width.round() as u32 != self.width() || height.round() as u32 != self.height() {
            self.resize(width.round() as u32, height.round() as u32)?;
        }
        self.paint_base(ctx);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let (base, live) = allocate(width, height)?;
        self.base = base;
        self.live = live;
        self.base.fill(skia_color(self.background));
        Ok(())
    }
}

impl InkSurface for RasterRenderer {
    fn draw_segment(&mut self, from: Point, to: Point, style: &InkStyle, view: &ViewTransform) {
        let color = if style.is_eraser {
            self.background
        } else {
            Color::from(style.color)
        };
        draw_polyline(&mut self.live, &[from, to], color, style.width, view);
    }

    fn clear_region(&mut self, region: Rect, view: &ViewTransform) {
        let screen = view.transform().transform_rect_bbox(region);
        let Some(rect) = tiny_skia::Rect::from_ltrb(
            screen.x0 as f32,
            screen.y0 as f32,
            screen.x1 as f32,
            screen.y1 as f32,
        ) else {
            return;
        };

        let mut paint = Paint::default();
        paint.blend_mode = BlendMode::Source;
        paint.set_color(skia_color(self.background));
        self.base.fill_rect(rect, &paint, Transform::identity(), None);
        paint.set_color(tiny_skia::Color::TRANSPARENT);
        self.live.fill_rect(rect, &paint, Transform::identity(), None);
    }
}

fn allocate(width: u32, height: u32) -> RenderResult<(Pixmap, Pixmap)> {
    let pixmap = || {
        Pixmap::new(width, height).ok_or_else(|| {
            RendererError::InitFailed(format!("Invalid surface size {}x{}", width, height))
        })
    };
    Ok((pixmap()?, pixmap()?))
}

fn skia_color(color: Color) -> tiny_skia::Color {
    let rgba = color.to_rgba8();
    tiny_skia::Color::from_rgba8(rgba.r, rgba.g, rgba.b, rgba.a)
}

/// Stroke a canvas-space polyline with round caps and joins.
fn draw_polyline(pixmap: &mut Pixmap, points: &[Point], color: Color, width: f64, view: &ViewTransform) {
    let Some(first) = points.first() else {
        return;
    };
    let transform = view.transform();
    let screen: Vec<Point> = points.iter().map(|p| transform * *p).collect();
    let screen_width = (width * view.scale()) as f32;

    let mut paint = Paint::default();
    paint.set_color(skia_color(color));
    paint.anti_alias = true;

    // A zero-length path draws nothing, so a tap becomes a dot.
    if points.iter().all(|p| p == first) {
        let center = screen[0];
        if let Some(dot) = PathBuilder::from_circle(center.x as f32, center.y as f32, screen_width / 2.0) {
            pixmap.fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
        }
        return;
    }

    let mut builder = PathBuilder::new();
    builder.move_to(screen[0].x as f32, screen[0].y as f32);
    for p in &screen[1..] {
        builder.line_to(p.x as f32, p.y as f32);
    }
    let Some(path) = builder.finish() else {
        return;
    };

    let stroke = tiny_skia::Stroke {
        width: screen_width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Default::default()
    };
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
}

/// Convert premultiplied alpha to straight alpha.
fn unpremultiply_alpha(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    for chunk in data.chunks_exact(4) {
        let a = chunk[3] as f32 / 255.0;
        if a > 0.0 {
            let r = (chunk[0] as f32 / a).min(255.0) as u8;
            let g = (chunk[1] as f32 / a).min(255.0) as u8;
            let b = (chunk[2] as f32 / a).min(255.0) as u8;
            result.extend_from_slice(&[r, g, b, chunk[3]]);
        } else {
            result.extend_from_slice(&[0, 0, 0, 0]);
        }
    }
    result
}

/// Encode RGBA pixel data to PNG bytes.
pub fn encode_png(rgba_data: &[u8], width: u32, height: u32) -> RenderResult<Vec<u8>> {
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder
            .write_header()
            .map_err(|e| RendererError::Encode(format!("PNG header: {}", e)))?;
        writer
            .write_image_data(rgba_data)
            .map_err(|e| RendererError::Encode(format!("PNG data: {}", e)))?;
    }
    Ok(png_data)
}
