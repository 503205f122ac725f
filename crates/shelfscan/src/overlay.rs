//! Detection overlay rendering.
//!
//! The renderer draws onto a [`Surface`], a transparent layer aligned with the
//! video frame. Anything that can stroke paths and rectangles and place text
//! can be a surface; [`RecordingSurface`] keeps the draw calls in memory.

use crate::config::OverlayConfig;
use crate::scanner::{FrameResult, Point};

/// An axis-aligned rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

/// A drawing target aligned with the video frame.
pub trait Surface: Send {
    /// Surface size as `(width, height)`.
    fn size(&self) -> (f64, f64);

    /// Erase everything.
    fn clear(&mut self);

    /// Stroke a polyline through `points`, closing it when `closed` is set.
    fn stroke_path(&mut self, points: &[Point], closed: bool, color: &str, width: f64);

    /// Stroke the outline of `rect`.
    fn stroke_rect(&mut self, rect: Rect, color: &str, width: f64);

    /// Draw `text` centred horizontally on `at`.
    fn fill_text(&mut self, text: &str, at: Point, color: &str);

    /// Play the audible detection cue. Silent surfaces ignore it.
    fn cue(&mut self) {}
}

/// A single recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// The surface was cleared.
    Clear,
    /// A polyline was stroked.
    Path {
        /// Vertices.
        points: Vec<Point>,
        /// Whether the path was closed.
        closed: bool,
        /// Stroke colour.
        color: String,
        /// Line width.
        width: f64,
    },
    /// A rectangle was stroked.
    Rect {
        /// Rectangle.
        rect: Rect,
        /// Stroke colour.
        color: String,
        /// Line width.
        width: f64,
    },
    /// Text was drawn.
    Text {
        /// Text.
        text: String,
        /// Anchor point.
        at: Point,
        /// Fill colour.
        color: String,
    },
    /// The audible cue was played.
    Cue,
}

/// A surface that records draw calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSurface {
    width: f64,
    height: f64,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    /// Create a surface of the given size.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    /// Draw calls since the last clear, including the clear itself.
    #[must_use]
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Take the recorded calls, leaving the log empty.
    pub fn take_ops(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.ops.push(DrawOp::Clear);
    }

    fn stroke_path(&mut self, points: &[Point], closed: bool, color: &str, width: f64) {
        self.ops.push(DrawOp::Path {
            points: points.to_vec(),
            closed,
            color: color.to_string(),
            width,
        });
    }

    fn stroke_rect(&mut self, rect: Rect, color: &str, width: f64) {
        self.ops.push(DrawOp::Rect {
            rect,
            color: color.to_string(),
            width,
        });
    }

    fn fill_text(&mut self, text: &str, at: Point, color: &str) {
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            at,
            color: color.to_string(),
        });
    }

    fn cue(&mut self) {
        self.ops.push(DrawOp::Cue);
    }
}

/// Gap between the guide rectangle and its label.
const LABEL_OFFSET: f64 = 10.0;

/// Draws detection geometry and the alignment guide.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    config: OverlayConfig,
}

impl OverlayRenderer {
    /// Create a renderer with the given styling.
    #[must_use]
    pub fn new(config: OverlayConfig) -> Self {
        Self { config }
    }

    /// The guide rectangle for a surface of the given size, centred.
    #[must_use]
    pub fn guide_rect(&self, width: f64, height: f64) -> Rect {
        let guide_width = width * self.config.guide_width_ratio;
        let guide_height = height * self.config.guide_height_ratio;
        Rect {
            x: (width - guide_width) / 2.0,
            y: (height - guide_height) / 2.0,
            width: guide_width,
            height: guide_height,
        }
    }

    /// Redraw the overlay for one processed frame.
    ///
    /// `just_detected` selects the success variant of the guide and plays the
    /// audible cue.
    pub fn render<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        frame: Option<&FrameResult>,
        just_detected: bool,
    ) {
        surface.clear();

        if let Some(frame) = frame {
            let best = frame.best.as_ref();
            for candidate in frame.boxes.iter().filter(|b| Some(*b) != best) {
                self.stroke(surface, candidate, true, &self.config.candidate_color);
            }
            if let Some(best) = best {
                self.stroke(surface, best, true, &self.config.match_color);
            }
            if let (Some(_), Some(line)) = (&frame.code, &frame.line) {
                self.stroke(surface, line, false, &self.config.line_color);
            }
        }

        self.draw_guide(surface, just_detected);
        if just_detected {
            surface.cue();
        }
    }

    /// Erase the overlay.
    pub fn clear<S: Surface + ?Sized>(&self, surface: &mut S) {
        surface.clear();
    }

    fn stroke<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        points: &[Point],
        closed: bool,
        color: &str,
    ) {
        if points.len() < 2 {
            return;
        }
        surface.stroke_path(points, closed, color, self.config.path_line_width);
    }

    fn draw_guide<S: Surface + ?Sized>(&self, surface: &mut S, success: bool) {
        let (width, height) = surface.size();
        let rect = self.guide_rect(width, height);
        let (color, label) = if success {
            (&self.config.guide_success_color, &self.config.guide_success_label)
        } else {
            (&self.config.guide_color, &self.config.guide_label)
        };

        surface.stroke_rect(rect, color, self.config.guide_line_width);
        surface.fill_text(
            label,
            Point::new(width / 2.0, rect.y - LABEL_OFFSET),
            color,
        );
    }
}
