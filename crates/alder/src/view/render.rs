//! The painting seam.
//!
//! The view never touches a platform surface directly; it paints through
//! the [`Renderer`] trait, which also answers cell measurement queries for
//! the validator. [`HeadlessRenderer`] is a deterministic implementation
//! with fixed font metrics that records every operation, used by the test
//! suites and useful for golden-output debugging.

use crate::geom::{Point, Rect, Size};
use crate::model::CellValue;

/// Semantic role of a painted primitive; the renderer maps roles to its
/// theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintRole {
    /// Even-row background.
    Background,
    /// Odd-row background, when the theme stripes rows.
    BackgroundAlternate,
    /// Selected-row background.
    Selection,
    /// A row-separator row.
    Separator,
    GridLine,
    TreeLine,
    /// Expander arrow. `phase` runs 0..=2 during animation; 2 is fully at
    /// rest in the `expanded` direction.
    Expander { expanded: bool, phase: u8 },
    /// The rubber-band rectangle overlay.
    RubberBand,
    /// The drop-position indicator line or box.
    DropIndicator,
}

/// Cell measurement backend. Split from [`Renderer`] because the
/// incremental validator measures outside any paint cycle; the view keeps
/// a shared handle to this half only.
pub trait CellMeasure {
    /// Natural size of a cell rendering `value`. Must be consistent for
    /// equal values; the validator caches the results in row heights and
    /// column width requests.
    fn measure_cell(&self, value: Option<&CellValue>) -> Size;
}

/// Drawing backend the view paints through.
pub trait Renderer: CellMeasure {
    fn fill_rect(&mut self, rect: Rect, role: PaintRole);

    fn draw_line(&mut self, from: Point, to: Point, role: PaintRole);

    /// Draw a cell's text at `pos` (top-left of the cell's content box).
    fn draw_text(&mut self, pos: Point, text: &str, selected: bool);
}

/// A recorded paint operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintOp {
    FillRect(Rect, PaintRole),
    Line(Point, Point, PaintRole),
    Text(Point, String, bool),
}

/// Renderer with fixed glyph metrics that records what was painted.
pub struct HeadlessRenderer {
    /// Width of every glyph.
    pub char_width: i32,
    /// Height of a line of text.
    pub line_height: i32,
    /// Padding added around a cell's text on each side.
    pub cell_padding: i32,
    /// Everything painted, in order.
    pub ops: Vec<PaintOp>,
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self {
            char_width: 7,
            line_height: 16,
            cell_padding: 2,
            ops: Vec::new(),
        }
    }
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

impl CellMeasure for HeadlessRenderer {
    fn measure_cell(&self, value: Option<&CellValue>) -> Size {
        let chars = value.map_or(0, |v| v.display_text().chars().count() as i32);
        Size::new(
            chars * self.char_width + 2 * self.cell_padding,
            self.line_height + 2 * self.cell_padding,
        )
    }
}

impl Renderer for HeadlessRenderer {
    fn fill_rect(&mut self, rect: Rect, role: PaintRole) {
        self.ops.push(PaintOp::FillRect(rect, role));
    }

    fn draw_line(&mut self, from: Point, to: Point, role: PaintRole) {
        self.ops.push(PaintOp::Line(from, to, role));
    }

    fn draw_text(&mut self, pos: Point, text: &str, selected: bool) {
        self.ops.push(PaintOp::Text(pos, text.to_string(), selected));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_measure() {
        let r = HeadlessRenderer::new();
        let s = r.measure_cell(Some(&CellValue::Text("abcd".into())));
        assert_eq!(s, Size::new(4 * 7 + 4, 16 + 4));
        assert_eq!(r.measure_cell(None), Size::new(4, 20));
    }

    #[test]
    fn test_headless_records_ops() {
        let mut r = HeadlessRenderer::new();
        r.fill_rect(Rect::new(0, 0, 10, 10), PaintRole::Background);
        r.draw_text(Point::new(2, 2), "hi", false);
        assert_eq!(r.ops.len(), 2);
        r.clear();
        assert!(r.ops.is_empty());
    }
}
