//! Coordinate spaces.
//!
//! The view works in three vertical coordinate spaces, each an additive
//! transform of the next:
//!
//! - **tree**: origin at the top of the first row, extends over the total
//!   content height; independent of scrolling.
//! - **bin**: the scrollable drawing surface; `bin_y = tree_y - dy` where
//!   `dy` is the vertical scroll offset.
//! - **widget**: the full widget including the fixed header strip;
//!   `widget_y = bin_y + header_height`.
//!
//! Horizontally there are only two spaces: content x versus bin/widget x,
//! offset by the horizontal scroll position.

use crate::geom::{Point, Rect};

/// The view's current scroll state and header metrics; pure data, so the
/// transforms stay trivially testable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Coords {
    /// Vertical scroll offset: tree y of the first visible bin pixel.
    pub dy: i32,
    /// Horizontal scroll offset.
    pub hoffset: i32,
    /// Height of the header strip above the bin.
    pub header_height: i32,
}

impl Coords {
    pub fn tree_to_bin_y(&self, y: i32) -> i32 {
        y - self.dy
    }

    pub fn bin_to_tree_y(&self, y: i32) -> i32 {
        y + self.dy
    }

    pub fn bin_to_widget_y(&self, y: i32) -> i32 {
        y + self.header_height
    }

    pub fn widget_to_bin_y(&self, y: i32) -> i32 {
        y - self.header_height
    }

    pub fn tree_to_widget_y(&self, y: i32) -> i32 {
        self.bin_to_widget_y(self.tree_to_bin_y(y))
    }

    pub fn widget_to_tree_y(&self, y: i32) -> i32 {
        self.bin_to_tree_y(self.widget_to_bin_y(y))
    }

    pub fn content_to_bin_x(&self, x: i32) -> i32 {
        x - self.hoffset
    }

    pub fn bin_to_content_x(&self, x: i32) -> i32 {
        x + self.hoffset
    }

    /// Widget point to (content x, tree y).
    pub fn widget_to_tree(&self, p: Point) -> Point {
        Point::new(self.bin_to_content_x(p.x), self.widget_to_tree_y(p.y))
    }

    /// (content x, tree y) to widget point.
    pub fn tree_to_widget(&self, p: Point) -> Point {
        Point::new(self.content_to_bin_x(p.x), self.tree_to_widget_y(p.y))
    }

    /// A row's rect from tree space into widget space.
    pub fn tree_rect_to_widget(&self, r: Rect) -> Rect {
        Rect::new(
            self.content_to_bin_x(r.x),
            self.tree_to_widget_y(r.y),
            r.width,
            r.height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_roundtrip() {
        let c = Coords {
            dy: 120,
            hoffset: 0,
            header_height: 24,
        };
        for y in [-50, 0, 1, 119, 120, 5000] {
            assert_eq!(c.widget_to_tree_y(c.tree_to_widget_y(y)), y);
            assert_eq!(c.bin_to_tree_y(c.tree_to_bin_y(y)), y);
        }
        assert_eq!(c.tree_to_widget_y(120), 24);
        assert_eq!(c.widget_to_tree_y(24), 120);
    }

    #[test]
    fn test_horizontal_roundtrip() {
        let c = Coords {
            dy: 0,
            hoffset: 33,
            header_height: 0,
        };
        assert_eq!(c.bin_to_content_x(c.content_to_bin_x(100)), 100);
        assert_eq!(c.content_to_bin_x(33), 0);
    }

    #[test]
    fn test_point_transforms() {
        let c = Coords {
            dy: 10,
            hoffset: 5,
            header_height: 20,
        };
        let p = Point::new(50, 100);
        assert_eq!(c.tree_to_widget(c.widget_to_tree(p)), p);
    }
}
