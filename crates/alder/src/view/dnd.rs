//! Row drag-and-drop support.
//!
//! The view computes a [`DropPosition`] from where the pointer sits inside
//! the hovered row, highlights it, and at drop time turns it into the
//! insertion path handed to the destination model. Hovering a collapsed
//! parent arms a one-shot auto-expand timer, and dragging near the top or
//! bottom edge of the viewport produces an auto-scroll velocity; both
//! timers live on the view's scheduler and are cancelled on drag-leave.

use std::time::Duration;

use crate::model::TreePath;

/// Hover time over a collapsed parent before it auto-expands.
pub const OPEN_DEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Auto-scroll tick interval while dragging near an edge.
pub const SCROLL_TIMEOUT: Duration = Duration::from_millis(150);

/// Height of the edge zones that trigger auto-scrolling.
pub const SCROLL_EDGE_SIZE: i32 = 15;

/// Where a drop lands relative to the hovered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPosition {
    /// Insert as the sibling before the row.
    Before,
    /// Insert as the sibling after the row.
    After,
    /// Prefer making it a child; fall back to the sibling before.
    IntoOrBefore,
    /// Prefer making it a child; fall back to the sibling after.
    IntoOrAfter,
}

impl DropPosition {
    /// Whether this position targets the row's children.
    pub fn is_into(self) -> bool {
        matches!(self, DropPosition::IntoOrBefore | DropPosition::IntoOrAfter)
    }
}

/// Classify a pointer offset within a row of the given height: the top
/// third drops before, the bottom third after, and the middle drops into,
/// leaning before or after by which half of the row the pointer is in.
pub fn drop_position_for_offset(offset: i32, height: i32) -> DropPosition {
    if height <= 0 {
        return DropPosition::Before;
    }
    let third = height / 3;
    if offset < third {
        DropPosition::Before
    } else if offset >= height - third {
        DropPosition::After
    } else if offset < height / 2 {
        DropPosition::IntoOrBefore
    } else {
        DropPosition::IntoOrAfter
    }
}

/// The path a dropped row should occupy, as handed to
/// [`RowDragDest::drag_data_received`](crate::model::RowDragDest).
///
/// `Before` inserts at the hovered row's own position, `After` at the
/// next sibling position, and both `Into` variants insert as the first
/// child.
pub fn insertion_path(dest: &TreePath, pos: DropPosition) -> TreePath {
    match pos {
        DropPosition::Before => dest.clone(),
        DropPosition::After => {
            let mut p = dest.clone();
            p.next();
            p
        }
        DropPosition::IntoOrBefore | DropPosition::IntoOrAfter => dest.child(0),
    }
}

/// Vertical auto-scroll velocity for a pointer at `y` in a viewport of
/// the given height: negative when the pointer is in the top edge zone,
/// positive in the bottom one, scaled by how deep into the zone it is.
pub fn autoscroll_velocity(y: i32, viewport_height: i32) -> i32 {
    if viewport_height <= 2 * SCROLL_EDGE_SIZE {
        return 0;
    }
    if y < SCROLL_EDGE_SIZE {
        y - SCROLL_EDGE_SIZE
    } else if y >= viewport_height - SCROLL_EDGE_SIZE {
        y - (viewport_height - SCROLL_EDGE_SIZE) + 1
    } else {
        0
    }
}

/// Highlighted drop target while a drag hovers the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestRow {
    pub path: TreePath,
    pub pos: DropPosition,
}

/// State of a drag gesture originating in or hovering over the view.
#[derive(Debug, Default)]
pub struct DragState {
    /// Source row armed by a button press, before the drag threshold.
    pub pressed_path: Option<TreePath>,
    /// The drag left the press threshold and is live.
    pub active: bool,
    /// Current highlighted destination.
    pub dest: Option<DestRow>,
    /// Collapsed parent the auto-expand timer is armed for.
    pub open_dest_path: Option<TreePath>,
}

impl DragState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all transient state (drag-leave, drop, or cancel).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> TreePath {
        s.parse().unwrap()
    }

    #[test]
    fn test_thirds_of_a_row() {
        // Height 30: thirds at 10 and 20, halves at 15.
        assert_eq!(drop_position_for_offset(0, 30), DropPosition::Before);
        assert_eq!(drop_position_for_offset(9, 30), DropPosition::Before);
        assert_eq!(drop_position_for_offset(10, 30), DropPosition::IntoOrBefore);
        assert_eq!(drop_position_for_offset(14, 30), DropPosition::IntoOrBefore);
        assert_eq!(drop_position_for_offset(15, 30), DropPosition::IntoOrAfter);
        assert_eq!(drop_position_for_offset(19, 30), DropPosition::IntoOrAfter);
        assert_eq!(drop_position_for_offset(20, 30), DropPosition::After);
        assert_eq!(drop_position_for_offset(29, 30), DropPosition::After);
    }

    #[test]
    fn test_insertion_paths() {
        assert_eq!(insertion_path(&p("1:2"), DropPosition::Before), p("1:2"));
        assert_eq!(insertion_path(&p("1:2"), DropPosition::After), p("1:3"));
        assert_eq!(
            insertion_path(&p("1:2"), DropPosition::IntoOrBefore),
            p("1:2:0")
        );
        assert_eq!(
            insertion_path(&p("1:2"), DropPosition::IntoOrAfter),
            p("1:2:0")
        );
    }

    #[test]
    fn test_autoscroll_zones() {
        let h = 200;
        assert!(autoscroll_velocity(0, h) < 0);
        assert!(autoscroll_velocity(SCROLL_EDGE_SIZE - 1, h) < 0);
        assert_eq!(autoscroll_velocity(SCROLL_EDGE_SIZE, h), 0);
        assert_eq!(autoscroll_velocity(100, h), 0);
        assert!(autoscroll_velocity(h - 1, h) > 0);
        // Deeper into the zone scrolls faster.
        assert!(autoscroll_velocity(0, h) < autoscroll_velocity(10, h));
    }

    #[test]
    fn test_tiny_viewport_never_autoscrolls() {
        assert_eq!(autoscroll_velocity(0, 20), 0);
        assert_eq!(autoscroll_velocity(19, 20), 0);
    }
}
