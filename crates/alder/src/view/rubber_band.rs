//! Rubber-band (marquee) selection.
//!
//! Tracks the drag rectangle in tree coordinates and incrementally diffs
//! the range of rows it covers: each motion event yields only the rows
//! that entered or left the band since the previous event, so applying
//! selection semantics is O(rows crossing the boundary) rather than
//! O(band size). The view applies the semantics (select, or toggle when
//! the modify modifier was held at press time) and emits one
//! selection-changed notification at release.

use crate::geom::{Point, Rect};
use crate::view::rbtree::{LevelId, RowId, RowTree};

/// Pixels of motion before a pressed button becomes a band drag rather
/// than a click.
pub const DRAG_THRESHOLD: i32 = 4;

/// Gesture phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RubberBandStatus {
    /// No gesture.
    #[default]
    Off,
    /// Button pressed on empty space; waiting to cross the drag threshold.
    MaybeStart,
    /// Band visible and selecting.
    Active,
}

/// Rows that crossed the band boundary in one motion step.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RangeDiff {
    pub entered: Vec<(LevelId, RowId)>,
    pub left: Vec<(LevelId, RowId)>,
}

/// One rubber-band gesture.
#[derive(Default)]
pub struct RubberBand {
    status: RubberBandStatus,
    /// Anchor corner, tree coordinates.
    start: Point,
    /// Current pointer, tree coordinates.
    current: Point,
    /// Toggle semantics (modify modifier held at press).
    modify: bool,
    /// Keep the pre-existing selection (extend modifier held at press).
    extend: bool,
    /// Row range covered before the last update.
    range: Option<((LevelId, RowId), (LevelId, RowId))>,
}

impl RubberBand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RubberBandStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == RubberBandStatus::Active
    }

    pub fn modify(&self) -> bool {
        self.modify
    }

    pub fn extend(&self) -> bool {
        self.extend
    }

    /// Arm the gesture at a press position (tree coordinates).
    pub fn arm(&mut self, start: Point, modify: bool, extend: bool) {
        self.status = RubberBandStatus::MaybeStart;
        self.start = start;
        self.current = start;
        self.modify = modify;
        self.extend = extend;
        self.range = None;
    }

    /// Note pointer motion; activates the band once the threshold is
    /// crossed. Returns whether the band is (now) active.
    pub fn motion(&mut self, pos: Point) -> bool {
        match self.status {
            RubberBandStatus::Off => false,
            RubberBandStatus::MaybeStart => {
                if (pos.x - self.start.x).abs() > DRAG_THRESHOLD
                    || (pos.y - self.start.y).abs() > DRAG_THRESHOLD
                {
                    self.status = RubberBandStatus::Active;
                    self.current = pos;
                    true
                } else {
                    false
                }
            }
            RubberBandStatus::Active => {
                self.current = pos;
                true
            }
        }
    }

    /// The band rectangle in tree coordinates.
    pub fn rect(&self) -> Rect {
        Rect::from_corners(self.start, self.current)
    }

    /// End or cancel the gesture. The accumulated range is forgotten; any
    /// selection already applied stays as the view left it.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Recompute the covered row range from the current rectangle and
    /// return the rows that entered or left since the previous call.
    pub fn update_range(&mut self, tree: &RowTree) -> RangeDiff {
        let rect = self.rect();
        let new_range = covered_range(tree, rect.y, rect.bottom());
        let diff = diff_ranges(tree, self.range, new_range);
        self.range = new_range;
        diff
    }

    /// Drop the remembered row range without ending the gesture. Called
    /// after structural mutations that may have freed the remembered row
    /// handles; the next motion recomputes the full covered range.
    pub fn forget_range(&mut self) {
        self.range = None;
    }

    /// Boundary rows of the current range (band start row, band end row),
    /// used at release to place anchor and cursor.
    pub fn range_endpoints(&self) -> Option<((LevelId, RowId), (LevelId, RowId))> {
        self.range
    }
}

/// The first and last rows whose extent intersects `[y0, y1)` in tree
/// coordinates, or `None` when the span covers no rows.
fn covered_range(
    tree: &RowTree,
    y0: i32,
    y1: i32,
) -> Option<((LevelId, RowId), (LevelId, RowId))> {
    let total = tree.total_height();
    if total == 0 || y1 <= 0 || y0 >= total || y1 <= y0 {
        return None;
    }
    let (sl, sn, _) = tree.find_offset(y0.max(0))?;
    // y1 is exclusive; the row containing y1-1 is the last covered one.
    let (el, en, _) = tree.find_offset((y1 - 1).min(total - 1))?;
    Some(((sl, sn), (el, en)))
}

fn walk_inclusive(
    tree: &RowTree,
    start: (LevelId, RowId),
    end: (LevelId, RowId),
    out: &mut Vec<(LevelId, RowId)>,
) {
    let mut pos = Some(start);
    while let Some((level, node)) = pos {
        out.push((level, node));
        if (level, node) == end {
            break;
        }
        pos = tree.next_full(level, node);
    }
}

fn diff_ranges(
    tree: &RowTree,
    old: Option<((LevelId, RowId), (LevelId, RowId))>,
    new: Option<((LevelId, RowId), (LevelId, RowId))>,
) -> RangeDiff {
    let mut diff = RangeDiff::default();
    let off = |(l, n): (LevelId, RowId)| tree.node_find_offset(l, n);

    match (old, new) {
        (None, None) => {}
        (None, Some((ns, ne))) => walk_inclusive(tree, ns, ne, &mut diff.entered),
        (Some((os, oe)), None) => walk_inclusive(tree, os, oe, &mut diff.left),
        (Some((os, oe)), Some((ns, ne))) => {
            let (os_o, oe_o, ns_o, ne_o) = (off(os), off(oe), off(ns), off(ne));
            if ne_o < os_o || ns_o > oe_o {
                // Disjoint; rare (a huge pointer jump), fall back to full
                // walks of both ranges.
                walk_inclusive(tree, os, oe, &mut diff.left);
                walk_inclusive(tree, ns, ne, &mut diff.entered);
                return diff;
            }
            // Top boundary.
            if ns_o < os_o {
                if let Some(stop) = tree.prev_full(os.0, os.1) {
                    walk_inclusive(tree, ns, stop, &mut diff.entered);
                }
            } else if ns_o > os_o {
                if let Some(stop) = tree.prev_full(ns.0, ns.1) {
                    walk_inclusive(tree, os, stop, &mut diff.left);
                }
            }
            // Bottom boundary.
            if ne_o > oe_o {
                if let Some(start) = tree.next_full(oe.0, oe.1) {
                    walk_inclusive(tree, start, ne, &mut diff.entered);
                }
            } else if ne_o < oe_o {
                if let Some(start) = tree.next_full(ne.0, ne.1) {
                    walk_inclusive(tree, start, oe, &mut diff.left);
                }
            }
        }
    }
    diff
}
