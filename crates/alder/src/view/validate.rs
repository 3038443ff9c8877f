//! Incremental row validation.
//!
//! Row heights are computed lazily: mutations only mark rows invalid, and
//! this module walks the dirty subtrees recomputing heights until a
//! wall-clock budget runs out, yielding back to the event loop in between.
//! The aggregate `DESCENDANTS_INVALID` bits make locating the next dirty
//! row O(log n), so a single large mutation never forces a full measure
//! pass before the next paint.
//!
//! The eager path ([`validate_visible`]) ignores the budget and validates
//! just enough rows to answer "what is on screen right now"; the view uses
//! it on realize and for scroll-to-cell.

use std::time::{Duration, Instant};

use crate::model::{TreeIter, TreeModel};
use crate::view::column::Column;
use crate::view::rbtree::{LevelId, RowFlags, RowId, RowTree};
use crate::view::render::CellMeasure;

/// Wall-clock budget for one incremental validation slice.
pub const VALIDATE_BUDGET: Duration = Duration::from_millis(30);

/// Height of a row the separator predicate claims.
pub const SEPARATOR_HEIGHT: i32 = 2;

/// Predicate marking rows that render as thin separators.
pub type RowSeparatorFn = Box<dyn Fn(&dyn TreeModel, &TreeIter) -> bool>;

/// Per-view measurement constants fed into row validation.
#[derive(Debug, Clone, Copy)]
pub struct ValidateConfig {
    /// Vertical padding added to every measured row height.
    pub vertical_separator: i32,
    /// Horizontal indentation per tree depth level, charged to the first
    /// visible column.
    pub indent_per_level: i32,
    /// Width reserved for the expander glyph in the first visible column.
    pub expander_size: i32,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            vertical_separator: 2,
            indent_per_level: 12,
            expander_size: 14,
        }
    }
}

/// Result of one validation slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationOutcome {
    /// Rows whose height was recomputed.
    pub validated: usize,
    /// Whether any row height actually changed (scroll extents moved).
    pub height_changed: bool,
    /// Whether dirty rows remain after the slice.
    pub remaining: bool,
}

/// Leftmost dirty row in full visual order, located via the aggregate
/// dirty bits without scanning clean subtrees.
pub fn first_invalid(tree: &RowTree) -> Option<(LevelId, RowId)> {
    let mut level = tree.root_level();
    let mut node = tree.level_root(level)?;
    if !tree.flag_set(node, RowFlags::DESCENDANTS_INVALID) {
        return None;
    }
    loop {
        if let Some(l) = tree.left_child(node)
            && tree.flag_set(l, RowFlags::DESCENDANTS_INVALID)
        {
            node = l;
            continue;
        }
        if tree.flag_set(node, RowFlags::INVALID) || tree.flag_set(node, RowFlags::COLUMN_INVALID)
        {
            return Some((level, node));
        }
        if let Some(children) = tree.node_children(node)
            && let Some(child_root) = tree.level_root(children)
            && tree.flag_set(child_root, RowFlags::DESCENDANTS_INVALID)
        {
            level = children;
            node = child_root;
            continue;
        }
        if let Some(r) = tree.right_child(node)
            && tree.flag_set(r, RowFlags::DESCENDANTS_INVALID)
        {
            node = r;
            continue;
        }
        // Aggregate bit set with no dirty row below it; the caches are
        // inconsistent. Report nothing rather than loop.
        tracing::error!(target: "alder::validate", "dirty bit with no dirty descendant");
        return None;
    }
}

/// Measure one row and store its height. Returns whether the height
/// changed. Clears the row's dirty bits even on model desync, so a broken
/// model cannot wedge the validator.
pub fn validate_row(
    tree: &mut RowTree,
    model: &dyn TreeModel,
    renderer: &dyn CellMeasure,
    columns: &mut [Column],
    separator: Option<&RowSeparatorFn>,
    config: &ValidateConfig,
    level: LevelId,
    node: RowId,
) -> bool {
    let path = tree.find_path(level, node);
    let Some(iter) = model.iter_from_path(&path) else {
        tracing::error!(
            target: "alder::validate",
            %path,
            "cached row has no model row; marking valid to avoid livelock"
        );
        tree.mark_valid(level, node);
        return false;
    };

    let old_height = tree.node_height(node);
    let depth = tree.level_depth(level) as i32;

    let height = if separator.is_some_and(|f| f(model, &iter)) {
        SEPARATOR_HEIGHT
    } else {
        let mut height = 0;
        let mut first_visible = true;
        for col in columns.iter_mut() {
            if !col.is_visible() {
                continue;
            }
            let value = model.value(&iter, col.model_column());
            let size = renderer.measure_cell(value.as_ref());
            let mut width = size.width;
            if first_visible {
                // Depth indentation and the expander glyph live in the
                // first visible column.
                width += depth * config.indent_per_level + config.expander_size;
                first_visible = false;
            }
            col.request_cell_width(width);
            height = height.max(size.height);
        }
        (height + config.vertical_separator).max(1)
    };

    tree.mark_valid(level, node);
    if height != old_height {
        tree.set_node_height(level, node, height);
        true
    } else {
        false
    }
}

/// One budgeted validation slice: validate dirty rows in visual order
/// until none remain or the deadline passes.
#[tracing::instrument(skip_all, target = "alder::validate", level = "debug")]
pub fn validate_rows(
    tree: &mut RowTree,
    model: &dyn TreeModel,
    renderer: &dyn CellMeasure,
    columns: &mut [Column],
    separator: Option<&RowSeparatorFn>,
    config: &ValidateConfig,
    deadline: Instant,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();
    loop {
        let Some((level, node)) = first_invalid(tree) else {
            break;
        };
        outcome.height_changed |=
            validate_row(tree, model, renderer, columns, separator, config, level, node);
        outcome.validated += 1;
        if Instant::now() >= deadline {
            outcome.remaining = first_invalid(tree).is_some();
            break;
        }
    }
    tracing::debug!(
        target: "alder::validate",
        validated = outcome.validated,
        remaining = outcome.remaining,
        "validation slice"
    );
    outcome
}

/// Validate exactly the rows intersecting the viewport, ignoring the time
/// budget. `top_y` is the tree y of the first visible pixel. Returns
/// whether any height changed.
pub fn validate_visible(
    tree: &mut RowTree,
    model: &dyn TreeModel,
    renderer: &dyn CellMeasure,
    columns: &mut [Column],
    separator: Option<&RowSeparatorFn>,
    config: &ValidateConfig,
    top_y: i32,
    viewport_height: i32,
) -> bool {
    let total = tree.total_height();
    if total == 0 || viewport_height <= 0 {
        return false;
    }
    let top_y = top_y.clamp(0, total - 1);
    let Some((mut level, mut node, within)) = tree.find_offset(top_y) else {
        return false;
    };

    let mut changed = false;
    // Remaining pixels to cover, counting from the top of the first row so
    // a height change of that row still fills the viewport.
    let mut remaining = viewport_height + within;
    loop {
        if tree.flag_set(node, RowFlags::INVALID) || tree.flag_set(node, RowFlags::COLUMN_INVALID)
        {
            changed |=
                validate_row(tree, model, renderer, columns, separator, config, level, node);
        }
        remaining -= tree.node_height(node);
        if remaining <= 0 {
            break;
        }
        match tree.next_full(level, node) {
            Some((l, n)) => {
                level = l;
                node = n;
            }
            None => break,
        }
    }
    changed
}
