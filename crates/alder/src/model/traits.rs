//! Core traits for the model/view architecture.
//!
//! This module defines the interface a data model must implement for the
//! tree view to display it, plus the notification signals views subscribe
//! to and the optional drag-and-drop capabilities.

use alder_core::Signal;

use super::path::TreePath;

/// An opaque cursor into a model.
///
/// Iterators are produced and consumed by the model that minted them; the
/// `stamp` lets a model reject iterators from a previous generation of its
/// data (after a reset or, for models without persistent iterators, after
/// any mutation). Views treat iterators as short-lived unless the model
/// advertises [`ModelFlags::iters_persist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeIter {
    /// Generation stamp of the minting model.
    pub stamp: i32,
    /// Model-private payload.
    pub user_data: u64,
}

/// Capabilities a model advertises to views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelFlags {
    /// Iterators survive model mutations (the model updates them in place
    /// or they reference stable storage).
    pub iters_persist: bool,
    /// The model is flat; no row ever has children. Views can skip
    /// expander space entirely.
    pub list_only: bool,
}

/// A single cell's data.
///
/// A closed set of value types is enough here; models needing richer
/// payloads keep them behind [`CellValue::Text`] keys or in side tables.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Rendered form used by type-ahead search and debug dumps.
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// The interface the tree view consumes its data through.
///
/// Methods take `&self`; mutable models use interior mutability so that
/// views, row references and application code can all hold shared
/// references. A conforming model must emit the appropriate
/// [`ModelSignals`] notification after every structural mutation, in the
/// order the mutations happen.
pub trait TreeModel {
    /// Capability flags. Constant for the lifetime of the model.
    fn flags(&self) -> ModelFlags;

    /// Number of columns every row exposes.
    fn n_columns(&self) -> usize;

    /// Resolve a path to an iterator. `None` when the path addresses no
    /// existing row.
    fn iter_from_path(&self, path: &TreePath) -> Option<TreeIter>;

    /// The path of the row an iterator points at. `None` for a stale
    /// iterator.
    fn path_from_iter(&self, iter: &TreeIter) -> Option<TreePath>;

    /// The value in `column` of the row at `iter`.
    fn value(&self, iter: &TreeIter, column: usize) -> Option<CellValue>;

    /// Advance to the next sibling in place. Returns `false` (leaving the
    /// iterator unspecified) when there is none.
    fn iter_next(&self, iter: &mut TreeIter) -> bool;

    /// First child of `parent`, or first top-level row when `parent` is
    /// `None`.
    fn iter_children(&self, parent: Option<&TreeIter>) -> Option<TreeIter>;

    /// Whether the row has at least one child.
    fn iter_has_child(&self, iter: &TreeIter) -> bool;

    /// Number of children of `iter`, or of the top level for `None`.
    fn iter_n_children(&self, iter: Option<&TreeIter>) -> usize;

    /// `n`-th (0-based) child of `iter`, or of the top level for `None`.
    fn iter_nth_child(&self, iter: Option<&TreeIter>, n: usize) -> Option<TreeIter>;

    /// Parent row of `iter`, or `None` at the top level.
    fn iter_parent(&self, iter: &TreeIter) -> Option<TreeIter>;

    /// The notification signals views subscribe to.
    fn signals(&self) -> &ModelSignals;

    /// Drag-source capability, if the model supports dragging rows out.
    fn drag_source(&self) -> Option<&dyn RowDragSource> {
        None
    }

    /// Drag-destination capability, if the model accepts dropped rows.
    fn drag_dest(&self) -> Option<&dyn RowDragDest> {
        None
    }
}

/// Notifications a model emits after mutating.
///
/// Emission order contract: `row_inserted` fires after the row exists
/// (values may still be unset), `row_deleted` after it is gone, and
/// `rows_reordered` after the permutation is applied; paths in every
/// signal describe positions in the *new* arrangement except
/// `row_deleted`, whose path is the position the row had.
pub struct ModelSignals {
    /// A row's values changed. Args: (path, iter).
    pub row_changed: Signal<(TreePath, TreeIter)>,
    /// A row was inserted. Args: (path of the new row, iter).
    pub row_inserted: Signal<(TreePath, TreeIter)>,
    /// A row gained its first child or lost its last one. Args: (path, iter).
    pub row_has_child_toggled: Signal<(TreePath, TreeIter)>,
    /// A row was deleted. Args: the path the row occupied.
    pub row_deleted: Signal<TreePath>,
    /// The children of one parent were permuted. Args: (parent path, empty
    /// for the top level; `new_order` with `new_order[new_pos] = old_pos`).
    pub rows_reordered: Signal<(TreePath, Vec<usize>)>,
}

impl Default for ModelSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSignals {
    pub fn new() -> Self {
        Self {
            row_changed: Signal::new(),
            row_inserted: Signal::new(),
            row_has_child_toggled: Signal::new(),
            row_deleted: Signal::new(),
            rows_reordered: Signal::new(),
        }
    }

    pub fn emit_row_changed(&self, path: TreePath, iter: TreeIter) {
        self.row_changed.emit((path, iter));
    }

    pub fn emit_row_inserted(&self, path: TreePath, iter: TreeIter) {
        self.row_inserted.emit((path, iter));
    }

    pub fn emit_row_has_child_toggled(&self, path: TreePath, iter: TreeIter) {
        self.row_has_child_toggled.emit((path, iter));
    }

    pub fn emit_row_deleted(&self, path: TreePath) {
        self.row_deleted.emit(path);
    }

    pub fn emit_rows_reordered(&self, parent: TreePath, new_order: Vec<usize>) {
        self.rows_reordered.emit((parent, new_order));
    }
}

/// The serialized form of a dragged row.
///
/// Row drags within one view stay in-process, so the payload is just the
/// source model's identity-free path plus enough to re-query the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowData {
    /// Path of the dragged row in the source model at drag start.
    pub path: TreePath,
}

/// Capability: the model's rows can be dragged out.
pub trait RowDragSource {
    /// Whether the row at `path` may start a drag.
    fn row_draggable(&self, path: &TreePath) -> bool;

    /// Serialize the row at `path` for a drag. `None` refuses the drag.
    fn drag_data_get(&self, path: &TreePath) -> Option<RowData>;

    /// Delete the row at `path` after a successful move. Returns `false`
    /// when the row no longer exists.
    fn drag_data_delete(&self, path: &TreePath) -> bool;
}

/// Capability: the model accepts dropped rows.
pub trait RowDragDest {
    /// Whether `data` could be inserted at `dest`, where `dest` names the
    /// position the new row would occupy.
    fn row_drop_possible(&self, dest: &TreePath, data: &RowData) -> bool;

    /// Insert `data` so that it occupies `dest`. Returns `false` when the
    /// drop could not be performed; the model must be unchanged in that
    /// case.
    fn drag_data_received(&self, dest: &TreePath, data: &RowData) -> bool;
}
