//! Model abstractions for the tree view.
//!
//! The view consumes data exclusively through the [`TreeModel`] trait and
//! its [`ModelSignals`] notifications; [`TreeStore`] is the bundled
//! concrete implementation. [`TreePath`] addresses rows logically,
//! [`TreeIter`] is the model-private cursor, and [`RowRefRegistry`] keeps
//! long-lived positions (cursor, anchor, drop targets) valid across
//! mutations.

mod path;
mod row_ref;
mod traits;
mod tree_store;

pub use path::{ParsePathError, TreePath};
pub use row_ref::{RowRefId, RowRefRegistry};
pub use traits::{
    CellValue, ModelFlags, ModelSignals, RowData, RowDragDest, RowDragSource, TreeIter, TreeModel,
};
pub use tree_store::TreeStore;
