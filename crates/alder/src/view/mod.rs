//! The tree view and its supporting machinery.
//!
//! [`TreeView`] is the widget core; everything else here serves it. The
//! [`rbtree`] module caches row geometry in an order-statistics forest,
//! [`validate`] measures dirty rows against a time budget, [`coords`]
//! converts between the coordinate spaces, [`column`] lays out the
//! horizontal axis, [`selection`] holds the selection state machine, and
//! [`rubber_band`], [`search`] and [`dnd`] implement the larger gestures.
//! Painting goes through the [`render::Renderer`] seam.

pub mod column;
pub mod coords;
pub mod dnd;
pub mod rbtree;
pub mod render;
pub mod rubber_band;
pub mod search;
pub mod selection;
pub mod tree_view;
pub mod validate;

pub use column::{Column, ColumnSizing};
pub use render::{CellMeasure, HeadlessRenderer, PaintOp, PaintRole, Renderer};
pub use selection::{SelectionMode, TreeSelection};
pub use tree_view::{GridLines, TreeView};
