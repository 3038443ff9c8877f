//! A retained-mode tree/list widget core.
//!
//! Alder renders hierarchical models as a scrolling table: columns across,
//! rows down, collapsible subtrees behind expander arrows. The widget is
//! headless and toolkit-agnostic; an embedding shell supplies input events
//! and a [`view::Renderer`] and drives the view's scheduler from its event
//! loop.
//!
//! The crate splits along the model/view seam:
//!
//! - [`model`]: the [`TreeModel`](model::TreeModel) trait, the bundled
//!   [`TreeStore`](model::TreeStore), row addressing and row references
//! - [`view`]: the [`TreeView`](view::TreeView) widget and its row
//!   geometry cache, validator, selection, gestures and painting
//! - [`geom`] and [`event`]: the small vocabulary types shared with the
//!   shell
//!
//! Row heights are measured lazily. Mutating the model marks rows dirty
//! and schedules a validation pass that measures against a time budget,
//! so a million-row store stays responsive; scrolling positions resolve
//! through an order-statistics tree rather than by walking rows.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use alder::model::TreeStore;
//! use alder::view::{Column, HeadlessRenderer, TreeView};
//! use alder::geom::Size;
//!
//! let store = TreeStore::new(1);
//! for name in ["ash", "birch", "cedar"] {
//!     let iter = store.append(None);
//!     store.set_value(&iter, 0, name.into());
//! }
//!
//! let mut view = TreeView::new(Rc::new(HeadlessRenderer::new()));
//! view.append_column(Column::new("Name", 0));
//! view.set_model(Some(Rc::new(store)));
//! view.set_viewport(Size::new(300, 200));
//! view.run_pending();
//!
//! assert_eq!(view.total_height(), 3 * 22);
//! ```

pub mod event;
pub mod geom;
pub mod model;
pub mod view;
