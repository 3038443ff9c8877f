//! The tree view widget core.
//!
//! [`TreeView`] ties the pieces together: it mirrors a [`TreeModel`] into
//! the row forest, drives incremental validation off its scheduler, owns
//! the selection/cursor/anchor state machine, and turns input events into
//! expansion, selection, search, scrolling and drag-and-drop.
//!
//! The widget is headless: an embedder feeds it input events and a
//! [`Renderer`], calls [`TreeView::process_timers`] from its event loop,
//! and forwards model notifications (or lets
//! [`TreeView::wire_model_signals`] do so).

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use alder_core::{ScheduledTaskId, Signal, TaskScheduler};

use crate::event::{Key, KeyPressEvent, KeyboardModifiers, MouseButton, MouseMoveEvent, MousePressEvent, MouseReleaseEvent};
use crate::geom::{Point, Rect, Size};
use crate::model::{RowRefId, RowRefRegistry, TreeModel, TreePath};
use crate::view::column::{self, Column};
use crate::view::coords::Coords;
use crate::view::dnd::{self, DestRow, DragState, OPEN_DEST_TIMEOUT, SCROLL_TIMEOUT};
use crate::view::rbtree::{LevelId, PathLookup, RowFlags, RowId, RowTree};
use crate::view::render::{CellMeasure, PaintRole, Renderer};
use crate::view::rubber_band::{DRAG_THRESHOLD, RubberBand};
use crate::view::search::{SEARCH_FLUSH_TIMEOUT, TypeaheadSearch};
use crate::view::selection::{SelectionMode, TreeSelection};
use crate::view::validate::{self, RowSeparatorFn, VALIDATE_BUDGET, ValidateConfig};

/// Interval between expander animation frames.
const ANIMATION_INTERVAL: Duration = Duration::from_millis(50);

/// Animation frames until the expander arrow is at rest.
const ANIMATION_FRAMES: u8 = 2;

const DEFAULT_HEADER_HEIGHT: i32 = 24;

/// Grid line drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridLines {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

/// Predicate consulted before a row expands or collapses; returning
/// `false` vetoes the change.
pub type RowTestFn = Box<dyn Fn(&TreePath) -> bool>;

struct TimerSlot {
    handle: Option<ScheduledTaskId>,
    due: Rc<Cell<bool>>,
}

impl TimerSlot {
    fn new() -> Self {
        Self {
            handle: None,
            due: Rc::new(Cell::new(false)),
        }
    }

    fn arm_once(&mut self, scheduler: &mut TaskScheduler, delay: Duration) {
        self.cancel(scheduler);
        let due = self.due.clone();
        self.handle = Some(scheduler.schedule_once(delay, move || due.set(true)));
    }

    fn arm_repeating(&mut self, scheduler: &mut TaskScheduler, interval: Duration) {
        self.cancel(scheduler);
        let due = self.due.clone();
        self.handle = Some(scheduler.schedule_repeating(interval, move || due.set(true)));
    }

    fn cancel(&mut self, scheduler: &mut TaskScheduler) {
        if let Some(id) = self.handle.take() {
            // Already-fired one-shots are gone from the scheduler.
            let _ = scheduler.cancel(id);
        }
        self.due.set(false);
    }

    fn take_due(&mut self) -> bool {
        self.due.replace(false)
    }
}

struct Timers {
    validate: TimerSlot,
    presize: TimerSlot,
    animation: TimerSlot,
    search_flush: TimerSlot,
    open_dest: TimerSlot,
    autoscroll: TimerSlot,
}

impl Timers {
    fn new() -> Self {
        Self {
            validate: TimerSlot::new(),
            presize: TimerSlot::new(),
            animation: TimerSlot::new(),
            search_flush: TimerSlot::new(),
            open_dest: TimerSlot::new(),
            autoscroll: TimerSlot::new(),
        }
    }

    fn cancel_all(&mut self, scheduler: &mut TaskScheduler) {
        self.validate.cancel(scheduler);
        self.presize.cancel(scheduler);
        self.animation.cancel(scheduler);
        self.search_flush.cancel(scheduler);
        self.open_dest.cancel(scheduler);
        self.autoscroll.cancel(scheduler);
    }

    fn any_due(&self) -> bool {
        self.validate.due.get()
            || self.presize.due.get()
            || self.animation.due.get()
            || self.search_flush.due.get()
            || self.open_dest.due.get()
            || self.autoscroll.due.get()
    }
}

/// A button press whose selection effect is deferred to release (so a
/// rubber band starting from the same press can take over).
struct PressInfo {
    pos: Point,
    path: Option<TreePath>,
    column: usize,
    modifiers: KeyboardModifiers,
}

/// Expander animation in flight.
struct Animation {
    path: TreePath,
    expanding: bool,
    phase: u8,
}

/// The widget.
pub struct TreeView {
    model: Option<Rc<dyn TreeModel>>,
    tree: RowTree,
    columns: Vec<Column>,
    selection: TreeSelection,
    refs: RowRefRegistry,
    cursor: Option<RowRefId>,
    anchor: Option<RowRefId>,
    measure: Rc<dyn CellMeasure>,

    coords: Coords,
    viewport: Size,
    content_width: i32,

    validate_cfg: ValidateConfig,
    row_separator: Option<RowSeparatorFn>,
    fixed_height_mode: bool,
    fixed_row_height: Option<i32>,

    headers_visible: bool,
    show_expanders: bool,
    rubber_banding: bool,
    reorderable: bool,
    hover_selection: bool,
    hover_expand: bool,
    enable_animations: bool,
    grid_lines: GridLines,
    tree_lines: bool,

    rubber_band: RubberBand,
    band_dirty: bool,
    press: Option<PressInfo>,
    prelight: Option<TreePath>,
    drag: DragState,
    autoscroll_velocity: i32,
    search: TypeaheadSearch,
    animation: Option<Animation>,
    pending_scroll: Option<(TreePath, Option<f32>)>,

    scheduler: TaskScheduler,
    timers: Timers,

    test_expand_row: Option<RowTestFn>,
    test_collapse_row: Option<RowTestFn>,

    pub row_activated: Signal<(TreePath, usize)>,
    pub row_expanded: Signal<TreePath>,
    pub row_collapsed: Signal<TreePath>,
    pub cursor_changed: Signal<()>,
    pub columns_changed: Signal<()>,
}

impl TreeView {
    pub fn new(measure: Rc<dyn CellMeasure>) -> Self {
        Self {
            model: None,
            tree: RowTree::new(),
            columns: Vec::new(),
            selection: TreeSelection::new(),
            refs: RowRefRegistry::new(),
            cursor: None,
            anchor: None,
            measure,
            coords: Coords {
                header_height: DEFAULT_HEADER_HEIGHT,
                ..Coords::default()
            },
            viewport: Size::new(0, 0),
            content_width: 0,
            validate_cfg: ValidateConfig::default(),
            row_separator: None,
            fixed_height_mode: false,
            fixed_row_height: None,
            headers_visible: true,
            show_expanders: true,
            rubber_banding: false,
            reorderable: false,
            hover_selection: false,
            hover_expand: false,
            enable_animations: false,
            grid_lines: GridLines::None,
            tree_lines: false,
            rubber_band: RubberBand::new(),
            band_dirty: false,
            press: None,
            prelight: None,
            drag: DragState::new(),
            autoscroll_velocity: 0,
            search: TypeaheadSearch::new(),
            animation: None,
            pending_scroll: None,
            scheduler: TaskScheduler::new(),
            timers: Timers::new(),
            test_expand_row: None,
            test_collapse_row: None,
            row_activated: Signal::new(),
            row_expanded: Signal::new(),
            row_collapsed: Signal::new(),
            cursor_changed: Signal::new(),
            columns_changed: Signal::new(),
        }
    }

    // ----- model -----

    pub fn model(&self) -> Option<&Rc<dyn TreeModel>> {
        self.model.as_ref()
    }

    /// Swap the model. Every piece of view state tied to rows (selection,
    /// cursor, scroll, gestures, search) is discarded and the top level of
    /// the new model is mirrored with unmeasured rows.
    pub fn set_model(&mut self, model: Option<Rc<dyn TreeModel>>) {
        self.tree = RowTree::new();
        self.refs = RowRefRegistry::new();
        self.cursor = None;
        self.anchor = None;
        self.rubber_band.clear();
        self.band_dirty = false;
        self.press = None;
        self.prelight = None;
        self.drag.clear();
        self.search.clear();
        self.animation = None;
        self.pending_scroll = None;
        self.fixed_row_height = None;
        self.autoscroll_velocity = 0;
        self.coords.dy = 0;
        self.coords.hoffset = 0;
        self.timers.cancel_all(&mut self.scheduler);

        self.model = model;
        if let Some(model) = self.model.clone() {
            let root = self.tree.root_level();
            self.populate_level(&*model, root, None, false);
        }
        self.queue_validate();
    }

    /// Connect the view's model-notification handlers to the model's
    /// signals. The view must be shared in a `Rc<RefCell<..>>` for this;
    /// embedders driving the handlers themselves can skip it.
    ///
    /// Mutations the view itself performs (a reorder drop) update its
    /// cache in place; their signal emissions arrive while the view is
    /// already borrowed and are skipped here.
    pub fn wire_model_signals(view: &Rc<RefCell<TreeView>>) {
        let Some(model) = view.borrow().model.clone() else {
            return;
        };
        let signals = model.signals();
        let weak = Rc::downgrade(view);
        signals.row_inserted.connect({
            let weak = weak.clone();
            move |(path, _)| {
                if let Some(v) = weak.upgrade()
                    && let Ok(mut view) = v.try_borrow_mut()
                {
                    view.model_row_inserted(path);
                }
            }
        });
        let weak2 = weak.clone();
        signals.row_deleted.connect(move |path| {
            if let Some(v) = weak2.upgrade()
                && let Ok(mut view) = v.try_borrow_mut()
            {
                view.model_row_deleted(path);
            }
        });
        let weak3 = weak.clone();
        signals.row_changed.connect(move |(path, _)| {
            if let Some(v) = weak3.upgrade()
                && let Ok(mut view) = v.try_borrow_mut()
            {
                view.model_row_changed(path);
            }
        });
        let weak4 = weak.clone();
        signals.row_has_child_toggled.connect(move |(path, _)| {
            if let Some(v) = weak4.upgrade()
                && let Ok(mut view) = v.try_borrow_mut()
            {
                view.model_row_has_child_toggled(path);
            }
        });
        signals.rows_reordered.connect(move |(parent, order)| {
            if let Some(v) = weak.upgrade()
                && let Ok(mut view) = v.try_borrow_mut()
            {
                view.model_rows_reordered(parent, order);
            }
        });
    }

    /// Mirror the children of `parent` into `level` as unmeasured rows.
    fn populate_level(
        &mut self,
        model: &dyn TreeModel,
        level: LevelId,
        parent: Option<&crate::model::TreeIter>,
        open_all: bool,
    ) {
        let Some(mut iter) = model.iter_children(parent) else {
            return;
        };
        let mut prev = None;
        loop {
            let node = self.tree.insert_after(level, prev, 0, false);
            if model.iter_has_child(&iter) {
                self.tree.set_flag(node, RowFlags::IS_PARENT);
                if open_all {
                    let child_level = self.tree.add_child_level(level, node);
                    self.populate_level(model, child_level, Some(&iter), true);
                }
            }
            prev = Some(node);
            if !model.iter_next(&mut iter) {
                break;
            }
        }
    }

    // ----- model notifications -----

    /// A row appeared in the model at `path`.
    pub fn model_row_inserted(&mut self, path: &TreePath) {
        self.rubber_band.forget_range();
        let Some(model) = self.model.clone() else {
            return;
        };
        let Some(index) = path.last_index() else {
            return;
        };

        let level = if path.depth() == 1 {
            Some(self.tree.root_level())
        } else {
            match path.parent().map(|p| self.tree.find_node(&p)) {
                Some(PathLookup::Found(_, parent_node)) => self.tree.node_children(parent_node),
                // Below a collapsed row; nothing cached to update.
                _ => None,
            }
        };

        if let Some(level) = level {
            let node = if index == 0 {
                self.tree.insert_before(level, self.tree.first_node(level), 0, false)
            } else if let Some(prev) = self.tree.node_at_index(level, index - 1) {
                self.tree.insert_after(level, Some(prev), 0, false)
            } else {
                tracing::warn!(target: "alder::view", %path, "insert past end of cached level");
                self.tree.insert_after(level, self.tree.last_node(level), 0, false)
            };
            if let Some(iter) = model.iter_from_path(path)
                && model.iter_has_child(&iter)
            {
                self.tree.set_flag(node, RowFlags::IS_PARENT);
            }
            self.queue_validate();
        }
        self.refs.row_inserted(path);
    }

    /// The row at `path` left the model. Fixes selection and cursor after
    /// the structural update; one selection-changed at most.
    pub fn model_row_deleted(&mut self, path: &TreePath) {
        self.rubber_band.forget_range();
        let cursor_before = self.cursor_path();
        let mut selection_dirty = false;

        if let PathLookup::Found(level, node) = self.tree.find_node(path) {
            selection_dirty = self.tree.flag_set(node, RowFlags::IS_SELECTED);
            if let Some(children) = self.tree.node_children(node) {
                selection_dirty |= self.level_has_selected(children);
                self.tree.remove_level(children);
            }
            let parent = self.tree.level_parent(level);
            self.tree.remove_node(level, node);
            if let Some((_, parent_node)) = parent
                && self.tree.level_is_empty(level)
            {
                self.tree.remove_level(level);
                self.tree.unset_flag(parent_node, RowFlags::IS_PARENT);
            }
            self.clamp_scroll();
            self.queue_presize();
        }

        self.refs.row_deleted(path);
        if cursor_before.is_some() && self.cursor_path().is_none() {
            self.cursor_changed.emit(());
        }
        if selection_dirty {
            self.selection.changed.emit(());
        }
    }

    /// The row at `path` changed its values; remeasure lazily.
    pub fn model_row_changed(&mut self, path: &TreePath) {
        if let PathLookup::Found(level, node) = self.tree.find_node(path) {
            self.tree.mark_invalid(level, node);
            self.queue_validate();
        }
    }

    /// The row at `path` gained its first child or lost its last one.
    pub fn model_row_has_child_toggled(&mut self, path: &TreePath) {
        let Some(model) = self.model.clone() else {
            return;
        };
        let PathLookup::Found(level, node) = self.tree.find_node(path) else {
            return;
        };
        let Some(iter) = model.iter_from_path(path) else {
            return;
        };
        if model.iter_has_child(&iter) {
            self.tree.set_flag(node, RowFlags::IS_PARENT);
        } else {
            if let Some(children) = self.tree.node_children(node) {
                self.tree.remove_level(children);
            }
            self.tree.unset_flag(node, RowFlags::IS_PARENT);
        }
        // The expander arrow affects the measured first-column width.
        self.tree.mark_invalid(level, node);
        self.queue_validate();
    }

    /// The children of `parent` were permuted; `new_order[new] = old`.
    pub fn model_rows_reordered(&mut self, parent: &TreePath, new_order: &[usize]) {
        self.rubber_band.forget_range();
        let level = if parent.is_empty() {
            Some(self.tree.root_level())
        } else {
            match self.tree.find_node(parent) {
                PathLookup::Found(_, node) => self
                    .tree
                    .node_children(node)
                    .filter(|&c| !self.tree.level_is_empty(c)),
                _ => None,
            }
        };
        if let Some(level) = level {
            self.tree.reorder(level, new_order);
        }
        self.refs.rows_reordered(parent, new_order);
    }

    // ----- columns -----

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn append_column(&mut self, column: Column) -> usize {
        self.columns.push(column);
        self.invalidate_column_widths();
        self.columns_changed.emit(());
        self.columns.len() - 1
    }

    pub fn insert_column(&mut self, index: usize, column: Column) {
        self.columns.insert(index.min(self.columns.len()), column);
        self.invalidate_column_widths();
        self.columns_changed.emit(());
    }

    pub fn remove_column(&mut self, index: usize) -> Option<Column> {
        if index >= self.columns.len() {
            return None;
        }
        let col = self.columns.remove(index);
        self.invalidate_column_widths();
        self.columns_changed.emit(());
        Some(col)
    }

    pub fn column_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.get_mut(index)
    }

    fn invalidate_column_widths(&mut self) {
        for col in &mut self.columns {
            col.reset_requested_width();
        }
        let root = self.tree.root_level();
        self.tree.column_invalid(root);
        self.queue_validate();
        self.queue_presize();
    }

    fn first_visible_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.is_visible())
    }

    // ----- configuration -----

    pub fn set_headers_visible(&mut self, visible: bool) {
        self.headers_visible = visible;
        self.coords.header_height = if visible { DEFAULT_HEADER_HEIGHT } else { 0 };
        self.queue_presize();
    }

    pub fn headers_visible(&self) -> bool {
        self.headers_visible
    }

    /// Every row gets the same height and the validator is skipped. All
    /// columns should use fixed sizing; the height comes from
    /// [`TreeView::set_fixed_row_height`] or a single measurement of the
    /// first row.
    pub fn set_fixed_height_mode(&mut self, enabled: bool) {
        if enabled
            && self
                .columns
                .iter()
                .any(|c| c.sizing() != crate::view::column::ColumnSizing::Fixed)
        {
            tracing::warn!(
                target: "alder::view",
                "fixed-height mode with non-fixed columns; widths will not track content"
            );
        }
        self.fixed_height_mode = enabled;
        if !enabled {
            self.fixed_row_height = None;
            let root = self.tree.root_level();
            self.tree.mark_subtree_invalid(root);
        }
        self.queue_validate();
    }

    pub fn fixed_height_mode(&self) -> bool {
        self.fixed_height_mode
    }

    pub fn set_fixed_row_height(&mut self, height: i32) {
        self.fixed_row_height = Some(height.max(1));
        self.queue_validate();
    }

    pub fn set_rubber_banding(&mut self, enabled: bool) {
        self.rubber_banding = enabled;
    }

    pub fn set_reorderable(&mut self, enabled: bool) {
        self.reorderable = enabled;
    }

    pub fn set_hover_selection(&mut self, enabled: bool) {
        self.hover_selection = enabled;
    }

    pub fn set_hover_expand(&mut self, enabled: bool) {
        self.hover_expand = enabled;
    }

    pub fn set_enable_animations(&mut self, enabled: bool) {
        self.enable_animations = enabled;
    }

    pub fn set_show_expanders(&mut self, show: bool) {
        self.show_expanders = show;
        let root = self.tree.root_level();
        self.tree.column_invalid(root);
        self.queue_validate();
    }

    pub fn set_grid_lines(&mut self, lines: GridLines) {
        self.grid_lines = lines;
    }

    pub fn set_tree_lines(&mut self, enabled: bool) {
        self.tree_lines = enabled;
    }

    pub fn set_level_indentation(&mut self, indent: i32) {
        self.validate_cfg.indent_per_level = indent.max(0);
        let root = self.tree.root_level();
        self.tree.column_invalid(root);
        self.queue_validate();
    }

    pub fn set_enable_search(&mut self, enabled: bool) {
        self.search.set_enabled(enabled);
    }

    pub fn set_search_column(&mut self, column: Option<usize>) {
        self.search.set_column(column);
    }

    pub fn set_row_separator_func(&mut self, f: Option<RowSeparatorFn>) {
        self.row_separator = f;
        let root = self.tree.root_level();
        self.tree.mark_subtree_invalid(root);
        self.queue_validate();
    }

    pub fn set_test_expand_row(&mut self, f: Option<RowTestFn>) {
        self.test_expand_row = f;
    }

    pub fn set_test_collapse_row(&mut self, f: Option<RowTestFn>) {
        self.test_collapse_row = f;
    }

    // ----- selection -----

    pub fn selection(&self) -> &TreeSelection {
        &self.selection
    }

    pub fn set_select_function(&mut self, f: Option<crate::view::selection::SelectFunction>) {
        self.selection.set_select_function(f);
    }

    /// Change the selection mode, trimming the current selection to what
    /// the new mode allows.
    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        self.selection.set_mode(mode);
        let mut dirty = false;
        match mode {
            SelectionMode::None => {
                dirty = self.selection.unselect_all(&mut self.tree);
            }
            SelectionMode::Single | SelectionMode::Browse => {
                // Keep the cursor row if it is selected, else the topmost
                // selected row.
                let keep = self
                    .cursor_pos()
                    .filter(|&(_, n)| self.tree.flag_set(n, RowFlags::IS_SELECTED))
                    .or_else(|| self.first_selected_pos());
                let root = self.tree.root_level();
                let mut pos = self.tree.first_node(root).map(|n| (root, n));
                while let Some((l, n)) = pos {
                    if Some((l, n)) != keep {
                        dirty |= self.selection.real_select_node(&mut self.tree, l, n, false);
                    }
                    pos = self.tree.next_full(l, n);
                }
            }
            SelectionMode::Multiple => {}
        }
        if dirty {
            self.selection.changed.emit(());
        }
    }

    pub fn select_path(&mut self, path: &TreePath) -> bool {
        let PathLookup::Found(level, node) = self.tree.find_node(path) else {
            return false;
        };
        let dirty = match self.selection.mode() {
            SelectionMode::Single | SelectionMode::Browse => self.select_only(level, node),
            _ => self.selection.real_select_node(&mut self.tree, level, node, true),
        };
        if dirty {
            self.selection.changed.emit(());
        }
        dirty
    }

    pub fn unselect_path(&mut self, path: &TreePath) -> bool {
        let PathLookup::Found(level, node) = self.tree.find_node(path) else {
            return false;
        };
        if self.selection.mode() == SelectionMode::Browse {
            return false;
        }
        let dirty = self.selection.real_select_node(&mut self.tree, level, node, false);
        if dirty {
            self.selection.changed.emit(());
        }
        dirty
    }

    pub fn path_is_selected(&self, path: &TreePath) -> bool {
        match self.tree.find_node(path) {
            PathLookup::Found(_, node) => self.tree.flag_set(node, RowFlags::IS_SELECTED),
            _ => false,
        }
    }

    pub fn select_all(&mut self) {
        if self.selection.select_all(&mut self.tree) {
            self.selection.changed.emit(());
        }
    }

    pub fn unselect_all(&mut self) {
        if self.selection.unselect_all(&mut self.tree) {
            self.selection.changed.emit(());
        }
    }

    pub fn selected_paths(&self) -> Vec<TreePath> {
        self.selection.selected_paths(&self.tree)
    }

    pub fn count_selected(&self) -> usize {
        self.selection.count_selected(&self.tree)
    }

    /// Make `(level, node)` the only selected row, reporting whether any
    /// flag changed. Unlike clear-then-select this never reports a change
    /// for a row that stays selected.
    fn select_only(&mut self, level: LevelId, node: RowId) -> bool {
        let mut dirty = false;
        let root = self.tree.root_level();
        let mut pos = self.tree.first_node(root).map(|n| (root, n));
        while let Some((l, n)) = pos {
            let want = (l, n) == (level, node);
            dirty |= self.selection.real_select_node(&mut self.tree, l, n, want);
            pos = self.tree.next_full(l, n);
        }
        dirty
    }

    fn first_selected_pos(&self) -> Option<(LevelId, RowId)> {
        let root = self.tree.root_level();
        let mut pos = self.tree.first_node(root).map(|n| (root, n));
        while let Some((l, n)) = pos {
            if self.tree.flag_set(n, RowFlags::IS_SELECTED) {
                return Some((l, n));
            }
            pos = self.tree.next_full(l, n);
        }
        None
    }

    /// Any selected row at or below `level` (recursing into child levels).
    fn level_has_selected(&self, level: LevelId) -> bool {
        let mut cur = self.tree.first_node(level);
        while let Some(n) = cur {
            if self.tree.flag_set(n, RowFlags::IS_SELECTED) {
                return true;
            }
            if let Some(children) = self.tree.node_children(n)
                && self.level_has_selected(children)
            {
                return true;
            }
            cur = self.tree.next(n);
        }
        false
    }

    // ----- cursor and anchor -----

    pub fn cursor_path(&self) -> Option<TreePath> {
        self.cursor.and_then(|id| self.refs.path(id).cloned())
    }

    fn anchor_path(&self) -> Option<TreePath> {
        self.anchor.and_then(|id| self.refs.path(id).cloned())
    }

    fn cursor_pos(&self) -> Option<(LevelId, RowId)> {
        let path = self.cursor_path()?;
        match self.tree.find_node(&path) {
            PathLookup::Found(level, node) => Some((level, node)),
            _ => None,
        }
    }

    fn anchor_pos(&self) -> Option<(LevelId, RowId)> {
        let path = self.anchor_path()?;
        match self.tree.find_node(&path) {
            PathLookup::Found(level, node) => Some((level, node)),
            _ => None,
        }
    }

    /// Point the cursor row reference at `path`; true when the effective
    /// cursor path changed.
    fn set_cursor_ref(&mut self, path: Option<TreePath>) -> bool {
        let before = self.cursor_path();
        match self.cursor {
            Some(id) => self.refs.set(id, path),
            None => {
                if let Some(p) = path {
                    self.cursor = Some(self.refs.add(p));
                }
            }
        }
        before != self.cursor_path()
    }

    fn set_anchor_ref(&mut self, path: Option<TreePath>) {
        match self.anchor {
            Some(id) => self.refs.set(id, path),
            None => {
                if let Some(p) = path {
                    self.anchor = Some(self.refs.add(p));
                }
            }
        }
    }

    /// Move the cursor to `path`, selecting it the way a plain click
    /// would. No-op when the path is not visible.
    pub fn set_cursor(&mut self, path: &TreePath) -> bool {
        let PathLookup::Found(level, node) = self.tree.find_node(path) else {
            return false;
        };
        let dirty = match self.selection.mode() {
            SelectionMode::None => false,
            _ => self.select_only(level, node),
        };
        self.set_anchor_ref(Some(path.clone()));
        if self.set_cursor_ref(Some(path.clone())) {
            self.cursor_changed.emit(());
        }
        if dirty {
            self.selection.changed.emit(());
        }
        true
    }

    // ----- expansion -----

    pub fn is_row_expanded(&self, path: &TreePath) -> bool {
        match self.tree.find_node(path) {
            PathLookup::Found(_, node) => self
                .tree
                .node_children(node)
                .is_some_and(|c| !self.tree.level_is_empty(c)),
            _ => false,
        }
    }

    /// Expand the row at `path`; with `open_all` the whole subtree opens.
    /// Returns false when the row has no children, is not visible, or the
    /// expansion was vetoed.
    pub fn expand_row(&mut self, path: &TreePath, open_all: bool) -> bool {
        let Some(model) = self.model.clone() else {
            return false;
        };
        let PathLookup::Found(level, node) = self.tree.find_node(path) else {
            return false;
        };

        if let Some(children) = self.tree.node_children(node)
            && !self.tree.level_is_empty(children)
        {
            if !open_all {
                return false;
            }
            let mut any = false;
            let count = self.tree.level_count(children);
            for i in 0..count {
                any |= self.expand_row(&path.child(i), true);
            }
            return any;
        }

        let Some(iter) = model.iter_from_path(path) else {
            return false;
        };
        if !model.iter_has_child(&iter) {
            return false;
        }
        if let Some(test) = &self.test_expand_row
            && !test(path)
        {
            tracing::debug!(target: "alder::view", %path, "expand vetoed");
            return false;
        }

        self.rubber_band.forget_range();
        let child_level = match self.tree.node_children(node) {
            Some(existing) => existing,
            None => self.tree.add_child_level(level, node),
        };
        self.populate_level(&*model, child_level, Some(&iter), open_all);
        self.start_animation(path.clone(), node, true);
        self.row_expanded.emit(path.clone());
        self.queue_validate();
        true
    }

    /// Collapse the row at `path`. Selection held by hidden descendants is
    /// dropped (one notification); a cursor or anchor inside moves to the
    /// collapsed row itself.
    pub fn collapse_row(&mut self, path: &TreePath) -> bool {
        let PathLookup::Found(_, node) = self.tree.find_node(path) else {
            return false;
        };
        let Some(children) = self
            .tree
            .node_children(node)
            .filter(|&c| !self.tree.level_is_empty(c))
        else {
            return false;
        };
        if let Some(test) = &self.test_collapse_row
            && !test(path)
        {
            tracing::debug!(target: "alder::view", %path, "collapse vetoed");
            return false;
        }

        self.rubber_band.forget_range();
        let cursor_inside = self
            .cursor_path()
            .is_some_and(|c| path.is_ancestor_of(&c));
        let anchor_inside = self
            .anchor_path()
            .is_some_and(|a| path.is_ancestor_of(&a));
        let had_selected = self.level_has_selected(children);
        if self
            .prelight
            .as_ref()
            .is_some_and(|p| path.is_ancestor_of(p))
        {
            self.prelight = None;
        }

        self.tree.remove_level(children);

        if cursor_inside {
            self.set_cursor_ref(Some(path.clone()));
            self.cursor_changed.emit(());
        }
        if anchor_inside {
            self.set_anchor_ref(Some(path.clone()));
        }
        if had_selected {
            self.selection.changed.emit(());
        }
        self.start_animation(path.clone(), node, false);
        self.row_collapsed.emit(path.clone());
        self.clamp_scroll();
        self.queue_presize();
        true
    }

    pub fn expand_all(&mut self) {
        let count = self.tree.level_count(self.tree.root_level());
        for i in 0..count {
            self.expand_row(&TreePath::from_indices(vec![i]), true);
        }
    }

    pub fn collapse_all(&mut self) {
        let count = self.tree.level_count(self.tree.root_level());
        for i in 0..count {
            self.collapse_row(&TreePath::from_indices(vec![i]));
        }
    }

    fn start_animation(&mut self, path: TreePath, node: RowId, expanding: bool) {
        // Clear any leftover arrow state from an interrupted animation.
        if let Some(prev) = self.animation.take()
            && let PathLookup::Found(_, n) = self.tree.find_node(&prev.path)
        {
            self.tree.unset_flag(n, RowFlags::IS_SEMI_EXPANDED);
            self.tree.unset_flag(n, RowFlags::IS_SEMI_COLLAPSED);
        }
        if !self.enable_animations {
            self.timers.animation.cancel(&mut self.scheduler);
            return;
        }
        let flag = if expanding {
            RowFlags::IS_SEMI_EXPANDED
        } else {
            RowFlags::IS_SEMI_COLLAPSED
        };
        self.tree.set_flag(node, flag);
        self.animation = Some(Animation {
            path,
            expanding,
            phase: 0,
        });
        self.timers
            .animation
            .arm_repeating(&mut self.scheduler, ANIMATION_INTERVAL);
    }

    fn step_animation(&mut self) {
        let Some(anim) = &mut self.animation else {
            self.timers.animation.cancel(&mut self.scheduler);
            return;
        };
        anim.phase += 1;
        if anim.phase >= ANIMATION_FRAMES {
            let anim = self.animation.take();
            if let Some(anim) = anim
                && let PathLookup::Found(_, node) = self.tree.find_node(&anim.path)
            {
                self.tree.unset_flag(node, RowFlags::IS_SEMI_EXPANDED);
                self.tree.unset_flag(node, RowFlags::IS_SEMI_COLLAPSED);
            }
            self.timers.animation.cancel(&mut self.scheduler);
        }
    }

    // ----- geometry -----

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn set_viewport(&mut self, size: Size) {
        self.viewport = size;
        self.content_width = column::layout_columns(&mut self.columns, size.width);
        self.clamp_scroll();
        self.queue_validate();
    }

    fn bin_height(&self) -> i32 {
        (self.viewport.height - self.coords.header_height).max(0)
    }

    pub fn total_height(&self) -> i32 {
        self.tree.total_height()
    }

    pub fn content_width(&self) -> i32 {
        self.content_width
    }

    pub fn vertical_offset(&self) -> i32 {
        self.coords.dy
    }

    pub fn set_vertical_offset(&mut self, dy: i32) {
        let max = (self.tree.total_height() - self.bin_height()).max(0);
        self.coords.dy = dy.clamp(0, max);
        self.queue_validate();
    }

    pub fn horizontal_offset(&self) -> i32 {
        self.coords.hoffset
    }

    pub fn set_horizontal_offset(&mut self, x: i32) {
        let max = (self.content_width - self.viewport.width).max(0);
        self.coords.hoffset = x.clamp(0, max);
    }

    fn clamp_scroll(&mut self) {
        let max = (self.tree.total_height() - self.bin_height()).max(0);
        self.coords.dy = self.coords.dy.clamp(0, max);
    }

    /// Row under a widget y, with the y offset inside the row.
    fn row_at_widget_y(&self, y: i32) -> Option<(LevelId, RowId, i32)> {
        if y < self.coords.header_height {
            return None;
        }
        let tree_y = self.coords.widget_to_tree_y(y);
        if tree_y < 0 || tree_y >= self.tree.total_height() {
            return None;
        }
        self.tree.find_offset(tree_y)
    }

    /// Row and column under a widget position, with the offset of the
    /// position inside that cell's background area.
    pub fn path_at_pos(&self, pos: Point) -> Option<(TreePath, usize, Point)> {
        let (level, node, within) = self.row_at_widget_y(pos.y)?;
        let content_x = self.coords.bin_to_content_x(pos.x);
        let (col, x_in_col) = column::column_at_x(&self.columns, content_x)?;
        Some((self.tree.find_path(level, node), col, Point::new(x_in_col, within)))
    }

    /// The cell's full background rectangle in widget coordinates.
    pub fn background_area(&self, path: &TreePath, column: usize) -> Option<Rect> {
        let PathLookup::Found(level, node) = self.tree.find_node(path) else {
            return None;
        };
        let col = self.columns.get(column).filter(|c| c.is_visible())?;
        let y = self.tree.node_find_offset(level, node);
        let rect = Rect::new(
            column::column_x(&self.columns, column),
            y,
            col.width(),
            self.tree.node_height(node),
        );
        Some(self.coords.tree_rect_to_widget(rect))
    }

    /// The cell's content rectangle: the background area minus depth
    /// indentation and the expander slot in the first visible column.
    pub fn cell_area(&self, path: &TreePath, column: usize) -> Option<Rect> {
        let mut rect = self.background_area(path, column)?;
        if Some(column) == self.first_visible_column() {
            let inset = self.row_inset(path);
            rect.x += inset;
            rect.width = (rect.width - inset).max(0);
        }
        Some(rect)
    }

    fn row_inset(&self, path: &TreePath) -> i32 {
        let depth = path.depth().saturating_sub(1) as i32;
        let mut inset = depth * self.validate_cfg.indent_per_level;
        if self.show_expanders {
            inset += self.validate_cfg.expander_size;
        }
        inset
    }

    /// First and last paths intersecting the viewport.
    pub fn visible_range(&self) -> Option<(TreePath, TreePath)> {
        let total = self.tree.total_height();
        if total == 0 || self.bin_height() <= 0 {
            return None;
        }
        let top = self.coords.dy.clamp(0, total - 1);
        let bottom = (self.coords.dy + self.bin_height() - 1).clamp(0, total - 1);
        let (fl, fn_, _) = self.tree.find_offset(top)?;
        let (ll, ln, _) = self.tree.find_offset(bottom)?;
        Some((self.tree.find_path(fl, fn_), self.tree.find_path(ll, ln)))
    }

    /// Scroll so the row at `path` is visible. `row_align` 0.0 puts it at
    /// the top of the viewport, 1.0 at the bottom; `None` scrolls the
    /// minimal distance. When unmeasured rows remain the scroll is
    /// deferred until validation settles; in fixed-height mode offsets are
    /// exact immediately.
    pub fn scroll_to_cell(&mut self, path: &TreePath, row_align: Option<f32>) -> bool {
        let PathLookup::Found(level, node) = self.tree.find_node(path) else {
            return false;
        };
        if !self.fixed_height_mode && validate::first_invalid(&self.tree).is_some() {
            self.pending_scroll = Some((path.clone(), row_align));
            self.queue_validate();
            return true;
        }
        if self.fixed_height_mode {
            self.apply_fixed_heights();
        }
        let y = self.tree.node_find_offset(level, node);
        let h = self.tree.node_height(node);
        let bin = self.bin_height();
        let dy = match row_align {
            Some(align) => {
                let slack = (bin - h).max(0) as f32;
                y - (slack * align.clamp(0.0, 1.0)).round() as i32
            }
            None => {
                let dy = self.coords.dy;
                if y < dy {
                    y
                } else if y + h > dy + bin {
                    y + h - bin
                } else {
                    dy
                }
            }
        };
        let max = (self.tree.total_height() - bin).max(0);
        self.coords.dy = dy.clamp(0, max);
        true
    }

    // ----- validation driving -----

    fn queue_validate(&mut self) {
        self.timers
            .validate
            .arm_once(&mut self.scheduler, Duration::ZERO);
    }

    fn queue_presize(&mut self) {
        self.timers
            .presize
            .arm_once(&mut self.scheduler, Duration::ZERO);
    }

    fn run_validate_slice(&mut self) {
        let Some(model) = self.model.clone() else {
            return;
        };
        if self.fixed_height_mode {
            if self.apply_fixed_heights() {
                self.finish_validation();
            }
            return;
        }
        let measure = self.measure.clone();
        let outcome = validate::validate_rows(
            &mut self.tree,
            &*model,
            &*measure,
            &mut self.columns,
            self.row_separator.as_ref(),
            &self.validate_cfg,
            Instant::now() + VALIDATE_BUDGET,
        );
        if outcome.height_changed {
            self.clamp_scroll();
            self.queue_presize();
        }
        if outcome.remaining {
            self.queue_validate();
        } else {
            self.finish_validation();
        }
    }

    fn finish_validation(&mut self) {
        if let Some((path, align)) = self.pending_scroll.take() {
            self.scroll_to_cell(&path, align);
        }
    }

    /// Stamp the fixed height on every unmeasured row. The height comes
    /// from [`TreeView::set_fixed_row_height`] or one measurement of the
    /// first row.
    fn apply_fixed_heights(&mut self) -> bool {
        let root = self.tree.root_level();
        if self.fixed_row_height.is_none() {
            let Some(model) = self.model.clone() else {
                return false;
            };
            let Some(first) = self.tree.first_node(root) else {
                return false;
            };
            let measure = self.measure.clone();
            validate::validate_row(
                &mut self.tree,
                &*model,
                &*measure,
                &mut self.columns,
                self.row_separator.as_ref(),
                &self.validate_cfg,
                root,
                first,
            );
            self.fixed_row_height = Some(self.tree.node_height(first).max(1));
        }
        if let Some(height) = self.fixed_row_height {
            self.tree.set_fixed_height(root, height, true);
            self.clamp_scroll();
            self.queue_presize();
        }
        true
    }

    fn run_presize(&mut self) {
        self.content_width = column::layout_columns(&mut self.columns, self.viewport.width);
        self.clamp_scroll();
        let max_h = (self.content_width - self.viewport.width).max(0);
        self.coords.hoffset = self.coords.hoffset.clamp(0, max_h);
    }

    /// Drive due timers: validation slices, layout, animation frames,
    /// search flush, drag auto-expand and auto-scroll. Call from the event
    /// loop, ideally after sleeping for
    /// [`TaskScheduler::time_until_next`](alder_core::TaskScheduler).
    pub fn process_timers(&mut self) {
        self.scheduler.process_ready();
        if self.timers.validate.take_due() {
            self.run_validate_slice();
        }
        if self.timers.presize.take_due() {
            self.run_presize();
        }
        if self.timers.animation.take_due() {
            self.step_animation();
        }
        if self.timers.search_flush.take_due() {
            self.search.clear();
        }
        if self.timers.open_dest.take_due() {
            self.open_destination_row();
        }
        if self.timers.autoscroll.take_due() {
            self.step_autoscroll();
        }
    }

    /// Run every timer that is already due, repeatedly, until the view is
    /// idle. Convenience for embedders without a real event loop and for
    /// tests; timers with a future deadline are left alone.
    pub fn run_pending(&mut self) {
        for _ in 0..100 {
            if !self.scheduler.has_ready() && !self.timers.any_due() {
                break;
            }
            self.process_timers();
        }
    }

    pub fn time_until_next_timer(&mut self) -> Option<Duration> {
        self.scheduler.time_until_next()
    }

    // ----- input: mouse -----

    pub fn button_press(&mut self, ev: MousePressEvent) -> bool {
        if ev.button != MouseButton::Left || ev.pos.y < self.coords.header_height {
            return false;
        }
        let hit = self.path_at_pos(ev.pos);
        let modify = ev.modifiers.control;
        let extend = ev.modifiers.shift;

        if let Some((path, col, cell)) = hit {
            if self.show_expanders && self.is_expander_hit(&path, col, cell.x) {
                if self.is_row_expanded(&path) {
                    self.collapse_row(&path);
                } else {
                    self.expand_row(&path, false);
                }
                return true;
            }
            if ev.click_count >= 2 {
                self.apply_click_selection(&path, ev.modifiers);
                self.row_activated.emit((path, col));
                return true;
            }
            let draggable = self.reorderable
                && self.model.as_deref().is_some_and(|m| {
                    m.drag_source().is_some_and(|src| src.row_draggable(&path))
                });
            if draggable {
                // Reorder drags select on press; the gesture may become a
                // drag once the pointer crosses the threshold.
                self.apply_click_selection(&path, ev.modifiers);
                self.drag.pressed_path = Some(path);
                self.press = Some(PressInfo {
                    pos: ev.pos,
                    path: None,
                    column: col,
                    modifiers: ev.modifiers,
                });
                return true;
            }
            // Selection is deferred to release so a rubber band starting
            // from this press can take over.
            self.press = Some(PressInfo {
                pos: ev.pos,
                path: Some(path),
                column: col,
                modifiers: ev.modifiers,
            });
        } else {
            self.press = Some(PressInfo {
                pos: ev.pos,
                path: None,
                column: 0,
                modifiers: ev.modifiers,
            });
        }

        if self.rubber_banding && self.selection.mode() == SelectionMode::Multiple {
            self.rubber_band
                .arm(self.coords.widget_to_tree(ev.pos), modify, extend);
            self.band_dirty = false;
        }
        true
    }

    pub fn motion(&mut self, ev: MouseMoveEvent) {
        // A pressed reorder source becomes a live drag past the threshold.
        if self.drag.pressed_path.is_some() && !self.drag.active {
            if let Some(press) = &self.press
                && ((ev.pos.x - press.pos.x).abs() > DRAG_THRESHOLD
                    || (ev.pos.y - press.pos.y).abs() > DRAG_THRESHOLD)
            {
                self.drag.active = true;
            }
        }
        if self.drag.active {
            self.drag_motion(ev.pos);
            return;
        }

        let was_active = self.rubber_band.is_active();
        if self.rubber_band.motion(self.coords.widget_to_tree(ev.pos)) {
            if !was_active {
                // Band just activated; a plain band replaces the selection.
                self.press = None;
                if !self.rubber_band.modify() && !self.rubber_band.extend() {
                    self.band_dirty |= self.selection.unselect_all(&mut self.tree);
                }
            }
            self.apply_band_diff();
            return;
        }

        self.update_prelight(ev.pos);
    }

    fn apply_band_diff(&mut self) {
        let diff = self.rubber_band.update_range(&self.tree);
        let modify = self.rubber_band.modify();
        for (level, node) in diff.entered {
            let want = if modify {
                !self.tree.flag_set(node, RowFlags::IS_SELECTED)
            } else {
                true
            };
            self.band_dirty |= self.selection.real_select_node(&mut self.tree, level, node, want);
        }
        for (level, node) in diff.left {
            let want = if modify {
                !self.tree.flag_set(node, RowFlags::IS_SELECTED)
            } else {
                false
            };
            self.band_dirty |= self.selection.real_select_node(&mut self.tree, level, node, want);
        }
    }

    fn update_prelight(&mut self, pos: Point) {
        let new = self
            .row_at_widget_y(pos.y)
            .map(|(l, n, _)| self.tree.find_path(l, n));
        if new == self.prelight {
            return;
        }
        if let Some(old) = self.prelight.take()
            && let PathLookup::Found(_, node) = self.tree.find_node(&old)
        {
            self.tree.unset_flag(node, RowFlags::IS_PRELIT);
        }
        if let Some(path) = &new
            && let PathLookup::Found(level, node) = self.tree.find_node(path)
        {
            self.tree.set_flag(node, RowFlags::IS_PRELIT);
            if self.hover_selection
                && self.selection.mode() != SelectionMode::None
                && !self.is_separator_row(level, node)
            {
                let dirty = self.select_only(level, node);
                if self.set_cursor_ref(Some(path.clone())) {
                    self.cursor_changed.emit(());
                }
                if dirty {
                    self.selection.changed.emit(());
                }
            }
            if self.hover_expand
                && self.tree.flag_set(node, RowFlags::IS_PARENT)
                && !self.is_row_expanded(path)
                && self.drag.open_dest_path.as_ref() != Some(path)
            {
                self.drag.open_dest_path = Some(path.clone());
                self.timers
                    .open_dest
                    .arm_once(&mut self.scheduler, OPEN_DEST_TIMEOUT);
            }
        }
        self.prelight = new;
    }

    pub fn leave(&mut self) {
        if let Some(old) = self.prelight.take()
            && let PathLookup::Found(_, node) = self.tree.find_node(&old)
        {
            self.tree.unset_flag(node, RowFlags::IS_PRELIT);
        }
    }

    pub fn button_release(&mut self, ev: MouseReleaseEvent) {
        if ev.button != MouseButton::Left {
            return;
        }
        if self.drag.pressed_path.is_some() && !self.drag.active {
            self.drag.clear();
        }

        if self.rubber_band.is_active() {
            if let Some((start, end)) = self.rubber_band.range_endpoints() {
                let anchor = self.tree.find_path(start.0, start.1);
                let cursor = self.tree.find_path(end.0, end.1);
                self.set_anchor_ref(Some(anchor));
                if self.set_cursor_ref(Some(cursor)) {
                    self.cursor_changed.emit(());
                }
            }
            if self.band_dirty {
                self.selection.changed.emit(());
            }
            self.rubber_band.clear();
            self.band_dirty = false;
            self.press = None;
            return;
        }
        self.rubber_band.clear();

        if let Some(press) = self.press.take() {
            match press.path {
                Some(path) => self.apply_click_selection(&path, press.modifiers),
                None => {
                    // Click on empty space clears a multiple selection.
                    if !press.modifiers.control
                        && !press.modifiers.shift
                        && self.selection.mode() == SelectionMode::Multiple
                        && self.selection.unselect_all(&mut self.tree)
                    {
                        self.selection.changed.emit(());
                    }
                }
            }
        }
    }

    fn is_expander_hit(&self, path: &TreePath, column: usize, x_in_col: i32) -> bool {
        if Some(column) != self.first_visible_column() {
            return false;
        }
        let PathLookup::Found(_, node) = self.tree.find_node(path) else {
            return false;
        };
        if !self.tree.flag_set(node, RowFlags::IS_PARENT) {
            return false;
        }
        let indent = path.depth().saturating_sub(1) as i32 * self.validate_cfg.indent_per_level;
        x_in_col >= indent && x_in_col < indent + self.validate_cfg.expander_size
    }

    /// Separator rows are inert: clicks and cursor motion pass them over.
    fn is_separator_row(&self, level: LevelId, node: RowId) -> bool {
        let Some(f) = &self.row_separator else {
            return false;
        };
        let Some(model) = &self.model else {
            return false;
        };
        let path = self.tree.find_path(level, node);
        model
            .iter_from_path(&path)
            .is_some_and(|it| f(&**model, &it))
    }

    fn apply_click_selection(&mut self, path: &TreePath, m: KeyboardModifiers) {
        let PathLookup::Found(level, node) = self.tree.find_node(path) else {
            return;
        };
        if self.is_separator_row(level, node) {
            return;
        }
        let mode = self.selection.mode();
        let mut dirty = false;
        match mode {
            SelectionMode::None => {}
            SelectionMode::Single | SelectionMode::Browse => {
                let selected = self.tree.flag_set(node, RowFlags::IS_SELECTED);
                if m.control && mode == SelectionMode::Single && selected {
                    dirty = self.selection.real_select_node(&mut self.tree, level, node, false);
                } else {
                    dirty = self.select_only(level, node);
                }
                self.set_anchor_ref(Some(path.clone()));
            }
            SelectionMode::Multiple => {
                if m.shift {
                    match self.anchor_pos() {
                        Some(anchor) => {
                            dirty = self.selection.unselect_all(&mut self.tree);
                            dirty |= self
                                .selection
                                .modify_range(&mut self.tree, anchor, (level, node), true);
                        }
                        None => {
                            dirty = self.select_only(level, node);
                            self.set_anchor_ref(Some(path.clone()));
                        }
                    }
                } else if m.control {
                    let selected = self.tree.flag_set(node, RowFlags::IS_SELECTED);
                    dirty = self
                        .selection
                        .real_select_node(&mut self.tree, level, node, !selected);
                    self.set_anchor_ref(Some(path.clone()));
                } else {
                    dirty = self.select_only(level, node);
                    self.set_anchor_ref(Some(path.clone()));
                }
            }
        }
        if self.set_cursor_ref(Some(path.clone())) {
            self.cursor_changed.emit(());
        }
        if dirty {
            self.selection.changed.emit(());
        }
    }

    // ----- input: keyboard -----

    pub fn key_press(&mut self, ev: KeyPressEvent) -> bool {
        match ev.key {
            Key::Up => self.move_cursor_by(-1, ev.modifiers),
            Key::Down => self.move_cursor_by(1, ev.modifiers),
            Key::PageUp => self.move_cursor_page(-1, ev.modifiers),
            Key::PageDown => self.move_cursor_page(1, ev.modifiers),
            Key::Home => self.move_cursor_edge(true, ev.modifiers),
            Key::End => self.move_cursor_edge(false, ev.modifiers),
            Key::Left => {
                let Some(path) = self.cursor_path() else {
                    return false;
                };
                if self.is_row_expanded(&path) {
                    self.collapse_row(&path)
                } else if let Some(parent) = path.parent() {
                    match self.tree.find_node(&parent) {
                        PathLookup::Found(level, node) => {
                            self.move_cursor_to(level, node, ev.modifiers);
                            true
                        }
                        _ => false,
                    }
                } else {
                    false
                }
            }
            Key::Right => {
                let Some(path) = self.cursor_path() else {
                    return false;
                };
                self.expand_row(&path, false)
            }
            Key::Space => {
                let Some((level, node)) = self.cursor_pos() else {
                    return false;
                };
                let selected = self.tree.flag_set(node, RowFlags::IS_SELECTED);
                if self.selection.mode() == SelectionMode::Browse && selected {
                    return true;
                }
                if self
                    .selection
                    .real_select_node(&mut self.tree, level, node, !selected)
                {
                    self.selection.changed.emit(());
                }
                true
            }
            Key::Enter => {
                let Some(path) = self.cursor_path() else {
                    return false;
                };
                let col = self.first_visible_column().unwrap_or(0);
                self.row_activated.emit((path, col));
                true
            }
            Key::Escape => {
                if !self.search.buffer().is_empty() {
                    self.search.clear();
                    self.timers.search_flush.cancel(&mut self.scheduler);
                    return true;
                }
                if self.rubber_band.is_active() {
                    self.rubber_band.clear();
                    self.band_dirty = false;
                    return true;
                }
                false
            }
            Key::Backspace => {
                if self.search.buffer().is_empty() {
                    return false;
                }
                if self.search.backspace() {
                    self.jump_to_search_match();
                } else {
                    self.timers.search_flush.cancel(&mut self.scheduler);
                }
                true
            }
            Key::Char(c) => {
                if ev.modifiers.control || ev.modifiers.alt {
                    return false;
                }
                if !self.search.push_char(c) {
                    return false;
                }
                self.timers
                    .search_flush
                    .arm_once(&mut self.scheduler, SEARCH_FLUSH_TIMEOUT);
                self.jump_to_search_match();
                true
            }
        }
    }

    fn jump_to_search_match(&mut self) {
        let Some(model) = self.model.clone() else {
            return;
        };
        let start = self.cursor_pos();
        if let Some((level, node)) = self.search.find_match(&*model, &self.tree, start) {
            self.move_cursor_to(level, node, KeyboardModifiers::NONE);
        }
    }

    fn move_cursor_by(&mut self, delta: i32, m: KeyboardModifiers) -> bool {
        let root = self.tree.root_level();
        let mut target = match self.cursor_pos() {
            Some((level, node)) => {
                if delta < 0 {
                    self.tree.prev_full(level, node)
                } else {
                    self.tree.next_full(level, node)
                }
            }
            None => self.tree.first_node(root).map(|n| (root, n)),
        };
        while let Some((level, node)) = target
            && self.is_separator_row(level, node)
        {
            target = if delta < 0 {
                self.tree.prev_full(level, node)
            } else {
                self.tree.next_full(level, node)
            };
        }
        let Some((level, node)) = target else {
            return false;
        };
        self.move_cursor_to(level, node, m);
        true
    }

    fn move_cursor_page(&mut self, direction: i32, m: KeyboardModifiers) -> bool {
        let total = self.tree.total_height();
        if total == 0 {
            return false;
        }
        let from_y = match self.cursor_pos() {
            Some((level, node)) => self.tree.node_find_offset(level, node),
            None => self.coords.dy,
        };
        let target_y = (from_y + direction * self.bin_height().max(1)).clamp(0, total - 1);
        let mut target = self.tree.find_offset(target_y).map(|(l, n, _)| (l, n));
        while let Some((level, node)) = target
            && self.is_separator_row(level, node)
        {
            target = if direction < 0 {
                self.tree.prev_full(level, node)
            } else {
                self.tree.next_full(level, node)
            };
        }
        let Some((level, node)) = target else {
            return false;
        };
        self.move_cursor_to(level, node, m);
        true
    }

    fn move_cursor_edge(&mut self, first: bool, m: KeyboardModifiers) -> bool {
        let root = self.tree.root_level();
        let mut target = if first {
            self.tree.first_node(root).map(|n| (root, n))
        } else {
            self.last_visible_row()
        };
        while let Some((level, node)) = target
            && self.is_separator_row(level, node)
        {
            target = if first {
                self.tree.next_full(level, node)
            } else {
                self.tree.prev_full(level, node)
            };
        }
        let Some((level, node)) = target else {
            return false;
        };
        self.move_cursor_to(level, node, m);
        true
    }

    fn last_visible_row(&self) -> Option<(LevelId, RowId)> {
        let mut level = self.tree.root_level();
        let mut node = self.tree.last_node(level)?;
        while let Some(children) = self
            .tree
            .node_children(node)
            .filter(|&c| !self.tree.level_is_empty(c))
        {
            level = children;
            node = self.tree.last_node(children)?;
        }
        Some((level, node))
    }

    /// Keyboard cursor motion: plain moves select the target row, shift
    /// extends the range from the anchor, control moves the cursor without
    /// touching the selection.
    fn move_cursor_to(&mut self, level: LevelId, node: RowId, m: KeyboardModifiers) {
        let path = self.tree.find_path(level, node);
        let mut dirty = false;
        if m.shift && self.selection.mode() == SelectionMode::Multiple {
            let anchor = self.anchor_pos().unwrap_or((level, node));
            dirty = self.selection.unselect_all(&mut self.tree);
            dirty |= self
                .selection
                .modify_range(&mut self.tree, anchor, (level, node), true);
            if self.anchor_pos().is_none() {
                self.set_anchor_ref(Some(self.tree.find_path(anchor.0, anchor.1)));
            }
        } else if !m.control {
            if self.selection.mode() != SelectionMode::None {
                dirty = self.select_only(level, node);
            }
            self.set_anchor_ref(Some(path.clone()));
        }
        if self.set_cursor_ref(Some(path.clone())) {
            self.cursor_changed.emit(());
        }
        self.scroll_to_cell(&path, None);
        if dirty {
            self.selection.changed.emit(());
        }
    }

    // ----- drag and drop -----

    /// Track a drag hovering the view. Computes the highlighted drop
    /// position, arms the auto-expand timer over collapsed parents and the
    /// edge auto-scroll timer.
    pub fn drag_motion(&mut self, pos: Point) -> Option<DestRow> {
        let dest = self.row_at_widget_y(pos.y).map(|(level, node, within)| {
            let height = self.tree.node_height(node);
            DestRow {
                path: self.tree.find_path(level, node),
                pos: dnd::drop_position_for_offset(within, height),
            }
        });

        let open_target = dest
            .as_ref()
            .filter(|d| d.pos.is_into())
            .map(|d| d.path.clone())
            .filter(|p| {
                matches!(self.tree.find_node(p), PathLookup::Found(_, n)
                    if self.tree.flag_set(n, RowFlags::IS_PARENT))
                    && !self.is_row_expanded(p)
            });
        match open_target {
            Some(path) => {
                if self.drag.open_dest_path.as_ref() != Some(&path) {
                    self.drag.open_dest_path = Some(path);
                    self.timers
                        .open_dest
                        .arm_once(&mut self.scheduler, OPEN_DEST_TIMEOUT);
                }
            }
            None => {
                self.drag.open_dest_path = None;
                self.timers.open_dest.cancel(&mut self.scheduler);
            }
        }

        let bin_y = self.coords.widget_to_bin_y(pos.y);
        self.autoscroll_velocity = dnd::autoscroll_velocity(bin_y, self.bin_height());
        if self.autoscroll_velocity != 0 {
            let armed = self
                .timers
                .autoscroll
                .handle
                .is_some_and(|id| self.scheduler.is_active(id));
            if !armed {
                self.timers
                    .autoscroll
                    .arm_repeating(&mut self.scheduler, SCROLL_TIMEOUT);
            }
        } else {
            self.timers.autoscroll.cancel(&mut self.scheduler);
        }

        self.drag.dest = dest.clone();
        dest
    }

    pub fn drag_leave(&mut self) {
        self.drag.dest = None;
        self.drag.open_dest_path = None;
        self.autoscroll_velocity = 0;
        self.timers.open_dest.cancel(&mut self.scheduler);
        self.timers.autoscroll.cancel(&mut self.scheduler);
    }

    /// Complete an in-view reorder drop: hand the dragged row to the
    /// destination model and delete the source on success.
    pub fn drag_drop(&mut self, pos: Point) -> bool {
        let _ = self.drag_motion(pos);
        let done = self.perform_drop();
        self.drag.clear();
        self.autoscroll_velocity = 0;
        self.timers.open_dest.cancel(&mut self.scheduler);
        self.timers.autoscroll.cancel(&mut self.scheduler);
        done
    }

    fn perform_drop(&mut self) -> bool {
        let Some(model) = self.model.clone() else {
            return false;
        };
        let Some(dest) = self.drag.dest.clone() else {
            return false;
        };
        let Some(src_path) = self.drag.pressed_path.clone() else {
            return false;
        };
        let Some(source) = model.drag_source() else {
            return false;
        };
        let Some(sink) = model.drag_dest() else {
            return false;
        };
        let Some(data) = source.drag_data_get(&src_path) else {
            return false;
        };
        let target = dnd::insertion_path(&dest.path, dest.pos);
        if !sink.row_drop_possible(&target, &data) {
            tracing::debug!(target: "alder::view", src = %src_path, dst = %target, "drop refused");
            return false;
        }
        if !sink.drag_data_received(&target, &data) {
            return false;
        }
        self.model_row_inserted(&target);
        // Inserting before the source under the same parent shifts the
        // source down one.
        let mut delete = src_path.indices().to_vec();
        let t = target.indices();
        if t.len() == delete.len()
            && t[..t.len() - 1] == delete[..delete.len() - 1]
            && t[t.len() - 1] <= delete[delete.len() - 1]
        {
            let last = delete.len() - 1;
            delete[last] += 1;
        }
        let delete = TreePath::from_indices(delete);
        let done = source.drag_data_delete(&delete);
        if done {
            self.model_row_deleted(&delete);
        }
        done
    }

    fn open_destination_row(&mut self) {
        if let Some(path) = self.drag.open_dest_path.take() {
            self.expand_row(&path, false);
        }
    }

    fn step_autoscroll(&mut self) {
        if self.autoscroll_velocity == 0 {
            self.timers.autoscroll.cancel(&mut self.scheduler);
            return;
        }
        let max = (self.tree.total_height() - self.bin_height()).max(0);
        self.coords.dy = (self.coords.dy + self.autoscroll_velocity).clamp(0, max);
        self.queue_validate();
    }

    // ----- painting -----

    /// Paint the visible rows. Validates the viewport eagerly first so
    /// nothing unmeasured is ever drawn.
    pub fn paint(&mut self, renderer: &mut dyn Renderer) {
        let Some(model) = self.model.clone() else {
            return;
        };
        if self.fixed_height_mode {
            self.apply_fixed_heights();
        } else {
            let measure = self.measure.clone();
            let bin_height = self.bin_height();
            validate::validate_visible(
                &mut self.tree,
                &*model,
                &*measure,
                &mut self.columns,
                self.row_separator.as_ref(),
                &self.validate_cfg,
                self.coords.dy,
                bin_height,
            );
        }
        self.content_width = column::layout_columns(&mut self.columns, self.viewport.width);
        self.clamp_scroll();

        if self.headers_visible && self.coords.header_height > 0 {
            self.paint_headers(renderer);
        }

        let total = self.tree.total_height();
        let bin = self.bin_height();
        if total == 0 || bin <= 0 {
            self.paint_overlays(renderer);
            return;
        }
        let top = self.coords.dy.clamp(0, total - 1);
        let Some((mut level, mut node, within)) = self.tree.find_offset(top) else {
            self.paint_overlays(renderer);
            return;
        };
        let mut rank = self.flattened_rank(level, node);
        let mut y = top - within;
        let bottom = self.coords.dy + bin;
        let width = self.content_width.max(self.viewport.width);

        loop {
            let height = self.tree.node_height(node);
            self.paint_row(renderer, &model, level, node, y, height, width, rank);
            y += height;
            rank += 1;
            if y >= bottom {
                break;
            }
            match self.tree.next_full(level, node) {
                Some((l, n)) => {
                    level = l;
                    node = n;
                }
                None => break,
            }
        }

        if self.grid_lines == GridLines::Vertical || self.grid_lines == GridLines::Both {
            self.paint_vertical_grid(renderer);
        }
        self.paint_overlays(renderer);
    }

    /// Full-visual-order index of a row, counted by walking to the top.
    /// Linear in the scroll position; only used to seed background
    /// striping for the first painted row.
    fn flattened_rank(&self, level: LevelId, node: RowId) -> usize {
        let mut rank = 0;
        let mut pos = self.tree.prev_full(level, node);
        while let Some((l, n)) = pos {
            rank += 1;
            pos = self.tree.prev_full(l, n);
        }
        rank
    }

    #[allow(clippy::too_many_arguments)]
    fn paint_row(
        &self,
        renderer: &mut dyn Renderer,
        model: &Rc<dyn TreeModel>,
        level: LevelId,
        node: RowId,
        tree_y: i32,
        height: i32,
        width: i32,
        rank: usize,
    ) {
        let row_rect = self
            .coords
            .tree_rect_to_widget(Rect::new(0, tree_y, width, height));
        let path = self.tree.find_path(level, node);
        let iter = model.iter_from_path(&path);

        if self
            .row_separator
            .as_ref()
            .zip(iter.as_ref())
            .is_some_and(|(f, it)| f(&**model, it))
        {
            renderer.fill_rect(row_rect, PaintRole::Separator);
            return;
        }

        let background = if rank % 2 == 1 {
            PaintRole::BackgroundAlternate
        } else {
            PaintRole::Background
        };
        renderer.fill_rect(row_rect, background);
        let selected = self.tree.flag_set(node, RowFlags::IS_SELECTED);
        if selected {
            renderer.fill_rect(row_rect, PaintRole::Selection);
        }

        let depth = self.tree.level_depth(level) as i32;
        let indent = depth * self.validate_cfg.indent_per_level;

        if self.tree_lines && depth > 0 {
            for d in 1..=depth {
                let x = self
                    .coords
                    .content_to_bin_x(d * self.validate_cfg.indent_per_level
                        - self.validate_cfg.indent_per_level / 2);
                renderer.draw_line(
                    Point::new(x, row_rect.y),
                    Point::new(x, row_rect.y + height),
                    PaintRole::TreeLine,
                );
            }
        }

        let first_visible = self.first_visible_column();
        for (i, col) in self.columns.iter().enumerate() {
            if !col.is_visible() {
                continue;
            }
            let col_x = column::column_x(&self.columns, i);
            let mut text_x = col_x;
            if Some(i) == first_visible {
                text_x += indent;
                if self.show_expanders {
                    if self.tree.flag_set(node, RowFlags::IS_PARENT) {
                        let expanded = self
                            .tree
                            .node_children(node)
                            .is_some_and(|c| !self.tree.level_is_empty(c));
                        let phase = self.expander_phase(&path);
                        let ex = Rect::new(
                            self.coords.content_to_bin_x(col_x + indent),
                            row_rect.y,
                            self.validate_cfg.expander_size,
                            height,
                        );
                        renderer.fill_rect(ex, PaintRole::Expander { expanded, phase });
                    }
                    text_x += self.validate_cfg.expander_size;
                }
            }
            if let Some(it) = &iter
                && let Some(value) = model.value(it, col.model_column())
            {
                renderer.draw_text(
                    Point::new(self.coords.content_to_bin_x(text_x), row_rect.y),
                    &value.display_text(),
                    selected,
                );
            }
        }

        if self.grid_lines == GridLines::Horizontal || self.grid_lines == GridLines::Both {
            let by = row_rect.y + height;
            renderer.draw_line(
                Point::new(row_rect.x, by),
                Point::new(row_rect.x + width, by),
                PaintRole::GridLine,
            );
        }
    }

    fn expander_phase(&self, path: &TreePath) -> u8 {
        match &self.animation {
            Some(anim) if &anim.path == path => {
                if anim.expanding {
                    anim.phase
                } else {
                    ANIMATION_FRAMES - anim.phase.min(ANIMATION_FRAMES)
                }
            }
            _ => ANIMATION_FRAMES,
        }
    }

    fn paint_headers(&self, renderer: &mut dyn Renderer) {
        let strip = Rect::new(0, 0, self.viewport.width, self.coords.header_height);
        renderer.fill_rect(strip, PaintRole::Background);
        for (i, col) in self.columns.iter().enumerate() {
            if !col.is_visible() {
                continue;
            }
            let x = self
                .coords
                .content_to_bin_x(column::column_x(&self.columns, i));
            renderer.draw_text(Point::new(x, 0), col.title(), false);
        }
    }

    fn paint_vertical_grid(&self, renderer: &mut dyn Renderer) {
        let top = self.coords.header_height;
        let bottom = self.viewport.height;
        let mut x = 0;
        for col in &self.columns {
            if !col.is_visible() {
                continue;
            }
            x += col.width();
            let bx = self.coords.content_to_bin_x(x);
            renderer.draw_line(Point::new(bx, top), Point::new(bx, bottom), PaintRole::GridLine);
        }
    }

    fn paint_overlays(&self, renderer: &mut dyn Renderer) {
        if self.rubber_band.is_active() {
            let rect = self.coords.tree_rect_to_widget(self.rubber_band.rect());
            renderer.fill_rect(rect, PaintRole::RubberBand);
        }
        if let Some(dest) = &self.drag.dest
            && let PathLookup::Found(level, node) = self.tree.find_node(&dest.path)
        {
            let y = self.tree.node_find_offset(level, node);
            let h = self.tree.node_height(node);
            let width = self.content_width.max(self.viewport.width);
            let rect = self
                .coords
                .tree_rect_to_widget(Rect::new(0, y, width, h));
            match dest.pos {
                dnd::DropPosition::Before => renderer.draw_line(
                    Point::new(rect.x, rect.y),
                    Point::new(rect.x + width, rect.y),
                    PaintRole::DropIndicator,
                ),
                dnd::DropPosition::After => renderer.draw_line(
                    Point::new(rect.x, rect.bottom()),
                    Point::new(rect.x + width, rect.bottom()),
                    PaintRole::DropIndicator,
                ),
                _ => renderer.fill_rect(rect, PaintRole::DropIndicator),
            }
        }
    }

    // ----- introspection -----

    /// The cached row forest. Exposed for embedders that need raw access
    /// (custom painting, diagnostics); the structure is read-only here.
    #[doc(hidden)]
    pub fn row_tree(&self) -> &RowTree {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::model::TreeStore;
    use crate::view::render::HeadlessRenderer;

    fn p(s: &str) -> TreePath {
        s.parse().unwrap()
    }

    fn store_with(rows: &[&str]) -> Rc<TreeStore> {
        let store = TreeStore::new(1);
        for t in rows {
            let it = store.append(None);
            store.set_value(&it, 0, (*t).into());
        }
        Rc::new(store)
    }

    fn view_with(store: &Rc<TreeStore>) -> TreeView {
        let mut view = TreeView::new(Rc::new(HeadlessRenderer::new()));
        view.append_column(Column::new("name", 0));
        view.set_headers_visible(false);
        view.set_model(Some(store.clone()));
        view.set_viewport(Size::new(200, 200));
        view.run_pending();
        view
    }

    fn add_child(store: &TreeStore, parent: &str, text: &str) {
        let it = store.iter_from_path(&p(parent)).unwrap();
        let child = store.append(Some(&it));
        store.set_value(&child, 0, text.into());
    }

    fn press_at(view: &mut TreeView, pos: Point, modifiers: KeyboardModifiers) {
        view.button_press(MousePressEvent {
            pos,
            button: MouseButton::Left,
            modifiers,
            click_count: 1,
        });
        view.button_release(MouseReleaseEvent {
            pos,
            button: MouseButton::Left,
            modifiers,
        });
    }

    #[test]
    fn test_set_model_builds_and_measures_top_level() {
        let store = store_with(&["a", "b", "c"]);
        let view = view_with(&store);
        // 22 per row with the headless metrics.
        assert_eq!(view.total_height(), 3 * 22);
        assert_eq!(view.visible_range(), Some((p("0"), p("2"))));
    }

    #[test]
    fn test_expand_and_collapse_row() {
        let store = store_with(&["a", "b"]);
        add_child(&store, "0", "a1");
        add_child(&store, "0", "a2");
        let mut view = view_with(&store);
        view.model_row_has_child_toggled(&p("0"));
        view.run_pending();

        let expanded = Rc::new(Cell::new(0));
        let e = expanded.clone();
        view.row_expanded.connect(move |_| e.set(e.get() + 1));

        assert!(view.expand_row(&p("0"), false));
        view.run_pending();
        assert_eq!(expanded.get(), 1);
        assert!(view.is_row_expanded(&p("0")));
        assert_eq!(view.total_height(), 4 * 22);

        assert!(view.collapse_row(&p("0")));
        assert!(!view.is_row_expanded(&p("0")));
        assert_eq!(view.total_height(), 2 * 22);
    }

    #[test]
    fn test_expand_veto() {
        let store = store_with(&["a"]);
        add_child(&store, "0", "a1");
        let mut view = view_with(&store);
        view.model_row_has_child_toggled(&p("0"));
        view.set_test_expand_row(Some(Box::new(|_| false)));
        assert!(!view.expand_row(&p("0"), false));
        assert!(!view.is_row_expanded(&p("0")));
    }

    #[test]
    fn test_collapse_drops_hidden_selection_once() {
        let store = store_with(&["a"]);
        add_child(&store, "0", "a1");
        add_child(&store, "0", "a2");
        add_child(&store, "0", "a3");
        let mut view = view_with(&store);
        view.model_row_has_child_toggled(&p("0"));
        view.expand_row(&p("0"), false);
        view.run_pending();

        view.select_path(&p("0:0"));
        view.select_path(&p("0:2"));
        assert_eq!(view.count_selected(), 2);

        let changed = Rc::new(Cell::new(0));
        let c = changed.clone();
        view.selection().changed.connect(move |_| c.set(c.get() + 1));

        view.collapse_row(&p("0"));
        assert_eq!(changed.get(), 1);
        assert_eq!(view.count_selected(), 0);
    }

    #[test]
    fn test_click_selection_modes() {
        let store = store_with(&["a", "b", "c", "d"]);
        let mut view = view_with(&store);

        // Row i spans y [i*22, (i+1)*22).
        press_at(&mut view, Point::new(50, 1 * 22 + 5), KeyboardModifiers::NONE);
        assert_eq!(view.selected_paths(), vec![p("1")]);
        assert_eq!(view.cursor_path(), Some(p("1")));

        // Ctrl-click toggles another row in.
        press_at(&mut view, Point::new(50, 3 * 22 + 5), KeyboardModifiers::CTRL);
        assert_eq!(view.selected_paths(), vec![p("1"), p("3")]);

        // Shift-click ranges from the anchor (row 1).
        press_at(&mut view, Point::new(50, 2 * 22 + 5), KeyboardModifiers::SHIFT);
        assert_eq!(view.selected_paths(), vec![p("1"), p("2")]);
    }

    #[test]
    fn test_double_click_activates() {
        let store = store_with(&["a", "b"]);
        let mut view = view_with(&store);
        let activated = Rc::new(Cell::new(None));
        let a = activated.clone();
        view.row_activated
            .connect(move |(path, _)| a.set(Some(path.clone())));

        view.button_press(MousePressEvent {
            pos: Point::new(50, 22 + 3),
            button: MouseButton::Left,
            modifiers: KeyboardModifiers::NONE,
            click_count: 2,
        });
        assert_eq!(activated.take(), Some(p("1")));
    }

    #[test]
    fn test_rubber_band_gesture() {
        let store = store_with(&["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);
        let mut view = view_with(&store);
        view.set_rubber_banding(true);

        let changed = Rc::new(Cell::new(0));
        let c = changed.clone();
        view.selection().changed.connect(move |_| c.set(c.get() + 1));

        // Press inside row 2, drag to row 7, release.
        let start = Point::new(10, 2 * 22 + 4);
        view.button_press(MousePressEvent {
            pos: start,
            button: MouseButton::Left,
            modifiers: KeyboardModifiers::NONE,
            click_count: 1,
        });
        for y in [start.y + 20, 5 * 22 + 4, 7 * 22 + 10] {
            view.motion(MouseMoveEvent {
                pos: Point::new(12, y),
                modifiers: KeyboardModifiers::NONE,
            });
        }
        assert_eq!(changed.get(), 0);
        view.button_release(MouseReleaseEvent {
            pos: Point::new(12, 7 * 22 + 10),
            button: MouseButton::Left,
            modifiers: KeyboardModifiers::NONE,
        });

        assert_eq!(changed.get(), 1);
        assert_eq!(
            view.selected_paths(),
            vec![p("2"), p("3"), p("4"), p("5"), p("6"), p("7")]
        );
        assert_eq!(view.cursor_path(), Some(p("7")));
    }

    #[test]
    fn test_keyboard_navigation() {
        let store = store_with(&["a", "b", "c"]);
        let mut view = view_with(&store);

        let key = |view: &mut TreeView, key| {
            view.key_press(KeyPressEvent {
                key,
                modifiers: KeyboardModifiers::NONE,
            })
        };
        assert!(key(&mut view, Key::Down));
        assert_eq!(view.cursor_path(), Some(p("0")));
        assert!(key(&mut view, Key::Down));
        assert_eq!(view.cursor_path(), Some(p("1")));
        assert_eq!(view.selected_paths(), vec![p("1")]);
        assert!(key(&mut view, Key::End));
        assert_eq!(view.cursor_path(), Some(p("2")));
        assert!(key(&mut view, Key::Home));
        assert_eq!(view.cursor_path(), Some(p("0")));
        assert!(!key(&mut view, Key::Up));
    }

    #[test]
    fn test_typeahead_moves_cursor() {
        let store = store_with(&["apple", "banana", "cherry"]);
        let mut view = view_with(&store);

        view.key_press(KeyPressEvent {
            key: Key::Char('c'),
            modifiers: KeyboardModifiers::NONE,
        });
        assert_eq!(view.cursor_path(), Some(p("2")));
        assert_eq!(view.selected_paths(), vec![p("2")]);

        // Escape flushes the buffer.
        assert!(view.key_press(KeyPressEvent {
            key: Key::Escape,
            modifiers: KeyboardModifiers::NONE,
        }));
        view.key_press(KeyPressEvent {
            key: Key::Char('b'),
            modifiers: KeyboardModifiers::NONE,
        });
        assert_eq!(view.cursor_path(), Some(p("1")));
    }

    #[test]
    fn test_row_deleted_under_cursor_clears_it() {
        let store = store_with(&["a", "b", "c"]);
        let mut view = view_with(&store);
        view.set_cursor(&p("1"));
        assert_eq!(view.cursor_path(), Some(p("1")));

        let cursor_events = Rc::new(Cell::new(0));
        let c = cursor_events.clone();
        view.cursor_changed.connect(move |_| c.set(c.get() + 1));

        let it = store.iter_from_path(&p("1")).unwrap();
        store.remove(&it);
        view.model_row_deleted(&p("1"));

        assert_eq!(view.cursor_path(), None);
        assert_eq!(cursor_events.get(), 1);
        assert_eq!(view.total_height(), 2 * 22);
    }

    #[test]
    fn test_row_inserted_keeps_order() {
        let store = store_with(&["a", "c"]);
        let mut view = view_with(&store);
        let it = store.insert(None, 1);
        store.set_value(&it, 0, "b".into());
        view.model_row_inserted(&p("1"));
        view.run_pending();
        assert_eq!(view.total_height(), 3 * 22);
        assert_eq!(view.visible_range(), Some((p("0"), p("2"))));
    }

    #[test]
    fn test_fixed_height_scroll_without_measurement() {
        let store = TreeStore::new(1);
        for i in 0..2000 {
            let it = store.append(None);
            store.set_value(&it, 0, format!("row {i}").into());
        }
        let store = Rc::new(store);
        let mut view = TreeView::new(Rc::new(HeadlessRenderer::new()));
        view.append_column(Column::new("name", 0).with_fixed_width(120));
        view.set_headers_visible(false);
        view.set_fixed_height_mode(true);
        view.set_fixed_row_height(20);
        view.set_model(Some(store));
        view.set_viewport(Size::new(200, 100));
        view.run_pending();

        assert!(view.scroll_to_cell(&p("1000"), Some(0.0)));
        assert_eq!(view.vertical_offset(), 20_000);
        assert_eq!(view.total_height(), 40_000);
    }

    #[test]
    fn test_expander_click_toggles() {
        let store = store_with(&["a"]);
        add_child(&store, "0", "a1");
        let mut view = view_with(&store);
        view.model_row_has_child_toggled(&p("0"));
        view.run_pending();

        // Depth 0: expander occupies x [0, 14) in the first column.
        press_at(&mut view, Point::new(5, 4), KeyboardModifiers::NONE);
        assert!(view.is_row_expanded(&p("0")));
        press_at(&mut view, Point::new(5, 4), KeyboardModifiers::NONE);
        assert!(!view.is_row_expanded(&p("0")));
    }

    #[test]
    fn test_drag_drop_reorders_store() {
        let store = store_with(&["a", "b", "c"]);
        let mut view = view_with(&store);
        view.set_reorderable(true);

        // Press on row 0, drag past the threshold, drop below row 2.
        view.button_press(MousePressEvent {
            pos: Point::new(30, 4),
            button: MouseButton::Left,
            modifiers: KeyboardModifiers::NONE,
            click_count: 1,
        });
        view.motion(MouseMoveEvent {
            pos: Point::new(30, 40),
            modifiers: KeyboardModifiers::NONE,
        });
        let drop_pos = Point::new(30, 2 * 22 + 20);
        let dest = view.drag_motion(drop_pos).unwrap();
        assert_eq!(dest.path, p("2"));
        assert!(view.drag_drop(drop_pos));

        let texts: Vec<String> = (0..3)
            .map(|i| {
                let it = store.iter_from_path(&p(&i.to_string())).unwrap();
                store.value(&it, 0).unwrap().display_text()
            })
            .collect();
        assert_eq!(texts, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_paint_records_selection() {
        let store = store_with(&["a", "b"]);
        let mut view = view_with(&store);
        view.select_path(&p("1"));

        let mut renderer = HeadlessRenderer::new();
        view.paint(&mut renderer);
        let selection_fills = renderer
            .ops
            .iter()
            .filter(|op| matches!(op, crate::view::render::PaintOp::FillRect(_, PaintRole::Selection)))
            .count();
        assert_eq!(selection_fills, 1);
        let texts = renderer
            .ops
            .iter()
            .filter(|op| matches!(op, crate::view::render::PaintOp::Text(..)))
            .count();
        assert_eq!(texts, 2);
    }

    #[test]
    fn test_hover_selection_follows_pointer() {
        let store = store_with(&["a", "b", "c"]);
        let mut view = view_with(&store);
        view.set_hover_selection(true);

        view.motion(MouseMoveEvent {
            pos: Point::new(40, 22 + 4),
            modifiers: KeyboardModifiers::NONE,
        });
        assert_eq!(view.selected_paths(), vec![p("1")]);
        assert_eq!(view.cursor_path(), Some(p("1")));
    }

    #[test]
    fn test_separator_rows_are_inert() {
        let store = store_with(&["a", "-", "b"]);
        let mut view = view_with(&store);
        view.set_row_separator_func(Some(Box::new(|model, iter| {
            model.value(iter, 0).is_some_and(|v| v.display_text() == "-")
        })));
        view.run_pending();
        assert_eq!(view.total_height(), 2 * 22 + 2);

        let key = |view: &mut TreeView, key| {
            view.key_press(KeyPressEvent {
                key,
                modifiers: KeyboardModifiers::NONE,
            })
        };
        // Cursor motion steps over the separator.
        assert!(key(&mut view, Key::Down));
        assert_eq!(view.cursor_path(), Some(p("0")));
        assert!(key(&mut view, Key::Down));
        assert_eq!(view.cursor_path(), Some(p("2")));
        assert!(key(&mut view, Key::Up));
        assert_eq!(view.cursor_path(), Some(p("0")));

        // Clicking the separator selects nothing.
        view.unselect_all();
        press_at(&mut view, Point::new(30, 22 + 1), KeyboardModifiers::NONE);
        assert_eq!(view.count_selected(), 0);
    }

    #[test]
    fn test_selection_mode_trim() {
        let store = store_with(&["a", "b", "c"]);
        let mut view = view_with(&store);
        view.select_path(&p("0"));
        press_at(&mut view, Point::new(50, 2 * 22 + 4), KeyboardModifiers::CTRL);
        assert_eq!(view.count_selected(), 2);

        view.set_selection_mode(SelectionMode::Single);
        // The cursor row (2) survives.
        assert_eq!(view.selected_paths(), vec![p("2")]);
    }

    #[test]
    fn test_wire_model_signals() {
        let store = store_with(&["a"]);
        let view = Rc::new(RefCell::new(view_with(&store)));
        TreeView::wire_model_signals(&view);

        let it = store.append(None);
        store.set_value(&it, 0, "b".into());
        view.borrow_mut().run_pending();
        assert_eq!(view.borrow().total_height(), 2 * 22);

        store.remove(&store.iter_from_path(&p("0")).unwrap());
        view.borrow_mut().run_pending();
        assert_eq!(view.borrow().total_height(), 22);
    }
}
