//! Selection state and the low-level selection mutators.
//!
//! Selected-ness itself lives on the row nodes ([`RowFlags::IS_SELECTED`]),
//! so it survives rebalancing and reordering for free. This module holds
//! the mode, the user's selectability predicate and the `changed` signal,
//! plus the primitive mutations every gesture funnels through. Cursor and
//! anchor handling, range gestures and event plumbing sit in the view,
//! which owns the row tree.

use alder_core::Signal;

use crate::model::TreePath;
use crate::view::rbtree::{LevelId, RowFlags, RowId, RowTree};

/// What the user may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Nothing is selectable; the cursor still moves.
    None,
    /// At most one row.
    Single,
    /// Exactly one row whenever the model is non-empty; selection follows
    /// the cursor and cannot be emptied by the user.
    Browse,
    /// Any set of rows; ranges, toggling and rubber-banding are available.
    #[default]
    Multiple,
}

/// Predicate deciding whether a row's selection state may change.
/// Args: the row's path and whether it is currently selected.
pub type SelectFunction = Box<dyn Fn(&TreePath, bool) -> bool>;

/// The view's selection state machine.
pub struct TreeSelection {
    mode: SelectionMode,
    select_function: Option<SelectFunction>,
    /// Emitted once per user-visible selection change, not once per row.
    pub changed: Signal<()>,
}

impl Default for TreeSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeSelection {
    pub fn new() -> Self {
        Self {
            mode: SelectionMode::default(),
            select_function: None,
            changed: Signal::new(),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Change the mode. The caller (the view) is responsible for trimming
    /// an existing multiple selection down when entering `Single`/`Browse`.
    pub fn set_mode(&mut self, mode: SelectionMode) {
        self.mode = mode;
    }

    /// Install a predicate consulted before any row's selection state
    /// changes. Rows failing it are skipped, not errors.
    pub fn set_select_function(&mut self, f: Option<SelectFunction>) {
        self.select_function = f;
    }

    /// Whether the selection state of the row at `path` may be changed.
    pub fn row_may_change(&self, path: &TreePath, currently_selected: bool) -> bool {
        match &self.select_function {
            Some(f) => f(path, currently_selected),
            None => true,
        }
    }

    /// Set one row's selected bit, consulting the predicate. Returns
    /// whether the flag actually changed. Does not emit `changed`; callers
    /// batch rows and emit once.
    pub(crate) fn real_select_node(
        &self,
        tree: &mut RowTree,
        level: LevelId,
        node: RowId,
        select: bool,
    ) -> bool {
        let selected = tree.flag_set(node, RowFlags::IS_SELECTED);
        if selected == select {
            return false;
        }
        if self.mode == SelectionMode::None && select {
            return false;
        }
        let path = tree.find_path(level, node);
        if !self.row_may_change(&path, selected) {
            return false;
        }
        if select {
            tree.set_flag(node, RowFlags::IS_SELECTED);
        } else {
            tree.unset_flag(node, RowFlags::IS_SELECTED);
        }
        true
    }

    /// Select or unselect every row between two positions inclusive, in
    /// full visual order; the endpoints may be given in either order.
    /// Returns whether anything changed.
    pub(crate) fn modify_range(
        &self,
        tree: &mut RowTree,
        a: (LevelId, RowId),
        b: (LevelId, RowId),
        select: bool,
    ) -> bool {
        let a_off = tree.node_find_offset(a.0, a.1);
        let b_off = tree.node_find_offset(b.0, b.1);
        let (start, end) = if a_off <= b_off { (a, b) } else { (b, a) };

        let mut dirty = false;
        let mut pos = Some(start);
        while let Some((level, node)) = pos {
            dirty |= self.real_select_node(tree, level, node, select);
            if (level, node) == end {
                break;
            }
            pos = tree.next_full(level, node);
        }
        dirty
    }

    /// Unselect every row in the forest. Returns whether anything changed.
    pub(crate) fn unselect_all(&self, tree: &mut RowTree) -> bool {
        let mut dirty = false;
        let root = tree.root_level();
        let mut pos = tree.first_node(root).map(|n| (root, n));
        while let Some((level, node)) = pos {
            dirty |= self.real_select_node(tree, level, node, false);
            pos = tree.next_full(level, node);
        }
        dirty
    }

    /// Select every row in the forest (`Multiple` mode only). Returns
    /// whether anything changed.
    pub(crate) fn select_all(&self, tree: &mut RowTree) -> bool {
        if self.mode != SelectionMode::Multiple {
            tracing::warn!(target: "alder::selection", "select_all outside Multiple mode");
            return false;
        }
        let mut dirty = false;
        let root = tree.root_level();
        let mut pos = tree.first_node(root).map(|n| (root, n));
        while let Some((level, node)) = pos {
            dirty |= self.real_select_node(tree, level, node, true);
            pos = tree.next_full(level, node);
        }
        dirty
    }

    /// Number of selected rows.
    pub fn count_selected(&self, tree: &RowTree) -> usize {
        let root = tree.root_level();
        let mut count = 0;
        let mut pos = tree.first_node(root).map(|n| (root, n));
        while let Some((level, node)) = pos {
            if tree.flag_set(node, RowFlags::IS_SELECTED) {
                count += 1;
            }
            pos = tree.next_full(level, node);
        }
        count
    }

    /// Paths of all selected rows, top to bottom.
    pub fn selected_paths(&self, tree: &RowTree) -> Vec<TreePath> {
        let root = tree.root_level();
        let mut paths = Vec::new();
        let mut pos = tree.first_node(root).map(|n| (root, n));
        while let Some((level, node)) = pos {
            if tree.flag_set(node, RowFlags::IS_SELECTED) {
                paths.push(tree.find_path(level, node));
            }
            pos = tree.next_full(level, node);
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_tree(n: usize) -> (RowTree, Vec<RowId>) {
        let mut tree = RowTree::new();
        let level = tree.root_level();
        let mut ids = Vec::new();
        let mut prev = None;
        for _ in 0..n {
            let id = tree.insert_after(level, prev, 10, true);
            ids.push(id);
            prev = Some(id);
        }
        (tree, ids)
    }

    #[test]
    fn test_select_and_count() {
        let (mut tree, ids) = flat_tree(4);
        let sel = TreeSelection::new();
        let level = tree.root_level();

        assert!(sel.real_select_node(&mut tree, level, ids[1], true));
        // Selecting an already-selected row changes nothing.
        assert!(!sel.real_select_node(&mut tree, level, ids[1], true));
        assert_eq!(sel.count_selected(&tree), 1);
        assert_eq!(sel.selected_paths(&tree), vec!["1".parse().unwrap()]);
    }

    #[test]
    fn test_modify_range_either_direction() {
        let (mut tree, ids) = flat_tree(6);
        let sel = TreeSelection::new();
        let level = tree.root_level();

        assert!(sel.modify_range(&mut tree, (level, ids[4]), (level, ids[1]), true));
        assert_eq!(sel.count_selected(&tree), 4);
        assert!(!tree.flag_set(ids[0], RowFlags::IS_SELECTED));
        assert!(!tree.flag_set(ids[5], RowFlags::IS_SELECTED));
    }

    #[test]
    fn test_range_descends_into_children() {
        let (mut tree, ids) = flat_tree(3);
        let root = tree.root_level();
        let child_level = tree.add_child_level(root, ids[0]);
        let c = tree.insert_after(child_level, None, 10, true);

        let sel = TreeSelection::new();
        sel.modify_range(&mut tree, (root, ids[0]), (root, ids[1]), true);
        assert!(tree.flag_set(c, RowFlags::IS_SELECTED));
        assert_eq!(sel.count_selected(&tree), 3);
    }

    #[test]
    fn test_select_function_skips_rows() {
        let (mut tree, ids) = flat_tree(4);
        let mut sel = TreeSelection::new();
        // Row 2 is never selectable.
        sel.set_select_function(Some(Box::new(|path, _| path.indices() != [2])));

        let level = tree.root_level();
        sel.modify_range(&mut tree, (level, ids[0]), (level, ids[3]), true);
        assert_eq!(sel.count_selected(&tree), 3);
        assert!(!tree.flag_set(ids[2], RowFlags::IS_SELECTED));
    }

    #[test]
    fn test_none_mode_blocks_select() {
        let (mut tree, ids) = flat_tree(2);
        let mut sel = TreeSelection::new();
        sel.set_mode(SelectionMode::None);
        let level = tree.root_level();
        assert!(!sel.real_select_node(&mut tree, level, ids[0], true));
        assert_eq!(sel.count_selected(&tree), 0);
    }

    #[test]
    fn test_unselect_all_emits_once_semantics() {
        let (mut tree, _) = flat_tree(5);
        let sel = TreeSelection::new();
        sel.select_all(&mut tree);
        assert_eq!(sel.count_selected(&tree), 5);
        assert!(sel.unselect_all(&mut tree));
        assert!(!sel.unselect_all(&mut tree));
        assert_eq!(sel.count_selected(&tree), 0);
    }
}
