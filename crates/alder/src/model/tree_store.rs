//! A concrete hierarchical model.
//!
//! [`TreeStore`] owns its rows outright: each row is a vector of optional
//! [`CellValue`]s plus a child list, arena-allocated in a [`slotmap`]. It
//! implements the full [`TreeModel`] contract including persistent
//! iterators, and both drag capabilities, which makes it the workhorse for
//! tests and for applications that do not need a virtual model.
//!
//! All mutating methods take `&self`; the row storage lives behind a
//! `RefCell` so views and application code can share the store. Signals
//! are emitted after the cell borrow is released, so a slot may freely
//! call back into the store.

use std::cell::RefCell;

use slotmap::{Key, KeyData, SlotMap, new_key_type};

use super::path::TreePath;
use super::traits::{
    CellValue, ModelFlags, ModelSignals, RowData, RowDragDest, RowDragSource, TreeIter, TreeModel,
};

new_key_type! {
    struct StoreNodeId;
}

struct StoreNode {
    values: Vec<Option<CellValue>>,
    parent: Option<StoreNodeId>,
    children: Vec<StoreNodeId>,
}

struct TreeStoreData {
    nodes: SlotMap<StoreNodeId, StoreNode>,
    roots: Vec<StoreNodeId>,
    n_columns: usize,
    stamp: i32,
}

/// An owned, mutable tree of rows implementing [`TreeModel`].
pub struct TreeStore {
    data: RefCell<TreeStoreData>,
    signals: ModelSignals,
}

impl TreeStore {
    /// Create an empty store whose rows carry `n_columns` values each.
    pub fn new(n_columns: usize) -> Self {
        Self {
            data: RefCell::new(TreeStoreData {
                nodes: SlotMap::with_key(),
                roots: Vec::new(),
                n_columns,
                stamp: 1,
            }),
            signals: ModelSignals::new(),
        }
    }

    fn iter_to_id(&self, iter: &TreeIter) -> Option<StoreNodeId> {
        let data = self.data.borrow();
        if iter.stamp != data.stamp {
            tracing::warn!(target: "alder::model", "stale iterator (stamp mismatch)");
            return None;
        }
        let id = StoreNodeId::from(KeyData::from_ffi(iter.user_data));
        data.nodes.contains_key(id).then_some(id)
    }

    fn id_to_iter(&self, id: StoreNodeId) -> TreeIter {
        TreeIter {
            stamp: self.data.borrow().stamp,
            user_data: id.data().as_ffi(),
        }
    }

    fn id_to_path(&self, id: StoreNodeId) -> TreePath {
        let data = self.data.borrow();
        let mut indices = Vec::new();
        let mut cur = id;
        loop {
            let node = &data.nodes[cur];
            let siblings = match node.parent {
                Some(p) => &data.nodes[p].children,
                None => &data.roots,
            };
            let idx = siblings.iter().position(|&s| s == cur).unwrap_or(0);
            indices.push(idx);
            match node.parent {
                Some(p) => cur = p,
                None => break,
            }
        }
        indices.reverse();
        TreePath::from_indices(indices)
    }

    fn path_to_id(&self, path: &TreePath) -> Option<StoreNodeId> {
        let data = self.data.borrow();
        let mut indices = path.indices().iter();
        let &first = indices.next()?;
        let mut cur = *data.roots.get(first)?;
        for &idx in indices {
            cur = *data.nodes[cur].children.get(idx)?;
        }
        Some(cur)
    }

    /// Insert a new empty row at `position` among the children of `parent`
    /// (top level for `None`); positions past the end append. Emits
    /// `row_inserted`, plus `row_has_child_toggled` when the parent gains
    /// its first child.
    pub fn insert(&self, parent: Option<&TreeIter>, position: usize) -> TreeIter {
        let parent_id = parent.and_then(|it| self.iter_to_id(it));
        let (id, first_child) = {
            let mut data = self.data.borrow_mut();
            let n_columns = data.n_columns;
            let id = data.nodes.insert(StoreNode {
                values: vec![None; n_columns],
                parent: parent_id,
                children: Vec::new(),
            });
            let siblings = match parent_id {
                Some(p) => &mut data.nodes[p].children,
                None => &mut data.roots,
            };
            let pos = position.min(siblings.len());
            siblings.insert(pos, id);
            let first_child = parent_id.is_some() && siblings.len() == 1;
            (id, first_child)
        };

        let iter = self.id_to_iter(id);
        self.signals.emit_row_inserted(self.id_to_path(id), iter);
        if first_child && let Some(pid) = parent_id {
            self.signals
                .emit_row_has_child_toggled(self.id_to_path(pid), self.id_to_iter(pid));
        }
        iter
    }

    /// Append a new empty row as the last child of `parent`.
    pub fn append(&self, parent: Option<&TreeIter>) -> TreeIter {
        self.insert(parent, usize::MAX)
    }

    /// Set one cell of a row. Emits `row_changed`.
    pub fn set_value(&self, iter: &TreeIter, column: usize, value: CellValue) {
        let Some(id) = self.iter_to_id(iter) else {
            tracing::warn!(target: "alder::model", "set_value with stale iterator");
            return;
        };
        {
            let mut data = self.data.borrow_mut();
            if column >= data.n_columns {
                tracing::warn!(target: "alder::model", column, "set_value column out of range");
                return;
            }
            data.nodes[id].values[column] = Some(value);
        }
        self.signals.emit_row_changed(self.id_to_path(id), *iter);
    }

    /// Set several cells of a row, emitting a single `row_changed`.
    pub fn set_values(&self, iter: &TreeIter, values: &[(usize, CellValue)]) {
        let Some(id) = self.iter_to_id(iter) else {
            tracing::warn!(target: "alder::model", "set_values with stale iterator");
            return;
        };
        {
            let mut data = self.data.borrow_mut();
            let n_columns = data.n_columns;
            for (column, value) in values {
                if *column >= n_columns {
                    tracing::warn!(target: "alder::model", column, "set_values column out of range");
                    continue;
                }
                data.nodes[id].values[*column] = Some(value.clone());
            }
        }
        self.signals.emit_row_changed(self.id_to_path(id), *iter);
    }

    /// Remove a row and all of its descendants. Emits one `row_deleted`
    /// for the removed row (descendants go silently with it, as their
    /// positions are meaningless once the subtree root is gone), plus
    /// `row_has_child_toggled` when the parent lost its last child.
    pub fn remove(&self, iter: &TreeIter) -> bool {
        let Some(id) = self.iter_to_id(iter) else {
            return false;
        };
        let path = self.id_to_path(id);
        let (parent_id, last_child) = {
            let mut data = self.data.borrow_mut();
            let parent_id = data.nodes[id].parent;
            match parent_id {
                Some(p) => data.nodes[p].children.retain(|&c| c != id),
                None => data.roots.retain(|&c| c != id),
            }
            let last_child =
                parent_id.is_some_and(|p| data.nodes[p].children.is_empty());
            free_subtree(&mut data.nodes, id);
            (parent_id, last_child)
        };

        self.signals.emit_row_deleted(path);
        if last_child && let Some(pid) = parent_id {
            self.signals
                .emit_row_has_child_toggled(self.id_to_path(pid), self.id_to_iter(pid));
        }
        true
    }

    /// Drop every row and bump the iterator stamp, invalidating all
    /// outstanding iterators. Emits `row_deleted` for each top-level row,
    /// last first, so views can tear down incrementally.
    pub fn clear(&self) {
        loop {
            let last = {
                let data = self.data.borrow();
                data.roots.last().copied()
            };
            let Some(id) = last else { break };
            let path = self.id_to_path(id);
            {
                let mut data = self.data.borrow_mut();
                data.roots.pop();
                free_subtree(&mut data.nodes, id);
            }
            self.signals.emit_row_deleted(path);
        }
        let mut data = self.data.borrow_mut();
        data.stamp = data.stamp.wrapping_add(1).max(1);
    }

    /// Permute the children of `parent` so that the row at old position
    /// `new_order[i]` moves to position `i`. Emits `rows_reordered`.
    pub fn reorder(&self, parent: Option<&TreeIter>, new_order: &[usize]) {
        let parent_id = parent.and_then(|it| self.iter_to_id(it));
        let parent_path = match parent_id {
            Some(id) => self.id_to_path(id),
            None => TreePath::new(),
        };
        {
            let mut data = self.data.borrow_mut();
            let siblings = match parent_id {
                Some(p) => &mut data.nodes[p].children,
                None => &mut data.roots,
            };
            if new_order.len() != siblings.len()
                || !is_permutation(new_order)
            {
                tracing::warn!(target: "alder::model", "reorder: not a permutation of the children");
                return;
            }
            let old = siblings.clone();
            for (new_pos, &old_pos) in new_order.iter().enumerate() {
                siblings[new_pos] = old[old_pos];
            }
        }
        self.signals
            .emit_rows_reordered(parent_path, new_order.to_vec());
    }

    /// Number of rows in the whole store.
    pub fn len(&self) -> usize {
        self.data.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().nodes.is_empty()
    }

    fn copy_subtree(&self, src_path: &TreePath, dest: &TreePath) -> bool {
        let Some(src) = self.path_to_id(src_path) else {
            return false;
        };
        let Some(position) = dest.last_index() else {
            return false;
        };
        let dest_parent = match dest.parent() {
            Some(pp) => match self.path_to_id(&pp) {
                Some(id) => {
                    let it = self.id_to_iter(id);
                    Some(it)
                }
                None => return false,
            },
            None => {
                if dest.depth() != 1 {
                    return false;
                }
                None
            }
        };

        let iter = self.insert(dest_parent.as_ref(), position);
        // Re-resolve: the insert shifted src if it was a later sibling of
        // the same parent, but ids are stable so the id lookup above holds.
        let values: Vec<(usize, CellValue)> = {
            let data = self.data.borrow();
            data.nodes[src]
                .values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.clone().map(|v| (i, v)))
                .collect()
        };
        self.set_values(&iter, &values);

        let children: Vec<StoreNodeId> = self.data.borrow().nodes[src].children.clone();
        let dest_base = self.path_from_iter(&iter).unwrap_or_else(TreePath::new);
        for (i, child) in children.into_iter().enumerate() {
            let child_path = self.id_to_path(child);
            if !self.copy_subtree(&child_path, &dest_base.child(i)) {
                return false;
            }
        }
        true
    }
}

fn free_subtree(nodes: &mut SlotMap<StoreNodeId, StoreNode>, id: StoreNodeId) {
    let children = std::mem::take(&mut nodes[id].children);
    for child in children {
        free_subtree(nodes, child);
    }
    nodes.remove(id);
}

fn is_permutation(order: &[usize]) -> bool {
    let mut seen = vec![false; order.len()];
    for &i in order {
        if i >= order.len() || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    true
}

impl TreeModel for TreeStore {
    fn flags(&self) -> ModelFlags {
        ModelFlags {
            iters_persist: true,
            list_only: false,
        }
    }

    fn n_columns(&self) -> usize {
        self.data.borrow().n_columns
    }

    fn iter_from_path(&self, path: &TreePath) -> Option<TreeIter> {
        self.path_to_id(path).map(|id| self.id_to_iter(id))
    }

    fn path_from_iter(&self, iter: &TreeIter) -> Option<TreePath> {
        self.iter_to_id(iter).map(|id| self.id_to_path(id))
    }

    fn value(&self, iter: &TreeIter, column: usize) -> Option<CellValue> {
        let id = self.iter_to_id(iter)?;
        let data = self.data.borrow();
        data.nodes[id].values.get(column)?.clone()
    }

    fn iter_next(&self, iter: &mut TreeIter) -> bool {
        let Some(id) = self.iter_to_id(iter) else {
            return false;
        };
        let data = self.data.borrow();
        let siblings = match data.nodes[id].parent {
            Some(p) => &data.nodes[p].children,
            None => &data.roots,
        };
        let Some(pos) = siblings.iter().position(|&s| s == id) else {
            return false;
        };
        match siblings.get(pos + 1) {
            Some(&next) => {
                iter.user_data = next.data().as_ffi();
                true
            }
            None => false,
        }
    }

    fn iter_children(&self, parent: Option<&TreeIter>) -> Option<TreeIter> {
        self.iter_nth_child(parent, 0)
    }

    fn iter_has_child(&self, iter: &TreeIter) -> bool {
        self.iter_to_id(iter)
            .is_some_and(|id| !self.data.borrow().nodes[id].children.is_empty())
    }

    fn iter_n_children(&self, iter: Option<&TreeIter>) -> usize {
        let data = self.data.borrow();
        match iter {
            Some(it) => {
                drop(data);
                match self.iter_to_id(it) {
                    Some(id) => self.data.borrow().nodes[id].children.len(),
                    None => 0,
                }
            }
            None => data.roots.len(),
        }
    }

    fn iter_nth_child(&self, iter: Option<&TreeIter>, n: usize) -> Option<TreeIter> {
        let id = match iter {
            Some(it) => {
                let parent = self.iter_to_id(it)?;
                let data = self.data.borrow();
                *data.nodes[parent].children.get(n)?
            }
            None => {
                let data = self.data.borrow();
                *data.roots.get(n)?
            }
        };
        Some(self.id_to_iter(id))
    }

    fn iter_parent(&self, iter: &TreeIter) -> Option<TreeIter> {
        let id = self.iter_to_id(iter)?;
        let parent = self.data.borrow().nodes[id].parent?;
        Some(self.id_to_iter(parent))
    }

    fn signals(&self) -> &ModelSignals {
        &self.signals
    }

    fn drag_source(&self) -> Option<&dyn RowDragSource> {
        Some(self)
    }

    fn drag_dest(&self) -> Option<&dyn RowDragDest> {
        Some(self)
    }
}

impl RowDragSource for TreeStore {
    fn row_draggable(&self, path: &TreePath) -> bool {
        self.path_to_id(path).is_some()
    }

    fn drag_data_get(&self, path: &TreePath) -> Option<RowData> {
        self.path_to_id(path)?;
        Some(RowData { path: path.clone() })
    }

    fn drag_data_delete(&self, path: &TreePath) -> bool {
        match self.iter_from_path(path) {
            Some(iter) => self.remove(&iter),
            None => false,
        }
    }
}

impl RowDragDest for TreeStore {
    fn row_drop_possible(&self, dest: &TreePath, data: &RowData) -> bool {
        if dest.is_empty() || data.path.contains(dest) {
            return false;
        }
        // The destination's parent must exist and the index must be at most
        // one past its current child count.
        let Some(position) = dest.last_index() else {
            return false;
        };
        let n = match dest.parent() {
            Some(pp) => match self.iter_from_path(&pp) {
                Some(it) => self.iter_n_children(Some(&it)),
                None => return false,
            },
            None => {
                if dest.depth() != 1 {
                    return false;
                }
                self.iter_n_children(None)
            }
        };
        position <= n
    }

    fn drag_data_received(&self, dest: &TreePath, data: &RowData) -> bool {
        if !self.row_drop_possible(dest, data) {
            return false;
        }
        self.copy_subtree(&data.path, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store_with_rows(texts: &[&str]) -> TreeStore {
        let store = TreeStore::new(1);
        for t in texts {
            let it = store.append(None);
            store.set_value(&it, 0, (*t).into());
        }
        store
    }

    #[test]
    fn test_append_and_lookup() {
        let store = store_with_rows(&["a", "b", "c"]);
        assert_eq!(store.iter_n_children(None), 3);

        let it = store.iter_from_path(&"1".parse().unwrap()).unwrap();
        assert_eq!(store.value(&it, 0), Some("b".into()));
        assert_eq!(store.path_from_iter(&it), Some("1".parse().unwrap()));
    }

    #[test]
    fn test_iter_next_walks_siblings() {
        let store = store_with_rows(&["a", "b", "c"]);
        let mut it = store.iter_children(None).unwrap();
        let mut seen = Vec::new();
        loop {
            seen.push(store.value(&it, 0).unwrap().display_text());
            if !store.iter_next(&mut it) {
                break;
            }
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_nested_rows_and_paths() {
        let store = TreeStore::new(1);
        let root = store.append(None);
        let child = store.append(Some(&root));
        let grandchild = store.append(Some(&child));
        store.set_value(&grandchild, 0, "deep".into());

        assert!(store.iter_has_child(&root));
        assert_eq!(
            store.path_from_iter(&grandchild),
            Some("0:0:0".parse().unwrap())
        );
        assert_eq!(store.iter_parent(&grandchild), Some(child));
    }

    #[test]
    fn test_insert_signals() {
        let store = TreeStore::new(1);
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        store.signals().row_inserted.connect(move |(path, _)| {
            l.borrow_mut().push(format!("ins {path}"));
        });
        let l = log.clone();
        store
            .signals()
            .row_has_child_toggled
            .connect(move |(path, _)| {
                l.borrow_mut().push(format!("tog {path}"));
            });

        let root = store.append(None);
        store.append(Some(&root));
        assert_eq!(*log.borrow(), vec!["ins 0", "ins 0:0", "tog 0"]);
    }

    #[test]
    fn test_remove_emits_deleted_and_toggle() {
        let store = TreeStore::new(1);
        let root = store.append(None);
        let child = store.append(Some(&root));

        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        store.signals().row_deleted.connect(move |path| {
            l.borrow_mut().push(format!("del {path}"));
        });
        let l = log.clone();
        store
            .signals()
            .row_has_child_toggled
            .connect(move |(path, _)| {
                l.borrow_mut().push(format!("tog {path}"));
            });

        assert!(store.remove(&child));
        assert_eq!(*log.borrow(), vec!["del 0:0", "tog 0"]);
        assert!(!store.iter_has_child(&root));
    }

    #[test]
    fn test_remove_subtree_counts() {
        let store = TreeStore::new(1);
        let root = store.append(None);
        let child = store.append(Some(&root));
        store.append(Some(&child));
        assert_eq!(store.len(), 3);

        store.remove(&root);
        assert!(store.is_empty());
    }

    #[test]
    fn test_reorder() {
        let store = store_with_rows(&["a", "b", "c"]);
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        store
            .signals()
            .rows_reordered
            .connect(move |(parent, order)| {
                l.borrow_mut().push((parent.clone(), order.clone()));
            });

        store.reorder(None, &[2, 0, 1]);
        let texts: Vec<String> = (0..3)
            .map(|i| {
                let it = store.iter_nth_child(None, i).unwrap();
                store.value(&it, 0).unwrap().display_text()
            })
            .collect();
        assert_eq!(texts, vec!["c", "a", "b"]);
        assert_eq!(*log.borrow(), vec![(TreePath::new(), vec![2, 0, 1])]);
    }

    #[test]
    fn test_reorder_rejects_bad_permutation() {
        let store = store_with_rows(&["a", "b"]);
        store.reorder(None, &[0, 0]);
        let it = store.iter_nth_child(None, 0).unwrap();
        assert_eq!(store.value(&it, 0), Some("a".into()));
    }

    #[test]
    fn test_clear_invalidates_iterators() {
        let store = store_with_rows(&["a"]);
        let it = store.iter_children(None).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert!(store.path_from_iter(&it).is_none());
    }

    #[test]
    fn test_drag_roundtrip_moves_row() {
        let store = store_with_rows(&["a", "b", "c"]);
        let src: TreePath = "0".parse().unwrap();
        let dest: TreePath = "3".parse().unwrap();

        let source = store.drag_source().unwrap();
        assert!(source.row_draggable(&src));
        let data = source.drag_data_get(&src).unwrap();

        let dest_cap = store.drag_dest().unwrap();
        assert!(dest_cap.row_drop_possible(&dest, &data));
        assert!(dest_cap.drag_data_received(&dest, &data));
        assert!(store.drag_source().unwrap().drag_data_delete(&src));

        let texts: Vec<String> = (0..3)
            .map(|i| {
                let it = store.iter_nth_child(None, i).unwrap();
                store.value(&it, 0).unwrap().display_text()
            })
            .collect();
        assert_eq!(texts, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_drop_into_own_subtree_refused() {
        let store = TreeStore::new(1);
        let root = store.append(None);
        store.append(Some(&root));

        let data = RowData {
            path: "0".parse().unwrap(),
        };
        assert!(
            !store
                .drag_dest()
                .unwrap()
                .row_drop_possible(&"0:1".parse().unwrap(), &data)
        );
    }

    #[test]
    fn test_drag_copies_subtree() {
        let store = TreeStore::new(1);
        let root = store.append(None);
        store.set_value(&root, 0, "parent".into());
        let child = store.append(Some(&root));
        store.set_value(&child, 0, "kid".into());

        let data = RowData {
            path: "0".parse().unwrap(),
        };
        assert!(
            store
                .drag_dest()
                .unwrap()
                .drag_data_received(&"1".parse().unwrap(), &data)
        );

        let copy = store.iter_from_path(&"1".parse().unwrap()).unwrap();
        assert_eq!(store.value(&copy, 0), Some("parent".into()));
        let copy_kid = store.iter_from_path(&"1:0".parse().unwrap()).unwrap();
        assert_eq!(store.value(&copy_kid, 0), Some("kid".into()));
    }
}
