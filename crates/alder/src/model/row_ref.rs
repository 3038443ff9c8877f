//! Persistent row references.
//!
//! A [`TreePath`] goes stale the moment rows are inserted, deleted or
//! reordered above it. The [`RowRefRegistry`] keeps a set of paths alive
//! across such mutations: the view feeds every model notification through
//! the registry, which rewrites or invalidates each registered path. The
//! cursor, the selection anchor and in-flight drag targets are all held
//! this way, so deleting the row under the cursor can never leave a
//! dangling position.

use slotmap::{SlotMap, new_key_type};

use super::path::TreePath;

new_key_type! {
    /// Handle to one tracked row position.
    pub struct RowRefId;
}

/// A registry of paths kept up to date across model mutations.
///
/// A tracked path becomes invalid (resolves to `None`) when its row, or any
/// ancestor of its row, is deleted. Invalid references stay registered
/// until explicitly removed so holders can observe the invalidation.
#[derive(Default)]
pub struct RowRefRegistry {
    refs: SlotMap<RowRefId, Option<TreePath>>,
}

impl RowRefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `path`.
    pub fn add(&mut self, path: TreePath) -> RowRefId {
        self.refs.insert(Some(path))
    }

    /// Stop tracking.
    pub fn remove(&mut self, id: RowRefId) {
        self.refs.remove(id);
    }

    /// Current path of a tracked row; `None` once the row was deleted (or
    /// the id itself was removed).
    pub fn path(&self, id: RowRefId) -> Option<&TreePath> {
        self.refs.get(id).and_then(|p| p.as_ref())
    }

    /// Whether the reference still resolves to a live row.
    pub fn is_valid(&self, id: RowRefId) -> bool {
        self.path(id).is_some()
    }

    /// Re-target a tracked reference at a different row.
    pub fn set(&mut self, id: RowRefId, path: Option<TreePath>) {
        if let Some(slot) = self.refs.get_mut(id) {
            *slot = path;
        }
    }

    /// Adjust every tracked path for a row inserted at `inserted`.
    ///
    /// Paths at or after the new row's position within the same sibling
    /// group shift down by one; paths elsewhere are untouched.
    pub fn row_inserted(&mut self, inserted: &TreePath) {
        let depth = inserted.depth();
        if depth == 0 {
            return;
        }
        let prefix = &inserted.indices()[..depth - 1];
        let at = inserted.indices()[depth - 1];

        for (_, slot) in self.refs.iter_mut() {
            let Some(path) = slot else { continue };
            if path.depth() < depth || path.indices()[..depth - 1] != *prefix {
                continue;
            }
            if path.indices()[depth - 1] >= at {
                let mut indices = path.indices().to_vec();
                indices[depth - 1] += 1;
                *path = TreePath::from_indices(indices);
            }
        }
    }

    /// Adjust every tracked path for a row deleted at `deleted`.
    ///
    /// References to the deleted row or any of its descendants are
    /// invalidated; later siblings (and their subtrees) shift up by one.
    pub fn row_deleted(&mut self, deleted: &TreePath) {
        let depth = deleted.depth();
        if depth == 0 {
            return;
        }
        let prefix = &deleted.indices()[..depth - 1];
        let at = deleted.indices()[depth - 1];

        for (_, slot) in self.refs.iter_mut() {
            let Some(path) = slot else { continue };
            if path.depth() < depth || path.indices()[..depth - 1] != *prefix {
                continue;
            }
            let idx = path.indices()[depth - 1];
            if idx == at {
                *slot = None;
            } else if idx > at {
                let mut indices = path.indices().to_vec();
                indices[depth - 1] -= 1;
                *path = TreePath::from_indices(indices);
            }
        }
    }

    /// Adjust every tracked path for a permutation of `parent`'s children,
    /// with `new_order[new_position] = old_position`.
    pub fn rows_reordered(&mut self, parent: &TreePath, new_order: &[usize]) {
        let depth = parent.depth();
        let prefix = parent.indices();

        for (_, slot) in self.refs.iter_mut() {
            let Some(path) = slot else { continue };
            if path.depth() <= depth || path.indices()[..depth] != *prefix {
                continue;
            }
            let old = path.indices()[depth];
            let Some(new) = new_order.iter().position(|&o| o == old) else {
                tracing::warn!(
                    target: "alder::model",
                    "rows_reordered permutation does not cover tracked row"
                );
                continue;
            };
            if new != old {
                let mut indices = path.indices().to_vec();
                indices[depth] = new;
                *path = TreePath::from_indices(indices);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> TreePath {
        s.parse().unwrap()
    }

    #[test]
    fn test_insert_shifts_later_siblings() {
        let mut reg = RowRefRegistry::new();
        let a = reg.add(p("1"));
        let b = reg.add(p("3:2"));
        let c = reg.add(p("0"));

        reg.row_inserted(&p("1"));
        assert_eq!(reg.path(a), Some(&p("2")));
        assert_eq!(reg.path(b), Some(&p("4:2")));
        assert_eq!(reg.path(c), Some(&p("0")));
    }

    #[test]
    fn test_insert_in_other_branch_ignored() {
        let mut reg = RowRefRegistry::new();
        let a = reg.add(p("2:1"));
        reg.row_inserted(&p("3:0"));
        assert_eq!(reg.path(a), Some(&p("2:1")));
    }

    #[test]
    fn test_delete_invalidates_row_and_descendants() {
        let mut reg = RowRefRegistry::new();
        let target = reg.add(p("1"));
        let child = reg.add(p("1:4"));
        let later = reg.add(p("2:0"));
        let earlier = reg.add(p("0"));

        reg.row_deleted(&p("1"));
        assert!(!reg.is_valid(target));
        assert!(!reg.is_valid(child));
        assert_eq!(reg.path(later), Some(&p("1:0")));
        assert_eq!(reg.path(earlier), Some(&p("0")));
    }

    #[test]
    fn test_reorder_moves_tracked_rows() {
        let mut reg = RowRefRegistry::new();
        let a = reg.add(p("0"));
        let b = reg.add(p("2:1"));

        // new_order[new_pos] = old_pos: reverse three top-level rows.
        reg.rows_reordered(&TreePath::new(), &[2, 1, 0]);
        assert_eq!(reg.path(a), Some(&p("2")));
        assert_eq!(reg.path(b), Some(&p("0:1")));
    }

    #[test]
    fn test_invalid_ref_stays_invalid() {
        let mut reg = RowRefRegistry::new();
        let a = reg.add(p("0"));
        reg.row_deleted(&p("0"));
        assert!(!reg.is_valid(a));
        reg.row_inserted(&p("0"));
        assert!(!reg.is_valid(a));
        reg.set(a, Some(p("1")));
        assert_eq!(reg.path(a), Some(&p("1")));
    }
}
