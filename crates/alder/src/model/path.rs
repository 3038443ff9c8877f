//! Logical row positions.
//!
//! A [`TreePath`] identifies a row by its position in the model's hierarchy,
//! independent of any view caching: each element is the 0-based sibling index
//! at that depth. Paths order lexicographically, which matches top-to-bottom
//! visual order when every ancestor is expanded.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error parsing a [`TreePath`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid tree path string: {0:?}")]
pub struct ParsePathError(pub String);

/// An index sequence identifying a row's logical position in the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TreePath {
    indices: Vec<usize>,
}

impl TreePath {
    /// An empty path, addressing nothing (the conceptual root above all
    /// top-level rows).
    pub fn new() -> Self {
        Self {
            indices: Vec::new(),
        }
    }

    /// Path to the first top-level row.
    pub fn first() -> Self {
        Self { indices: vec![0] }
    }

    /// Path from explicit indices.
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    /// The index sequence, outermost first.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of levels; 0 for the empty path.
    pub fn depth(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The sibling index at the deepest level.
    pub fn last_index(&self) -> Option<usize> {
        self.indices.last().copied()
    }

    /// Append a child index, descending one level.
    pub fn push(&mut self, index: usize) {
        self.indices.push(index);
    }

    /// Child path at `index` below this row.
    pub fn child(&self, index: usize) -> TreePath {
        let mut p = self.clone();
        p.push(index);
        p
    }

    /// Move to the next sibling. Always possible in path arithmetic; whether
    /// the row exists is the model's business.
    pub fn next(&mut self) {
        if let Some(last) = self.indices.last_mut() {
            *last += 1;
        }
    }

    /// Move to the previous sibling. Returns `false` at index 0.
    pub fn prev(&mut self) -> bool {
        match self.indices.last_mut() {
            Some(last) if *last > 0 => {
                *last -= 1;
                true
            }
            _ => false,
        }
    }

    /// Move to the parent row. Returns `false` on the empty path.
    pub fn up(&mut self) -> bool {
        self.indices.pop().is_some()
    }

    /// The parent path, or `None` for top-level rows and the empty path.
    pub fn parent(&self) -> Option<TreePath> {
        if self.indices.len() <= 1 {
            return None;
        }
        Some(TreePath {
            indices: self.indices[..self.indices.len() - 1].to_vec(),
        })
    }

    /// Whether `self` is a strict ancestor of `descendant`.
    pub fn is_ancestor_of(&self, descendant: &TreePath) -> bool {
        !self.is_empty()
            && descendant.indices.len() > self.indices.len()
            && descendant.indices[..self.indices.len()] == self.indices[..]
    }

    /// Whether `self` equals or is an ancestor of `other`.
    pub fn contains(&self, other: &TreePath) -> bool {
        self == other || self.is_ancestor_of(other)
    }
}

impl fmt::Display for TreePath {
    /// Renders as colon-separated indices, e.g. `0:2:4`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for idx in &self.indices {
            if !first {
                write!(f, ":")?;
            }
            write!(f, "{idx}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for TreePath {
    type Err = ParsePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(TreePath::new());
        }
        let indices = s
            .split(':')
            .map(|part| part.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ParsePathError(s.to_string()))?;
        Ok(TreePath { indices })
    }
}

impl PartialOrd for TreePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreePath {
    /// Lexicographic order; a parent sorts before its descendants, which
    /// matches visual top-to-bottom order with everything expanded.
    fn cmp(&self, other: &Self) -> Ordering {
        self.indices.cmp(&other.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_display_and_parse() {
        let p = TreePath::from_indices(vec![0, 2, 4]);
        assert_eq!(p.to_string(), "0:2:4");
        assert_eq!("0:2:4".parse::<TreePath>().unwrap(), p);
        assert_eq!("".parse::<TreePath>().unwrap(), TreePath::new());
        assert!("0:x".parse::<TreePath>().is_err());
    }

    #[test]
    fn test_path_navigation() {
        let mut p = TreePath::first();
        p.next();
        assert_eq!(p.indices(), &[1]);
        assert!(p.prev());
        assert!(!p.prev());

        let mut p = TreePath::from_indices(vec![1, 3]);
        assert!(p.up());
        assert_eq!(p.indices(), &[1]);
        assert!(p.up());
        assert!(!p.up());
    }

    #[test]
    fn test_path_ancestry() {
        let parent = TreePath::from_indices(vec![1]);
        let child = TreePath::from_indices(vec![1, 0]);
        let sibling = TreePath::from_indices(vec![2]);
        assert!(parent.is_ancestor_of(&child));
        assert!(!parent.is_ancestor_of(&sibling));
        assert!(!parent.is_ancestor_of(&parent));
        assert!(parent.contains(&parent));
        assert!(!TreePath::new().is_ancestor_of(&child));
    }

    #[test]
    fn test_path_ordering_matches_visual_order() {
        let mut paths = vec![
            TreePath::from_indices(vec![1]),
            TreePath::from_indices(vec![0, 1]),
            TreePath::from_indices(vec![0]),
            TreePath::from_indices(vec![0, 0, 2]),
        ];
        paths.sort();
        let rendered: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["0", "0:0:2", "0:1", "1"]);
    }
}
