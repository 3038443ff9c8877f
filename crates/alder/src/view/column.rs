//! View columns and horizontal layout.
//!
//! Each column maps one model column to a vertical slice of the view. The
//! validator feeds measured cell widths into [`Column::request_cell_width`];
//! [`layout_columns`] then apportions the viewport width across visible
//! columns, honoring the sizing policy, min/max clamps and the expand
//! flags.

/// How a column reacts to content and viewport changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnSizing {
    /// Grows to fit the widest cell ever seen, never shrinks.
    #[default]
    GrowOnly,
    /// Tracks the widest currently-cached cell; shrinks when content does.
    Autosize,
    /// Uses the explicitly set width; cells are never measured for width.
    /// Required on every column for fixed-height mode.
    Fixed,
}

/// One view column.
#[derive(Debug, Clone)]
pub struct Column {
    title: String,
    /// Index of the model column rendered here.
    model_column: usize,
    visible: bool,
    expand: bool,
    sizing: ColumnSizing,
    fixed_width: i32,
    min_width: Option<i32>,
    max_width: Option<i32>,
    /// Widest natural cell width reported by the validator.
    requested_width: i32,
    /// Allocated width after the last layout pass.
    width: i32,
}

impl Column {
    pub fn new(title: impl Into<String>, model_column: usize) -> Self {
        Self {
            title: title.into(),
            model_column,
            visible: true,
            expand: false,
            sizing: ColumnSizing::default(),
            fixed_width: -1,
            min_width: None,
            max_width: None,
            requested_width: 0,
            width: 0,
        }
    }

    pub fn with_sizing(mut self, sizing: ColumnSizing) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn with_fixed_width(mut self, width: i32) -> Self {
        self.fixed_width = width;
        self.sizing = ColumnSizing::Fixed;
        self
    }

    pub fn with_expand(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }

    pub fn with_min_width(mut self, width: i32) -> Self {
        self.min_width = Some(width);
        self
    }

    pub fn with_max_width(mut self, width: i32) -> Self {
        self.max_width = Some(width);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn model_column(&self) -> usize {
        self.model_column
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn expands(&self) -> bool {
        self.expand
    }

    pub fn sizing(&self) -> ColumnSizing {
        self.sizing
    }

    /// The width allocated by the last layout pass.
    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn fixed_width(&self) -> i32 {
        self.fixed_width
    }

    pub fn set_fixed_width(&mut self, width: i32) {
        self.fixed_width = width;
    }

    /// Record a measured natural cell width. Fixed columns ignore it.
    pub fn request_cell_width(&mut self, width: i32) {
        if self.sizing != ColumnSizing::Fixed {
            self.requested_width = self.requested_width.max(width);
        }
    }

    /// Forget accumulated cell measurements. Called when every row's
    /// per-column sizes are invalidated; `GrowOnly` columns keep their
    /// high-water mark.
    pub fn reset_requested_width(&mut self) {
        if self.sizing == ColumnSizing::Autosize {
            self.requested_width = 0;
        }
    }

    /// The width this column asks for before expansion: sizing-policy
    /// width clamped to min/max.
    pub fn preferred_width(&self) -> i32 {
        let base = match self.sizing {
            ColumnSizing::Fixed if self.fixed_width >= 0 => self.fixed_width,
            _ => self.requested_width,
        };
        let base = match self.min_width {
            Some(min) => base.max(min),
            None => base,
        };
        match self.max_width {
            Some(max) => base.min(max),
            None => base,
        }
    }
}

/// Allocate widths for every column given the viewport width.
///
/// Visible columns get their preferred width; leftover viewport space is
/// split evenly among visible expand columns, remainder pixels going to
/// the leftmost of them. Returns the total content width, which drives
/// horizontal scrolling (it may exceed `available`).
pub fn layout_columns(columns: &mut [Column], available: i32) -> i32 {
    let mut total = 0;
    let mut n_expand = 0;
    for col in columns.iter_mut() {
        if !col.visible {
            col.width = 0;
            continue;
        }
        col.width = col.preferred_width();
        total += col.width;
        if col.expand {
            n_expand += 1;
        }
    }

    if n_expand > 0 && available > total {
        let extra = available - total;
        let per_column = extra / n_expand;
        let mut remainder = extra % n_expand;
        for col in columns.iter_mut() {
            if col.visible && col.expand {
                col.width += per_column;
                if remainder > 0 {
                    col.width += 1;
                    remainder -= 1;
                }
            }
        }
        return available;
    }
    total
}

/// Content x of a column's left edge: the widths of all visible columns
/// before it.
pub fn column_x(columns: &[Column], index: usize) -> i32 {
    columns
        .iter()
        .take(index)
        .filter(|c| c.visible)
        .map(|c| c.width)
        .sum()
}

/// The visible column containing content x, with the x offset inside it.
pub fn column_at_x(columns: &[Column], x: i32) -> Option<(usize, i32)> {
    if x < 0 {
        return None;
    }
    let mut left = 0;
    for (i, col) in columns.iter().enumerate() {
        if !col.visible {
            continue;
        }
        if x < left + col.width {
            return Some((i, x - left));
        }
        left += col.width;
    }
    None
}
