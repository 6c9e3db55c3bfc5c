//! Windowed data grid model
//!
//! Holds the full row set and computes which rows fall inside the viewport
//! for a given scroll offset, so only those need rendering.

use std::cmp::Ordering;
use std::ops::Range;

use serde::Serialize;

use pcf_types::GridConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridRow {
    pub id: usize,
    pub name: String,
    pub email: String,
}

impl GridRow {
    /// Stable row identity, independent of sort order
    pub fn row_id(&self) -> String {
        self.id.to_string()
    }
}

/// Demo data set: `User 1 <user1@example.com>` and so on, ids from 1
pub fn demo_rows(count: usize) -> Vec<GridRow> {
    (1..=count)
        .map(|i| GridRow {
            id: i,
            name: format!("User {}", i),
            email: format!("user{}@example.com", i),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridColumn {
    Id,
    Name,
    Email,
}

impl GridColumn {
    pub const ALL: [GridColumn; 3] = [GridColumn::Id, GridColumn::Name, GridColumn::Email];

    pub fn key(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Email => "email",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Name => "Name",
            Self::Email => "Email",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }

    fn compare(self, a: &GridRow, b: &GridRow) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::Name => a.name.cmp(&b.name),
            Self::Email => a.email.cmp(&b.email),
        }
    }

    pub fn cell(self, row: &GridRow) -> String {
        match self {
            Self::Id => row.id.to_string(),
            Self::Name => row.name.clone(),
            Self::Email => row.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

pub struct GridModel {
    rows: Vec<GridRow>,
    sort: Option<(GridColumn, SortDirection)>,
    row_height: u32,
    viewport_height: u32,
    overscan: usize,
}

impl GridModel {
    pub fn new(rows: Vec<GridRow>, config: &GridConfig) -> Self {
        Self {
            rows,
            sort: None,
            row_height: config.row_height.max(1),
            viewport_height: config.viewport_height,
            overscan: config.overscan,
        }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(demo_rows(config.row_count), config)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn sort_state(&self) -> Option<(GridColumn, SortDirection)> {
        self.sort
    }

    /// Sort by `column`; a stable sort, so equal keys keep their order
    pub fn sort_by(&mut self, column: GridColumn, direction: SortDirection) {
        self.rows.sort_by(|a, b| {
            let ordering = column.compare(a, b);
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
        self.sort = Some((column, direction));
    }

    /// Header click: ascending first, then flip on repeated clicks
    pub fn toggle_sort(&mut self, column: GridColumn) -> SortDirection {
        let direction = match self.sort {
            Some((current, SortDirection::Ascending)) if current == column => {
                SortDirection::Descending
            }
            _ => SortDirection::Ascending,
        };
        self.sort_by(column, direction);
        direction
    }

    /// Height of the whole scrollable content in pixels
    pub fn content_height(&self) -> u64 {
        self.rows.len() as u64 * u64::from(self.row_height)
    }

    /// Largest meaningful scroll offset
    pub fn max_scroll_offset(&self) -> u64 {
        self.content_height()
            .saturating_sub(u64::from(self.viewport_height))
    }

    /// Row indices to render at `scroll_offset`, overscan included
    pub fn visible_range(&self, scroll_offset: u64) -> Range<usize> {
        let offset = scroll_offset.min(self.max_scroll_offset());
        let row_height = u64::from(self.row_height);

        let first = (offset / row_height) as usize;
        let last = (offset + u64::from(self.viewport_height)).div_ceil(row_height) as usize;

        let start = first.saturating_sub(self.overscan);
        let end = (last + self.overscan).min(self.rows.len());
        start.min(end)..end
    }

    pub fn visible_rows(&self, scroll_offset: u64) -> &[GridRow] {
        &self.rows[self.visible_range(scroll_offset)]
    }
}
