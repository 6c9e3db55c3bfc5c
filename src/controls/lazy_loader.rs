use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::grid::{GridColumn, GridModel, SortDirection};
use crate::host::{ControlContext, OutputNotifier, Outputs, StandardControl, View};

pub const GRID_TITLE: &str = "Fluent UI DataGrid Virtualization Demo";

/// Sortable grid over the demo rows, rendering only the visible window
#[derive(Default)]
pub struct LazyLoaderGrid {
    grid: Option<GridModel>,
    scroll_offset: u64,
    notifier: Option<OutputNotifier>,
}

impl LazyLoaderGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid(&self) -> Option<&GridModel> {
        self.grid.as_ref()
    }

    pub fn scroll_to(&mut self, offset: u64) {
        self.scroll_offset = match &self.grid {
            Some(grid) => offset.min(grid.max_scroll_offset()),
            None => offset,
        };
    }

    /// Header click on the column with key `column`
    pub fn click_header(&mut self, column: &str) -> Result<SortDirection> {
        let column =
            GridColumn::from_key(column).ok_or_else(|| anyhow!("Unknown column '{}'", column))?;
        let grid = self
            .grid
            .as_mut()
            .ok_or_else(|| anyhow!("Grid is not initialized"))?;

        let direction = grid.toggle_sort(column);
        if let Some(notifier) = &self.notifier {
            notifier.notify_output_changed();
        }
        Ok(direction)
    }
}

impl StandardControl for LazyLoaderGrid {
    fn init(&mut self, context: &ControlContext, notifier: OutputNotifier) -> Result<()> {
        let mut config = context.services.config().grid.clone();
        if let Some(rows) = context.parameter("rowCount").and_then(Value::as_u64) {
            config.row_count = rows as usize;
        }

        self.grid = Some(GridModel::from_config(&config));
        self.notifier = Some(notifier);
        Ok(())
    }

    fn update_view(&mut self, _context: &ControlContext) -> View {
        let mut view = View::new().line(GRID_TITLE);
        let Some(grid) = &self.grid else {
            return view;
        };

        let header: Vec<&str> = GridColumn::ALL.iter().map(|c| c.header()).collect();
        view = view.line(header.join(" | "));
        for row in grid.visible_rows(self.scroll_offset) {
            let cells: Vec<String> = GridColumn::ALL.iter().map(|c| c.cell(row)).collect();
            view = view.line(cells.join(" | "));
        }
        view
    }

    fn get_outputs(&self) -> Outputs {
        let Some(grid) = &self.grid else {
            return Outputs::new();
        };

        let first_visible = grid
            .visible_rows(self.scroll_offset)
            .first()
            .map(|row| json!(row.row_id()))
            .unwrap_or(Value::Null);
        let sort = grid
            .sort_state()
            .map(|(column, direction)| {
                json!({
                    "column": column.key(),
                    "descending": direction == SortDirection::Descending
                })
            })
            .unwrap_or(Value::Null);

        Outputs::from([
            ("rowCount".to_string(), json!(grid.len())),
            ("firstRenderedRowId".to_string(), first_visible),
            ("sort".to_string(), sort),
        ])
    }

    fn destroy(&mut self) {
        self.grid = None;
        self.notifier = None;
    }
}
