use crate::model::{ColumnSpec, Record, RowStyler};
use ratatui::style::Style;
use unicode_width::UnicodeWidthStr;

const MAX_COLUMN_WIDTH: usize = 60;

fn unstyled(_row: &[String]) -> Style {
    Style::default()
}

#[derive(Debug, Clone)]
pub struct TableModel {
    columns: Vec<ColumnSpec>,
    rows: Vec<Record>,
    cursor: Option<usize>,
    sort_key: usize,
    styler: RowStyler,
    page_height: usize,
    width: u16,
}

impl Default for TableModel {
    fn default() -> Self {
        Self::new(unstyled)
    }
}

impl TableModel {
    pub fn new(styler: RowStyler) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            cursor: None,
            sort_key: 1,
            styler,
            page_height: 1,
            width: 0,
        }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn sort_key(&self) -> usize {
        self.sort_key
    }

    #[cfg(test)]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[cfg(test)]
    pub fn page_height(&self) -> usize {
        self.page_height
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn set_data(&mut self, mut columns: Vec<ColumnSpec>, rows: Vec<Record>) {
        let viewport = match self.width {
            0 => usize::MAX,
            width => usize::from(width),
        };
        for (index, column) in columns.iter_mut().enumerate() {
            let widest = rows
                .iter()
                .filter_map(|row| row.get(index))
                .map(|value| value.width())
                .max()
                .unwrap_or(0);
            let width = column.title.width().max(widest);
            let limit = column.max_width.unwrap_or(MAX_COLUMN_WIDTH).min(viewport);
            column.width = width.min(limit);
        }

        self.columns = columns;
        self.rows = rows;
        self.clamp();
    }

    pub fn sort(&mut self, key: usize) {
        if key >= self.columns.len() {
            return;
        }
        self.sort_key = key;
        self.resort();
    }

    pub fn resort(&mut self) {
        let key = self.sort_key;
        self.rows.sort_by(|left, right| {
            let left = left.get(key).map(String::as_str).unwrap_or_default();
            let right = right.get(key).map(String::as_str).unwrap_or_default();
            left.cmp(right)
        });
    }

    pub fn up(&mut self) {
        if let Some(cursor) = self.cursor {
            self.cursor = Some(cursor.saturating_sub(1));
        }
    }

    pub fn down(&mut self) {
        self.move_by(1);
    }

    pub fn page_up(&mut self) {
        if let Some(cursor) = self.cursor {
            self.cursor = Some(cursor.saturating_sub(self.page_height));
        }
    }

    pub fn page_down(&mut self) {
        self.move_by(self.page_height);
    }

    pub fn home(&mut self) {
        if self.cursor.is_some() {
            self.cursor = Some(0);
        }
    }

    pub fn end(&mut self) {
        self.select_last();
    }

    pub fn select_last(&mut self) {
        self.cursor = self.rows.len().checked_sub(1);
    }

    pub fn selected_row(&self) -> Option<&Record> {
        self.cursor.and_then(|cursor| self.rows.get(cursor))
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.selected_row()
            .and_then(|row| row.first())
            .map(String::as_str)
    }

    pub fn set_viewport(&mut self, width: u16, height: u16) {
        self.width = width;
        self.page_height = usize::from(height).max(1);
    }

    pub fn row_style(&self, row: &[String]) -> Style {
        (self.styler)(row)
    }

    fn move_by(&mut self, step: usize) {
        if let Some(cursor) = self.cursor {
            let last = self.rows.len().saturating_sub(1);
            self.cursor = Some(cursor.saturating_add(step).min(last));
        }
    }

    fn clamp(&mut self) {
        self.cursor = match (self.cursor, self.rows.len()) {
            (_, 0) => None,
            (None, _) => Some(0),
            (Some(cursor), len) => Some(cursor.min(len - 1)),
        };

        if !self.columns.is_empty() && self.sort_key >= self.columns.len() {
            self.sort_key = self.columns.len() - 1;
        }
    }
}
