//! In-memory tables for the reporting pipelines.
//!
//! A [`Frame`] is a list of named columns and rows of optional string cells.
//! `None` marks a missing value. Remote table queries, scraped publications
//! and the reporting outputs all pass through this type, so every reshaping
//! step (rename, select, filter, join, concat) lives here.

use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use serde::Serialize;

use crate::error::SyndccError;

pub type Cell = Option<String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Borrowed view of one row, addressed by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    frame: &'a Frame,
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let index = self.frame.column_index(column)?;
        self.cells.get(index)?.as_deref()
    }

    pub fn cells(&self) -> &'a [Cell] {
        self.cells
    }
}

impl Frame {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self, SyndccError> {
        let mut frame = Self::new(columns);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row { frame: self, cells })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn require_column(&self, name: &str) -> Result<usize, SyndccError> {
        self.column_index(name)
            .ok_or_else(|| SyndccError::MissingColumn(name.to_string()))
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), SyndccError> {
        if row.len() != self.columns.len() {
            return Err(SyndccError::InvalidArgument(format!(
                "row has {} cells but frame has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_values(&self, name: &str) -> Result<Vec<Option<&str>>, SyndccError> {
        let index = self.require_column(name)?;
        Ok(self.rows.iter().map(|row| row[index].as_deref()).collect())
    }

    /// Non-missing, non-blank values of a column, in row order.
    pub fn present_values(&self, name: &str) -> Result<Vec<String>, SyndccError> {
        Ok(self
            .column_values(name)?
            .into_iter()
            .flatten()
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn distinct(&self, name: &str) -> Result<BTreeSet<String>, SyndccError> {
        Ok(self.present_values(name)?.into_iter().collect())
    }

    /// Renames the columns that exist; unknown source names are ignored.
    pub fn rename(&mut self, mapping: &[(&str, &str)]) {
        for column in &mut self.columns {
            if let Some((_, to)) = mapping.iter().find(|(from, _)| from == column) {
                *column = to.to_string();
            }
        }
    }

    /// Projects onto `names`, in that order. Every name must exist.
    pub fn select(&self, names: &[&str]) -> Result<Frame, SyndccError> {
        let indices = names
            .iter()
            .map(|name| self.require_column(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.project(&indices))
    }

    /// Keeps the columns named in `names` that exist, in the frame's own order.
    pub fn select_present(&self, names: &[String]) -> Frame {
        let indices = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| names.contains(column))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        self.project(&indices)
    }

    fn project(&self, indices: &[usize]) -> Frame {
        Frame {
            columns: indices.iter().map(|i| self.columns[*i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|i| row[*i].clone()).collect())
                .collect(),
        }
    }

    pub fn filter<F>(&self, mut keep: F) -> Frame
    where
        F: FnMut(&Row<'_>) -> bool,
    {
        let rows = self
            .iter()
            .filter(|row| keep(row))
            .map(|row| row.cells.to_vec())
            .collect();
        Frame {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Drops rows whose `column` is missing or blank.
    pub fn drop_missing(&self, column: &str) -> Result<Frame, SyndccError> {
        self.require_column(column)?;
        Ok(self.filter(|row| {
            row.get(column)
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false)
        }))
    }

    pub fn append_column(&mut self, name: &str, values: Vec<Cell>) -> Result<(), SyndccError> {
        if values.len() != self.rows.len() {
            return Err(SyndccError::InvalidArgument(format!(
                "column {name} has {} values but frame has {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(index) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Rewrites every cell of `column` through `map`.
    pub fn map_column<F>(&mut self, column: &str, mut map: F) -> Result<(), SyndccError>
    where
        F: FnMut(Option<&str>) -> Cell,
    {
        let index = self.require_column(column)?;
        for row in &mut self.rows {
            row[index] = map(row[index].as_deref());
        }
        Ok(())
    }

    /// Sets `column` to `value` on rows selected by `predicate`, adding the
    /// column when it does not exist yet.
    pub fn set_where<F>(&mut self, column: &str, value: &str, mut predicate: F)
    where
        F: FnMut(&Row<'_>) -> bool,
    {
        let index = match self.column_index(column) {
            Some(index) => index,
            None => {
                self.columns.push(column.to_string());
                for row in &mut self.rows {
                    row.push(None);
                }
                self.columns.len() - 1
            }
        };
        let selected = self.iter().map(|row| predicate(&row)).collect::<Vec<_>>();
        for (row, hit) in self.rows.iter_mut().zip(selected) {
            if hit {
                row[index] = Some(value.to_string());
            }
        }
    }

    /// Stacks frames vertically over the union of their columns (first-seen
    /// order); cells of columns a frame lacks are missing.
    pub fn concat(frames: &[Frame]) -> Frame {
        let mut columns: Vec<String> = Vec::new();
        for frame in frames {
            for column in &frame.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        let mut rows = Vec::new();
        for frame in frames {
            let mapping = columns
                .iter()
                .map(|column| frame.column_index(column))
                .collect::<Vec<_>>();
            for row in &frame.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|index| index.and_then(|i| row[i].clone()))
                        .collect(),
                );
            }
        }
        Frame { columns, rows }
    }

    /// Left join on `key`. Left rows without a match keep missing right cells;
    /// non-key columns present on both sides get `_x` / `_y` suffixes.
    pub fn left_join(&self, right: &Frame, key: &str) -> Result<Frame, SyndccError> {
        let left_key = self.require_column(key)?;
        let right_key = right.require_column(key)?;

        let right_columns = right
            .columns
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != right_key)
            .collect::<Vec<_>>();

        let mut columns = Vec::with_capacity(self.columns.len() + right_columns.len());
        for (index, column) in self.columns.iter().enumerate() {
            let clashes = index != left_key && right.has_column(column);
            columns.push(if clashes {
                format!("{column}_x")
            } else {
                column.clone()
            });
        }
        for (_, column) in &right_columns {
            columns.push(if self.has_column(column) {
                format!("{column}_y")
            } else {
                (*column).clone()
            });
        }

        let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (position, row) in right.rows.iter().enumerate() {
            if let Some(value) = row[right_key].as_deref() {
                index.entry(value).or_default().push(position);
            }
        }

        let mut rows = Vec::new();
        for row in &self.rows {
            let matches = row[left_key]
                .as_deref()
                .and_then(|value| index.get(value))
                .cloned()
                .unwrap_or_default();
            if matches.is_empty() {
                let mut joined = row.clone();
                joined.extend(std::iter::repeat_n(None, right_columns.len()));
                rows.push(joined);
                continue;
            }
            for position in matches {
                let mut joined = row.clone();
                let right_row = &right.rows[position];
                joined.extend(right_columns.iter().map(|(i, _)| right_row[*i].clone()));
                rows.push(joined);
            }
        }

        Ok(Frame { columns, rows })
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), SyndccError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record(&self.columns)
            .map_err(|err| SyndccError::Filesystem(err.to_string()))?;
        for row in &self.rows {
            csv_writer
                .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
                .map_err(|err| SyndccError::Filesystem(err.to_string()))?;
        }
        csv_writer
            .flush()
            .map_err(|err| SyndccError::Filesystem(err.to_string()))
    }

    /// Reads CSV text; empty cells become missing values.
    pub fn read_csv(content: &str) -> Result<Frame, SyndccError> {
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let headers = reader
            .headers()
            .map_err(|err| SyndccError::Filesystem(err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut frame = Frame::new(headers);
        for record in reader.records() {
            let record = record.map_err(|err| SyndccError::Filesystem(err.to_string()))?;
            frame.push_row(
                record
                    .iter()
                    .map(|value| (!value.is_empty()).then(|| value.to_string()))
                    .collect(),
            )?;
        }
        Ok(frame)
    }
}
