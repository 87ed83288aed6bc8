//! Loosely typed per-year tables.
//!
//! A [`Table`] is what an upstream parser hands over: canonical column
//! names, cells of whatever type the source used. Column types are inferred
//! from the values, and concatenation is strict: two tables only stack when
//! their schemas are identical, and [`align_tables`] is the one place that
//! reconciles differing schemas.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::{round_column, NormalizeError, ROUND_PREFIX};

static NULL_CELL: Cell = Cell::Null;

/// One cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Number(f64),
    Flag(bool),
}

impl Cell {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Flag(*b),
            Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Null),
            Value::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Type this cell suggests for its column, `None` for nulls.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Cell::Null => None,
            Cell::Text(_) => Some(ColumnType::Text),
            Cell::Number(_) => Some(ColumnType::Number),
            Cell::Flag(_) => Some(ColumnType::Flag),
        }
    }

    /// Text rendering of a non-null cell.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Flag(b) => Some(b.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Text,
    Number,
    Flag,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Flag => "flag",
        }
    }

    /// Combine the types seen in one column; anything mixed is text.
    fn widen(current: Option<ColumnType>, seen: ColumnType) -> ColumnType {
        match current {
            None => seen,
            Some(t) if t == seen => t,
            Some(_) => ColumnType::Text,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Column-typed rows. Every row has one cell per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<ColumnDef>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from JSON objects, inferring types.
    ///
    /// Columns appear in first-seen order. A column with only nulls is text.
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut names: Vec<String> = Vec::new();
        let mut types: Vec<Option<ColumnType>> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();

        for record in records {
            for (key, value) in record {
                let i = match position.get(key) {
                    Some(i) => *i,
                    None => {
                        names.push(key.clone());
                        types.push(None);
                        position.insert(key.clone(), names.len() - 1);
                        names.len() - 1
                    }
                };
                if let Some(seen) = Cell::from_json(value).column_type() {
                    types[i] = Some(ColumnType::widen(types[i], seen));
                }
            }
        }

        let columns = names
            .into_iter()
            .zip(types)
            .map(|(name, ty)| ColumnDef::new(name, ty.unwrap_or(ColumnType::Text)))
            .collect();

        let mut table = Self::new(columns);
        for record in records {
            let row = table
                .columns
                .iter()
                .map(|c| {
                    let cell = record.get(&c.name).map(Cell::from_json).unwrap_or(Cell::Null);
                    // Widened columns carry every value as text.
                    match (c.ty, &cell) {
                        (ColumnType::Text, Cell::Number(_) | Cell::Flag(_)) => {
                            cell.as_text().map(Cell::Text).unwrap_or(Cell::Null)
                        }
                        _ => cell,
                    }
                })
                .collect();
            table.rows.push(row);
        }
        table
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column_index(name).map(|i| self.columns[i].ty)
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

    /// Cell at (row, column name); `Null` for unknown columns.
    pub fn cell(&self, row: usize, column: &str) -> &Cell {
        match (self.rows.get(row), self.column_index(column)) {
            (Some(cells), Some(i)) => &cells[i],
            _ => &NULL_CELL,
        }
    }

    /// Add a column filled with `fill`. Replaces nothing: an existing
    /// column of that name is left untouched and `false` is returned.
    pub fn add_column(&mut self, column: ColumnDef, fill: Cell) -> bool {
        if self.has_column(&column.name) {
            return false;
        }
        self.columns.push(column);
        for row in &mut self.rows {
            row.push(fill.clone());
        }
        true
    }

    /// Replace a column's type and every cell in it.
    pub fn map_column<F>(&mut self, name: &str, ty: ColumnType, mut f: F) -> Result<(), NormalizeError>
    where
        F: FnMut(&Cell) -> Result<Cell, NormalizeError>,
    {
        let Some(i) = self.column_index(name) else {
            return Ok(());
        };
        for row in &mut self.rows {
            row[i] = f(&row[i])?;
        }
        self.columns[i].ty = ty;
        Ok(())
    }

    /// Keep only the named columns, in the given order; unknown names are
    /// skipped.
    pub fn select(&self, names: &[&str]) -> Table {
        let picked: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        Table {
            columns: picked.iter().map(|i| self.columns[*i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| picked.iter().map(|i| row[*i].clone()).collect())
                .collect(),
        }
    }

    /// Reorder columns to `order`, which must be a permutation of them.
    fn reorder(&mut self, order: &[String]) {
        let picked: Vec<usize> = order.iter().filter_map(|n| self.column_index(n)).collect();
        self.columns = picked.iter().map(|i| self.columns[*i].clone()).collect();
        for row in &mut self.rows {
            *row = picked.iter().map(|i| row[*i].clone()).collect();
        }
    }

    /// Stack tables with identical schemas.
    pub fn concat(tables: &[Table]) -> Result<Table, NormalizeError> {
        let Some(first) = tables.first() else {
            return Ok(Table::default());
        };
        let mut out = Table::new(first.columns.clone());
        for (i, table) in tables.iter().enumerate() {
            if table.columns != first.columns {
                return Err(NormalizeError::ColumnAlignment(format!(
                    "table {} schema [{}] differs from [{}]",
                    i,
                    describe(&table.columns),
                    describe(&first.columns)
                )));
            }
            out.rows.extend(table.rows.iter().cloned());
        }
        Ok(out)
    }
}

fn describe(columns: &[ColumnDef]) -> String {
    columns
        .iter()
        .map(|c| format!("{}:{}", c.name, c.ty))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Round number of a canonical `round_{k}` column name.
///
/// Only the exact spelling `round_column(k)` counts: `round_01` or
/// `round_+1` would otherwise pass as round 1 and never be read back.
pub fn round_of_column(name: &str) -> Option<u32> {
    let round: u32 = name.strip_prefix(ROUND_PREFIX)?.parse().ok()?;
    (name == round_column(round)).then_some(round)
}

/// Bring every table to the union schema.
///
/// Missing columns are added as typed nulls. A column name carrying two
/// different types across tables is a [`NormalizeError::ColumnAlignment`].
/// Resulting order: non-round columns in first-seen order, then `round_k`
/// ascending by k.
pub fn align_tables(tables: Vec<Table>) -> Result<Vec<Table>, NormalizeError> {
    let mut union: Vec<ColumnDef> = Vec::new();
    for table in &tables {
        for column in &table.columns {
            match union.iter().find(|c| c.name == column.name) {
                Some(existing) if existing.ty != column.ty => {
                    return Err(NormalizeError::ColumnAlignment(format!(
                        "column \"{}\" is {} in one table and {} in another",
                        column.name, existing.ty, column.ty
                    )));
                }
                Some(_) => {}
                None => union.push(column.clone()),
            }
        }
    }

    let (mut rounds, descriptive): (Vec<ColumnDef>, Vec<ColumnDef>) = union
        .into_iter()
        .partition(|c| round_of_column(&c.name).is_some());
    rounds.sort_by_key(|c| round_of_column(&c.name));
    let order: Vec<String> = descriptive
        .iter()
        .chain(rounds.iter())
        .map(|c| c.name.clone())
        .collect();

    let mut aligned = Vec::with_capacity(tables.len());
    for mut table in tables {
        for column in descriptive.iter().chain(rounds.iter()) {
            table.add_column(column.clone(), Cell::Null);
        }
        table.reorder(&order);
        aligned.push(table);
    }
    Ok(aligned)
}
