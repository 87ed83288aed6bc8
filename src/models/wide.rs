//! Wide-format table: one row per competitor, one column per year-round.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::PseudoId;

/// One competitor across all years.
///
/// `values` holds only non-null cells; a column listed in the table but
/// missing here is null for this competitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRecord {
    pub pseudo_id: PseudoId,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub country: Option<String>,
    pub is_official: Option<bool>,
    pub total_points: Option<f64>,
    pub values: BTreeMap<String, f64>,
}

impl WideRecord {
    pub fn new(pseudo_id: PseudoId) -> Self {
        Self {
            pseudo_id,
            name: None,
            nickname: None,
            country: None,
            is_official: None,
            total_points: None,
            values: BTreeMap::new(),
        }
    }

    /// Fill descriptive fields that are still null from `other`.
    pub fn coalesce_from(&mut self, other: &WideRecord) {
        if self.name.is_none() {
            self.name = other.name.clone();
        }
        if self.nickname.is_none() {
            self.nickname = other.nickname.clone();
        }
        if self.country.is_none() {
            self.country = other.country.clone();
        }
        if self.is_official.is_none() {
            self.is_official = other.is_official;
        }
        if self.total_points.is_none() {
            self.total_points = other.total_points;
        }
    }
}

/// One competitor's points summed over every year of both sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifetimeTotal {
    pub pseudo_id: PseudoId,
    pub name: String,
    pub total_points: f64,
    /// Years with a record in either source
    pub years: usize,
}

/// Wide table with an explicit column list.
///
/// A column exists only if it is in `columns`; pruned rounds never appear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WideTable {
    pub columns: Vec<String>,
    pub rows: Vec<WideRecord>,
    #[serde(skip)]
    index: HashMap<PseudoId, usize>,
}

impl WideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Append a column name; returns false if it already existed.
    pub fn add_column(&mut self, column: String) -> bool {
        if self.has_column(&column) {
            return false;
        }
        self.columns.push(column);
        true
    }

    pub fn get(&self, id: &PseudoId) -> Option<&WideRecord> {
        self.position(id).map(|i| &self.rows[i])
    }

    /// Cell value, `None` for null or unknown column.
    pub fn value(&self, id: &PseudoId, column: &str) -> Option<f64> {
        self.get(id).and_then(|r| r.values.get(column).copied())
    }

    /// Insert a row, or return the existing row for that id.
    pub fn entry(&mut self, id: &PseudoId) -> &mut WideRecord {
        let i = match self.position(id) {
            Some(i) => i,
            None => {
                self.rows.push(WideRecord::new(id.clone()));
                let i = self.rows.len() - 1;
                self.index.insert(id.clone(), i);
                i
            }
        };
        &mut self.rows[i]
    }

    pub fn ids(&self) -> impl Iterator<Item = &PseudoId> {
        self.rows.iter().map(|r| &r.pseudo_id)
    }

    fn position(&self, id: &PseudoId) -> Option<usize> {
        if self.index.len() == self.rows.len() {
            return self.index.get(id).copied();
        }
        // Index is not serialized; fall back to a scan after deserialization.
        self.rows.iter().position(|r| &r.pseudo_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_inserts_once() {
        let mut table = WideTable::new();
        let id = PseudoId::from("a");
        table.entry(&id).name = Some("A".to_string());
        table.entry(&id).values.insert("2024_1".to_string(), 3.0);
        assert_eq!(table.len(), 1);
        assert_eq!(table.value(&id, "2024_1"), Some(3.0));
        assert_eq!(table.get(&id).unwrap().name.as_deref(), Some("A"));
    }

    #[test]
    fn test_add_column_dedupes() {
        let mut table = WideTable::new();
        assert!(table.add_column("2024_1".to_string()));
        assert!(!table.add_column("2024_1".to_string()));
        assert_eq!(table.columns.len(), 1);
    }

    #[test]
    fn test_coalesce_prefers_existing() {
        let mut left = WideRecord::new(PseudoId::from("x"));
        left.name = Some("Left".to_string());
        let mut right = WideRecord::new(PseudoId::from("x"));
        right.name = Some("Right".to_string());
        right.country = Some("FR".to_string());

        left.coalesce_from(&right);
        assert_eq!(left.name.as_deref(), Some("Left"));
        assert_eq!(left.country.as_deref(), Some("FR"));
    }

    #[test]
    fn test_lookup_after_deserialization() {
        let mut table = WideTable::new();
        table.entry(&PseudoId::from("a"));
        table.entry(&PseudoId::from("b"));
        let json = serde_json::to_string(&table).unwrap();
        let back: WideTable = serde_json::from_str(&json).unwrap();
        assert!(back.get(&PseudoId::from("b")).is_some());
        assert!(back.get(&PseudoId::from("c")).is_none());
    }
}
