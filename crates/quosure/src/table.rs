use crate::environment::{Binding, Environment};
use crate::error::EvalError;
use crate::value::Value;
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;
use std::sync::Arc;

/// Hidden mask binding holding the row count of the current group.
pub const ROW_COUNT: &str = "<rows>";

pub type Column = Arc<Vec<Value>>;

/// Column-oriented in-memory table with optional grouping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: IndexMap<Arc<str>, Column>,
    groups: Vec<Arc<str>>,
    rows: usize,
}

/// Rows sharing the same values in every grouping column.
#[derive(Debug, Clone)]
pub struct Group {
    pub key: Vec<Value>,
    pub rows: Vec<usize>,
}

/// Total order used for grouping and sorting. Missing values sort last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrderKey {
    Logical(bool),
    Number(OrderedFloat<f64>),
    Text(Arc<str>),
    Other(String),
    Missing,
}

impl OrderKey {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::Logical(logical) => Self::Logical(*logical),
            Value::Number(number) if number.is_nan() => Self::Missing,
            Value::Number(number) => Self::Number(OrderedFloat(*number)),
            Value::Text(text) | Value::Symbol(text) => Self::Text(text.clone()),
            other => Self::Other(other.to_string()),
        }
    }
}

impl Table {
    /// Builds a table, recycling single-element columns to the longest one.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (Arc<str>, Vec<Value>)>,
    ) -> Result<Self, EvalError> {
        let columns: Vec<(Arc<str>, Vec<Value>)> = columns.into_iter().collect();
        let rows = columns
            .iter()
            .map(|(_, values)| values.len())
            .filter(|len| *len != 1)
            .max()
            .unwrap_or(usize::from(!columns.is_empty()));
        let mut table = Self {
            rows,
            ..Self::default()
        };
        for (name, values) in columns {
            table = table.with_column(name, values)?;
        }
        Ok(table)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn groups(&self) -> &[Arc<str>] {
        &self.groups
    }

    pub fn column_names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.columns.keys()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, EvalError> {
        self.columns.get(name).ok_or_else(|| EvalError::ColumnNotFound {
            name: name.to_string(),
        })
    }

    /// Adds or replaces a column. A single value is recycled to every row.
    pub fn with_column(mut self, name: Arc<str>, values: Vec<Value>) -> Result<Self, EvalError> {
        let values = match values.len() {
            len if len == self.rows => values,
            1 => vec![values[0].clone(); self.rows],
            len => {
                return Err(EvalError::LengthMismatch {
                    function: format!("column `{name}`"),
                    left: len,
                    right: self.rows,
                });
            }
        };
        self.columns.insert(name, Arc::new(values));
        Ok(self)
    }

    pub fn without_column(mut self, name: &str) -> Self {
        self.columns.shift_remove(name);
        self.groups.retain(|group| &**group != name);
        self
    }

    pub fn take_rows(&self, rows: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| {
                let taken = rows.iter().map(|row| values[*row].clone()).collect();
                (name.clone(), Arc::new(taken))
            })
            .collect();
        Self {
            columns,
            groups: self.groups.clone(),
            rows: rows.len(),
        }
    }

    pub fn group_by(mut self, names: Vec<Arc<str>>) -> Result<Self, EvalError> {
        for name in &names {
            self.column(name)?;
        }
        self.groups = names;
        Ok(self)
    }

    pub fn ungroup(mut self) -> Self {
        self.groups.clear();
        self
    }

    /// Keeps the given columns in order, renaming `(new, old)` pairs.
    /// Grouping columns are kept even when not selected.
    pub fn select(&self, names: &[(Arc<str>, Arc<str>)]) -> Result<Self, EvalError> {
        let mut columns = IndexMap::new();
        for group in &self.groups {
            if !names.iter().any(|(_, old)| old == group) {
                columns.insert(group.clone(), self.column(group)?.clone());
            }
        }
        for (new, old) in names {
            columns.insert(new.clone(), self.column(old)?.clone());
        }
        let groups = self
            .groups
            .iter()
            .map(|group| {
                names
                    .iter()
                    .find(|(_, old)| old == group)
                    .map_or_else(|| group.clone(), |(new, _)| new.clone())
            })
            .collect();
        Ok(Self {
            columns,
            groups,
            rows: self.rows,
        })
    }

    /// Splits rows by the grouping columns, groups in sorted key order.
    /// An ungrouped table is one group with every row.
    pub fn partition(&self) -> Result<Vec<Group>, EvalError> {
        if self.groups.is_empty() {
            return Ok(vec![Group {
                key: Vec::new(),
                rows: (0..self.rows).collect(),
            }]);
        }
        let key_columns = self
            .groups
            .iter()
            .map(|name| self.column(name))
            .collect::<Result<Vec<_>, _>>()?;
        let mut groups: IndexMap<Vec<OrderKey>, Group> = IndexMap::new();
        for row in 0..self.rows {
            let key: Vec<Value> = key_columns.iter().map(|column| column[row].clone()).collect();
            let order = key.iter().map(OrderKey::of).collect();
            groups
                .entry(order)
                .or_insert_with(|| Group {
                    key,
                    rows: Vec::new(),
                })
                .rows
                .push(row);
        }
        groups.sort_keys();
        Ok(groups.into_values().collect())
    }

    /// A data mask over `rows`: one binding per column, the row count, and
    /// `parent` for everything else.
    pub fn mask(&self, rows: &[usize], parent: &Environment) -> Environment {
        let mut bindings: IndexMap<Arc<str>, Binding> = self
            .columns
            .iter()
            .map(|(name, values)| {
                let values = Value::vector(rows.iter().map(|row| values[*row].clone()).collect());
                (name.clone(), Binding::Value(values))
            })
            .collect();
        bindings.insert(
            ROW_COUNT.into(),
            Binding::Value(Value::Number(rows.len() as f64)),
        );
        parent.mask(bindings)
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Row<'a>(&'a Table, usize);

        impl Serialize for Row<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let Row(table, row) = self;
                let mut map = serializer.serialize_map(Some(table.columns.len()))?;
                for (name, values) in &table.columns {
                    map.serialize_entry(&**name, &values[*row])?;
                }
                map.end()
            }
        }

        let mut seq = serializer.serialize_seq(Some(self.rows))?;
        for row in 0..self.rows {
            seq.serialize_element(&Row(self, row))?;
        }
        seq.end()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "# A tibble: {} x {}", self.rows, self.columns.len())?;
        if !self.groups.is_empty() {
            let groups: Vec<&str> = self.groups.iter().map(|group| &**group).collect();
            write!(f, "\n# Groups: {}", groups.join(", "))?;
        }
        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|(name, values)| {
                std::iter::once(name.to_string())
                    .chain(values.iter().map(Value::to_text))
                    .collect()
            })
            .collect();
        let widths: Vec<usize> = cells
            .iter()
            .map(|column| column.iter().map(String::len).max().unwrap_or(0))
            .collect();
        for line in 0..=self.rows {
            f.write_str("\n")?;
            let row: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(column, width)| format!("{:>width$}", column[line], width = *width))
                .collect();
            f.write_str(row.join(" ").trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(items: &[f64]) -> Vec<Value> {
        items.iter().copied().map(Value::Number).collect()
    }

    fn sample() -> Table {
        Table::from_columns([
            (Arc::from("g"), vec!["b".into(), "a".into(), "b".into()]),
            (Arc::from("x"), column(&[1.0, 2.0, 3.0])),
            (Arc::from("k"), column(&[7.0])),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_recycles() {
        let table = sample();
        assert_eq!(table.rows(), 3);
        assert_eq!(**table.column("k").unwrap(), column(&[7.0, 7.0, 7.0]));
        let mismatch = Table::from_columns([
            (Arc::from("a"), column(&[1.0, 2.0])),
            (Arc::from("b"), column(&[1.0, 2.0, 3.0])),
        ]);
        assert!(matches!(mismatch, Err(EvalError::LengthMismatch { .. })));
    }

    #[test]
    fn test_partition_sorts_groups() {
        let table = sample().group_by(vec![Arc::from("g")]).unwrap();
        let groups = table.partition().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, vec![Value::from("a")]);
        assert_eq!(groups[0].rows, vec![1]);
        assert_eq!(groups[1].rows, vec![0, 2]);
        assert!(matches!(
            sample().group_by(vec![Arc::from("nope")]),
            Err(EvalError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_select_keeps_groups_and_renames() {
        let table = sample().group_by(vec![Arc::from("g")]).unwrap();
        let selected = table.select(&[(Arc::from("value"), Arc::from("x"))]).unwrap();
        let names: Vec<&str> = selected.column_names().map(|name| &**name).collect();
        assert_eq!(names, vec!["g", "value"]);
    }

    #[test]
    fn test_mask_binds_group_rows() {
        let base = Environment::base();
        let mask = sample().mask(&[0, 2], &Environment::global(&base));
        assert!(matches!(
            mask.lookup("x"),
            Some(Binding::Value(Value::List(items))) if **items == column(&[1.0, 3.0])
        ));
        assert!(matches!(
            mask.lookup(ROW_COUNT),
            Some(Binding::Value(Value::Number(rows))) if rows == 2.0
        ));
    }

    #[test]
    fn test_serialize_rows() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"g": "b", "x": 1, "k": 7},
                {"g": "a", "x": 2, "k": 7},
                {"g": "b", "x": 3, "k": 7},
            ])
        );
    }
}
