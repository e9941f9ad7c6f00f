//! Typed cell values.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Display format for timestamps (fractional seconds only when non-zero).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// The type of a cell, also the target set of type conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "int")]
    Integer,
    Float,
    #[serde(alias = "string", alias = "str")]
    Text,
    #[serde(alias = "datetime")]
    Timestamp,
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CellType::Boolean => "boolean",
            CellType::Integer => "integer",
            CellType::Float => "float",
            CellType::Text => "text",
            CellType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A single value in a table.
///
/// Cells are totally ordered so they can serve as row keys:
/// `Missing < Bool < numbers < Timestamp < Text`. Integers and floats compare
/// by numeric value, so `Int(1) == Float(1.0)` and both hash alike. `-0.0`
/// equals `0.0`; NaN sorts above every number (below, if negative).
#[derive(Debug, Clone, Default)]
pub enum Cell {
    #[default]
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Type of the value, `None` for a missing cell.
    pub fn cell_type(&self) -> Option<CellType> {
        match self {
            Cell::Missing => None,
            Cell::Bool(_) => Some(CellType::Boolean),
            Cell::Int(_) => Some(CellType::Integer),
            Cell::Float(_) => Some(CellType::Float),
            Cell::Text(_) => Some(CellType::Text),
            Cell::Timestamp(_) => Some(CellType::Timestamp),
        }
    }

    /// Numeric view used by arithmetic; booleans count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Build a cell from a JSON value (request bodies, scripts).
    pub fn from_json(value: &Value) -> Cell {
        match value {
            Value::Null => Cell::Missing,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => n.as_f64().map(Cell::Float).unwrap_or(Cell::Missing),
            },
            Value::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Missing => 0,
            Cell::Bool(_) => 1,
            Cell::Int(_) | Cell::Float(_) => 2,
            Cell::Timestamp(_) => 3,
            Cell::Text(_) => 4,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => Ok(()),
            Cell::Bool(true) => f.write_str("True"),
            Cell::Bool(false) => f.write_str("False"),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
                write!(f, "{x:.1}")
            }
            Cell::Float(x) => write!(f, "{x}"),
            Cell::Text(s) => f.write_str(s),
            Cell::Timestamp(t) => write!(f, "{}", t.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Cell::Missing => {}
            Cell::Bool(b) => b.hash(state),
            Cell::Int(i) => i.hash(state),
            Cell::Float(f) => match float_as_int(*f) {
                Some(i) => i.hash(state),
                None => f.to_bits().hash(state),
            },
            Cell::Text(s) => s.hash(state),
            Cell::Timestamp(t) => t.hash(state),
        }
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cell::Missing, Cell::Missing) => Ordering::Equal,
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (Cell::Float(a), Cell::Float(b)) if a == b => Ordering::Equal,
            (Cell::Float(a), Cell::Float(b)) => a.total_cmp(b),
            (Cell::Int(a), Cell::Float(b)) => cmp_int_float(*a, *b),
            (Cell::Float(a), Cell::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Timestamp(a), Cell::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// The integer a float denotes exactly, if any (`-0.0` is 0).
fn float_as_int(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= -I64_BOUND && f < I64_BOUND {
        Some(f as i64)
    } else {
        None
    }
}

/// 2^63 as a float; every float in `[-2^63, 2^63)` truncates into `i64` exactly.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer with a float, without rounding the integer.
fn cmp_int_float(a: i64, b: f64) -> Ordering {
    if b.is_nan() {
        return if b.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if b >= I64_BOUND {
        return Ordering::Less;
    }
    if b < -I64_BOUND {
        return Ordering::Greater;
    }
    let whole = b.trunc();
    match a.cmp(&(whole as i64)) {
        Ordering::Equal if b > whole => Ordering::Less,
        Ordering::Equal if b < whole => Ordering::Greater,
        ord => ord,
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(value: NaiveDateTime) -> Self {
        Cell::Timestamp(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Missing)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Missing => serializer.serialize_none(),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Int(i) => serializer.serialize_i64(*i),
            Cell::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Cell::Float(_) => serializer.serialize_none(),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Timestamp(_) => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Cell::from_json(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(s: &str) -> Cell {
        Cell::Timestamp(NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap())
    }

    #[test]
    fn test_total_order_across_types() {
        let mut cells = vec![
            Cell::from("b"),
            ts("2024-01-01 00:00:00"),
            Cell::Float(1.5),
            Cell::Missing,
            Cell::Int(2),
            Cell::Bool(true),
            Cell::Int(1),
        ];
        cells.sort();
        assert_eq!(
            cells,
            vec![
                Cell::Missing,
                Cell::Bool(true),
                Cell::Int(1),
                Cell::Float(1.5),
                Cell::Int(2),
                ts("2024-01-01 00:00:00"),
                Cell::from("b"),
            ]
        );
    }

    #[test]
    fn test_int_and_float_compare_by_value() {
        assert_eq!(Cell::Int(1), Cell::Float(1.0));
        assert_eq!(Cell::Int(1).cmp(&Cell::Float(1.0)), Ordering::Equal);
        assert_eq!(Cell::Int(2).cmp(&Cell::Float(1.5)), Ordering::Greater);
        assert_eq!(Cell::Float(-0.5).cmp(&Cell::Int(0)), Ordering::Less);
        assert_eq!(Cell::Float(0.0), Cell::Float(-0.0));
        assert_eq!(Cell::Int(0), Cell::Float(-0.0));
        assert_ne!(Cell::Int(1), Cell::from("1"));

        // 2^53 + 1 has no exact float; the nearest float is 2^53.
        let big = (1_i64 << 53) + 1;
        assert_eq!(Cell::Int(big).cmp(&Cell::Float(big as f64)), Ordering::Greater);
        assert_eq!(Cell::Int(i64::MAX).cmp(&Cell::Float(f64::INFINITY)), Ordering::Less);
        assert_eq!(Cell::Int(i64::MIN).cmp(&Cell::Float(f64::NAN)), Ordering::Less);
    }

    #[test]
    fn test_equal_numbers_hash_alike() {
        use std::collections::HashSet;

        let set: HashSet<Cell> = [Cell::Int(1), Cell::Float(1.0), Cell::Float(1.5), Cell::Float(-0.0), Cell::Int(0)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 3);
        assert!(set.contains(&Cell::Float(1.5)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Cell::Missing.to_string(), "");
        assert_eq!(Cell::Bool(true).to_string(), "True");
        assert_eq!(Cell::Bool(false).to_string(), "False");
        assert_eq!(Cell::Float(10.0).to_string(), "10.0");
        assert_eq!(Cell::Float(2.5).to_string(), "2.5");
        assert_eq!(ts("2024-03-05 10:20:30").to_string(), "2024-03-05 10:20:30");
    }

    #[test]
    fn test_json_round_trip_of_keys() {
        let cells: Vec<Cell> = serde_json::from_value(json!([1, 2.5, "x", null, true])).unwrap();
        assert_eq!(
            cells,
            vec![
                Cell::Int(1),
                Cell::Float(2.5),
                Cell::from("x"),
                Cell::Missing,
                Cell::Bool(true)
            ]
        );
        assert_eq!(serde_json::to_value(&cells).unwrap(), json!([1, 2.5, "x", null, true]));
    }

    #[test]
    fn test_cell_type_aliases() {
        let t: CellType = serde_json::from_value(json!("int")).unwrap();
        assert_eq!(t, CellType::Integer);
        let t: CellType = serde_json::from_value(json!("datetime")).unwrap();
        assert_eq!(t, CellType::Timestamp);
        let t: CellType = serde_json::from_value(json!("string")).unwrap();
        assert_eq!(t, CellType::Text);
    }
}
