//! Declarative record filters.
//!
//! A [`FilterSet`] is the configuration document: an `enabled` switch and an
//! ordered list of [`FilterCondition`]s combined with AND. It is compiled once
//! against the source [`Schema`] into a [`FilterEvaluator`], which is then
//! applied to every record.
//!
//! # Load-time checks
//! Everything that can be decided without looking at a record is decided by
//! [`FilterSet::compile`] and reported as a configuration error: unknown
//! operators (rejected while deserializing), fields missing from the schema,
//! `value2` present or absent in the wrong place, and configured values that
//! cannot be coerced into the field's comparison lane.
//!
//! # Record-time policy
//! - A field absent from the record fails the condition closed: the record is
//!   excluded.
//! - A null field value fails the condition: no value satisfies a comparison
//!   against null.
//! - A record value that cannot be coerced into the field's lane is a type
//!   coercion error. The caller skips the record; it is never counted as a
//!   match.
//! - `between` is a closed interval. Bounds given in descending order are
//!   swapped at compile time, so `{value: 10, value2: 1}` matches `1..=10`.

use crate::error::DbForgeError;
use crate::models::{Lane, Record, Schema, Value};
use crate::Result;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::str::FromStr;

#[cfg(test)]
mod tests;

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "between", alias = "BETWEEN")]
    Between,
}

impl Operator {
    /// Whether an ordering of `record_value` against the bound satisfies the
    /// operator. `Between` is evaluated on both bounds separately.
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Between => false,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Between => "between",
        };
        write!(f, "{}", symbol)
    }
}

impl FromStr for Operator {
    type Err = DbForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "=" | "==" => Ok(Operator::Eq),
            ">" => Ok(Operator::Gt),
            "<" => Ok(Operator::Lt),
            ">=" => Ok(Operator::Ge),
            "<=" => Ok(Operator::Le),
            "between" | "BETWEEN" => Ok(Operator::Between),
            other => Err(DbForgeError::configuration(format!(
                "unrecognized filter operator '{}' (expected =, >, <, >=, <= or between)",
                other
            ))),
        }
    }
}

/// One `field operator value(s)` test as written in the configuration.
///
/// `operator` defaults to `=` when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    #[serde(default)]
    pub operator: Operator,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<serde_json::Value>,
}

impl FilterCondition {
    /// Creates a scalar comparison condition.
    pub fn new(
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            value2: None,
        }
    }

    /// Creates an inclusive range condition.
    pub fn between(
        field: impl Into<String>,
        value: impl Into<serde_json::Value>,
        value2: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Between,
            value: value.into(),
            value2: Some(value2.into()),
        }
    }

    fn compile(&self, position: usize, schema: &Schema) -> Result<CompiledCondition> {
        let field = self.field.trim();
        if field.is_empty() {
            return Err(DbForgeError::configuration(format!(
                "filter condition #{} has an empty field name",
                position
            )));
        }

        let column = schema.column(field).ok_or_else(|| {
            DbForgeError::configuration(format!(
                "filter condition #{} references field '{}' which is not in the source schema",
                position, field
            ))
        })?;
        let lane = column.field_type.lane();

        let predicate = match (self.operator, &self.value2) {
            (Operator::Between, Some(value2)) => {
                let low = coerce_config_value(field, lane, &self.value)?;
                let high = coerce_config_value(field, lane, value2)?;
                let ordering = low.compare(&high).ok_or_else(|| {
                    DbForgeError::configuration(format!(
                        "between bounds for '{}' are not comparable",
                        field
                    ))
                })?;
                if ordering == Ordering::Greater {
                    tracing::debug!(
                        "Bounds for '{}' given in descending order; treating as [{}, {}]",
                        field,
                        high,
                        low
                    );
                    Predicate::Between {
                        low: high,
                        high: low,
                    }
                } else {
                    Predicate::Between { low, high }
                }
            }
            (Operator::Between, None) => {
                return Err(DbForgeError::configuration(format!(
                    "filter condition #{} on '{}' uses between but has no value2",
                    position, field
                )));
            }
            (operator, Some(_)) => {
                return Err(DbForgeError::configuration(format!(
                    "filter condition #{} on '{}' sets value2, which is only valid with between (got '{}')",
                    position, field, operator
                )));
            }
            (operator, None) => Predicate::Compare {
                operator,
                bound: coerce_config_value(field, lane, &self.value)?,
            },
        };

        Ok(CompiledCondition {
            field: field.to_string(),
            lane,
            predicate,
        })
    }
}

/// The filter configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
}

impl FilterSet {
    /// A filter set that lets every record through.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// An enabled filter set with the given conditions.
    pub fn new(conditions: Vec<FilterCondition>) -> Self {
        Self {
            enabled: true,
            conditions,
        }
    }

    /// Parses a standalone filter document.
    ///
    /// # Errors
    /// Malformed JSON and unrecognized operators are configuration errors.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            DbForgeError::configuration(format!("invalid filter configuration: {}", e))
        })
    }

    /// Validates the conditions against `schema` and prepares them for
    /// evaluation.
    ///
    /// A disabled set compiles to an evaluator that accepts everything
    /// without looking at its conditions.
    ///
    /// # Errors
    /// Returns a configuration error for any condition that can never be
    /// evaluated; see the module documentation for the list.
    pub fn compile(&self, schema: &Schema) -> Result<FilterEvaluator> {
        if !self.enabled {
            tracing::debug!("Filtering disabled; every record passes");
            return Ok(FilterEvaluator::pass_all());
        }

        let conditions = self
            .conditions
            .iter()
            .enumerate()
            .map(|(i, condition)| condition.compile(i.saturating_add(1), schema))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Compiled {} filter condition(s)", conditions.len());
        Ok(FilterEvaluator {
            enabled: true,
            conditions,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Compare { operator: Operator, bound: Value },
    Between { low: Value, high: Value },
}

#[derive(Debug, Clone, PartialEq)]
struct CompiledCondition {
    field: String,
    lane: Lane,
    predicate: Predicate,
}

impl CompiledCondition {
    fn matches(&self, record: &Record) -> Result<bool> {
        let Some(raw) = record.get(&self.field) else {
            tracing::debug!("Field '{}' absent from record; excluding", self.field);
            return Ok(false);
        };
        if raw.is_null() {
            return Ok(false);
        }

        let value = coerce_record_value(&self.field, self.lane, raw)?;
        match &self.predicate {
            Predicate::Compare { operator, bound } => {
                Ok(operator.accepts(self.order(&value, bound)?))
            }
            Predicate::Between { low, high } => Ok(self.order(&value, low)? != Ordering::Less
                && self.order(&value, high)? != Ordering::Greater),
        }
    }

    fn order(&self, value: &Value, bound: &Value) -> Result<Ordering> {
        value.compare(bound).ok_or_else(|| {
            DbForgeError::type_coercion(
                &self.field,
                format!(
                    "cannot compare {} value '{}' with {} bound '{}'",
                    value.type_name(),
                    value,
                    bound.type_name(),
                    bound
                ),
            )
        })
    }
}

/// Compiled, stateless form of a [`FilterSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEvaluator {
    enabled: bool,
    conditions: Vec<CompiledCondition>,
}

impl FilterEvaluator {
    /// An evaluator that includes every record.
    pub fn pass_all() -> Self {
        Self {
            enabled: false,
            conditions: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of compiled conditions.
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Decides whether `record` is included.
    ///
    /// Conditions are checked in configuration order and evaluation stops at
    /// the first one that fails.
    ///
    /// # Errors
    /// Returns a type coercion error when a record value cannot be compared in
    /// its field's lane. The record must then be treated as excluded.
    pub fn evaluate(&self, record: &Record) -> Result<bool> {
        if !self.enabled {
            return Ok(true);
        }
        for condition in &self.conditions {
            if !condition.matches(record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses `YYYY-MM-DD`, `YYYY/MM/DD` or the DBF on-disk `YYYYMMDD` form.
/// A datetime string is truncated to its date.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let year = s.get(0..4)?.parse().ok()?;
        let month = s.get(4..6)?.parse().ok()?;
        let day = s.get(6..8)?.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
        .or_else(|| parse_datetime_only(s).map(|dt| dt.date()))
}

/// Parses a datetime; a bare date is taken at midnight.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let s = input.trim();
    parse_datetime_only(s).or_else(|| {
        DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
            .or_else(|| {
                if s.len() == 8 {
                    parse_date(s)
                } else {
                    None
                }
            })
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

fn parse_datetime_only(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_uppercase().as_str() {
        "T" | "TRUE" | "Y" | "YES" | "1" => Some(true),
        "F" | "FALSE" | "N" | "NO" | "0" => Some(false),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}

/// Coerces a configured JSON scalar into `lane`. Failures are configuration
/// errors since they are detected before any record is read.
fn coerce_config_value(field: &str, lane: Lane, raw: &serde_json::Value) -> Result<Value> {
    use serde_json::Value as Json;

    let invalid = || {
        DbForgeError::configuration(format!(
            "filter value {} is not a valid {} value for field '{}'",
            raw, lane, field
        ))
    };

    match (lane, raw) {
        (_, Json::Null | Json::Array(_) | Json::Object(_)) => Err(invalid()),
        (Lane::Text, Json::String(s)) => Ok(Value::String(s.clone())),
        (Lane::Text, Json::Number(n)) => Ok(Value::String(n.to_string())),
        (Lane::Numeric, Json::Number(n)) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float))
            .ok_or_else(invalid),
        (Lane::Numeric, Json::String(s)) => parse_number(s).ok_or_else(invalid),
        (Lane::Boolean, Json::Bool(b)) => Ok(Value::Boolean(*b)),
        (Lane::Boolean, Json::String(s)) => parse_bool(s).map(Value::Boolean).ok_or_else(invalid),
        (Lane::Date, Json::String(s)) => parse_date(s).map(Value::Date).ok_or_else(invalid),
        (Lane::DateTime, Json::String(s)) => {
            parse_datetime(s).map(Value::DateTime).ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

/// Coerces a non-null record value into `lane`.
fn coerce_record_value<'a>(field: &str, lane: Lane, raw: &'a Value) -> Result<Cow<'a, Value>> {
    let coerced = match (lane, raw) {
        (Lane::Text, Value::String(_))
        | (Lane::Numeric, Value::Integer(_))
        | (Lane::Boolean, Value::Boolean(_))
        | (Lane::Date, Value::Date(_))
        | (Lane::DateTime, Value::DateTime(_)) => Some(Cow::Borrowed(raw)),
        (Lane::Numeric, Value::Float(f)) if f.is_finite() => Some(Cow::Borrowed(raw)),
        (Lane::Numeric, Value::String(s)) => parse_number(s).map(Cow::Owned),
        (Lane::Boolean, Value::String(s)) => parse_bool(s).map(|b| Cow::Owned(Value::Boolean(b))),
        (Lane::Date, Value::DateTime(dt)) => Some(Cow::Owned(Value::Date(dt.date()))),
        (Lane::Date, Value::String(s)) => parse_date(s).map(|d| Cow::Owned(Value::Date(d))),
        (Lane::DateTime, Value::Date(d)) => d
            .and_hms_opt(0, 0, 0)
            .map(|dt| Cow::Owned(Value::DateTime(dt))),
        (Lane::DateTime, Value::String(s)) => {
            parse_datetime(s).map(|dt| Cow::Owned(Value::DateTime(dt)))
        }
        _ => None,
    };

    coerced.ok_or_else(|| {
        DbForgeError::type_coercion(
            field,
            format!(
                "{} value '{}' cannot be read as {}",
                raw.type_name(),
                raw,
                lane
            ),
        )
    })
}
