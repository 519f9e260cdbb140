//! INSERT statement generation.
//!
//! [`InsertGenerator`] turns a [`Record`] into SQL text against a fixed,
//! validated table and column list. Literals are rendered per value tag,
//! with the declared [`FieldType`] deciding memo handling.
//!
//! # Literal forms
//! - strings are single-quoted with embedded `'` doubled
//! - memo columns in the PostgreSQL dialect use `E'...'` escape strings and
//!   render an empty memo as `NULL`
//! - integers and floats are unquoted; non-finite floats are rejected
//! - booleans are `TRUE` / `FALSE`
//! - dates are `'YYYY-MM-DD'`, datetimes `'YYYY-MM-DD HH:MM:SS'`
//! - `Null` is always `NULL`, never `''`

use crate::error::DbForgeError;
use crate::models::{Column, DatabaseType, FieldType, Record, Value};
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// SQL flavour used when rendering literals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// PostgreSQL: memo columns become `E'...'` escape strings.
    #[default]
    Postgres,
    /// Plain ANSI quoting everywhere. Line breaks inside string values are
    /// kept verbatim, so a rendered statement can span several lines.
    Standard,
}

impl From<DatabaseType> for SqlDialect {
    fn from(database_type: DatabaseType) -> Self {
        match database_type {
            DatabaseType::PostgreSQL => SqlDialect::Postgres,
            DatabaseType::SQLite => SqlDialect::Standard,
        }
    }
}

/// How accepted records are grouped into statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    /// One `INSERT` per record.
    Row,
    /// One multi-row `INSERT ... VALUES (...), (...)` per batch.
    #[default]
    Batch,
}

impl std::fmt::Display for InsertMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertMode::Row => write!(f, "row"),
            InsertMode::Batch => write!(f, "batch"),
        }
    }
}

/// Builds INSERT statements for one target table.
#[derive(Debug, Clone)]
pub struct InsertGenerator {
    table: String,
    columns: Vec<Column>,
    dialect: SqlDialect,
    column_list: String,
}

impl InsertGenerator {
    /// Creates a generator for `table` with the declared `columns`.
    ///
    /// # Errors
    /// Returns a configuration error when the table name or any column name
    /// is not a plain identifier, or when `columns` is empty.
    pub fn new(table: impl Into<String>, columns: Vec<Column>, dialect: SqlDialect) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;

        if columns.is_empty() {
            return Err(DbForgeError::configuration(format!(
                "cannot generate INSERT statements for '{}' without columns",
                table
            )));
        }
        for column in &columns {
            if !is_identifier(&column.name) {
                return Err(DbForgeError::configuration(format!(
                    "column name '{}' is not a valid SQL identifier",
                    column.name
                )));
            }
        }

        let column_list = columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Self {
            table,
            columns,
            dialect,
            column_list,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Renders one single-row INSERT statement.
    ///
    /// # Errors
    /// Schema mismatch when the record lacks a declared column, type coercion
    /// when a value cannot be rendered.
    pub fn generate(&self, record: &Record) -> Result<String> {
        let tuple = self.values_tuple(record)?;
        Ok(self.statement(&tuple))
    }

    /// Renders the parenthesised value list of `record` in column order.
    pub fn values_tuple(&self, record: &Record) -> Result<String> {
        let mut literals = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = record
                .get(&column.name)
                .ok_or_else(|| DbForgeError::schema_mismatch(&column.name))?;
            literals.push(sql_literal(column, value, self.dialect)?);
        }
        Ok(format!("({})", literals.join(", ")))
    }

    /// Joins already rendered value tuples into one multi-row statement.
    /// Returns `None` for an empty slice.
    pub fn statement_from_tuples(&self, tuples: &[String]) -> Option<String> {
        if tuples.is_empty() {
            return None;
        }
        Some(self.statement(&tuples.join(", ")))
    }

    /// Renders a multi-row INSERT for `records`.
    ///
    /// # Errors
    /// Fails on the first record that cannot be rendered, and with a
    /// configuration error on an empty slice.
    pub fn generate_batch(&self, records: &[Record]) -> Result<String> {
        let tuples = records
            .iter()
            .map(|record| self.values_tuple(record))
            .collect::<Result<Vec<_>>>()?;
        self.statement_from_tuples(&tuples).ok_or_else(|| {
            DbForgeError::configuration("cannot generate a batch INSERT without records")
        })
    }

    fn statement(&self, values: &str) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES {};",
            self.table, self.column_list, values
        )
    }
}

/// Renders `value` as an SQL literal for `column`.
///
/// # Errors
/// Returns a type coercion error for NaN or infinite floats.
pub fn sql_literal(column: &Column, value: &Value, dialect: SqlDialect) -> Result<String> {
    let literal = match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) if column.field_type == FieldType::Memo && dialect == SqlDialect::Postgres => {
            if s.is_empty() {
                "NULL".to_string()
            } else {
                format!("E'{}'", escape_memo(s))
            }
        }
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(f) => {
            return Err(DbForgeError::type_coercion(
                &column.name,
                format!("float value {} has no SQL literal", f),
            ));
        }
        Value::Boolean(true) => "TRUE".to_string(),
        Value::Boolean(false) => "FALSE".to_string(),
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
    };
    Ok(literal)
}

fn escape_memo(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\'' => escaped.push_str("''"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Checks `name` is `[A-Za-z0-9_]+`, optionally prefixed by one `schema.`.
///
/// # Errors
/// Returns a configuration error naming the rejected table.
pub fn validate_table_name(name: &str) -> Result<()> {
    let valid = match name.split_once('.') {
        Some((schema, table)) => is_identifier(schema) && is_identifier(table),
        None => is_identifier(name),
    };
    if valid {
        Ok(())
    } else {
        Err(DbForgeError::configuration(format!(
            "invalid table name '{}': expected letters, digits and underscores, optionally schema-qualified",
            name
        )))
    }
}

fn disallowed_table_chars() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[^a-z0-9_]"))
        .as_ref()
        .map_err(|e| DbForgeError::configuration(format!("table name pattern: {}", e)))
}

/// Derives a table name from a DBF file name.
///
/// The file stem is lowercased, whitespace runs become `_` and anything
/// outside `[a-z0-9_]` is dropped: `Cancelled CFDI.DBF` becomes
/// `cancelled_cfdi`.
///
/// # Errors
/// Returns a configuration error when nothing usable remains.
pub fn derive_table_name(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let underscored = stem.split_whitespace().collect::<Vec<_>>().join("_");
    let name = disallowed_table_chars()?
        .replace_all(&underscored, "")
        .into_owned();

    if name.is_empty() {
        return Err(DbForgeError::configuration(format!(
            "cannot derive a table name from '{}'",
            path.display()
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("DATE_FIELD", FieldType::Date),
            Column::new("STATUS", FieldType::Character),
            Column::new("MONTO", FieldType::Numeric),
        ]
    }

    fn generator(dialect: SqlDialect) -> InsertGenerator {
        InsertGenerator::new("vales", columns(), dialect).unwrap()
    }

    fn record() -> Record {
        Record::new()
            .with("DATE_FIELD", NaiveDate::from_ymd_opt(2023, 9, 19).unwrap())
            .with("STATUS", "I")
            .with("MONTO", 1500.5)
    }

    #[test]
    fn test_generate_single_row() {
        let sql = generator(SqlDialect::Postgres).generate(&record()).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO vales (DATE_FIELD, STATUS, MONTO) VALUES ('2023-09-19', 'I', 1500.5);"
        );
    }

    #[test]
    fn test_null_values_render_as_null() {
        let record = Record::new()
            .with("DATE_FIELD", Value::Null)
            .with("STATUS", Value::Null)
            .with("MONTO", Value::Null);
        let sql = generator(SqlDialect::Standard).generate(&record).unwrap();
        assert!(sql.ends_with("VALUES (NULL, NULL, NULL);"));
        assert!(!sql.contains("''"));
    }

    #[test]
    fn test_quotes_are_doubled() {
        let record = record().with("STATUS", "O'Brien");
        let sql = generator(SqlDialect::Postgres).generate(&record).unwrap();
        assert!(sql.contains("'O''Brien'"));
    }

    #[test]
    fn test_missing_column_is_schema_mismatch() {
        let record = Record::new().with("STATUS", "I");
        let err = generator(SqlDialect::Postgres).generate(&record).unwrap_err();
        assert!(matches!(err, DbForgeError::SchemaMismatch { .. }));
        assert!(err.is_record_scoped());
    }

    #[test]
    fn test_non_finite_float_is_type_coercion() {
        let record = record().with("MONTO", f64::INFINITY);
        let err = generator(SqlDialect::Postgres).generate(&record).unwrap_err();
        assert!(matches!(err, DbForgeError::TypeCoercion { ref field, .. } if field == "MONTO"));
    }

    #[test]
    fn test_extra_record_fields_are_ignored() {
        let record = record().with("UNDECLARED", "x");
        let sql = generator(SqlDialect::Postgres).generate(&record).unwrap();
        assert!(!sql.contains("UNDECLARED"));
    }

    #[test]
    fn test_literal_forms() {
        let column = Column::new("X", FieldType::Character);
        let dt = NaiveDate::from_ymd_opt(2023, 9, 19)
            .unwrap()
            .and_hms_opt(14, 3, 9)
            .unwrap();

        let cases = [
            (Value::Integer(-42), "-42"),
            (Value::Float(1000.0), "1000"),
            (Value::Boolean(true), "TRUE"),
            (Value::Boolean(false), "FALSE"),
            (Value::DateTime(dt), "'2023-09-19 14:03:09'"),
            (Value::from(""), "''"),
        ];
        for (value, expected) in cases {
            assert_eq!(
                sql_literal(&column, &value, SqlDialect::Postgres).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn test_memo_literal_by_dialect() {
        let memo = Column::new("XML", FieldType::Memo);
        let value = Value::from("<a b='1'>\\\n\t</a>\r");

        assert_eq!(
            sql_literal(&memo, &value, SqlDialect::Postgres).unwrap(),
            "E'<a b=''1''>\\\\\\n\\t</a>\\r'"
        );
        assert_eq!(
            sql_literal(&memo, &value, SqlDialect::Standard).unwrap(),
            "'<a b=''1''>\\\n\t</a>\r'"
        );
        assert_eq!(
            sql_literal(&memo, &Value::from(""), SqlDialect::Postgres).unwrap(),
            "NULL"
        );
    }

    #[test]
    fn test_generate_batch_preserves_order() {
        let generator = generator(SqlDialect::Standard);
        let records = vec![
            record().with("STATUS", "first"),
            record().with("STATUS", "second"),
        ];
        let sql = generator.generate_batch(&records).unwrap();
        assert!(sql.starts_with("INSERT INTO vales (DATE_FIELD, STATUS, MONTO) VALUES ("));
        assert!(sql.ends_with(");"));
        let first = sql.find("'first'").unwrap();
        let second = sql.find("'second'").unwrap();
        assert!(first < second);
        assert_eq!(sql.matches("), (").count(), 1);

        assert!(generator.generate_batch(&[]).is_err());
        assert!(generator.statement_from_tuples(&[]).is_none());
    }

    #[test]
    fn test_invalid_identifiers_rejected() {
        for table in ["", "vales; DROP TABLE x", "a.b.c", ".vales", "vales.", "my table"] {
            assert!(
                InsertGenerator::new(table, columns(), SqlDialect::Postgres).is_err(),
                "table {:?} should be rejected",
                table
            );
        }
        assert!(InsertGenerator::new("public.vales", columns(), SqlDialect::Postgres).is_ok());

        let bad_column = vec![Column::new("A-B", FieldType::Character)];
        assert!(InsertGenerator::new("vales", bad_column, SqlDialect::Postgres).is_err());
        assert!(InsertGenerator::new("vales", Vec::new(), SqlDialect::Postgres).is_err());
    }

    #[test]
    fn test_derive_table_name() {
        let cases = [
            ("data/CANCFDI.DBF", "cancfdi"),
            ("/tmp/Cancelled  CFDI.dbf", "cancelled_cfdi"),
            ("vales-2023 (copy).DBF", "vales2023_copy"),
        ];
        for (path, expected) in cases {
            assert_eq!(derive_table_name(Path::new(path)).unwrap(), expected);
        }
        assert!(derive_table_name(Path::new("###.dbf")).is_err());
    }

    #[test]
    fn test_dialect_from_database_type() {
        assert_eq!(SqlDialect::from(DatabaseType::PostgreSQL), SqlDialect::Postgres);
        assert_eq!(SqlDialect::from(DatabaseType::SQLite), SqlDialect::Standard);
    }
}
