//! DBF record source backed by the `dbase` crate.
//!
//! Records are decoded lazily, one per `next()`, into the closed
//! [`Value`] enum. A calendar-invalid date is reported as a per-record type
//! coercion error so the pipeline can skip that record; anything the
//! `dbase` reader itself rejects is a source error and ends the run.

use crate::error::DbForgeError;
use crate::models::{Column, FieldType, Record, Schema, Value};
use crate::sql::derive_table_name;
use crate::Result;
use chrono::{NaiveDate, NaiveDateTime};
use dbase::FieldValue;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

impl From<dbase::FieldType> for FieldType {
    fn from(field_type: dbase::FieldType) -> Self {
        match field_type {
            dbase::FieldType::Character => FieldType::Character,
            dbase::FieldType::Currency => FieldType::Currency,
            dbase::FieldType::Numeric => FieldType::Numeric,
            dbase::FieldType::Float => FieldType::Float,
            dbase::FieldType::Date => FieldType::Date,
            dbase::FieldType::DateTime => FieldType::DateTime,
            dbase::FieldType::Logical => FieldType::Logical,
            dbase::FieldType::Memo => FieldType::Memo,
            dbase::FieldType::Integer => FieldType::Integer,
            dbase::FieldType::Double => FieldType::Double,
        }
    }
}

fn read_failed(context: String, error: &dbase::Error) -> DbForgeError {
    DbForgeError::Source {
        context,
        source: error.to_string().into(),
    }
}

/// An opened DBF table.
pub struct DbfSource<R: Read + Seek> {
    path: PathBuf,
    reader: dbase::Reader<R>,
    schema: Schema,
}

/// Opens the DBF file at `path`, loading its memo file when present.
///
/// # Errors
/// Returns a source error when the file cannot be opened or its header is
/// not a valid dBASE header.
pub fn open(path: impl AsRef<Path>) -> Result<DbfSource<impl Read + Seek>> {
    let path = path.as_ref();
    let reader = dbase::Reader::from_path(path)
        .map_err(|e| read_failed(format!("failed to open DBF file '{}'", path.display()), &e))?;
    Ok(DbfSource::from_reader(path, reader))
}

impl<R: Read + Seek> DbfSource<R> {
    /// Wraps an already opened reader. `path` is used for table naming,
    /// diagnostics and record counting.
    pub fn from_reader(path: impl Into<PathBuf>, reader: dbase::Reader<R>) -> Self {
        let schema = reader
            .fields()
            .iter()
            .map(|field| Column::new(field.name(), FieldType::from(field.field_type())))
            .collect();
        let path = path.into();
        tracing::debug!("Opened DBF source '{}'", path.display());
        Self {
            path,
            reader,
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Field names and declared types in file order.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Table name derived from the file name.
    pub fn table_name(&self) -> Result<String> {
        derive_table_name(&self.path)
    }

    /// Counts the live records with a separate pass over the file.
    ///
    /// # Errors
    /// Returns a source error if the file cannot be re-read.
    pub fn record_count(&self) -> Result<usize> {
        let mut reader = dbase::Reader::from_path(&self.path).map_err(|e| {
            read_failed(format!("failed to reopen '{}'", self.path.display()), &e)
        })?;
        let mut count = 0usize;
        for (index, record) in reader.iter_records().enumerate() {
            record.map_err(|e| {
                read_failed(format!("failed to read record {}", index.saturating_add(1)), &e)
            })?;
            count = count.saturating_add(1);
        }
        Ok(count)
    }

    /// Lazy, forward-only iterator over the decoded records.
    pub fn records(&mut self) -> impl Iterator<Item = Result<Record>> + '_ {
        self.reader
            .iter_records()
            .enumerate()
            .map(|(index, record)| {
                let position = index.saturating_add(1);
                let record = record
                    .map_err(|e| read_failed(format!("failed to read record {}", position), &e))?;
                decode_record(record)
            })
    }
}

fn decode_record(record: dbase::Record) -> Result<Record> {
    record
        .into_iter()
        .map(|(name, value)| {
            let value = decode_value(&name, value)?;
            Ok((name, value))
        })
        .collect()
}

/// Converts one `dbase` field value.
pub fn decode_value(field: &str, value: FieldValue) -> Result<Value> {
    let decoded = match value {
        FieldValue::Character(text) => text.map(|s| s.trim_end().to_string()).into(),
        FieldValue::Memo(text) => Value::String(text),
        FieldValue::Numeric(number) => number.into(),
        // f32 goes through its shortest decimal form so 0.1 stays 0.1
        FieldValue::Float(number) => match number {
            Some(n) => n
                .to_string()
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or(Value::Float(f64::from(n))),
            None => Value::Null,
        },
        FieldValue::Integer(i) => Value::Integer(i64::from(i)),
        FieldValue::Double(d) | FieldValue::Currency(d) => Value::Float(d),
        FieldValue::Logical(flag) => flag.into(),
        FieldValue::Date(date) => match date {
            Some(date) => Value::Date(decode_date(field, &date)?),
            None => Value::Null,
        },
        FieldValue::DateTime(stamp) => Value::DateTime(decode_datetime(field, &stamp)?),
    };
    Ok(decoded)
}

fn decode_date(field: &str, date: &dbase::Date) -> Result<NaiveDate> {
    i32::try_from(date.year())
        .ok()
        .and_then(|year| {
            NaiveDate::from_ymd_opt(year, u32::from(date.month()), u32::from(date.day()))
        })
        .ok_or_else(|| {
            DbForgeError::type_coercion(
                field,
                format!(
                    "{:04}{:02}{:02} is not a valid calendar date",
                    date.year(),
                    date.month(),
                    date.day()
                ),
            )
        })
}

fn decode_datetime(field: &str, stamp: &dbase::DateTime) -> Result<NaiveDateTime> {
    let date = decode_date(field, &stamp.date())?;
    let time = stamp.time();
    date.and_hms_opt(
        u32::from(time.hours()),
        u32::from(time.minutes()),
        u32::from(time.seconds()),
    )
    .ok_or_else(|| {
        DbForgeError::type_coercion(
            field,
            format!(
                "{:02}:{:02}:{:02} is not a valid time of day",
                time.hours(),
                time.minutes(),
                time.seconds()
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_character_trims_padding() {
        let value = decode_value("STATUS", FieldValue::Character(Some("I   ".to_string()))).unwrap();
        assert_eq!(value, Value::from("I"));
        assert_eq!(
            decode_value("STATUS", FieldValue::Character(None)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_decode_numeric_kinds() {
        assert_eq!(
            decode_value("N", FieldValue::Numeric(Some(12.5))).unwrap(),
            Value::Float(12.5)
        );
        assert_eq!(
            decode_value("F", FieldValue::Float(Some(0.1))).unwrap(),
            Value::Float(0.1)
        );
        assert_eq!(
            decode_value("I", FieldValue::Integer(-7)).unwrap(),
            Value::Integer(-7)
        );
        assert_eq!(
            decode_value("Y", FieldValue::Currency(3.25)).unwrap(),
            Value::Float(3.25)
        );
        assert_eq!(decode_value("N", FieldValue::Numeric(None)).unwrap(), Value::Null);
    }

    #[test]
    fn test_decode_logical_and_memo() {
        assert_eq!(
            decode_value("L", FieldValue::Logical(Some(true))).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(decode_value("L", FieldValue::Logical(None)).unwrap(), Value::Null);
        assert_eq!(
            decode_value("M", FieldValue::Memo("<xml/>".to_string())).unwrap(),
            Value::from("<xml/>")
        );
    }

    #[test]
    fn test_decode_dates() {
        let value = decode_value("D", FieldValue::Date(Some(dbase::Date::new(19, 9, 2023)))).unwrap();
        assert_eq!(value, Value::Date(NaiveDate::from_ymd_opt(2023, 9, 19).unwrap()));
        assert_eq!(decode_value("D", FieldValue::Date(None)).unwrap(), Value::Null);
    }

    #[test]
    fn test_invalid_calendar_date_is_record_scoped() {
        let err = decode_value("D", FieldValue::Date(Some(dbase::Date::new(31, 2, 2023)))).unwrap_err();
        assert!(matches!(err, DbForgeError::TypeCoercion { ref field, .. } if field == "D"));
        assert!(err.is_record_scoped());
    }

    #[test]
    fn test_open_missing_file_is_source_error() {
        let result = open("/nonexistent/path/VALES.DBF");
        assert!(matches!(result, Err(DbForgeError::Source { .. })));
    }
}
