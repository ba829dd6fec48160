//! `csv-to-json`: turn CSV text into a JSON array of row objects.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use toolbox_capabilities::{Capability, Kernel, RunError};

use crate::options::parse_options;

pub const KERNEL_NAME: &str = "csv-to-json";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CsvOptions {
    delimiter: Option<String>,
}

/// Kernel for the CSV converter.
#[derive(Debug, Default)]
pub struct CsvKernel;

impl Kernel for CsvKernel {
    fn name(&self) -> &str {
        KERNEL_NAME
    }

    fn instantiate(&self, options: &Value) -> Result<Arc<dyn Capability>, String> {
        let options: CsvOptions = parse_options(options)?;
        let delimiter = match options.delimiter.as_deref() {
            None => ',',
            Some(text) => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !matches!(c, '"' | '\r' | '\n') => c,
                    _ => return Err(format!("delimiter must be one character, got {text:?}")),
                }
            }
        };
        Ok(Arc::new(CsvToJson { delimiter }))
    }
}

struct CsvToJson {
    delimiter: char,
}

#[async_trait]
impl Capability for CsvToJson {
    async fn run(&self, input: &str) -> Result<String, RunError> {
        csv_to_json(input, self.delimiter)
    }
}

/// Split CSV text into rows of cells.
///
/// Quoted fields may contain delimiters, line breaks and `""` escapes.
/// `\r`, `\n` and `\r\n` all end a row.
pub fn parse_rows(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut row_started = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(c);
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                row_started = true;
            }
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
                row_started = false;
            }
            c if c == delimiter => {
                row.push(std::mem::take(&mut cell));
                row_started = true;
            }
            c => {
                cell.push(c);
                row_started = true;
            }
        }
    }

    if row_started {
        row.push(cell);
        rows.push(row);
    }
    rows
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// Convert CSV text to pretty-printed JSON.
///
/// The first non-blank row is the header. Unnamed columns become
/// `col{n}`, missing cells become `""` and blank rows are dropped.
pub fn csv_to_json(text: &str, delimiter: char) -> Result<String, RunError> {
    let mut rows = parse_rows(text, delimiter)
        .into_iter()
        .filter(|row| !is_blank(row));

    let Some(header) = rows.next() else {
        return Ok("[]".to_string());
    };

    let records: Vec<Value> = rows
        .map(|row| {
            let width = header.len().max(row.len());
            let mut record = Map::new();
            for i in 0..width {
                let key = match header.get(i).map(|name| name.trim()) {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => format!("col{}", i + 1),
                };
                let value = row.get(i).cloned().unwrap_or_default();
                record.insert(key, Value::String(value));
            }
            Value::Object(record)
        })
        .collect();

    serde_json::to_string_pretty(&records).map_err(|e| RunError::Failed(e.to_string()))
}
