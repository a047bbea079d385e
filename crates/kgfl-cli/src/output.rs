use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

/// Widest table we render; remaining fields are dropped.
const MAX_COLUMNS: usize = 6;

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", pretty(value)),
        OutputFormat::Table => print_as_table(value),
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn print_as_table(value: &Value) {
    let rows = match list_rows(value) {
        Some(rows) => rows,
        None => {
            println!("{}", pretty(value));
            return;
        }
    };
    if rows.is_empty() {
        println!("No records found.");
        return;
    }

    let columns = table_columns(rows);
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|c| c.to_string()));
    for row in rows {
        builder.push_record(columns.iter().map(|c| cell(row.get(*c))));
    }
    println!("{}", builder.build().with(Style::rounded()));
    if let Some(count) = value.get("count").and_then(Value::as_u64) {
        println!("Total: {count}");
    }
}

/// Rows of a plain array or of a paginated `{count, results}` envelope.
fn list_rows(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("results")?.as_array(),
        _ => None,
    }
}

/// Scalar fields of the first row, `id` first.
fn table_columns(rows: &[Value]) -> Vec<&str> {
    let Some(Value::Object(first)) = rows.first() else {
        return vec!["value"];
    };
    let mut columns: Vec<&str> = first
        .iter()
        .filter(|(_, v)| !v.is_object() && !v.is_array())
        .map(|(k, _)| k.as_str())
        .collect();
    if let Some(pos) = columns.iter().position(|c| *c == "id") {
        let id = columns.remove(pos);
        columns.insert(0, id);
    }
    columns.truncate(MAX_COLUMNS);
    columns
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
