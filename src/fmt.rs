use colored::Colorize;
use comfy_table::{Cell, Table};
use serde_json::Value;

use crate::response::Reply;

/// Prints the envelope as a colored status line followed by a table of the
/// content rows, when there are any.
pub fn print_reply(reply: &Reply) {
    let line = format!("[{}] {}", reply.status.code(), reply.message.trim_end());
    if reply.is_success() {
        println!("{}", line.green());
    } else {
        println!("{}", line.red());
    }
    if let Some(table) = content_table(&reply.content) {
        println!("{table}");
    }
}

fn content_table(content: &Value) -> Option<Table> {
    let rows: Vec<&serde_json::Map<String, Value>> = match content {
        Value::Object(map) => vec![map],
        Value::Array(items) if !items.is_empty() => items.iter().filter_map(Value::as_object).collect(),
        _ => return None,
    };
    let first = rows.first()?;
    let headers: Vec<String> = first.keys().cloned().collect();
    let mut table = Table::new();
    table.set_header(headers.clone());
    for row in &rows {
        table.add_row(
            headers
                .iter()
                .map(|key| Cell::new(cell_text(row.get(key))))
                .collect::<Vec<_>>(),
        );
    }
    Some(table)
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        // Embedded tag rows render as a name list.
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item.get("name").and_then(Value::as_str) {
                Some(name) => name.to_string(),
                None => item.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}
