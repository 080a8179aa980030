use serde_json::{Map, Value};
use unicode_width::UnicodeWidthStr;

/// Column name used for rows that are not objects (single-field projections).
const VALUE_COLUMN: &str = "value";

/// Column names across all rows, in first-seen order.
pub fn columns(rows: &[Value]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        match row {
            Value::Object(obj) => {
                for key in obj.keys() {
                    if !names.iter().any(|n| n == key) {
                        names.push(key.clone());
                    }
                }
            }
            _ => {
                if !names.iter().any(|n| n == VALUE_COLUMN) {
                    names.push(VALUE_COLUMN.to_string());
                }
            }
        }
    }
    names
}

fn cell<'a>(row: &'a Value, column: &str) -> Option<&'a Value> {
    match row {
        Value::Object(obj) => obj.get(column),
        other if column == VALUE_COLUMN => Some(other),
        _ => None,
    }
}

pub fn cell_display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn to_json(rows: &[Value]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
}

pub fn to_csv(rows: &[Value]) -> String {
    let columns = columns(rows);
    let mut output = String::new();

    let headers: Vec<String> = columns.iter().map(|c| csv_escape(c)).collect();
    output.push_str(&headers.join(","));
    output.push('\n');

    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| csv_escape(&cell_display(cell(row, c))))
            .collect();
        output.push_str(&cells.join(","));
        output.push('\n');
    }

    output
}

/// Plain-text table padded by display width, so wide characters line up.
pub fn to_table(rows: &[Value]) -> String {
    let columns = columns(rows);
    if columns.is_empty() {
        return "(0 rows)\n".to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| cell_display(cell(row, c)).replace('\n', " "))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|r| r[i].width())
                .chain(std::iter::once(name.width()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut output = String::new();
    push_line(&mut output, columns.iter().map(String::as_str), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&rule.join("-+-"));
    output.push('\n');
    for row in &cells {
        push_line(&mut output, row.iter().map(String::as_str), &widths);
    }
    output.push_str(&format!(
        "({} row{})\n",
        rows.len(),
        if rows.len() == 1 { "" } else { "s" }
    ));
    output
}

fn push_line<'a>(output: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(text, width)| {
            let pad = width.saturating_sub(text.width());
            format!("{}{}", text, " ".repeat(pad))
        })
        .collect();
    output.push_str(padded.join(" | ").trim_end());
    output.push('\n');
}

/// One row holding each aggregate under its label.
pub fn aggregate_row(results: &[(String, Option<Value>)]) -> Value {
    let mut row = Map::new();
    for (label, value) in results {
        row.insert(label.clone(), value.clone().unwrap_or(Value::Null));
    }
    Value::Object(row)
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_rows() -> Vec<Value> {
        vec![
            json!({"Id": 1, "Name": "Alice", "Active": true}),
            json!({"Id": 2, "Name": "Bob", "Active": null}),
        ]
    }

    #[test]
    fn test_csv_export() {
        let csv = to_csv(&make_rows());
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert_eq!(header.split(',').count(), 3);
        assert!(header.contains("Name"));
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.contains("Alice"));
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(csv_escape("hello"), "hello");
        assert_eq!(csv_escape("hello,world"), "\"hello,world\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_json_export() {
        let json = to_json(&make_rows());
        let parsed: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["Name"], "Alice");
        assert!(parsed[1]["Active"].is_null());
    }

    #[test]
    fn test_scalar_rows_use_value_column() {
        let rows = vec![json!("TestExample0"), json!("TestExample1")];
        assert_eq!(columns(&rows), vec!["value".to_string()]);
        let table = to_table(&rows);
        assert!(table.starts_with("value"));
        assert!(table.contains("TestExample1"));
        assert!(table.ends_with("(2 rows)\n"));
    }

    #[test]
    fn test_table_pads_by_display_width() {
        let rows = vec![json!({"Name": "日本"}), json!({"Name": "abcdef"})];
        let table = to_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Name");
        assert_eq!(lines[1], "------");
        assert_eq!(lines[2].width(), 4);
        assert_eq!(lines[3], "abcdef");
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(to_table(&[]), "(0 rows)\n");
    }

    #[test]
    fn test_aggregate_row() {
        let row = aggregate_row(&[
            ("NumberSum".to_string(), Some(json!(45))),
            ("LastName".to_string(), None),
        ]);
        assert_eq!(row, json!({"NumberSum": 45, "LastName": null}));
    }
}
