//! Output formatting for query outcomes

use crate::db::QueryOutcome;
use crate::error::Result;
use clap::ValueEnum;

/// Maximum column width before truncation
const MAX_COLUMN_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn render(outcome: &QueryOutcome, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(outcome)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
    }
}

fn truncate_value(value: &str, max_width: usize) -> String {
    if value.chars().count() <= max_width {
        value.to_string()
    } else {
        let take = max_width.saturating_sub(3);
        format!("{}...", value.chars().take(take).collect::<String>())
    }
}

fn pad(value: &str, width: usize) -> String {
    let len = value.chars().count();
    format!("{}{}", value, " ".repeat(width.saturating_sub(len)))
}

fn border(widths: &[usize], left: char, mid: char, right: char) -> String {
    let mut line = String::new();
    line.push(left);
    for (idx, width) in widths.iter().enumerate() {
        line.push_str(&"─".repeat(width + 2));
        line.push(if idx == widths.len() - 1 { right } else { mid });
    }
    line.push('\n');
    line
}

fn row_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::from("│");
    for (cell, width) in cells.iter().zip(widths) {
        line.push(' ');
        line.push_str(&pad(cell, *width));
        line.push_str(" │");
    }
    line.push('\n');
    line
}

/// Box-drawn table for result sets, a one-line summary otherwise.
pub fn render_table(outcome: &QueryOutcome) -> String {
    let (columns, rows) = match outcome {
        QueryOutcome::Affected { rows_affected } => {
            return format!("Query OK, {} rows affected", rows_affected);
        }
        QueryOutcome::Rows { columns, rows } => (columns, rows),
    };

    if columns.is_empty() {
        return "(0 rows)".to_string();
    }

    let header: Vec<String> = columns
        .iter()
        .map(|c| truncate_value(c, MAX_COLUMN_WIDTH))
        .collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| truncate_value(cell.as_deref().unwrap_or("NULL"), MAX_COLUMN_WIDTH))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|c| c.chars().count()).collect();
    for row in &body {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut output = border(&widths, '┌', '┬', '┐');
    output.push_str(&row_line(&header, &widths));
    output.push_str(&border(&widths, '├', '┼', '┤'));
    for row in &body {
        output.push_str(&row_line(row, &widths));
    }
    output.push_str(&border(&widths, '└', '┴', '┘'));

    let row_label = if body.len() == 1 { "row" } else { "rows" };
    output.push_str(&format!("({} {})", body.len(), row_label));
    output
}
