use crate::core::Rate;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    Result,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Result => style(text).green().bold(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

pub fn number_cell(value: impl Display) -> Cell {
    Cell::new(value).set_alignment(CellAlignment::Right)
}

/// Formats an `Option<T>` into a `Cell`. `None` is displayed as "-".
pub fn format_optional_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    value.map_or(
        Cell::new("-")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
        |v| Cell::new(format_fn(v)).set_alignment(CellAlignment::Right),
    )
}

/// Rounds to three decimals and separates thousands, e.g. `1,234.500`.
pub fn format_amount<R: Rate>(value: R) -> String {
    let text = format!("{:.3}", value.round_to(3));
    let (sign, digits) = match text.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", text.as_str()),
    };
    let (integer, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, c) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{fraction}")
    }
}

/// Lays items out `per_line` to a line, separated by spaces.
pub fn grouped_lines<T: Display>(items: &[T], per_line: usize) -> Vec<String> {
    items
        .chunks(per_line.max(1))
        .map(|chunk| {
            chunk
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

pub fn print_grouped<T: Display>(items: &[T], per_line: usize) {
    for line in grouped_lines(items, per_line) {
        println!("{line}");
    }
}

/// Creates a new `indicatif::ProgressBar` with standard styling.
pub fn new_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}",
        )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(100.0), "100.000");
        assert_eq!(format_amount(1234567.8912), "1,234,567.891");
        assert_eq!(format_amount(999.9996), "1,000.000");
        assert_eq!(format_amount(Decimal::new(-12345, 1)), "-1,234.500");
        assert_eq!(format_amount(Decimal::new(72679700559634, 12)), "72.680");
    }

    #[test]
    fn test_grouped_lines() {
        let codes: Vec<String> = (0..23).map(|i| format!("C{i:02}")).collect();
        let lines = grouped_lines(&codes, 10);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("C00 C01"));
        assert_eq!(lines[2], "C20 C21 C22");
        assert!(grouped_lines::<String>(&[], 10).is_empty());
    }
}
