use fleet_core::types::{Target, Warning};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// An informational result with nothing to tabulate.
pub fn print_notice(notice: &str, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(&serde_json::json!({ "notice": notice }))
    } else {
        println!("{notice}");
        Ok(())
    }
}

/// Left-aligned columns separated by two spaces, with a dashed rule under the header.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    print_row(headers.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", rule.join("  "));
    for row in &rows {
        print_row(row.iter().map(String::as_str), &widths);
    }
}

fn print_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(c, &w)| format!("{c:w$}"))
        .collect();
    println!("{}", padded.join("  ").trim_end());
}

/// Per-target failures go to stderr so stdout stays parseable.
pub fn print_warnings(warnings: &[Warning]) {
    for w in warnings {
        eprintln!("warning: {w}");
    }
}

pub fn print_skipped(skipped: &[Target]) {
    if !skipped.is_empty() {
        let names: Vec<&str> = skipped.iter().map(Target::name).collect();
        eprintln!("skipped (not confirmed): {}", names.join(", "));
    }
}
