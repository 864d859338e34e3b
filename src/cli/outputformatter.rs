use serde_json::Value;

use terminal_size::{Width, Height, terminal_size};

use crate::store::types::{Metadata, SearchResponse, StoredVersion, VersionList};

// Render rows under a header as an ASCII table, one String per printed line.
// Lines are clipped to `termw` visible characters; the header line is bold when `color` is set.
pub fn render_table(cols: &[String], rows: &[Vec<String>], termw: usize, color: bool) -> Vec<String> {
    let mut widths: Vec<usize> = cols.iter().map(|s| display_len(s).min(termw)).collect();
    for r in rows {
        for (i, cell) in r.iter().enumerate().take(cols.len()) {
            let w = display_len(cell);
            if w > widths[i] { widths[i] = w.min(termw); }
        }
    }

    let sep = fit_line_to_width(&build_separator(&widths), termw);
    let mut out = Vec::with_capacity(rows.len() + 5);
    out.push(sep.clone());
    let header = fit_line_to_width(&build_row(cols, &widths, false), termw);
    out.push(if color { format!("\x1b[1m{}\x1b[0m", header) } else { header });
    out.push(sep.clone());
    for r in rows {
        out.push(fit_line_to_width(&build_row(r, &widths, true), termw));
    }
    out.push(sep);
    out.push(fit_line_to_width(&format!("rows: {}, cols: {}", rows.len(), cols.len()), termw));
    out
}

fn print_lines(lines: Vec<String>) {
    for l in lines { println!("{}", l); }
}

fn print_table(cols: &[&str], rows: Vec<Vec<String>>) {
    let termw = get_terminal_width();
    crate::tprintln!("[cli.outputformatter] detected terminal width={} columns", termw);
    let cols: Vec<String> = cols.iter().map(|c| c.to_string()).collect();
    print_lines(render_table(&cols, &rows, termw, terminal_size().is_some()));
}

pub fn print_metadata(row_key: &str, meta: &Metadata) {
    println!("metadata of {}:", row_key);
    let rows = meta.iter().map(|(k, v)| vec![k.clone(), v.clone()]).collect();
    print_table(&["field", "value"], rows);
}

pub fn print_versions(list: &VersionList) {
    if list.is_empty() {
        println!("no versions of '{}'", list.name);
        return;
    }
    let rows = list
        .versions
        .iter()
        .map(|v| vec![v.to_string(), format!("v{}.{}", v, list.name)])
        .collect();
    print_table(&["version", "row_key"], rows);
}

pub fn print_keys(keys: &[String]) {
    if keys.is_empty() {
        println!("table is empty");
        return;
    }
    print_table(&["row_key"], keys.iter().map(|k| vec![k.clone()]).collect());
}

pub fn print_stored(op: &str, v: &StoredVersion) {
    print_table(
        &["op", "row_key", "version", "size_bytes", "cells"],
        vec![vec![
            op.to_string(),
            v.row_key.clone(),
            v.version.to_string(),
            v.size_bytes.to_string(),
            v.cells_written.to_string(),
        ]],
    );
}

// Search hits are JSON documents; the column set is the union of their keys.
pub fn print_search(resp: &SearchResponse) {
    let mut cols: Vec<String> = Vec::new();
    for d in &resp.docs {
        if let Value::Object(map) = d {
            for k in map.keys() { if !cols.contains(k) { cols.push(k.clone()); } }
        }
    }
    cols.sort();
    if cols.is_empty() {
        println!("matches: {}", resp.count);
        return;
    }
    let rows: Vec<Vec<String>> = resp
        .docs
        .iter()
        .map(|d| cols.iter().map(|c| to_cell_string(d.get(c).unwrap_or(&Value::Null))).collect())
        .collect();
    let termw = get_terminal_width();
    print_lines(render_table(&cols, &rows, termw, terminal_size().is_some()));
    if resp.count > resp.docs.len() as u64 {
        println!("showing {} of {} matches", resp.docs.len(), resp.count);
    }
}

fn to_cell_string(v: &Value) -> String {
    match v {
        Value::Null => String::from("NULL"),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        // multi-valued Solr fields come back as arrays; show them inline
        Value::Array(items) => items.iter().map(to_cell_string).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn display_len(s: &str) -> usize { s.chars().count() }

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('+');
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize], align_numbers: bool) -> String {
    let mut s = String::new();
    s.push('|');
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).cloned().unwrap_or_default();
        let text = truncate(&cell, *w);
        let pad = w.saturating_sub(display_len(&text));
        s.push(' ');
        if align_numbers && is_numeric_like(&cell) {
            s.push_str(&" ".repeat(pad));
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&" ".repeat(pad));
        }
        s.push(' ');
        s.push('|');
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    let take = max - 1;
    s.chars().take(take).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    // crude detection for aligning numbers to right
    let st = s.trim();
    if st.is_empty() { return false; }
    let mut has_digit = false;
    for ch in st.chars() {
        if ch.is_ascii_digit() { has_digit = true; continue; }
        if ".-+eE,_".contains(ch) { continue; }
        return false;
    }
    has_digit
}

// --- Terminal fitting ---

fn get_terminal_width() -> usize {
    if let Some((Width(w), Height(_h))) = terminal_size() {
        return (w as usize).saturating_sub(4).max(20);
    }
    120
}

fn fit_line_to_width(s: &str, maxw: usize) -> String {
    if display_len(s) <= maxw { return s.to_string(); }
    truncate(s, maxw)
}
