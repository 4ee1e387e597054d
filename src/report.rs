//! Self-contained HTML diff report across an ordered run of snapshots.
//!
//! Layout is a matrix: one row per package class, one column per snapshot
//! in chronological order. Each cell summarizes the diff against the
//! previous column; the first column has no predecessor and stays empty.
//! Everything is inlined (styles included) so the file can be mailed or
//! attached as-is.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::diff::{diff_packages, DiffResult};
use crate::snapshot::Snapshot;

/// Default cap on inline sample entries per cell; the rest moves into the
/// collapsible block.
pub const DEFAULT_SAMPLE_LIMIT: usize = 30;

const CSS: &str = "
<style>
:root { --label-col-width: 200px; --col-min-width: 440px; }
body { font-family: -apple-system, BlinkMacSystemFont, Segoe UI, Roboto, Helvetica, Arial, sans-serif; padding: 16px; margin: 0; }
.table-wrap { width: 100%; overflow-x: auto; }
table { border-collapse: separate; border-spacing: 0; width: max-content; min-width: 100%; }
th, td { border: 1px solid #ddd; vertical-align: top; padding: 10px; word-break: break-word; overflow-wrap: anywhere; }
thead th { background: #fafafa; position: sticky; top: 0; z-index: 2; }
.rowlbl-hdr, .rowlbl { width: var(--label-col-width); min-width: var(--label-col-width); max-width: var(--label-col-width); background: #fff; position: sticky; left: 0; z-index: 3; }
.rowlbl { font-weight: 700; }
.taghdr, td.datacell { min-width: var(--col-min-width); }
td .counts { font-weight: 600; margin-bottom: 6px; }
td ul { margin: 4px 0 8px 16px; padding: 0; }
td h5 { margin: 6px 0 4px; font-size: 12px; color: #555; }
details { margin-top: 6px; }
.empty { color: #666; font-style: italic; }
</style>
";

/// Escape text for embedding in HTML.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn item_list(entries: &[String]) -> String {
    let mut html = String::from("<ul>");
    for entry in entries {
        html.push_str(&format!("<li>{}</li>", html_escape(entry)));
    }
    html.push_str("</ul>");
    html
}

fn labeled_list(title: &str, entries: &[String]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    format!("<h5>{}</h5>{}", title, item_list(entries))
}

/// Render one diff cell.
///
/// Zero changes renders only the empty-state marker. Otherwise: a counts
/// line, an inline sample (half added, half upgraded, capped at
/// `sample_limit`), and, when entries remain unshown, the full four-way
/// breakdown inside a collapsed block labeled with the total.
pub fn render_cell(diff: &DiffResult, sample_limit: usize) -> String {
    let total = diff.total();
    if total == 0 {
        return "<div class='empty'>No changes</div>".to_string();
    }

    let mut html = format!(
        "<div class='counts'>+{} / ↑{} / ↓{} / −{}</div>",
        diff.added.len(),
        diff.upgraded.len(),
        diff.downgraded.len(),
        diff.removed.len()
    );

    let half = sample_limit / 2;
    let mut sample: Vec<String> = Vec::new();
    sample.extend(diff.added.iter().take(half).cloned());
    sample.extend(diff.upgraded.iter().take(half).cloned());
    if !sample.is_empty() {
        html.push_str(&item_list(&sample));
    }

    if total > sample.len() {
        let details = format!(
            "{}{}{}{}",
            labeled_list("Added", &diff.added),
            labeled_list("Upgraded", &diff.upgraded),
            labeled_list("Downgraded", &diff.downgraded),
            labeled_list("Removed", &diff.removed)
        );
        html.push_str(&format!(
            "<details><summary>Show all ({})</summary>{}</details>",
            total, details
        ));
    }
    html
}

fn data_row(label: &str, cells: &[String]) -> String {
    let mut html = format!("<tr><th class='rowlbl'>{}</th>", label);
    for cell in cells {
        html.push_str(&format!("<td class='datacell'>{}</td>", cell));
    }
    html.push_str("</tr>");
    html
}

/// Render the full report for a set of snapshots.
///
/// Snapshots are ordered by `(ordering_timestamp, tag)`; each class row is
/// diffed between chronologically adjacent columns.
pub fn render_report(mut snapshots: Vec<Snapshot>, sample_limit: usize) -> String {
    snapshots.sort_by(|a, b| {
        (a.ordering_timestamp, &a.tag).cmp(&(b.ordering_timestamp, &b.tag))
    });

    let mut rpm_cells = Vec::with_capacity(snapshots.len());
    let mut python_cells = Vec::with_capacity(snapshots.len());
    let mut collection_cells = Vec::with_capacity(snapshots.len());
    for (idx, snapshot) in snapshots.iter().enumerate() {
        if idx == 0 {
            rpm_cells.push(String::new());
            python_cells.push(String::new());
            collection_cells.push(String::new());
            continue;
        }
        let prev = &snapshots[idx - 1].document;
        let cur = &snapshot.document;
        rpm_cells.push(render_cell(&diff_packages(&prev.rpms, &cur.rpms), sample_limit));
        python_cells.push(render_cell(
            &diff_packages(&prev.python, &cur.python),
            sample_limit,
        ));
        collection_cells.push(render_cell(
            &diff_packages(&prev.collections, &cur.collections),
            sample_limit,
        ));
    }

    let mut html = String::from("<html><head><meta charset='utf-8'>");
    html.push_str(CSS);
    html.push_str("</head><body>");
    html.push_str("<h1>EE Image Package Diffs</h1>");
    html.push_str(
        "<p>Columns are widened for readability (min width ~440px). Scroll horizontally to \
         view all tags and vertically for full details.</p>",
    );
    html.push_str("<div class='table-wrap'><table>");

    html.push_str("<thead><tr><th class='rowlbl-hdr'>Type</th>");
    for snapshot in &snapshots {
        html.push_str(&format!(
            "<th class='taghdr'>{}</th>",
            html_escape(&snapshot.tag)
        ));
    }
    html.push_str("</tr></thead>");

    html.push_str("<tbody>");
    html.push_str(&data_row("RPMs", &rpm_cells));
    html.push_str(&data_row("Python Packages", &python_cells));
    html.push_str(&data_row("Ansible Collections", &collection_cells));
    html.push_str("</tbody></table></div>");

    html.push_str("</body></html>");
    html
}

pub fn write_report(snapshots: Vec<Snapshot>, out_path: &Path, sample_limit: usize) -> Result<()> {
    let html = render_report(snapshots, sample_limit);
    fs::write(out_path, html)
        .with_context(|| format!("Failed to write report to {}", out_path.display()))
}
