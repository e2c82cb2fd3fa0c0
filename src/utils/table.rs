use unicode_width::UnicodeWidthStr;

/// Render a boxed table with right-aligned cells sized by display width.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let all_rows: Vec<Vec<String>> =
        std::iter::once(headers.iter().map(|h| h.to_string()).collect())
            .chain(rows.iter().cloned())
            .collect();

    let col_count = headers.len();
    let mut col_widths = vec![0; col_count];
    for row in &all_rows {
        for (i, cell) in row.iter().enumerate().take(col_count) {
            col_widths[i] = col_widths[i].max(cell.width());
        }
    }

    let border = format!(
        "+{}+",
        col_widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');

    for (row_idx, row) in all_rows.iter().enumerate() {
        let formatted_row = col_widths
            .iter()
            .enumerate()
            .map(|(i, width)| {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                let padding = width.saturating_sub(cell.width());
                format!(" {}{} ", " ".repeat(padding), cell)
            })
            .collect::<Vec<_>>()
            .join("|");

        out.push('|');
        out.push_str(&formatted_row);
        out.push_str("|\n");

        if row_idx == 0 {
            out.push_str(&border);
            out.push('\n');
        }
    }

    out.push_str(&border);
    out
}
