/// Renders table rows as column-aligned plain text, one row per line.
pub fn render_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in rows {
        for (column, cell) in row.iter().enumerate() {
            widths[column] = widths[column].max(cell.trim().chars().count());
        }
    }

    rows.iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| {
            let line = (0..columns)
                .map(|column| {
                    let cell = row.get(column).map(|cell| cell.trim()).unwrap_or("");
                    format!("{cell:<width$}", width = widths[column])
                })
                .collect::<Vec<_>>()
                .join("  ");
            line.trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::render_table;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| cell.to_string()).collect()
    }

    #[test]
    fn columns_are_aligned() {
        let rendered = render_table(&[row(&["Team", "Wins"]), row(&["Lakers", "52"])]);
        assert_eq!(rendered, "Team    Wins\nLakers  52");
    }

    #[test]
    fn ragged_and_empty_rows_are_handled() {
        let rendered = render_table(&[row(&["a", "b", "c"]), row(&["", ""]), row(&["dd"])]);
        assert_eq!(rendered, "a   b  c\ndd");
    }

    #[test]
    fn empty_table_renders_empty() {
        assert_eq!(render_table(&[]), "");
    }
}
