use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Write a per-cell table: one named column per quantity, one row per cell.
/// Every column must have the same length.
pub fn write_cell_table<P: AsRef<Path>>(path: P, columns: &[(&str, &[f64])]) -> io::Result<()> {
    let rows = columns.first().map_or(0, |(_, values)| values.len());
    if let Some((name, values)) = columns.iter().find(|(_, values)| values.len() != rows) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("column '{name}' has {} rows, expected {rows}", values.len()),
        ));
    }

    let mut out = BufWriter::new(File::create(path)?);
    let header: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    writeln!(out, "{}", header.join(","))?;

    let mut line = String::new();
    for row in 0..rows {
        line.clear();
        for (k, (_, values)) in columns.iter().enumerate() {
            if k > 0 {
                line.push(',');
            }
            line.push_str(&format!("{:.15e}", values[row]));
        }
        writeln!(out, "{line}")?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn table_has_a_header_and_one_row_per_cell() {
        let path = std::env::temp_dir().join("superfill_cell_table.csv");
        let (x, phi) = ([0.5, 1.5, 2.5], [-1.0, 0.0, 1.0]);

        write_cell_table(&path, &[("x", &x[..]), ("distance", &phi[..])]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "x,distance");
        assert_eq!(lines.len(), 4);
        let last: Vec<f64> = lines[3].split(',').map(|v| v.parse().unwrap()).collect();
        assert_eq!(last, vec![2.5, 1.0]);

        fs::remove_file(path).ok();
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let path = std::env::temp_dir().join("superfill_cell_table_bad.csv");
        let err = write_cell_table(&path, &[("a", &[1.0][..]), ("b", &[1.0, 2.0][..])]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
