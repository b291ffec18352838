// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Flat comma-separated tables for traces, probes and summaries.
//!
//! Floats are written with Rust's shortest round-trip formatting, so a
//! written table reads back to the identical rows. Readers find columns by
//! header name and ignore columns they do not know.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::probe::ProbeRow;
use crate::scan::ScanRow;
use crate::summary::SummaryRow;
use crate::tracer::TraceRow;

const SEPARATOR: char = ',';

#[derive(Debug, Error)]
pub enum TableError {
    #[error("{source_name}: missing column `{column}`")]
    MissingColumn { source_name: String, column: String },
    #[error("{source_name}:{line}: cannot parse `{value}` in column `{column}`")]
    Parse {
        source_name: String,
        line: usize,
        column: String,
        value: String,
    },
    #[error("value `{value}` for column `{column}` contains a separator or line break")]
    InvalidField { column: String, value: String },
    #[error("no input tables given")]
    NoInputs,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A row type with a fixed set of named columns.
pub trait TableRow: Sized {
    const COLUMNS: &'static [&'static str];

    /// `(alias, column)` pairs accepted in place of a column name on read.
    const ALIASES: &'static [(&'static str, &'static str)] = &[];

    /// Field texts in [`Self::COLUMNS`] order.
    fn fields(&self) -> Vec<String>;

    fn from_record(record: &Record<'_>) -> Result<Self, TableError>;
}

/// One parsed data line with by-name access.
pub struct Record<'a> {
    source_name: &'a str,
    line: usize,
    index: &'a HashMap<String, usize>,
    fields: Vec<&'a str>,
}

impl<'a> Record<'a> {
    pub fn text(&self, column: &str) -> Result<&'a str, TableError> {
        let position = self
            .index
            .get(column)
            .copied()
            .ok_or_else(|| TableError::MissingColumn {
                source_name: self.source_name.to_string(),
                column: column.to_string(),
            })?;
        // Short lines read as empty trailing fields.
        Ok(self.fields.get(position).copied().unwrap_or(""))
    }

    pub fn parse<T: FromStr>(&self, column: &str) -> Result<T, TableError> {
        let value = self.text(column)?;
        value.trim().parse().map_err(|_| TableError::Parse {
            source_name: self.source_name.to_string(),
            line: self.line,
            column: column.to_string(),
            value: value.to_string(),
        })
    }
}

/// Writes the header and `rows`.
pub fn write_table<W: Write, T: TableRow>(writer: &mut W, rows: &[T]) -> io::Result<()> {
    writeln!(writer, "{}", T::COLUMNS.join(","))?;
    for row in rows {
        writeln!(writer, "{}", row.fields().join(","))?;
    }
    Ok(())
}

/// Reads rows of `T`; `source_name` labels errors.
pub fn read_table<R: Read, T: TableRow>(reader: R, source_name: &str) -> Result<Vec<T>, TableError> {
    let io_error = |source| TableError::Io {
        path: PathBuf::from(source_name),
        source,
    };
    let mut lines = BufReader::new(reader).lines();
    let header = match lines.next() {
        Some(line) => line.map_err(io_error)?,
        None => String::new(),
    };
    let mut index: HashMap<String, usize> = header
        .trim_end_matches('\r')
        .split(SEPARATOR)
        .enumerate()
        .map(|(position, name)| (name.trim().to_string(), position))
        .collect();
    for (alias, column) in T::ALIASES {
        if !index.contains_key(*column) {
            if let Some(&position) = index.get(*alias) {
                index.insert(column.to_string(), position);
            }
        }
    }
    for column in T::COLUMNS {
        if !index.contains_key(*column) {
            return Err(TableError::MissingColumn {
                source_name: source_name.to_string(),
                column: column.to_string(),
            });
        }
    }

    let mut rows = Vec::new();
    for (offset, line) in lines.enumerate() {
        let line = line.map_err(io_error)?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let record = Record {
            source_name,
            line: offset + 2,
            index: &index,
            fields: line.split(SEPARATOR).collect(),
        };
        rows.push(T::from_record(&record)?);
    }
    Ok(rows)
}

/// Writes `rows` to `path`, creating parent directories.
pub fn save_table<T: TableRow>(path: &Path, rows: &[T]) -> Result<(), TableError> {
    let io_error = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };
    for row in rows {
        check_fields::<T>(&row.fields())?;
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    write_table(&mut writer, rows).map_err(io_error)?;
    writer.flush().map_err(io_error)
}

pub fn load_table<T: TableRow>(path: &Path) -> Result<Vec<T>, TableError> {
    let file = File::open(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_table(file, &path.display().to_string())
}

fn check_fields<T: TableRow>(fields: &[String]) -> Result<(), TableError> {
    for (column, value) in T::COLUMNS.iter().zip(fields) {
        if value.contains([SEPARATOR, '\n', '\r']) {
            return Err(TableError::InvalidField {
                column: column.to_string(),
                value: value.clone(),
            });
        }
    }
    Ok(())
}

impl TableRow for TraceRow {
    const COLUMNS: &'static [&'static str] = &["sigma", "t", "abs_zeta_a"];
    const ALIASES: &'static [(&'static str, &'static str)] =
        &[("abs_zeta_a_min", "abs_zeta_a"), ("|zeta_a|", "abs_zeta_a")];

    fn fields(&self) -> Vec<String> {
        vec![
            self.sigma.to_string(),
            self.t.to_string(),
            self.abs_zeta.to_string(),
        ]
    }

    fn from_record(record: &Record<'_>) -> Result<Self, TableError> {
        Ok(TraceRow {
            sigma: record.parse("sigma")?,
            t: record.parse("t")?,
            abs_zeta: record.parse("abs_zeta_a")?,
        })
    }
}

impl TableRow for ScanRow {
    const COLUMNS: &'static [&'static str] = &["sigma", "t", "log_abs_zeta_a"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.sigma.to_string(),
            self.t.to_string(),
            self.log_abs_zeta.to_string(),
        ]
    }

    fn from_record(record: &Record<'_>) -> Result<Self, TableError> {
        Ok(ScanRow {
            sigma: record.parse("sigma")?,
            t: record.parse("t")?,
            log_abs_zeta: record.parse("log_abs_zeta_a")?,
        })
    }
}

impl TableRow for ProbeRow {
    const COLUMNS: &'static [&'static str] = &["t", "sigma", "abs_ratio", "arg_ratio"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.t.to_string(),
            self.sigma.to_string(),
            self.abs_ratio.to_string(),
            self.arg_ratio.to_string(),
        ]
    }

    fn from_record(record: &Record<'_>) -> Result<Self, TableError> {
        Ok(ProbeRow {
            t: record.parse("t")?,
            sigma: record.parse("sigma")?,
            abs_ratio: record.parse("abs_ratio")?,
            arg_ratio: record.parse("arg_ratio")?,
        })
    }
}

impl TableRow for SummaryRow {
    const COLUMNS: &'static [&'static str] =
        &["file", "n", "abs_mean", "abs_dev", "arg_std", "tag"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.file.clone(),
            self.n.to_string(),
            self.abs_mean.to_string(),
            self.abs_dev.to_string(),
            self.arg_std.to_string(),
            self.tag.clone(),
        ]
    }

    fn from_record(record: &Record<'_>) -> Result<Self, TableError> {
        Ok(SummaryRow {
            file: record.text("file")?.to_string(),
            n: record.parse("n")?,
            abs_mean: record.parse("abs_mean")?,
            abs_dev: record.parse("abs_dev")?,
            arg_std: record.parse("arg_std")?,
            tag: record.text("tag")?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn probe_rows() -> Vec<ProbeRow> {
        vec![
            ProbeRow {
                t: 10.0,
                sigma: 0.5,
                abs_ratio: 1.000_000_000_000_2,
                arg_ratio: -3.141_592_653_589_793,
            },
            ProbeRow {
                t: 10.25,
                sigma: 0.5,
                abs_ratio: 0.1 + 0.2,
                arg_ratio: 1e-300,
            },
        ]
    }

    #[test]
    fn probe_table_round_trips_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("probe.csv");
        save_table(&path, &probe_rows()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("t,sigma,abs_ratio,arg_ratio\n"));
        let back: Vec<ProbeRow> = load_table(&path).unwrap();
        assert_eq!(back, probe_rows());
    }

    #[test]
    fn trace_table_round_trips_exactly() {
        let rows = vec![
            TraceRow {
                sigma: 0.500_000_1,
                t: 14.134_725,
                abs_zeta: 2.5e-7,
            },
            TraceRow {
                sigma: 0.3,
                t: 14.384_725,
                abs_zeta: 0.071,
            },
        ];
        let mut buffer = Vec::new();
        write_table(&mut buffer, &rows).unwrap();
        let back: Vec<TraceRow> = read_table(buffer.as_slice(), "memory").unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn scan_table_has_log_modulus_column() {
        let rows = vec![ScanRow {
            sigma: 0.3,
            t: 0.0,
            log_abs_zeta: -69.07755278982137,
        }];
        let mut buffer = Vec::new();
        write_table(&mut buffer, &rows).unwrap();
        assert!(buffer.starts_with(b"sigma,t,log_abs_zeta_a\n"));
        let back: Vec<ScanRow> = read_table(buffer.as_slice(), "heat.csv").unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn columns_are_found_by_name() {
        let text = "extra,arg_ratio,abs_ratio,sigma,t\nx,0.5,1.5,0.49,12\n\n";
        let rows: Vec<ProbeRow> = read_table(text.as_bytes(), "shuffled.csv").unwrap();
        assert_eq!(
            rows,
            vec![ProbeRow {
                t: 12.0,
                sigma: 0.49,
                abs_ratio: 1.5,
                arg_ratio: 0.5,
            }]
        );
    }

    #[test]
    fn trace_tables_accept_older_modulus_headers() {
        let expected = vec![
            TraceRow {
                sigma: 0.52,
                t: 14.0,
                abs_zeta: 0.003,
            },
            TraceRow {
                sigma: 0.49,
                t: 14.25,
                abs_zeta: 0.01,
            },
        ];
        for header in ["sigma,t,abs_zeta_a_min", "sigma,t,|zeta_a|", "t,sigma,abs_zeta_a"] {
            let body = if header.starts_with('t') {
                "14,0.52,0.003\n14.25,0.49,0.01\n"
            } else {
                "0.52,14,0.003\n0.49,14.25,0.01\n"
            };
            let text = format!("{header}\n{body}");
            let rows: Vec<TraceRow> = read_table(text.as_bytes(), "zeros_a0.02_m0.01.csv").unwrap();
            assert_eq!(rows, expected, "{header}");
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("zeros_a0.02_m0.01.csv");
        std::fs::write(&path, "sigma,t,abs_zeta_a_min\n0.52,14,0.003\n").unwrap();
        let rows: Vec<TraceRow> = load_table(&path).unwrap();
        assert_eq!(rows[0].abs_zeta, 0.003);
    }

    #[test]
    fn canonical_column_wins_over_its_alias() {
        let text = "sigma,t,abs_zeta_a_min,abs_zeta_a\n0.5,10,9,0.25\n";
        let rows: Vec<TraceRow> = read_table(text.as_bytes(), "both.csv").unwrap();
        assert_eq!(rows[0].abs_zeta, 0.25);
    }

    #[test]
    fn missing_column_names_file_and_column() {
        let err = read_table::<_, ProbeRow>("t,sigma,abs_ratio\n1,2,3\n".as_bytes(), "old.csv")
            .unwrap_err();
        match err {
            TableError::MissingColumn {
                source_name,
                column,
            } => {
                assert_eq!(source_name, "old.csv");
                assert_eq!(column, "arg_ratio");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_values_report_line_and_column() {
        let text = "sigma,t,abs_zeta_a\n0.5,10,0.1\n0.5,oops,0.1\n";
        let err = read_table::<_, TraceRow>(text.as_bytes(), "z.csv").unwrap_err();
        assert!(
            matches!(err, TableError::Parse { line: 3, ref column, .. } if column == "t"),
            "{err}"
        );
    }

    #[test]
    fn separators_in_text_fields_are_rejected() {
        let dir = tempdir().unwrap();
        let row = SummaryRow {
            file: "a,b.csv".into(),
            n: 0,
            abs_mean: f64::NAN,
            abs_dev: f64::NAN,
            arg_std: f64::NAN,
            tag: String::new(),
        };
        let err = save_table(&dir.path().join("s.csv"), &[row]).unwrap_err();
        assert!(matches!(err, TableError::InvalidField { ref column, .. } if column == "file"));
    }

    #[test]
    fn summary_rows_keep_nan_statistics() {
        let row = SummaryRow {
            file: "empty.csv".into(),
            n: 0,
            abs_mean: f64::NAN,
            abs_dev: f64::NAN,
            arg_std: f64::NAN,
            tag: "baseline".into(),
        };
        let mut buffer = Vec::new();
        write_table(&mut buffer, std::slice::from_ref(&row)).unwrap();
        let back: Vec<SummaryRow> = read_table(buffer.as_slice(), "memory").unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].file, "empty.csv");
        assert_eq!(back[0].tag, "baseline");
        assert!(back[0].abs_mean.is_nan());
    }
}
