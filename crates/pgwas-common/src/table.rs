//! Delimited text tables
//!
//! Every input file the importer understands is either tab-separated without a
//! header (`.012`, `.012.pos`, line lists) or comma-separated with a header row
//! (phenotypes, kinship, population structure, GWAS runs and results). This
//! module reads both into a [`Table`] of trimmed string cells.
//!
//! Records are read in flexible mode: a row with the wrong number of fields is
//! kept as-is so that validators can report it as a column-count violation
//! instead of failing inside the reader.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CommonError, Result};

/// Field separator of a delimited file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Comma,
}

impl Delimiter {
    fn as_byte(self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }
}

/// An in-memory delimited table
#[derive(Debug, Clone)]
pub struct Table {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Read a delimited file.
    ///
    /// Without a header row, columns are named by position (`"0"`, `"1"`, ...).
    /// A file with no records at all is an [`CommonError::EmptyFile`].
    pub fn read(path: impl AsRef<Path>, delimiter: Delimiter, has_header: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CommonError::io(path, e))?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter.as_byte())
            .has_headers(has_header)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let csv_err = |source| CommonError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut headers: Vec<String> = if has_header {
            reader
                .headers()
                .map_err(csv_err)?
                .iter()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        if has_header && headers.is_empty() {
            return Err(CommonError::EmptyFile(path.to_path_buf()));
        }
        if !has_header {
            if rows.is_empty() {
                return Err(CommonError::EmptyFile(path.to_path_buf()));
            }
            let width = rows.iter().map(Vec::len).max().unwrap_or(0);
            headers = (0..width).map(|i| i.to_string()).collect();
        }

        debug!(
            path = %path.display(),
            rows = rows.len(),
            columns = headers.len(),
            "Read delimited table"
        );

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    /// Build a table from already-split cells (used by tests and callers that
    /// post-process files)
    pub fn from_parts(path: impl Into<PathBuf>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            path: path.into(),
            headers,
            rows,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Index of the first column whose header equals `name` exactly
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of the first header in `names` that is present, in preference order
    pub fn first_column_of(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.column_index(name))
    }

    /// Cell at `(row, column)`; `None` when the row is shorter than the header
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
    }

    /// Cells of one column, `None` for rows missing that field
    pub fn column(&self, column: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |r| r.get(column).map(String::as_str))
    }

    /// Replace a header name
    pub fn rename_column(&mut self, column: usize, name: impl Into<String>) {
        if let Some(header) = self.headers.get_mut(column) {
            *header = name.into();
        }
    }
}
