use crate::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Item identifier: the 0-based row index in the item table
pub type ItemId = usize;

/// Table of items with named categorical attributes
///
/// Each row is one item; its id is the row index. Values are kept as
/// strings, comparisons against numeric literals happen in the filter engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemTable {
    attributes: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ItemTable {
    /// Create a table, checking attribute names and row widths
    pub fn new(attributes: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if attributes.is_empty() {
            return Err(Error::ItemTable {
                line: 1,
                message: "header names no attribute".to_string(),
            });
        }

        for (i, name) in attributes.iter().enumerate() {
            if attributes[..i].contains(name) {
                return Err(Error::ItemTable {
                    line: 1,
                    message: format!("duplicated attribute `{}`", name),
                });
            }
        }

        for (i, row) in rows.iter().enumerate() {
            if row.len() != attributes.len() {
                return Err(Error::ItemTable {
                    line: i + 2,
                    message: format!(
                        "expected {} columns, got {}",
                        attributes.len(),
                        row.len()
                    ),
                });
            }
        }

        Ok(Self { attributes, rows })
    }

    /// Parse a whitespace-delimited table whose first non-blank line is the header
    ///
    /// A leading `#` on a header token is dropped, so `#item c0 c1` names
    /// the attributes `item`, `c0` and `c1`.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut attributes: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            if fields.is_empty() {
                continue;
            }

            match &attributes {
                None => {
                    let names: Vec<String> = fields
                        .into_iter()
                        .map(|f| f.trim_start_matches('#').to_string())
                        .collect();
                    if names.iter().any(String::is_empty) {
                        return Err(Error::ItemTable {
                            line: line_no + 1,
                            message: "empty attribute name in header".to_string(),
                        });
                    }
                    attributes = Some(names);
                }
                Some(names) => {
                    if fields.len() != names.len() {
                        return Err(Error::ItemTable {
                            line: line_no + 1,
                            message: format!(
                                "expected {} columns, got {}",
                                names.len(),
                                fields.len()
                            ),
                        });
                    }
                    rows.push(fields);
                }
            }
        }

        let attributes = attributes.ok_or_else(|| Error::ItemTable {
            line: 0,
            message: "missing header".to_string(),
        })?;
        Self::new(attributes, rows)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Every combination of `n_attributes` attributes `c0..` with values `0..base`
    ///
    /// `c0` varies fastest, so the item id is `sum(value_k * base^k)`.
    pub fn product(base: usize, n_attributes: usize) -> Self {
        let attributes: Vec<String> = (0..n_attributes).map(|k| format!("c{}", k)).collect();
        let count = base.pow(n_attributes as u32);

        let rows = (0..count)
            .map(|id| {
                let mut rest = id;
                (0..n_attributes)
                    .map(|_| {
                        let value = rest % base;
                        rest /= base;
                        value.to_string()
                    })
                    .collect()
            })
            .collect();

        Self { attributes, rows }
    }

    /// Write the table back in the whitespace-delimited format
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{}", self.attributes.join(" "))?;
        for row in &self.rows {
            writeln!(writer, "{}", row.join(" "))?;
        }
        writer.flush()?;
        Ok(())
    }

    #[inline]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    #[inline]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn row(&self, item: ItemId) -> &[String] {
        &self.rows[item]
    }

    #[inline]
    pub fn value(&self, item: ItemId, column: usize) -> &str {
        &self.rows[item][column]
    }
}
