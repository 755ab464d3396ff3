//! Resource tables — named column data (well lists, volumes) loaded by name.
//!
//! Tables are only read when a block actually references a column, and each
//! file is read at most once per compilation.

use super::error::RecipeError;
use super::types::ResourceRef;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl TableValue {
    /// Parse a raw CSV cell, preferring numbers.
    fn from_cell(cell: &str) -> Self {
        if let Ok(n) = cell.parse::<i64>() {
            Self::Integer(n)
        } else if let Ok(x) = cell.parse::<f64>() {
            Self::Float(x)
        } else {
            Self::Text(cell.to_string())
        }
    }

    /// Interpret the cell as a whole-number volume.
    pub fn as_volume(&self) -> Option<u32> {
        match self {
            Self::Integer(n) => u32::try_from(*n).ok(),
            Self::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 && *x >= 0.0 && *x <= f64::from(u32::MAX) {
                    Some(*x as u32)
                } else {
                    None
                }
            }
            Self::Text(s) => s.trim().parse::<u32>().ok(),
        }
    }
}

impl fmt::Display for TableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Ordered mapping from column name to column values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceTable {
    name: String,
    columns: IndexMap<String, Vec<TableValue>>,
}

impl ResourceTable {
    pub fn new(name: impl Into<String>, columns: IndexMap<String, Vec<TableValue>>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values of a column, in row order.
    pub fn column(&self, column: &str) -> Result<&[TableValue], RecipeError> {
        self.columns
            .get(column)
            .map(Vec::as_slice)
            .ok_or_else(|| RecipeError::MissingColumn {
                column: column.to_string(),
                table: self.name.clone(),
            })
    }

    /// Parse CSV with a header row. Cells are comma separated and may be
    /// double-quoted, in which case commas are literal and `""` is a quote.
    /// Blank cells are skipped so shorter columns end early.
    pub fn from_csv(name: &str, text: &str) -> Result<Self, RecipeError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines.next().ok_or_else(|| RecipeError::TableLoad {
            name: name.to_string(),
            message: "missing header row".to_string(),
        })?;

        let headers = split_cells(header).map_err(|message| RecipeError::TableLoad {
            name: name.to_string(),
            message: format!("header: {}", message),
        })?;
        let mut columns: IndexMap<String, Vec<TableValue>> = headers
            .iter()
            .map(|h| (h.clone(), Vec::new()))
            .collect();
        if columns.len() != headers.len() {
            return Err(RecipeError::TableLoad {
                name: name.to_string(),
                message: "duplicate column name in header".to_string(),
            });
        }

        for (row, line) in lines.enumerate() {
            let cells = split_cells(line).map_err(|message| RecipeError::TableLoad {
                name: name.to_string(),
                message: format!("row {}: {}", row + 1, message),
            })?;
            if cells.len() > headers.len() {
                return Err(RecipeError::TableLoad {
                    name: name.to_string(),
                    message: format!(
                        "row {} has {} cells, header has {}",
                        row + 1,
                        cells.len(),
                        headers.len()
                    ),
                });
            }
            for (header, cell) in headers.iter().zip(cells.iter()) {
                if cell.is_empty() {
                    continue;
                }
                if let Some(values) = columns.get_mut(header) {
                    values.push(TableValue::from_cell(cell));
                }
            }
        }

        Ok(Self::new(name, columns))
    }

    /// Parse a YAML or JSON mapping of column name to value list.
    pub fn from_yaml(name: &str, text: &str) -> Result<Self, RecipeError> {
        let columns: IndexMap<String, Vec<TableValue>> =
            serde_yaml_ng::from_str(text).map_err(|e| RecipeError::TableLoad {
                name: name.to_string(),
                message: format!("parse error: {}", e),
            })?;
        Ok(Self::new(name, columns))
    }
}

/// Split one CSV line into trimmed cells.
fn split_cells(line: &str) -> Result<Vec<String>, String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            ',' => {
                cells.push(finish_cell(&mut cell, quoted));
                quoted = false;
            }
            '"' if cell.trim().is_empty() && !quoted => {
                cell.clear();
                quoted = true;
                in_quotes = true;
            }
            '"' => return Err(format!("stray quote in cell {}", cells.len() + 1)),
            _ if quoted && c.is_whitespace() => {}
            _ if quoted => {
                return Err(format!(
                    "text after closing quote in cell {}",
                    cells.len() + 1
                ))
            }
            _ => cell.push(c),
        }
    }
    if in_quotes {
        return Err(format!("unterminated quote in cell {}", cells.len() + 1));
    }
    cells.push(finish_cell(&mut cell, quoted));
    Ok(cells)
}

fn finish_cell(cell: &mut String, quoted: bool) -> String {
    let done = std::mem::take(cell);
    if quoted {
        done
    } else {
        done.trim().to_string()
    }
}

/// Source of resource tables, looked up by name.
pub trait TableSource {
    fn get_table(&mut self, name: &str) -> Result<&ResourceTable, RecipeError>;
}

/// Tables held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    tables: HashMap<String, ResourceTable>,
}

impl MemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: ResourceTable) {
        self.tables.insert(table.name.clone(), table);
    }
}

impl TableSource for MemoryTables {
    fn get_table(&mut self, name: &str) -> Result<&ResourceTable, RecipeError> {
        self.tables.get(name).ok_or_else(|| RecipeError::UnknownTable {
            name: name.to_string(),
        })
    }
}

/// Tables read from the files a recipe's `resources` section points at.
/// Relative locations are resolved against `base_dir` (the recipe's directory).
#[derive(Debug, Clone)]
pub struct FileTables {
    locations: HashMap<String, PathBuf>,
    cache: HashMap<String, ResourceTable>,
}

impl FileTables {
    pub fn new(resources: &[ResourceRef], base_dir: &Path) -> Self {
        let locations = resources
            .iter()
            .map(|r| {
                let path = Path::new(&r.location);
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    base_dir.join(path)
                };
                (r.name.clone(), path)
            })
            .collect();
        Self {
            locations,
            cache: HashMap::new(),
        }
    }
}

impl TableSource for FileTables {
    fn get_table(&mut self, name: &str) -> Result<&ResourceTable, RecipeError> {
        if !self.cache.contains_key(name) {
            let path = self
                .locations
                .get(name)
                .ok_or_else(|| RecipeError::UnknownTable {
                    name: name.to_string(),
                })?;
            let table = load_table_file(name, path)?;
            tracing::debug!(table = name, path = %path.display(), "loaded resource table");
            self.cache.insert(name.to_string(), table);
        }
        self.cache.get(name).ok_or_else(|| RecipeError::UnknownTable {
            name: name.to_string(),
        })
    }
}

/// Load a table file, choosing the format by extension.
pub fn load_table_file(name: &str, path: &Path) -> Result<ResourceTable, RecipeError> {
    let content = std::fs::read_to_string(path).map_err(|e| RecipeError::TableLoad {
        name: name.to_string(),
        message: format!("cannot read {}: {}", path.display(), e),
    })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") => ResourceTable::from_csv(name, &content),
        Some("yaml") | Some("yml") | Some("json") => ResourceTable::from_yaml(name, &content),
        _ => Err(RecipeError::TableLoad {
            name: name.to_string(),
            message: format!(
                "unsupported table format {} (expected .csv, .yaml or .json)",
                path.display()
            ),
        }),
    }
}
