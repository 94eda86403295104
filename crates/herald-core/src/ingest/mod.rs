//! Ingest - アップロードされたファイルを文字列の表にする
//!
//! # 責務
//! - 拡張子でリーダーを選び、失敗したら次の手段にフォールバック
//! - 電話番号列だけ前後の空白を落とす（正規化はしない）
//!
//! 列の意味づけ（`ColumnMap`）は表を作ったあと、ジョブ組み立て側が行う。

pub mod columns;
pub mod reader;

use std::path::Path;

use serde::Serialize;
use tracing::info;

pub use self::columns::{ColumnMap, ColumnRole, resolve_column};
use self::reader::WorkbookKind;
use crate::domain::errors::IngestError;

/// Extensions the upload surface accepts.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt", "xls", "xlsx", "xlsm", "xlsb", "ods"];

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    name: String,
    bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercased extension, empty when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// File name without its extension; used to label the batch.
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

/// A header row plus data rows, all cells as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Fails with `Empty` when there are no data rows.
    pub fn new(
        file: &str,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self, IngestError> {
        if rows.is_empty() {
            return Err(IngestError::Empty {
                file: file.to_string(),
            });
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell text; missing cells in short rows read as empty.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map_or("", String::as_str)
    }

    pub fn columns(&self) -> ColumnMap {
        ColumnMap::detect(&self.headers)
    }

    /// The first `n` rows, for showing the operator what was read.
    pub fn preview(&self, n: usize) -> &[Vec<String>] {
        &self.rows[..n.min(self.rows.len())]
    }

    fn trim_column(&mut self, column: usize) {
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(column) {
                let trimmed = cell.trim();
                if trimmed.len() != cell.len() {
                    *cell = trimmed.to_string();
                }
            }
        }
    }
}

/// Turns uploads into tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableIngestor;

impl TableIngestor {
    pub fn new() -> Self {
        Self
    }

    pub fn ingest(&self, upload: &Upload) -> Result<Table, IngestError> {
        let file = upload.name();
        let ext = upload.extension();

        let mut table = match WorkbookKind::from_extension(&ext) {
            Some(kind) => reader::read_workbook(file, upload.bytes(), kind)?,
            None => reader::read_delimited(file, upload.bytes())?,
        };

        if let Some(phone) = table.columns().phone {
            table.trim_column(phone);
        }

        info!(
            file,
            rows = table.len(),
            columns = table.headers().len(),
            "ingested upload"
        );
        Ok(table)
    }
}
