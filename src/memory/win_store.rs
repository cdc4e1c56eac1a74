//! 成果日志（Win Store）
//!
//! 追加写入的 CSV 文件：表头 `date,win`，每行一条 `YYYY-MM-DD,<文本>`，UTF-8。
//! 只追加，不改写、不压缩、不删除。文件不存在时首次追加会先建目录并写表头。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::core::NeedleError;

/// 表头列名
pub const HEADER: [&str; 2] = ["date", "win"];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// 一条已接受的成果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinRecord {
    pub date: NaiveDate,
    pub text: String,
}

impl WinRecord {
    pub fn new(date: NaiveDate, text: impl Into<String>) -> Self {
        Self {
            date,
            text: text.into(),
        }
    }
}

/// CSV 文件成果日志
#[derive(Debug)]
pub struct WinStore {
    path: PathBuf,
    /// 追加是临界区：同一时刻只允许一个写者
    write_lock: Mutex<()>,
}

impl WinStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一行并 flush；文件不存在（或为空）时先写表头
    pub fn append(&self, record: &WinRecord) -> Result<(), NeedleError> {
        if record.text.trim().is_empty() {
            return Err(NeedleError::Storage(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "win text must not be empty",
            )));
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            tracing::info!("Initializing win store at {}", self.path.display());
            writer.write_record(HEADER)?;
        }
        writer.write_record([
            record.date.format(DATE_FORMAT).to_string().as_str(),
            record.text.as_str(),
        ])?;

        let mut file = writer
            .into_inner()
            .map_err(|e| NeedleError::Storage(e.into_error()))?;
        file.flush()?;

        tracing::info!("Logged win for {} ({} chars)", record.date, record.text.chars().count());
        Ok(())
    }

    /// 读取全部记录（按写入顺序）；文件不存在返回空，表头与无法解析的行跳过
    pub fn read_all(&self) -> Result<Vec<WinRecord>, NeedleError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut records = Vec::new();
        for (idx, row) in reader.records().enumerate() {
            let row = match row {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Skipping unreadable win store row {}: {}", idx + 1, e);
                    continue;
                }
            };
            if idx == 0 && row.get(0) == Some(HEADER[0]) && row.get(1) == Some(HEADER[1]) {
                continue;
            }
            match parse_row(&row) {
                Some(record) => records.push(record),
                None => tracing::warn!("Skipping malformed win store row {}: {:?}", idx + 1, row),
            }
        }
        Ok(records)
    }

    /// 读取 date ∈ [from, to] 的记录
    pub fn read_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<WinRecord>, NeedleError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.date >= from && r.date <= to)
            .collect())
    }
}

fn parse_row(row: &csv::StringRecord) -> Option<WinRecord> {
    let date = NaiveDate::parse_from_str(row.get(0)?.trim(), DATE_FORMAT).ok()?;
    let text = row.get(1)?;
    if text.trim().is_empty() {
        return None;
    }
    Some(WinRecord::new(date, text))
}
