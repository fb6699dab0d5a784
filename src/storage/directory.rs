//! Read-only directory storage
//!
//! Exposes the regular files of one directory as a map of file name to
//! file contents. Every mutation fails with NotSupported.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HubError, Result};
use crate::value::Value;

use super::query::{normalize_query_limits, Record, ResultSet};

pub struct DirectoryStorage {
    root: PathBuf,
    max_file_size: u64,
}

impl DirectoryStorage {
    pub fn open(root: impl Into<PathBuf>, max_file_size: u64) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(HubError::NotFound(format!("directory {}", root.display())));
        }
        Ok(Self {
            root,
            max_file_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_count(&self) -> Result<usize> {
        Ok(self.file_names()?.len())
    }

    /// Contents of the file named by `key`
    pub fn get(&self, key: &Value) -> Result<Record> {
        let name = key.as_str().ok_or(HubError::WrongKeyType)?;
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(HubError::InvalidArgument(format!("invalid file name '{}'", name)));
        }

        let path = self.root.join(name);
        if !path.is_file() {
            return Err(HubError::KeyNotFound);
        }
        Ok(Record::new(key.clone(), self.read_file(&path)?, Value::None))
    }

    pub fn query(&self, start: i64, end: i64) -> Result<ResultSet> {
        let names = self.file_names()?;
        let (start, end) = normalize_query_limits(start, end, names.len());
        let mut records = Vec::with_capacity(end - start);
        for name in &names[start..end] {
            let value = self.read_file(&self.root.join(name))?;
            records.push(Record::new(Value::from(name.as_str()), value, Value::None));
        }
        Ok(ResultSet::new(records))
    }

    pub fn mutate<T>(&self) -> Result<T> {
        Err(HubError::NotSupported("directory containers are read-only"))
    }

    fn read_file(&self, path: &Path) -> Result<Value> {
        let size = fs::metadata(path)?.len();
        if size > self.max_file_size {
            return Err(HubError::InvalidArgument(format!(
                "{} is {} bytes, limit is {}",
                path.display(),
                size,
                self.max_file_size
            )));
        }
        Ok(Value::String(fs::read(path)?))
    }

    /// Regular file names, sorted
    fn file_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
