//! Node map: child key → literal value or node link

use crate::error::Result;
use crate::file::DebouncedFile;
use crate::value::{Map, Value};

/// Flat data of one tree level
#[derive(Debug, Clone)]
pub struct NodeMap {
    file: DebouncedFile,
}

impl NodeMap {
    pub fn new(file: DebouncedFile) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &DebouncedFile {
        &self.file
    }

    pub fn file_name(&self) -> &str {
        self.file.name()
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let data = self.file.data()?;
        let value = data.read().get(key).cloned();
        Ok(value)
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let data = self.file.data()?;
        data.write().insert(key, value);
        self.file.save(false)?;
        Ok(())
    }

    /// Remove `key`; returns whether it was present
    pub fn delete(&self, key: &str) -> Result<bool> {
        let data = self.file.data()?;
        let removed = data.write().remove(key).is_some();
        if removed {
            self.file.save(false)?;
        }
        Ok(removed)
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        let data = self.file.data()?;
        let present = data.read().contains_key(key);
        Ok(present)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let data = self.file.data()?;
        let keys = data.read().keys().map(str::to_string).collect();
        Ok(keys)
    }

    pub fn snapshot(&self) -> Result<Map> {
        let data = self.file.data()?;
        let map = data.read().clone();
        Ok(map)
    }
}
