//! Index map: child key → child map file

use crate::error::Result;
use crate::file::DebouncedFile;
use crate::value::{Map, Value, FILE_KEY};

/// Structural index of one tree level.
///
/// The payload always records its own file name under `$file`.
#[derive(Debug, Clone)]
pub struct IndexMap {
    file: DebouncedFile,
}

impl IndexMap {
    pub fn new(file: DebouncedFile) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &DebouncedFile {
        &self.file
    }

    pub fn file_name(&self) -> &str {
        self.file.name()
    }

    /// Child map file registered for `key`
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        if key == FILE_KEY {
            return Ok(None);
        }
        let data = self.file.data()?;
        let entry = data.read().get(key).and_then(Value::as_str).map(str::to_string);
        Ok(entry)
    }

    pub fn set(&self, key: &str, map_file: &str) -> Result<()> {
        let data = self.file.data()?;
        {
            let mut map = data.write();
            if !map.contains_key(FILE_KEY) {
                map.insert(FILE_KEY, self.file.name());
            }
            map.insert(key, map_file);
        }
        self.file.save(false)?;
        Ok(())
    }

    /// Remove `key`; returns whether it was present
    pub fn delete(&self, key: &str) -> Result<bool> {
        if key == FILE_KEY {
            return Ok(false);
        }
        let data = self.file.data()?;
        let removed = data.write().remove(key).is_some();
        if removed {
            self.file.save(false)?;
        }
        Ok(removed)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let data = self.file.data()?;
        let keys = data
            .read()
            .keys()
            .filter(|k| *k != FILE_KEY)
            .map(str::to_string)
            .collect();
        Ok(keys)
    }

    /// Copy of the payload, including `$file`
    pub fn snapshot(&self) -> Result<Map> {
        let data = self.file.data()?;
        let mut map = data.read().clone();
        if !map.contains_key(FILE_KEY) {
            map.insert(FILE_KEY, self.file.name());
        }
        Ok(map)
    }
}
