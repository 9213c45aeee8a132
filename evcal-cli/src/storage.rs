use std::{fmt::Write, path::PathBuf};

use async_trait::async_trait;

use evcal_core::{Error, Result, storage::StorageBackend};

/// 每个键一个文件的本地存储
#[derive(Debug, Clone)]
pub struct FileStorage {
    data_dir: PathBuf,
}

impl FileStorage {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).map_err(|e| {
                Error::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(Self { data_dir })
    }

    pub fn with_default_dir(app_name: &str) -> Result<Self> {
        let data_dir = Self::get_default_data_dir(app_name)?;
        Self::new(data_dir)
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    fn get_default_data_dir(app_name: &str) -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(home) = std::env::var_os("HOME") {
                Ok(PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join(app_name))
            } else {
                Err(Error::Config(
                    "Cannot determine data directory".to_string(),
                ))
            }
        }

        #[cfg(target_os = "linux")]
        {
            if let Some(data_dir) = std::env::var_os("XDG_DATA_HOME") {
                Ok(PathBuf::from(data_dir).join(app_name))
            } else if let Some(home) = std::env::var_os("HOME") {
                Ok(PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join(app_name))
            } else {
                Err(Error::Config(
                    "Cannot determine data directory".to_string(),
                ))
            }
        }

        #[cfg(target_os = "windows")]
        {
            if let Some(app_data) = std::env::var_os("APPDATA") {
                Ok(PathBuf::from(app_data).join(app_name))
            } else {
                Err(Error::Config(
                    "Cannot determine data directory".to_string(),
                ))
            }
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            Err(Error::Config(
                "Unsupported operating system for data directory detection".to_string(),
            ))
        }
    }

    fn data_file_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", encode_key(key)))
    }
}

/// 字母、数字、`-`、`_` 保持原样，其余字节按 `%XX` 编码
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => encoded.push(byte as char),
            _ => {
                let _ = write!(encoded, "%{:02X}", byte);
            }
        }
    }
    encoded
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn set_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        let file_path = self.data_file_path(key);
        // 先写临时文件再重命名，避免写到一半的记录
        let tmp_path = file_path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, value)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write data file: {}", e)))?;
        tokio::fs::rename(&tmp_path, &file_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to replace data file: {}", e)))?;
        Ok(())
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let file_path = self.data_file_path(key);

        if !file_path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read(file_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read data file: {}", e)))?;
        Ok(Some(content))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let file_path = self.data_file_path(key);
        if file_path.exists() {
            tokio::fs::remove_file(file_path)
                .await
                .map_err(|e| Error::Storage(format!("Failed to delete data file: {}", e)))?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data_file_path(key).exists())
    }
}
