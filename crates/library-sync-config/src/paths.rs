use anyhow::Result;
use std::path::{Path, PathBuf};

/// Get the container base path from environment variable, defaulting to "/app"
pub fn container_base_path() -> PathBuf {
    std::env::var("FEEDQUEUE_BASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/app"))
}

pub struct PathManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_dir: PathBuf,
}

impl PathManager {
    pub fn new() -> Result<Self> {
        let base_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("feedqueue");

        Ok(Self::with_base(base_dir))
    }

    pub fn from_docker_env() -> Self {
        Self::with_base(container_base_path())
    }

    /// Config at the base, data and logs in subdirectories
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            config_dir: base.clone(),
            data_dir: base.join("data"),
            log_dir: base.join("logs"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Raw feed results of the last successful fetch per source
    pub fn cache_feeds_dir(&self) -> PathBuf {
        self.cache_dir().join("feeds")
    }

    /// Candidate item snapshots read by the snapshot feed client
    pub fn feeds_dir(&self) -> PathBuf {
        self.data_dir.join("feeds")
    }

    /// External segment snapshots read by the snapshot segment provider
    pub fn segments_dir(&self) -> PathBuf {
        self.data_dir.join("segments")
    }

    pub fn library_file(&self) -> PathBuf {
        self.data_dir.join("library.bin")
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn daemon_log_file(&self) -> PathBuf {
        self.log_dir.join("feedqueue.log")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::create_dir_all(self.cache_feeds_dir())?;
        std::fs::create_dir_all(self.feeds_dir())?;
        std::fs::create_dir_all(self.segments_dir())?;
        Ok(())
    }
}

impl Default for PathManager {
    fn default() -> Self {
        // The container base directory only exists inside the image
        let base = container_base_path();
        if base.exists() {
            return Self::from_docker_env();
        }

        Self::new().unwrap_or_else(|_| Self::from_docker_env())
    }
}
