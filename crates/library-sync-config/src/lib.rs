pub mod config;
pub mod paths;

pub use config::{ChapterConfig, Config, LibraryConfig, SchedulerConfig, SyncConfig, default_scheduler_config};
pub use paths::{PathManager, container_base_path};
