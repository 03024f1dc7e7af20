use crate::commands::load_config;
use crate::output::{self, Output};
use crate::ConfigCommands;
use color_eyre::Result;
use library_sync_config::{Config, PathManager};
use serde_json::json;

pub fn run_config(path_manager: &PathManager, cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show_config(path_manager, output),
        ConfigCommands::Init { force } => init_config(path_manager, force, output),
    }
}

fn show_config(path_manager: &PathManager, output: &Output) -> Result<()> {
    let config_file = path_manager.config_file();
    let config = load_config(path_manager)?;

    output.json(&json!({
        "type": "config",
        "file": config_file.display().to_string(),
        "exists": config_file.exists(),
        "config": config,
    }));

    if !config_file.exists() {
        output.warn(format!("Configuration file not found at: {}; showing defaults", config_file.display()));
        output.info("Run 'feedqueue config init' to write one.");
    }

    let scheduler = config.scheduler_or_default();
    let skip: Vec<String> = config.chapters.skip_categories.iter().map(|c| format!("{:?}", c)).collect();

    let mut table = output::table(["Setting", "Value"]);
    table.add_row(vec!["Config file".to_string(), config_file.display().to_string()]);
    table.add_row(vec!["Library file".to_string(), path_manager.library_file().display().to_string()]);
    table.add_row(vec!["Feed snapshots".to_string(), path_manager.feeds_dir().display().to_string()]);
    table.add_row(vec!["Segment snapshots".to_string(), path_manager.segments_dir().display().to_string()]);
    table.add_row(vec!["library.triage_limit".to_string(), config.library.triage_limit.to_string()]);
    table.add_row(vec!["library.default_placement".to_string(), format!("{:?}", config.library.default_placement)]);
    table.add_row(vec!["library.hide_shorts".to_string(), config.library.hide_shorts.to_string()]);
    table.add_row(vec![
        "library.short_max_duration_seconds".to_string(),
        config.library.short_max_duration_seconds.to_string(),
    ]);
    table.add_row(vec!["sync.max_concurrent_fetches".to_string(), config.sync.max_concurrent_fetches.to_string()]);
    table.add_row(vec!["sync.use_feed_cache".to_string(), config.sync.use_feed_cache.to_string()]);
    table.add_row(vec!["chapters.tolerance_seconds".to_string(), config.chapters.tolerance_seconds.to_string()]);
    table.add_row(vec!["chapters.skip_categories".to_string(), skip.join(", ")]);
    table.add_row(vec!["scheduler.schedule".to_string(), scheduler.schedule]);
    table.add_row(vec!["scheduler.run_on_startup".to_string(), scheduler.run_on_startup.to_string()]);
    output.table(&table);
    Ok(())
}

fn init_config(path_manager: &PathManager, force: bool, output: &Output) -> Result<()> {
    let config_file = path_manager.config_file();
    if config_file.exists() && !force {
        output.warn(format!("Configuration already exists at {} (use --force to overwrite)", config_file.display()));
        return Ok(());
    }

    path_manager
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create directories: {}", e))?;

    let config = Config {
        scheduler: Some(library_sync_config::default_scheduler_config()),
        ..Config::default()
    };
    config
        .save_to_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to write config to {}: {}", config_file.display(), e))?;

    output.success(format!("Wrote default configuration to {}", config_file.display()));
    output.info(format!("Drop feed snapshots into {}", path_manager.feeds_dir().display()));
    Ok(())
}
