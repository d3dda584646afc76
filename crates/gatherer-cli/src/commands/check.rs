use std::path::Path;

use anyhow::Result;
use gatherer_engine::config::validator;
use gatherer_engine::resolve::check_capabilities;
use gatherer_engine::ExtensionRegistry;

/// Execute the `check` command: validate the config and resolve its
/// helper and extensions.
pub fn execute(config_path: &Path, log_level: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path, log_level)?;

    validator::validate_config(&config)?;
    println!("Config structure:  OK");

    let helper = check_capabilities(&config, &ExtensionRegistry::new())?;
    println!("Helper:            {helper}");
    if config.extensions.is_empty() {
        println!("Extensions:        (none)");
    } else {
        println!("Extensions:        {}", config.extensions.join(", "));
    }
    println!("Batch size:        {}", config.batch_update_buffer);
    println!("Fetch concurrency: {}", config.fetch_concurrency);

    if let Some(settings) = config.helper_settings() {
        println!("System dataset:    {}", settings.system_tab_id);
        if let Some(ref env_tab) = settings.env_vars_tab_id {
            println!("Env dataset:       {env_tab}");
        }
        for (name, tab) in &settings.tabs {
            println!(
                "  {:16} {} axis, properties at {}, skip {}x{}",
                format!("{name}:"),
                tab.data_axis,
                tab.property_lookup_row,
                tab.skip_rows,
                tab.skip_columns
            );
        }
    }

    tracing::info!(
        helper = %helper,
        tabs = config.helper_settings().map_or(0, |s| s.tabs.len()),
        "Config checked"
    );
    println!("\nAll checks passed.");
    Ok(())
}
