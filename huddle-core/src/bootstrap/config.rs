//! Configuration loading

use anyhow::Result;

use crate::Config;

/// Load configuration from config.yaml if present, otherwise from
/// environment variables over defaults. Validation failures are fatal.
pub fn load_config() -> Result<Config> {
    let config = if std::path::Path::new("config.yaml").exists() {
        eprintln!("Loading config from config.yaml");
        match Config::from_file("config.yaml") {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load config.yaml: {e}");
                eprintln!("Falling back to environment variables");
                Config::from_env()
            }
        }
    } else {
        Config::from_env()
    };

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}
