//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{FileCacheConfig, LogOutput, LoggingConfig, ModhostConfig, RuntimeSettings};

/// Validates the entire configuration.
pub fn validate_config(config: &ModhostConfig) -> ConfigResult<()> {
    validate_runtime_settings(&config.runtime)?;
    validate_logging_config(&config.logging)?;
    validate_file_cache_config(&config.files)?;
    Ok(())
}

fn validate_runtime_settings(settings: &RuntimeSettings) -> ConfigResult<()> {
    if settings.unload_passes == 0 {
        return Err(ConfigError::validation(
            "runtime.unload_passes must be greater than 0",
        ));
    }

    if settings.priority_passes == 0 {
        return Err(ConfigError::validation(
            "runtime.priority_passes must be greater than 0",
        ));
    }

    if settings.control_queue == 0 {
        return Err(ConfigError::validation(
            "runtime.control_queue must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }

    Ok(())
}

fn validate_file_cache_config(files: &FileCacheConfig) -> ConfigResult<()> {
    if let Some(index) = files.preload.iter().position(|p| p.as_os_str().is_empty()) {
        return Err(ConfigError::validation(format!(
            "files.preload[{index}] is an empty path"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&ModhostConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_bounds_rejected() {
        let mut config = ModhostConfig::default();
        config.runtime.unload_passes = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = ModhostConfig::default();
        config.runtime.priority_passes = 0;
        assert!(validate_config(&config).is_err());

        let mut config = ModhostConfig::default();
        config.runtime.control_queue = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = ModhostConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("modhost.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_preload_path_rejected() {
        let mut config = ModhostConfig::default();
        config.files.preload = vec!["motd.txt".into(), "".into()];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("files.preload[1]"));
    }
}
