use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Engine binary paths are not empty
/// - Job timeout, when set, is not 0
/// - Progress channel capacity is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Engine validation
    if config.engine.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.ffmpeg_path cannot be empty".to_string(),
        ));
    }
    if config.engine.ffprobe_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.ffprobe_path cannot be empty".to_string(),
        ));
    }

    // Gateway validation
    if config.gateway.job_timeout_secs == Some(0) {
        return Err(ConfigError::ValidationError(
            "gateway.job_timeout_secs cannot be 0".to_string(),
        ));
    }
    if config.gateway.progress_channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "gateway.progress_channel_capacity cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, GatewayConfig};
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let config = Config {
            gateway: GatewayConfig::default().with_timeout(0),
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_capacity_fails() {
        let config = Config {
            gateway: GatewayConfig {
                progress_channel_capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_ffmpeg_path_fails() {
        let config = Config {
            engine: EngineConfig::with_paths(PathBuf::new(), PathBuf::from("ffprobe")),
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("ffmpeg_path"));
    }
}
