use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("max_concurrent_downloads must be positive")]
    NonPositiveConcurrency,

    #[error("max_retries must be at least 1")]
    NoAttemptBudget,

    #[error("breaker_threshold must be positive")]
    ZeroBreakerThreshold,

    #[error("request_timeout_secs must be positive")]
    ZeroRequestTimeout,

    #[error("url_column must not be empty")]
    EmptyUrlColumn,

    #[error("pacing range is inverted: min {min}ms > max {max}ms")]
    InvertedPacingRange { min: u64, max: u64 },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_source(config)?;
    validate_download(config)?;
    Ok(())
}

fn validate_source(config: &Config) -> Result<(), ValidationError> {
    if config.source.url_column.trim().is_empty() {
        return Err(ValidationError::EmptyUrlColumn);
    }
    Ok(())
}

fn validate_download(config: &Config) -> Result<(), ValidationError> {
    let download = &config.download;

    if download.max_concurrent_downloads == 0 {
        return Err(ValidationError::NonPositiveConcurrency);
    }
    if download.max_retries == 0 {
        return Err(ValidationError::NoAttemptBudget);
    }
    if download.breaker_threshold == 0 {
        return Err(ValidationError::ZeroBreakerThreshold);
    }
    if download.request_timeout_secs == 0 {
        return Err(ValidationError::ZeroRequestTimeout);
    }
    if download.pacing_min_ms > download.pacing_max_ms {
        return Err(ValidationError::InvertedPacingRange {
            min: download.pacing_min_ms,
            max: download.pacing_max_ms,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_concurrency() {
        let mut config = Config::default();
        config.download.max_concurrent_downloads = 0;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::NonPositiveConcurrency)));
    }

    #[test]
    fn test_zero_retries() {
        let mut config = Config::default();
        config.download.max_retries = 0;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::NoAttemptBudget)));
    }

    #[test]
    fn test_zero_breaker_threshold() {
        let mut config = Config::default();
        config.download.breaker_threshold = 0;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::ZeroBreakerThreshold)));
    }

    #[test]
    fn test_empty_url_column() {
        let mut config = Config::default();
        config.source.url_column = "  ".to_string();

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::EmptyUrlColumn)));
    }

    #[test]
    fn test_inverted_pacing_range() {
        let mut config = Config::default();
        config.download.pacing_min_ms = 500;
        config.download.pacing_max_ms = 100;

        let result = validate(&config);
        assert!(matches!(
            result,
            Err(ValidationError::InvertedPacingRange { min: 500, max: 100 })
        ));
    }
}
