use crate::error::ServiceError;

/// Validates configuration values before the server starts
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), ServiceError> {
        if url.is_empty() {
            return Err(ServiceError::Configuration(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(ServiceError::Configuration(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates sliding window parameters
    pub fn validate_rate_limit(window_secs: u64, max_requests: usize) -> Result<(), ServiceError> {
        if window_secs == 0 {
            return Err(ServiceError::Configuration(
                "Rate limit window must be greater than 0".to_string(),
            ));
        }

        if max_requests == 0 {
            return Err(ServiceError::Configuration(
                "Rate limit max requests must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_api_prefix(prefix: &str) -> Result<(), ServiceError> {
        if !prefix.starts_with('/') || prefix.len() < 2 {
            return Err(ServiceError::Configuration(format!(
                "Invalid API prefix '{}', expected something like '/api/'",
                prefix
            )));
        }

        Ok(())
    }

    pub fn validate_body_limit(max_body_bytes: usize) -> Result<(), ServiceError> {
        if max_body_bytes == 0 {
            return Err(ServiceError::Configuration(
                "Body limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("redis://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("rediss://localhost:6379").is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("").is_err());
        assert!(ConfigValidator::validate_redis_url("http://localhost:6379").is_err());
    }

    #[test]
    fn test_valid_rate_limit() {
        assert!(ConfigValidator::validate_rate_limit(60, 100).is_ok());
    }

    #[test]
    fn test_invalid_rate_limit() {
        assert!(ConfigValidator::validate_rate_limit(0, 100).is_err());
        assert!(ConfigValidator::validate_rate_limit(60, 0).is_err());
    }

    #[test]
    fn test_api_prefix() {
        assert!(ConfigValidator::validate_api_prefix("/api/").is_ok());
        assert!(ConfigValidator::validate_api_prefix("api/").is_err());
        assert!(ConfigValidator::validate_api_prefix("/").is_err());
    }

    #[test]
    fn test_body_limit() {
        assert!(ConfigValidator::validate_body_limit(1024).is_ok());
        assert!(ConfigValidator::validate_body_limit(0).is_err());
    }
}
