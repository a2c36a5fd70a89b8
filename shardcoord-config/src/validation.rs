//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate a URL and restrict it to the given schemes
pub fn validate_url(url: &str, schemes: &[&str], field_name: &str, domain: &str) -> ConfigResult<()> {
    validate_required_string(url, field_name, domain)?;

    let parsed = url::Url::parse(url).map_err(|e| ConfigError::DomainError {
        domain: domain.to_string(),
        message: format!("{} has invalid URL format: {}", field_name, e),
    })?;

    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!(
                "{} scheme '{}' not supported (expected one of: {})",
                field_name,
                parsed.scheme(),
                schemes.join(", ")
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_string() {
        assert!(validate_required_string("redis", "url", "store").is_ok());
        assert!(validate_required_string("", "url", "store").is_err());
        assert!(validate_required_string("   ", "url", "store").is_err());
    }

    #[test]
    fn test_positive() {
        assert!(validate_positive(1u32, "total_shards", "coordinator").is_ok());
        let err = validate_positive(0u32, "total_shards", "coordinator").unwrap_err();
        assert!(err.to_string().contains("total_shards must be greater than 0"));
    }

    #[test]
    fn test_url_scheme() {
        let schemes = ["redis", "rediss"];
        assert!(validate_url("redis://127.0.0.1:6379", &schemes, "url", "store").is_ok());
        assert!(validate_url("rediss://cache.internal:6380/2", &schemes, "url", "store").is_ok());
        assert!(validate_url("http://127.0.0.1", &schemes, "url", "store").is_err());
        assert!(validate_url("not a url", &schemes, "url", "store").is_err());
    }
}
