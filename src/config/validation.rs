//! Configuration validation.
//!
//! Serde covers syntax; this covers value ranges. Every problem is reported,
//! not just the first.

use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if config.rate_limit.limit == 0 {
        errors.push(ValidationError::new("rate_limit.limit", "must be > 0"));
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be > 0"));
    }

    let paging = &config.pagination;
    if paging.max_page_size == 0 {
        errors.push(ValidationError::new("pagination.max_page_size", "must be > 0"));
    }
    if paging.default_page_size == 0 || paging.default_page_size > paging.max_page_size {
        errors.push(ValidationError::new(
            "pagination.default_page_size",
            "must be within 1..=max_page_size",
        ));
    }

    let client = &config.client;
    if url::Url::parse(&client.base_url).is_err() {
        errors.push(ValidationError::new(
            "client.base_url",
            format!("'{}' is not a URL", client.base_url),
        ));
    }
    if client.max_attempts == 0 {
        errors.push(ValidationError::new("client.max_attempts", "must be >= 1"));
    }
    if client.base_delay_ms > client.max_delay_ms {
        errors.push(ValidationError::new(
            "client.base_delay_ms",
            "must not exceed client.max_delay_ms",
        ));
    }
    if client.request_timeout_ms == 0 {
        errors.push(ValidationError::new("client.request_timeout_ms", "must be > 0"));
    }
    if client.operation_timeout_ms == Some(0) {
        errors.push(ValidationError::new("client.operation_timeout_ms", "must be > 0"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.rate_limit.limit = 0;
        config.client.max_attempts = 0;
        config.client.base_delay_ms = 20_000;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "rate_limit.limit",
                "client.max_attempts",
                "client.base_delay_ms",
            ]
        );
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = ServiceConfig::default();
        config.pagination.default_page_size = 500;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "pagination.default_page_size");
    }
}
