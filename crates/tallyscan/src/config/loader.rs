use std::path::Path;

use secrecy::SecretString;

use crate::config::schema::{AiConfig, Config};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Reads the AI API key from the environment variable named in the config.
pub fn resolve_api_key(ai: &AiConfig) -> Result<SecretString, ConfigError> {
    match std::env::var(&ai.api_key_env) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretString::from(value)),
        _ => Err(ConfigError::MissingSecret {
            name: ai.api_key_env.clone(),
        }),
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.queue_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "queue_capacity must be at least 1".to_string(),
        });
    }

    if config.ocr.language != "eng" {
        return Err(ConfigError::Validation {
            message: format!(
                "Unsupported OCR language '{}': only 'eng' is supported",
                config.ocr.language
            ),
        });
    }

    if config.ocr.min_file_bytes >= config.ocr.max_file_bytes {
        return Err(ConfigError::Validation {
            message: format!(
                "ocr.min_file_bytes ({}) must be below ocr.max_file_bytes ({})",
                config.ocr.min_file_bytes, config.ocr.max_file_bytes
            ),
        });
    }

    if config.ocr.timeout_secs == 0 || config.ai.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "timeouts must be at least one second".to_string(),
        });
    }

    let threshold = config.materializer.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::Validation {
            message: format!(
                "materializer.confidence_threshold must be within [0, 1], got {}",
                threshold
            ),
        });
    }

    if reqwest::Url::parse(&config.ai.endpoint).is_err() {
        return Err(ConfigError::Validation {
            message: format!("ai.endpoint is not a valid URL: {}", config.ai.endpoint),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.version, "1.0");
        assert!(config.worker_count >= 1);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.orphan_after_secs, 900);
        assert_eq!(config.ocr.language, "eng");
        assert_eq!(config.ocr.timeout_secs, 60);
        assert_eq!(config.ocr.min_file_bytes, 100);
        assert_eq!(config.ocr.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.pdf.min_direct_text_chars, 50);
        assert_eq!(config.pdf.render_dpi, 300);
        assert_eq!(config.ai.api_key_env, "TALLYSCAN_AI_API_KEY");
        assert!((config.materializer.confidence_threshold - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database_path": "/var/lib/tallyscan/jobs.db",
            "worker_count": 3,
            "queue_capacity": 10,
            "orphan_after_secs": 120,
            "ocr": { "language": "eng", "timeout_secs": 30 },
            "pdf": { "render_dpi": 200, "pdftoppm_path": "/usr/bin/pdftoppm" },
            "ai": { "endpoint": "http://localhost:8080/v1/chat/completions", "model": "local" },
            "materializer": { "confidence_threshold": 0.8 }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(
            config.database_path.as_deref(),
            Some("/var/lib/tallyscan/jobs.db")
        );
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.orphan_after_secs, 120);
        assert_eq!(config.ocr.timeout_secs, 30);
        assert_eq!(config.pdf.render_dpi, 200);
        assert_eq!(config.ai.model, "local");
        assert!((config.materializer.confidence_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_version_fails_schema() {
        let result = load_config_from_str(r#"{ "worker_count": 2 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_non_english_ocr_rejected() {
        let result = load_config_from_str(r#"{ "version": "1.0", "ocr": { "language": "deu" } }"#);
        match result {
            Err(ConfigError::Validation { message }) => assert!(message.contains("deu")),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "materializer": { "confidence_threshold": 1.5 } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = load_config_from_str(r#"{ "version": "1.0", "worker_count": 0 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/tallyscan.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    #[serial]
    fn test_resolve_api_key_from_env() {
        let ai = AiConfig {
            api_key_env: "TALLYSCAN_TEST_KEY".to_string(),
            ..AiConfig::default()
        };
        std::env::set_var("TALLYSCAN_TEST_KEY", "sk-test");
        let key = resolve_api_key(&ai).unwrap();
        assert_eq!(key.expose_secret(), "sk-test");
        std::env::remove_var("TALLYSCAN_TEST_KEY");
    }

    #[test]
    #[serial]
    fn test_resolve_api_key_missing() {
        let ai = AiConfig {
            api_key_env: "TALLYSCAN_TEST_KEY_MISSING".to_string(),
            ..AiConfig::default()
        };
        std::env::remove_var("TALLYSCAN_TEST_KEY_MISSING");
        match resolve_api_key(&ai) {
            Err(ConfigError::MissingSecret { name }) => {
                assert_eq!(name, "TALLYSCAN_TEST_KEY_MISSING")
            }
            other => panic!("Expected MissingSecret, got {:?}", other.map(|_| ())),
        }
    }
}
