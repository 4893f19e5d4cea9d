// src/errors/mod.rs
use thiserror::Error;

/// Main error type for ldp-stage operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),

    #[error("Invalid header value: {0}")]
    HeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Malformed page file {path}: {reason}")]
    MalformedPage { path: String, reason: String },

    #[error("Schema inference conflict on field '{field}' in table '{table}': {reason}")]
    SchemaConflict {
        table: String,
        field: String,
        reason: String,
    },

    #[error("Table load failed for '{table}': {reason}")]
    TableLoad { table: String, reason: String },
}

/// Convenience Result type that uses [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("missing url".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing url");
    }

    #[test]
    fn test_table_load_error_display() {
        let err = Error::TableLoad {
            table: "employees".into(),
            reason: "sql failure".into(),
        };
        assert!(err.to_string().contains("employees"));
        assert!(err.to_string().contains("sql failure"));
    }
}
