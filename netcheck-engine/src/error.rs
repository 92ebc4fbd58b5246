//! 统一错误类型定义

use serde::Serialize;
use thiserror::Error;

/// Errors that abort a whole diagnostic request.
///
/// Failures of individual sub-checks never surface here; they are recorded in
/// the `error` field of the corresponding result.
#[derive(Error, Debug, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum EngineError {
    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl EngineError {
    /// Whether the error was caused by the caller's input rather than the engine.
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::ValidationError(_))
    }
}

/// Engine Result 类型别名
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_serializes_with_code_and_details() {
        let err = EngineError::ValidationError("Host is required".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "ValidationError");
        assert_eq!(json["details"], "Host is required");
    }

    #[test]
    fn test_engine_error_is_expected() {
        assert!(EngineError::ValidationError(String::new()).is_expected());
        assert!(!EngineError::ConfigError(String::new()).is_expected());
        assert!(!EngineError::InternalError(String::new()).is_expected());
    }
}
