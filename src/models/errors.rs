//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so adapter failures can be
//! grouped in logs and in the trace's failure ledger.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - TRACE_xxx: request validation and traversal errors
//! - RPC_xxx: transport errors raised by chain adapters
//! - ADAPTER_xxx: adapter-level data errors
//! - CFG_xxx: configuration errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// Taxonomy bucket of this error
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Failure taxonomy seen by trace callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before traversal starts
    InputValidation,
    /// One adapter call failed; recovered locally
    Adapter,
    /// Misconfiguration detected at startup
    Config,
    /// Invariant violated or unrecoverable state
    Internal,
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // ============================================
    // Input Validation Errors (1xx)
    // ============================================
    /// Source address malformed for its chain
    InvalidAddress,
    /// Contradictory or out-of-range request parameter
    InvalidParameter,

    // ============================================
    // RPC / Adapter Errors (2xx)
    // ============================================
    /// RPC connection failed
    RpcConnectionFailed,
    /// RPC request timeout
    RpcTimeout,
    /// RPC rate limited (HTTP 429)
    RpcRateLimited,
    /// RPC returned error response
    RpcError,
    /// Invalid RPC response
    RpcInvalidResponse,
    /// Upstream returned data that cannot be normalized
    AdapterMalformedData,
    /// No adapter registered for the chain
    AdapterUnavailable,
    /// Adapter call exceeded the per-call deadline
    AdapterTimeout,

    // ============================================
    // Configuration Errors (3xx)
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,
    /// Unsupported chain name
    ConfigUnsupportedChain,
    /// Missing API key
    ConfigMissingApiKey,

    // ============================================
    // Internal Errors (9xx)
    // ============================================
    /// Taint accounting invariant violated
    InvariantViolation,
    /// Trace aborted by caller or timeout
    Cancelled,
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAddress => "TRACE_INVALID_ADDRESS",
            Self::InvalidParameter => "TRACE_INVALID_PARAMETER",

            Self::RpcConnectionFailed => "RPC_CONNECTION_FAILED",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::RpcRateLimited => "RPC_RATE_LIMITED",
            Self::RpcError => "RPC_ERROR",
            Self::RpcInvalidResponse => "RPC_INVALID_RESPONSE",
            Self::AdapterMalformedData => "ADAPTER_MALFORMED_DATA",
            Self::AdapterUnavailable => "ADAPTER_UNAVAILABLE",
            Self::AdapterTimeout => "ADAPTER_TIMEOUT",

            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::ConfigUnsupportedChain => "CFG_UNSUPPORTED_CHAIN",
            Self::ConfigMissingApiKey => "CFG_MISSING_API_KEY",

            Self::InvariantViolation => "TRACE_INVARIANT_VIOLATION",
            Self::Cancelled => "TRACE_CANCELLED",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Map the code onto the caller-facing taxonomy
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidAddress | Self::InvalidParameter => ErrorCategory::InputValidation,
            Self::RpcConnectionFailed
            | Self::RpcTimeout
            | Self::RpcRateLimited
            | Self::RpcError
            | Self::RpcInvalidResponse
            | Self::AdapterMalformedData
            | Self::AdapterUnavailable
            | Self::AdapterTimeout => ErrorCategory::Adapter,
            Self::ConfigMissingEnv
            | Self::ConfigInvalidValue
            | Self::ConfigUnsupportedChain
            | Self::ConfigMissingApiKey => ErrorCategory::Config,
            Self::InvariantViolation | Self::Cancelled | Self::Unknown => ErrorCategory::Internal,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RpcTimeout | Self::RpcRateLimited | Self::RpcConnectionFailed | Self::AdapterTimeout
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// Invalid source or counterpart address
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    /// Invalid request parameter
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameter, msg)
    }

    /// RPC timeout
    pub fn rpc_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcTimeout, msg)
    }

    /// Upstream data could not be normalized
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::AdapterMalformedData, msg)
    }

    /// No adapter for chain
    pub fn adapter_unavailable(chain: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::AdapterUnavailable,
            format!("No adapter registered for chain {}", chain),
        )
    }

    /// Adapter call deadline exceeded
    pub fn adapter_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::AdapterTimeout, msg)
    }

    /// Unsupported chain
    pub fn unsupported_chain(name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigUnsupportedChain,
            format!("Unsupported chain: {}", name),
        )
    }

    /// Invalid configuration value
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalidValue, msg)
    }

    /// Missing API key
    pub fn missing_api_key(key_name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingApiKey,
            format!("Missing API key: {}", key_name),
        )
    }

    /// Taint accounting invariant violated
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvariantViolation, msg)
    }

    /// Trace aborted
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "cancelled")
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        let text = err.to_string();
        // Transport errors arrive as eyre reports; recover the code from the message
        let code = if text.contains("429") || text.to_lowercase().contains("rate limit") {
            ErrorCode::RpcRateLimited
        } else if text.to_lowercase().contains("timed out") || text.contains("timeout") {
            ErrorCode::RpcTimeout
        } else if text.contains("RPC error") {
            ErrorCode::RpcError
        } else if text.contains("Failed to parse") || text.contains("deserialize") {
            ErrorCode::RpcInvalidResponse
        } else if text.contains("Request failed") || text.contains("endpoints failed") {
            ErrorCode::RpcConnectionFailed
        } else {
            ErrorCode::Unknown
        };
        Self::new(code, text)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "IO error", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::RpcTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::RpcConnectionFailed, "Connection failed")
        } else {
            Self::new(ErrorCode::Unknown, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::RpcInvalidResponse, "JSON parse error", err)
    }
}
