//! Result type alias for QQQ
//!
//! This module provides a convenient Result type alias that uses QqqError
//! as the error type.

use super::errors::QqqError;

/// Result type alias for QQQ operations
///
/// # Examples
///
/// ```
/// use qqq::domain::result::Result;
/// use qqq::domain::errors::QqqError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(QqqError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, QqqError>;
