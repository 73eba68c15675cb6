//! Native status codes and the structured error surfaced to callers.
//!
//! The native library reports every outcome as an `int32_t` status. This
//! module maps those codes onto a fixed table of default messages and builds
//! the single [`ErrorValue`] an operation rejects with.
//!
//! ## Contracts
//! - Mapping is total: any code outside the table maps to the
//!   [`ErrorCode::Internal`] message, but the [`ErrorValue`] keeps the raw code.
//! - Nothing here panics; it is plain data transformation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status codes defined by the native ABI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Success.
    Ok = 0,
    /// Malformed caller input.
    InvalidArg = 1,
    /// The selected backend failed or is unknown.
    Backend = 2,
    /// The selected profile failed or is unknown.
    Profile = 3,
    /// Proof bytes could not be decoded.
    ProofCorrupt = 4,
    /// The proof is well formed but does not verify.
    VerifyFail = 5,
    /// Anything else, including codes this table does not know.
    Internal = 6,
}

impl ErrorCode {
    /// Raw ABI value.
    #[inline]
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Recognize a raw status. Unknown values collapse to [`ErrorCode::Internal`].
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::InvalidArg,
            2 => Self::Backend,
            3 => Self::Profile,
            4 => Self::ProofCorrupt,
            5 => Self::VerifyFail,
            _ => Self::Internal,
        }
    }

    /// Default human-readable message for this code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidArg => "Invalid argument",
            Self::Backend => "Backend error",
            Self::Profile => "Profile error",
            Self::ProofCorrupt => "Proof corrupt",
            Self::VerifyFail => "Verification failed",
            Self::Internal => "Internal error",
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// `ZKP_OK`.
pub const ZKP_OK: i32 = ErrorCode::Ok.code();
/// `ZKP_ERR_INVALID_ARG`.
pub const ZKP_ERR_INVALID_ARG: i32 = ErrorCode::InvalidArg.code();
/// `ZKP_ERR_BACKEND`.
pub const ZKP_ERR_BACKEND: i32 = ErrorCode::Backend.code();
/// `ZKP_ERR_PROFILE`.
pub const ZKP_ERR_PROFILE: i32 = ErrorCode::Profile.code();
/// `ZKP_ERR_PROOF_CORRUPT`.
pub const ZKP_ERR_PROOF_CORRUPT: i32 = ErrorCode::ProofCorrupt.code();
/// `ZKP_ERR_VERIFY_FAIL`.
pub const ZKP_ERR_VERIFY_FAIL: i32 = ErrorCode::VerifyFail.code();
/// `ZKP_ERR_INTERNAL`.
pub const ZKP_ERR_INTERNAL: i32 = ErrorCode::Internal.code();

/// Default message for a raw status code.
#[inline]
#[must_use]
pub const fn default_message(code: i32) -> &'static str {
    ErrorCode::from_code(code).message()
}

/// The one error an operation reports.
///
/// Created at the first point of failure and never edited afterwards; there
/// are no setters. Serializes as `{"code", "msg", "detail"?}`, the shape host
/// bindings hand to JavaScript.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} (code {code}){}", detail_suffix(.detail))]
pub struct ErrorValue {
    code: i32,
    #[serde(rename = "msg")]
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ErrorValue {
    /// Build the final error for `code`.
    ///
    /// A missing or empty `message` falls back to the default for `code`; an
    /// empty `detail` is dropped.
    #[must_use]
    pub fn new(code: i32, message: Option<String>, detail: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_message(code).to_owned());
        Self {
            code,
            message,
            detail: detail.filter(|d| !d.is_empty()),
        }
    }

    /// Error for a native status with the default message.
    #[must_use]
    pub fn native(code: i32, detail: impl Into<String>) -> Self {
        Self::new(code, None, Some(detail.into()))
    }

    /// Caller input was rejected before any native call.
    #[must_use]
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::native(ZKP_ERR_INVALID_ARG, detail)
    }

    /// The native call succeeded but its output broke the contract.
    #[must_use]
    pub fn contract(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(ZKP_ERR_INTERNAL, Some(message.into()), Some(detail.into()))
    }

    /// Raw status code (may lie outside [`ErrorCode`]).
    #[inline]
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// Recognized category of [`Self::code`].
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }

    /// Short message.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Free-form diagnostic detail, if any.
    #[inline]
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_covers_every_code() {
        let expected = [
            (0, "ok"),
            (1, "Invalid argument"),
            (2, "Backend error"),
            (3, "Profile error"),
            (4, "Proof corrupt"),
            (5, "Verification failed"),
            (6, "Internal error"),
        ];
        for (code, msg) in expected {
            assert_eq!(default_message(code), msg);
            assert_eq!(ErrorCode::from_code(code).code(), code);
        }
    }

    #[test]
    fn unknown_codes_use_internal_message_but_keep_code() {
        for code in [-1, 7, 42, i32::MAX, i32::MIN] {
            let err = ErrorValue::native(code, "zkp_prove failed");
            assert_eq!(err.code(), code);
            assert_eq!(err.kind(), ErrorCode::Internal);
            assert_eq!(err.message(), "Internal error");
        }
    }

    #[test]
    fn override_message_and_empty_detail() {
        let err = ErrorValue::new(2, Some("custom".into()), Some(String::new()));
        assert_eq!(err.message(), "custom");
        assert_eq!(err.detail(), None);

        let err = ErrorValue::new(3, Some(String::new()), None);
        assert_eq!(err.message(), "Profile error");
    }

    #[test]
    fn serializes_with_host_field_names() {
        let err = ErrorValue::invalid_argument("Missing required property 'backendId'");
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(
            v,
            json!({"code": 1, "msg": "Invalid argument", "detail": "Missing required property 'backendId'"})
        );

        let bare = serde_json::to_value(ErrorValue::new(6, None, None)).unwrap();
        assert!(bare.get("detail").is_none());
    }

    #[test]
    fn display_includes_detail() {
        let err = ErrorValue::contract("Invalid meta returned from zkp_prove", "Meta response is empty");
        assert_eq!(
            err.to_string(),
            "Invalid meta returned from zkp_prove (code 6): Meta response is empty"
        );
        assert_eq!(ErrorValue::new(4, None, None).to_string(), "Proof corrupt (code 4)");
    }
}
