//! Outbound contract: native JSON text → checked results.
//!
//! Two deliberately different policies live here:
//! - **Metadata** (prove/verify) is load-bearing: it carries the digest and
//!   the proof length the bridge cross-checks against the bytes it holds.
//!   Malformed metadata is reported as an error ([`MetaError`]).
//! - **Listings** (backends/profiles) are advisory: [`parse_listing`] never
//!   fails and degrades to `{}` or `{"raw": …}`.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// How strictly to check a metadata object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaPolicy {
    /// Prove: text must be non-empty, `proof_len` must be present and equal
    /// `expected_len`.
    Strict {
        /// Byte length of the proof buffer the bridge received.
        expected_len: u64,
    },
    /// Verify: `proof_len` is optional. When `input_len` is `Some`, a present
    /// `proof_len` must equal it; when `None` it is not inspected at all.
    Lenient {
        /// Byte length of the proof the caller supplied, if it should be checked.
        input_len: Option<u64>,
    },
}

/// Why a metadata string was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    /// No text at all where metadata is required.
    #[error("Meta response is empty")]
    Empty,
    /// Text is not JSON.
    #[error("Failed to parse JSON: {0}")]
    Json(String),
    /// JSON is not an object.
    #[error("Meta JSON must describe an object")]
    NotAnObject,
    /// `digest` is absent.
    #[error("Meta object missing 'digest'")]
    MissingDigest,
    /// `digest` is not a string.
    #[error("Meta property 'digest' must be a string")]
    DigestNotString,
    /// `proof_len` is required but absent.
    #[error("Meta object missing 'proof_len'")]
    MissingProofLen,
    /// `proof_len` is not a number.
    #[error("Meta property 'proof_len' must be a number")]
    ProofLenNotNumber,
    /// `proof_len` is negative or fractional.
    #[error("Meta property 'proof_len' must be a non-negative integer")]
    ProofLenNotInteger,
    /// `proof_len` disagrees with the bytes actually held.
    #[error("Meta proof_len {actual} does not match expected {expected}")]
    ProofLenMismatch {
        /// Value reported in the metadata.
        actual: u64,
        /// Length of the proof buffer.
        expected: u64,
    },
}

/// Proof metadata that passed its contract check.
///
/// Keeps the whole object so extra fields (`verified`, timings, …) reach the
/// host untouched; serializes as that object.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofMeta {
    digest: String,
    proof_len: Option<u64>,
    fields: Map<String, Value>,
}

impl ProofMeta {
    /// Identifying digest of the proof.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Reported proof length, when present and checked.
    #[must_use]
    pub const fn proof_len(&self) -> Option<u64> {
        self.proof_len
    }

    /// All fields as received.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consume into the JSON object as received.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Serialize for ProofMeta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Check `json` against `policy`.
///
/// Empty text is always [`MetaError::Empty`] here; callers that accept "no
/// metadata" should use [`parse_verify_meta`].
pub fn parse_meta(json: &str, policy: MetaPolicy) -> Result<ProofMeta, MetaError> {
    if json.is_empty() {
        return Err(MetaError::Empty);
    }

    let parsed: Value = serde_json::from_str(json).map_err(|e| MetaError::Json(e.to_string()))?;
    let Value::Object(fields) = parsed else {
        return Err(MetaError::NotAnObject);
    };

    let digest = match fields.get("digest") {
        None => return Err(MetaError::MissingDigest),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(MetaError::DigestNotString),
    };

    let (required, expected) = match policy {
        MetaPolicy::Strict { expected_len } => (true, Some(expected_len)),
        MetaPolicy::Lenient { input_len } => (false, input_len),
    };

    let proof_len = match (fields.get("proof_len"), expected) {
        (None, _) if required => return Err(MetaError::MissingProofLen),
        (None, _) | (Some(_), None) => None,
        (Some(raw), Some(expected)) => {
            let actual = non_negative_integer(raw)?;
            if actual != expected {
                return Err(MetaError::ProofLenMismatch { actual, expected });
            }
            Some(actual)
        }
    };

    Ok(ProofMeta {
        digest,
        proof_len,
        fields,
    })
}

/// Strict metadata check for a freshly produced proof of `proof_len` bytes.
pub fn parse_prove_meta(json: &str, proof_len: u64) -> Result<ProofMeta, MetaError> {
    parse_meta(
        json,
        MetaPolicy::Strict {
            expected_len: proof_len,
        },
    )
}

/// Lenient metadata check after verification.
///
/// Empty text means "no metadata" and yields `Ok(None)`.
pub fn parse_verify_meta(
    json: &str,
    input_len: Option<u64>,
) -> Result<Option<ProofMeta>, MetaError> {
    if json.is_empty() {
        return Ok(None);
    }
    parse_meta(json, MetaPolicy::Lenient { input_len }).map(Some)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn non_negative_integer(value: &Value) -> Result<u64, MetaError> {
    let Value::Number(n) = value else {
        return Err(MetaError::ProofLenNotNumber);
    };
    if let Some(u) = n.as_u64() {
        return Ok(u);
    }
    let f = n.as_f64().ok_or(MetaError::ProofLenNotInteger)?;
    // Negative integers and fractions both land here.
    if !f.is_finite() || f < 0.0 || f.fract() != 0.0 || f >= u64::MAX as f64 {
        return Err(MetaError::ProofLenNotInteger);
    }
    Ok(f as u64)
}

/// Outcome of a best-effort listing parse.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    /// Text parsed as JSON.
    Parsed(Value),
    /// No text (null pointer or empty string).
    Empty,
    /// Text that is not JSON, kept verbatim.
    Raw {
        /// Text as received.
        text: String,
        /// Parser message, for logs.
        reason: String,
    },
}

impl Listing {
    /// Whether a fallback was used.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        !matches!(self, Self::Parsed(_))
    }

    /// The value handed to the host: the parsed JSON, `{}`, or `{"raw": text}`.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Parsed(v) => v,
            Self::Empty => Value::Object(Map::new()),
            Self::Raw { text, .. } => {
                let mut m = Map::new();
                m.insert("raw".to_owned(), Value::String(text));
                Value::Object(m)
            }
        }
    }
}

/// Parse listing JSON without ever failing.
#[must_use]
pub fn parse_listing(text: Option<&str>) -> Listing {
    match text {
        None => Listing::Empty,
        Some(t) if t.trim().is_empty() => Listing::Empty,
        Some(t) => match serde_json::from_str::<Value>(t) {
            Ok(v) => Listing::Parsed(v),
            Err(e) => Listing::Raw {
                text: t.to_owned(),
                reason: e.to_string(),
            },
        },
    }
}
