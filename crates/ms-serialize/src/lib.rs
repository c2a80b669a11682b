#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hasher;

use asupersync::util::DetHasher;
use ms_core::{MatrixSpaceError, Ring};
use ms_space::MatrixSpace;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SPACE_SCHEMA_VERSION: u32 = 1;
const MAX_SPACE_PAYLOAD_BYTES: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Strict,
    Hardened,
}

/// Persisted form of a matrix space: exactly `(ring, rows, cols, sparse)`
/// plus a version and checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpaceEnvelope {
    pub schema_version: u32,
    pub ring: Ring,
    pub rows: usize,
    pub cols: usize,
    pub sparse: bool,
    pub source_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SerializeError {
    InvalidJson { diagnostic: String },
    UnknownField { field: String },
    VersionMismatch { expected: u32, found: u32 },
    ChecksumMismatch { expected: String, found: String },
    IncompatiblePayload { reason: String },
    Space(MatrixSpaceError),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson { diagnostic } => write!(f, "invalid json: {diagnostic}"),
            Self::UnknownField { field } => write!(f, "unknown field '{field}'"),
            Self::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "schema version mismatch: expected={expected} found={found}"
                )
            }
            Self::ChecksumMismatch { expected, found } => {
                write!(f, "checksum mismatch: expected={expected} found={found}")
            }
            Self::IncompatiblePayload { reason } => write!(f, "incompatible payload: {reason}"),
            Self::Space(error) => write!(f, "space reconstruction failed: {error}"),
        }
    }
}

impl std::error::Error for SerializeError {}

impl From<MatrixSpaceError> for SerializeError {
    fn from(value: MatrixSpaceError) -> Self {
        Self::Space(value)
    }
}

#[must_use]
pub fn envelope_for(space: &MatrixSpace) -> SpaceEnvelope {
    let (ring, rows, cols, sparse) = space.to_parts();
    let source_hash = space_hash(SPACE_SCHEMA_VERSION, &ring, rows, cols, sparse);
    SpaceEnvelope {
        schema_version: SPACE_SCHEMA_VERSION,
        ring,
        rows,
        cols,
        sparse,
        source_hash,
    }
}

pub fn encode_space(space: &MatrixSpace) -> Result<String, SerializeError> {
    serde_json::to_string(&envelope_for(space)).map_err(|error| {
        SerializeError::IncompatiblePayload {
            reason: format!("space encoding failed: {error}"),
        }
    })
}

pub fn decode_envelope(input: &str, mode: DecodeMode) -> Result<SpaceEnvelope, SerializeError> {
    validate_payload_size(input)?;
    match mode {
        DecodeMode::Strict => decode_envelope_strict(input),
        DecodeMode::Hardened => decode_envelope_hardened(input),
    }
}

/// Decodes and re-registers a space. The result equals the encoded space
/// and is the same object if that space is still alive.
pub fn decode_space(input: &str, mode: DecodeMode) -> Result<MatrixSpace, SerializeError> {
    let envelope = decode_envelope(input, mode)?;
    Ok(MatrixSpace::from_parts(
        envelope.ring,
        envelope.rows,
        envelope.cols,
        envelope.sparse,
    )?)
}

fn decode_envelope_strict(input: &str) -> Result<SpaceEnvelope, SerializeError> {
    let envelope: SpaceEnvelope = serde_json::from_str(input).map_err(|error| {
        if let Some(field) = extract_unknown_field(error.to_string().as_str()) {
            SerializeError::UnknownField { field }
        } else {
            SerializeError::InvalidJson {
                diagnostic: bounded(error.to_string().as_str(), 200),
            }
        }
    })?;
    validate_envelope(&envelope)?;
    Ok(envelope)
}

fn decode_envelope_hardened(input: &str) -> Result<SpaceEnvelope, SerializeError> {
    let raw: Value = serde_json::from_str(input).map_err(|error| SerializeError::InvalidJson {
        diagnostic: bounded(
            format!(
                "{error}; payload_prefix={} ",
                bounded(input.replace('\n', " ").as_str(), 96)
            )
            .as_str(),
            220,
        ),
    })?;

    let obj = raw
        .as_object()
        .ok_or_else(|| SerializeError::IncompatiblePayload {
            reason: "top-level space payload must be a JSON object".to_string(),
        })?;

    let allowed: BTreeSet<&str> = BTreeSet::from([
        "schema_version",
        "ring",
        "rows",
        "cols",
        "sparse",
        "source_hash",
    ]);
    for key in obj.keys() {
        if !allowed.contains(key.as_str()) {
            return Err(SerializeError::UnknownField { field: key.clone() });
        }
    }

    let envelope: SpaceEnvelope =
        serde_json::from_value(raw).map_err(|error| SerializeError::IncompatiblePayload {
            reason: bounded(error.to_string().as_str(), 200),
        })?;

    validate_envelope(&envelope)?;
    Ok(envelope)
}

fn validate_payload_size(input: &str) -> Result<(), SerializeError> {
    let actual = input.len();
    if actual > MAX_SPACE_PAYLOAD_BYTES {
        return Err(SerializeError::IncompatiblePayload {
            reason: format!(
                "space payload exceeds max bytes: actual={actual} max={MAX_SPACE_PAYLOAD_BYTES}"
            ),
        });
    }
    Ok(())
}

fn validate_envelope(envelope: &SpaceEnvelope) -> Result<(), SerializeError> {
    if envelope.schema_version != SPACE_SCHEMA_VERSION {
        return Err(SerializeError::VersionMismatch {
            expected: SPACE_SCHEMA_VERSION,
            found: envelope.schema_version,
        });
    }

    let expected = space_hash(
        envelope.schema_version,
        &envelope.ring,
        envelope.rows,
        envelope.cols,
        envelope.sparse,
    );
    if envelope.source_hash != expected {
        return Err(SerializeError::ChecksumMismatch {
            expected,
            found: envelope.source_hash.clone(),
        });
    }

    Ok(())
}

fn space_hash(schema_version: u32, ring: &Ring, rows: usize, cols: usize, sparse: bool) -> String {
    let mut hasher = DetHasher::default();
    hasher.write(&schema_version.to_le_bytes());
    write_ring(&mut hasher, ring);
    hasher.write(&(rows as u64).to_le_bytes());
    hasher.write(&(cols as u64).to_le_bytes());
    hasher.write_u8(u8::from(sparse));
    format!("det64:{:016x}", hasher.finish())
}

fn write_ring(hasher: &mut DetHasher, ring: &Ring) {
    match ring {
        Ring::Integers => hasher.write_u8(1),
        Ring::Rationals => hasher.write_u8(2),
        Ring::Cyclotomic { conductor } => {
            hasher.write_u8(3);
            hasher.write(&conductor.to_le_bytes());
        }
        Ring::RealDouble => hasher.write_u8(4),
        Ring::ComplexDouble => hasher.write_u8(5),
        Ring::IntegerMod { modulus } => {
            hasher.write_u8(6);
            hasher.write(&modulus.to_le_bytes());
        }
        Ring::MPolynomial { base, variables } => {
            hasher.write_u8(7);
            hasher.write(&variables.to_le_bytes());
            write_ring(hasher, base);
        }
        Ring::Symbolic => hasher.write_u8(8),
        Ring::Generic { name, order } => {
            hasher.write_u8(9);
            hasher.write(&(name.len() as u64).to_le_bytes());
            hasher.write(name.as_bytes());
            match order {
                Some(order) => {
                    hasher.write_u8(1);
                    hasher.write(&order.to_le_bytes());
                }
                None => hasher.write_u8(0),
            }
        }
    }
}

fn extract_unknown_field(message: &str) -> Option<String> {
    // serde_json message shape: "unknown field `x`, expected ..."
    let marker = "unknown field `";
    let start = message.find(marker)? + marker.len();
    let tail = &message[start..];
    let end = tail.find('`')?;
    Some(tail[..end].to_string())
}

fn bounded(input: &str, max_len: usize) -> String {
    if input.len() <= max_len {
        input.to_string()
    } else {
        let mut boundary = max_len.min(input.len());
        while boundary > 0 && !input.is_char_boundary(boundary) {
            boundary -= 1;
        }
        format!("{}...", &input[..boundary])
    }
}
