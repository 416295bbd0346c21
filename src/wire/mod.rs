//! The two wire encodings Avro data can be written in: binary (§4.4) and
//! JSON (§4.5/§6.3).

pub mod binary;
pub mod json;

/// Runtime (as opposed to build-time) errors: malformed bytes, values that
/// don't fit their schema's numeric bounds, and I/O failure.
///
/// Covers the `Overflow`, `OutOfRange` and `InvalidEncoding` kinds of the
/// error taxonomy (§7), plus `Io` for the underlying reader/writer.
#[derive(thiserror::Error, Debug)]
pub enum WireError {
	#[error("arithmetic overflow: {0}")]
	Overflow(String),
	#[error("value out of range: {0}")]
	OutOfRange(String),
	#[error("invalid encoding: {0}")]
	InvalidEncoding(String),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("invalid JSON value for this schema: {0}")]
	InvalidJson(String),
}

impl WireError {
	pub fn overflow(msg: impl std::fmt::Display) -> Self {
		Self::Overflow(msg.to_string())
	}
	pub fn out_of_range(msg: impl std::fmt::Display) -> Self {
		Self::OutOfRange(msg.to_string())
	}
	pub fn invalid_encoding(msg: impl std::fmt::Display) -> Self {
		Self::InvalidEncoding(msg.to_string())
	}
	pub fn invalid_json(msg: impl std::fmt::Display) -> Self {
		Self::InvalidJson(msg.to_string())
	}
}
