use std::fmt;

/// Errors that can occur while constructing, parsing or validating a
/// [`Schema`](super::Schema).
///
/// Covers the `InvalidSchema` and `UnknownSchema` kinds of the error
/// taxonomy.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
	#[error("Invalid schema: {0}")]
	InvalidSchema(String),
	#[error("Unknown schema element: {0}")]
	UnknownSchema(String),
	#[error("Failed to parse schema JSON: {0}")]
	Json(#[from] serde_json::Error),
}

impl SchemaError {
	pub(crate) fn invalid_schema(msg: impl fmt::Display) -> Self {
		Self::InvalidSchema(msg.to_string())
	}
	pub(crate) fn unknown_schema(msg: impl fmt::Display) -> Self {
		Self::UnknownSchema(msg.to_string())
	}
}
