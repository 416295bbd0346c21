//! Single-object encoding: a 2-byte marker (`0xC3 0x01`) followed by the
//! 8-byte little-endian Rabin fingerprint of the schema's Parsing Canonical
//! Form, followed by a normal binary datum. Lets a consumer that doesn't
//! already know the schema recognize which one produced a given message
//! (e.g. messages on a shared bus), without the block framing object
//! container files need.
//!
//! Grounded on the teacher's `single_object_encoding.rs`; the fingerprint
//! itself is [`Schema::rabin_fingerprint`] (§4.1 ambient), already
//! implemented alongside Parsing Canonical Form in `schema::canonical`.

use crate::build::{self, BuildError, Options};
use crate::resolve::Reflect;
use crate::schema::{Schema, SchemaError};
use crate::wire::WireError;
use std::rc::Rc;

const MARKER: [u8; 2] = [0xC3, 0x01];

#[derive(thiserror::Error, Debug)]
pub enum SingleObjectError {
	#[error("input is shorter than the 10-byte single-object header")]
	HeaderTooShort,
	#[error("input does not start with the single-object marker `C3 01`")]
	BadMarker,
	#[error("fingerprint in header does not match the given schema")]
	FingerprintMismatch,
	#[error("{0}")]
	Schema(#[from] SchemaError),
	#[error("{0}")]
	Build(#[from] BuildError),
	#[error("{0}")]
	Wire(#[from] WireError),
}

fn check_header(header: &[u8; 10], schema: &Schema) -> Result<(), SingleObjectError> {
	if header[0..2] != MARKER {
		return Err(SingleObjectError::BadMarker);
	}
	if header[2..10] != schema.rabin_fingerprint()? {
		return Err(SingleObjectError::FingerprintMismatch);
	}
	Ok(())
}

/// Deserializes from a single-object-encoded slice, checking the header
/// fingerprint against `schema` before decoding the datum.
pub fn from_single_object_slice<T: Reflect + 'static>(
	slice: &[u8],
	schema: &Schema,
) -> Result<T, SingleObjectError> {
	if slice.len() < 10 {
		return Err(SingleObjectError::HeaderTooShort);
	}
	let header: [u8; 10] = slice[..10].try_into().expect("checked length above");
	check_header(&header, schema)?;
	from_datum_slice(&slice[10..], schema)
}

/// Deserializes from a single-object-encoded `impl Read`, checking the
/// header fingerprint against `schema` before decoding the datum.
pub fn from_single_object_reader<T: Reflect + 'static>(
	mut reader: impl std::io::Read,
	schema: &Schema,
) -> Result<T, SingleObjectError> {
	let mut header = [0u8; 10];
	reader
		.read_exact(&mut header)
		.map_err(|_| SingleObjectError::HeaderTooShort)?;
	check_header(&header, schema)?;
	from_datum_reader(reader, schema)
}

/// Serializes `value` into a freshly allocated single-object-encoded `Vec`.
pub fn to_single_object_vec<T: Reflect + 'static>(
	value: &T,
	schema: &Schema,
) -> Result<Vec<u8>, SingleObjectError> {
	let mut out = Vec::new();
	to_single_object(value, &mut out, schema)?;
	Ok(out)
}

/// Serializes `value`, writing the single-object header followed by the
/// datum to `writer`.
pub fn to_single_object<T: Reflect + 'static>(
	value: &T,
	mut writer: impl std::io::Write,
	schema: &Schema,
) -> Result<(), SingleObjectError> {
	let fingerprint = schema.rabin_fingerprint()?;
	writer.write_all(&MARKER).map_err(WireError::from)?;
	writer.write_all(&fingerprint).map_err(WireError::from)?;
	to_datum(value, writer, schema)
}

/// Same plan-build-then-run shape as [`crate::from_datum_reader`], kept
/// local so this module doesn't need to route its own error type through
/// [`crate::AvroError`].
fn from_datum_reader<T: Reflect + 'static>(
	mut reader: impl std::io::Read,
	schema: &Schema,
) -> Result<T, SingleObjectError> {
	let schema = Rc::new(schema.clone());
	let root = schema.root_key();
	let mut ctx = build::binary::DeBuildContext::new(schema, Rc::new(Options::default()));
	let plan = ctx.build_read::<T>(root)?;
	Ok(plan(&mut reader)?)
}

fn from_datum_slice<T: Reflect + 'static>(mut slice: &[u8], schema: &Schema) -> Result<T, SingleObjectError> {
	from_datum_reader(&mut slice, schema)
}

fn to_datum<T: Reflect + 'static>(
	value: &T,
	mut writer: impl std::io::Write,
	schema: &Schema,
) -> Result<(), SingleObjectError> {
	let schema = Rc::new(schema.clone());
	let root = schema.root_key();
	let mut ctx = build::binary::SerBuildContext::new(schema, Rc::new(Options::default()));
	let plan = ctx.build_write::<T>(root)?;
	let mut buf = Vec::new();
	plan(value, &mut buf)?;
	writer.write_all(&buf).map_err(WireError::from)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_an_int() {
		let schema: Schema = r#"{"type":"int"}"#.parse().unwrap();
		let bytes = to_single_object_vec(&3i32, &schema).unwrap();
		assert_eq!(&bytes[0..2], &MARKER);
		let back: i32 = from_single_object_slice(&bytes, &schema).unwrap();
		assert_eq!(back, 3);
	}

	#[test]
	fn rejects_mismatched_schema() {
		let schema: Schema = r#"{"type":"int"}"#.parse().unwrap();
		let other: Schema = r#"{"type":"long"}"#.parse().unwrap();
		let bytes = to_single_object_vec(&3i32, &schema).unwrap();
		let err = from_single_object_slice::<i32>(&bytes, &other).unwrap_err();
		assert!(matches!(err, SingleObjectError::FingerprintMismatch));
	}

	#[test]
	fn rejects_short_input() {
		let schema: Schema = r#"{"type":"int"}"#.parse().unwrap();
		let err = from_single_object_slice::<i32>(&[0xC3, 0x01], &schema).unwrap_err();
		assert!(matches!(err, SingleObjectError::HeaderTooShort));
	}
}
