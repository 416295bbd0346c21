//! Avro binary encoding primitives (§4.4).
//!
//! Integers use the zig-zag variable-length encoding from
//! <https://avro.apache.org/docs/current/specification/#binary-encoding>;
//! everything else is either a fixed-width little/big-endian value or a
//! length-prefixed byte run. Block framing (for arrays, maps and the object
//! container file) lives here too since it's shared by several callers.

use super::WireError;
use integer_encoding::VarInt;
use std::io::Read;

pub fn write_null(_out: &mut Vec<u8>) {}

pub fn write_bool(out: &mut Vec<u8>, v: bool) {
	out.push(v as u8);
}

pub fn write_int(out: &mut Vec<u8>, v: i32) {
	out.extend_from_slice(&v.encode_var_vec());
}

pub fn write_long(out: &mut Vec<u8>, v: i64) {
	out.extend_from_slice(&v.encode_var_vec());
}

pub fn write_float(out: &mut Vec<u8>, v: f32) {
	out.extend_from_slice(&v.to_le_bytes());
}

pub fn write_double(out: &mut Vec<u8>, v: f64) {
	out.extend_from_slice(&v.to_le_bytes());
}

pub fn write_bytes(out: &mut Vec<u8>, v: &[u8]) {
	write_long(out, v.len() as i64);
	out.extend_from_slice(v);
}

pub fn write_string(out: &mut Vec<u8>, v: &str) {
	write_bytes(out, v.as_bytes());
}

pub fn write_fixed(out: &mut Vec<u8>, v: &[u8]) {
	out.extend_from_slice(v);
}

/// A single block of a length-prefixed sequence (array/map item run, or an
/// object container file data block). Avro allows the negative-count form
/// (count negated, followed by the byte size of the block) but writers are
/// not required to use it; we always write the plain positive form.
pub fn write_block_count(out: &mut Vec<u8>, count: usize) {
	write_long(out, count as i64);
}

pub fn write_end_of_blocks(out: &mut Vec<u8>) {
	write_long(out, 0);
}

pub fn read_bool<R: Read + ?Sized>(r: &mut R) -> Result<bool, WireError> {
	let mut buf = [0u8; 1];
	r.read_exact(&mut buf)?;
	match buf[0] {
		0 => Ok(false),
		1 => Ok(true),
		other => Err(WireError::invalid_encoding(format!(
			"boolean byte must be 0 or 1, got {other}"
		))),
	}
}

/// Reads the raw (pre-zigzag) unsigned varint, one byte at a time, rejecting
/// any encoding that doesn't terminate within `max_bytes` bytes — `ceil(W/7)`
/// for a W-bit host type (§4.4): 5 for `int`, 10 for `long`. A reader that
/// only bounded the shift against 64 bits would accept a 32-bit `int`
/// varint spanning 6+ bytes as long as the extra continuation bytes
/// happened to decode to a value that still fits in 32 bits.
///
/// Written against `Read + ?Sized` (rather than using
/// `integer_encoding::VarIntReader`, whose blanket impl only covers `Sized`
/// readers) so builder-framework code can read through a `&mut dyn Read`.
fn read_raw_varint_bounded<R: Read + ?Sized>(r: &mut R, max_bytes: usize) -> Result<u64, WireError> {
	let mut result: u64 = 0;
	let mut shift = 0u32;
	for _ in 0..max_bytes {
		let mut byte = [0u8; 1];
		r.read_exact(&mut byte)?;
		let byte = byte[0];
		result |= ((byte & 0x7F) as u64) << shift;
		if byte & 0x80 == 0 {
			return Ok(result);
		}
		shift += 7;
	}
	Err(WireError::overflow(format!("varint longer than {max_bytes} bytes")))
}

pub fn read_int<R: Read + ?Sized>(r: &mut R) -> Result<i32, WireError> {
	let raw = read_raw_varint_bounded(r, 5)?;
	let raw = u32::try_from(raw)
		.map_err(|_| WireError::overflow(format!("int varint {raw} does not fit in 32 bits")))?;
	Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
}

pub fn read_long<R: Read + ?Sized>(r: &mut R) -> Result<i64, WireError> {
	let raw = read_raw_varint_bounded(r, 10)?;
	Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
}

pub fn read_float<R: Read + ?Sized>(r: &mut R) -> Result<f32, WireError> {
	let mut buf = [0u8; 4];
	r.read_exact(&mut buf)?;
	Ok(f32::from_le_bytes(buf))
}

pub fn read_double<R: Read + ?Sized>(r: &mut R) -> Result<f64, WireError> {
	let mut buf = [0u8; 8];
	r.read_exact(&mut buf)?;
	Ok(f64::from_le_bytes(buf))
}

pub fn read_bytes<R: Read + ?Sized>(r: &mut R) -> Result<Vec<u8>, WireError> {
	let len = read_long(r)?;
	let len = usize::try_from(len)
		.map_err(|_| WireError::out_of_range(format!("negative byte length {len}")))?;
	let mut buf = vec![0u8; len];
	r.read_exact(&mut buf)?;
	Ok(buf)
}

pub fn read_string<R: Read + ?Sized>(r: &mut R) -> Result<String, WireError> {
	let bytes = read_bytes(r)?;
	String::from_utf8(bytes)
		.map_err(|e| WireError::invalid_encoding(format!("string is not valid UTF-8: {e}")))
}

pub fn read_fixed<R: Read + ?Sized>(r: &mut R, size: usize) -> Result<Vec<u8>, WireError> {
	let mut buf = vec![0u8; size];
	r.read_exact(&mut buf)?;
	Ok(buf)
}

/// Reads one block-count header, transparently absorbing the negative-count
/// form (count negated, immediately followed by a long byte-size we don't
/// need and discard). Returns `0` at the terminating empty block.
pub fn read_block_count<R: Read + ?Sized>(r: &mut R) -> Result<usize, WireError> {
	let count = read_long(r)?;
	let count = if count < 0 {
		let _byte_size = read_long(r)?;
		count
			.checked_neg()
			.ok_or_else(|| WireError::overflow("block count negation overflowed i64::MIN"))?
	} else {
		count
	};
	usize::try_from(count).map_err(|_| WireError::out_of_range(format!("bad block count {count}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zigzag_varint_reference_values() {
		// From the Avro spec's own worked example: 3 encodes to the single
		// zig-zag byte 06; -3 (not in the spec text but the natural
		// counterpart) checks the sign-folding direction.
		let mut out = Vec::new();
		write_long(&mut out, 3);
		assert_eq!(out, vec![0x06]);

		let mut out = Vec::new();
		write_long(&mut out, -3);
		assert_eq!(out, vec![0x05]);

		let mut out = Vec::new();
		write_long(&mut out, 0);
		assert_eq!(out, vec![0x00]);
	}

	#[test]
	fn bytes_round_trip() {
		let mut out = Vec::new();
		write_bytes(&mut out, b"foo");
		let mut cursor = &out[..];
		let back = read_bytes(&mut cursor).unwrap();
		assert_eq!(back, b"foo");
		assert!(cursor.is_empty());
	}

	#[test]
	fn negative_block_count_is_absorbed() {
		let mut out = Vec::new();
		write_long(&mut out, -2);
		write_long(&mut out, 11); // byte size of the block, unused by readers here
		let mut cursor = &out[..];
		assert_eq!(read_block_count(&mut cursor).unwrap(), 2);
	}

	#[test]
	fn long_varint_rejects_an_eleventh_continuation_byte() {
		let bytes = [0x80u8; 11];
		let mut cursor = &bytes[..];
		assert!(matches!(read_long(&mut cursor).unwrap_err(), WireError::Overflow(_)));
	}

	#[test]
	fn int_varint_is_capped_at_five_bytes() {
		// Raw value 0, but spread across 6 continuation bytes plus a
		// terminator: `int`'s 5-byte bound must reject this before ever
		// looking at the decoded value, even though it would fit in i32.
		let bytes = [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00];
		let mut cursor = &bytes[..];
		assert!(matches!(read_int(&mut cursor).unwrap_err(), WireError::Overflow(_)));
	}
}
