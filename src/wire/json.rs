//! Avro JSON encoding primitives (§4.5, §6.3).
//!
//! Unlike the binary codec this isn't a byte stream: callers build and walk
//! [`serde_json::Value`] trees directly. `bytes`/`fixed` are encoded as a
//! string where each byte maps one-to-one to the Unicode code point of the
//! same value (effectively Latin-1), per the Avro spec's JSON encoding table.

use super::WireError;

pub fn write_null() -> serde_json::Value {
	serde_json::Value::Null
}

pub fn write_bool(v: bool) -> serde_json::Value {
	serde_json::Value::Bool(v)
}

pub fn write_int(v: i32) -> serde_json::Value {
	serde_json::Value::Number(v.into())
}

pub fn write_long(v: i64) -> serde_json::Value {
	serde_json::Value::Number(v.into())
}

pub fn write_float(v: f32) -> serde_json::Value {
	write_double(v as f64)
}

pub fn write_double(v: f64) -> serde_json::Value {
	serde_json::Number::from_f64(v)
		.map(serde_json::Value::Number)
		.unwrap_or_else(|| {
			// NaN/Infinity have no JSON number representation; Avro's JSON
			// encoding doesn't define one either, so we fall back to a string
			// rather than silently rounding to something finite.
			serde_json::Value::String(v.to_string())
		})
}

pub fn write_string(v: &str) -> serde_json::Value {
	serde_json::Value::String(v.to_owned())
}

pub fn write_bytes(v: &[u8]) -> serde_json::Value {
	serde_json::Value::String(v.iter().map(|&b| b as char).collect())
}

/// `{"branchName": value}`, or bare `value` when `branch_name` is `"null"`.
pub fn write_union(branch_name: &str, value: serde_json::Value) -> serde_json::Value {
	if branch_name == "null" {
		return value;
	}
	let mut map = serde_json::Map::with_capacity(1);
	map.insert(branch_name.to_owned(), value);
	serde_json::Value::Object(map)
}

pub fn read_null(v: &serde_json::Value) -> Result<(), WireError> {
	match v {
		serde_json::Value::Null => Ok(()),
		other => Err(WireError::invalid_json(format!("expected null, got {other}"))),
	}
}

pub fn read_bool(v: &serde_json::Value) -> Result<bool, WireError> {
	v.as_bool()
		.ok_or_else(|| WireError::invalid_json(format!("expected boolean, got {v}")))
}

pub fn read_int(v: &serde_json::Value) -> Result<i32, WireError> {
	let n = v
		.as_i64()
		.ok_or_else(|| WireError::invalid_json(format!("expected int, got {v}")))?;
	i32::try_from(n).map_err(|_| WireError::out_of_range(format!("{n} does not fit in an int")))
}

pub fn read_long(v: &serde_json::Value) -> Result<i64, WireError> {
	v.as_i64()
		.ok_or_else(|| WireError::invalid_json(format!("expected long, got {v}")))
}

pub fn read_float(v: &serde_json::Value) -> Result<f32, WireError> {
	Ok(read_double(v)? as f32)
}

pub fn read_double(v: &serde_json::Value) -> Result<f64, WireError> {
	if let Some(n) = v.as_f64() {
		return Ok(n);
	}
	if let serde_json::Value::String(s) = v {
		return s
			.parse()
			.map_err(|_| WireError::invalid_json(format!("expected double, got string {s:?}")));
	}
	Err(WireError::invalid_json(format!("expected double, got {v}")))
}

pub fn read_string(v: &serde_json::Value) -> Result<String, WireError> {
	v.as_str()
		.map(str::to_owned)
		.ok_or_else(|| WireError::invalid_json(format!("expected string, got {v}")))
}

pub fn read_bytes(v: &serde_json::Value) -> Result<Vec<u8>, WireError> {
	let s = v
		.as_str()
		.ok_or_else(|| WireError::invalid_json(format!("expected bytes string, got {v}")))?;
	s.chars()
		.map(|c| {
			u32::from(c)
				.try_into()
				.map_err(|_| WireError::invalid_encoding(format!("byte string contains {c:?}, outside 0..=255")))
		})
		.collect()
}

/// Splits a JSON union value into its branch name and inner value: `null` is
/// the `"null"` branch with a `Null` payload, anything else must be a
/// single-key object `{"branchName": value}`.
pub fn read_union(v: &serde_json::Value) -> Result<(&str, &serde_json::Value), WireError> {
	if v.is_null() {
		return Ok(("null", v));
	}
	let obj = v
		.as_object()
		.ok_or_else(|| WireError::invalid_json(format!("expected union wrapper object, got {v}")))?;
	if obj.len() != 1 {
		return Err(WireError::invalid_json(format!(
			"union wrapper object must have exactly one key, got {}",
			obj.len()
		)));
	}
	let (name, value) = obj.iter().next().expect("checked len == 1");
	Ok((name.as_str(), value))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bytes_round_trip_through_latin1_string() {
		let data = [0u8, 1, 127, 128, 255];
		let v = write_bytes(&data);
		assert_eq!(v, serde_json::Value::String("\u{0}\u{1}\u{7f}\u{80}\u{ff}".into()));
		assert_eq!(read_bytes(&v).unwrap(), data);
	}

	#[test]
	fn union_null_is_bare() {
		assert_eq!(write_union("null", write_null()), serde_json::Value::Null);
		let (name, value) = read_union(&serde_json::Value::Null).unwrap();
		assert_eq!(name, "null");
		assert!(value.is_null());
	}

	#[test]
	fn union_non_null_is_wrapped() {
		let v = write_union("int", write_int(7));
		assert_eq!(v, serde_json::json!({"int": 7}));
		let (name, value) = read_union(&v).unwrap();
		assert_eq!(name, "int");
		assert_eq!(read_int(value).unwrap(), 7);
	}
}
