//! Schema JSON writer (§4.5), including Parsing Canonical Form, and the
//! Rabin fingerprint used by single-object encoding (§3.4 supplemented
//! features).

use super::{LogicalType, Name, Schema, SchemaError, SchemaKey, SchemaType};

use std::fmt::Write;

impl Schema {
	/// Emit this schema as JSON.
	///
	/// `canonical = true` produces [Parsing Canonical
	/// Form](https://avro.apache.org/docs/current/specification/#parsing-canonical-form-for-schemas):
	/// no `doc`, `aliases`, `default` or unknown attributes, field order
	/// `name, type, fields|symbols|items|values|size`, and `namespace` merged
	/// into `name`. `canonical = false` emits a schema that round-trips
	/// through the parser with everything this model retains (it still drops
	/// whitespace/key-order quirks of whatever was originally parsed, since we
	/// don't keep the original text).
	pub fn write_json(&self, canonical: bool) -> Result<String, SchemaError> {
		let mut out = String::new();
		let mut state = WriteState {
			schema: self,
			canonical,
			named_type_written: vec![false; self.nodes().len()],
		};
		state.write_node(self.root_key(), &mut out)?;
		Ok(out)
	}

	/// The 8-byte Rabin fingerprint of this schema's Parsing Canonical Form,
	/// as used by Avro single-object encoding.
	pub fn rabin_fingerprint(&self) -> Result<[u8; 8], SchemaError> {
		let mut hasher = Rabin::default();
		let mut state = WriteState {
			schema: self,
			canonical: true,
			named_type_written: vec![false; self.nodes().len()],
		};
		state.write_node(self.root_key(), &mut hasher)?;
		Ok(hasher.finish())
	}
}

struct WriteState<'s> {
	schema: &'s Schema,
	canonical: bool,
	named_type_written: Vec<bool>,
}

impl WriteState<'_> {
	fn write_node(&mut self, key: SchemaKey, w: &mut impl Write) -> Result<(), SchemaError> {
		let node = self
			.schema
			.get(key)
			.ok_or_else(|| SchemaError::invalid_schema("schema key refers to no node"))?;

		if self.canonical {
			// PCF drops logical types entirely (AVRO-1721).
			return self.write_regular(key, &node.type_, w);
		}

		match &node.logical_type {
			None => self.write_regular(key, &node.type_, w),
			Some(logical) => {
				write!(w, "{{\"type\":").ok();
				self.write_regular(key, &node.type_, w)?;
				write!(w, ",\"logicalType\":\"{}\"", logical.as_str()).ok();
				if let LogicalType::Decimal(d) = logical {
					write!(w, ",\"precision\":{},\"scale\":{}", d.precision, d.scale).ok();
				}
				write!(w, "}}").ok();
				Ok(())
			}
		}
	}

	fn write_regular(
		&mut self,
		key: SchemaKey,
		type_: &SchemaType,
		w: &mut impl Write,
	) -> Result<(), SchemaError> {
		macro_rules! prim {
			($s:literal) => {{
				w.write_char('"').ok();
				w.write_str($s).ok();
				w.write_char('"').ok();
				Ok(())
			}};
		}
		match type_ {
			SchemaType::Null => prim!("null"),
			SchemaType::Boolean => prim!("boolean"),
			SchemaType::Int => prim!("int"),
			SchemaType::Long => prim!("long"),
			SchemaType::Float => prim!("float"),
			SchemaType::Double => prim!("double"),
			SchemaType::Bytes => prim!("bytes"),
			SchemaType::String => prim!("string"),
			SchemaType::Array(a) => {
				w.write_str("{\"type\":\"array\",\"items\":").ok();
				self.write_node(a.items, w)?;
				w.write_char('}').ok();
				Ok(())
			}
			SchemaType::Map(m) => {
				w.write_str("{\"type\":\"map\",\"values\":").ok();
				self.write_node(m.values, w)?;
				w.write_char('}').ok();
				Ok(())
			}
			SchemaType::Union(u) => {
				w.write_char('[').ok();
				for (i, &branch) in u.branches.iter().enumerate() {
					if i > 0 {
						w.write_char(',').ok();
					}
					self.write_node(branch, w)?;
				}
				w.write_char(']').ok();
				Ok(())
			}
			SchemaType::Enum(e) => {
				if self.write_name_or_ref(key, &e.name, w) {
					w.write_str("{\"name\":\"").ok();
					w.write_str(e.name.fully_qualified_name()).ok();
					w.write_str("\",\"type\":\"enum\"").ok();
					if !self.canonical {
						write_optional_namespace(&e.name, w);
						write_aliases(&e.aliases, w);
						write_doc(&e.doc, w);
					}
					w.write_str(",\"symbols\":[").ok();
					for (i, s) in e.symbols.iter().enumerate() {
						if i > 0 {
							w.write_char(',').ok();
						}
						write_json_string(s, w);
					}
					w.write_str("]").ok();
					if !self.canonical {
						if let Some(default) = &e.default {
							w.write_str(",\"default\":").ok();
							write_json_string(default, w);
						}
					}
					w.write_char('}').ok();
				}
				Ok(())
			}
			SchemaType::Fixed(f) => {
				if self.write_name_or_ref(key, &f.name, w) {
					w.write_str("{\"name\":\"").ok();
					w.write_str(f.name.fully_qualified_name()).ok();
					w.write_str("\",\"type\":\"fixed\"").ok();
					if !self.canonical {
						write_optional_namespace(&f.name, w);
						write_aliases(&f.aliases, w);
					}
					write!(w, ",\"size\":{}", f.size).ok();
					w.write_char('}').ok();
				}
				Ok(())
			}
			SchemaType::Record(r) => {
				if self.write_name_or_ref(key, &r.name, w) {
					w.write_str("{\"name\":\"").ok();
					w.write_str(r.name.fully_qualified_name()).ok();
					w.write_str("\",\"type\":\"record\"").ok();
					if !self.canonical {
						write_optional_namespace(&r.name, w);
						write_aliases(&r.aliases, w);
						write_doc(&r.doc, w);
					}
					w.write_str(",\"fields\":[").ok();
					for (i, field) in r.fields.iter().enumerate() {
						if i > 0 {
							w.write_char(',').ok();
						}
						w.write_str("{\"name\":\"").ok();
						w.write_str(&field.name).ok();
						w.write_str("\",\"type\":").ok();
						self.write_node(field.type_, w)?;
						if !self.canonical {
							if let Some(default) = &field.default {
								w.write_str(",\"default\":").ok();
								w.write_str(&default.json().to_string()).ok();
							}
							write_doc(&field.doc, w);
						}
						w.write_char('}').ok();
					}
					w.write_str("]}").ok();
				}
				Ok(())
			}
		}
	}

	/// Returns `true` if the full definition should be written (first
	/// occurrence), `false` if only a name reference was written.
	fn write_name_or_ref(&mut self, key: SchemaKey, name: &Name, w: &mut impl Write) -> bool {
		match self.named_type_written.get_mut(key.idx()) {
			Some(written @ false) => {
				*written = true;
				true
			}
			_ => {
				w.write_char('"').ok();
				w.write_str(name.fully_qualified_name()).ok();
				w.write_char('"').ok();
				false
			}
		}
	}
}

fn write_optional_namespace(name: &Name, w: &mut impl Write) {
	if let Some(ns) = name.namespace() {
		w.write_str(",\"namespace\":\"").ok();
		w.write_str(ns).ok();
		w.write_char('"').ok();
	}
}

fn write_aliases(aliases: &[Name], w: &mut impl Write) {
	if aliases.is_empty() {
		return;
	}
	w.write_str(",\"aliases\":[").ok();
	for (i, alias) in aliases.iter().enumerate() {
		if i > 0 {
			w.write_char(',').ok();
		}
		write_json_string(alias.fully_qualified_name(), w);
	}
	w.write_char(']').ok();
}

fn write_doc(doc: &Option<String>, w: &mut impl Write) {
	if let Some(doc) = doc {
		w.write_str(",\"doc\":").ok();
		write_json_string(doc, w);
	}
}

fn write_json_string(s: &str, w: &mut impl Write) {
	// Field/symbol/doc text is schema-author-controlled, but may still
	// contain characters that need escaping to stay valid JSON.
	write!(w, "{}", serde_json::to_string(s).unwrap_or_default()).ok();
}

/// Rabin fingerprint, as specified by
/// <https://avro.apache.org/docs/current/specification/#schema-fingerprints>.
#[derive(Clone)]
struct Rabin {
	result: i64,
}

impl Default for Rabin {
	fn default() -> Self {
		Self { result: EMPTY64 }
	}
}

impl Rabin {
	fn finish(self) -> [u8; 8] {
		self.result.to_le_bytes()
	}
}

impl Write for Rabin {
	fn write_str(&mut self, s: &str) -> std::fmt::Result {
		for &b in s.as_bytes() {
			self.result = (self.result >> 8) ^ fp_table()[((self.result ^ b as i64) & 0xFF) as usize];
		}
		Ok(())
	}
}

const EMPTY64: i64 = -4513414715797952619;

fn fp_table() -> &'static [i64; 256] {
	static FP_TABLE: std::sync::OnceLock<[i64; 256]> = std::sync::OnceLock::new();
	FP_TABLE.get_or_init(|| {
		let mut table = [0i64; 256];
		for (i, slot) in table.iter_mut().enumerate() {
			let mut fp = i as i64;
			for _ in 0..8 {
				fp = (fp >> 1) ^ (EMPTY64 & -(fp & 1));
			}
			*slot = fp;
		}
		table
	})
}

#[cfg(test)]
mod tests {
	use super::Rabin;
	use std::fmt::Write;

	#[test]
	fn rabin_matches_reference_vectors() {
		let data: &[(&str, i64)] = &[
			(r#""null""#, 7195948357588979594),
			(r#""boolean""#, -6970731678124411036),
			(
				r#"{"name":"foo","type":"fixed","size":15}"#,
				1756455273707447556,
			),
			("hello world", 2906301498937520992),
		];
		for (s, expected) in data {
			let mut hasher = Rabin::default();
			hasher.write_str(s).unwrap();
			let result = i64::from_le_bytes(hasher.finish());
			assert_eq!(result, *expected);
		}
	}
}
