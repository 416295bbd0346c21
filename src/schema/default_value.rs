use super::SchemaKey;

/// A field or enum default value (§3.4).
///
/// Stores the parsed JSON literal together with the [`SchemaKey`] it is
/// interpreted against. It is only consulted when the deserializer encounters
/// a field absent from the encoded record (§4.6 "Record"); materializing it
/// into the host type goes through the same JSON-value-reading machinery used
/// by the JSON wire codec (§6.3), since an Avro default is always written in
/// the Avro JSON encoding regardless of which wire format the datum itself
/// uses.
#[derive(Clone, Debug)]
pub struct DefaultValue {
	pub(crate) json: serde_json::Value,
	pub(crate) schema: SchemaKey,
}

impl DefaultValue {
	pub fn new(json: serde_json::Value, schema: SchemaKey) -> Self {
		Self { json, schema }
	}

	pub fn json(&self) -> &serde_json::Value {
		&self.json
	}

	pub fn schema_key(&self) -> SchemaKey {
		self.schema
	}
}
