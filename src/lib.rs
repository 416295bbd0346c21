//! # Getting started
//!
//! ```
//! use avro_builder::resolve::{NamedMember, Reflect, RecordResolution, TypeResolution};
//!
//! struct Test {
//! 	field: String,
//! }
//!
//! impl Reflect for Test {
//! 	fn resolve() -> TypeResolution<Self> {
//! 		TypeResolution::Record(RecordResolution {
//! 			members: vec![NamedMember {
//! 				name: "field".to_owned(),
//! 				aliases: Vec::new(),
//! 				member: avro_builder::resolve::Member::new(|t: &Test| Some(&t.field)),
//! 			}],
//! 			construct: Box::new(|mut values| {
//! 				let field = values
//! 					.remove(0)
//! 					.ok_or("missing field")?
//! 					.downcast::<String>()
//! 					.map_err(|_| "wrong type for field")?;
//! 				Ok(Test { field: *field })
//! 			}),
//! 		})
//! 	}
//! }
//!
//! let schema: avro_builder::Schema = r#"
//! {
//! 	"namespace": "test",
//! 	"type": "record",
//! 	"name": "Test",
//! 	"fields": [
//! 		{ "type": "string", "name": "field" }
//! 	]
//! }
//! "#
//! .parse()
//! .expect("failed to parse schema");
//!
//! let avro_datum = &[6, 102, 111, 111];
//! let test: Test = avro_builder::from_datum_slice(avro_datum, &schema).expect("failed to deserialize");
//! assert_eq!(test.field, "foo");
//! ```
//!
//! # An idiomatic Avro (de)serialization builder
//!
//! Unlike `serde`-based Avro crates, this crate does not ask a host type to
//! describe itself through a fixed trait vocabulary (`serialize`/`visit_*`);
//! instead a single [`resolve::Reflect`] impl describes the type's shape once,
//! and the [`build`] module compiles that shape against a concrete
//! [`Schema`] into a monomorphic closure ("Plan") with no further case
//! dispatch once built. This mirrors the teacher's own split between
//! describing a type and compiling a schema-specific codec for it, just
//! inverted: `Reflect` takes the place of `serde::Deserialize`, and
//! `build::binary`/`build::json` take the place of `de`/`ser`.

pub mod build;
pub mod object_container_file_encoding;
pub mod resolve;
pub mod schema;
pub mod single_object_encoding;
pub mod wire;

pub use schema::Schema;

use build::{BuildError, Options};
use resolve::Reflect;
use std::rc::Rc;
use wire::WireError;

/// Everything that can go wrong calling one of this module's top-level
/// convenience functions: either the schema and host type couldn't be
/// matched up ([`BuildError`], discovered once per call since nothing here
/// caches a compiled plan across calls) or the bytes/JSON didn't match what
/// was built ([`WireError`]).
#[derive(thiserror::Error, Debug)]
pub enum AvroError {
	#[error(transparent)]
	Build(#[from] BuildError),
	#[error(transparent)]
	Wire(#[from] WireError),
}

/// Deserialize from an avro "datum" (raw data, no headers) slice.
///
/// This compiles a fresh plan against `schema` on every call; if you are
/// deserializing many values against the same schema, build a
/// [`build::binary::DeBuildContext`] once and reuse
/// [`build::binary::DeBuildContext::build_read`] instead.
pub fn from_datum_slice<T: Reflect + 'static>(
	mut slice: &[u8],
	schema: &Schema,
) -> Result<T, AvroError> {
	from_datum_reader(&mut slice, schema)
}

/// Deserialize from an avro "datum" `impl Read`.
///
/// Prefer [`from_datum_slice`] when deserializing from a slice or `Vec`: it
/// avoids the extra indirection of a `&mut dyn Read` trait object.
pub fn from_datum_reader<T: Reflect + 'static>(
	mut reader: impl std::io::Read,
	schema: &Schema,
) -> Result<T, AvroError> {
	let schema = Rc::new(schema.clone());
	let root = schema.root_key();
	let mut ctx = build::binary::DeBuildContext::new(schema, Rc::new(Options::default()));
	let plan = ctx.build_read::<T>(root)?;
	Ok(plan(&mut reader)?)
}

/// Serialize an avro "datum" (raw data, no headers) to the provided writer.
pub fn to_datum<T: Reflect + 'static>(
	value: &T,
	mut writer: impl std::io::Write,
	schema: &Schema,
) -> Result<(), AvroError> {
	let schema = Rc::new(schema.clone());
	let root = schema.root_key();
	let mut ctx = build::binary::SerBuildContext::new(schema, Rc::new(Options::default()));
	let plan = ctx.build_write::<T>(root)?;
	let mut buf = Vec::new();
	plan(value, &mut buf)?;
	writer.write_all(&buf).map_err(WireError::from)?;
	Ok(())
}

/// Serialize an avro "datum" into a freshly allocated `Vec`.
pub fn to_datum_vec<T: Reflect + 'static>(value: &T, schema: &Schema) -> Result<Vec<u8>, AvroError> {
	let schema_rc = Rc::new(schema.clone());
	let root = schema_rc.root_key();
	let mut ctx = build::binary::SerBuildContext::new(schema_rc, Rc::new(Options::default()));
	let plan = ctx.build_write::<T>(root)?;
	let mut buf = Vec::new();
	plan(value, &mut buf)?;
	Ok(buf)
}

/// Deserialize from an avro JSON-encoded value (§4.5/§6.3's JSON wire
/// encoding, not the schema's own JSON representation).
pub fn from_json_value<T: Reflect + 'static>(
	value: &serde_json::Value,
	schema: &Schema,
) -> Result<T, AvroError> {
	let schema = Rc::new(schema.clone());
	let root = schema.root_key();
	let mut ctx = build::json::DeBuildContext::new(schema, Rc::new(Options::default()));
	let plan = ctx.build_read::<T>(root)?;
	Ok(plan(value)?)
}

/// Serialize to an avro JSON-encoded value.
pub fn to_json_value<T: Reflect + 'static>(
	value: &T,
	schema: &Schema,
) -> Result<serde_json::Value, AvroError> {
	let schema_rc = Rc::new(schema.clone());
	let root = schema_rc.root_key();
	let mut ctx = build::json::SerBuildContext::new(schema_rc, Rc::new(Options::default()));
	let plan = ctx.build_write::<T>(root)?;
	let mut out = serde_json::Value::Null;
	plan(value, &mut out)?;
	Ok(out)
}
