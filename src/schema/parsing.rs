//! Schema JSON reader (§4.5).
//!
//! Cases are tried in the order mandated by §4.5: logical-types → collections
//! → unions → named types → primitives → named-reference. In practice that
//! order falls naturally out of matching on the raw JSON shape (string vs.
//! array vs. object-with-a-`type`-field) plus, within objects, checking
//! `logicalType` before dispatching on the underlying `type`.

use super::{
	Array, DefaultValue, Enum, Field, Fixed, LogicalType, Map, Name, Record, Schema, SchemaError,
	SchemaKey, SchemaNode, SchemaType, Union,
};
use crate::schema::logical::{Decimal, UnknownLogicalType};

use std::collections::HashMap;

const LATE_NAME_LOOKUP_REMAP_BIT: usize = 1usize << (usize::BITS - 1);

pub(super) fn parse(s: &str) -> Result<Schema, SchemaError> {
	let raw_schema: raw::SchemaNode = serde_json::from_str(s)?;

	let mut state = ConstructionState {
		nodes: Vec::new(),
		names: HashMap::new(),
		unresolved_names: Vec::new(),
	};
	state.register_node(&raw_schema, None, None)?;

	if !state.unresolved_names.is_empty() {
		let resolved: Vec<SchemaKey> = state
			.unresolved_names
			.iter()
			.map(|name| {
				state
					.names
					.get(name)
					.copied()
					.map(SchemaKey::from_idx)
					.ok_or_else(|| {
						SchemaError::unknown_schema(format!(
							"the schema contains an unknown reference: {name}"
						))
					})
			})
			.collect::<Result<_, _>>()?;
		let fix = |key: &mut SchemaKey| {
			if key.idx & LATE_NAME_LOOKUP_REMAP_BIT != 0 {
				*key = resolved[key.idx ^ LATE_NAME_LOOKUP_REMAP_BIT];
			}
		};
		for node in &mut state.nodes {
			match &mut node.type_ {
				SchemaType::Array(a) => fix(&mut a.items),
				SchemaType::Map(m) => fix(&mut m.values),
				SchemaType::Union(u) => u.branches.iter_mut().for_each(fix),
				SchemaType::Record(r) => r.fields.iter_mut().for_each(|f| fix(&mut f.type_)),
				_ => {}
			}
		}
	}

	Schema::from_nodes(state.nodes)
}

struct ConstructionState<'a> {
	nodes: Vec<SchemaNode>,
	names: HashMap<NameKey<'a>, usize>,
	unresolved_names: Vec<NameKey<'a>>,
}

#[derive(PartialEq, Eq, Hash, Clone, Copy)]
struct NameKey<'a> {
	namespace: Option<&'a str>,
	name: &'a str,
}

impl NameKey<'_> {
	fn to_name(self) -> Name {
		Name::from_parts(self.namespace, self.name)
	}
}

impl std::fmt::Display for NameKey<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.namespace {
			None => self.name.fmt(f),
			Some(ns) => write!(f, "{ns}.{}", self.name),
		}
	}
}

fn split_name(full: &str) -> (Option<&str>, &str) {
	match full.rsplit_once('.') {
		Some((ns, name)) => (Some(ns).filter(|s| !s.is_empty()), name),
		None => (None, full),
	}
}

impl<'a> ConstructionState<'a> {
	/// Register a node (and recursively its children), returning the
	/// [`SchemaKey`] it was stored at.
	///
	/// For named schemas, the key invariant from §4.5 is upheld here: the
	/// name is registered in `self.names` *before* we recurse into the
	/// node's children, which is what lets a record field reference the
	/// record itself.
	fn register_node(
		&mut self,
		raw: &'a raw::SchemaNode<'a>,
		enclosing_namespace: Option<&'a str>,
		will_have_logical_type: Option<&str>,
	) -> Result<SchemaKey, SchemaError> {
		Ok(match raw {
			raw::SchemaNode::Type(t) => {
				let idx = self.nodes.len();
				self.nodes.push(SchemaNode::new(primitive_type(*t)?));
				SchemaKey::from_idx(idx)
			}
			raw::SchemaNode::Union(branches) => {
				let idx = self.nodes.len();
				self.nodes.push(SchemaNode::new(SchemaType::Null)); // placeholder
				let branches = branches
					.iter()
					.map(|b| self.register_node(b, enclosing_namespace, None))
					.collect::<Result<_, _>>()?;
				self.nodes[idx] = SchemaNode::new(SchemaType::Union(Union { branches }));
				SchemaKey::from_idx(idx)
			}
			raw::SchemaNode::Ref(reference) => {
				let (dot_ns, name) = split_name(reference);
				let key = NameKey {
					namespace: dot_ns.or(enclosing_namespace),
					name,
				};
				match self.names.get(&key) {
					Some(&idx) => SchemaKey::from_idx(idx),
					None => {
						let idx = self.unresolved_names.len();
						self.unresolved_names.push(key);
						SchemaKey::from_idx(idx | LATE_NAME_LOOKUP_REMAP_BIT)
					}
				}
			}
			raw::SchemaNode::Object(object) => {
				let idx = self.nodes.len();
				let name_key = if let Some(name) = &object.name {
					let (dot_ns, local) = split_name(name);
					let namespace = dot_ns.or(match &object.namespace {
						// an explicit empty string namespace means "no namespace"
						Some(ns) => Some(ns.as_str()).filter(|s| !s.is_empty()),
						None => enclosing_namespace,
					});
					let key = NameKey {
						namespace,
						name: local,
					};
					if self.names.insert(key, idx).is_some() {
						return Err(SchemaError::invalid_schema(format!(
							"the schema contains duplicate definitions for {key}"
						)));
					}
					Some(key)
				} else {
					None
				};

				self.nodes.push(SchemaNode::new(SchemaType::Null)); // reserve our spot

				let new_node = match &object.logical_type {
					None => SchemaNode::new(self.register_regular_object(
						object,
						name_key,
						enclosing_namespace,
					)?),
					Some(logical_type) => {
						if let Some(outer) = will_have_logical_type {
							return Err(SchemaError::invalid_schema(format!(
								"immediately-nested logical types: {logical_type:?} in {outer:?}"
							)));
						}
						let inner = self.register_node(
							&object.type_,
							enclosing_namespace,
							Some(logical_type),
						)?;
						let mut node = self.nodes[inner.idx].clone();
						node.logical_type = Some(parse_logical_type(logical_type, object)?);
						super::logical::validate_pairing(&node)
							.map_err(|e| SchemaError::invalid_schema(e.to_string()))?;
						node
					}
				};
				self.nodes[idx] = new_node;
				SchemaKey::from_idx(idx)
			}
		})
	}

	fn register_regular_object(
		&mut self,
		object: &'a raw::SchemaNodeObject<'a>,
		name_key: Option<NameKey<'a>>,
		enclosing_namespace: Option<&'a str>,
	) -> Result<SchemaType, SchemaError> {
		let missing = |field: &str, kind: &str| {
			SchemaError::invalid_schema(format!("missing field `{field}` on type `{kind}`"))
		};
		let named = |kind: &str| -> Result<(Name, NameKey<'a>), SchemaError> {
			let key = name_key.ok_or_else(|| {
				SchemaError::invalid_schema(format!("missing name for type `{kind}`"))
			})?;
			Ok((key.to_name(), key))
		};
		let aliases = |key: NameKey<'a>| -> Vec<Name> {
			object
				.aliases
				.iter()
				.flatten()
				.map(|alias| {
					let (ns, local) = split_name(alias);
					Name::from_parts(ns.or(key.namespace), local)
				})
				.collect()
		};

		Ok(match &object.type_ {
			raw::SchemaNode::Type(raw::Type::Array) => {
				let items_raw = object.items.as_deref().ok_or_else(|| missing("items", "array"))?;
				SchemaType::Array(Array {
					items: self.register_node(items_raw, enclosing_namespace, None)?,
				})
			}
			raw::SchemaNode::Type(raw::Type::Map) => {
				let values_raw = object.values.as_deref().ok_or_else(|| missing("values", "map"))?;
				SchemaType::Map(Map {
					values: self.register_node(values_raw, enclosing_namespace, None)?,
				})
			}
			raw::SchemaNode::Type(raw::Type::Enum) => {
				let (name, key) = named("enum")?;
				let symbols: Vec<String> = object
					.symbols
					.as_ref()
					.ok_or_else(|| missing("symbols", "enum"))?
					.iter()
					.map(|s| s.clone().into_owned())
					.collect();
				SchemaType::Enum(Enum {
					default: match &object.default {
						None => None,
						Some(serde_json::Value::String(s)) => Some(s.clone()),
						Some(_) => {
							return Err(SchemaError::invalid_schema(
								"an enum's `default` must be a string naming one of its symbols",
							))
						}
					},
					aliases: aliases(key),
					doc: object.doc.as_ref().map(|d| d.clone().into_owned()),
					name,
					symbols,
				})
			}
			raw::SchemaNode::Type(raw::Type::Fixed) => {
				let (name, key) = named("fixed")?;
				let size = object.size.ok_or_else(|| missing("size", "fixed"))?;
				SchemaType::Fixed(Fixed {
					aliases: aliases(key),
					name,
					size,
				})
			}
			raw::SchemaNode::Type(raw::Type::Record) => {
				let (name, key) = named("record")?;
				let raw_fields = object.fields.as_ref().ok_or_else(|| missing("fields", "record"))?;
				let mut fields = Vec::with_capacity(raw_fields.len());
				for raw_field in raw_fields {
					let type_ = self.register_node(&raw_field.type_, key.namespace, None)?;
					let default = match &raw_field.default {
						None => None,
						Some(v) => Some(DefaultValue::new(v.clone(), type_)),
					};
					fields.push(Field {
						name: raw_field.name.clone().into_owned(),
						type_,
						default,
						doc: raw_field.doc.as_ref().map(|d| d.clone().into_owned()),
					});
				}
				SchemaType::Record(Record {
					aliases: aliases(key),
					doc: object.doc.as_ref().map(|d| d.clone().into_owned()),
					name,
					fields,
				})
			}
			inner @ (raw::SchemaNode::Type(_)
			| raw::SchemaNode::Ref(_)
			| raw::SchemaNode::Object(_)
			| raw::SchemaNode::Union(_)) => {
				// `{"type": {"type": "string"}}` - an object whose only
				// meaningful key is `type` just defers entirely to the inner
				// node (possibly picking up an overridden namespace).
				let only_type_and_namespace = object.name.is_none()
					&& object.fields.is_none()
					&& object.symbols.is_none()
					&& object.items.is_none()
					&& object.values.is_none()
					&& object.size.is_none();
				if !only_type_and_namespace {
					return Err(SchemaError::invalid_schema(
						"unnecessarily-nested type with local properties that would be ignored",
					));
				}
				let ns = object
					.namespace
					.as_deref()
					.filter(|s| !s.is_empty())
					.or(enclosing_namespace);
				return Ok(self.nodes[self.register_node(inner, ns, None)?.idx].type_.clone());
			}
		})
	}
}

fn primitive_type(t: raw::Type) -> Result<SchemaType, SchemaError> {
	Ok(match t {
		raw::Type::Null => SchemaType::Null,
		raw::Type::Boolean => SchemaType::Boolean,
		raw::Type::Int => SchemaType::Int,
		raw::Type::Long => SchemaType::Long,
		raw::Type::Float => SchemaType::Float,
		raw::Type::Double => SchemaType::Double,
		raw::Type::Bytes => SchemaType::Bytes,
		raw::Type::String => SchemaType::String,
		complex => {
			return Err(SchemaError::invalid_schema(format!(
				"expected a primitive type name, but got `{complex:?}`, which is a complex \
					type and must be written as an object",
			)))
		}
	})
}

fn parse_logical_type(
	name: &str,
	object: &raw::SchemaNodeObject<'_>,
) -> Result<LogicalType, SchemaError> {
	let missing = |field_name: &str| -> SchemaError {
		SchemaError::invalid_schema(format!(
			"missing field `{field_name}` on logical type `{name}`"
		))
	};
	Ok(match name {
		"decimal" => {
			let precision = object.precision.ok_or_else(|| missing("precision"))?;
			LogicalType::Decimal(Decimal::new(precision, object.scale.unwrap_or(0))?)
		}
		"big-decimal" => LogicalType::BigDecimal,
		"uuid" => LogicalType::Uuid,
		"date" => LogicalType::Date,
		"time-millis" => LogicalType::TimeMillis,
		"time-micros" => LogicalType::TimeMicros,
		"timestamp-millis" => LogicalType::TimestampMillis,
		"timestamp-micros" => LogicalType::TimestampMicros,
		"duration" => LogicalType::Duration,
		unknown => LogicalType::Unknown(UnknownLogicalType::new(unknown)),
	})
}

mod raw {
	use serde::de::*;
	use std::borrow::Cow;

	pub(super) enum SchemaNode<'a> {
		Type(Type),
		Ref(Cow<'a, str>),
		Object(Box<SchemaNodeObject<'a>>),
		Union(Vec<SchemaNode<'a>>),
	}

	#[derive(serde_derive::Deserialize, Clone, Copy, Debug)]
	#[serde(rename_all = "kebab-case")]
	pub(super) enum Type {
		Null,
		Boolean,
		Int,
		Long,
		Float,
		Double,
		Bytes,
		String,
		Array,
		Map,
		Record,
		Enum,
		Fixed,
	}

	#[derive(serde_derive::Deserialize)]
	#[serde(rename_all = "camelCase")]
	#[serde(bound = "'a: 'de, 'de: 'a")]
	pub(super) struct SchemaNodeObject<'a> {
		#[serde(rename = "type")]
		pub(super) type_: SchemaNode<'a>,
		pub(super) logical_type: Option<Cow<'a, str>>,
		pub(super) name: Option<Cow<'a, str>>,
		pub(super) namespace: Option<Cow<'a, str>>,
		pub(super) aliases: Option<Vec<Cow<'a, str>>>,
		pub(super) doc: Option<Cow<'a, str>>,
		pub(super) fields: Option<Vec<Field<'a>>>,
		pub(super) symbols: Option<Vec<Cow<'a, str>>>,
		pub(super) default: Option<serde_json::Value>,
		pub(super) items: Option<Box<SchemaNode<'a>>>,
		pub(super) values: Option<Box<SchemaNode<'a>>>,
		pub(super) size: Option<usize>,
		pub(super) precision: Option<usize>,
		pub(super) scale: Option<u32>,
	}

	#[derive(serde_derive::Deserialize)]
	#[serde(bound = "'a: 'de")]
	pub(super) struct Field<'a> {
		pub(super) name: Cow<'a, str>,
		#[serde(rename = "type")]
		pub(super) type_: SchemaNode<'a>,
		pub(super) default: Option<serde_json::Value>,
		pub(super) doc: Option<Cow<'a, str>>,
	}

	impl<'de> Deserialize<'de> for SchemaNode<'de> {
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			struct V;
			impl<'de> Visitor<'de> for V {
				type Value = SchemaNode<'de>;

				fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
					write!(
						f,
						"a string (type name or reference), an object with a `type` field, \
							or an array (union)"
					)
				}

				fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
				where
					A: MapAccess<'de>,
				{
					Ok(SchemaNode::Object(Deserialize::deserialize(
						serde::de::value::MapAccessDeserializer::new(map),
					)?))
				}

				fn visit_seq<A>(self, seq: A) -> Result<Self::Value, A::Error>
				where
					A: SeqAccess<'de>,
				{
					Ok(SchemaNode::Union(Deserialize::deserialize(
						serde::de::value::SeqAccessDeserializer::new(seq),
					)?))
				}

				fn visit_borrowed_str<E>(self, v: &'de str) -> Result<Self::Value, E>
				where
					E: Error,
				{
					Ok(
						match Type::deserialize(value::StrDeserializer::<Failed>::new(v)) {
							Ok(t) => SchemaNode::Type(t),
							Err(Failed) => SchemaNode::Ref(Cow::Borrowed(v)),
						},
					)
				}

				fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
				where
					E: Error,
				{
					Ok(
						match Type::deserialize(value::StrDeserializer::<Failed>::new(v)) {
							Ok(t) => SchemaNode::Type(t),
							Err(Failed) => SchemaNode::Ref(Cow::Owned(v.to_owned())),
						},
					)
				}
			}
			deserializer.deserialize_any(V)
		}
	}

	#[derive(thiserror::Error, Debug)]
	#[error("not a recognized primitive type name")]
	struct Failed;
	impl Error for Failed {
		fn custom<T: std::fmt::Display>(_msg: T) -> Self {
			Failed
		}
	}
}
