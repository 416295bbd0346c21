//! JSON case dispatch (§4.5, §4.6–§4.8): compiles a
//! [`Reflect`](crate::resolve::Reflect) resolution against a schema node into
//! a monomorphic closure operating on [`serde_json::Value`].
//!
//! This module duplicates the `(SchemaKey, TypeId)` forward-reference-cache
//! pattern from [`crate::build::binary`] rather than sharing a generic
//! `Format` trait with it (§4.6): a union's JSON wrapper is keyed by branch
//! *name*, never an index, and a record/array/map is a tree, not a byte
//! stream, so there's no block framing or stream position to thread through
//! a shared abstraction.

use super::{BuildError, Options};
use crate::resolve::{
	naming::{DefaultNameMatcher, NameMatcher},
	EnumResolution, PrimitiveKind, PrimitiveValue, RecordResolution, Reflect, TypeResolution,
	UnionResolution,
};
use crate::schema::{LogicalType, Schema, SchemaError, SchemaKey, SchemaType};
use crate::wire::{json as wire, WireError};

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

type WritePlan<T> = Rc<dyn Fn(&T, &mut serde_json::Value) -> Result<(), WireError>>;
type ReadPlan<T> = Rc<dyn Fn(&serde_json::Value) -> Result<T, WireError>>;

/// Build-time state for compiling JSON writers; see
/// [`crate::build::binary::SerBuildContext`] for the forward-reference
/// algorithm, which is identical here.
pub struct SerBuildContext {
	schema: Rc<Schema>,
	options: Rc<Options>,
	depth: usize,
	cache: HashMap<(SchemaKey, TypeId), Rc<dyn Any>>,
}

impl SerBuildContext {
	pub fn new(schema: Rc<Schema>, options: Rc<Options>) -> Self {
		Self {
			schema,
			options,
			depth: 0,
			cache: HashMap::new(),
		}
	}

	pub fn build_write<T: Reflect + 'static>(
		&mut self,
		key: SchemaKey,
	) -> Result<Box<dyn Fn(&T, &mut serde_json::Value) -> Result<(), WireError>>, BuildError> {
		let cache_key = (key, TypeId::of::<T>());
		if let Some(existing) = self.cache.get(&cache_key) {
			let cell = existing
				.clone()
				.downcast::<RefCell<Option<WritePlan<T>>>>()
				.expect("cache is keyed by TypeId::of::<T>(), so the stored cell always matches T");
			return Ok(Box::new(move |t: &T, sink: &mut serde_json::Value| {
				let plan = cell.borrow().clone().expect(
					"forward reference invoked before the build that created it finished \
					 (a cyclic schema whose only termination is a case that never completes)",
				);
				plan(t, sink)
			}));
		}

		let cell: Rc<RefCell<Option<WritePlan<T>>>> = Rc::new(RefCell::new(None));
		self.cache.insert(cache_key, cell.clone());

		let type_name = std::any::type_name::<T>();
		self.depth += 1;
		if self.depth > self.options.max_depth {
			self.depth -= 1;
			self.cache.remove(&cache_key);
			return Err(BuildError::DepthExceeded {
				type_name,
				max_depth: self.options.max_depth,
			});
		}
		let result = self.compile_write::<T>(key);
		self.depth -= 1;
		let plan = match result {
			Ok(plan) => plan,
			Err(e) => {
				self.cache.remove(&cache_key);
				return Err(e);
			}
		};
		*cell.borrow_mut() = Some(plan.clone());
		Ok(Box::new(move |t: &T, sink: &mut serde_json::Value| plan(t, sink)))
	}

	fn node(&self, key: SchemaKey) -> Result<crate::schema::SchemaNode, BuildError> {
		self.schema
			.get(key)
			.cloned()
			.ok_or_else(|| BuildError::Schema(SchemaError::invalid_schema("schema key refers to no node")))
	}

	/// The schema this context is compiling against, for `Reflect` impls
	/// (e.g. [`Option`]'s) that need to inspect a union node themselves
	/// rather than through one of the `compile_*` cases above.
	pub fn schema(&self) -> &Schema {
		&self.schema
	}

	fn compile_write<T: Reflect + 'static>(&mut self, key: SchemaKey) -> Result<WritePlan<T>, BuildError> {
		match T::resolve() {
			TypeResolution::Primitive(p) => self.compile_primitive_write(p, key),
			TypeResolution::Enum(e) => self.compile_enum_write(e, key),
			TypeResolution::Array(a) => {
				let node = self.node(key)?;
				let SchemaType::Array(array) = &node.type_ else {
					return Err(case_mismatch::<T>(node.type_.kind_name(), "expected an array schema"));
				};
				Ok(Rc::from((a.build_write_json)(self, array.items)?))
			}
			TypeResolution::Map(m) => {
				let node = self.node(key)?;
				let SchemaType::Map(map) = &node.type_ else {
					return Err(case_mismatch::<T>(node.type_.kind_name(), "expected a map schema"));
				};
				Ok(Rc::from((m.build_write_json)(self, map.values)?))
			}
			TypeResolution::Nullable(n) => Ok(Rc::from((n.build_write_json)(self, key)?)),
			TypeResolution::Record(r) => self.compile_record_write(r, key),
			TypeResolution::Union(u) => self.compile_union_write(u, key),
		}
	}

	fn compile_primitive_write<T: 'static>(
		&mut self,
		p: crate::resolve::PrimitiveResolution<T>,
		key: SchemaKey,
	) -> Result<WritePlan<T>, BuildError> {
		let node = self.node(key)?;
		let get = p.get;
		match p.kind {
			PrimitiveKind::Boolean => {
				require::<T>(matches!(node.type_, SchemaType::Boolean), &node, "expected boolean")?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_bool(as_bool(get(t))?);
					Ok(())
				}))
			}
			PrimitiveKind::Signed { .. } | PrimitiveKind::Unsigned { .. } => match &node.type_ {
				SchemaType::Int => Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					let n = as_i64(get(t))?;
					let n32 = i32::try_from(n)
						.map_err(|_| WireError::out_of_range(format!("{n} does not fit in an int")))?;
					*sink = wire::write_int(n32);
					Ok(())
				})),
				SchemaType::Long => Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_long(as_i64(get(t))?);
					Ok(())
				})),
				other => Err(case_mismatch::<T>(other.kind_name(), "expected an int or long schema")),
			},
			PrimitiveKind::Float32 => {
				require::<T>(matches!(node.type_, SchemaType::Float), &node, "expected float")?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_float(as_f32(get(t))?);
					Ok(())
				}))
			}
			PrimitiveKind::Float64 => {
				require::<T>(matches!(node.type_, SchemaType::Double), &node, "expected double")?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_double(as_f64(get(t))?);
					Ok(())
				}))
			}
			PrimitiveKind::String | PrimitiveKind::Uri => {
				require::<T>(matches!(node.type_, SchemaType::String), &node, "expected string")?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_string(&as_string(get(t))?);
					Ok(())
				}))
			}
			PrimitiveKind::Guid => {
				require::<T>(
					matches!(node.type_, SchemaType::String) && matches!(node.logical_type, Some(LogicalType::Uuid)),
					&node,
					"expected a string schema with a uuid logical type",
				)?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_string(&as_guid(get(t))?.to_string());
					Ok(())
				}))
			}
			PrimitiveKind::Bytes => match &node.type_ {
				SchemaType::Bytes => Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_bytes(&as_bytes(get(t))?);
					Ok(())
				})),
				SchemaType::Fixed(fixed) => {
					let size = fixed.size;
					Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
						let bytes = as_bytes(get(t))?;
						if bytes.len() != size {
							return Err(WireError::out_of_range(format!(
								"fixed field of size {size} given {} bytes",
								bytes.len()
							)));
						}
						*sink = wire::write_bytes(&bytes);
						Ok(())
					}))
				}
				other => Err(case_mismatch::<T>(other.kind_name(), "expected bytes or fixed")),
			},
			PrimitiveKind::Decimal => {
				let (precision, scale, fixed_size) = decimal_shape(&node)?;
				let _ = precision;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					let bytes = encode_decimal(as_decimal(get(t))?, scale, fixed_size)?;
					*sink = wire::write_bytes(&bytes);
					Ok(())
				}))
			}
			PrimitiveKind::Date => {
				require_logical::<T>(&node, SchemaType::Int, LogicalType::Date, "date")?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_int(as_date(get(t))?);
					Ok(())
				}))
			}
			PrimitiveKind::TimeMillis => {
				require_logical::<T>(&node, SchemaType::Int, LogicalType::TimeMillis, "time-millis")?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_int(as_time_millis(get(t))?);
					Ok(())
				}))
			}
			PrimitiveKind::TimeMicros => {
				require_logical::<T>(&node, SchemaType::Long, LogicalType::TimeMicros, "time-micros")?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_long(as_time_micros(get(t))?);
					Ok(())
				}))
			}
			PrimitiveKind::TimestampMillis => {
				require_logical::<T>(&node, SchemaType::Long, LogicalType::TimestampMillis, "timestamp-millis")?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_long(as_timestamp_millis(get(t))?);
					Ok(())
				}))
			}
			PrimitiveKind::TimestampMicros => {
				require_logical::<T>(&node, SchemaType::Long, LogicalType::TimestampMicros, "timestamp-micros")?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					*sink = wire::write_long(as_timestamp_micros(get(t))?);
					Ok(())
				}))
			}
			PrimitiveKind::Duration => {
				let ok = matches!(&node.type_, SchemaType::Fixed(f) if f.size == 12)
					&& matches!(node.logical_type, Some(LogicalType::Duration));
				require::<T>(ok, &node, "expected a 12-byte fixed schema with a duration logical type")?;
				Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
					let (months, days, millis) = as_duration(get(t))?;
					let mut bytes = [0u8; 12];
					bytes[0..4].copy_from_slice(&months.to_le_bytes());
					bytes[4..8].copy_from_slice(&days.to_le_bytes());
					bytes[8..12].copy_from_slice(&millis.to_le_bytes());
					*sink = wire::write_bytes(&bytes);
					Ok(())
				}))
			}
		}
	}

	fn compile_enum_write<T: 'static>(
		&mut self,
		e: EnumResolution<T>,
		key: SchemaKey,
	) -> Result<WritePlan<T>, BuildError> {
		let node = self.node(key)?;
		let SchemaType::Enum(en) = &node.type_ else {
			return Err(case_mismatch::<T>(node.type_.kind_name(), "expected an enum schema"));
		};
		let matcher = DefaultNameMatcher;
		let type_name = std::any::type_name::<T>();
		let mut mapping = Vec::with_capacity(e.symbols.len());
		for (name, ordinal) in &e.symbols {
			let matched = en
				.symbols
				.iter()
				.find(|s| *s == name)
				.or_else(|| en.symbols.iter().find(|s| matcher.matches(s, name)))
				.ok_or_else(|| BuildError::UnsupportedType {
					type_name,
					reason: format!("host enum symbol `{name}` has no match among schema symbols {:?}", en.symbols),
				})?;
			mapping.push((*ordinal, matched.clone()));
		}
		let get_ordinal = e.get_ordinal;
		Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
			let ordinal = get_ordinal(t);
			let name = mapping
				.iter()
				.find(|(o, _)| *o == ordinal)
				.map(|(_, n)| n.as_str())
				.ok_or_else(|| WireError::invalid_encoding("host enum ordinal has no schema mapping"))?;
			*sink = wire::write_string(name);
			Ok(())
		}))
	}

	fn compile_record_write<T: 'static>(
		&mut self,
		r: RecordResolution<T>,
		key: SchemaKey,
	) -> Result<WritePlan<T>, BuildError> {
		let type_name = std::any::type_name::<T>();
		let node = self.node(key)?;
		let SchemaType::Record(record) = &node.type_ else {
			return Err(case_mismatch::<T>(node.type_.kind_name(), "expected a record schema"));
		};
		let matcher = DefaultNameMatcher;
		let mut members: Vec<Option<crate::resolve::NamedMember<T>>> =
			r.members.into_iter().map(Some).collect();

		#[allow(clippy::type_complexity)]
		let mut field_writers: Vec<
			Box<dyn Fn(&T, &mut serde_json::Map<String, serde_json::Value>) -> Result<(), WireError>>,
		> = Vec::with_capacity(record.fields.len());
		for field in &record.fields {
			let found = crate::resolve::naming::find_member_index(
				&matcher,
				members.iter().enumerate().filter_map(|(i, m)| m.as_ref().map(|m| (i, m))),
				&field.name,
			);
			match found {
				Some(idx) => {
					let member = members[idx].take().expect("find_member_index found it present");
					let write_any = (member.member.build_write_json)(self, field.type_)?;
					let get_any = member.member.get;
					let field_name = field.name.clone();
					field_writers.push(Box::new(move |t: &T, obj: &mut serde_json::Map<String, serde_json::Value>| {
						let value = get_any(t).ok_or_else(|| {
							WireError::invalid_encoding(format!("record field `{field_name}` unexpectedly absent"))
						})?;
						let mut v = serde_json::Value::Null;
						write_any(value, &mut v)?;
						obj.insert(field_name.clone(), v);
						Ok(())
					}));
				}
				None => match &field.default {
					Some(default) => {
						let value = encode_default_json(&self.schema, field.type_, default.json())?;
						let field_name = field.name.clone();
						field_writers.push(Box::new(move |_t: &T, obj: &mut serde_json::Map<String, serde_json::Value>| {
							obj.insert(field_name.clone(), value.clone());
							Ok(())
						}));
					}
					None => {
						return Err(BuildError::UnsupportedType {
							type_name,
							reason: format!(
								"no host member for record field `{}` and the field has no default",
								field.name
							),
						})
					}
				},
			}
		}
		Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
			let mut obj = serde_json::Map::with_capacity(field_writers.len());
			for write in &field_writers {
				write(t, &mut obj)?;
			}
			*sink = serde_json::Value::Object(obj);
			Ok(())
		}))
	}

	fn compile_union_write<T: 'static>(
		&mut self,
		u: UnionResolution<T>,
		key: SchemaKey,
	) -> Result<WritePlan<T>, BuildError> {
		let type_name = std::any::type_name::<T>();
		let node = self.node(key)?;
		let SchemaType::Union(union_node) = &node.type_ else {
			return Err(case_mismatch::<T>(node.type_.kind_name(), "expected a union schema"));
		};
		let branch_keys = union_node.branches.clone();

		struct CompiledBranch<T> {
			name: String,
			get: Box<dyn Fn(&T) -> Option<&dyn Any>>,
			write: crate::resolve::BoxedAnyWriteJson,
		}
		let mut compiled = Vec::with_capacity(u.branches.len());
		for member in u.branches {
			let schema_idx = branch_keys
				.iter()
				.position(|&k| branch_name(&self.schema, k) == member.name)
				.ok_or_else(|| BuildError::UnsupportedType {
					type_name,
					reason: format!("no union branch named `{}` in the schema", member.name),
				})?;
			let write = (member.member.build_write_json)(self, branch_keys[schema_idx])?;
			compiled.push(CompiledBranch {
				name: member.name,
				get: member.member.get,
				write,
			});
		}
		let host_names: Vec<String> = compiled.iter().map(|b| b.name.clone()).collect();
		let select = u.select;
		Ok(Rc::new(move |t: &T, sink: &mut serde_json::Value| {
			let refs: Vec<&str> = host_names.iter().map(String::as_str).collect();
			let selected = select(t, &refs).ok_or_else(|| {
				WireError::invalid_encoding("no union branch matched this value for write (SelectType returned none)")
			})?;
			let branch = compiled
				.get(selected)
				.ok_or_else(|| WireError::invalid_encoding("SelectType returned an out-of-range branch index"))?;
			let value = (branch.get)(t)
				.ok_or_else(|| WireError::invalid_encoding("selected union branch had no value to write"))?;
			let mut inner = serde_json::Value::Null;
			(branch.write)(value, &mut inner)?;
			*sink = wire::write_union(&branch.name, inner);
			Ok(())
		}))
	}
}

/// Build-time state for compiling readers; see [`SerBuildContext`].
pub struct DeBuildContext {
	schema: Rc<Schema>,
	options: Rc<Options>,
	depth: usize,
	cache: HashMap<(SchemaKey, TypeId), Rc<dyn Any>>,
}

impl DeBuildContext {
	pub fn new(schema: Rc<Schema>, options: Rc<Options>) -> Self {
		Self {
			schema,
			options,
			depth: 0,
			cache: HashMap::new(),
		}
	}

	pub fn build_read<T: Reflect + 'static>(
		&mut self,
		key: SchemaKey,
	) -> Result<Box<dyn Fn(&serde_json::Value) -> Result<T, WireError>>, BuildError> {
		let cache_key = (key, TypeId::of::<T>());
		if let Some(existing) = self.cache.get(&cache_key) {
			let cell = existing
				.clone()
				.downcast::<RefCell<Option<ReadPlan<T>>>>()
				.expect("cache is keyed by TypeId::of::<T>(), so the stored cell always matches T");
			return Ok(Box::new(move |value: &serde_json::Value| {
				let plan = cell.borrow().clone().expect(
					"forward reference invoked before the build that created it finished \
					 (a cyclic schema whose only termination is a case that never completes)",
				);
				plan(value)
			}));
		}

		let cell: Rc<RefCell<Option<ReadPlan<T>>>> = Rc::new(RefCell::new(None));
		self.cache.insert(cache_key, cell.clone());

		let type_name = std::any::type_name::<T>();
		self.depth += 1;
		if self.depth > self.options.max_depth {
			self.depth -= 1;
			self.cache.remove(&cache_key);
			return Err(BuildError::DepthExceeded {
				type_name,
				max_depth: self.options.max_depth,
			});
		}
		let result = self.compile_read::<T>(key);
		self.depth -= 1;
		let plan = match result {
			Ok(plan) => plan,
			Err(e) => {
				self.cache.remove(&cache_key);
				return Err(e);
			}
		};
		*cell.borrow_mut() = Some(plan.clone());
		Ok(Box::new(move |value: &serde_json::Value| plan(value)))
	}

	fn node(&self, key: SchemaKey) -> Result<crate::schema::SchemaNode, BuildError> {
		self.schema
			.get(key)
			.cloned()
			.ok_or_else(|| BuildError::Schema(SchemaError::invalid_schema("schema key refers to no node")))
	}

	/// See [`SerBuildContext::schema`].
	pub fn schema(&self) -> &Schema {
		&self.schema
	}

	fn compile_read<T: Reflect + 'static>(&mut self, key: SchemaKey) -> Result<ReadPlan<T>, BuildError> {
		match T::resolve() {
			TypeResolution::Primitive(p) => self.compile_primitive_read(p, key),
			TypeResolution::Enum(e) => self.compile_enum_read(e, key),
			TypeResolution::Array(a) => {
				let node = self.node(key)?;
				let SchemaType::Array(array) = &node.type_ else {
					return Err(case_mismatch::<T>(node.type_.kind_name(), "expected an array schema"));
				};
				Ok(Rc::from((a.build_read_json)(self, array.items)?))
			}
			TypeResolution::Map(m) => {
				let node = self.node(key)?;
				let SchemaType::Map(map) = &node.type_ else {
					return Err(case_mismatch::<T>(node.type_.kind_name(), "expected a map schema"));
				};
				Ok(Rc::from((m.build_read_json)(self, map.values)?))
			}
			TypeResolution::Nullable(n) => Ok(Rc::from((n.build_read_json)(self, key)?)),
			TypeResolution::Record(r) => self.compile_record_read(r, key),
			TypeResolution::Union(u) => self.compile_union_read(u, key),
		}
	}

	fn compile_primitive_read<T: 'static>(
		&mut self,
		p: crate::resolve::PrimitiveResolution<T>,
		key: SchemaKey,
	) -> Result<ReadPlan<T>, BuildError> {
		let node = self.node(key)?;
		let make = Rc::new(p.make);
		match p.kind {
			PrimitiveKind::Boolean => {
				require::<T>(matches!(node.type_, SchemaType::Boolean), &node, "expected boolean")?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::Boolean(wire::read_bool(value)?))
				}))
			}
			PrimitiveKind::Signed { .. } | PrimitiveKind::Unsigned { .. } => match &node.type_ {
				SchemaType::Int => Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::Signed(wire::read_int(value)? as i64))
				})),
				SchemaType::Long => Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::Signed(wire::read_long(value)?))
				})),
				other => Err(case_mismatch::<T>(other.kind_name(), "expected an int or long schema")),
			},
			PrimitiveKind::Float32 => {
				require::<T>(matches!(node.type_, SchemaType::Float), &node, "expected float")?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::Float32(wire::read_float(value)?))
				}))
			}
			PrimitiveKind::Float64 => {
				require::<T>(matches!(node.type_, SchemaType::Double), &node, "expected double")?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::Float64(wire::read_double(value)?))
				}))
			}
			PrimitiveKind::String | PrimitiveKind::Uri => {
				require::<T>(matches!(node.type_, SchemaType::String), &node, "expected string")?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::String(wire::read_string(value)?))
				}))
			}
			PrimitiveKind::Guid => {
				require::<T>(
					matches!(node.type_, SchemaType::String) && matches!(node.logical_type, Some(LogicalType::Uuid)),
					&node,
					"expected a string schema with a uuid logical type",
				)?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					let s = wire::read_string(value)?;
					let uuid = uuid::Uuid::parse_str(&s)
						.map_err(|e| WireError::invalid_encoding(format!("invalid uuid string: {e}")))?;
					from_primitive(&make, PrimitiveValue::Guid(uuid))
				}))
			}
			PrimitiveKind::Bytes => match &node.type_ {
				SchemaType::Bytes => Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::Bytes(wire::read_bytes(value)?))
				})),
				SchemaType::Fixed(fixed) => {
					let size = fixed.size;
					Ok(Rc::new(move |value: &serde_json::Value| {
						let bytes = wire::read_bytes(value)?;
						if bytes.len() != size {
							return Err(WireError::out_of_range(format!(
								"fixed field of size {size} given {} bytes",
								bytes.len()
							)));
						}
						from_primitive(&make, PrimitiveValue::Bytes(bytes))
					}))
				}
				other => Err(case_mismatch::<T>(other.kind_name(), "expected bytes or fixed")),
			},
			PrimitiveKind::Decimal => {
				let (_precision, scale, _fixed_size) = decimal_shape(&node)?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					let bytes = wire::read_bytes(value)?;
					from_primitive(&make, PrimitiveValue::Decimal(decode_decimal(&bytes, scale)?))
				}))
			}
			PrimitiveKind::Date => {
				require_logical::<T>(&node, SchemaType::Int, LogicalType::Date, "date")?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::Date(wire::read_int(value)?))
				}))
			}
			PrimitiveKind::TimeMillis => {
				require_logical::<T>(&node, SchemaType::Int, LogicalType::TimeMillis, "time-millis")?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::TimeMillis(wire::read_int(value)?))
				}))
			}
			PrimitiveKind::TimeMicros => {
				require_logical::<T>(&node, SchemaType::Long, LogicalType::TimeMicros, "time-micros")?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::TimeMicros(wire::read_long(value)?))
				}))
			}
			PrimitiveKind::TimestampMillis => {
				require_logical::<T>(&node, SchemaType::Long, LogicalType::TimestampMillis, "timestamp-millis")?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::TimestampMillis(wire::read_long(value)?))
				}))
			}
			PrimitiveKind::TimestampMicros => {
				require_logical::<T>(&node, SchemaType::Long, LogicalType::TimestampMicros, "timestamp-micros")?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					from_primitive(&make, PrimitiveValue::TimestampMicros(wire::read_long(value)?))
				}))
			}
			PrimitiveKind::Duration => {
				let ok = matches!(&node.type_, SchemaType::Fixed(f) if f.size == 12)
					&& matches!(node.logical_type, Some(LogicalType::Duration));
				require::<T>(ok, &node, "expected a 12-byte fixed schema with a duration logical type")?;
				Ok(Rc::new(move |value: &serde_json::Value| {
					let bytes = wire::read_bytes(value)?;
					if bytes.len() != 12 {
						return Err(WireError::out_of_range("duration fixed value must be 12 bytes"));
					}
					let months = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
					let days = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
					let millis = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
					from_primitive(&make, PrimitiveValue::Duration(months, days, millis))
				}))
			}
		}
	}

	fn compile_enum_read<T: 'static>(
		&mut self,
		e: EnumResolution<T>,
		key: SchemaKey,
	) -> Result<ReadPlan<T>, BuildError> {
		let node = self.node(key)?;
		let SchemaType::Enum(en) = &node.type_ else {
			return Err(case_mismatch::<T>(node.type_.kind_name(), "expected an enum schema"));
		};
		let matcher = DefaultNameMatcher;
		let mut mapping: Vec<(String, u32)> = Vec::with_capacity(en.symbols.len());
		for symbol in &en.symbols {
			if let Some((_, ordinal)) = e
				.symbols
				.iter()
				.find(|(name, _)| name == symbol)
				.or_else(|| e.symbols.iter().find(|(name, _)| matcher.matches(symbol, name)))
			{
				mapping.push((symbol.clone(), *ordinal));
			}
		}
		let default_ordinal = en.default.as_ref().and_then(|default_symbol| {
			e.symbols
				.iter()
				.find(|(name, _)| name == default_symbol || matcher.matches(default_symbol, name))
				.map(|(_, ordinal)| *ordinal)
		});
		let from_ordinal = Rc::new(e.from_ordinal);
		Ok(Rc::new(move |value: &serde_json::Value| {
			let s = wire::read_string(value)?;
			let ordinal = mapping
				.iter()
				.find(|(name, _)| *name == s)
				.map(|(_, o)| *o)
				.or(default_ordinal)
				.ok_or_else(|| WireError::out_of_range(format!("enum symbol `{s}` has no host mapping or default")))?;
			from_ordinal(ordinal).map_err(WireError::invalid_encoding)
		}))
	}

	fn compile_record_read<T: 'static>(
		&mut self,
		r: RecordResolution<T>,
		key: SchemaKey,
	) -> Result<ReadPlan<T>, BuildError> {
		let node = self.node(key)?;
		let SchemaType::Record(record) = &node.type_ else {
			return Err(case_mismatch::<T>(node.type_.kind_name(), "expected a record schema"));
		};
		let matcher = DefaultNameMatcher;
		let member_count = r.members.len();
		let mapping: Vec<Option<usize>> = record
			.fields
			.iter()
			.map(|f| crate::resolve::naming::find_member_index(&matcher, r.members.iter().enumerate(), &f.name))
			.collect();

		struct FieldRead {
			member_idx: usize,
			field_name: String,
			read: crate::resolve::BoxedAnyReadJson,
			default: Option<Rc<serde_json::Value>>,
		}
		let mut members: Vec<Option<crate::resolve::NamedMember<T>>> =
			r.members.into_iter().map(Some).collect();
		let mut actions = Vec::with_capacity(record.fields.len());
		for (schema_idx, field) in record.fields.iter().enumerate() {
			// A schema field with no matching host member is simply absent
			// from the reconstructed `T`; unlike the binary codec there's no
			// stream position to skip past, so it's just never read.
			if let Some(m_idx) = mapping[schema_idx] {
				let member = members[m_idx].take().expect("mapping refers to each member at most once");
				let read = (member.member.build_read_json)(self, field.type_)?;
				let default = field.default.as_ref().map(|d| Rc::new(d.json().clone()));
				actions.push(FieldRead {
					member_idx: m_idx,
					field_name: field.name.clone(),
					read,
					default,
				});
			}
		}
		let construct = r.construct;
		Ok(Rc::new(move |value: &serde_json::Value| {
			let obj = value
				.as_object()
				.ok_or_else(|| WireError::invalid_json(format!("expected a JSON object, got {value}")))?;
			let mut values: Vec<Option<Box<dyn Any>>> = (0..member_count).map(|_| None).collect();
			for action in &actions {
				let parsed = match obj.get(&action.field_name) {
					Some(v) => (action.read)(v)?,
					None => {
						let default = action.default.as_deref().ok_or_else(|| {
							WireError::invalid_json(format!(
								"missing field `{}` and no default to fall back on",
								action.field_name
							))
						})?;
						(action.read)(default)?
					}
				};
				values[action.member_idx] = Some(parsed);
			}
			construct(values).map_err(WireError::invalid_encoding)
		}))
	}

	fn compile_union_read<T: 'static>(
		&mut self,
		u: UnionResolution<T>,
		key: SchemaKey,
	) -> Result<ReadPlan<T>, BuildError> {
		let type_name = std::any::type_name::<T>();
		let node = self.node(key)?;
		let SchemaType::Union(union_node) = &node.type_ else {
			return Err(case_mismatch::<T>(node.type_.kind_name(), "expected a union schema"));
		};
		let branch_keys = union_node.branches.clone();
		let branch_names: Vec<String> = branch_keys.iter().map(|&k| branch_name(&self.schema, k)).collect();

		let mut by_schema_idx: Vec<Option<(usize, crate::resolve::BoxedAnyReadJson)>> =
			(0..branch_keys.len()).map(|_| None).collect();
		for (host_idx, member) in u.branches.into_iter().enumerate() {
			let schema_idx = branch_names
				.iter()
				.position(|n| *n == member.name)
				.ok_or_else(|| BuildError::UnsupportedType {
					type_name,
					reason: format!("no union branch named `{}` in the schema", member.name),
				})?;
			let read = (member.member.build_read_json)(self, branch_keys[schema_idx])?;
			by_schema_idx[schema_idx] = Some((host_idx, read));
		}
		let from_branch = Rc::new(u.from_branch);
		Ok(Rc::new(move |value: &serde_json::Value| {
			let (name, inner) = wire::read_union(value)?;
			let schema_idx = branch_names
				.iter()
				.position(|n| n == name)
				.ok_or_else(|| WireError::invalid_json(format!("unknown union branch `{name}`")))?;
			let (host_idx, read) = by_schema_idx
				.get(schema_idx)
				.and_then(|o| o.as_ref())
				.ok_or_else(|| WireError::invalid_json(format!("union branch `{name}` is not host-mapped")))?;
			let parsed = read(inner)?;
			from_branch(*host_idx, parsed).map_err(WireError::invalid_encoding)
		}))
	}
}

fn case_mismatch<T>(schema_kind: &str, reason: &str) -> BuildError {
	BuildError::NoMatchingCase {
		type_name: std::any::type_name::<T>(),
		schema_kind: schema_kind.to_owned(),
		reasons: vec![reason.to_owned()],
	}
}

fn require<T>(ok: bool, node: &crate::schema::SchemaNode, reason: &str) -> Result<(), BuildError> {
	if ok {
		Ok(())
	} else {
		Err(case_mismatch::<T>(node.type_.kind_name(), reason))
	}
}

fn require_logical<T>(
	node: &crate::schema::SchemaNode,
	expected: SchemaType,
	expected_logical: LogicalType,
	label: &str,
) -> Result<(), BuildError> {
	let kind_ok = std::mem::discriminant(&node.type_) == std::mem::discriminant(&expected);
	let logical_ok = matches!(&node.logical_type, Some(l) if l.as_str() == expected_logical.as_str());
	require::<T>(kind_ok && logical_ok, node, &format!("expected a {label} schema"))
}

pub(crate) fn branch_name(schema: &Schema, key: SchemaKey) -> String {
	let node = &schema[key];
	match node.type_.name() {
		Some(name) => name.fully_qualified_name().to_owned(),
		None => node.type_.kind_name().to_owned(),
	}
}

/// Finds the null/non-null branch indices and the non-null branch's schema
/// key for a two-branch `[null, T]` union. Used by [`Option`]'s `Reflect`
/// impl, which needs this from outside `compile_write`/`compile_read` since
/// it alone knows how to produce `None` for an arbitrary `Inner`.
pub(crate) fn nullable_indices<T>(schema: &Schema, key: SchemaKey) -> Result<(usize, usize, SchemaKey), BuildError> {
	let node = &schema[key];
	let SchemaType::Union(union) = &node.type_ else {
		return Err(case_mismatch::<T>(node.type_.kind_name(), "expected a [null, T] union schema"));
	};
	if union.branches.len() != 2 {
		return Err(case_mismatch::<T>(
			"union",
			"a nullable host type only matches a two-branch [null, T] union",
		));
	}
	let null_idx = union
		.null_branch_idx(schema)
		.ok_or_else(|| case_mismatch::<T>("union", "expected one branch to be null"))?;
	let non_null_idx = 1 - null_idx;
	Ok((null_idx, non_null_idx, union.branches[non_null_idx]))
}

fn decimal_shape(node: &crate::schema::SchemaNode) -> Result<(usize, u32, Option<usize>), BuildError> {
	let Some(LogicalType::Decimal(d)) = &node.logical_type else {
		return Err(case_mismatch::<()>(node.type_.kind_name(), "expected a decimal logical type"));
	};
	let fixed_size = match &node.type_ {
		SchemaType::Bytes => None,
		SchemaType::Fixed(f) => Some(f.size),
		other => return Err(case_mismatch::<()>(other.kind_name(), "decimal must be on bytes or fixed")),
	};
	Ok((d.precision, d.scale, fixed_size))
}

fn encode_decimal(mut value: rust_decimal::Decimal, scale: u32, fixed_size: Option<usize>) -> Result<Vec<u8>, WireError> {
	value.rescale(scale);
	if value.scale() != scale {
		return Err(WireError::overflow(
			"decimal cannot be rescaled to the schema's scale without losing precision",
		));
	}
	let buf: [u8; 16] = value.mantissa().to_be_bytes();
	let start = minimal_start(&buf);
	match fixed_size {
		None => Ok(buf[start..].to_vec()),
		Some(size) => {
			let needed = buf.len() - start;
			if size >= needed {
				let pad_byte = if buf[0] & 0x80 != 0 { 0xFF } else { 0x00 };
				let mut out = vec![pad_byte; size - needed];
				out.extend_from_slice(&buf[start..]);
				Ok(out)
			} else {
				Err(WireError::overflow(format!("decimal does not fit in {size} bytes")))
			}
		}
	}
}

fn decode_decimal(bytes: &[u8], scale: u32) -> Result<rust_decimal::Decimal, WireError> {
	if bytes.len() > 16 {
		return Err(WireError::overflow("decimals larger than 16 bytes are not supported"));
	}
	let mut buf = [0u8; 16];
	let start = 16 - bytes.len();
	buf[start..].copy_from_slice(bytes);
	if bytes.first().is_some_and(|&b| b & 0x80 != 0) {
		for b in &mut buf[..start] {
			*b = 0xFF;
		}
	}
	let unscaled = i128::from_be_bytes(buf);
	rust_decimal::Decimal::try_from_i128_with_scale(unscaled, scale)
		.map_err(|e| WireError::invalid_encoding(format!("decimal out of range: {e}")))
}

fn minimal_start(buf: &[u8; 16]) -> usize {
	let mut i = 0;
	if buf[0] & 0x80 == 0 {
		while i + 1 < buf.len() && buf[i] == 0x00 && buf[i + 1] & 0x80 == 0 {
			i += 1;
		}
	} else {
		while i + 1 < buf.len() && buf[i] == 0xFF && buf[i + 1] & 0x80 != 0 {
			i += 1;
		}
	}
	i
}

/// Interprets a JSON default value against a schema node, producing the
/// exact JSON value that schema node would write for that value (wrapping
/// union branches, recursing into arrays/maps/records). Used once per
/// defaulted record field at build time (§3.4).
fn encode_default_json(schema: &Schema, key: SchemaKey, default: &serde_json::Value) -> Result<serde_json::Value, BuildError> {
	let node = schema.get(key).ok_or_else(|| BuildError::Schema(SchemaError::invalid_schema("bad schema key")))?;
	match &node.type_ {
		SchemaType::Null
		| SchemaType::Boolean
		| SchemaType::Int
		| SchemaType::Long
		| SchemaType::Float
		| SchemaType::Double
		| SchemaType::String
		| SchemaType::Bytes
		| SchemaType::Fixed(_)
		| SchemaType::Enum(_) => Ok(default.clone()),
		SchemaType::Array(a) => {
			let items = default
				.as_array()
				.ok_or_else(|| default_error("expected a JSON array default"))?;
			items
				.iter()
				.map(|item| encode_default_json(schema, a.items, item))
				.collect::<Result<Vec<_>, _>>()
				.map(serde_json::Value::Array)
		}
		SchemaType::Map(m) => {
			let obj = default
				.as_object()
				.ok_or_else(|| default_error("expected a JSON object default"))?;
			let mut out = serde_json::Map::with_capacity(obj.len());
			for (k, v) in obj {
				out.insert(k.clone(), encode_default_json(schema, m.values, v)?);
			}
			Ok(serde_json::Value::Object(out))
		}
		SchemaType::Union(u) => {
			let branch = *u
				.branches
				.first()
				.ok_or_else(|| default_error("union default requires at least one branch"))?;
			let inner = encode_default_json(schema, branch, default)?;
			Ok(wire::write_union(&branch_name(schema, branch), inner))
		}
		SchemaType::Record(r) => {
			let obj = default
				.as_object()
				.ok_or_else(|| default_error("expected a JSON object default"))?;
			let mut out = serde_json::Map::with_capacity(r.fields.len());
			for field in &r.fields {
				let value = obj.get(&field.name).or_else(|| field.default.as_ref().map(|d| d.json()));
				let value = value.ok_or_else(|| {
					default_error(format!("default record is missing field `{}`", field.name))
				})?;
				out.insert(field.name.clone(), encode_default_json(schema, field.type_, value)?);
			}
			Ok(serde_json::Value::Object(out))
		}
	}
}

fn default_error(reason: impl Into<String>) -> BuildError {
	BuildError::UnsupportedType {
		type_name: "<default value>",
		reason: reason.into(),
	}
}

fn as_bool(v: PrimitiveValue) -> Result<bool, WireError> {
	match v {
		PrimitiveValue::Boolean(b) => Ok(b),
		_ => Err(WireError::invalid_encoding("expected a boolean primitive value")),
	}
}
fn as_i64(v: PrimitiveValue) -> Result<i64, WireError> {
	match v {
		PrimitiveValue::Signed(n) => Ok(n),
		PrimitiveValue::Unsigned(n) => {
			i64::try_from(n).map_err(|_| WireError::out_of_range(format!("{n} does not fit in an i64")))
		}
		_ => Err(WireError::invalid_encoding("expected an integral primitive value")),
	}
}
fn as_f32(v: PrimitiveValue) -> Result<f32, WireError> {
	match v {
		PrimitiveValue::Float32(f) => Ok(f),
		PrimitiveValue::Float64(f) => Ok(f as f32),
		_ => Err(WireError::invalid_encoding("expected a floating-point primitive value")),
	}
}
fn as_f64(v: PrimitiveValue) -> Result<f64, WireError> {
	match v {
		PrimitiveValue::Float64(f) => Ok(f),
		PrimitiveValue::Float32(f) => Ok(f as f64),
		_ => Err(WireError::invalid_encoding("expected a floating-point primitive value")),
	}
}
fn as_string(v: PrimitiveValue) -> Result<String, WireError> {
	match v {
		PrimitiveValue::String(s) => Ok(s),
		_ => Err(WireError::invalid_encoding("expected a string primitive value")),
	}
}
fn as_bytes(v: PrimitiveValue) -> Result<Vec<u8>, WireError> {
	match v {
		PrimitiveValue::Bytes(b) => Ok(b),
		_ => Err(WireError::invalid_encoding("expected a bytes primitive value")),
	}
}
fn as_guid(v: PrimitiveValue) -> Result<uuid::Uuid, WireError> {
	match v {
		PrimitiveValue::Guid(u) => Ok(u),
		_ => Err(WireError::invalid_encoding("expected a guid primitive value")),
	}
}
fn as_decimal(v: PrimitiveValue) -> Result<rust_decimal::Decimal, WireError> {
	match v {
		PrimitiveValue::Decimal(d) => Ok(d),
		_ => Err(WireError::invalid_encoding("expected a decimal primitive value")),
	}
}
fn as_date(v: PrimitiveValue) -> Result<i32, WireError> {
	match v {
		PrimitiveValue::Date(d) => Ok(d),
		_ => Err(WireError::invalid_encoding("expected a date primitive value")),
	}
}
fn as_time_millis(v: PrimitiveValue) -> Result<i32, WireError> {
	match v {
		PrimitiveValue::TimeMillis(t) => Ok(t),
		_ => Err(WireError::invalid_encoding("expected a time-millis primitive value")),
	}
}
fn as_time_micros(v: PrimitiveValue) -> Result<i64, WireError> {
	match v {
		PrimitiveValue::TimeMicros(t) => Ok(t),
		_ => Err(WireError::invalid_encoding("expected a time-micros primitive value")),
	}
}
fn as_timestamp_millis(v: PrimitiveValue) -> Result<i64, WireError> {
	match v {
		PrimitiveValue::TimestampMillis(t) => Ok(t),
		_ => Err(WireError::invalid_encoding("expected a timestamp-millis primitive value")),
	}
}
fn as_timestamp_micros(v: PrimitiveValue) -> Result<i64, WireError> {
	match v {
		PrimitiveValue::TimestampMicros(t) => Ok(t),
		_ => Err(WireError::invalid_encoding("expected a timestamp-micros primitive value")),
	}
}
fn as_duration(v: PrimitiveValue) -> Result<(u32, u32, u32), WireError> {
	match v {
		PrimitiveValue::Duration(months, days, millis) => Ok((months, days, millis)),
		_ => Err(WireError::invalid_encoding("expected a duration primitive value")),
	}
}

fn from_primitive<T>(
	make: &Rc<Box<dyn Fn(PrimitiveValue) -> Result<T, String>>>,
	v: PrimitiveValue,
) -> Result<T, WireError> {
	make(v).map_err(WireError::invalid_encoding)
}
