//! Type introspection (§4.2): mapping a concrete Rust type to a
//! [`TypeResolution`] the builder framework can drive without knowing the
//! type ahead of time.
//!
//! [`Reflect::resolve`] is called once per type during a build and its
//! result is not required to be cached by callers (callers are expected to
//! build once and share the compiled codec, per §5), but implementations
//! should keep it cheap and allocation-light regardless.

pub mod naming;

use crate::schema::SchemaKey;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};

/// Maps a host type to the shape the builder framework dispatches on.
pub trait Reflect: Sized + 'static {
	fn resolve() -> TypeResolution<Self>;
}

/// The result of resolving a host type (§4.2).
#[non_exhaustive]
pub enum TypeResolution<T> {
	Primitive(PrimitiveResolution<T>),
	Enum(EnumResolution<T>),
	Array(ArrayResolution<T>),
	Map(MapResolution<T>),
	Record(RecordResolution<T>),
	/// Wraps any of the above when the host type distinguishes "present"
	/// from "absent" (the blanket `Option<Inner>` impl below).
	Nullable(NullableResolution<T>),
	/// A host type whose concrete payload varies at runtime (an `enum` with
	/// more than one data-carrying variant); matched against a schema
	/// `union` with more than a `[null, T]` shape.
	Union(UnionResolution<T>),
}

/// The leaf scalar kinds, including the ones that only exist because a
/// logical type annotates them (guid, timestamp, duration, uri, decimal):
/// §4.2 lists these alongside boolean/integral/floating/string/bytes because
/// from the host type's perspective they *are* primitives — a `uuid::Uuid`
/// is no more "structured" a host type than an `i32` is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PrimitiveKind {
	Boolean,
	Signed { width: u8 },
	Unsigned { width: u8 },
	Float32,
	Float64,
	String,
	Bytes,
	Guid,
	Uri,
	Decimal,
	Date,
	TimeMillis,
	TimeMicros,
	TimestampMillis,
	TimestampMicros,
	Duration,
}

/// The value exchanged between a host type's `get`/`make` closures and a
/// builder case. One case handles several [`PrimitiveKind`]s when the wire
/// encoding coincides (e.g. every `Signed` width writes through `write_long`
/// after range-checking), so the case dispatches on `PrimitiveKind` but the
/// payload carries enough precision to range-check losslessly.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum PrimitiveValue {
	Boolean(bool),
	Signed(i64),
	Unsigned(u64),
	Float32(f32),
	Float64(f64),
	String(String),
	Bytes(Vec<u8>),
	Guid(uuid::Uuid),
	Decimal(rust_decimal::Decimal),
	/// (months, days, milliseconds), per §4.4's Duration encoding.
	Duration(u32, u32, u32),
	Date(i32),
	TimeMillis(i32),
	TimeMicros(i64),
	TimestampMillis(i64),
	TimestampMicros(i64),
}

pub struct PrimitiveResolution<T> {
	pub kind: PrimitiveKind,
	pub get: Box<dyn Fn(&T) -> PrimitiveValue>,
	pub make: Box<dyn Fn(PrimitiveValue) -> Result<T, String>>,
}

pub struct EnumResolution<T> {
	/// Ordered `(symbol name, ordinal)` pairs, matching host enum
	/// declaration order; matched against schema symbols by
	/// [`naming`]-aware case-insensitive name comparison.
	pub symbols: Vec<(String, u32)>,
	pub get_ordinal: Box<dyn Fn(&T) -> u32>,
	pub from_ordinal: Box<dyn Fn(u32) -> Result<T, String>>,
}

/// Unlike [`RecordResolution`]/[`UnionResolution`], an array's items all
/// share one type (`Item`, known concretely at the `Vec<Item>` impl site
/// below), so there's no need to erase per item: the whole collection's
/// write/read is built once, in terms of `T` itself, exactly like
/// [`NullableResolution`]. The closures are responsible for the block
/// framing (§4.4) / JSON array syntax (§6.3) as well as the per-item
/// recursion, since both are uniform across every array regardless of item
/// type.
pub struct ArrayResolution<T> {
	#[allow(clippy::type_complexity)]
	pub build_write_binary: Box<
		dyn Fn(
			&mut crate::build::binary::SerBuildContext,
			SchemaKey,
		) -> Result<Box<dyn Fn(&T, &mut Vec<u8>) -> Result<(), crate::wire::WireError>>, crate::build::BuildError>,
	>,
	#[allow(clippy::type_complexity)]
	pub build_read_binary: Box<
		dyn Fn(
			&mut crate::build::binary::DeBuildContext,
			SchemaKey,
		) -> Result<Box<dyn Fn(&mut dyn std::io::Read) -> Result<T, crate::wire::WireError>>, crate::build::BuildError>,
	>,
	#[allow(clippy::type_complexity)]
	pub build_write_json: Box<
		dyn Fn(
			&mut crate::build::json::SerBuildContext,
			SchemaKey,
		) -> Result<
			Box<dyn Fn(&T, &mut serde_json::Value) -> Result<(), crate::wire::WireError>>,
			crate::build::BuildError,
		>,
	>,
	#[allow(clippy::type_complexity)]
	pub build_read_json: Box<
		dyn Fn(
			&mut crate::build::json::DeBuildContext,
			SchemaKey,
		) -> Result<
			Box<dyn Fn(&serde_json::Value) -> Result<T, crate::wire::WireError>>,
			crate::build::BuildError,
		>,
	>,
}

/// Same rationale as [`ArrayResolution`]: one value type (`V`), so no
/// per-entry erasure is needed.
pub struct MapResolution<T> {
	#[allow(clippy::type_complexity)]
	pub build_write_binary: Box<
		dyn Fn(
			&mut crate::build::binary::SerBuildContext,
			SchemaKey,
		) -> Result<Box<dyn Fn(&T, &mut Vec<u8>) -> Result<(), crate::wire::WireError>>, crate::build::BuildError>,
	>,
	#[allow(clippy::type_complexity)]
	pub build_read_binary: Box<
		dyn Fn(
			&mut crate::build::binary::DeBuildContext,
			SchemaKey,
		) -> Result<Box<dyn Fn(&mut dyn std::io::Read) -> Result<T, crate::wire::WireError>>, crate::build::BuildError>,
	>,
	#[allow(clippy::type_complexity)]
	pub build_write_json: Box<
		dyn Fn(
			&mut crate::build::json::SerBuildContext,
			SchemaKey,
		) -> Result<
			Box<dyn Fn(&T, &mut serde_json::Value) -> Result<(), crate::wire::WireError>>,
			crate::build::BuildError,
		>,
	>,
	#[allow(clippy::type_complexity)]
	pub build_read_json: Box<
		dyn Fn(
			&mut crate::build::json::DeBuildContext,
			SchemaKey,
		) -> Result<
			Box<dyn Fn(&serde_json::Value) -> Result<T, crate::wire::WireError>>,
			crate::build::BuildError,
		>,
	>,
}

pub struct RecordResolution<T> {
	pub members: Vec<NamedMember<T>>,
	pub construct: Box<dyn Fn(Vec<Option<Box<dyn Any>>>) -> Result<T, String>>,
}

pub struct NamedMember<T> {
	pub name: String,
	pub aliases: Vec<String>,
	pub member: Member<T>,
}

/// A union whose payload genuinely varies by runtime branch (more than a
/// `[null, T]` shape). `select` implements the `SelectType` hook of §4.6/§9:
/// it is given the host type's own branch names, in the same order as
/// `branches` (i.e. host declaration order, not schema declaration order —
/// the builder re-maps the returned index against the schema itself), and
/// must report which one (if any) the value should be written as. Callers
/// may override matching beyond the default "first assignable" rule by
/// constructing [`UnionResolution`] with a custom `select`.
pub struct UnionResolution<T> {
	pub branches: Vec<NamedMember<T>>,
	pub select: Box<dyn Fn(&T, &[&str]) -> Option<usize>>,
	pub from_branch: Box<dyn Fn(usize, Box<dyn Any>) -> Result<T, String>>,
}

/// A sub-value of a host type `T` (an array item, a map value, a record
/// field, a union branch, ...) whose own concrete type is known only at the
/// point `Member::new` is called — by the time it's stored in a
/// [`RecordResolution`]/[`ArrayResolution`]/etc. it has been erased to `T`
/// so heterogeneous members (a record's differently-typed fields, a union's
/// differently-typed branches) can live in one `Vec`.
///
/// The `get`/`matches` closures return borrowed `&dyn Any`, never an owned
/// clone: erasing a reference is free. The `downcast_read` hook name mirrors
/// this — it's the deserializer's counterpart, producing an owned, still
/// type-erased value that the record/union `construct`/`from_branch` closure
/// (written at the same call site that knows the concrete type) unwraps.
pub struct Member<T> {
	pub get: Box<dyn Fn(&T) -> Option<&dyn Any>>,
	pub build_write_binary: Box<
		dyn Fn(
			&mut crate::build::binary::SerBuildContext,
			SchemaKey,
		) -> Result<BoxedAnyWriteBinary, crate::build::BuildError>,
	>,
	pub build_read_binary: Box<
		dyn Fn(
			&mut crate::build::binary::DeBuildContext,
			SchemaKey,
		) -> Result<BoxedAnyReadBinary, crate::build::BuildError>,
	>,
	pub build_write_json: Box<
		dyn Fn(
			&mut crate::build::json::SerBuildContext,
			SchemaKey,
		) -> Result<BoxedAnyWriteJson, crate::build::BuildError>,
	>,
	pub build_read_json: Box<
		dyn Fn(
			&mut crate::build::json::DeBuildContext,
			SchemaKey,
		) -> Result<BoxedAnyReadJson, crate::build::BuildError>,
	>,
}

pub type BoxedAnyWriteBinary =
	Box<dyn Fn(&dyn Any, &mut Vec<u8>) -> Result<(), crate::wire::WireError>>;
pub type BoxedAnyReadBinary =
	Box<dyn Fn(&mut dyn std::io::Read) -> Result<Box<dyn Any>, crate::wire::WireError>>;
pub type BoxedAnyWriteJson =
	Box<dyn Fn(&dyn Any, &mut serde_json::Value) -> Result<(), crate::wire::WireError>>;
pub type BoxedAnyReadJson =
	Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn Any>, crate::wire::WireError>>;

impl<T: 'static> Member<T> {
	/// Build a `Member` whose concrete sub-type is `Inner`, given a way to
	/// borrow (`get`) it out of `&T`. `Inner` only needs to be named here;
	/// every field of the returned `Member` operates purely in terms of
	/// `T`/`dyn Any`.
	pub fn new<Inner: Reflect>(get: impl Fn(&T) -> Option<&Inner> + 'static) -> Self {
		Self {
			get: Box::new(move |t| get(t).map(|inner| inner as &dyn Any)),
			build_write_binary: Box::new(|ctx, schema_key| {
				let plan = ctx.build_write::<Inner>(schema_key)?;
				Ok(Box::new(move |value: &dyn Any, sink: &mut Vec<u8>| {
					let inner = value
						.downcast_ref::<Inner>()
						.expect("Member::get always erases exactly Inner");
					plan(inner, sink)
				}) as BoxedAnyWriteBinary)
			}),
			build_read_binary: Box::new(|ctx, schema_key| {
				let plan = ctx.build_read::<Inner>(schema_key)?;
				Ok(Box::new(move |source: &mut dyn std::io::Read| {
					plan(source).map(|v| Box::new(v) as Box<dyn Any>)
				}) as BoxedAnyReadBinary)
			}),
			build_write_json: Box::new(|ctx, schema_key| {
				let plan = ctx.build_write::<Inner>(schema_key)?;
				Ok(Box::new(move |value: &dyn Any, sink: &mut serde_json::Value| {
					let inner = value
						.downcast_ref::<Inner>()
						.expect("Member::get always erases exactly Inner");
					plan(inner, sink)
				}) as BoxedAnyWriteJson)
			}),
			build_read_json: Box::new(|ctx, schema_key| {
				let plan = ctx.build_read::<Inner>(schema_key)?;
				Ok(Box::new(move |value: &serde_json::Value| {
					plan(value).map(|v| Box::new(v) as Box<dyn Any>)
				}) as BoxedAnyReadJson)
			}),
		}
	}
}

/// A host-side millisecond-of-day; pairs with schema `time-millis`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDayMillis(pub i32);
/// A host-side microsecond-of-day; pairs with schema `time-micros`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDayMicros(pub i64);
/// Days since the Unix epoch; pairs with schema `date`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Date(pub i32);
/// A string that is specifically a URI. Avro has no `uri` logical type of
/// its own; this newtype exists only so a host type can opt into
/// `PrimitiveKind::Uri` instead of `PrimitiveKind::String` where that
/// distinction is useful to the host (both compile against a schema
/// `"string"` node identically).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Uri(pub String);
/// Milliseconds since the Unix epoch; pairs with schema `timestamp-millis`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampMillis(pub i64);
/// Microseconds since the Unix epoch; pairs with schema `timestamp-micros`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampMicros(pub i64);
/// A Gregorian (months, days, milliseconds) duration; pairs with schema
/// `duration`. Avro's duration has no sign, so negative components are
/// rejected at build/write time (§4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Duration {
	pub months: u32,
	pub days: u32,
	pub milliseconds: u32,
}

macro_rules! primitive_reflect {
	($ty:ty, $kind:expr, $get:expr, $make:expr) => {
		impl Reflect for $ty {
			fn resolve() -> TypeResolution<Self> {
				TypeResolution::Primitive(PrimitiveResolution {
					kind: $kind,
					get: Box::new($get),
					make: Box::new($make),
				})
			}
		}
	};
}

primitive_reflect!(
	bool,
	PrimitiveKind::Boolean,
	|v: &bool| PrimitiveValue::Boolean(*v),
	|v: PrimitiveValue| match v {
		PrimitiveValue::Boolean(b) => Ok(b),
		other => Err(format!("expected boolean, got {other:?}")),
	}
);

macro_rules! signed_reflect {
	($ty:ty) => {
		primitive_reflect!(
			$ty,
			PrimitiveKind::Signed {
				width: (std::mem::size_of::<$ty>() * 8) as u8
			},
			|v: &$ty| PrimitiveValue::Signed(*v as i64),
			|v: PrimitiveValue| match v {
				PrimitiveValue::Signed(n) => <$ty>::try_from(n)
					.map_err(|_| format!("{n} does not fit in a {}", stringify!($ty))),
				PrimitiveValue::Unsigned(n) => <$ty>::try_from(n)
					.map_err(|_| format!("{n} does not fit in a {}", stringify!($ty))),
				other => Err(format!("expected an integer, got {other:?}")),
			}
		);
	};
}
signed_reflect!(i8);
signed_reflect!(i16);
signed_reflect!(i32);
signed_reflect!(i64);

macro_rules! unsigned_reflect {
	($ty:ty) => {
		primitive_reflect!(
			$ty,
			PrimitiveKind::Unsigned {
				width: (std::mem::size_of::<$ty>() * 8) as u8
			},
			|v: &$ty| PrimitiveValue::Unsigned(*v as u64),
			|v: PrimitiveValue| match v {
				PrimitiveValue::Unsigned(n) => <$ty>::try_from(n)
					.map_err(|_| format!("{n} does not fit in a {}", stringify!($ty))),
				PrimitiveValue::Signed(n) => <$ty>::try_from(n)
					.map_err(|_| format!("{n} does not fit in a {}", stringify!($ty))),
				other => Err(format!("expected an integer, got {other:?}")),
			}
		);
	};
}
unsigned_reflect!(u8);
unsigned_reflect!(u16);
unsigned_reflect!(u32);
unsigned_reflect!(u64);

primitive_reflect!(
	f32,
	PrimitiveKind::Float32,
	|v: &f32| PrimitiveValue::Float32(*v),
	|v: PrimitiveValue| match v {
		PrimitiveValue::Float32(f) => Ok(f),
		PrimitiveValue::Float64(f) => Ok(f as f32),
		other => Err(format!("expected a float, got {other:?}")),
	}
);
primitive_reflect!(
	f64,
	PrimitiveKind::Float64,
	|v: &f64| PrimitiveValue::Float64(*v),
	|v: PrimitiveValue| match v {
		PrimitiveValue::Float64(f) => Ok(f),
		PrimitiveValue::Float32(f) => Ok(f as f64),
		other => Err(format!("expected a float, got {other:?}")),
	}
);
primitive_reflect!(
	String,
	PrimitiveKind::String,
	|v: &String| PrimitiveValue::String(v.clone()),
	|v: PrimitiveValue| match v {
		PrimitiveValue::String(s) => Ok(s),
		other => Err(format!("expected a string, got {other:?}")),
	}
);
primitive_reflect!(
	Uri,
	PrimitiveKind::Uri,
	|v: &Uri| PrimitiveValue::String(v.0.clone()),
	|v: PrimitiveValue| match v {
		PrimitiveValue::String(s) => Ok(Uri(s)),
		other => Err(format!("expected a uri, got {other:?}")),
	}
);
primitive_reflect!(
	Vec<u8>,
	PrimitiveKind::Bytes,
	|v: &Vec<u8>| PrimitiveValue::Bytes(v.clone()),
	|v: PrimitiveValue| match v {
		PrimitiveValue::Bytes(b) => Ok(b),
		other => Err(format!("expected bytes, got {other:?}")),
	}
);
primitive_reflect!(
	uuid::Uuid,
	PrimitiveKind::Guid,
	|v: &uuid::Uuid| PrimitiveValue::Guid(*v),
	|v: PrimitiveValue| match v {
		PrimitiveValue::Guid(u) => Ok(u),
		PrimitiveValue::String(s) => {
			uuid::Uuid::parse_str(&s).map_err(|e| format!("invalid uuid string: {e}"))
		}
		other => Err(format!("expected a uuid, got {other:?}")),
	}
);
primitive_reflect!(
	rust_decimal::Decimal,
	PrimitiveKind::Decimal,
	|v: &rust_decimal::Decimal| PrimitiveValue::Decimal(*v),
	|v: PrimitiveValue| match v {
		PrimitiveValue::Decimal(d) => Ok(d),
		other => Err(format!("expected a decimal, got {other:?}")),
	}
);
primitive_reflect!(
	Date,
	PrimitiveKind::Date,
	|v: &Date| PrimitiveValue::Date(v.0),
	|v: PrimitiveValue| match v {
		PrimitiveValue::Date(d) => Ok(Date(d)),
		other => Err(format!("expected a date, got {other:?}")),
	}
);
primitive_reflect!(
	TimeOfDayMillis,
	PrimitiveKind::TimeMillis,
	|v: &TimeOfDayMillis| PrimitiveValue::TimeMillis(v.0),
	|v: PrimitiveValue| match v {
		PrimitiveValue::TimeMillis(t) => Ok(TimeOfDayMillis(t)),
		other => Err(format!("expected a time-millis, got {other:?}")),
	}
);
primitive_reflect!(
	TimeOfDayMicros,
	PrimitiveKind::TimeMicros,
	|v: &TimeOfDayMicros| PrimitiveValue::TimeMicros(v.0),
	|v: PrimitiveValue| match v {
		PrimitiveValue::TimeMicros(t) => Ok(TimeOfDayMicros(t)),
		other => Err(format!("expected a time-micros, got {other:?}")),
	}
);
primitive_reflect!(
	TimestampMillis,
	PrimitiveKind::TimestampMillis,
	|v: &TimestampMillis| PrimitiveValue::TimestampMillis(v.0),
	|v: PrimitiveValue| match v {
		PrimitiveValue::TimestampMillis(t) => Ok(TimestampMillis(t)),
		other => Err(format!("expected a timestamp-millis, got {other:?}")),
	}
);
primitive_reflect!(
	TimestampMicros,
	PrimitiveKind::TimestampMicros,
	|v: &TimestampMicros| PrimitiveValue::TimestampMicros(v.0),
	|v: PrimitiveValue| match v {
		PrimitiveValue::TimestampMicros(t) => Ok(TimestampMicros(t)),
		other => Err(format!("expected a timestamp-micros, got {other:?}")),
	}
);
primitive_reflect!(
	Duration,
	PrimitiveKind::Duration,
	|v: &Duration| PrimitiveValue::Duration(v.months, v.days, v.milliseconds),
	|v: PrimitiveValue| match v {
		PrimitiveValue::Duration(months, days, milliseconds) => Ok(Duration {
			months,
			days,
			milliseconds,
		}),
		other => Err(format!("expected a duration, got {other:?}")),
	}
);

impl<Inner: Reflect> Reflect for Option<Inner> {
	fn resolve() -> TypeResolution<Self> {
		TypeResolution::Nullable(NullableResolution {
			// Each closure below receives the whole `[null, T]` union node's
			// schema key (not just the non-null branch's), since only this
			// impl — where `Inner` is concretely known — can produce `None`
			// or tell it apart from `Some`.
			build_write_binary: Box::new(|ctx, union_key| {
				let (null_idx, non_null_idx, non_null_key) =
					crate::build::binary::nullable_indices::<Self>(ctx.schema(), union_key)?;
				let plan = ctx.build_write::<Inner>(non_null_key)?;
				Ok(Box::new(move |value: &Option<Inner>, sink: &mut Vec<u8>| match value {
					Some(inner) => {
						crate::wire::binary::write_long(sink, non_null_idx as i64);
						plan(inner, sink)
					}
					None => {
						crate::wire::binary::write_long(sink, null_idx as i64);
						Ok(())
					}
				}) as _)
			}),
			build_read_binary: Box::new(|ctx, union_key| {
				let (null_idx, _non_null_idx, non_null_key) =
					crate::build::binary::nullable_indices::<Self>(ctx.schema(), union_key)?;
				let plan = ctx.build_read::<Inner>(non_null_key)?;
				Ok(Box::new(move |source: &mut dyn std::io::Read| {
					let idx = usize::try_from(crate::wire::binary::read_long(source)?)
						.map_err(|_| crate::wire::WireError::out_of_range("negative union branch index"))?;
					if idx == null_idx {
						Ok(None)
					} else {
						plan(source).map(Some)
					}
				}) as _)
			}),
			build_write_json: Box::new(|ctx, union_key| {
				let (_null_idx, _non_null_idx, non_null_key) =
					crate::build::json::nullable_indices::<Self>(ctx.schema(), union_key)?;
				let non_null_name = crate::build::json::branch_name(ctx.schema(), non_null_key);
				let plan = ctx.build_write::<Inner>(non_null_key)?;
				Ok(Box::new(move |value: &Option<Inner>, sink: &mut serde_json::Value| match value {
					Some(inner) => {
						let mut payload = serde_json::Value::Null;
						plan(inner, &mut payload)?;
						*sink = crate::wire::json::write_union(&non_null_name, payload);
						Ok(())
					}
					None => {
						*sink = crate::wire::json::write_null();
						Ok(())
					}
				}) as _)
			}),
			build_read_json: Box::new(|ctx, union_key| {
				let (_null_idx, _non_null_idx, non_null_key) =
					crate::build::json::nullable_indices::<Self>(ctx.schema(), union_key)?;
				let non_null_name = crate::build::json::branch_name(ctx.schema(), non_null_key);
				let plan = ctx.build_read::<Inner>(non_null_key)?;
				Ok(Box::new(move |value: &serde_json::Value| {
					if value.is_null() {
						return Ok(None);
					}
					let (name, inner) = crate::wire::json::read_union(value)?;
					if name != non_null_name {
						return Err(crate::wire::WireError::invalid_json(format!(
							"unknown union branch `{name}` for a nullable value"
						)));
					}
					plan(inner).map(Some)
				}) as _)
			}),
		})
	}
}

/// Carries the closures for `Nullable`'s one data-bearing branch. Unlike
/// [`Member`] this isn't erased to `dyn Any`: `T` (e.g. `Option<i32>`)
/// already names its own inner type, so the closures below can stay
/// concretely typed in `T` — `Inner` only appears inside their bodies.
///
/// Each closure is handed the schema key of the whole `[null, T]` union
/// node, not just the non-null branch: telling presence apart from absence
/// means reading or writing the union's branch index, and only the
/// concrete `Reflect` impl (which alone knows how to produce `None`) can
/// do that — `compile_write`/`compile_read` just delegate here unchanged.
pub struct NullableResolution<T> {
	#[allow(clippy::type_complexity)]
	pub build_write_binary: Box<
		dyn Fn(
			&mut crate::build::binary::SerBuildContext,
			SchemaKey,
		) -> Result<Box<dyn Fn(&T, &mut Vec<u8>) -> Result<(), crate::wire::WireError>>, crate::build::BuildError>,
	>,
	#[allow(clippy::type_complexity)]
	pub build_read_binary: Box<
		dyn Fn(
			&mut crate::build::binary::DeBuildContext,
			SchemaKey,
		) -> Result<Box<dyn Fn(&mut dyn std::io::Read) -> Result<T, crate::wire::WireError>>, crate::build::BuildError>,
	>,
	#[allow(clippy::type_complexity)]
	pub build_write_json: Box<
		dyn Fn(
			&mut crate::build::json::SerBuildContext,
			SchemaKey,
		) -> Result<
			Box<dyn Fn(&T, &mut serde_json::Value) -> Result<(), crate::wire::WireError>>,
			crate::build::BuildError,
		>,
	>,
	#[allow(clippy::type_complexity)]
	pub build_read_json: Box<
		dyn Fn(
			&mut crate::build::json::DeBuildContext,
			SchemaKey,
		) -> Result<
			Box<dyn Fn(&serde_json::Value) -> Result<T, crate::wire::WireError>>,
			crate::build::BuildError,
		>,
	>,
}

impl<Item: Reflect> Reflect for Vec<Item> {
	fn resolve() -> TypeResolution<Self> {
		TypeResolution::Array(ArrayResolution {
			build_write_binary: Box::new(|ctx, schema_key| {
				let item_plan = ctx.build_write::<Item>(schema_key)?;
				Ok(Box::new(move |v: &Vec<Item>, sink: &mut Vec<u8>| {
					if !v.is_empty() {
						crate::wire::binary::write_block_count(sink, v.len());
						for item in v {
							item_plan(item, sink)?;
						}
					}
					crate::wire::binary::write_end_of_blocks(sink);
					Ok(())
				}) as _)
			}),
			build_read_binary: Box::new(|ctx, schema_key| {
				let max_seq_size = ctx.options().max_seq_size;
				let item_plan = ctx.build_read::<Item>(schema_key)?;
				Ok(Box::new(move |source: &mut dyn std::io::Read| {
					let mut items = Vec::new();
					loop {
						let count = crate::wire::binary::read_block_count(source)?;
						if count == 0 {
							break;
						}
						if count > max_seq_size {
							return Err(crate::wire::WireError::out_of_range(format!(
								"array block count {count} exceeds max_seq_size ({max_seq_size})"
							)));
						}
						for _ in 0..count {
							items.push(item_plan(source)?);
						}
					}
					Ok(items)
				}) as _)
			}),
			build_write_json: Box::new(|ctx, schema_key| {
				let item_plan = ctx.build_write::<Item>(schema_key)?;
				Ok(Box::new(move |v: &Vec<Item>, sink: &mut serde_json::Value| {
					let mut out = Vec::with_capacity(v.len());
					for item in v {
						let mut item_value = serde_json::Value::Null;
						item_plan(item, &mut item_value)?;
						out.push(item_value);
					}
					*sink = serde_json::Value::Array(out);
					Ok(())
				}) as _)
			}),
			build_read_json: Box::new(|ctx, schema_key| {
				let item_plan = ctx.build_read::<Item>(schema_key)?;
				Ok(Box::new(move |value: &serde_json::Value| {
					let arr = value.as_array().ok_or_else(|| {
						crate::wire::WireError::invalid_json(format!("expected JSON array, got {value}"))
					})?;
					arr.iter().map(&item_plan).collect()
				}) as _)
			}),
		})
	}
}

macro_rules! string_keyed_map_reflect {
	($ty:ident) => {
		impl<V: Reflect> Reflect for $ty<String, V> {
			fn resolve() -> TypeResolution<Self> {
				TypeResolution::Map(MapResolution {
					build_write_binary: Box::new(|ctx, schema_key| {
						let value_plan = ctx.build_write::<V>(schema_key)?;
						Ok(Box::new(move |m: &Self, sink: &mut Vec<u8>| {
							if !m.is_empty() {
								crate::wire::binary::write_block_count(sink, m.len());
								for (k, v) in m {
									crate::wire::binary::write_string(sink, k);
									value_plan(v, sink)?;
								}
							}
							crate::wire::binary::write_end_of_blocks(sink);
							Ok(())
						}) as _)
					}),
					build_read_binary: Box::new(|ctx, schema_key| {
						let max_seq_size = ctx.options().max_seq_size;
						let value_plan = ctx.build_read::<V>(schema_key)?;
						Ok(Box::new(move |source: &mut dyn std::io::Read| {
							let mut map = Self::new();
							loop {
								let count = crate::wire::binary::read_block_count(source)?;
								if count == 0 {
									break;
								}
								if count > max_seq_size {
									return Err(crate::wire::WireError::out_of_range(format!(
										"map block count {count} exceeds max_seq_size ({max_seq_size})"
									)));
								}
								for _ in 0..count {
									let key = crate::wire::binary::read_string(source)?;
									let value = value_plan(source)?;
									map.insert(key, value);
								}
							}
							Ok(map)
						}) as _)
					}),
					build_write_json: Box::new(|ctx, schema_key| {
						let value_plan = ctx.build_write::<V>(schema_key)?;
						Ok(Box::new(move |m: &Self, sink: &mut serde_json::Value| {
							let mut obj = serde_json::Map::with_capacity(m.len());
							for (k, v) in m {
								let mut value = serde_json::Value::Null;
								value_plan(v, &mut value)?;
								obj.insert(k.clone(), value);
							}
							*sink = serde_json::Value::Object(obj);
							Ok(())
						}) as _)
					}),
					build_read_json: Box::new(|ctx, schema_key| {
						let value_plan = ctx.build_read::<V>(schema_key)?;
						Ok(Box::new(move |value: &serde_json::Value| {
							let obj = value.as_object().ok_or_else(|| {
								crate::wire::WireError::invalid_json(format!(
									"expected JSON object, got {value}"
								))
							})?;
							obj.iter()
								.map(|(k, v)| Ok((k.clone(), value_plan(v)?)))
								.collect()
						}) as _)
					}),
				})
			}
		}
	};
}
string_keyed_map_reflect!(HashMap);
string_keyed_map_reflect!(BTreeMap);
