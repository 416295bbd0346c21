//! The abstract schema model: a recursive, name-resolving variant graph with
//! logical-type annotations.
//!
//! [`Schema`] stores every node of a schema in a flat arena ([`Vec`]) and
//! refers to children through [`SchemaKey`] indices rather than through Rust
//! references. This is what lets a [`Record`] field refer back to its
//! enclosing record (or any ancestor): the cycle is just an index pointing
//! backwards into the same `Vec`.

mod canonical;
mod default_value;
mod error;
mod logical;
mod parsing;

pub use {
	default_value::DefaultValue,
	error::SchemaError,
	logical::{Decimal, LogicalType, UnknownLogicalType},
};

use std::fmt;

/// An Avro schema.
///
/// Internally a flat arena of [`SchemaNode`]s, the first of which (index `0`)
/// is the root. Nodes refer to each other through [`SchemaKey`].
#[derive(Clone)]
pub struct Schema {
	nodes: Vec<SchemaNode>,
}

/// The location of a node within a [`Schema`].
///
/// Stable for the lifetime of the [`Schema`] it was obtained from (nodes are
/// never reordered or removed after construction).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaKey {
	idx: usize,
}

impl SchemaKey {
	pub const fn from_idx(idx: usize) -> Self {
		Self { idx }
	}
	pub const fn idx(self) -> usize {
		self.idx
	}
	pub const fn root() -> Self {
		Self { idx: 0 }
	}
}

impl fmt::Debug for SchemaKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&self.idx, f)
	}
}

impl std::ops::Index<SchemaKey> for Schema {
	type Output = SchemaNode;
	fn index(&self, key: SchemaKey) -> &SchemaNode {
		&self.nodes[key.idx]
	}
}

/// A single node of the schema graph.
#[derive(Clone, Debug)]
pub struct SchemaNode {
	pub type_: SchemaType,
	pub logical_type: Option<LogicalType>,
}

impl SchemaNode {
	pub fn new(type_: SchemaType) -> Self {
		Self {
			type_,
			logical_type: None,
		}
	}
	pub fn with_logical_type(type_: SchemaType, logical_type: LogicalType) -> Self {
		Self {
			type_,
			logical_type: Some(logical_type),
		}
	}
}

/// The "regular" (non-logical) shape of a [`SchemaNode`].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum SchemaType {
	Null,
	Boolean,
	Int,
	Long,
	Float,
	Double,
	Bytes,
	String,
	Array(Array),
	Map(Map),
	Union(Union),
	Record(Record),
	Enum(Enum),
	Fixed(Fixed),
}

impl SchemaType {
	pub fn name(&self) -> Option<&Name> {
		match self {
			SchemaType::Record(r) => Some(&r.name),
			SchemaType::Enum(e) => Some(&e.name),
			SchemaType::Fixed(f) => Some(&f.name),
			_ => None,
		}
	}

	/// A short tag used in error messages and case-refusal reasons.
	pub fn kind_name(&self) -> &'static str {
		match self {
			SchemaType::Null => "null",
			SchemaType::Boolean => "boolean",
			SchemaType::Int => "int",
			SchemaType::Long => "long",
			SchemaType::Float => "float",
			SchemaType::Double => "double",
			SchemaType::Bytes => "bytes",
			SchemaType::String => "string",
			SchemaType::Array(_) => "array",
			SchemaType::Map(_) => "map",
			SchemaType::Union(_) => "union",
			SchemaType::Record(_) => "record",
			SchemaType::Enum(_) => "enum",
			SchemaType::Fixed(_) => "fixed",
		}
	}
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Array {
	pub items: SchemaKey,
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Map {
	pub values: SchemaKey,
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Union {
	pub branches: Vec<SchemaKey>,
}

impl Union {
	/// Index of the (at most one) `null` branch, if any.
	pub fn null_branch_idx(&self, schema: &Schema) -> Option<usize> {
		self.branches
			.iter()
			.position(|&key| matches!(schema[key].type_, SchemaType::Null))
	}
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Record {
	pub name: Name,
	pub aliases: Vec<Name>,
	pub doc: Option<String>,
	pub fields: Vec<Field>,
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Field {
	pub name: String,
	pub type_: SchemaKey,
	pub default: Option<DefaultValue>,
	pub doc: Option<String>,
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Enum {
	pub name: Name,
	pub aliases: Vec<Name>,
	pub symbols: Vec<String>,
	pub default: Option<String>,
	pub doc: Option<String>,
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Fixed {
	pub name: Name,
	pub aliases: Vec<Name>,
	pub size: usize,
}

/// A name in the Avro sense: a local identifier plus an optional namespace.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Name {
	fully_qualified_name: String,
	namespace_delimiter_idx: Option<usize>,
}

impl fmt::Debug for Name {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&self.fully_qualified_name, f)
	}
}

impl Name {
	/// The rightmost component, e.g. in `a.b.c` it's `c`.
	pub fn name(&self) -> &str {
		match self.namespace_delimiter_idx {
			None => &self.fully_qualified_name,
			Some(idx) => &self.fully_qualified_name[idx + 1..],
		}
	}

	/// e.g. in `a.b.c` it's `a.b`.
	pub fn namespace(&self) -> Option<&str> {
		self.namespace_delimiter_idx
			.map(|idx| &self.fully_qualified_name[..idx])
	}

	/// e.g. `a.b.c`.
	pub fn fully_qualified_name(&self) -> &str {
		&self.fully_qualified_name
	}

	pub fn from_fully_qualified_name(fully_qualified_name: impl Into<String>) -> Self {
		let fully_qualified_name = fully_qualified_name.into();
		Self {
			namespace_delimiter_idx: fully_qualified_name.rfind('.'),
			fully_qualified_name,
		}
	}

	pub(crate) fn from_parts(namespace: Option<&str>, name: &str) -> Self {
		match namespace {
			None => Self {
				fully_qualified_name: name.to_owned(),
				namespace_delimiter_idx: None,
			},
			Some(namespace) => Self {
				fully_qualified_name: format!("{namespace}.{name}"),
				namespace_delimiter_idx: Some(namespace.len()),
			},
		}
	}
}

impl Schema {
	/// Build a schema from a pre-populated, already-validated node arena.
	///
	/// Prefer [`Schema::from_str`](std::str::FromStr) for schemas coming from
	/// JSON text; this is for programmatic construction.
	pub fn from_nodes(nodes: Vec<SchemaNode>) -> Result<Self, SchemaError> {
		let schema = Self { nodes };
		schema.validate()?;
		Ok(schema)
	}

	pub fn nodes(&self) -> &[SchemaNode] {
		&self.nodes
	}

	pub fn get(&self, key: SchemaKey) -> Option<&SchemaNode> {
		self.nodes.get(key.idx)
	}

	pub fn root_key(&self) -> SchemaKey {
		SchemaKey::root()
	}

	pub fn root(&self) -> &SchemaNode {
		&self[SchemaKey::root()]
	}

	/// Validate every invariant from §3.2: decimal bounds, duration fixed
	/// size, logical-type/underlying-type pairing, union shape.
	fn validate(&self) -> Result<(), SchemaError> {
		for (idx, node) in self.nodes.iter().enumerate() {
			let key = SchemaKey::from_idx(idx);
			logical::validate_pairing(node)?;
			if let SchemaType::Union(union) = &node.type_ {
				validate_union(self, union, key)?;
			}
			if let SchemaType::Fixed(fixed) = &node.type_ {
				if fixed.size == 0 && node.logical_type.is_none() {
					// zero-size fixed is legal Avro (if unusual); only reject
					// negative sizes, which the JSON parser already can't
					// produce (usize), so nothing further to check here.
					let _ = fixed;
				}
			}
		}
		Ok(())
	}
}

fn validate_union(schema: &Schema, union: &Union, at: SchemaKey) -> Result<(), SchemaError> {
	let mut seen_null = false;
	let mut seen_kinds: Vec<&str> = Vec::new();
	let mut seen_names: Vec<&str> = Vec::new();
	for &branch in &union.branches {
		let node = schema.get(branch).ok_or_else(|| {
			SchemaError::invalid_schema(format!("union at {at:?} references an unknown schema key"))
		})?;
		if matches!(node.type_, SchemaType::Union(_)) {
			return Err(SchemaError::invalid_schema(
				"a union may not directly contain another union",
			));
		}
		if matches!(node.type_, SchemaType::Null) {
			if seen_null {
				return Err(SchemaError::invalid_schema(
					"a union may contain at most one null branch",
				));
			}
			seen_null = true;
			continue;
		}
		if let Some(name) = node.type_.name() {
			let fqn = name.fully_qualified_name();
			if seen_names.contains(&fqn) {
				return Err(SchemaError::invalid_schema(format!(
					"union branches must be distinguishable by name, but `{fqn}` appears twice"
				)));
			}
			seen_names.push(fqn);
		} else {
			let kind = node.type_.kind_name();
			if seen_kinds.contains(&kind) {
				return Err(SchemaError::invalid_schema(format!(
					"union branches must be distinguishable, but two `{kind}` branches were found"
				)));
			}
			seen_kinds.push(kind);
		}
	}
	Ok(())
}

/// Structural equality, terminating on cyclic graphs.
///
/// Two schemas are equal iff their roots are equal under this definition:
/// same variant, same logical type, same children recursively, with named
/// types compared by full name once a pair of nodes has already been visited
/// (this is what makes the comparison terminate on records that refer back to
/// themselves).
impl PartialEq for Schema {
	fn eq(&self, other: &Self) -> bool {
		let mut visited = std::collections::HashSet::new();
		nodes_eq(
			self,
			self.root_key(),
			other,
			other.root_key(),
			&mut visited,
		)
	}
}
impl Eq for Schema {}

fn nodes_eq(
	a: &Schema,
	a_key: SchemaKey,
	b: &Schema,
	b_key: SchemaKey,
	visited: &mut std::collections::HashSet<(SchemaKey, SchemaKey)>,
) -> bool {
	if !visited.insert((a_key, b_key)) {
		// Already comparing this pair further up the call stack: assume
		// equal so the recursion terminates; if it turns out not to be, the
		// name check below (which doesn't recurse) still catches mismatches
		// for differently-named cycles.
		return true;
	}
	let (Some(an), Some(bn)) = (a.get(a_key), b.get(b_key)) else {
		return false;
	};
	if an.logical_type.as_ref().map(LogicalType::as_str)
		!= bn.logical_type.as_ref().map(LogicalType::as_str)
	{
		return false;
	}
	match (&an.type_, &bn.type_) {
		(SchemaType::Null, SchemaType::Null)
		| (SchemaType::Boolean, SchemaType::Boolean)
		| (SchemaType::Int, SchemaType::Int)
		| (SchemaType::Long, SchemaType::Long)
		| (SchemaType::Float, SchemaType::Float)
		| (SchemaType::Double, SchemaType::Double)
		| (SchemaType::Bytes, SchemaType::Bytes)
		| (SchemaType::String, SchemaType::String) => true,
		(SchemaType::Array(x), SchemaType::Array(y)) => {
			nodes_eq(a, x.items, b, y.items, visited)
		}
		(SchemaType::Map(x), SchemaType::Map(y)) => nodes_eq(a, x.values, b, y.values, visited),
		(SchemaType::Union(x), SchemaType::Union(y)) => {
			x.branches.len() == y.branches.len()
				&& x.branches
					.iter()
					.zip(&y.branches)
					.all(|(&xk, &yk)| nodes_eq(a, xk, b, yk, visited))
		}
		(SchemaType::Record(x), SchemaType::Record(y)) => {
			x.name == y.name
				&& x.fields.len() == y.fields.len()
				&& x.fields
					.iter()
					.zip(&y.fields)
					.all(|(xf, yf)| xf.name == yf.name && nodes_eq(a, xf.type_, b, yf.type_, visited))
		}
		(SchemaType::Enum(x), SchemaType::Enum(y)) => x.name == y.name && x.symbols == y.symbols,
		(SchemaType::Fixed(x), SchemaType::Fixed(y)) => x.name == y.name && x.size == y.size,
		_ => false,
	}
}

impl fmt::Debug for Schema {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt_node(self, self.root_key(), f, &mut Vec::new())
	}
}

fn fmt_node(
	schema: &Schema,
	key: SchemaKey,
	f: &mut fmt::Formatter<'_>,
	in_progress: &mut Vec<SchemaKey>,
) -> fmt::Result {
	let Some(node) = schema.get(key) else {
		return write!(f, "<invalid key {key:?}>");
	};
	if in_progress.contains(&key) {
		return match node.type_.name() {
			Some(name) => write!(f, "{} (cycle)", name.fully_qualified_name()),
			None => write!(f, "<cycle>"),
		};
	}
	in_progress.push(key);
	let res = (|| -> fmt::Result {
		match &node.type_ {
			SchemaType::Array(a) => {
				write!(f, "array<")?;
				fmt_node(schema, a.items, f, in_progress)?;
				write!(f, ">")
			}
			SchemaType::Map(m) => {
				write!(f, "map<string, ")?;
				fmt_node(schema, m.values, f, in_progress)?;
				write!(f, ">")
			}
			SchemaType::Union(u) => {
				write!(f, "[")?;
				for (i, &branch) in u.branches.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					fmt_node(schema, branch, f, in_progress)?;
				}
				write!(f, "]")
			}
			SchemaType::Record(r) => write!(f, "record {}", r.name.fully_qualified_name()),
			SchemaType::Enum(e) => write!(f, "enum {}", e.name.fully_qualified_name()),
			SchemaType::Fixed(fx) => write!(f, "fixed {}({})", fx.name.fully_qualified_name(), fx.size),
			other => write!(f, "{}", other.kind_name()),
		}
	})();
	in_progress.pop();
	res
}

impl std::str::FromStr for Schema {
	type Err = SchemaError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parsing::parse(s)
	}
}
