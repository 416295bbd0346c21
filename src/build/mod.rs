//! The Builder Framework (§4.3): compiles a [`crate::resolve::Reflect`]
//! resolution and a [`crate::schema::Schema`] node into a `Plan` — a
//! monomorphic closure that reads or writes exactly that host type against
//! exactly that schema node, with no further case dispatch once built.
//!
//! [`binary`] and [`json`] are the two concrete targets; see their module
//! docs for why they aren't unified behind one generic `Format` trait.

pub mod binary;
pub mod json;

use crate::schema::SchemaError;

/// Build-time failures (§7): schema/type mismatches discovered while
/// compiling a codec, as opposed to [`crate::wire::WireError`]s discovered
/// while running one.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
	#[error("{0}")]
	Schema(#[from] SchemaError),
	/// The schema node itself has no case that can handle it at all (a
	/// well-formed node this builder hasn't been taught to compile).
	#[error("unsupported schema (`{schema_kind}`): {reason}")]
	UnsupportedSchema { schema_kind: String, reason: String },
	/// The schema node is understood, but `type_name` can't be bound to it
	/// (e.g. a record field the host type has no member for and no default
	/// to fall back on).
	#[error("type `{type_name}` is unsupported here: {reason}")]
	UnsupportedType {
		type_name: &'static str,
		reason: String,
	},
	/// No case in this module accepted `type_name` against the given schema
	/// node; `reasons` collects why each one attempted refused, in the order
	/// they were tried, so a caller enabling `log` output can see exactly
	/// where the mismatch is.
	#[error("no case matched `{type_name}` against a `{schema_kind}` schema (tried: {reasons:?})")]
	NoMatchingCase {
		type_name: &'static str,
		schema_kind: String,
		reasons: Vec<String>,
	},
	#[error("`{type_name}` recursed past max_depth ({max_depth}); check for an unintended cycle")]
	DepthExceeded {
		type_name: &'static str,
		max_depth: usize,
	},
}

/// Build-time configuration, analogous to the teacher's
/// `DeserializerConfig`/`SerializerConfig`.
///
/// `SelectType` (§9) isn't a field here: it's inherently specific to one
/// polymorphic host type's own branch layout, so it's supplied at the
/// `UnionResolution::select` the hand-written `Reflect` impl for that type
/// returns, rather than as one crate-wide override.
#[derive(Clone, Debug)]
pub struct Options {
	/// Recursion guard for self-referential schemas (records/arrays/maps that
	/// contain themselves), checked on every nested `build_write`/`build_read`
	/// call. Grounded on the teacher's `AllowedDepth`.
	pub max_depth: usize,
	/// Refuses to build a plan that would read an array/map block count
	/// larger than this many items in one block, guarding against corrupt or
	/// hostile input claiming an enormous allocation up front. Grounded on
	/// the teacher's `DeserializerConfig::max_seq_size`.
	pub max_seq_size: usize,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			max_depth: 64,
			max_seq_size: 1_000_000_000,
		}
	}
}
