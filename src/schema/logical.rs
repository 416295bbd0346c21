use super::{SchemaError, SchemaNode, SchemaType};

/// A logical type annotation (§3.3).
///
/// Unknown logical types are preserved as [`LogicalType::Unknown`] rather
/// than rejected: per §7, "unknown logical types are silently downgraded to
/// their underlying primitive" at build time, but the schema model still
/// remembers the annotation (e.g. for round-tripping the schema JSON).
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum LogicalType {
	Decimal(Decimal),
	Date,
	Duration,
	TimeMillis,
	TimeMicros,
	TimestampMillis,
	TimestampMicros,
	Uuid,
	/// A decimal-on-bytes without a fixed precision/scale pair; a strict
	/// generalization of [`Decimal`] kept from the original Chr.Avro source
	/// family this spec traces back to.
	BigDecimal,
	Unknown(UnknownLogicalType),
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Decimal {
	pub precision: usize,
	pub scale: u32,
}

impl Decimal {
	pub fn new(precision: usize, scale: u32) -> Result<Self, SchemaError> {
		if precision == 0 {
			return Err(SchemaError::invalid_schema(
				"decimal precision must be greater than 0",
			));
		}
		if scale as usize > precision {
			return Err(SchemaError::invalid_schema(format!(
				"decimal scale ({scale}) must not exceed precision ({precision})"
			)));
		}
		Ok(Self { precision, scale })
	}
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct UnknownLogicalType {
	pub logical_type_name: String,
}

impl UnknownLogicalType {
	pub fn new(logical_type_name: impl Into<String>) -> Self {
		Self {
			logical_type_name: logical_type_name.into(),
		}
	}
}

impl LogicalType {
	/// The name used in schema JSON (e.g. `"decimal"`).
	pub fn as_str(&self) -> &str {
		match self {
			LogicalType::Decimal(_) => "decimal",
			LogicalType::Date => "date",
			LogicalType::Duration => "duration",
			LogicalType::TimeMillis => "time-millis",
			LogicalType::TimeMicros => "time-micros",
			LogicalType::TimestampMillis => "timestamp-millis",
			LogicalType::TimestampMicros => "timestamp-micros",
			LogicalType::Uuid => "uuid",
			LogicalType::BigDecimal => "big-decimal",
			LogicalType::Unknown(u) => &u.logical_type_name,
		}
	}
}

/// Enforce §3.2's logical-type/underlying-type pairing rules.
///
/// Unknown logical types are exempt (they attach to whatever primitive they
/// like; per §3.3 they're inert until someone understands them).
pub(super) fn validate_pairing(node: &SchemaNode) -> Result<(), SchemaError> {
	let Some(logical) = &node.logical_type else {
		return Ok(());
	};
	let ok = match logical {
		LogicalType::Decimal(_) | LogicalType::BigDecimal => {
			matches!(node.type_, SchemaType::Bytes | SchemaType::Fixed(_))
		}
		LogicalType::Duration => matches!(&node.type_, SchemaType::Fixed(f) if f.size == 12),
		LogicalType::Date | LogicalType::TimeMillis => matches!(node.type_, SchemaType::Int),
		LogicalType::TimeMicros
		| LogicalType::TimestampMillis
		| LogicalType::TimestampMicros => matches!(node.type_, SchemaType::Long),
		LogicalType::Uuid => matches!(node.type_, SchemaType::String),
		LogicalType::Unknown(_) => true,
	};
	if !ok {
		return Err(SchemaError::invalid_schema(format!(
			"logical type `{}` is not valid on a `{}` schema",
			logical.as_str(),
			node.type_.kind_name(),
		)));
	}
	Ok(())
}
