//! Object container files (Avro "data files"): a magic header, a metadata
//! record (schema + compression codec), a random 16-byte sync marker, and a
//! sequence of data blocks each terminated by that same sync marker.
//!
//! Grounded on the teacher's `object_container_file_encoding` module, minus
//! its `unsafe` self-referential `Reader` (the arena schema (§4.1) holds its
//! own `Rc<Schema>`, so there is no lifetime to fake here) and minus its
//! state-machine-typed block reader (we decompress one block at a time into
//! an owned buffer instead of layering a deserializer over a decoder over a
//! `Take`).

use crate::build::{self, BuildError, Options};
use crate::resolve::Reflect;
use crate::schema::{Schema, SchemaError};
use crate::wire::{binary as wire, WireError};
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::rc::Rc;

const MAGIC: [u8; 4] = [b'O', b'b', b'j', 1u8];

/// Caps the number of entries read out of the header metadata map, the same
/// safeguard the teacher applies (`max_seq_size = 1_000`) against a file
/// claiming an enormous metadata map before any of it has been validated.
const MAX_METADATA_ENTRIES: usize = 1_000;

/// The compression codec a block is written with.
///
/// Avro also defines `snappy`, `bzip2` and `xz` codecs; we only carry
/// `deflate` (the teacher's own default) since none of the other optional
/// compression crates are otherwise used anywhere in this crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompressionCodec {
	Null,
	#[cfg(feature = "deflate")]
	Deflate,
}

impl CompressionCodec {
	fn name(self) -> &'static str {
		match self {
			CompressionCodec::Null => "null",
			#[cfg(feature = "deflate")]
			CompressionCodec::Deflate => "deflate",
		}
	}

	fn from_name(name: &str) -> Result<Self, ObjectContainerFileError> {
		match name {
			"null" => Ok(CompressionCodec::Null),
			#[cfg(feature = "deflate")]
			"deflate" => Ok(CompressionCodec::Deflate),
			other => Err(ObjectContainerFileError::UnsupportedCodec(other.to_owned())),
		}
	}

	fn compress(self, data: &[u8]) -> Result<Vec<u8>, WireError> {
		match self {
			CompressionCodec::Null => Ok(data.to_vec()),
			#[cfg(feature = "deflate")]
			CompressionCodec::Deflate => {
				let mut enc = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
				enc.write_all(data)?;
				Ok(enc.finish()?)
			}
		}
	}

	fn decompress(self, data: &[u8]) -> Result<Vec<u8>, WireError> {
		match self {
			CompressionCodec::Null => Ok(data.to_vec()),
			#[cfg(feature = "deflate")]
			CompressionCodec::Deflate => {
				let mut out = Vec::new();
				flate2::read::DeflateDecoder::new(data).read_to_end(&mut out)?;
				Ok(out)
			}
		}
	}
}

/// Everything that can go wrong reading or writing an object container file.
#[derive(thiserror::Error, Debug)]
pub enum ObjectContainerFileError {
	#[error("input is not an avro object container file: header does not start with `Obj\\x01`")]
	NotAnObjectContainerFile,
	#[error("{0}")]
	Wire(#[from] WireError),
	#[error("{0}")]
	Schema(#[from] SchemaError),
	#[error("{0}")]
	Build(#[from] BuildError),
	#[error("unsupported compression codec `{0}`")]
	UnsupportedCodec(String),
	#[error("object container file header metadata is missing required key `{0}`")]
	MissingMetadataKey(&'static str),
	#[error("object container file header metadata is invalid: {0}")]
	InvalidMetadataValue(String),
	#[error("sync marker at end of block did not match the header's sync marker")]
	SyncMarkerMismatch,
}

fn write_metadata(out: &mut Vec<u8>, schema_json: &str, codec: CompressionCodec) {
	let entries: [(&str, &[u8]); 2] = [
		("avro.schema", schema_json.as_bytes()),
		("avro.codec", codec.name().as_bytes()),
	];
	wire::write_block_count(out, entries.len());
	for (key, value) in entries {
		wire::write_string(out, key);
		wire::write_bytes(out, value);
	}
	wire::write_end_of_blocks(out);
}

fn read_metadata<R: Read + ?Sized>(r: &mut R) -> Result<HashMap<String, Vec<u8>>, ObjectContainerFileError> {
	let mut map = HashMap::new();
	loop {
		let count = wire::read_block_count(r)?;
		if count == 0 {
			break;
		}
		if map.len() + count > MAX_METADATA_ENTRIES {
			return Err(ObjectContainerFileError::InvalidMetadataValue(format!(
				"metadata map exceeds {MAX_METADATA_ENTRIES} entries"
			)));
		}
		for _ in 0..count {
			let key = wire::read_string(r)?;
			let value = wire::read_bytes(r)?;
			map.insert(key, value);
		}
	}
	Ok(map)
}

/// Reads values of one fixed host type `T` out of an object container file.
///
/// `T`'s read plan is compiled once, in [`Reader::new`], against the schema
/// recorded in the file's own header metadata.
pub struct Reader<R, T> {
	reader: R,
	schema: Rc<Schema>,
	codec: CompressionCodec,
	sync_marker: [u8; 16],
	block: std::io::Cursor<Vec<u8>>,
	remaining_in_block: usize,
	plan: Box<dyn Fn(&mut dyn Read) -> Result<T, WireError>>,
}

impl<R: BufRead, T: Reflect + 'static> Reader<R, T> {
	pub fn new(mut reader: R) -> Result<Self, ObjectContainerFileError> {
		let mut magic = [0u8; 4];
		reader.read_exact(&mut magic)?;
		if magic != MAGIC {
			return Err(ObjectContainerFileError::NotAnObjectContainerFile);
		}

		let metadata = read_metadata(&mut reader)?;
		let schema_json = metadata
			.get("avro.schema")
			.ok_or(ObjectContainerFileError::MissingMetadataKey("avro.schema"))?;
		let schema_json = std::str::from_utf8(schema_json).map_err(|e| {
			ObjectContainerFileError::InvalidMetadataValue(format!("avro.schema is not UTF-8: {e}"))
		})?;
		let schema: Schema = schema_json.parse()?;

		let codec = match metadata.get("avro.codec") {
			None => CompressionCodec::Null,
			Some(bytes) => {
				let name = std::str::from_utf8(bytes).map_err(|e| {
					ObjectContainerFileError::InvalidMetadataValue(format!(
						"avro.codec is not UTF-8: {e}"
					))
				})?;
				CompressionCodec::from_name(name)?
			}
		};

		let mut sync_marker = [0u8; 16];
		reader.read_exact(&mut sync_marker)?;

		let schema = Rc::new(schema);
		let root = schema.root_key();
		let mut ctx = build::binary::DeBuildContext::new(schema.clone(), Rc::new(Options::default()));
		let plan = ctx.build_read::<T>(root)?;

		Ok(Self {
			reader,
			schema,
			codec,
			sync_marker,
			block: std::io::Cursor::new(Vec::new()),
			remaining_in_block: 0,
			plan,
		})
	}

	pub fn schema(&self) -> &Schema {
		&self.schema
	}

	fn load_next_block(&mut self) -> Result<bool, ObjectContainerFileError> {
		if self.reader.fill_buf()?.is_empty() {
			return Ok(false);
		}
		let n_objects = wire::read_long(&mut self.reader)?;
		let n_objects = usize::try_from(n_objects).map_err(|_| {
			ObjectContainerFileError::Wire(WireError::out_of_range("negative object count in block header"))
		})?;
		let block_size = wire::read_long(&mut self.reader)?;
		let block_size = usize::try_from(block_size).map_err(|_| {
			ObjectContainerFileError::Wire(WireError::out_of_range("negative block byte size in block header"))
		})?;
		let mut raw = vec![0u8; block_size];
		self.reader.read_exact(&mut raw)?;
		let decompressed = self.codec.decompress(&raw)?;

		let mut marker = [0u8; 16];
		self.reader.read_exact(&mut marker)?;
		if marker != self.sync_marker {
			return Err(ObjectContainerFileError::SyncMarkerMismatch);
		}

		self.block = std::io::Cursor::new(decompressed);
		self.remaining_in_block = n_objects;
		Ok(true)
	}

	/// Reads the next value, or `None` once every block has been consumed.
	pub fn read_next(&mut self) -> Result<Option<T>, ObjectContainerFileError> {
		loop {
			if self.remaining_in_block == 0 {
				if !self.load_next_block()? {
					return Ok(None);
				}
				continue;
			}
			let value = (self.plan)(&mut self.block)?;
			self.remaining_in_block -= 1;
			return Ok(Some(value));
		}
	}
}

impl<R: BufRead, T: Reflect + 'static> Iterator for Reader<R, T> {
	type Item = Result<T, ObjectContainerFileError>;
	fn next(&mut self) -> Option<Self::Item> {
		self.read_next().transpose()
	}
}

/// Writes values of one fixed host type `T` into an object container file.
///
/// Objects are buffered uncompressed and flushed as one block once the
/// buffer passes `approx_block_size` bytes (also on [`Writer::finish`]).
pub struct Writer<W, T> {
	writer: W,
	sync_marker: [u8; 16],
	codec: CompressionCodec,
	approx_block_size: usize,
	buffer: Vec<u8>,
	n_in_block: usize,
	plan: Box<dyn Fn(&T, &mut Vec<u8>) -> Result<(), WireError>>,
}

impl<W: Write, T: Reflect + 'static> Writer<W, T> {
	pub fn new(writer: W, schema: Schema, codec: CompressionCodec) -> Result<Self, ObjectContainerFileError> {
		Self::with_approx_block_size(writer, schema, codec, 64 * 1024)
	}

	pub fn with_approx_block_size(
		mut writer: W,
		schema: Schema,
		codec: CompressionCodec,
		approx_block_size: usize,
	) -> Result<Self, ObjectContainerFileError> {
		let mut sync_marker = [0u8; 16];
		rand::Rng::fill(&mut rand::thread_rng(), &mut sync_marker);

		let schema_json = schema.write_json(false)?;
		let mut header = Vec::new();
		header.extend_from_slice(&MAGIC);
		write_metadata(&mut header, &schema_json, codec);
		header.extend_from_slice(&sync_marker);
		writer.write_all(&header)?;

		let schema = Rc::new(schema);
		let root = schema.root_key();
		let mut ctx = build::binary::SerBuildContext::new(schema, Rc::new(Options::default()));
		let plan = ctx.build_write::<T>(root)?;

		Ok(Self {
			writer,
			sync_marker,
			codec,
			approx_block_size,
			buffer: Vec::new(),
			n_in_block: 0,
			plan,
		})
	}

	pub fn append(&mut self, value: &T) -> Result<(), ObjectContainerFileError> {
		(self.plan)(value, &mut self.buffer)?;
		self.n_in_block += 1;
		if self.buffer.len() >= self.approx_block_size {
			self.flush_block()?;
		}
		Ok(())
	}

	/// Flushes the current block, if it has anything buffered. A no-op
	/// otherwise, so it's safe to call redundantly.
	pub fn flush_block(&mut self) -> Result<(), ObjectContainerFileError> {
		if self.n_in_block == 0 {
			return Ok(());
		}
		let compressed = self.codec.compress(&self.buffer)?;
		let mut header = Vec::new();
		wire::write_long(&mut header, self.n_in_block as i64);
		wire::write_long(&mut header, compressed.len() as i64);
		self.writer.write_all(&header)?;
		self.writer.write_all(&compressed)?;
		self.writer.write_all(&self.sync_marker)?;
		self.buffer.clear();
		self.n_in_block = 0;
		Ok(())
	}

	/// Flushes any remaining block and returns the underlying writer.
	pub fn finish(mut self) -> Result<W, ObjectContainerFileError> {
		self.flush_block()?;
		Ok(self.writer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::resolve::{Member, NamedMember, RecordResolution, TypeResolution};

	struct Point {
		x: i32,
		y: i32,
	}

	impl Reflect for Point {
		fn resolve() -> TypeResolution<Self> {
			TypeResolution::Record(RecordResolution {
				members: vec![
					NamedMember {
						name: "x".to_owned(),
						aliases: Vec::new(),
						member: Member::new(|p: &Point| Some(&p.x)),
					},
					NamedMember {
						name: "y".to_owned(),
						aliases: Vec::new(),
						member: Member::new(|p: &Point| Some(&p.y)),
					},
				],
				construct: Box::new(|mut values| {
					let y = *values.remove(1).ok_or("missing y")?.downcast::<i32>().map_err(|_| "bad y")?;
					let x = *values.remove(0).ok_or("missing x")?.downcast::<i32>().map_err(|_| "bad x")?;
					Ok(Point { x, y })
				}),
			})
		}
	}

	fn point_schema() -> Schema {
		r#"{"type":"record","name":"Point","fields":[{"name":"x","type":"int"},{"name":"y","type":"int"}]}"#
			.parse()
			.unwrap()
	}

	#[test]
	fn round_trips_through_null_codec() {
		let mut buf = Vec::new();
		let mut writer = Writer::<_, Point>::new(&mut buf, point_schema(), CompressionCodec::Null).unwrap();
		writer.append(&Point { x: 1, y: 2 }).unwrap();
		writer.append(&Point { x: 3, y: 4 }).unwrap();
		writer.finish().unwrap();

		let mut reader = Reader::<_, Point>::new(buf.as_slice()).unwrap();
		let first = reader.read_next().unwrap().unwrap();
		let second = reader.read_next().unwrap().unwrap();
		assert!(reader.read_next().unwrap().is_none());
		assert_eq!((first.x, first.y), (1, 2));
		assert_eq!((second.x, second.y), (3, 4));
	}

	#[cfg(feature = "deflate")]
	#[test]
	fn round_trips_through_deflate_codec() {
		let mut buf = Vec::new();
		let mut writer =
			Writer::<_, Point>::new(&mut buf, point_schema(), CompressionCodec::Deflate).unwrap();
		for i in 0..50 {
			writer.append(&Point { x: i, y: -i }).unwrap();
		}
		writer.finish().unwrap();

		let mut reader = Reader::<_, Point>::new(buf.as_slice()).unwrap();
		for i in 0..50 {
			let p = reader.read_next().unwrap().unwrap();
			assert_eq!((p.x, p.y), (i, -i));
		}
		assert!(reader.read_next().unwrap().is_none());
	}

	#[test]
	fn rejects_bad_magic() {
		let err = Reader::<_, Point>::new(&b"not an avro file"[..]).unwrap_err();
		assert!(matches!(err, ObjectContainerFileError::NotAnObjectContainerFile));
	}
}
