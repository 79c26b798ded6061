//! The backup container format (version 1).
//!
//! ```text
//! "ZB01"                              magic
//! u32-le version (= 1)
//! u32-le metadata entry count
//!   per entry: u32-le key length, UTF-8 key,
//!              u32-le value length, raw value bytes
//! records:
//!   u8 type (0x01 schema, 0x02 relationship)
//!   u32-le compressed length
//!   snappy-compressed payload
//! u32-le 0, "ZBEOF"                   terminator
//! ```
//!
//! The first record is always the schema (UTF-8 text); a relationship
//! record before it fails decoding. Relationship payloads are
//! prost-encoded wire [`Relationship`] messages.
//!
//! The `export_cursor` metadata value is a fixed 256-byte slot framed
//! internally as `u16-le length ‖ bytes ‖ zero padding`, so the writer can
//! seek back and stamp the final cursor after the stream has been consumed.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

use prost::Message;
use zed_core::{ZedError, ZedResult};
use zed_proto::v1::Relationship;

use crate::rewrite::{RewriteOutcome, Rewriter};

const MAGIC: &[u8; 4] = b"ZB01";
const EOF_MAGIC: &[u8; 5] = b"ZBEOF";
const VERSION: u32 = 1;

const RECORD_SCHEMA: u8 = 0x01;
const RECORD_RELATIONSHIP: u8 = 0x02;

/// Metadata key of the server change token the backup was taken at.
pub const META_REVISION: &str = "last_revision_token";
/// Metadata key of the export resume cursor.
pub const META_CURSOR: &str = "export_cursor";

/// Fixed width of the `export_cursor` metadata slot.
const CURSOR_SLOT: usize = 256;
/// Compressed record payloads larger than this are rejected as damage.
const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

fn malformed(what: impl Into<String>) -> ZedError {
    ZedError::MalformedContainer(what.into())
}

fn io_err(err: std::io::Error) -> ZedError {
    ZedError::MalformedContainer(format!("I/O: {err}"))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Single-writer encoder for a backup container.
pub struct ContainerWriter<W: Write + Seek> {
    out: W,
    encoder: snap::raw::Encoder,
    cursor_slot_offset: Option<u64>,
    last_cursor: Option<String>,
}

impl<W: Write + Seek> ContainerWriter<W> {
    /// Writes the header, metadata, and schema record.
    ///
    /// `resumable` reserves the `export_cursor` slot so [`Self::close`] can
    /// stamp the final cursor.
    pub fn create(
        mut out: W,
        schema: &str,
        last_revision_token: &str,
        resumable: bool,
    ) -> ZedResult<Self> {
        out.write_all(MAGIC).map_err(io_err)?;
        out.write_all(&VERSION.to_le_bytes()).map_err(io_err)?;

        let count: u32 = if resumable { 2 } else { 1 };
        out.write_all(&count.to_le_bytes()).map_err(io_err)?;
        write_meta_entry(&mut out, META_REVISION, last_revision_token.as_bytes())?;

        let cursor_slot_offset = if resumable {
            let key = META_CURSOR.as_bytes();
            write_len(&mut out, key.len())?;
            out.write_all(key).map_err(io_err)?;
            write_len(&mut out, CURSOR_SLOT)?;
            let offset = out.stream_position().map_err(io_err)?;
            out.write_all(&[0u8; CURSOR_SLOT]).map_err(io_err)?;
            Some(offset)
        } else {
            None
        };

        let mut writer = Self {
            out,
            encoder: snap::raw::Encoder::new(),
            cursor_slot_offset,
            last_cursor: None,
        };
        writer.write_record(RECORD_SCHEMA, schema.as_bytes())?;
        Ok(writer)
    }

    /// Appends one relationship, remembering the stream cursor it arrived
    /// with.
    pub fn append(&mut self, rel: &Relationship, cursor: Option<&str>) -> ZedResult<()> {
        let payload = rel.encode_to_vec();
        self.write_record(RECORD_RELATIONSHIP, &payload)?;
        if let Some(cursor) = cursor {
            self.last_cursor = Some(cursor.to_owned());
        }
        Ok(())
    }

    /// The most recent cursor observed by [`Self::append`].
    #[must_use]
    pub fn last_cursor(&self) -> Option<&str> {
        self.last_cursor.as_deref()
    }

    /// Writes the terminator, stamps the cursor slot, flushes, and hands
    /// the underlying writer back.
    pub fn close(mut self) -> ZedResult<W> {
        self.out.write_all(&0u32.to_le_bytes()).map_err(io_err)?;
        self.out.write_all(EOF_MAGIC).map_err(io_err)?;

        if let (Some(offset), Some(cursor)) = (self.cursor_slot_offset, &self.last_cursor) {
            let bytes = cursor.as_bytes();
            if bytes.len() + 2 > CURSOR_SLOT {
                return Err(malformed(format!(
                    "export cursor of {} bytes exceeds the {CURSOR_SLOT}-byte slot",
                    bytes.len()
                )));
            }
            let end = self.out.stream_position().map_err(io_err)?;
            self.out.seek(SeekFrom::Start(offset)).map_err(io_err)?;
            let len = u16::try_from(bytes.len()).unwrap_or(0);
            self.out.write_all(&len.to_le_bytes()).map_err(io_err)?;
            self.out.write_all(bytes).map_err(io_err)?;
            self.out.seek(SeekFrom::Start(end)).map_err(io_err)?;
        }

        self.out.flush().map_err(io_err)?;
        Ok(self.out)
    }

    fn write_record(&mut self, record_type: u8, payload: &[u8]) -> ZedResult<()> {
        let compressed = self
            .encoder
            .compress_vec(payload)
            .map_err(|err| malformed(format!("compression failed: {err}")))?;
        self.out.write_all(&[record_type]).map_err(io_err)?;
        write_len(&mut self.out, compressed.len())?;
        self.out.write_all(&compressed).map_err(io_err)?;
        Ok(())
    }
}

fn write_len<W: Write>(out: &mut W, len: usize) -> ZedResult<()> {
    let len = u32::try_from(len).map_err(|_| malformed("length exceeds u32"))?;
    out.write_all(&len.to_le_bytes()).map_err(io_err)
}

fn write_meta_entry<W: Write>(out: &mut W, key: &str, value: &[u8]) -> ZedResult<()> {
    write_len(out, key.len())?;
    out.write_all(key.as_bytes()).map_err(io_err)?;
    write_len(out, value.len())?;
    out.write_all(value).map_err(io_err)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Decoder for a backup container.
///
/// The header, metadata, and schema record are consumed at open; the
/// relationship records stream through [`Self::next_relationship`].
pub struct ContainerReader<R: Read> {
    input: R,
    decoder: snap::raw::Decoder,
    schema: String,
    metadata: HashMap<String, Vec<u8>>,
    finished: bool,
}

impl<R: Read> std::fmt::Debug for ContainerReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerReader")
            .field("schema", &self.schema)
            .field("metadata", &self.metadata)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<R: Read> ContainerReader<R> {
    /// Reads the header and the leading schema record.
    pub fn open(mut input: R) -> ZedResult<Self> {
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic).map_err(io_err)?;
        if &magic != MAGIC {
            return Err(malformed("bad magic; not a zed backup"));
        }
        let version = read_u32(&mut input)?;
        if version != VERSION {
            return Err(malformed(format!("unsupported container version {version}")));
        }

        let count = read_u32(&mut input)?;
        let mut metadata = HashMap::new();
        for _ in 0..count {
            let key_len = read_u32(&mut input)?;
            let key = read_vec(&mut input, key_len)?;
            let key = String::from_utf8(key)
                .map_err(|_| malformed("metadata key is not UTF-8"))?;
            let value_len = read_u32(&mut input)?;
            let value = read_vec(&mut input, value_len)?;
            metadata.insert(key, value);
        }
        if !metadata.contains_key(META_REVISION) {
            return Err(malformed("metadata is missing the revision token"));
        }

        let mut decoder = snap::raw::Decoder::new();
        let (record_type, payload) = match read_record(&mut input, &mut decoder)? {
            Some(record) => record,
            None => return Err(malformed("container holds no schema record")),
        };
        if record_type != RECORD_SCHEMA {
            return Err(malformed(
                "the first record is not the schema; refusing the container",
            ));
        }
        let schema = String::from_utf8(payload)
            .map_err(|_| malformed("schema record is not UTF-8"))?;

        Ok(Self {
            input,
            decoder,
            schema,
            metadata,
            finished: false,
        })
    }

    /// The schema text stored in the container.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The change token the backup was taken at.
    #[must_use]
    pub fn last_revision_token(&self) -> String {
        self.metadata
            .get(META_REVISION)
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default()
    }

    /// The export resume cursor, when one was stamped.
    #[must_use]
    pub fn export_cursor(&self) -> Option<String> {
        let slot = self.metadata.get(META_CURSOR)?;
        if slot.len() < 2 {
            return None;
        }
        let len = usize::from(u16::from_le_bytes([slot[0], slot[1]]));
        if len == 0 || slot.len() < 2 + len {
            return None;
        }
        String::from_utf8(slot[2..2 + len].to_vec()).ok()
    }

    /// The next relationship in stored order; `None` at the terminator.
    pub fn next_relationship(&mut self) -> ZedResult<Option<Relationship>> {
        if self.finished {
            return Ok(None);
        }
        match read_record(&mut self.input, &mut self.decoder)? {
            None => {
                self.finished = true;
                Ok(None)
            }
            Some((RECORD_RELATIONSHIP, payload)) => {
                let rel = Relationship::decode(payload.as_slice())
                    .map_err(|err| malformed(format!("undecodable relationship: {err}")))?;
                Ok(Some(rel))
            }
            Some((RECORD_SCHEMA, _)) => Err(malformed("duplicate schema record")),
            Some((other, _)) => Err(malformed(format!("unknown record type 0x{other:02x}"))),
        }
    }
}

fn read_u32<R: Read>(input: &mut R) -> ZedResult<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf).map_err(io_err)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_vec<R: Read>(input: &mut R, len: u32) -> ZedResult<Vec<u8>> {
    if len > MAX_RECORD_LEN {
        return Err(malformed(format!("implausible length {len}")));
    }
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf).map_err(io_err)?;
    Ok(buf)
}

/// Reads one record; `None` at a well-formed terminator.
fn read_record<R: Read>(
    input: &mut R,
    decoder: &mut snap::raw::Decoder,
) -> ZedResult<Option<(u8, Vec<u8>)>> {
    let mut type_buf = [0u8; 1];
    input.read_exact(&mut type_buf).map_err(io_err)?;

    // A record-length of zero marks the terminator; the type byte read
    // above is then the first byte of the length field, so re-frame.
    if type_buf[0] == 0 {
        let mut rest = [0u8; 3];
        input.read_exact(&mut rest).map_err(io_err)?;
        if rest != [0, 0, 0] {
            return Err(malformed("corrupt record framing"));
        }
        let mut eof = [0u8; 5];
        input.read_exact(&mut eof).map_err(io_err)?;
        if &eof != EOF_MAGIC {
            return Err(malformed("missing end-of-stream marker"));
        }
        return Ok(None);
    }

    let len = read_u32(input)?;
    if len == 0 || len > MAX_RECORD_LEN {
        return Err(malformed(format!("implausible record length {len}")));
    }
    let compressed = read_vec(input, len)?;
    let payload = decoder
        .decompress_vec(&compressed)
        .map_err(|err| malformed(format!("decompression failed: {err}")))?;
    Ok(Some((type_buf[0], payload)))
}

// ---------------------------------------------------------------------------
// Rewriting reader
// ---------------------------------------------------------------------------

/// A [`ContainerReader`] composed with a rewriter: callers only ever see
/// post-transform records.
pub struct RewriteReader<R: Read> {
    inner: ContainerReader<R>,
    rewriter: Box<dyn Rewriter>,
    schema: String,
}

impl<R: Read> RewriteReader<R> {
    /// Wraps `inner`, rewriting the schema eagerly.
    pub fn new(inner: ContainerReader<R>, rewriter: Box<dyn Rewriter>) -> ZedResult<Self> {
        let schema = rewriter.rewrite_schema(inner.schema())?;
        Ok(Self {
            inner,
            rewriter,
            schema,
        })
    }

    /// The rewritten schema text.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The change token the backup was taken at.
    #[must_use]
    pub fn last_revision_token(&self) -> String {
        self.inner.last_revision_token()
    }

    /// The next kept relationship; dropped records are skipped silently.
    pub fn next_relationship(&mut self) -> ZedResult<Option<Relationship>> {
        loop {
            match self.inner.next_relationship()? {
                None => return Ok(None),
                Some(rel) => match self.rewriter.rewrite_relationship(rel)? {
                    RewriteOutcome::Kept(rel) => return Ok(Some(rel)),
                    RewriteOutcome::Dropped => {}
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use zed_core::tuple;

    use super::*;
    use crate::rewrite::PrefixFilter;

    fn rel(s: &str) -> Relationship {
        tuple::parse(s).unwrap()
    }

    const SCHEMA: &str = "definition user {}\n\ndefinition document {\n\trelation viewer: user\n}";

    fn sample_container(resumable: bool) -> Vec<u8> {
        let buf = Cursor::new(Vec::new());
        let mut writer = ContainerWriter::create(buf, SCHEMA, "GhUKBgjA", resumable).unwrap();
        writer
            .append(&rel("document:doc1#viewer@user:alice"), Some("c1"))
            .unwrap();
        writer
            .append(&rel("document:doc2#viewer@user:bob[cav:{\"x\":1}]"), Some("c2"))
            .unwrap();
        writer.close().unwrap().into_inner()
    }

    #[test]
    fn container_round_trips() {
        let bytes = sample_container(false);
        let mut reader = ContainerReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.schema(), SCHEMA);
        assert_eq!(reader.last_revision_token(), "GhUKBgjA");
        assert_eq!(reader.export_cursor(), None);

        let first = reader.next_relationship().unwrap().unwrap();
        assert_eq!(tuple::format(&first), "document:doc1#viewer@user:alice");
        let second = reader.next_relationship().unwrap().unwrap();
        assert_eq!(
            tuple::format(&second),
            "document:doc2#viewer@user:bob[cav:{\"x\":1}]"
        );
        assert!(reader.next_relationship().unwrap().is_none());
        // The EOF sentinel is stable.
        assert!(reader.next_relationship().unwrap().is_none());
    }

    #[test]
    fn the_cursor_slot_is_stamped_on_close() {
        let bytes = sample_container(true);
        let reader = ContainerReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.export_cursor().as_deref(), Some("c2"));
    }

    #[test]
    fn an_empty_relationship_stream_is_valid() {
        let buf = Cursor::new(Vec::new());
        let writer = ContainerWriter::create(buf, SCHEMA, "tok", false).unwrap();
        let bytes = writer.close().unwrap().into_inner();
        let mut reader = ContainerReader::open(Cursor::new(bytes)).unwrap();
        assert!(reader.next_relationship().unwrap().is_none());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = ContainerReader::open(Cursor::new(b"NOPE1234".to_vec())).unwrap_err();
        assert!(matches!(err, ZedError::MalformedContainer(_)));
    }

    #[test]
    fn truncation_is_rejected() {
        // Drop the 9-byte terminator; the stream must not end cleanly.
        let mut bytes = sample_container(false);
        bytes.truncate(bytes.len() - 9);
        let mut reader = ContainerReader::open(Cursor::new(bytes)).unwrap();
        assert!(reader.next_relationship().unwrap().is_some());
        assert!(reader.next_relationship().unwrap().is_some());
        assert!(reader.next_relationship().is_err());
    }

    #[test]
    fn a_relationship_before_the_schema_is_rejected() {
        // Hand-assemble a container whose first record is a relationship.
        let mut encoder = snap::raw::Encoder::new();
        let rel_payload = rel("document:doc1#viewer@user:alice").encode_to_vec();
        let compressed = encoder.compress_vec(&rel_payload).unwrap();

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&u32::try_from(META_REVISION.len()).unwrap().to_le_bytes());
        out.extend_from_slice(META_REVISION.as_bytes());
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(b"tok");
        out.push(RECORD_RELATIONSHIP);
        out.extend_from_slice(&u32::try_from(compressed.len()).unwrap().to_le_bytes());
        out.extend_from_slice(&compressed);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(EOF_MAGIC);

        let err = ContainerReader::open(Cursor::new(out)).unwrap_err();
        assert!(matches!(err, ZedError::MalformedContainer(_)));
    }

    #[test]
    fn a_rewriting_reader_hides_dropped_records() {
        let buf = Cursor::new(Vec::new());
        let schema = "definition test/user {}\n\ndefinition other/user {}";
        let mut writer = ContainerWriter::create(buf, schema, "tok", false).unwrap();
        writer
            .append(&rel("test/doc:1#viewer@test/user:1"), None)
            .unwrap();
        writer
            .append(&rel("other/doc:1#viewer@other/user:1"), None)
            .unwrap();
        let bytes = writer.close().unwrap().into_inner();

        let inner = ContainerReader::open(Cursor::new(bytes)).unwrap();
        let mut reader =
            RewriteReader::new(inner, Box::new(PrefixFilter::new("test"))).unwrap();
        assert_eq!(reader.schema(), "definition test/user {}");
        let only = reader.next_relationship().unwrap().unwrap();
        assert_eq!(tuple::format(&only), "test/doc:1#viewer@test/user:1");
        assert!(reader.next_relationship().unwrap().is_none());
    }
}
