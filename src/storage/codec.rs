//! Binary layout of repository embedding indexes.
//!
//! # Format
//!
//! A blob is a sequence of independently encoded bincode values (standard
//! configuration: little-endian, varint lengths):
//!
//! - repo name, revision
//! - for the code index, then the text index:
//!   - chunk count
//!   - each chunk of the flattened `i8` matrix as its own sequence
//!   - column dimension, row metadata, ranks
//!
//! Chunks hold `chunk_rows` rows each, capped at 16 Mi values, so the
//! encoder never serializes more than one chunk of the matrix at a time.
//! Every field of this layout decodes under a 64 MiB limit.
//!
//! Blobs written before quantization are a single bincode value of
//! [`LegacyRepoEmbeddingIndex`] holding `f32` embeddings. There is no
//! version marker: readers try the chunked layout first and fall back to the
//! legacy one.

use std::io::{self, BufReader, Read};

use bincode::config::{self, Configuration, LittleEndian, Limit, Varint};
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::vector::{
    CommitId, EmbeddingIndex, IndexShapeError, LegacyRepoEmbeddingIndex, RepoEmbeddingIndex,
    RepoName, RowMetadata,
};

/// Rows per encoded chunk.
pub const DEFAULT_CHUNK_ROWS: usize = 1000;

/// Upper bound on the bytes one field of the chunked layout may claim.
///
/// Length prefixes read from a corrupt or legacy blob are checked against
/// it before anything is allocated.
const CHUNK_DECODE_LIMIT: usize = 64 * 1024 * 1024;

/// Most `i8` values written in one chunk, whatever `chunk_rows` asks for.
const MAX_CHUNK_VALUES: usize = CHUNK_DECODE_LIMIT / 4;

/// Upper bound for values decoded in one shot, legacy indexes included.
const VALUE_DECODE_LIMIT: usize = u32::MAX as usize;

type ChunkConfig = Configuration<LittleEndian, Varint, Limit<CHUNK_DECODE_LIMIT>>;
type ValueConfig = Configuration<LittleEndian, Varint, Limit<VALUE_DECODE_LIMIT>>;

fn chunk_config() -> ChunkConfig {
    config::standard().with_limit::<CHUNK_DECODE_LIMIT>()
}

fn value_config() -> ValueConfig {
    config::standard().with_limit::<VALUE_DECODE_LIMIT>()
}

/// Errors produced while encoding or decoding an index blob.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encode index field: {0}")]
    Encode(#[from] EncodeError),

    #[error("Failed to decode index field: {0}")]
    Decode(DecodeError),

    #[error("Inconsistent index shape: {0}")]
    Shape(#[from] IndexShapeError),

    #[error("Unexpected bytes after the end of the index")]
    TrailingBytes,

    #[error("Encoded value {value} does not fit in a usize")]
    Overflow { value: u64 },

    #[error("Index stream I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("Index decoding was cancelled")]
    Cancelled,
}

impl CodecError {
    /// True when the bytes themselves are bad, as opposed to the stream
    /// carrying them failing.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Cancelled)
    }
}

impl From<DecodeError> for CodecError {
    fn from(error: DecodeError) -> Self {
        match error {
            // A short blob is malformed data; any other read failure belongs
            // to the stream.
            DecodeError::Io { inner, .. } if inner.kind() != io::ErrorKind::UnexpectedEof => {
                Self::Io(inner)
            }
            other => Self::Decode(other),
        }
    }
}

/// Streams `index` into `writer` in the chunked layout.
///
/// The index is validated before the first byte is written.
pub async fn encode_repo_index<W>(
    writer: &mut W,
    index: &RepoEmbeddingIndex,
    chunk_rows: usize,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    index.validate()?;

    write_field(writer, &index.repo_name).await?;
    write_field(writer, &index.revision).await?;
    for embedding_index in [&index.code_index, &index.text_index] {
        encode_embedding_index(writer, embedding_index, chunk_rows).await?;
    }
    writer.flush().await.map_err(CodecError::Io)
}

async fn encode_embedding_index<W>(
    writer: &mut W,
    index: &EmbeddingIndex,
    chunk_rows: usize,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let values_per_chunk = chunk_rows
        .max(1)
        .saturating_mul(index.column_dimension.max(1))
        .min(MAX_CHUNK_VALUES);
    let num_chunks = index.embeddings.len().div_ceil(values_per_chunk);

    write_field(writer, num_chunks as u64).await?;
    for chunk in index.embeddings.chunks(values_per_chunk) {
        write_field(writer, chunk).await?;
    }

    write_field(writer, index.column_dimension as u64).await?;
    write_field(writer, &index.row_metadata).await?;
    write_field(writer, &index.ranks).await
}

async fn write_field<W, T>(writer: &mut W, value: T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Encode,
{
    let bytes = bincode::encode_to_vec(value, chunk_config())?;
    writer.write_all(&bytes).await.map_err(CodecError::Io)
}

/// Reads an index in the chunked layout.
///
/// The whole stream must be consumed; trailing bytes mean the blob is not
/// in this layout. `cancel` is checked between chunks.
pub fn decode_repo_index<R: Read>(
    reader: &mut R,
    cancel: &CancellationToken,
) -> Result<RepoEmbeddingIndex, CodecError> {
    let repo_name: RepoName = read_field(reader)?;
    let revision: CommitId = read_field(reader)?;
    let code_index = decode_embedding_index(reader, cancel)?;
    let text_index = decode_embedding_index(reader, cancel)?;
    expect_end_of_stream(reader)?;

    let index = RepoEmbeddingIndex {
        repo_name,
        revision,
        code_index,
        text_index,
    };
    index.validate()?;
    Ok(index)
}

fn decode_embedding_index<R: Read>(
    reader: &mut R,
    cancel: &CancellationToken,
) -> Result<EmbeddingIndex, CodecError> {
    let num_chunks: u64 = read_field(reader)?;

    let mut embeddings = Vec::new();
    for _ in 0..num_chunks {
        if cancel.is_cancelled() {
            return Err(CodecError::Cancelled);
        }
        let chunk: Vec<i8> = read_field(reader)?;
        embeddings.extend_from_slice(&chunk);
    }

    let column_dimension = read_usize(reader)?;
    let matrix = EmbeddingIndex {
        embeddings,
        column_dimension,
        ..EmbeddingIndex::default()
    };
    let rows = matrix.rows();

    // Sequences are read element by element so that a bogus length can be
    // rejected against the row count before anything is reserved.
    let metadata_len = read_usize(reader)?;
    if metadata_len != rows {
        return Err(IndexShapeError::MetadataMismatch {
            rows,
            metadata: metadata_len,
        }
        .into());
    }
    let row_metadata = read_elements::<RowMetadata, _>(reader, metadata_len, cancel)?;

    let ranks_len = read_usize(reader)?;
    if ranks_len != 0 && ranks_len != rows {
        return Err(IndexShapeError::RanksMismatch {
            rows,
            ranks: ranks_len,
        }
        .into());
    }
    let ranks = read_elements::<f32, _>(reader, ranks_len, cancel)?;

    Ok(EmbeddingIndex {
        row_metadata,
        ranks,
        ..matrix
    })
}

fn read_usize<R: Read>(reader: &mut R) -> Result<usize, CodecError> {
    let value: u64 = read_field(reader)?;
    usize::try_from(value).map_err(|_| CodecError::Overflow { value })
}

fn read_elements<T, R>(
    reader: &mut R,
    len: usize,
    cancel: &CancellationToken,
) -> Result<Vec<T>, CodecError>
where
    T: Decode<()>,
    R: Read,
{
    let mut elements = Vec::with_capacity(len.min(MAX_CHUNK_VALUES));
    for i in 0..len {
        if i % DEFAULT_CHUNK_ROWS == 0 && cancel.is_cancelled() {
            return Err(CodecError::Cancelled);
        }
        elements.push(read_field(reader)?);
    }
    Ok(elements)
}

/// Reads an index written in the legacy single-value float layout and
/// quantizes it.
///
/// `cancel` is checked each time the internal buffer is refilled.
pub fn decode_legacy_repo_index<R: Read>(
    reader: &mut R,
    cancel: &CancellationToken,
) -> Result<RepoEmbeddingIndex, CodecError> {
    let mut reader = BufReader::new(CancellableReader {
        inner: reader,
        cancel,
    });
    let legacy: LegacyRepoEmbeddingIndex = read_value(&mut reader).map_err(|e| {
        if cancel.is_cancelled() {
            CodecError::Cancelled
        } else {
            e
        }
    })?;
    expect_end_of_stream(&mut reader)?;

    let index = legacy.into_current();
    index.validate()?;
    Ok(index)
}

/// Fails reads once `cancel` fires.
struct CancellableReader<'a, R> {
    inner: R,
    cancel: &'a CancellationToken,
}

impl<R: Read> Read for CancellableReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::other("index decoding was cancelled"));
        }
        self.inner.read(buf)
    }
}

/// Encodes a whole value in one shot.
pub fn encode_value<T: Encode>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::encode_to_vec(value, value_config())?)
}

/// Decodes a value written by [`encode_value`], requiring end of stream.
pub fn decode_value<T, R>(reader: &mut R) -> Result<T, CodecError>
where
    T: Decode<()>,
    R: Read,
{
    let value = read_value(reader)?;
    expect_end_of_stream(reader)?;
    Ok(value)
}

fn read_field<T, R>(reader: &mut R) -> Result<T, CodecError>
where
    T: Decode<()>,
    R: Read,
{
    Ok(bincode::decode_from_std_read(reader, chunk_config())?)
}

fn read_value<T, R>(reader: &mut R) -> Result<T, CodecError>
where
    T: Decode<()>,
    R: Read,
{
    Ok(bincode::decode_from_std_read(reader, value_config())?)
}

fn expect_end_of_stream<R: Read>(reader: &mut R) -> Result<(), CodecError> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(()),
            Ok(_) => return Err(CodecError::TrailingBytes),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CodecError::Io(e)),
        }
    }
}
