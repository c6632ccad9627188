//! Bounded-chunk byte streams for moving artifacts between tiers.

use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt, stream};
use kiln_core::{ArtifactStream, Error, Result};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Largest chunk handed to the local tier while downloading.
pub const READ_SIZE_BYTES: usize = 4 * 1024 * 1024;

/// Chunk size used when streaming an artifact file to a remote.
pub const UPLOAD_CHUNK_BYTES: usize = 1024 * 1024;

/// Re-chunk a stream so that no chunk exceeds `max_chunk` bytes.
///
/// Splitting a [`Bytes`] is zero-copy, so this only bounds what downstream
/// code has to hold at once.
pub fn bounded<S>(inner: S, max_chunk: usize) -> ArtifactStream
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let max_chunk = max_chunk.max(1);
    Box::pin(
        inner
            .map_ok(move |chunk| {
                stream::iter(
                    split_chunk(chunk, max_chunk)
                        .into_iter()
                        .map(Ok::<Bytes, Error>),
                )
            })
            .try_flatten(),
    )
}

fn split_chunk(mut chunk: Bytes, max_chunk: usize) -> Vec<Bytes> {
    let mut pieces = Vec::with_capacity(chunk.len() / max_chunk + 1);
    while chunk.len() > max_chunk {
        pieces.push(chunk.split_to(max_chunk));
    }
    if !chunk.is_empty() {
        pieces.push(chunk);
    }
    pieces
}

/// Open a file as a stream of chunks, returning its length alongside.
pub async fn file_chunks(
    path: &Path,
    chunk_size: usize,
) -> std::io::Result<(u64, impl Stream<Item = std::io::Result<Bytes>> + Send + 'static)> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let chunks = stream::try_unfold(file, move |mut file| async move {
        let mut buf = BytesMut::with_capacity(chunk_size);
        let read = file.read_buf(&mut buf).await?;
        if read == 0 {
            Ok(None)
        } else {
            Ok(Some((buf.freeze(), file)))
        }
    });
    Ok((len, chunks))
}
