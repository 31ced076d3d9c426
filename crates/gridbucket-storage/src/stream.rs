//! Buffer adapters over engine streams
//!
//! `drain` turns a chunked read stream into one contiguous buffer; `fill` writes one
//! buffer into an upload stream and closes it.

use crate::traits::{StorageError, StorageResult, UploadStream};
use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use gridbucket_core::FileMetadata;
use std::io;

/// Consume a read stream and return its chunks concatenated in arrival order.
///
/// A stream that ends without yielding anything produces an empty buffer. Any stream
/// error fails the whole read with [`StorageError::StreamRead`]; chunks received before
/// the error are discarded.
pub async fn drain<S>(stream: S) -> StorageResult<Bytes>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut size = 0usize;

    while let Some(chunk) = stream.try_next().await.map_err(|e| {
        tracing::error!(
            error = %e,
            chunks = chunks.len(),
            size_bytes = size,
            "Stream read failed"
        );
        StorageError::StreamRead(e)
    })? {
        size += chunk.len();
        chunks.push(chunk);
    }

    tracing::debug!(chunks = chunks.len(), size_bytes = size, "Stream drained");

    match chunks.len() {
        0 => return Ok(Bytes::new()),
        1 => return Ok(chunks.swap_remove(0)),
        _ => {}
    }

    let mut buffer = BytesMut::with_capacity(size);
    for chunk in chunks {
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

/// Write `buffer` as a single chunk, then signal end-of-input.
///
/// Returns the metadata the engine recorded for the new file. A failure of either the
/// write or the close is reported as [`StorageError::StreamWrite`].
pub async fn fill(
    mut stream: Box<dyn UploadStream>,
    buffer: impl Into<Bytes>,
) -> StorageResult<FileMetadata> {
    let buffer = buffer.into();
    let id = stream.id();
    let size = buffer.len();

    if let Err(e) = stream.write(buffer).await {
        tracing::error!(
            error = %e,
            file_id = %id,
            filename = %stream.filename(),
            size_bytes = size,
            "Upload stream write failed"
        );
        return Err(StorageError::StreamWrite(e));
    }

    stream.close().await.map_err(|e| {
        tracing::error!(
            error = %e,
            file_id = %id,
            size_bytes = size,
            "Upload stream close failed"
        );
        StorageError::StreamWrite(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use futures::stream;
    use gridbucket_core::ObjectId;
    use std::sync::{Arc, Mutex};

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn drain_concatenates_in_order() {
        let buffer = drain(chunks(&[b"hel", b"lo ", b"wor", b"ld"])).await.unwrap();
        assert_eq!(&buffer[..], b"hello world");
    }

    #[tokio::test]
    async fn drain_empty_stream_yields_empty_buffer() {
        let buffer = drain(chunks(&[])).await.unwrap();
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn drain_handles_zero_length_chunks() {
        let buffer = drain(chunks(&[b"abcd", b"", b"efghijk"])).await.unwrap();
        assert_eq!(buffer.len(), 11);
        assert_eq!(&buffer[..], b"abcdefghijk");
    }

    #[tokio::test]
    async fn drain_single_chunk_is_returned_as_is() {
        let buffer = drain(chunks(&[b"only"])).await.unwrap();
        assert_eq!(&buffer[..], b"only");
    }

    #[tokio::test]
    async fn drain_fails_on_error_after_chunks() {
        let items: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Ok(Bytes::from_static(b"data")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"never read")),
        ];
        let err = drain(stream::iter(items)).await.unwrap_err();
        match err {
            StorageError::StreamRead(cause) => {
                assert_eq!(cause.kind(), io::ErrorKind::ConnectionReset)
            }
            other => panic!("expected StreamRead, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn drain_fails_on_immediate_error() {
        let items: Vec<io::Result<Bytes>> = vec![Err(io::Error::other("boom"))];
        let err = drain(stream::iter(items)).await.unwrap_err();
        assert!(matches!(err, StorageError::StreamRead(_)));
    }

    #[derive(Default)]
    struct Recorded {
        writes: Vec<Bytes>,
        closed: bool,
    }

    struct RecordingUpload {
        id: ObjectId,
        recorded: Arc<Mutex<Recorded>>,
        fail_write: bool,
        fail_close: bool,
    }

    #[async_trait]
    impl UploadStream for RecordingUpload {
        fn id(&self) -> ObjectId {
            self.id
        }

        fn filename(&self) -> &str {
            "recorded.bin"
        }

        async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
            if self.fail_write {
                return Err(io::Error::other("write rejected"));
            }
            self.recorded.lock().unwrap().writes.push(chunk);
            Ok(())
        }

        async fn close(self: Box<Self>) -> io::Result<FileMetadata> {
            if self.fail_close {
                return Err(io::Error::other("duplicate key"));
            }
            let mut recorded = self.recorded.lock().unwrap();
            recorded.closed = true;
            let length = recorded.writes.iter().map(|b| b.len() as u64).sum();
            Ok(FileMetadata {
                id: self.id,
                filename: "recorded.bin".to_string(),
                length,
                chunk_size_bytes: 4,
                upload_date: Utc::now(),
                metadata: None,
            })
        }
    }

    fn upload(fail_write: bool, fail_close: bool) -> (Box<dyn UploadStream>, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let stream = RecordingUpload {
            id: ObjectId::new(),
            recorded: recorded.clone(),
            fail_write,
            fail_close,
        };
        (Box::new(stream), recorded)
    }

    #[tokio::test]
    async fn fill_writes_one_chunk_then_closes() {
        let (stream, recorded) = upload(false, false);
        let file = fill(stream, Bytes::from_static(b"hello world")).await.unwrap();

        assert_eq!(file.length, 11);
        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.writes.len(), 1);
        assert_eq!(&recorded.writes[0][..], b"hello world");
        assert!(recorded.closed);
    }

    #[tokio::test]
    async fn fill_reports_write_failure() {
        let (stream, recorded) = upload(true, false);
        let err = fill(stream, b"data".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::StreamWrite(_)));
        assert!(!recorded.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn fill_reports_close_failure() {
        let (stream, _) = upload(false, true);
        let err = fill(stream, b"data".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::StreamWrite(_)));
    }
}
