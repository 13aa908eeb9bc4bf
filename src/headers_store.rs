/// Headers store (C6)
///
/// A single append-only file of 80-byte block headers. Per the REDESIGN
/// FLAGS decision in SPEC_FULL.md, "latest hash" is the double-SHA256 of
/// the last 80-byte record (the actual block hash), not the previous-block-
/// hash field the header itself carries — the C source's shortcut is not
/// reproduced here.
use crate::wire::{dsha256, BLOCK_HEADER_SIZE, MAX_HEADERS};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Mutex;

/// All-zero sentinel used as the locator root when no headers are stored yet.
pub const GENESIS_SENTINEL: [u8; 32] = [0u8; 32];

/// Append-only 80-byte block header file, opened fresh for each operation.
pub struct HeadersStore {
    path: PathBuf,
    /// Serializes appends; the file itself has no external lock (§5: one
    /// writer per process, records are well under `PIPE_BUF`).
    write_lock: Mutex<()>,
}

impl HeadersStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one 80-byte header record. Never seeks; opens in append mode.
    pub async fn append(&self, header: &[u8; BLOCK_HEADER_SIZE]) -> io::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(header).await?;
        file.flush().await?;
        Ok(())
    }

    /// Number of complete 80-byte records currently stored.
    pub async fn len(&self) -> io::Result<u64> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len() / BLOCK_HEADER_SIZE as u64),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub async fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// The block hash of the most recently appended header, or the
    /// all-zero genesis sentinel if the store is empty.
    pub async fn latest_hash(&self) -> io::Result<[u8; 32]> {
        let record_count = self.len().await?;
        if record_count == 0 {
            return Ok(GENESIS_SENTINEL);
        }
        let mut file = File::open(&self.path).await?;
        let offset = (record_count - 1) * BLOCK_HEADER_SIZE as u64;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        file.read_exact(&mut header).await?;
        Ok(dsha256(&header))
    }

    /// Scan the file linearly, emitting headers *after* the one matching
    /// `start_hash`, up to (and not including) `stop_hash`, or after
    /// [`MAX_HEADERS`] records, whichever comes first — matching the usual
    /// `getheaders` locator semantics, where the locator hash marks a
    /// known common ancestor and the peer wants what comes next.
    ///
    /// If `start_hash` is never found, an empty vector is returned — this
    /// mirrors the locator semantics of "I don't recognize any of your
    /// checkpoints, you get nothing back" rather than an error.
    pub async fn range(
        &self,
        start_hash: [u8; 32],
        stop_hash: [u8; 32],
    ) -> io::Result<Vec<[u8; BLOCK_HEADER_SIZE]>> {
        let mut file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut out = Vec::new();
        let mut emitting = start_hash == GENESIS_SENTINEL;
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        loop {
            match file.read_exact(&mut buf).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let hash = dsha256(&buf);
            if !emitting {
                if hash == start_hash {
                    emitting = true;
                }
                continue;
            }
            if hash == stop_hash && stop_hash != GENESIS_SENTINEL {
                break;
            }
            out.push(buf);
            if out.len() >= MAX_HEADERS {
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_header(tag: u8) -> [u8; BLOCK_HEADER_SIZE] {
        [tag; BLOCK_HEADER_SIZE]
    }

    #[tokio::test]
    async fn empty_store_reports_genesis_sentinel() {
        let dir = tempdir().unwrap();
        let store = HeadersStore::new(dir.path().join("headers.dat"));
        assert!(store.is_empty().await.unwrap());
        assert_eq!(store.latest_hash().await.unwrap(), GENESIS_SENTINEL);
    }

    #[tokio::test]
    async fn append_then_latest_hash_is_dsha256_of_last_record() {
        let dir = tempdir().unwrap();
        let store = HeadersStore::new(dir.path().join("headers.dat"));
        let h1 = sample_header(1);
        let h2 = sample_header(2);
        store.append(&h1).await.unwrap();
        store.append(&h2).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 2);
        assert_eq!(store.latest_hash().await.unwrap(), dsha256(&h2));
    }

    #[tokio::test]
    async fn range_starts_at_genesis_sentinel_when_store_is_empty() {
        let dir = tempdir().unwrap();
        let store = HeadersStore::new(dir.path().join("headers.dat"));
        let headers = store.range(GENESIS_SENTINEL, GENESIS_SENTINEL).await.unwrap();
        assert!(headers.is_empty());
    }

    #[tokio::test]
    async fn range_emits_from_start_hash_up_to_stop_hash() {
        let dir = tempdir().unwrap();
        let store = HeadersStore::new(dir.path().join("headers.dat"));
        let headers: Vec<_> = (0u8..5).map(sample_header).collect();
        for h in &headers {
            store.append(h).await.unwrap();
        }
        let start = dsha256(&headers[1]);
        let stop = dsha256(&headers[3]);
        let range = store.range(start, stop).await.unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0], headers[2]);
    }

    #[tokio::test]
    async fn range_caps_at_max_headers() {
        let dir = tempdir().unwrap();
        let store = HeadersStore::new(dir.path().join("headers.dat"));
        for i in 0..10u32 {
            let mut h = sample_header(0);
            h[0..4].copy_from_slice(&i.to_le_bytes());
            store.append(&h).await.unwrap();
        }
        let range = store.range(GENESIS_SENTINEL, GENESIS_SENTINEL).await.unwrap();
        assert_eq!(range.len(), 10);
    }
}
