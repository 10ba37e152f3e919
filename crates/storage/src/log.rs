//! Append-only log backend
//!
//! Every write is appended to a single record file in the store location;
//! an in-memory ordered index maps live keys to the offset of their latest
//! record. Reopening replays the file and truncates a torn tail.
//!
//! # Record Layout
//!
//! ```text
//! ┌──────────┬──────────────┬────────────────┬─────────┬───────────┬──────────┐
//! │ Kind (1) │ Key len (i32)│ Value len (i32)│ Key     │ Value     │ CRC32 (4)│
//! └──────────┴──────────────┴────────────────┴─────────┴───────────┴──────────┘
//! ```
//!
//! Lengths are little-endian signed 32-bit integers. A key or value longer
//! than `i32::MAX` bytes cannot be framed and is rejected with a
//! `WriteError` before any byte of the write (or of its batch) reaches the
//! file.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use kvprobe_core::{Backend, Batch, Cursor, Store, StoreError, StoreResult};

use crate::cursor::{LiveCursor, SharedMap};

/// File name of the record log inside a store location
pub const LOG_FILE_NAME: &str = "kvprobe.log";

/// Record kind: key set to value
pub const RECORD_PUT: u8 = 1;

/// Record kind: key removed
pub const RECORD_DELETE: u8 = 2;

/// Size of the fixed record header in bytes
pub const RECORD_HEADER_SIZE: usize = 9;

const CRC_SIZE: usize = 4;

/// Convert a payload length into the on-disk signed 32-bit field.
///
/// # Errors
///
/// Returns an overflow `WriteError` when `len` does not fit.
pub fn encode_len(what: &str, len: usize) -> StoreResult<i32> {
    i32::try_from(len).map_err(|_| StoreError::overflow(what, len, i32::MAX as usize))
}

/// Backend producing log-structured stores on disk
#[derive(Debug, Clone, Default)]
pub struct LogBackend;

impl LogBackend {
    /// Create the backend
    pub fn new() -> Self {
        LogBackend
    }

    /// Path of the record log for a store location
    pub fn log_path(location: &Path) -> PathBuf {
        location.join(LOG_FILE_NAME)
    }
}

impl Backend for LogBackend {
    fn name(&self) -> &str {
        "log"
    }

    fn open(&self, location: &Path) -> StoreResult<Arc<dyn Store>> {
        Ok(Arc::new(self.open_log(location)?))
    }
}

impl LogBackend {
    fn open_log(&self, location: &Path) -> StoreResult<LogStore> {
        let open_err = |e: io::Error| {
            StoreError::open(format!("'{}': {}", location.display(), e))
        };
        fs::create_dir_all(location).map_err(open_err)?;
        let path = Self::log_path(location);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(open_err)?;

        let file_len = file.metadata().map_err(open_err)?.len();
        let (index, valid_len) = replay(&mut file, file_len).map_err(open_err)?;
        if valid_len < file_len {
            warn!(
                target: "kvprobe::storage",
                path = %path.display(),
                valid_len,
                file_len,
                "Truncating torn log tail"
            );
            file.set_len(valid_len).map_err(open_err)?;
        }
        file.seek(SeekFrom::Start(valid_len)).map_err(open_err)?;

        debug!(
            target: "kvprobe::storage",
            path = %path.display(),
            keys = index.len(),
            "Opened log store"
        );

        Ok(LogStore {
            inner: Arc::new(LogInner {
                index: Arc::new(RwLock::new(index)),
                closed: Arc::new(AtomicBool::new(false)),
                writer: Mutex::new(Some(LogWriter::new(file, valid_len))),
            }),
        })
    }
}

struct Record {
    kind: u8,
    key: Vec<u8>,
    encoded_len: u64,
}

/// Rebuild the key index from the file. Returns the index and the length
/// of the valid prefix; anything after it is a torn or corrupt tail.
fn replay(file: &mut File, file_len: u64) -> io::Result<(BTreeMap<Vec<u8>, u64>, u64)> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut *file);
    let mut index = BTreeMap::new();
    let mut offset = 0u64;
    while let Some(record) = read_record(&mut reader, file_len - offset)? {
        match record.kind {
            RECORD_PUT => {
                index.insert(record.key, offset);
            }
            _ => {
                index.remove(&record.key);
            }
        }
        offset += record.encoded_len;
    }
    Ok((index, offset))
}

fn eof_as_none<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read one record of at most `available` bytes; `None` on clean end of
/// file or an unusable record.
fn read_record<R: Read>(r: &mut R, available: u64) -> io::Result<Option<Record>> {
    let Some(kind) = eof_as_none(r.read_u8())? else {
        return Ok(None);
    };
    if kind != RECORD_PUT && kind != RECORD_DELETE {
        return Ok(None);
    }
    let Some(key_len) = eof_as_none(r.read_i32::<LittleEndian>())? else {
        return Ok(None);
    };
    let Some(value_len) = eof_as_none(r.read_i32::<LittleEndian>())? else {
        return Ok(None);
    };
    if key_len < 0 || value_len < 0 {
        return Ok(None);
    }
    let encoded_len = (RECORD_HEADER_SIZE + CRC_SIZE) as u64 + key_len as u64 + value_len as u64;
    // Lengths from a torn header must not drive the key allocation.
    if encoded_len > available {
        return Ok(None);
    }

    let mut hasher = Hasher::new();
    hasher.update(&[kind]);
    hasher.update(&key_len.to_le_bytes());
    hasher.update(&value_len.to_le_bytes());

    let mut key = vec![0u8; key_len as usize];
    if eof_as_none(r.read_exact(&mut key))?.is_none() {
        return Ok(None);
    }
    hasher.update(&key);

    // Stream the value through the checksum instead of materialising it.
    let mut remaining = value_len as u64;
    let mut chunk = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let take = remaining.min(chunk.len() as u64) as usize;
        if eof_as_none(r.read_exact(&mut chunk[..take]))?.is_none() {
            return Ok(None);
        }
        hasher.update(&chunk[..take]);
        remaining -= take as u64;
    }

    let Some(crc) = eof_as_none(r.read_u32::<LittleEndian>())? else {
        return Ok(None);
    };
    if crc != hasher.finalize() {
        return Ok(None);
    }

    Ok(Some(Record {
        kind,
        key,
        encoded_len,
    }))
}

fn write_record<W: Write>(w: &mut W, kind: u8, key: &[u8], value: &[u8]) -> StoreResult<u64> {
    let key_len = encode_len("key", key.len())?;
    let value_len = encode_len("value", value.len())?;

    let mut header = Vec::with_capacity(RECORD_HEADER_SIZE);
    header.write_u8(kind)?;
    header.write_i32::<LittleEndian>(key_len)?;
    header.write_i32::<LittleEndian>(value_len)?;

    let mut hasher = Hasher::new();
    hasher.update(&header);
    hasher.update(key);
    hasher.update(value);

    w.write_all(&header)?;
    w.write_all(key)?;
    w.write_all(value)?;
    w.write_u32::<LittleEndian>(hasher.finalize())?;

    Ok((RECORD_HEADER_SIZE + key.len() + value.len() + CRC_SIZE) as u64)
}

enum Op<'a> {
    Put(&'a [u8], &'a [u8]),
    Delete(&'a [u8]),
}

fn encode_ops<W: Write>(w: &mut W, mut tail: u64, ops: &[Op<'_>]) -> StoreResult<(Vec<u64>, u64)> {
    let mut offsets = Vec::with_capacity(ops.len());
    for op in ops {
        offsets.push(tail);
        tail += match op {
            Op::Put(key, value) => write_record(w, RECORD_PUT, key, value)?,
            Op::Delete(key) => write_record(w, RECORD_DELETE, key, &[])?,
        };
    }
    Ok((offsets, tail))
}

struct LogWriter {
    out: BufWriter<File>,
    /// End of the last acknowledged record
    tail: u64,
    /// Bytes the next append may write before failing
    #[cfg(test)]
    write_budget: Option<u64>,
}

impl LogWriter {
    fn new(file: File, tail: u64) -> Self {
        LogWriter {
            out: BufWriter::new(file),
            tail,
            #[cfg(test)]
            write_budget: None,
        }
    }

    /// Write `ops` and flush them. Returns each record's offset; `tail`
    /// only moves once every byte is out.
    fn append(&mut self, ops: &[Op<'_>], durable: bool) -> StoreResult<Vec<u64>> {
        #[cfg(test)]
        let encoded = match self.write_budget.take() {
            Some(left) => encode_ops(&mut BudgetWriter { inner: &mut self.out, left }, self.tail, ops),
            None => encode_ops(&mut self.out, self.tail, ops),
        };
        #[cfg(not(test))]
        let encoded = encode_ops(&mut self.out, self.tail, ops);

        let (offsets, tail) = encoded?;
        self.out.flush()?;
        if durable {
            self.out.get_ref().sync_data()?;
        }
        self.tail = tail;
        Ok(offsets)
    }

    /// Drop buffered bytes and cut the file back to the last acknowledged
    /// record.
    fn rollback(self) -> io::Result<LogWriter> {
        let tail = self.tail;
        let (mut file, _unwritten) = self.out.into_parts();
        file.set_len(tail)?;
        file.seek(SeekFrom::Start(tail))?;
        Ok(LogWriter::new(file, tail))
    }
}

/// Passes writes through until `left` bytes are used, then fails like a
/// full disk.
#[cfg(test)]
struct BudgetWriter<'a, W: Write> {
    inner: &'a mut W,
    left: u64,
}

#[cfg(test)]
impl<W: Write> Write for BudgetWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.left == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "file size limit exceeded"));
        }
        let take = (buf.len() as u64).min(self.left) as usize;
        let n = self.inner.write(&buf[..take])?;
        self.left -= n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct LogInner {
    index: SharedMap<u64>,
    closed: Arc<AtomicBool>,
    writer: Mutex<Option<LogWriter>>,
}

impl LogInner {
    /// Append `ops` and publish them to the index together.
    fn append(&self, ops: &[Op<'_>], durable: bool) -> StoreResult<()> {
        for op in ops {
            if let Op::Put(key, value) = op {
                encode_len("key", key.len())?;
                encode_len("value", value.len())?;
            }
        }

        let mut guard = self.writer.lock();
        let written = guard
            .as_mut()
            .ok_or_else(|| StoreError::write("store is closed or its log is unusable"))?
            .append(ops, durable);
        let offsets = match written {
            Ok(offsets) => offsets,
            Err(e) => {
                // A partial record must not sit in front of the next write.
                if let Some(writer) = guard.take() {
                    match writer.rollback() {
                        Ok(writer) => *guard = Some(writer),
                        Err(rollback) => warn!(
                            target: "kvprobe::storage",
                            error = %rollback,
                            "Failed to roll back a partial append; rejecting further writes"
                        ),
                    }
                }
                return Err(e);
            }
        };

        let mut index = self.index.write();
        for (op, offset) in ops.iter().zip(offsets) {
            match op {
                Op::Put(key, _) => {
                    index.insert(key.to_vec(), offset);
                }
                Op::Delete(key) => {
                    index.remove(*key);
                }
            }
        }
        Ok(())
    }
}

/// A store backed by one record log
pub struct LogStore {
    inner: Arc<LogInner>,
}

impl Store for LogStore {
    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.inner.append(&[Op::Put(key, value)], false)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.inner.append(&[Op::Delete(key)], false)
    }

    fn batch(&self) -> StoreResult<Box<dyn Batch>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StoreError::write("store is closed"));
        }
        Ok(Box::new(LogBatch {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
            released: false,
        }))
    }

    fn iterate(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> StoreResult<Box<dyn Cursor>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StoreError::iterate("store is closed"));
        }
        Ok(Box::new(LiveCursor::open(
            Arc::clone(&self.inner.index),
            Arc::clone(&self.inner.closed),
            start,
            end,
        )))
    }

    fn close(&self) -> StoreResult<()> {
        let writer = self
            .inner
            .writer
            .lock()
            .take()
            .ok_or_else(|| StoreError::close("store already closed"))?;
        self.inner.closed.store(true, Ordering::Release);
        let file = writer
            .out
            .into_inner()
            .map_err(|e| StoreError::close(e.error().to_string()))?;
        file.sync_all()
            .map_err(|e| StoreError::close(e.to_string()))
    }
}

struct LogBatch {
    inner: Arc<LogInner>,
    staged: Vec<(Vec<u8>, Vec<u8>)>,
    released: bool,
}

impl Batch for LogBatch {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        if self.released {
            return Err(StoreError::write("batch is closed"));
        }
        encode_len("key", key.len())?;
        encode_len("value", value.len())?;
        self.staged.push((key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn commit(&mut self, durable: bool) -> StoreResult<()> {
        if self.released {
            return Err(StoreError::write("batch is closed"));
        }
        let ops: Vec<Op<'_>> = self
            .staged
            .iter()
            .map(|(k, v)| Op::Put(k.as_slice(), v.as_slice()))
            .collect();
        self.inner.append(&ops, durable)?;
        self.staged.clear();
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        self.released = true;
        self.staged.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn keys(store: &dyn Store) -> Vec<Vec<u8>> {
        let mut cursor = store.iterate(None, None).unwrap();
        let mut out = Vec::new();
        while cursor.valid() {
            out.push(cursor.key().to_vec());
            cursor.advance().unwrap();
        }
        cursor.close().unwrap();
        out
    }

    #[test]
    fn test_encode_len_at_signed_boundary() {
        assert_eq!(encode_len("value", i32::MAX as usize).unwrap(), i32::MAX);
        let err = encode_len("value", i32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));
        assert!(err.to_string().contains("2147483648"));
    }

    #[test]
    fn test_reopen_replays_puts_and_deletes() {
        let dir = tempdir().unwrap();
        let backend = LogBackend::new();
        {
            let store = backend.open(dir.path()).unwrap();
            store.set(b"a", b"1").unwrap();
            store.set(b"b", b"2").unwrap();
            store.set(b"c", b"3").unwrap();
            store.delete(b"b").unwrap();
            store.close().unwrap();
        }
        let store = backend.open(dir.path()).unwrap();
        assert_eq!(keys(store.as_ref()), vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_torn_tail_is_truncated_on_open() {
        let dir = tempdir().unwrap();
        let backend = LogBackend::new();
        {
            let store = backend.open(dir.path()).unwrap();
            store.set(b"a", b"1").unwrap();
            store.set(b"b", b"2").unwrap();
            store.close().unwrap();
        }
        let path = LogBackend::log_path(dir.path());
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 2).unwrap();
        drop(file);

        let store = backend.open(dir.path()).unwrap();
        assert_eq!(keys(store.as_ref()), vec![b"a".to_vec()]);
        let record_len = (RECORD_HEADER_SIZE + CRC_SIZE + 2) as u64;
        assert_eq!(fs::metadata(&path).unwrap().len(), record_len);
    }

    #[test]
    fn test_failed_append_leaves_no_partial_record() {
        let dir = tempdir().unwrap();
        let backend = LogBackend::new();
        let path = LogBackend::log_path(dir.path());
        let store = backend.open_log(dir.path()).unwrap();
        store.set(b"a", b"1").unwrap();
        let acknowledged = fs::metadata(&path).unwrap().len();

        // Enough budget for part of the value to reach the file.
        store.inner.writer.lock().as_mut().unwrap().write_budget = Some(20_000);
        let big = vec![7u8; 64 * 1024];
        assert!(store.set(b"b", &big).is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), acknowledged);

        store.set(b"c", b"3").unwrap();
        store.close().unwrap();

        let reopened = backend.open(dir.path()).unwrap();
        assert_eq!(keys(reopened.as_ref()), vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_failed_batch_commit_rolls_back_every_record() {
        let dir = tempdir().unwrap();
        let backend = LogBackend::new();
        let store = backend.open_log(dir.path()).unwrap();
        store.set(b"a", b"1").unwrap();

        store.inner.writer.lock().as_mut().unwrap().write_budget = Some(40);
        let mut batch = store.batch().unwrap();
        for i in 0..10u8 {
            batch.set(&[b'k', i], b"value").unwrap();
        }
        assert!(batch.commit(true).is_err());
        batch.close().unwrap();
        assert_eq!(keys(&store), vec![b"a".to_vec()]);

        store.set(b"z", b"9").unwrap();
        store.close().unwrap();
        let reopened = backend.open(dir.path()).unwrap();
        assert_eq!(keys(reopened.as_ref()), vec![b"a".to_vec(), b"z".to_vec()]);
    }

    #[test]
    fn test_oversized_length_in_torn_header_is_not_allocated() {
        let mut header = vec![RECORD_PUT];
        header.extend_from_slice(&i32::MAX.to_le_bytes());
        header.extend_from_slice(&0i32.to_le_bytes());
        header.extend_from_slice(b"tail");
        let available = header.len() as u64;
        assert!(read_record(&mut header.as_slice(), available).unwrap().is_none());

        let dir = tempdir().unwrap();
        let backend = LogBackend::new();
        {
            let store = backend.open(dir.path()).unwrap();
            store.set(b"a", b"1").unwrap();
            store.close().unwrap();
        }
        let path = LogBackend::log_path(dir.path());
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&header).unwrap();
        drop(file);

        let store = backend.open(dir.path()).unwrap();
        assert_eq!(keys(store.as_ref()), vec![b"a".to_vec()]);
        let record_len = (RECORD_HEADER_SIZE + CRC_SIZE + 2) as u64;
        assert_eq!(fs::metadata(&path).unwrap().len(), record_len);
    }

    #[test]
    fn test_corrupt_checksum_stops_replay() {
        let dir = tempdir().unwrap();
        let backend = LogBackend::new();
        {
            let store = backend.open(dir.path()).unwrap();
            store.set(b"a", b"1").unwrap();
            store.close().unwrap();
        }
        let path = LogBackend::log_path(dir.path());
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let store = backend.open(dir.path()).unwrap();
        assert!(keys(store.as_ref()).is_empty());
    }

    #[test]
    fn test_batch_commit_is_durable_across_reopen() {
        let dir = tempdir().unwrap();
        let backend = LogBackend::new();
        {
            let store = backend.open(dir.path()).unwrap();
            let mut batch = store.batch().unwrap();
            for i in 0..50u8 {
                batch.set(&[i], &[i; 32]).unwrap();
            }
            batch.commit(true).unwrap();
            batch.close().unwrap();
            assert_eq!(keys(store.as_ref()).len(), 50);
            store.close().unwrap();
        }
        let store = backend.open(dir.path()).unwrap();
        assert_eq!(keys(store.as_ref()).len(), 50);
    }

    #[test]
    fn test_delete_while_iterating_empties_store() {
        let dir = tempdir().unwrap();
        let store = LogBackend::new().open(dir.path()).unwrap();
        for i in 0..20u8 {
            store.set(&[i], b"v").unwrap();
        }
        let mut cursor = store.iterate(None, None).unwrap();
        let mut visited = 0;
        while cursor.valid() {
            let key = cursor.key().to_vec();
            store.delete(&key).unwrap();
            visited += 1;
            cursor.advance().unwrap();
        }
        cursor.close().unwrap();
        assert_eq!(visited, 20);
        assert!(keys(store.as_ref()).is_empty());
    }

    #[test]
    fn test_close_twice_reports_error() {
        let dir = tempdir().unwrap();
        let store = LogBackend::new().open(dir.path()).unwrap();
        store.close().unwrap();
        assert!(matches!(store.close(), Err(StoreError::Close(_))));
        assert!(store.set(b"k", b"v").is_err());
    }
}
