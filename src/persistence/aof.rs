//! Append-Only File
//!
//! Every accepted write command is appended to a flat file as a RESP array
//! of bulk strings, `[OPERATION, arg1, arg2, ...]`. There is no header,
//! checksum or record count: the array and bulk string lengths frame each
//! record. Records are never rewritten; the only bytes ever removed are
//! those of a batch whose write failed partway.
//!
//! ## Loading
//!
//! [`Aof::load`] reads the whole file and walks it one value at a time with
//! [`RespParser::decode_one`], skipping bare CR/LF bytes between records.
//! The first value that fails to decode ends the walk and everything before
//! it is kept, so a record torn by a crash mid-append loses only itself.

use crate::protocol::{ProtocolError, RespParser, RespValue};
use bytes::Bytes;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex as StdMutex, PoisonError};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

/// Errors raised by the append-only file.
#[derive(Debug, Error)]
pub enum AofError {
    #[error("persistence write failed on {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read append-only file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] ProtocolError),
}

/// One logged command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AofRecord {
    pub operation: String,
    pub args: Vec<String>,
}

impl AofRecord {
    pub fn new(operation: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            operation: operation.into(),
            args,
        }
    }

    /// The wire form of the record: an array of bulk strings.
    pub fn to_resp(&self) -> RespValue {
        command_to_resp(&self.operation, &self.args)
    }

    /// Builds a record from a decoded value.
    ///
    /// Returns `None` unless the value is a non-empty array whose elements
    /// are all UTF-8 strings.
    pub fn from_resp(value: RespValue) -> Option<Self> {
        let mut parts = value
            .into_array()?
            .into_iter()
            .map(|element| element.as_str().map(str::to_string))
            .collect::<Option<Vec<String>>>()?
            .into_iter();

        let operation = parts.next()?;
        Some(Self {
            operation,
            args: parts.collect(),
        })
    }
}

fn command_to_resp(operation: &str, args: &[String]) -> RespValue {
    let mut elements = Vec::with_capacity(args.len() + 1);
    elements.push(RespValue::bulk_string(Bytes::copy_from_slice(
        operation.as_bytes(),
    )));
    elements.extend(
        args.iter()
            .map(|arg| RespValue::bulk_string(Bytes::copy_from_slice(arg.as_bytes()))),
    );
    RespValue::array(elements)
}

/// The append-only command log.
///
/// An append happens in two steps. [`Aof::enqueue`] is synchronous and
/// fixes the record's position in the log; callers run it while they still
/// hold the lock that ordered the mutation, so the log order is the order
/// in which writes were applied. [`Aof::commit`] then writes every queued
/// record, oldest first, and reports whether this record reached the file.
///
/// A batch that fails partway is cut back off the file so later records
/// never land behind a torn one. If that cut fails too, the log refuses all
/// further appends.
#[derive(Debug)]
pub struct Aof {
    path: PathBuf,
    enabled: bool,
    queue: StdMutex<VecDeque<Queued>>,
    writer: Mutex<Writer>,
}

/// A record waiting to be written.
#[derive(Debug)]
struct Queued {
    bytes: Vec<u8>,
    done: oneshot::Sender<io::Result<()>>,
}

/// Ticket for an enqueued record; hand it to [`Aof::commit`].
#[derive(Debug)]
#[must_use = "an enqueued record is only written by Aof::commit"]
pub struct PendingAppend {
    done: Option<oneshot::Receiver<io::Result<()>>>,
}

#[derive(Debug, Default)]
struct Writer {
    file: Option<File>,
    /// A torn record could not be cut off the end of the file
    damaged: bool,
}

impl Aof {
    /// Creates a log at `path`. Nothing is opened until the first append.
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            queue: StdMutex::new(VecDeque::new()),
            writer: Mutex::new(Writer::default()),
        }
    }

    /// A log that never writes and always loads empty.
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserves the next position in the log for one command.
    ///
    /// Does not touch the file. Does nothing when the log is disabled.
    pub fn enqueue(&self, operation: &str, args: &[String]) -> Result<PendingAppend, AofError> {
        if !self.is_enabled() {
            return Ok(PendingAppend { done: None });
        }

        let bytes = command_to_resp(operation, args).encode()?;
        let (done, receiver) = oneshot::channel();
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Queued { bytes, done });

        Ok(PendingAppend {
            done: Some(receiver),
        })
    }

    /// Writes everything queued so far and waits for `pending` to land.
    pub async fn commit(&self, pending: PendingAppend) -> Result<(), AofError> {
        let Some(done) = pending.done else {
            return Ok(());
        };

        self.write_queued().await;

        let written = match done.await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "append abandoned before it reached the file",
            )),
        };
        written.map_err(|source| self.write_failed(source))
    }

    /// Appends one command to the end of the file, creating it if needed.
    ///
    /// Does nothing when the log is disabled.
    pub async fn append(&self, operation: &str, args: &[String]) -> Result<(), AofError> {
        let pending = self.enqueue(operation, args)?;
        self.commit(pending).await
    }

    /// Drains the queue into the file as one batch.
    async fn write_queued(&self) {
        let mut writer = self.writer.lock().await;

        let batch: Vec<Queued> = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if batch.is_empty() {
            // An earlier commit already wrote our record
            return;
        }

        let mut bytes = Vec::with_capacity(batch.iter().map(|q| q.bytes.len()).sum());
        for queued in &batch {
            bytes.extend_from_slice(&queued.bytes);
        }

        let result = writer.write_batch(&self.path, &bytes).await;
        match &result {
            Ok(()) => debug!(records = batch.len(), bytes = bytes.len(), "Appended records"),
            Err(e) => error!(
                path = %self.path.display(),
                records = batch.len(),
                error = %e,
                "Append failed"
            ),
        }

        for queued in batch {
            let outcome = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = queued.done.send(outcome);
        }
    }

    /// Reads every decodable record, oldest first.
    ///
    /// A disabled log or a missing file yields no records.
    pub async fn load(&self) -> Result<Vec<AofRecord>, AofError> {
        if !self.is_enabled() {
            return Ok(Vec::new());
        }

        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Append-only file not found, starting empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(AofError::ReadFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let records = parse_records(&data);
        info!(
            path = %self.path.display(),
            bytes = data.len(),
            records = records.len(),
            "Loaded append-only file"
        );
        Ok(records)
    }

    fn write_failed(&self, source: io::Error) -> AofError {
        AofError::WriteFailed {
            path: self.path.clone(),
            source,
        }
    }
}

impl Writer {
    async fn write_batch(&mut self, path: &Path, batch: &[u8]) -> io::Result<()> {
        if self.damaged {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "log ends in a torn record that could not be removed",
            ));
        }

        let mut file = match self.file.take() {
            Some(file) => file,
            None => {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?
            }
        };

        match append_or_rollback(&mut file, batch).await {
            Ok(()) => {
                self.file = Some(file);
                Ok(())
            }
            // The handle is dropped and reopened on the next batch
            Err(AppendFailure::RolledBack(e)) => Err(e),
            Err(AppendFailure::Torn(e)) => {
                self.damaged = true;
                Err(e)
            }
        }
    }
}

/// The file operations an append needs.
trait LogFile {
    async fn end(&mut self) -> io::Result<u64>;
    async fn write_all_synced(&mut self, data: &[u8]) -> io::Result<()>;
    async fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    async fn end(&mut self) -> io::Result<u64> {
        Ok(self.metadata().await?.len())
    }

    async fn write_all_synced(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data).await?;
        self.flush().await
    }

    async fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len).await
    }
}

#[derive(Debug)]
enum AppendFailure {
    /// Nothing of the batch is left in the file
    RolledBack(io::Error),
    /// Part of the batch may still be in the file
    Torn(io::Error),
}

async fn append_or_rollback<F: LogFile>(file: &mut F, batch: &[u8]) -> Result<(), AppendFailure> {
    let start = file.end().await.map_err(AppendFailure::RolledBack)?;

    let Err(e) = file.write_all_synced(batch).await else {
        return Ok(());
    };

    match file.truncate(start).await {
        Ok(()) => {
            warn!(offset = start, "Removed partially written records");
            Err(AppendFailure::RolledBack(e))
        }
        Err(truncate_err) => {
            error!(
                offset = start,
                error = %truncate_err,
                "Could not remove partially written records"
            );
            Err(AppendFailure::Torn(e))
        }
    }
}

/// Walks a buffer of concatenated records.
pub fn parse_records(data: &[u8]) -> Vec<AofRecord> {
    let mut parser = RespParser::new();
    let mut records = Vec::new();
    let mut pos = skip_terminators(data, 0);

    while pos < data.len() {
        match parser.decode_one(data, pos) {
            Ok((value, next)) => {
                match AofRecord::from_resp(value) {
                    Some(record) => records.push(record),
                    None => debug!(offset = pos, "Skipping non-command value"),
                }
                pos = skip_terminators(data, next);
            }
            Err(e) => {
                warn!(
                    offset = pos,
                    error = %e,
                    kept = records.len(),
                    "Stopping at undecodable record"
                );
                break;
            }
        }
    }

    records
}

fn skip_terminators(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && matches!(data[pos], b'\r' | b'\n') {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TempPath;
    use tokio_test::{assert_err, assert_ok};

    fn record(op: &str, args: &[&str]) -> AofRecord {
        AofRecord::new(op, args.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_append_writes_resp_arrays() {
        let tmp = TempPath::new("append");
        let aof = Aof::new(tmp.path(), true);

        assert_ok!(aof.append("SET", &["k".to_string(), "v1".to_string()]).await);
        assert_ok!(aof.append("DEL", &["k".to_string()]).await);

        let contents = std::fs::read(tmp.path()).unwrap();
        assert_eq!(
            contents,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$2\r\nv1\r\n*2\r\n$3\r\nDEL\r\n$1\r\nk\r\n"
        );
    }

    #[tokio::test]
    async fn test_append_never_truncates() {
        let tmp = TempPath::new("preserve");
        std::fs::write(tmp.path(), b"*1\r\n$8\r\nFLUSHALL\r\n").unwrap();

        let aof = Aof::new(tmp.path(), true);
        assert_ok!(aof.append("INCR", &["n".to_string()]).await);

        let records = aof.load().await.unwrap();
        assert_eq!(records, vec![record("FLUSHALL", &[]), record("INCR", &["n"])]);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let tmp = TempPath::new("missing");
        let aof = Aof::new(tmp.path(), true);
        assert_eq!(aof.load().await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn test_disabled_log_is_inert() {
        let tmp = TempPath::new("disabled");
        std::fs::write(tmp.path(), b"*2\r\n$3\r\nDEL\r\n$1\r\nk\r\n").unwrap();

        let aof = Aof::new(tmp.path(), false);
        assert!(aof.load().await.unwrap().is_empty());
        assert_ok!(aof.append("SET", &["a".to_string(), "b".to_string()]).await);

        let contents = std::fs::read(tmp.path()).unwrap();
        assert_eq!(contents, b"*2\r\n$3\r\nDEL\r\n$1\r\nk\r\n");
    }

    #[tokio::test]
    async fn test_append_failure_is_reported() {
        let tmp = TempPath::new("no-such-dir");
        let aof = Aof::new(tmp.path().join("nested").join("appendonly.aof"), true);

        let err = assert_err!(aof.append("SET", &["k".to_string(), "v".to_string()]).await);
        assert!(matches!(err, AofError::WriteFailed { .. }));
        assert!(err.to_string().starts_with("persistence write failed"));
    }

    #[tokio::test]
    async fn test_load_unreadable_path_fails() {
        let tmp = TempPath::new("is-a-dir");
        std::fs::create_dir_all(tmp.path()).unwrap();

        let aof = Aof::new(tmp.path(), true);
        let err = assert_err!(aof.load().await);
        assert!(matches!(err, AofError::ReadFailed { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_record_boundaries() {
        let tmp = TempPath::new("concurrent");
        let aof = std::sync::Arc::new(Aof::new(tmp.path(), true));

        let mut tasks = Vec::new();
        for i in 0..32 {
            let aof = std::sync::Arc::clone(&aof);
            tasks.push(tokio::spawn(async move {
                aof.append("SET", &[format!("key:{}", i), "x".repeat(512)])
                    .await
            }));
        }
        for task in tasks {
            assert_ok!(task.await.unwrap());
        }

        let records = aof.load().await.unwrap();
        assert_eq!(records.len(), 32);
        assert!(records.iter().all(|r| r.operation == "SET" && r.args[1].len() == 512));
    }

    /// A file that accepts only the first `keep` bytes of a write, then fails.
    struct TearingFile {
        inner: File,
        keep: usize,
        truncate_fails: bool,
    }

    impl LogFile for TearingFile {
        async fn end(&mut self) -> io::Result<u64> {
            self.inner.end().await
        }

        async fn write_all_synced(&mut self, data: &[u8]) -> io::Result<()> {
            let keep = self.keep.min(data.len());
            self.inner.write_all_synced(&data[..keep]).await?;
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
        }

        async fn truncate(&mut self, len: u64) -> io::Result<()> {
            if self.truncate_fails {
                return Err(io::Error::new(io::ErrorKind::Other, "read-only file system"));
            }
            self.inner.truncate(len).await
        }
    }

    async fn tearing_file(path: &Path, keep: usize, truncate_fails: bool) -> TearingFile {
        let inner = OpenOptions::new().append(true).open(path).await.unwrap();
        TearingFile {
            inner,
            keep,
            truncate_fails,
        }
    }

    fn encoded(op: &str, args: &[&str]) -> Vec<u8> {
        record(op, args).to_resp().encode().unwrap()
    }

    #[tokio::test]
    async fn test_failed_write_is_cut_off_the_file() {
        let tmp = TempPath::new("torn");
        let aof = Aof::new(tmp.path(), true);
        assert_ok!(aof.append("SET", &["a".to_string(), "1".to_string()]).await);
        let before = std::fs::read(tmp.path()).unwrap();

        let mut file = tearing_file(tmp.path(), 10, false).await;
        let failed = append_or_rollback(&mut file, &encoded("SET", &["b", "2"])).await;
        assert!(matches!(failed, Err(AppendFailure::RolledBack(_))));
        assert_eq!(std::fs::read(tmp.path()).unwrap(), before);

        // Records written after the failure are still readable on restart.
        assert_ok!(aof.append("SET", &["c".to_string(), "3".to_string()]).await);
        assert_eq!(
            Aof::new(tmp.path(), true).load().await.unwrap(),
            vec![record("SET", &["a", "1"]), record("SET", &["c", "3"])]
        );
    }

    #[tokio::test]
    async fn test_unremovable_fragment_is_reported_torn() {
        let tmp = TempPath::new("torn-stuck");
        std::fs::write(tmp.path(), encoded("SET", &["a", "1"])).unwrap();

        let mut file = tearing_file(tmp.path(), 10, true).await;
        let failed = append_or_rollback(&mut file, &encoded("SET", &["b", "2"])).await;
        assert!(matches!(failed, Err(AppendFailure::Torn(_))));
    }

    #[tokio::test]
    async fn test_damaged_log_refuses_appends() {
        let tmp = TempPath::new("damaged");
        let aof = Aof::new(tmp.path(), true);
        assert_ok!(aof.append("SET", &["a".to_string(), "1".to_string()]).await);

        aof.writer.lock().await.damaged = true;

        let err = assert_err!(aof.append("SET", &["b".to_string(), "2".to_string()]).await);
        assert!(matches!(err, AofError::WriteFailed { .. }));
        assert_eq!(
            aof.load().await.unwrap(),
            vec![record("SET", &["a", "1"])]
        );
    }

    #[tokio::test]
    async fn test_enqueue_order_is_log_order() {
        let tmp = TempPath::new("enqueue");
        let aof = Aof::new(tmp.path(), true);

        let first = aof.enqueue("SET", &["k".to_string(), "1".to_string()]).unwrap();
        let second = aof.enqueue("SET", &["k".to_string(), "2".to_string()]).unwrap();

        // Committing the later ticket first still writes both, in queue order.
        assert_ok!(aof.commit(second).await);
        assert_ok!(aof.commit(first).await);

        assert_eq!(
            aof.load().await.unwrap(),
            vec![record("SET", &["k", "1"]), record("SET", &["k", "2"])]
        );
    }

    #[tokio::test]
    async fn test_disabled_log_enqueues_nothing() {
        let aof = Aof::disabled();
        assert!(!aof.is_enabled());

        let pending = aof.enqueue("SET", &["k".to_string(), "v".to_string()]).unwrap();
        assert_ok!(aof.commit(pending).await);
        assert!(aof.queue.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parse_records_skips_bare_terminators() {
        let data = b"\r\n*1\r\n$4\r\nPING\r\n\r\n\n*2\r\n$3\r\nDEL\r\n$1\r\na\r\n\r\n";
        assert_eq!(
            parse_records(data),
            vec![record("PING", &[]), record("DEL", &["a"])]
        );
    }

    #[test]
    fn test_parse_records_skips_non_arrays() {
        let data = b"+OK\r\n:5\r\n*2\r\n$3\r\nDEL\r\n$1\r\na\r\n*0\r\n";
        assert_eq!(parse_records(data), vec![record("DEL", &["a"])]);
    }

    #[test]
    fn test_parse_records_tolerates_torn_tail() {
        let mut data = Vec::new();
        data.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n");
        data.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\nb\r\n$1\r\n2\r\n");
        data.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\nc\r\n$20\r\nonly-part");

        assert_eq!(
            parse_records(&data),
            vec![record("SET", &["a", "1"]), record("SET", &["b", "2"])]
        );
    }

    #[test]
    fn test_parse_records_stops_at_garbage() {
        let data = b"*1\r\n$8\r\nFLUSHALL\r\n@@garbage\r\n*1\r\n$4\r\nPING\r\n";
        assert_eq!(parse_records(data), vec![record("FLUSHALL", &[])]);
    }

    #[test]
    fn test_record_from_resp() {
        let value = record("SET", &["k", "v"]).to_resp();
        assert_eq!(
            AofRecord::from_resp(value),
            Some(record("SET", &["k", "v"]))
        );
        assert_eq!(AofRecord::from_resp(RespValue::array(vec![])), None);
        assert_eq!(
            AofRecord::from_resp(RespValue::array(vec![RespValue::integer(1)])),
            None
        );
        assert_eq!(AofRecord::from_resp(RespValue::Null), None);
    }
}
