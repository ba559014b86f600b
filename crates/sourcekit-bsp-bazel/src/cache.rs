//! On-disk cache of extracted target lists.
//!
//! One JSON file per user holds the most recent result for every label set
//! this server (or another instance for the same user) has been asked about.
//! Reads are cheap and immediate; writes funnel through a dedicated writer
//! thread so concurrent saves from the engine never interleave on the file.

use crate::target::BazelTarget;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    fs, io,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex,
    },
    time::SystemTime,
};

pub const CACHE_DIR_NAME: &str = ".bazel-sourcekit-bsp";
pub const CACHE_FILE_NAME: &str = "bazel-targets-cache.json";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cache key for a set of top-level labels: sorted and `|`-joined, so the
/// same labels in any order address the same entry.
pub fn cache_key(labels: &[String]) -> String {
    let mut labels = labels.to_vec();
    labels.sort();
    labels.join("|")
}

/// `~/.bazel-sourcekit-bsp/bazel-targets-cache.json`, shared by every server
/// process of the current user.
pub fn default_cache_path() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CACHE_DIR_NAME)
        .join(CACHE_FILE_NAME)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub targets: Vec<BazelTarget>,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFile {
    pub entries: HashMap<String, CacheEntry>,
}

impl CacheFile {
    /// A missing file is simply an empty cache; a corrupt one is treated the
    /// same so a bad write can never wedge the server.
    pub fn load(path: &Path) -> Self {
        let Ok(data) = fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&data).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct WriterState {
    queue: VecDeque<(String, Vec<BazelTarget>)>,
    writing: bool,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    state: Mutex<WriterState>,
    wake: Condvar,
    idle: Condvar,
}

/// Key-addressed target-list cache with a serialized writer.
#[derive(Debug, Clone)]
pub struct TargetCache {
    inner: Arc<Inner>,
}

impl TargetCache {
    pub fn new(path: PathBuf) -> Self {
        let inner = Arc::new(Inner {
            path,
            state: Mutex::new(WriterState::default()),
            wake: Condvar::new(),
            idle: Condvar::new(),
        });

        let for_thread = inner.clone();
        std::thread::Builder::new()
            .name("sourcekit-bsp-cache-writer".to_string())
            .spawn(move || writer_loop(for_thread))
            .expect("failed to spawn cache writer thread");

        Self { inner }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Return the cached target list for `key`, if any.
    pub fn load(&self, key: &str) -> Option<Vec<BazelTarget>> {
        if !self.inner.path.exists() {
            return None;
        }
        CacheFile::load(&self.inner.path)
            .entries
            .remove(key)
            .map(|entry| entry.targets)
    }

    /// Enqueue a save. Returns immediately; use [`TargetCache::flush`] to
    /// wait for the entry to be on disk.
    pub fn save(&self, key: String, targets: Vec<BazelTarget>) {
        let mut state = self.inner.state.lock().expect("cache writer lock poisoned");
        state.queue.push_back((key, targets));
        self.inner.wake.notify_all();
    }

    /// Block until every save enqueued so far has been written.
    pub fn flush(&self) {
        let mut state = self.inner.state.lock().expect("cache writer lock poisoned");
        while !state.queue.is_empty() || state.writing {
            state = self
                .inner
                .idle
                .wait(state)
                .expect("cache writer lock poisoned");
        }
    }
}

fn writer_loop(inner: Arc<Inner>) {
    loop {
        let (key, targets) = {
            let mut state = inner.state.lock().expect("cache writer lock poisoned");
            loop {
                if let Some(job) = state.queue.pop_front() {
                    state.writing = true;
                    break job;
                }
                state = inner.wake.wait(state).expect("cache writer lock poisoned");
            }
        };

        if let Err(err) = write_entry(&inner.path, &key, targets) {
            tracing::warn!(
                target = "sourcekit_bsp.cache",
                path = %inner.path.display(),
                "failed to write target cache: {err}"
            );
        }

        let mut state = inner.state.lock().expect("cache writer lock poisoned");
        state.writing = false;
        if state.queue.is_empty() {
            inner.idle.notify_all();
        }
    }
}

/// Read-modify-write of the full cache file. A read failure only costs the
/// other entries of that save, never the save itself.
fn write_entry(path: &Path, key: &str, targets: Vec<BazelTarget>) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("cache path has no parent"))?;
    fs::create_dir_all(parent)?;

    let mut cache = CacheFile::load(path);
    cache.entries.insert(
        key.to_string(),
        CacheEntry {
            targets,
            timestamp: SystemTime::now(),
        },
    );

    let data = serde_json::to_string_pretty(&cache)
        .map_err(|err| io::Error::other(err.to_string()))?;

    // Write to a unique sibling and rename, so readers (including other
    // server processes) never observe a half-written file.
    let tmp_path = unique_tmp_path(path, parent)?;
    let mut file = fs::File::create(&tmp_path)?;
    if let Err(err) = file
        .write_all(data.as_bytes())
        .and_then(|()| file.sync_all())
    {
        drop(file);
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

fn unique_tmp_path(dest: &Path, parent: &Path) -> io::Result<PathBuf> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("cache path has no file name"))?;
    let pid = std::process::id();
    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(format!(".tmp.{pid}.{counter}"));
    Ok(parent.join(tmp_name))
}
