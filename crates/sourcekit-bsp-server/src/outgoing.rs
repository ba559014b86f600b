//! Transport-agnostic sink for outgoing JSON-RPC messages.
//!
//! Responses are written from the dispatch loop, but `buildTarget/didChange`
//! and `build/sourceKitOptionsChanged` notifications can originate on the
//! engine's refresh thread, so every write goes through one sink.

use crate::codec::write_json_message;
use serde_json::{json, Value};
use std::io::{self, Write};
use std::sync::Mutex;

pub trait Outgoing: Send + Sync {
    fn send(&self, message: &Value) -> io::Result<()>;

    fn send_response(&self, id: Value, result: Value) -> io::Result<()> {
        self.send(&json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }

    fn send_error(&self, id: Value, code: i64, message: &str) -> io::Result<()> {
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }))
    }

    fn send_notification(&self, method: &str, params: Value) -> io::Result<()> {
        self.send(&json!({ "jsonrpc": "2.0", "method": method, "params": params }))
    }
}

/// Production sink: a mutex over the stdout handle (or any writer in tests).
pub struct WriterOutgoing<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterOutgoing<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().expect("outgoing writer poisoned")
    }
}

impl<W: Write + Send> Outgoing for WriterOutgoing<W> {
    fn send(&self, message: &Value) -> io::Result<()> {
        let mut writer = self.writer.lock().expect("outgoing writer poisoned");
        write_json_message(&mut *writer, message)
    }
}
