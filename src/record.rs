// src/record.rs
//
// Episode record sinks. The runner emits one summary record per finished
// episode; sinks decide where it goes. Recording is observability, not
// control flow: a sink that cannot write must never fail an episode, so
// write errors are swallowed here.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::episode::EpisodeRecord;

/// Receives one record per finished episode.
pub trait EpisodeSink {
    fn record(&mut self, record: &EpisodeRecord);
}

/// Discards every record.
pub struct NoopSink;

impl EpisodeSink for NoopSink {
    fn record(&mut self, _record: &EpisodeRecord) {}
}

/// Appends records as JSON lines to a file.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl EpisodeSink for JsonlSink {
    fn record(&mut self, record: &EpisodeRecord) {
        // A full disk should not end a training run.
        if serde_json::to_writer(&mut self.writer, record).is_ok() {
            let _ = self.writer.write_all(b"\n");
            let _ = self.writer.flush();
        }
    }
}

impl<S: EpisodeSink + ?Sized> EpisodeSink for Box<S> {
    fn record(&mut self, record: &EpisodeRecord) {
        (**self).record(record);
    }
}
