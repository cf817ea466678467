use lifecycle::{HasLocation, OutputSink};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Logs each delivered result as a structured event.
#[derive(Debug, Default)]
pub struct LogSink {
    frame: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sinks that tag their output with the frame being reported.
pub trait FrameAware {
    fn begin_frame(&mut self, frame: u64);
}

/// Object-safe bundle of [`OutputSink`] and [`FrameAware`] for the service.
pub trait FrameSink<T>: OutputSink<T> + FrameAware {}

impl<T, S: OutputSink<T> + FrameAware> FrameSink<T> for S {}

impl FrameAware for LogSink {
    fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
    }
}

impl<T: Serialize + HasLocation> OutputSink<T> for LogSink {
    fn accept(&mut self, component: &str, results: &[&T]) -> anyhow::Result<()> {
        tracing::info!(
            component,
            frame = self.frame,
            results = results.len(),
            "Frame results"
        );
        for (index, result) in results.iter().enumerate() {
            tracing::info!(
                component,
                frame = self.frame,
                index,
                location = %result.location(),
                result = %serde_json::to_string(result)?,
                "Result"
            );
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Record<'a, T> {
    frame: u64,
    component: &'a str,
    index: usize,
    #[serde(flatten)]
    result: &'a T,
}

/// Writes one JSON object per result, one per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    frame: u64,
}

impl JsonLinesSink<BufWriter<File>> {
    /// Append to `path`, creating it if needed.
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::info!(path = %path.display(), "Writing results as JSON lines");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, frame: 0 }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameAware for JsonLinesSink<W> {
    fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
    }
}

impl<T: Serialize, W: Write> OutputSink<T> for JsonLinesSink<W> {
    fn accept(&mut self, component: &str, results: &[&T]) -> anyhow::Result<()> {
        for (index, result) in results.iter().enumerate() {
            let record = Record {
                frame: self.frame,
                component,
                index,
                result: *result,
            };
            serde_json::to_writer(&mut self.writer, &record)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
