use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use fnv::FnvHashSet;
use serde::Serialize;

use crate::{
    data::SampleBatch,
    error::{AdapterResult, Error},
    session::Session,
    sink::{SinkHandle, SinkOps},
};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// On-disk representation a [`FileSink`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// One header row per source (stat names as columns), then one data
    /// row per batch.
    Csv,
    /// One JSON object per batch, newline separated.
    Json,
    /// Human-readable block per batch.
    Text,
}

/// Configuration for [`FileSink::create`].
pub struct FileSinkConfig {
    pub path: PathBuf,
    pub format: FileFormat,
    /// Append to an existing file instead of truncating it.
    pub append: bool,
    /// I/O buffer size; zero picks the default (8 KiB).
    pub buffer_size: usize,
}

impl FileSinkConfig {
    pub fn new(path: impl Into<PathBuf>, format: FileFormat) -> Self {
        FileSinkConfig {
            path: path.into(),
            format,
            append: false,
            buffer_size: 0,
        }
    }
}

#[derive(Serialize)]
struct JsonStat<'a> {
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    value: u64,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    timestamp: u64,
    source_name: &'a str,
    source_id: u16,
    sample: u64,
    stats: Vec<JsonStat<'a>>,
}

/// Sink that writes each batch to a file in CSV, JSON or plain text.
///
/// Registers without the no-names flag: the CSV header and the readable
/// formats want the names each pass.
pub struct FileSink {
    writer: BufWriter<std::fs::File>,
    format: FileFormat,
    sample_count: u64,
    // Sources whose CSV header row has already been written.
    headers_written: FnvHashSet<u16>,
}

impl FileSink {
    /// Open (or create) the file and register the sink on the session.
    pub fn create(
        session: &Session,
        name: &str,
        config: FileSinkConfig,
    ) -> Result<SinkHandle, Error> {
        let mut options = OpenOptions::new();
        options.create(true).write(true);
        if config.append {
            options.append(true);
        } else {
            options.truncate(true);
        }
        let file = options
            .open(&config.path)
            .map_err(|err| Error::Adapter(err.to_string()))?;

        let buffer_size = if config.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            config.buffer_size
        };

        session.register_sink(
            name,
            FileSink {
                writer: BufWriter::with_capacity(buffer_size, file),
                format: config.format,
                sample_count: 0,
                headers_written: FnvHashSet::default(),
            },
        )
    }

    fn write_csv(&mut self, batch: &SampleBatch<'_>) -> std::io::Result<()> {
        if let Some(names) = batch.names() {
            if !self.headers_written.contains(&batch.source_id()) {
                write!(self.writer, "timestamp,source_name,source_id")?;
                for name in names {
                    write!(self.writer, ",{}", name)?;
                }
                writeln!(self.writer)?;
                self.headers_written.insert(batch.source_id());
            }
        }

        write!(
            self.writer,
            "{},{},{}",
            epoch_secs(),
            batch.source_name(),
            batch.source_id()
        )?;
        for value in batch.values() {
            write!(self.writer, ",{}", value)?;
        }
        writeln!(self.writer)
    }

    fn write_json(&mut self, batch: &SampleBatch<'_>) -> std::io::Result<()> {
        let stats = batch
            .ids()
            .iter()
            .enumerate()
            .map(|(i, &id)| JsonStat {
                id,
                name: batch.names().map(|names| names[i].as_str()),
                value: batch.values()[i],
            })
            .collect();
        let record = JsonRecord {
            timestamp: epoch_secs(),
            source_name: batch.source_name(),
            source_id: batch.source_id(),
            sample: self.sample_count,
            stats,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        writeln!(self.writer)
    }

    fn write_text(&mut self, batch: &SampleBatch<'_>) -> std::io::Result<()> {
        writeln!(
            self.writer,
            "=== sample #{} at {} ===",
            self.sample_count,
            epoch_secs()
        )?;
        writeln!(
            self.writer,
            "source: {} (id={})",
            batch.source_name(),
            batch.source_id()
        )?;
        for (i, &id) in batch.ids().iter().enumerate() {
            match batch.names() {
                Some(names) => writeln!(
                    self.writer,
                    "  [{}] {:<40} : {}",
                    id,
                    names[i],
                    batch.values()[i]
                )?,
                None => writeln!(self.writer, "  [{}] : {}", id, batch.values()[i])?,
            }
        }
        writeln!(self.writer)
    }
}

impl SinkOps for FileSink {
    fn output(&mut self, batch: &SampleBatch<'_>) -> AdapterResult<()> {
        self.sample_count += 1;
        match self.format {
            FileFormat::Csv => self.write_csv(batch)?,
            FileFormat::Json => self.write_json(batch)?,
            FileFormat::Text => self.write_text(batch)?,
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StatDesc;
    use crate::source::SourceOps;

    struct ThreeStats;

    impl SourceOps for ThreeStats {
        fn names(&mut self, _source_id: u16) -> AdapterResult<Vec<StatDesc>> {
            Ok(vec![
                StatDesc::new(0, "rx_pkts"),
                StatDesc::new(1, "tx_pkts"),
                StatDesc::new(2, "errors"),
            ])
        }

        fn values(&mut self, _source_id: u16, ids: &[u64]) -> AdapterResult<Vec<u64>> {
            Ok(ids.iter().map(|id| id * 11).collect())
        }
    }

    fn sampled_file(format: FileFormat, passes: u32) -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");

        let session = Session::builder().build();
        session.register_source("nic0", 3, ThreeStats).unwrap();
        FileSink::create(&session, "file", FileSinkConfig::new(&path, format)).unwrap();
        session.start();
        for _ in 0..passes {
            session.sample().unwrap();
        }

        std::fs::read_to_string(&path).unwrap()
    }

    #[test]
    fn test_csv_header_written_once_per_source() {
        let out = sampled_file(FileFormat::Csv, 3);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "timestamp,source_name,source_id,rx_pkts,tx_pkts,errors");
        for line in &lines[1..] {
            assert!(line.ends_with(",nic0,3,0,11,22"), "line: {}", line);
        }
    }

    #[test]
    fn test_json_records_parse_back() {
        let out = sampled_file(FileFormat::Json, 2);
        let mut sample = 0;
        for line in out.lines() {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["source_name"], "nic0");
            assert_eq!(parsed["source_id"], 3);
            sample += 1;

            let stats = parsed["stats"].as_array().unwrap();
            assert_eq!(stats.len(), 3);
            assert_eq!(stats[2]["name"], "errors");
            assert_eq!(stats[2]["value"], 22);
        }
        assert_eq!(sample, 2);
    }

    #[test]
    fn test_text_format_names_the_source() {
        let out = sampled_file(FileFormat::Text, 1);
        assert!(out.contains("source: nic0 (id=3)"));
        assert!(out.contains("rx_pkts"));
    }

    #[test]
    fn test_append_preserves_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        std::fs::write(&path, "existing\n").unwrap();

        let session = Session::builder().build();
        session.register_source("nic0", 0, ThreeStats).unwrap();
        let mut config = FileSinkConfig::new(&path, FileFormat::Text);
        config.append = true;
        FileSink::create(&session, "file", config).unwrap();
        session.start();
        session.sample().unwrap();

        let out = std::fs::read_to_string(&path).unwrap();
        assert!(out.starts_with("existing\n"));
        assert!(out.contains("nic0"));
    }

    #[test]
    fn test_create_fails_on_unwritable_path() {
        let session = Session::builder().build();
        let config = FileSinkConfig::new("/nonexistent-dir/out", FileFormat::Csv);
        let err = FileSink::create(&session, "file", config).err();
        assert!(matches!(err, Some(Error::Adapter(_))));
    }
}
