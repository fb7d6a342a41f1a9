use std::fs;
use std::path::PathBuf;

use netlab_abstract::{FlowTable, SeriesPoint};
use tracing::info;

use crate::collector::CollectedSeries;
use crate::error::HarnessError;

/// Writes the outputs of one run into a directory, named after the protocol.
#[derive(Debug, Clone)]
pub struct ResultSink {
    dir: PathBuf,
    prot: String,
}

impl ResultSink {
    pub fn new(dir: impl Into<PathBuf>, prot: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prot: prot.into(),
        }
    }

    pub fn bytes_path(&self) -> PathBuf {
        self.dir.join(format!("bytes_{}.dat", self.prot))
    }

    pub fn drops_path(&self) -> PathBuf {
        self.dir.join(format!("drop_{}.dat", self.prot))
    }

    pub fn cwnd_path(&self) -> PathBuf {
        self.dir.join(format!("cw_{}.dat", self.prot))
    }

    pub fn flowmon_path(&self) -> PathBuf {
        self.dir.join("data.flowmon")
    }

    fn write(&self, path: PathBuf, contents: &[u8]) -> Result<PathBuf, HarnessError> {
        fs::create_dir_all(&self.dir).map_err(|source| HarnessError::Write {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, contents).map_err(|source| HarnessError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn write_series<P: SeriesPoint>(
        &self,
        path: PathBuf,
        series: &[P],
    ) -> Result<PathBuf, HarnessError> {
        let mut text = String::new();
        for point in series {
            text.push_str(&point.dat_line());
            text.push('\n');
        }
        self.write(path, text.as_bytes())
    }

    /// Write `file_name` in the output directory, one line per item.
    pub fn write_lines<I>(&self, file_name: &str, lines: I) -> Result<PathBuf, HarnessError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut text = String::new();
        for line in lines {
            text.push_str(&line);
            text.push('\n');
        }
        self.write(self.dir.join(file_name), text.as_bytes())
    }

    pub fn write_flowmon(&self, table: &FlowTable) -> Result<PathBuf, HarnessError> {
        let json = serde_json::to_vec_pretty(table).map_err(|source| HarnessError::Serialize {
            what: "flow table",
            source,
        })?;
        self.write(self.flowmon_path(), &json)
    }

    /// Persist the three time series and the flow table.
    pub fn write_all(
        &self,
        series: &CollectedSeries,
        table: &FlowTable,
    ) -> Result<Vec<PathBuf>, HarnessError> {
        let written = vec![
            self.write_series(self.bytes_path(), &series.bytes)?,
            self.write_series(self.drops_path(), &series.drops)?,
            self.write_series(self.cwnd_path(), &series.cwnd)?,
            self.write_flowmon(table)?,
        ];
        info!("wrote {} result files to {}", written.len(), self.dir.display());
        Ok(written)
    }
}
