//! # Result Sink
//!
//! Accepted facts go to a plain text file named `result`:
//!
//! ```text
//! asn ip
//! 64496 10.0.0.0/24
//! ```
//!
//! Every line, header included, carries a trailing space before the newline.
//! Annotated output appends the verdict as a third column.

use std::fmt;
use std::path::Path;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::protocol::validity::Verdict;

const HEADER: &str = "asn ip \n";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write result: {0}")]
    Io(#[from] std::io::Error),
}

/// One accepted (origin AS, prefix) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fact {
    pub origin_asn: u32,
    pub prefix: String,
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.origin_asn, self.prefix)
    }
}

/// Line-oriented writer for facts.
pub struct ResultWriter<W> {
    out: BufWriter<W>,
    lines: u64,
}

impl ResultWriter<File> {
    /// Creates (or truncates) the result file and writes the header.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = File::create(path.as_ref()).await?;
        log::info!("Writing results to {}", path.as_ref().display());
        Self::new(file).await
    }
}

impl<W: AsyncWrite + Unpin> ResultWriter<W> {
    pub async fn new(out: W) -> Result<Self, SinkError> {
        let mut out = BufWriter::new(out);
        out.write_all(HEADER.as_bytes()).await?;
        Ok(Self { out, lines: 0 })
    }

    pub async fn write_fact(&mut self, fact: &Fact, verdict: Option<Verdict>) -> Result<(), SinkError> {
        let line = match verdict {
            Some(verdict) => format!("{} {} \n", fact, verdict),
            None => format!("{} \n", fact),
        };
        self.out.write_all(line.as_bytes()).await?;
        self.lines += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), SinkError> {
        self.out.flush().await?;
        Ok(())
    }

    /// Number of fact lines written so far (header excluded).
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Flushes and hands back the underlying writer.
    pub async fn finish(mut self) -> Result<W, SinkError> {
        self.out.flush().await?;
        Ok(self.out.into_inner())
    }
}
