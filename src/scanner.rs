use crate::models::ScannedCode;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot open capture source {source_name}: {error}")]
    Open {
        source_name: String,
        error: std::io::Error,
    },
    #[error("reading capture source {source_name}: {error}")]
    Read {
        source_name: String,
        error: std::io::Error,
    },
    #[error("capture source {0} closed before a barcode was read")]
    Exhausted(String),
}

#[async_trait]
pub trait BarcodeSource: Send {
    /// Blocks until a decodable barcode is observed.
    async fn capture_next_code(&mut self) -> Result<ScannedCode, CaptureError>;

    /// Short description for run reports.
    fn label(&self) -> &str {
        "scanner"
    }
}

type LineReader = Lines<BufReader<Box<dyn AsyncRead + Unpin + Send>>>;

/// Reads decoded codes one per line, the way keyboard-wedge and serial
/// scanners report them.
pub struct LineScanner {
    source: String,
    lines: Option<LineReader>,
}

impl LineScanner {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            lines: None,
        }
    }

    pub fn from_reader(name: impl Into<String>, reader: impl AsyncRead + Unpin + Send + 'static) -> Self {
        let boxed: Box<dyn AsyncRead + Unpin + Send> = Box::new(reader);
        Self {
            source: name.into(),
            lines: Some(BufReader::new(boxed).lines()),
        }
    }

    fn is_stdin(&self) -> bool {
        matches!(self.source.trim(), "-" | "stdin")
    }

    async fn open(&mut self) -> Result<&mut LineReader, CaptureError> {
        if self.lines.is_none() {
            let reader: Box<dyn AsyncRead + Unpin + Send> = if self.is_stdin() {
                Box::new(tokio::io::stdin())
            } else {
                let path = PathBuf::from(self.source.trim());
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|error| CaptureError::Open {
                        source_name: self.source.clone(),
                        error,
                    })?;
                Box::new(file)
            };
            debug!(target = "lister.scanner", source = %self.source, "capture_source_opened");
            self.lines = Some(BufReader::new(reader).lines());
        }
        match self.lines.as_mut() {
            Some(lines) => Ok(lines),
            None => Err(CaptureError::Exhausted(self.source.clone())),
        }
    }
}

#[async_trait]
impl BarcodeSource for LineScanner {
    async fn capture_next_code(&mut self) -> Result<ScannedCode, CaptureError> {
        let source = self.source.clone();
        let lines = self.open().await?;
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|error| CaptureError::Read {
                    source_name: source.clone(),
                    error,
                })?;
            let Some(line) = line else {
                return Err(CaptureError::Exhausted(source));
            };
            if line.trim().is_empty() {
                continue;
            }
            match ScannedCode::parse(&line) {
                Some(code) => return Ok(code),
                None => {
                    warn!(target = "lister.scanner", raw = %line.escape_debug(), "undecodable_scan_skipped");
                }
            }
        }
    }

    fn label(&self) -> &str {
        &self.source
    }
}

/// Hands out a code supplied up front, once.
pub struct ProvidedCode(Option<ScannedCode>);

impl ProvidedCode {
    pub fn new(code: ScannedCode) -> Self {
        Self(Some(code))
    }
}

#[async_trait]
impl BarcodeSource for ProvidedCode {
    async fn capture_next_code(&mut self) -> Result<ScannedCode, CaptureError> {
        self.0
            .take()
            .ok_or_else(|| CaptureError::Exhausted("provided code".into()))
    }

    fn label(&self) -> &str {
        "provided"
    }
}
