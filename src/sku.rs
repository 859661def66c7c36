use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::{
    fmt, fs,
    io::{self, Write},
    path::PathBuf,
};
use thiserror::Error;
use tracing::debug;

/// Digits in the numeric suffix of a product identifier.
pub const SEQUENCE_WIDTH: usize = 8;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter storage holds {content:?}, expected a non-negative integer")]
    Corrupt { content: String },
    #[error("counter storage {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Durable home of the last issued sequence number.
pub trait CounterStore: Send {
    /// Missing or empty storage reads as 0.
    fn read(&self) -> Result<u64, CounterError>;
    /// Replaces the stored value.
    fn write(&mut self, value: u64) -> Result<(), CounterError>;
}

fn parse_counter(raw: &str) -> Result<u64, CounterError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed.parse::<u64>().map_err(|_| CounterError::Corrupt {
        content: trimmed.chars().take(64).collect(),
    })
}

/// Counter kept as a single human-readable integer in a text file.
#[derive(Debug, Clone)]
pub struct FileCounterStore {
    path: PathBuf,
}

impl FileCounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: io::Error) -> CounterError {
        CounterError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("counter");
        self.path
            .with_file_name(format!(".{name}.{}.tmp", std::process::id()))
    }
}

impl CounterStore for FileCounterStore {
    fn read(&self) -> Result<u64, CounterError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => parse_counter(&raw),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(self.io_error(err)),
        }
    }

    fn write(&mut self, value: u64) -> Result<(), CounterError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let tmp = self.temp_path();
        let written = fs::File::create(&tmp).and_then(|mut file| {
            writeln!(file, "{value}")?;
            file.sync_all()
        });
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_error(err));
        }
        // rename within one directory replaces the old value in a single step
        fs::rename(&tmp, &self.path).map_err(|err| {
            let _ = fs::remove_file(&tmp);
            self.io_error(err)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProductIdentifier(String);

impl ProductIdentifier {
    pub fn format(date: NaiveDate, sequence: u64) -> Self {
        Self(format!(
            "{}-{:0width$}",
            date.format("%Y%m%d"),
            sequence,
            width = SEQUENCE_WIDTH
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn sequence(&self) -> Option<u64> {
        self.0.rsplit_once('-')?.1.parse().ok()
    }
}

impl fmt::Display for ProductIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

pub struct IdentifierAllocator {
    store: Box<dyn CounterStore>,
    clock: fn() -> NaiveDate,
}

impl IdentifierAllocator {
    pub fn new(store: Box<dyn CounterStore>) -> Self {
        Self {
            store,
            clock: local_today,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    /// Reads, increments and persists the counter, then formats the identifier.
    /// Nothing is written when the stored value is unreadable.
    pub fn allocate_next(&mut self) -> Result<ProductIdentifier, CounterError> {
        let next = self.next_value()?;
        self.store.write(next)?;
        crate::metrics::counter_advanced(next);
        let identifier = ProductIdentifier::format((self.clock)(), next);
        debug!(target = "lister.sku", %identifier, "identifier_allocated");
        Ok(identifier)
    }

    /// The identifier the next allocation would issue; storage is untouched.
    pub fn peek_next(&self) -> Result<ProductIdentifier, CounterError> {
        let next = self.next_value()?;
        Ok(ProductIdentifier::format((self.clock)(), next))
    }

    fn next_value(&self) -> Result<u64, CounterError> {
        let current = self.store.read()?;
        current.checked_add(1).ok_or(CounterError::Corrupt {
            content: current.to_string(),
        })
    }
}

#[cfg(test)]
pub use memory::MemoryCounterStore;
