use std::path::Path;

use crate::error::ConfigError;
use crate::utils::read_lines;

/// Probe strings covering attribute breakout, tag injection, event handlers,
/// script tags and JavaScript string breakout.
pub const DEFAULT_PAYLOADS: [&str; 5] = [
    "<svg/onload=alert(1)>",
    "\"><svg/onload=alert(1)>",
    "'><svg/onload=alert(1)>",
    "<script>alert(1)</script>",
    "';alert(1);//",
];

/// Value sent in every param for the reference request of a target.
pub const BASELINE_MARKER: &str = "baseline";

/// Ordered, immutable list of probe strings.
#[derive(Clone, Debug, PartialEq)]
pub struct PayloadCatalog {
    payloads: Vec<String>,
}

impl Default for PayloadCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOADS.iter().map(|p| p.to_string()).collect())
    }
}

impl PayloadCatalog {
    pub fn new(payloads: Vec<String>) -> Self {
        Self { payloads }
    }

    /// One payload per line, taken as written apart from the line ending.
    /// Blank lines are dropped.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::PayloadFile {
            path: path.to_path_buf(),
            source,
        };

        let mut payloads = Vec::new();
        for line in read_lines(path).map_err(io_err)? {
            let line = line.map_err(io_err)?;
            if !line.trim().is_empty() {
                payloads.push(line);
            }
        }

        if payloads.is_empty() {
            return Err(ConfigError::EmptyCatalog(path.to_path_buf()));
        }
        Ok(Self::new(payloads))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.payloads.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }
}
