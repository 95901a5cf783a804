use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::error::{Result, ScopeError};

pub const DEFAULT_DEVICE_NAME:&str = "inst0";
pub const DEFAULT_IO_TIMEOUT_MS:u64 = 2000;
pub const DEFAULT_LOCK_TIMEOUT_MS:u64 = 10000;

/// Connection settings for one oscilloscope. Every field has a default, so a JSON file only needs
/// the keys it wants to change (usually just `host`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
	pub host: String,
	pub device_name: String,
	pub io_timeout_ms: u64,
	pub lock_timeout_ms: u64,
	pub tx_throttle_ms: u64,
	/// Substring that must appear in the `*IDN?` reply, e.g. "SDS2" for the SDS2000X family
	pub expected_model: Option<String>,
}

impl Default for ScopeConfig {
	fn default() -> Self {
		Self {
			host: String::new(),
			device_name: DEFAULT_DEVICE_NAME.to_owned(),
			io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
			lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
			tx_throttle_ms: 0,
			expected_model: None,
		}
	}
}

impl ScopeConfig {

	pub fn new(host:&str) -> Self {
		Self { host: host.to_owned(), ..Self::default() }
	}

	pub fn from_json_str(s:&str) -> Result<Self> {
		let cfg:ScopeConfig = serde_json::from_str(s).map_err(|e| ScopeError::Config(e.to_string()))?;
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn from_json_file<P: AsRef<Path>>(path:P) -> Result<Self> {
		let text = fs::read_to_string(path.as_ref())
			.map_err(|e| ScopeError::Config(format!("unable to read {}: {}", path.as_ref().display(), e)))?;
		Self::from_json_str(&text)
	}

	pub fn validate(&self) -> Result<()> {
		if self.host.trim().is_empty() {
			return Err(ScopeError::Config("host must not be empty".to_owned()));
		}
		if self.io_timeout_ms == 0 {
			return Err(ScopeError::Config("io_timeout_ms must be greater than zero".to_owned()));
		}
		Ok(())
	}

	pub fn io_timeout(&self) -> Duration { Duration::from_millis(self.io_timeout_ms) }
	pub fn lock_timeout(&self) -> Duration { Duration::from_millis(self.lock_timeout_ms) }
	pub fn tx_throttle(&self) -> Duration { Duration::from_millis(self.tx_throttle_ms) }
}
