use std::io;

use thiserror::Error;

/// Everything that can abort a waveform read. None of these are retried internally; a failed read
/// never produces or stores a partial trace.
#[derive(Debug, Error)]
pub enum ScopeError {
	/// The preamble is too short or carries a field outside its legal range.
	#[error("malformed waveform descriptor: {0}")]
	MalformedDescriptor(String),

	/// A data block is missing its `#` marker, has a bad length field, or the reassembled
	/// payload doesn't add up to the expected number of samples.
	#[error("block framing error: {0}")]
	Framing(String),

	/// The instrument answered a page request with an empty payload.
	#[error("transfer ended early: page starting at point {start} returned no data")]
	PrematureEndOfTransfer { start: u64 },

	#[error("timed out waiting for the instrument: {0}")]
	TransportTimeout(String),

	#[error("unsupported sample width: descriptor reports {0} ADC bits")]
	UnsupportedSampleWidth(i16),

	#[error("channel {0} does not exist (expected 1 to 4)")]
	InvalidChannel(u8),

	/// A short text reply couldn't be interpreted.
	#[error("unexpected response to {command}: {response:?}")]
	UnexpectedResponse { command: String, response: String },

	#[error("configuration error: {0}")]
	Config(String),

	#[error(transparent)]
	Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ScopeError>;

// Keeps timeouts from the link distinguishable from other I/O failures
pub(crate) fn from_transport(e:io::Error) -> ScopeError {
	match e.kind() {
		io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ScopeError::TransportTimeout(e.to_string()),
		_ => ScopeError::Io(e),
	}
}
