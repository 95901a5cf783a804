use std::str;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::config::ScopeConfig;
use crate::error::{self, Result, ScopeError};
use crate::vxi11::CoreClient;

/// Request/response link to an instrument. Every call blocks until the instrument answers or the
/// link's timeout expires.
pub trait CommandChannel {
	/// Sends one textual directive.
	fn send(&mut self, command:&str) -> Result<()>;

	/// Receives one complete raw response, binary-safe.
	fn receive(&mut self) -> Result<Vec<u8>>;

	/// Sends a directive and returns its reply as trimmed text.
	fn query(&mut self, command:&str) -> Result<String> {
		self.send(command)?;
		let raw = self.receive()?;
		str::from_utf8(&raw)
			.map(|s| s.trim().to_owned())
			.map_err(|_| ScopeError::UnexpectedResponse { command: command.to_owned(), response: String::from_utf8_lossy(&raw).into_owned() })
	}
}

/// A [`CommandChannel`] over a VXI-11 link (LAN instruments).
pub struct Vxi11Channel {
	core: CoreClient,
	tx_throttle: Duration,
}

impl Vxi11Channel {

	pub fn open(config:&ScopeConfig) -> Result<Self> {
		config.validate()?;

		let mut core = CoreClient::new(&config.host, config.io_timeout(), config.lock_timeout()).map_err(error::from_transport)?;
		core.create_link(&config.device_name).map_err(error::from_transport)?;

		Ok(Self{ core, tx_throttle: config.tx_throttle() })
	}

}

impl CommandChannel for Vxi11Channel {

	fn send(&mut self, command:&str) -> Result<()> {
		if self.tx_throttle > Duration::from_secs(0) { thread::sleep(self.tx_throttle); }
		debug!("> {}", command);
		self.core.write(command.as_bytes()).map_err(error::from_transport)
	}

	fn receive(&mut self) -> Result<Vec<u8>> {
		let data = self.core.read().map_err(error::from_transport)?;
		debug!("< {} bytes", data.len());
		Ok(data)
	}

}

impl Drop for Vxi11Channel {

	fn drop(&mut self) {
		if let Err(e) = self.core.destroy_link() {
			warn!("Unable to destroy VXI-11 link: {}", e);
		}
	}

}
