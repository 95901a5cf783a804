
use std::collections::BTreeMap;

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::Serialize;

use crate::channel::{CommandChannel, Vxi11Channel};
use crate::config::ScopeConfig;
use crate::error::{Result, ScopeError};

pub mod convert;
pub mod preamble;
pub mod sequence;
pub mod transfer;

pub use self::convert::{ChannelTrace, HORIZONTAL_DIVISIONS};
pub use self::preamble::{decode_preamble, WaveformDescriptor, TIMEBASE_TABLE};
pub use self::sequence::read_sequence_frame;
pub use self::transfer::read_channel;

use self::preamble::{FRAME_TIMESTAMP_LEN, FRAME_TIMESTAMP_OFFSET};

lazy_static! {
	static ref IDN_RE: Regex    = Regex::new("([^,]+),([^,]+),([^,]+),([^,\\s]+)").unwrap();
	static ref NUMBER_RE: Regex = Regex::new("[-+]?(\\d+\\.?\\d*|\\.\\d+)([eE][-+]?\\d+)?").unwrap();
}

pub const CHANNEL_COUNT:u8 = 4;

pub fn chan_ok(n:u8) -> Result<()> {
	if n == 0 || n > CHANNEL_COUNT { Err(ScopeError::InvalidChannel(n)) }
	else { Ok(()) }
}

/// Pulls a point count out of a short reply such as `1.00E+07` or `MAXP 1250000`.
pub fn parse_point_count(command:&str, reply:&str) -> Result<u64> {
	let bad = || ScopeError::UnexpectedResponse{ command: command.to_owned(), response: reply.to_owned() };

	let value:f64 = NUMBER_RE.find(reply)
		.and_then(|m| m.as_str().parse::<f64>().ok())
		.ok_or_else(bad)?;

	if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
		return Err(bad());
	}
	Ok(value as u64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

impl Identity {
	pub fn parse(idn:&str) -> Result<Self> {
		let cap = IDN_RE.captures(idn).ok_or_else(|| ScopeError::UnexpectedResponse{ command: "*IDN?".to_owned(), response: idn.to_owned() })?;
		let field = |i:usize| cap.get(i).map(|m| m.as_str().trim().to_owned()).unwrap_or_default();
		Ok(Identity { manufacturer: field(1), model: field(2), serial_num: field(3), fw_version: field(4) })
	}
}

/// The frame most recently read by `Scope::read_sequence_frame`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
	pub frame_number: u32,
	pub timestamp: String,
}

/// Sends the preamble query for the selected source and strips the block framing from the reply.
///
/// Some firmware declares a block length that stops short of the frame timestamp even though the
/// timestamp bytes follow. In that case everything after the block header is kept.
pub fn fetch_preamble<C: CommandChannel>(source:&mut C) -> Result<Vec<u8>> {
	source.send(":WAV:PREamble?")?;
	let response = source.receive()?;
	let payload = transfer::parse_block(&response)?;

	if payload.len() < FRAME_TIMESTAMP_OFFSET + FRAME_TIMESTAMP_LEN {
		let (data_start, _) = transfer::block_header(&response)?;
		if response.len() - data_start > payload.len() {
			debug!("preamble block declares {} bytes, keeping all {} after the header", payload.len(), response.len() - data_start);
			return Ok(response[data_start..].to_vec());
		}
	}

	debug!("preamble block is {} bytes", payload.len());
	Ok(payload.to_vec())
}

/// An oscilloscope session: one command channel plus the last trace read from each channel.
///
/// A trace is only stored after its read fully succeeds, and it replaces the previous trace for
/// that channel as a whole.
pub struct Scope<C: CommandChannel> {
	channel: C,
	traces: BTreeMap<u8, ChannelTrace>,
	last_frame: Option<FrameRecord>,
}

impl Scope<Vxi11Channel> {

	/// Opens a VXI-11 link to `config.host` and checks that something answers `*IDN?`.
	pub fn connect(config:&ScopeConfig) -> Result<Self> {
		let mut scope = Scope::new(Vxi11Channel::open(config)?);
		let identity = scope.identify()?;

		if let Some(expected) = &config.expected_model {
			if !identity.model.contains(expected.as_str()) {
				return Err(ScopeError::UnexpectedResponse{ command: "*IDN?".to_owned(), response: format!("connected to a {} but expected {}", identity.model, expected) });
			}
		}

		info!("connected to {} {} (serial {}, firmware {})", identity.manufacturer, identity.model, identity.serial_num, identity.fw_version);
		Ok(scope)
	}

}

impl<C: CommandChannel> Scope<C> {

	pub fn new(channel:C) -> Self {
		Scope { channel, traces: BTreeMap::new(), last_frame: None }
	}

	pub fn identify(&mut self) -> Result<Identity> {
		let idn = self.channel.query("*IDN?")?;
		Identity::parse(&idn)
	}

	/// Reads the current acquisition of a channel and stores the result.
	pub fn read_waveform(&mut self, chan_num:u8) -> Result<&ChannelTrace> {
		chan_ok(chan_num)?;

		self.channel.send(&format!(":WAV:SOUR C{}", chan_num))?;
		let raw = fetch_preamble(&mut self.channel)?;
		let descriptor = decode_preamble(&raw, false)?;

		let trace = transfer::read_selected(chan_num, &descriptor, &mut self.channel)?;
		Ok(self.store(chan_num, trace))
	}

	/// Reads one frame of a sequence acquisition and stores it as the channel's trace.
	///
	/// The scope has to be in sequence mode already; this isn't checked.
	pub fn read_sequence_frame(&mut self, chan_num:u8, frame_number:u32) -> Result<(&ChannelTrace, &str)> {
		sequence::select_frame(&mut self.channel, chan_num, frame_number)?;
		let raw = fetch_preamble(&mut self.channel)?;
		let descriptor = decode_preamble(&raw, true)?;

		let (trace, timestamp) = sequence::read_selected_frame(chan_num, frame_number, &descriptor, &mut self.channel)?;

		self.last_frame = Some(FrameRecord { frame_number, timestamp });
		let stamp = self.last_frame.as_ref().map(|f| f.timestamp.as_str()).unwrap_or_default();
		self.traces.insert(chan_num, trace);
		Ok((&self.traces[&chan_num], stamp))
	}

	pub fn channel_data(&self, chan_num:u8) -> Option<&ChannelTrace> { self.traces.get(&chan_num) }

	pub fn traces(&self) -> impl Iterator<Item = (u8, &ChannelTrace)> {
		self.traces.iter().map(|(ch, trace)| (*ch, trace))
	}

	/// Channels with a stored trace, in ascending order.
	pub fn list_channels(&self) -> Vec<u8> { self.traces.keys().copied().collect() }

	pub fn last_frame(&self) -> Option<&FrameRecord> { self.last_frame.as_ref() }

	pub fn channel_mut(&mut self) -> &mut C { &mut self.channel }

	pub fn into_inner(self) -> C { self.channel }

	fn store(&mut self, chan_num:u8, trace:ChannelTrace) -> &ChannelTrace {
		self.traces.insert(chan_num, trace);
		&self.traces[&chan_num]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn point_counts_parse_from_plain_and_scientific_replies() {
		assert_eq!(parse_point_count("q", "1000").unwrap(), 1000);
		assert_eq!(parse_point_count("q", "1.00E+07").unwrap(), 10_000_000);
		assert_eq!(parse_point_count("q", "MAXP 1.25e6\n").unwrap(), 1_250_000);
		assert_eq!(parse_point_count("q", "4.0e2").unwrap(), 400);
	}

	#[test]
	fn unusable_point_counts_are_rejected() {
		for bad in &["", "OFF", "-5", "12.5", "1.5e0"] {
			assert!(matches!(parse_point_count("q", bad), Err(ScopeError::UnexpectedResponse{ .. })), "{:?}", bad);
		}
	}

	#[test]
	fn identity_fields_are_split() {
		let id = Identity::parse("Siglent Technologies,SDS2104X Plus,SDS2PEED6R3524,3.8.12.1.1.3.8\n").unwrap();
		assert_eq!(id.manufacturer, "Siglent Technologies");
		assert_eq!(id.model, "SDS2104X Plus");
		assert_eq!(id.serial_num, "SDS2PEED6R3524");
		assert_eq!(id.fw_version, "3.8.12.1.1.3.8");
		assert!(Identity::parse("garbage").is_err());
	}

	struct Canned(Vec<u8>);

	impl CommandChannel for Canned {
		fn send(&mut self, _command:&str) -> Result<()> { Ok(()) }
		fn receive(&mut self) -> Result<Vec<u8>> { Ok(self.0.clone()) }
	}

	fn with_header(declared:usize, payload:&[u8]) -> Vec<u8> {
		let mut v = format!("#9{:09}", declared).into_bytes();
		v.extend_from_slice(payload);
		v
	}

	#[test]
	fn preamble_keeps_timestamp_bytes_past_a_short_declared_length() {
		let payload:Vec<u8> = (0..360).map(|i| i as u8).collect();

		let raw = fetch_preamble(&mut Canned(with_header(346, &payload))).unwrap();
		assert_eq!(raw, payload);

		let mut framed = with_header(360, &payload);
		framed.extend_from_slice(b"\n\n");
		assert_eq!(fetch_preamble(&mut Canned(framed)).unwrap(), payload);

		let short = &payload[..340];
		assert_eq!(fetch_preamble(&mut Canned(with_header(340, short))).unwrap(), short);
	}

	#[test]
	fn channel_numbers_are_checked() {
		assert!(chan_ok(1).is_ok());
		assert!(chan_ok(4).is_ok());
		assert!(matches!(chan_ok(0), Err(ScopeError::InvalidChannel(0))));
		assert!(matches!(chan_ok(5), Err(ScopeError::InvalidChannel(5))));
	}
}
