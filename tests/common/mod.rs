// A scripted stand-in for the oscilloscope end of the command channel.
//
// It understands the handful of directives the waveform code issues, keeps the read window state
// (STARt/POINt/WIDTh) the way the instrument does, and records every directive it receives.

#![allow(dead_code)]

use std::collections::VecDeque;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use sds_waveform::{CommandChannel, Result, ScopeError};
use sds_waveform::devices::sds2000x::preamble::*;

pub const IDN:&str = "Siglent Technologies,SDS2104X Plus,SDS2PEED6R3524,3.8.12.1.1.3.8";

#[derive(Debug, Clone)]
pub struct DescriptorParams {
	pub vertical_gain: f64,
	pub vertical_offset: f64,
	pub probe: f64,
	pub code_per_div: f64,
	pub adc_bits: i16,
	pub sample_interval: f64,
	pub trigger_delay: f64,
	pub timebase_index: i16,
	pub point_count: i32,
}

impl Default for DescriptorParams {
	fn default() -> Self {
		DescriptorParams {
			vertical_gain: 0.5,
			vertical_offset: 0.1,
			probe: 1.0,
			code_per_div: 25.0,
			adc_bits: 8,
			sample_interval: 1e-6,
			trigger_delay: 0.0,
			timebase_index: 20,
			point_count: 0,
		}
	}
}

#[derive(Debug, Clone)]
pub struct SequenceParams {
	pub byte_order: i16,
	pub points_per_frame: i32,
	pub frames_requested: i32,
	pub frames_acquired: i32,
	pub serial: i16,
	/// seconds, minutes, hours, day, month, year
	pub timestamp: (f64, u8, u8, u8, u8, i16),
}

pub fn descriptor(p:&DescriptorParams) -> Vec<u8> {
	let mut buf = vec![0u8; MIN_DESCRIPTOR_LEN];
	let fields:[(Field, f64); 10] = [
		(POINT_COUNT, p.point_count as f64),
		(SPARSING, 1.0),
		(VERTICAL_GAIN, p.vertical_gain),
		(VERTICAL_OFFSET, p.vertical_offset),
		(CODE_PER_DIV, p.code_per_div),
		(ADC_BITS, p.adc_bits as f64),
		(SAMPLE_INTERVAL, p.sample_interval),
		(TRIGGER_DELAY, p.trigger_delay),
		(TIMEBASE_INDEX, p.timebase_index as f64),
		(PROBE_ATTENUATION, p.probe),
	];
	for (field, value) in fields.iter() {
		field.encode(&mut buf, *value).unwrap();
	}
	buf
}

pub fn sequence_descriptor(p:&DescriptorParams, s:&SequenceParams) -> Vec<u8> {
	let mut buf = descriptor(p);
	DATA_WIDTH.encode(&mut buf, if p.adc_bits > 8 { 1.0 } else { 0.0 }).unwrap();
	BYTE_ORDER.encode(&mut buf, s.byte_order as f64).unwrap();
	POINTS_PER_FRAME.encode(&mut buf, s.points_per_frame as f64).unwrap();
	FRAMES_REQUESTED.encode(&mut buf, s.frames_requested as f64).unwrap();
	FRAMES_ACQUIRED.encode(&mut buf, s.frames_acquired as f64).unwrap();
	FRAME_SERIAL.encode(&mut buf, s.serial as f64).unwrap();

	buf.resize(FRAME_TIMESTAMP_OFFSET + FRAME_TIMESTAMP_LEN, 0);
	let ts = &mut buf[FRAME_TIMESTAMP_OFFSET..];
	let (seconds, minutes, hours, day, month, year) = s.timestamp;
	LittleEndian::write_f64(&mut ts[0..8], seconds);
	ts[8] = minutes;
	ts[9] = hours;
	ts[10] = day;
	ts[11] = month;
	LittleEndian::write_i16(&mut ts[12..14], year);
	buf
}

/// `#9<nine digit length><payload>` followed by the terminator the instrument appends.
pub fn block(payload:&[u8]) -> Vec<u8> {
	let mut v = format!("#9{:09}", payload.len()).into_bytes();
	v.extend_from_slice(payload);
	v.extend_from_slice(b"\n\n");
	v
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
	EmptyPage,
	MissingMarker,
	Timeout,
}

pub struct SimulatedScope {
	pub preamble: Vec<u8>,
	pub codes: Vec<i16>,
	/// Order 16-bit samples are served in
	pub word_order: SampleOrder,
	/// Reply to :ACQuire:POINts?, the sample count when None
	pub acq_points_reply: Option<String>,
	pub max_points: u64,
	pub faults: Vec<(u64, Fault)>,
	pub commands: Vec<String>,

	start: u64,
	points: u64,
	word: bool,
	pending: VecDeque<Vec<u8>>,
}

impl SimulatedScope {
	pub fn new(preamble:Vec<u8>, codes:Vec<i16>, max_points:u64) -> Self {
		SimulatedScope {
			preamble, codes, word_order: SampleOrder::BigEndian, acq_points_reply: None, max_points,
			faults: vec![], commands: vec![], start: 0, points: 0, word: false, pending: VecDeque::new(),
		}
	}

	pub fn count(&self, command:&str) -> usize {
		self.commands.iter().filter(|c| c.as_str() == command).count()
	}

	pub fn position(&self, command:&str) -> Option<usize> {
		self.commands.iter().position(|c| c.as_str() == command)
	}

	fn page(&self) -> Vec<u8> {
		let limit = if self.points == 0 { self.max_points } else { self.points.min(self.max_points) };
		let from = (self.start as usize).min(self.codes.len());
		let to = (from + limit as usize).min(self.codes.len());

		let mut payload = vec![];
		for code in &self.codes[from..to] {
			if self.word {
				let mut b = [0u8; 2];
				match self.word_order {
					SampleOrder::BigEndian => BigEndian::write_i16(&mut b, *code),
					SampleOrder::LittleEndian => LittleEndian::write_i16(&mut b, *code),
				}
				payload.extend_from_slice(&b);
			} else {
				payload.push(*code as i8 as u8);
			}
		}
		payload
	}

	fn fault_here(&self) -> Option<Fault> {
		self.faults.iter().find(|(start, _)| *start == self.start).map(|(_, f)| *f)
	}
}

fn arg(command:&str) -> &str {
	command.splitn(2, ' ').nth(1).unwrap_or("")
}

impl CommandChannel for SimulatedScope {
	fn send(&mut self, command:&str) -> Result<()> {
		self.commands.push(command.to_owned());

		if command.starts_with(":WAVeform:STARt") {
			self.start = arg(command).parse().unwrap();
		} else if command.starts_with(":WAVeform:POINt") {
			self.points = arg(command).parse().unwrap();
		} else if command.starts_with(":WAVeform:WIDTh") {
			self.word = arg(command) == "WORD";
		} else if command == "*IDN?" {
			self.pending.push_back(IDN.as_bytes().to_vec());
		} else if command == ":ACQuire:POINts?" {
			let reply = self.acq_points_reply.clone().unwrap_or_else(|| self.codes.len().to_string());
			self.pending.push_back(reply.into_bytes());
		} else if command == ":WAVeform:MAXPoint?" {
			self.pending.push_back(format!("{}\n", self.max_points).into_bytes());
		} else if command == ":WAV:PREamble?" {
			self.pending.push_back(block(&self.preamble));
		} else if command == "WAV:DATA?" {
			let response = match self.fault_here() {
				Some(Fault::EmptyPage) => b"#10\n".to_vec(),
				Some(Fault::MissingMarker) => b"DAT2,garbage".to_vec(),
				Some(Fault::Timeout) => return Ok(()),
				None => block(&self.page()),
			};
			self.pending.push_back(response);
		}
		Ok(())
	}

	fn receive(&mut self) -> Result<Vec<u8>> {
		self.pending.pop_front().ok_or_else(|| ScopeError::TransportTimeout("no response within 2000 ms".to_owned()))
	}
}

/// Replays prepared `WAV:DATA?` responses in order, whatever the read window says.
pub struct ScriptedPages {
	pub pages: VecDeque<Vec<u8>>,
	pub commands: Vec<String>,
	pending: VecDeque<Vec<u8>>,
}

impl ScriptedPages {
	pub fn new(pages:Vec<Vec<u8>>) -> Self {
		ScriptedPages { pages: pages.into_iter().collect(), commands: vec![], pending: VecDeque::new() }
	}
}

impl CommandChannel for ScriptedPages {
	fn send(&mut self, command:&str) -> Result<()> {
		self.commands.push(command.to_owned());
		if command == "WAV:DATA?" {
			if let Some(page) = self.pages.pop_front() {
				self.pending.push_back(page);
			}
		}
		Ok(())
	}

	fn receive(&mut self) -> Result<Vec<u8>> {
		self.pending.pop_front().ok_or_else(|| ScopeError::TransportTimeout("no response within 2000 ms".to_owned()))
	}
}
