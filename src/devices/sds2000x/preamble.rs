// Decoder for the binary waveform descriptor returned by :WAVeform:PREamble?
//
// The layout is fixed by the instrument firmware. Every field lives at a known byte offset with a
// known binary type and all of them are little-endian, so the layout is kept as a table of `Field`s
// rather than scattered slice arithmetic.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::{Result, ScopeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType { I16, I32, F32, F64 }

impl FieldType {
	pub fn width(self) -> usize {
		match self {
			FieldType::I16 => 2,
			FieldType::I32 | FieldType::F32 => 4,
			FieldType::F64 => 8,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue { I16(i16), I32(i32), F32(f32), F64(f64) }

impl FieldValue {
	pub fn as_f64(self) -> f64 {
		match self {
			FieldValue::I16(x) => x as f64,
			FieldValue::I32(x) => x as f64,
			FieldValue::F32(x) => x as f64,
			FieldValue::F64(x) => x,
		}
	}

	pub fn as_i64(self) -> Option<i64> {
		match self {
			FieldValue::I16(x) => Some(x as i64),
			FieldValue::I32(x) => Some(x as i64),
			_ => None,
		}
	}
}

/// One entry of the descriptor layout: a named, typed value at a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
	pub name: &'static str,
	pub offset: usize,
	pub kind: FieldType,
}

impl Field {
	const fn new(name:&'static str, offset:usize, kind:FieldType) -> Self { Field{ name, offset, kind } }

	/// One past the last byte this field occupies.
	pub fn end(&self) -> usize { self.offset + self.kind.width() }

	pub fn decode(&self, buf:&[u8]) -> Result<FieldValue> {
		let raw = buf.get(self.offset..self.end()).ok_or_else(|| ScopeError::MalformedDescriptor(
			format!("{} needs bytes {:#x}..{:#x} but the descriptor is only {} bytes", self.name, self.offset, self.end(), buf.len())
		))?;

		Ok(match self.kind {
			FieldType::I16 => FieldValue::I16(LittleEndian::read_i16(raw)),
			FieldType::I32 => FieldValue::I32(LittleEndian::read_i32(raw)),
			FieldType::F32 => FieldValue::F32(LittleEndian::read_f32(raw)),
			FieldType::F64 => FieldValue::F64(LittleEndian::read_f64(raw)),
		})
	}

	/// Writes `value` into `buf` using this field's type. Integer fields truncate toward zero.
	/// Used to build synthetic descriptors for simulators and tests.
	pub fn encode(&self, buf:&mut [u8], value:f64) -> Result<()> {
		let len = buf.len();
		let raw = buf.get_mut(self.offset..self.end()).ok_or_else(|| ScopeError::MalformedDescriptor(
			format!("{} does not fit in a {} byte buffer", self.name, len)
		))?;

		match self.kind {
			FieldType::I16 => LittleEndian::write_i16(raw, value as i16),
			FieldType::I32 => LittleEndian::write_i32(raw, value as i32),
			FieldType::F32 => LittleEndian::write_f32(raw, value as f32),
			FieldType::F64 => LittleEndian::write_f64(raw, value),
		}
		Ok(())
	}

	fn float(&self, buf:&[u8]) -> Result<f64> { Ok(self.decode(buf)?.as_f64()) }

	fn int(&self, buf:&[u8]) -> Result<i64> {
		self.decode(buf)?.as_i64().ok_or_else(|| ScopeError::MalformedDescriptor(format!("{} is not an integer field", self.name)))
	}
}

pub const WAVE_ARRAY_BYTES:Field  = Field::new("wave_array_bytes",    0x3c,  FieldType::I32);
pub const POINT_COUNT:Field       = Field::new("point_count",         0x74,  FieldType::I32);
pub const FIRST_POINT:Field       = Field::new("first_point",         0x84,  FieldType::I32);
pub const SPARSING:Field          = Field::new("sparsing",            0x88,  FieldType::I32);
pub const VERTICAL_GAIN:Field     = Field::new("vertical_gain",       0x9c,  FieldType::F32);
pub const VERTICAL_OFFSET:Field   = Field::new("vertical_offset_raw", 0xa0,  FieldType::F32);
pub const CODE_PER_DIV:Field      = Field::new("code_per_div",        0xa4,  FieldType::F32);
pub const ADC_BITS:Field          = Field::new("adc_bits",            0xac,  FieldType::I16);
pub const SAMPLE_INTERVAL:Field   = Field::new("sample_interval",     0xb0,  FieldType::F32);
pub const TRIGGER_DELAY:Field     = Field::new("trigger_delay",       0xb4,  FieldType::F64);
pub const TIMEBASE_INDEX:Field    = Field::new("timebase_index",      0x144, FieldType::I16);
pub const PROBE_ATTENUATION:Field = Field::new("probe_attenuation",   0x148, FieldType::F32);

// Only meaningful when the scope is in sequence acquisition mode. 0x74 is shared with POINT_COUNT
// but means points per frame here.
pub const DATA_WIDTH:Field        = Field::new("data_width",          0x20,  FieldType::I16);
pub const BYTE_ORDER:Field        = Field::new("byte_order",          0x22,  FieldType::I16);
pub const POINTS_PER_FRAME:Field  = Field::new("points_per_frame",    0x74,  FieldType::I32);
pub const FRAMES_REQUESTED:Field  = Field::new("frames_requested",    0x90,  FieldType::I32);
pub const FRAMES_ACQUIRED:Field   = Field::new("frames_acquired",     0x94,  FieldType::I32);
pub const FRAME_SERIAL:Field      = Field::new("frame_serial",        0xae,  FieldType::I16);

pub const ACQUISITION_FIELDS:[Field; 12] = [
	WAVE_ARRAY_BYTES, POINT_COUNT, FIRST_POINT, SPARSING, VERTICAL_GAIN, VERTICAL_OFFSET,
	CODE_PER_DIV, ADC_BITS, SAMPLE_INTERVAL, TRIGGER_DELAY, TIMEBASE_INDEX, PROBE_ATTENUATION,
];

pub const SEQUENCE_FIELDS:[Field; 6] = [
	DATA_WIDTH, BYTE_ORDER, POINTS_PER_FRAME, FRAMES_REQUESTED, FRAMES_ACQUIRED, FRAME_SERIAL,
];

/// Smallest descriptor that holds every field above (0x14C bytes).
pub const MIN_DESCRIPTOR_LEN:usize = 0x14c;

/// Offset of the frame timestamp in a sequence-mode descriptor.
pub const FRAME_TIMESTAMP_OFFSET:usize = 346;
pub const FRAME_TIMESTAMP_LEN:usize = 14;

/// Seconds per division, indexed by the descriptor's timebase field.
///
/// Indices 0 through 38 follow the instrument's enumeration (200 ps to 1 ks in a 1-2-5 progression).
/// Index 39 carries the progression one step further.
pub const TIMEBASE_TABLE:[f64; 40] = [
	200e-12, 500e-12,
	1e-9, 2e-9, 5e-9, 10e-9, 20e-9, 50e-9, 100e-9, 200e-9, 500e-9,
	1e-6, 2e-6, 5e-6, 10e-6, 20e-6, 50e-6, 100e-6, 200e-6, 500e-6,
	1e-3, 2e-3, 5e-3, 10e-3, 20e-3, 50e-3, 100e-3, 200e-3, 500e-3,
	1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0,
	2000.0,
];

pub fn time_per_division(index:i16) -> Result<f64> {
	if index < 0 {
		return Err(ScopeError::MalformedDescriptor(format!("negative timebase index {}", index)));
	}
	TIMEBASE_TABLE.get(index as usize).copied().ok_or_else(|| ScopeError::MalformedDescriptor(
		format!("timebase index {} is outside the {} entry table", index, TIMEBASE_TABLE.len())
	))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleWidth { Byte, Word }

impl SampleWidth {
	pub fn from_adc_bits(adc_bits:i16) -> Result<Self> {
		match adc_bits {
			1..=8  => Ok(SampleWidth::Byte),
			9..=16 => Ok(SampleWidth::Word),
			_      => Err(ScopeError::UnsupportedSampleWidth(adc_bits)),
		}
	}

	pub fn bytes(self) -> usize {
		match self { SampleWidth::Byte => 1, SampleWidth::Word => 2 }
	}

	/// Argument for :WAVeform:WIDTh
	pub fn directive(self) -> &'static str {
		match self { SampleWidth::Byte => "BYTE", SampleWidth::Word => "WORD" }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleOrder { BigEndian, LittleEndian }

/// Scaling and timing shared by single and sequence acquisitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Acquisition {
	pub wave_array_bytes: i32,
	pub first_point: i32,
	pub sparsing: i32,
	/// Volts per division, probe attenuation applied
	pub vertical_scale: f64,
	/// Volts, probe attenuation applied
	pub vertical_offset: f64,
	pub sample_interval: f64,
	pub trigger_delay: f64,
	pub timebase_index: i16,
	pub time_per_division: f64,
	pub code_per_division: f64,
	pub adc_bits: i16,
}

impl Acquisition {
	pub fn sample_width(&self) -> Result<SampleWidth> { SampleWidth::from_adc_bits(self.adc_bits) }
}

/// Wall-clock time a sequence frame was captured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameTimestamp {
	pub seconds: f64,
	pub minutes: u8,
	pub hours: u8,
	pub day: u8,
	pub month: u8,
	pub year: i16,
}

impl FrameTimestamp {
	pub fn decode(raw:&[u8]) -> Result<Self> {
		if raw.len() < FRAME_TIMESTAMP_LEN {
			return Err(ScopeError::MalformedDescriptor(format!("frame timestamp needs {} bytes, got {}", FRAME_TIMESTAMP_LEN, raw.len())));
		}
		Ok(FrameTimestamp {
			seconds: LittleEndian::read_f64(&raw[0..8]),
			minutes: raw[8],
			hours: raw[9],
			day: raw[10],
			month: raw[11],
			year: LittleEndian::read_i16(&raw[12..14]),
		})
	}
}

impl fmt::Display for FrameTimestamp {
	// e.g. 2024/3/19,10:40:5.25
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}/{}/{},{}:{}:{:?}", self.year, self.month, self.day, self.hours, self.minutes, self.seconds)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceInfo {
	/// 1 for 16-bit, 0 for 8-bit
	pub data_width_flag: i16,
	/// 1 for MSB first, 0 for LSB first
	pub byte_order_flag: i16,
	pub points_per_frame: i32,
	pub frames_requested: i32,
	pub frames_acquired: i32,
	pub frame_serial_number: i16,
	/// None when the descriptor stops before the timestamp block
	pub timestamp: Option<FrameTimestamp>,
}

impl SequenceInfo {
	pub fn sample_order(&self) -> Result<SampleOrder> {
		match self.byte_order_flag {
			0 => Ok(SampleOrder::LittleEndian),
			1 => Ok(SampleOrder::BigEndian),
			x => Err(ScopeError::MalformedDescriptor(format!("byte order flag must be 0 or 1, got {}", x))),
		}
	}
}

/// A decoded preamble. Decoded once per read and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WaveformDescriptor {
	Single { acquisition: Acquisition, point_count: i32 },
	Sequence { acquisition: Acquisition, sequence: SequenceInfo },
}

impl WaveformDescriptor {
	pub fn acquisition(&self) -> &Acquisition {
		match self {
			WaveformDescriptor::Single { acquisition, .. } => acquisition,
			WaveformDescriptor::Sequence { acquisition, .. } => acquisition,
		}
	}

	pub fn sequence(&self) -> Option<&SequenceInfo> {
		match self {
			WaveformDescriptor::Sequence { sequence, .. } => Some(sequence),
			_ => None,
		}
	}
}

fn decode_acquisition(buf:&[u8]) -> Result<Acquisition> {
	let probe = PROBE_ATTENUATION.float(buf)?;
	let timebase_index = TIMEBASE_INDEX.int(buf)? as i16;

	Ok(Acquisition {
		wave_array_bytes: WAVE_ARRAY_BYTES.int(buf)? as i32,
		first_point: FIRST_POINT.int(buf)? as i32,
		sparsing: SPARSING.int(buf)? as i32,
		vertical_scale: VERTICAL_GAIN.float(buf)? * probe,
		vertical_offset: VERTICAL_OFFSET.float(buf)? * probe,
		sample_interval: SAMPLE_INTERVAL.float(buf)?,
		trigger_delay: TRIGGER_DELAY.float(buf)?,
		timebase_index,
		time_per_division: time_per_division(timebase_index)?,
		code_per_division: CODE_PER_DIV.float(buf)?,
		adc_bits: ADC_BITS.int(buf)? as i16,
	})
}

/// Decodes a preamble payload (block framing already stripped).
///
/// `sequence_mode` selects which variant comes back: the sequence variant reads the extra frame
/// fields and reinterprets 0x74 as points per frame. Nothing here checks that the instrument really
/// is in sequence mode.
pub fn decode_preamble(buf:&[u8], sequence_mode:bool) -> Result<WaveformDescriptor> {
	if buf.len() < MIN_DESCRIPTOR_LEN {
		return Err(ScopeError::MalformedDescriptor(format!("descriptor is {} bytes, need at least {}", buf.len(), MIN_DESCRIPTOR_LEN)));
	}

	let acquisition = decode_acquisition(buf)?;

	if !sequence_mode {
		let point_count = POINT_COUNT.int(buf)? as i32;
		return Ok(WaveformDescriptor::Single { acquisition, point_count });
	}

	let timestamp = match buf.get(FRAME_TIMESTAMP_OFFSET..FRAME_TIMESTAMP_OFFSET + FRAME_TIMESTAMP_LEN) {
		Some(raw) => Some(FrameTimestamp::decode(raw)?),
		None => None,
	};

	let sequence = SequenceInfo {
		data_width_flag: DATA_WIDTH.int(buf)? as i16,
		byte_order_flag: BYTE_ORDER.int(buf)? as i16,
		points_per_frame: POINTS_PER_FRAME.int(buf)? as i32,
		frames_requested: FRAMES_REQUESTED.int(buf)? as i32,
		frames_acquired: FRAMES_ACQUIRED.int(buf)? as i32,
		frame_serial_number: FRAME_SERIAL.int(buf)? as i16,
		timestamp,
	};

	Ok(WaveformDescriptor::Sequence { acquisition, sequence })
}
