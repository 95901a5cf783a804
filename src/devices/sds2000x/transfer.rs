// Paged transfer of raw sample data with :WAVeform:DATA?
//
// Each page comes back as a definite-length block, `#<n><n length digits><payload>`. Pages are
// requested in order and only their payloads are kept, so page boundaries never need to line up
// with sample boundaries.

use std::convert::TryFrom;
use std::str;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::{debug, info};

use crate::channel::CommandChannel;
use crate::error::{Result, ScopeError};

use super::convert::{self, ChannelTrace};
use super::preamble::{SampleOrder, SampleWidth, WaveformDescriptor};
use super::{chan_ok, parse_point_count};

/// Offset of the first payload byte and the declared payload length of a definite-length block.
pub fn block_header(response:&[u8]) -> Result<(usize, usize)> {
	let marker = response.iter().position(|b| *b == b'#')
		.ok_or_else(|| ScopeError::Framing(format!("no '#' block marker in a {} byte response", response.len())))?;

	let digit = *response.get(marker + 1)
		.ok_or_else(|| ScopeError::Framing("response ends right after the '#' marker".to_owned()))?;
	let n = match digit {
		b'1'..=b'9' => (digit - b'0') as usize,
		_ => return Err(ScopeError::Framing(format!("invalid length-of-length digit {:?} after '#'", digit as char))),
	};

	let len_start = marker + 2;
	let len_field = response.get(len_start..len_start + n)
		.ok_or_else(|| ScopeError::Framing(format!("response ends inside the {} digit length field", n)))?;
	let len:usize = str::from_utf8(len_field).ok()
		.filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| ScopeError::Framing(format!("length field {:?} is not a decimal number", String::from_utf8_lossy(len_field))))?;

	Ok((len_start + n, len))
}

/// Returns the payload of one definite-length block, ignoring anything before the `#` marker and
/// anything after the declared length (usually a line terminator).
pub fn parse_block(response:&[u8]) -> Result<&[u8]> {
	let (data_start, len) = block_header(response)?;
	data_start.checked_add(len)
		.and_then(|end| response.get(data_start..end))
		.ok_or_else(|| ScopeError::Framing(
			format!("block declares {} payload bytes but only {} arrived", len, response.len().saturating_sub(data_start))
		))
}

/// How a transfer of `total_points` splits into pages of at most `max_page_points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
	pub total_points: u64,
	pub max_page_points: u64,
}

impl PagePlan {
	pub fn new(total_points:u64, max_page_points:u64) -> Result<Self> {
		if max_page_points == 0 {
			return Err(ScopeError::Framing("instrument reported a maximum page size of zero points".to_owned()));
		}
		Ok(PagePlan { total_points, max_page_points })
	}

	pub fn page_count(&self) -> u64 {
		self.total_points / self.max_page_points + if self.total_points % self.max_page_points == 0 { 0 } else { 1 }
	}

	/// Payload bytes the whole transfer carries at `width`. Counts no buffer could hold are rejected.
	pub fn byte_len(&self, width:SampleWidth) -> Result<usize> {
		usize::try_from(self.total_points).ok()
			.and_then(|n| n.checked_mul(width.bytes()))
			.filter(|n| *n <= isize::MAX as usize)
			.ok_or_else(|| ScopeError::Framing(format!("{} points of {:?} samples cannot be buffered", self.total_points, width)))
	}

	/// Starting sample offset of every page, in request order.
	pub fn starts(&self) -> impl Iterator<Item = u64> {
		let step = self.max_page_points;
		(0..self.page_count()).map(move |i| i * step)
	}

	pub fn is_paged(&self) -> bool { self.total_points > self.max_page_points }
}

/// Fetches every page of the currently selected source and returns the concatenated payloads.
///
/// The width directive goes out once before the first page, as does the page size limit when the
/// transfer doesn't fit in a single page. The result is checked against the expected byte count;
/// on any failure the partial buffer is dropped.
pub fn read_block<C: CommandChannel>(source:&mut C, plan:PagePlan, width:SampleWidth) -> Result<Vec<u8>> {
	let expected = plan.byte_len(width)?;

	if plan.is_paged() {
		source.send(&format!(":WAVeform:POINt {}", plan.max_page_points))?;
	}
	source.send(&format!(":WAVeform:WIDTh {}", width.directive()))?;

	let mut data:Vec<u8> = Vec::new();

	for start in plan.starts() {
		source.send(&format!(":WAVeform:STARt {}", start))?;
		source.send("WAV:DATA?")?;
		let response = source.receive()?;
		let payload = parse_block(&response)?;

		if payload.is_empty() {
			return Err(ScopeError::PrematureEndOfTransfer { start });
		}
		debug!("page at point {} carried {} bytes", start, payload.len());
		data.extend_from_slice(payload);
		if data.len() > expected { break; }
	}

	if data.len() != expected {
		return Err(ScopeError::Framing(format!(
			"reassembled {} bytes but {} points of {:?} samples need {}", data.len(), plan.total_points, width, expected
		)));
	}

	Ok(data)
}

/// Turns reassembled payload bytes into signed sample codes.
pub fn decode_samples(data:&[u8], width:SampleWidth, order:SampleOrder) -> Result<Vec<i16>> {
	match width {
		SampleWidth::Byte => Ok(data.iter().map(|b| *b as i8 as i16).collect()),
		SampleWidth::Word => {
			if data.len() % 2 != 0 {
				return Err(ScopeError::Framing(format!("{} bytes is not a whole number of 16-bit samples", data.len())));
			}
			let mut codes = vec![0i16; data.len() / 2];
			match order {
				SampleOrder::BigEndian    => BigEndian::read_i16_into(data, &mut codes),
				SampleOrder::LittleEndian => LittleEndian::read_i16_into(data, &mut codes),
			}
			Ok(codes)
		}
	}
}

/// Reads the current acquisition of `chan_num` and converts it to time/voltage pairs.
///
/// The descriptor must come from the same acquisition (see `Scope::read_waveform`). The point
/// count and page size are asked of the instrument before any data moves.
pub fn read_channel<C: CommandChannel>(chan_num:u8, descriptor:&WaveformDescriptor, source:&mut C) -> Result<ChannelTrace> {
	chan_ok(chan_num)?;
	descriptor.acquisition().sample_width()?;

	source.send(&format!(":WAV:SOUR C{}", chan_num))?;
	read_selected(chan_num, descriptor, source)
}

/// Same as `read_channel`, for a source that has already been selected with `:WAV:SOUR`.
pub fn read_selected<C: CommandChannel>(chan_num:u8, descriptor:&WaveformDescriptor, source:&mut C) -> Result<ChannelTrace> {
	let acquisition = descriptor.acquisition();
	let width = acquisition.sample_width()?;

	let total_points = parse_point_count(":ACQuire:POINts?", &source.query(":ACQuire:POINts?")?)?;
	let max_page_points = parse_point_count(":WAVeform:MAXPoint?", &source.query(":WAVeform:MAXPoint?")?)?;
	let plan = PagePlan::new(total_points, max_page_points)?;

	if let WaveformDescriptor::Single { point_count, .. } = descriptor {
		if *point_count as i64 != total_points as i64 {
			debug!("descriptor reports {} points, acquisition reports {}", point_count, total_points);
		}
	}

	let data = read_block(source, plan, width)?;
	let codes = decode_samples(&data, width, SampleOrder::BigEndian)?;
	let trace = convert::convert(&codes, acquisition);

	info!("read C{}: {} points in {} page(s)", chan_num, trace.len(), plan.page_count());
	Ok(trace)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn framed(payload:&[u8]) -> Vec<u8> {
		let len = payload.len().to_string();
		let mut v = format!("#{}{}", len.len(), len).into_bytes();
		v.extend_from_slice(payload);
		v
	}

	#[test]
	fn block_payload_is_extracted() {
		assert_eq!(parse_block(b"#15hello").unwrap(), b"hello");
		assert_eq!(parse_block(b"#9000000003abc\n\n").unwrap(), b"abc");
		assert_eq!(parse_block(b"DAT2,#13xyz").unwrap(), b"xyz");
		assert_eq!(parse_block(b"#10").unwrap(), b"");
		assert_eq!(block_header(b"\n#203abc").unwrap(), (5, 3));
	}

	#[test]
	fn binary_payload_may_contain_marker_bytes() {
		let payload = [b'#', 0x00, 0xff, b'#', 0x80];
		assert_eq!(parse_block(&framed(&payload)).unwrap(), &payload);
	}

	#[test]
	fn bad_framing_is_rejected() {
		for bad in &[&b"hello"[..], b"#", b"#0", b"#x12", b"#3 12abc", b"#21", b"#15abc"] {
			assert!(matches!(parse_block(bad), Err(ScopeError::Framing(_))), "{:?}", String::from_utf8_lossy(bad));
		}
	}

	#[test]
	fn page_count_rounds_up() {
		assert_eq!(PagePlan::new(1000, 400).unwrap().page_count(), 3);
		assert_eq!(PagePlan::new(800, 400).unwrap().page_count(), 2);
		assert_eq!(PagePlan::new(1, 400).unwrap().page_count(), 1);
		assert_eq!(PagePlan::new(0, 400).unwrap().page_count(), 0);
		assert_eq!(PagePlan::new(1000, 400).unwrap().starts().collect::<Vec<_>>(), vec![0, 400, 800]);
		assert!(PagePlan::new(10, 0).is_err());
	}

	#[test]
	fn huge_counts_neither_overflow_nor_allocate() {
		let plan = PagePlan::new(u64::MAX, 1000).unwrap();
		assert_eq!(plan.page_count(), u64::MAX / 1000 + 1);
		assert_eq!(PagePlan::new(u64::MAX, u64::MAX).unwrap().page_count(), 1);
		assert!(matches!(plan.byte_len(SampleWidth::Byte), Err(ScopeError::Framing(_))));
		assert!(matches!(PagePlan::new(u64::MAX / 2, 1).unwrap().byte_len(SampleWidth::Word), Err(ScopeError::Framing(_))));
		assert_eq!(PagePlan::new(1000, 400).unwrap().byte_len(SampleWidth::Word).unwrap(), 2000);
	}

	#[test]
	fn byte_samples_are_signed() {
		let codes = decode_samples(&[0x00, 0x7f, 0x80, 0xff], SampleWidth::Byte, SampleOrder::BigEndian).unwrap();
		assert_eq!(codes, vec![0, 127, -128, -1]);
	}

	#[test]
	fn word_samples_follow_the_requested_order() {
		let data = [0x01, 0x02, 0xff, 0xfe];
		assert_eq!(decode_samples(&data, SampleWidth::Word, SampleOrder::BigEndian).unwrap(), vec![0x0102, -2]);
		assert_eq!(decode_samples(&data, SampleWidth::Word, SampleOrder::LittleEndian).unwrap(), vec![0x0201, -257]);
		assert!(matches!(decode_samples(&data[..3], SampleWidth::Word, SampleOrder::BigEndian), Err(ScopeError::Framing(_))));
	}
}
