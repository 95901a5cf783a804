// Reading single frames out of a sequence (segmented) acquisition.
//
// Same paging as a normal read, but the point budget is the frame length from the descriptor and
// the frame has to be selected first. The scope must already be in sequence mode: nothing here can
// tell a sequence descriptor from a normal one, and a normal one will be misread.

use log::info;

use crate::channel::CommandChannel;
use crate::error::{Result, ScopeError};

use super::convert::{self, ChannelTrace};
use super::preamble::{Acquisition, FrameTimestamp, SequenceInfo, WaveformDescriptor};
use super::transfer::{self, PagePlan};
use super::{chan_ok, parse_point_count};

/// Selects a frame and resets the read window so the next preamble describes that frame alone.
pub fn select_frame<C: CommandChannel>(source:&mut C, chan_num:u8, frame_number:u32) -> Result<()> {
	chan_ok(chan_num)?;
	source.send(&format!(":WAV:SOUR C{}", chan_num))?;
	source.send(":WAVeform:STARt 0")?;
	source.send(":WAVeform:POINt 0")?;
	source.send(&format!(":WAVeform:SEQUence {},0", frame_number))
}

// Checks everything the descriptor has to supply before a frame read sends anything
fn frame_layout(descriptor:&WaveformDescriptor) -> Result<(&Acquisition, &SequenceInfo, FrameTimestamp)> {
	let (acquisition, sequence) = match descriptor {
		WaveformDescriptor::Sequence { acquisition, sequence } => (acquisition, sequence),
		WaveformDescriptor::Single { .. } => {
			return Err(ScopeError::MalformedDescriptor("frame reads need a descriptor decoded in sequence mode".to_owned()));
		}
	};

	let timestamp = sequence.timestamp.ok_or_else(|| ScopeError::MalformedDescriptor("sequence descriptor carries no frame timestamp".to_owned()))?;
	if sequence.points_per_frame < 0 {
		return Err(ScopeError::MalformedDescriptor(format!("negative points per frame ({})", sequence.points_per_frame)));
	}
	acquisition.sample_width()?;
	sequence.sample_order()?;
	Ok((acquisition, sequence, timestamp))
}

/// Reads frame `frame_number` of `chan_num`, returning the trace and the frame's capture time.
///
/// The frame is selected here, once, before the first page is requested.
pub fn read_sequence_frame<C: CommandChannel>(chan_num:u8, frame_number:u32, descriptor:&WaveformDescriptor, source:&mut C) -> Result<(ChannelTrace, String)> {
	chan_ok(chan_num)?;
	frame_layout(descriptor)?;

	select_frame(source, chan_num, frame_number)?;
	read_selected_frame(chan_num, frame_number, descriptor, source)
}

/// Pages out a frame that `select_frame` has already selected.
pub fn read_selected_frame<C: CommandChannel>(chan_num:u8, frame_number:u32, descriptor:&WaveformDescriptor, source:&mut C) -> Result<(ChannelTrace, String)> {
	let (acquisition, sequence, timestamp) = frame_layout(descriptor)?;
	let width = acquisition.sample_width()?;
	let order = sequence.sample_order()?;

	let max_page_points = parse_point_count(":WAVeform:MAXPoint?", &source.query(":WAVeform:MAXPoint?")?)?;
	let plan = PagePlan::new(sequence.points_per_frame as u64, max_page_points)?;

	let data = transfer::read_block(source, plan, width)?;
	let codes = transfer::decode_samples(&data, width, order)?;
	let trace = convert::convert(&codes, acquisition);

	let stamp = timestamp.to_string();
	info!("read C{} frame {}: {} points in {} page(s), captured {}", chan_num, frame_number, trace.len(), plan.page_count(), stamp);
	Ok((trace, stamp))
}
