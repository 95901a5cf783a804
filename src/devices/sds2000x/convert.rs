use serde::Serialize;

use super::preamble::Acquisition;

/// Number of horizontal divisions on the display grid.
pub const HORIZONTAL_DIVISIONS:f64 = 10.0;

/// Converted waveform for one channel. `time` and `voltage` always have the same length.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ChannelTrace {
	time: Vec<f64>,
	voltage: Vec<f64>,
}

impl ChannelTrace {
	pub fn time(&self) -> &[f64] { &self.time }
	pub fn voltage(&self) -> &[f64] { &self.voltage }

	pub fn len(&self) -> usize { self.time.len() }
	pub fn is_empty(&self) -> bool { self.time.is_empty() }

	pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
		self.time.iter().copied().zip(self.voltage.iter().copied())
	}

	pub fn into_parts(self) -> (Vec<f64>, Vec<f64>) { (self.time, self.voltage) }
}

pub fn code_to_voltage(code:i16, acq:&Acquisition) -> f64 {
	(code as f64 / acq.code_per_division) * acq.vertical_scale - acq.vertical_offset
}

pub fn index_to_time(index:usize, acq:&Acquisition) -> f64 {
	-(acq.time_per_division * HORIZONTAL_DIVISIONS / 2.0) + index as f64 * acq.sample_interval + acq.trigger_delay
}

/// Maps raw sample codes to volts and sample indices to seconds relative to the trigger.
pub fn convert(codes:&[i16], acq:&Acquisition) -> ChannelTrace {
	let voltage:Vec<f64> = codes.iter().map(|c| code_to_voltage(*c, acq)).collect();
	let time:Vec<f64> = (0..codes.len()).map(|i| index_to_time(i, acq)).collect();
	ChannelTrace { time, voltage }
}
