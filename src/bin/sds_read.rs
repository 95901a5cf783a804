extern crate sds_waveform;

use std::collections::BTreeMap;
use std::env;
use std::process;

use log::error;
use serde::Serialize;

use sds_waveform::{Scope, ScopeConfig, ScopeError, ChannelTrace};
use sds_waveform::devices::sds2000x::FrameRecord;

const USAGE:&str = "usage: sds-read <config.json> [--frame <n>] <channel>...";

#[derive(Serialize)]
struct Output<'a> {
	frame: Option<&'a FrameRecord>,
	channels: BTreeMap<String, &'a ChannelTrace>,
}

struct Args {
	config_path: String,
	frame: Option<u32>,
	channels: Vec<u8>,
}

fn parse_args(mut args:impl Iterator<Item = String>) -> Result<Args, String> {
	let config_path = args.next().ok_or("missing config path")?;
	let mut frame = None;
	let mut channels = vec![];

	while let Some(arg) = args.next() {
		if arg == "--frame" {
			let n = args.next().ok_or("--frame needs a frame number")?;
			frame = Some(n.parse::<u32>().map_err(|_| format!("bad frame number {:?}", n))?);
		} else {
			channels.push(arg.parse::<u8>().map_err(|_| format!("bad channel {:?}", arg))?);
		}
	}

	if channels.is_empty() { return Err("no channels given".to_owned()); }
	Ok(Args{ config_path, frame, channels })
}

fn run(args:Args) -> Result<String, ScopeError> {
	let config = ScopeConfig::from_json_file(&args.config_path)?;
	let mut scope = Scope::connect(&config)?;

	for ch in &args.channels {
		match args.frame {
			Some(frame) => { scope.read_sequence_frame(*ch, frame)?; },
			None        => { scope.read_waveform(*ch)?; },
		}
	}

	let output = Output {
		frame: scope.last_frame(),
		channels: scope.traces().map(|(ch, trace)| (format!("C{}", ch), trace)).collect(),
	};
	serde_json::to_string_pretty(&output).map_err(|e| ScopeError::Io(e.into()))
}

fn main() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let args = match parse_args(env::args().skip(1)) {
		Ok(a) => a,
		Err(msg) => {
			eprintln!("{}\n{}", msg, USAGE);
			process::exit(2);
		}
	};

	match run(args) {
		Ok(json) => println!("{}", json),
		Err(e) => {
			error!("{}", e);
			process::exit(1);
		}
	}
}
