
// External data representation, the serialization underneath RPC
pub mod xdr;

// Remote procedure call over TCP, enough of it to find and talk to a VXI-11 server
pub mod rpc;

// The VXI-11 core channel used by LAN instruments
pub mod vxi11;

// Request/response abstraction the waveform code is written against, and its VXI-11 implementation
pub mod channel;

pub mod config;
pub mod error;

// Instrument-specific waveform transfer
pub mod devices;

pub use channel::{CommandChannel, Vxi11Channel};
pub use config::ScopeConfig;
pub use error::{Result, ScopeError};
pub use devices::sds2000x::{Scope, ChannelTrace, WaveformDescriptor, decode_preamble, read_channel, read_sequence_frame};
