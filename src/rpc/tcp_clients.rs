
use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::trace;

use crate::xdr;
use super::xdr_pack;
use super::xdr_unpack;

const LAST_FRAGMENT:u32 = 0x8000_0000;

// Record-marking client for ONC-RPC over a stream socket
pub struct TcpClient {
    stream: TcpStream,
    pub prog: u32,
    pub vers: u32,
    pub lastxid: u32,
    pub packer: xdr::Packer,
    pub unpacker: xdr::Unpacker,
}

impl TcpClient {

	pub fn connect<A: ToSocketAddrs>(addr: A, prog: u32, vers: u32, timeout: Option<Duration>) -> io::Result<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_read_timeout(timeout)?;
		stream.set_write_timeout(timeout)?;
		stream.set_nodelay(true)?;
		Ok(Self{ stream, prog, vers, lastxid: 0, packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() })
	}

	// Resets the packer and writes the call header; procedure arguments get packed after this
	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	// Sends whatever is in the packer and loads the matching reply into the unpacker, past its header
	pub fn do_call(&mut self) -> io::Result<()> {
		let call:&[u8] = self.packer.get_buf();
		if !call.is_empty() {
			let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
			send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
			send_bytes.extend_from_slice(call);
			self.stream.write_all(&send_bytes)?;
		}

		loop {
			let reply = self.read_record()?;
			self.unpacker.reset(&reply);

			let (xid, _) = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(());
			} else if xid < self.lastxid {
				// Stale reply to a call we already gave up on
				trace!("skipping RPC reply with stale xid {} (expecting {})", xid, self.lastxid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::InvalidData, "Somehow got a packet from the future"));
			}
		}
	}

	fn read_record(&mut self) -> io::Result<Vec<u8>> {
		let mut reply:Vec<u8> = vec![];

		let mut last:bool = false;
		while !last {
			let x:u32 = self.stream.read_u32::<BigEndian>()?;

			last = (x & LAST_FRAGMENT) != 0;
			let n = (x & !LAST_FRAGMENT) as usize;

			let start = reply.len();
			reply.resize(start + n, 0);
			self.stream.read_exact(&mut reply[start..])?;
		}

		Ok(reply)
	}

}
