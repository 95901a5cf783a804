use std::io::{self, Cursor, Error, ErrorKind};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

pub struct Packer {
	pub buff: Vec<u8>
}

// Reads are tracked with a position instead of draining the front of the buffer, so a multi-megabyte
// waveform reply isn't shifted four bytes at a time
pub struct Unpacker {
	buff: Vec<u8>,
	pos: usize,
}

fn short(what:&str) -> io::Error {
	Error::new(ErrorKind::UnexpectedEof, format!("XDR buffer ended while unpacking {}", what))
}

impl Packer {

	pub fn new() -> Self { Packer{ buff: Vec::new() } }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn get_buf(&self) -> &[u8] { &self.buff }

	// Packing methods that can only add multiples of four bytes, so if we started off with the correct
	// padding, we'll end up with the correct padding
	pub fn pack_u32(&mut self, x:u32) -> io::Result<()> { self.buff.write_u32::<BigEndian>(x) }
	pub fn pack_i32(&mut self, x:i32) -> io::Result<()> { self.buff.write_i32::<BigEndian>(x) }

	pub fn pack_bool(&mut self, b:bool) -> io::Result<()> { self.pack_i32(if b { 1 } else { 0 }) }

	pub fn pack_enum(&mut self, x:i32) -> io::Result<()> { self.pack_i32(x) }

	pub fn pack_variable_len_opaque(&mut self, data:&[u8]) -> io::Result<()> {
		self.pack_u32(data.len() as u32)?;
		self.buff.extend_from_slice(data);

		// Ensure alignment
		while self.buff.len() % 4 != 0 { self.buff.push(0); }
		Ok(())
	}

}

impl Default for Packer {
	fn default() -> Self { Self::new() }
}

impl Unpacker {

	pub fn new() -> Self { Unpacker{ buff: Vec::new(), pos: 0 } }

	pub fn reset(&mut self, data:&[u8]) {
		self.buff.clear();
		self.buff.extend_from_slice(data);
		self.pos = 0;
	}

	pub fn remaining(&self) -> usize { self.buff.len() - self.pos }
	pub fn all_data_consumed(&self) -> bool { self.remaining() == 0 }

	pub fn unpack_u32(&mut self) -> io::Result<u32> {
		let mut rdr = Cursor::new(&self.buff[self.pos..]);
		let ans:u32 = rdr.read_u32::<BigEndian>().map_err(|_| short("u32"))?;
		self.pos += 4;
		Ok(ans)
	}

	pub fn unpack_i32(&mut self) -> io::Result<i32> {
		let mut rdr = Cursor::new(&self.buff[self.pos..]);
		let ans:i32 = rdr.read_i32::<BigEndian>().map_err(|_| short("i32"))?;
		self.pos += 4;
		Ok(ans)
	}

	// An enum is just an i32 with a restricted set of values.  We can't check that this value is in the restricted set at this
	// level because it depends on the application, so for our purposes here, an enum is the same as an i32
	pub fn unpack_enum(&mut self) -> io::Result<i32> { self.unpack_i32() }

	pub fn unpack_bool(&mut self) -> io::Result<bool> {
		match self.unpack_i32()? {
			0 => Ok(false),
			1 => Ok(true),
			x => Err(Error::new(ErrorKind::InvalidData, format!("Expected 0 or 1 in unpack_bool but got {}", x))),
		}
	}

	pub fn unpack_variable_len_opaque(&mut self) -> io::Result<Vec<u8>> {
		let n = self.unpack_u32()? as usize;
		if n > self.remaining() { return Err(short("opaque data")); }

		let ans:Vec<u8> = self.buff[self.pos..self.pos + n].to_vec();

		// Skip the padding, which may be missing at the very end of a reply
		let padded = (n + 3) & !3;
		self.pos = (self.pos + padded).min(self.buff.len());
		Ok(ans)
	}

}

impl Default for Unpacker {
	fn default() -> Self { Self::new() }
}
