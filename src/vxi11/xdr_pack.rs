use std::io::{self, Error, ErrorKind};

use crate::xdr::Packer;

pub fn pack_device_link(packer:&mut Packer, link:i32) -> io::Result<()> {
	packer.pack_i32(link)
}

pub fn pack_create_link_parms(packer:&mut Packer, id:i32, lock_device:bool, lock_timeout:u32, device:&str) -> io::Result<()> {
	if !device.is_ascii() {
		return Err(Error::new(ErrorKind::InvalidInput, "VXI-11 device names must be ASCII"));
	}
	packer.pack_i32(id)?;
	packer.pack_bool(lock_device)?;
	packer.pack_u32(lock_timeout)?;
	packer.pack_variable_len_opaque(device.as_bytes())
}

pub fn pack_device_write_parms(packer:&mut Packer, link:i32, timeout:u32, lock_timeout:u32, flags:i32, data:&[u8]) -> io::Result<()> {
	packer.pack_i32(link)?;
	packer.pack_u32(timeout)?;
	packer.pack_u32(lock_timeout)?;
	packer.pack_i32(flags)?;
	packer.pack_variable_len_opaque(data)
}

pub fn pack_device_read_parms(packer:&mut Packer, link:i32, request_size:u32, timeout:u32, lock_timeout:u32, flags:i32, term_char:i32) -> io::Result<()> {
    packer.pack_i32(link)?;
    packer.pack_u32(request_size)?;
    packer.pack_u32(timeout)?;
    packer.pack_u32(lock_timeout)?;
    packer.pack_i32(flags)?;
    packer.pack_i32(term_char)
}
