// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;

pub const OPERATION_FLAGS_END_ONLY:i32 = 8;

// Reason bits in a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use log::{debug, trace};

use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping};
use crate::rpc::tcp_clients::TcpClient;

pub mod xdr_pack;

// Slack on top of the instrument-side timeout so the device gets to report its own I/O timeout first
const SOCKET_TIMEOUT_MARGIN:Duration = Duration::from_millis(1000);

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

// Maps a VXI-11 device_error code to an io::Error, keeping timeouts distinguishable
fn device_error(code:i32) -> io::Error {
    match code {
        1  => err("Syntax error"),
        3  => err("Device not accessible"),
        4  => err("Invalid link identifier"),
        5  => err("Parameter error"),
        9  => err("Out of resources"),
        11 => err("Device locked by another link"),
        15 => Error::new(ErrorKind::TimedOut, "I/O timeout"),
        17 => err("I/O error"),
        21 => err("Invalid address"),
        23 => err("Abort"),
        _  => Error::new(ErrorKind::Other, format!("Unknown VXI-11 error code {}", code)),
    }
}

pub struct CoreClient {
    client: TcpClient,
    opt_link: Option<Link>,
    io_timeout_ms: u32,
    lock_timeout_ms: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub link_id: i32,
    pub max_recv_size: u32,
}

fn millis(d:Duration) -> u32 { d.as_millis().min(u32::MAX as u128) as u32 }

impl CoreClient {

    fn get_link(&self) -> io::Result<Link> {
        self.opt_link.ok_or_else(|| err("No link"))
    }

    pub fn new(host:&str, io_timeout:Duration, lock_timeout:Duration) -> io::Result<Self> {
        let socket_timeout = Some(io_timeout + SOCKET_TIMEOUT_MARGIN);

        // Find the port to use for the core program
        let mut pmap_client = TcpPortMapperClient::new(host, socket_timeout)?;
        let mapping = Mapping { program: DEVICE_CORE_PROG, version: DEVICE_CORE_VERS, port: 0 };
        let port = pmap_client.get_port(&mapping)?;
        debug!("VXI-11 core program on {} is at port {}", host, port);

        let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, socket_timeout)?;

        Ok(CoreClient { client, opt_link: None, io_timeout_ms: millis(io_timeout), lock_timeout_ms: millis(lock_timeout) })
    }

    pub fn create_link(&mut self, device:&str) -> io::Result<()> {
        if self.opt_link.is_some() {
            return Err(err("Already connected to a link"));
        }

        self.client.start_call(CREATE_LINK)?;
        xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, self.lock_timeout_ms, device)?;
        self.client.do_call()?;

        let error:i32         = self.client.unpacker.unpack_i32()?;
        let link_id:i32       = self.client.unpacker.unpack_i32()?;
        let _abort_port:u32   = self.client.unpacker.unpack_u32()?;
        let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

        if error != 0 {
            return Err(device_error(error));
        }

        debug!("created VXI-11 link {} to {} (max_recv_size={})", link_id, device, max_recv_size);
        self.opt_link = Some(Link{ link_id, max_recv_size });
        Ok(())
    }

    // Splits the message so no single device_write exceeds what the device said it can take
    pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
        let link = self.get_link()?;
        let chunk_len = (link.max_recv_size as usize).max(1);

        if data.is_empty() { return self.write_chunk(link.link_id, &[], true); }

        let mut chunks = data.chunks(chunk_len).peekable();
        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            self.write_chunk(link.link_id, chunk, last)?;
        }
        Ok(())
    }

    fn write_chunk(&mut self, link_id:i32, data:&[u8], last:bool) -> io::Result<()> {
        let flags = if last { OPERATION_FLAGS_END_ONLY } else { 0 };

        self.client.start_call(DEVICE_WRITE)?;
        xdr_pack::pack_device_write_parms(&mut self.client.packer, link_id, self.io_timeout_ms, self.lock_timeout_ms, flags, data)?;
        self.client.do_call()?;

        let error:i32 = self.client.unpacker.unpack_i32()?;
        let size:u32  = self.client.unpacker.unpack_u32()?;

        if error != 0 {
            return Err(device_error(error));
        }
        if size as usize != data.len() {
            return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
        }
        Ok(())
    }

    // Reads one complete response, following device_read replies until the device flags END
    pub fn read(&mut self) -> io::Result<Vec<u8>> {
        let link = self.get_link()?;
        let mut ans:Vec<u8> = vec![];

        loop {
            self.client.start_call(DEVICE_READ)?;
            xdr_pack::pack_device_read_parms(&mut self.client.packer, link.link_id, u32::MAX, self.io_timeout_ms, self.lock_timeout_ms, 0, 0)?;
            self.client.do_call()?;

            let error:i32  = self.client.unpacker.unpack_i32()?;
            let reason:i32 = self.client.unpacker.unpack_i32()?;
            let mut data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;

            if error != 0 {
                return Err(device_error(error));
            }
            if reason & !(REASON_REQCNT | REASON_CHR | REASON_END) != 0 {
                return Err(err("Bits in reason code that should be zero aren't zero"));
            }

            trace!("device_read returned {} bytes, reason={}", data.len(), reason);
            ans.append(&mut data);

            if reason & REASON_END != 0 {
                return Ok(ans);
            }
        }
    }

    pub fn destroy_link(&mut self) -> io::Result<()> {
        let link = self.opt_link.take().ok_or_else(|| err("No link to destroy"))?;

        self.client.start_call(DESTROY_LINK)?;
        xdr_pack::pack_device_link(&mut self.client.packer, link.link_id)?;
        self.client.do_call()?;

        match self.client.unpacker.unpack_i32()? {
            0 => Ok(()),
            e => Err(device_error(e)),
        }
    }

}
