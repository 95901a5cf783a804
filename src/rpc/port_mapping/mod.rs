
pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use super::IPPROTO_TCP;
use super::xdr_pack;
use super::tcp_clients::TcpClient;

#[derive(Debug)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub port: u32,
}

pub struct TcpPortMapperClient {
	pub host: String,
	tcp_client: TcpClient,
}

impl TcpPortMapperClient {

	pub fn new(host:&str, timeout:Option<Duration>) -> io::Result<Self> {
		let tcp_client = TcpClient::connect((host, PMAP_PORT), PMAP_PROG, PMAP_VERS, timeout)?;
		Ok(Self{ host: host.to_owned(), tcp_client })
	}

	// Port the given program is listening on over TCP; zero means it isn't registered
	pub fn get_port(&mut self, m:&Mapping) -> io::Result<u16> {
		self.tcp_client.start_call(PMAPPROC_GETPORT)?;
		xdr_pack::pack_mapping(&mut self.tcp_client.packer, m.program, m.version, IPPROTO_TCP, m.port)?;
		self.tcp_client.do_call()?;

		let ans:u32 = self.tcp_client.unpacker.unpack_u32()?;

		if !self.tcp_client.unpacker.all_data_consumed() {
			return Err(Error::new(ErrorKind::InvalidData, "Data unexpectedly left over in unpacker after unpacking port"));
		}

		match ans {
			0 => Err(Error::new(ErrorKind::NotFound, format!("Program {:#x} is not registered with the port mapper on {}", m.program, self.host))),
			p if p > u16::MAX as u32 => Err(Error::new(ErrorKind::InvalidData, "Port mapper returned a port above 65535")),
			p => Ok(p as u16),
		}
	}

}
