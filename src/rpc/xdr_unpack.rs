
use std::io::{self, Error, ErrorKind};

use crate::xdr::Unpacker;
use crate::rpc::{REPLY, MSG_DENIED, RPC_MISMATCH, AUTH_ERROR, MSG_ACCEPTED, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS, SUCCESS};

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub fn unpack_auth(unpacker:&mut Unpacker) -> io::Result<(i32, Vec<u8>)> {
	let flavor:i32    = unpacker.unpack_enum()?;
	let stuff:Vec<u8> = unpacker.unpack_variable_len_opaque()?;
	Ok((flavor, stuff))
}

// Leaves the unpacker positioned at the start of the procedure's results
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> io::Result<(u32, (i32, Vec<u8>))> {
    let xid:u32 = unpacker.unpack_u32()?;

    let mtype:i32 = unpacker.unpack_enum()?;
    if mtype != REPLY { return Err(err("Expected REPLY message type in unpack_replyheader")); }

    match unpacker.unpack_enum()? {
		MSG_DENIED => {
	    	match unpacker.unpack_enum()? {
	    		RPC_MISMATCH => {
	    			unpacker.unpack_u32()?;	// low version
					unpacker.unpack_u32()?;	// high version
					return Err(err("Message denied due to RPC_MISMATCH in unpack_replyheader"))
	    		},
	    		AUTH_ERROR => {
					unpacker.unpack_u32()?;
					return Err(err("Message denied due to AUTH_ERROR in unpack_replyheader"))
	    		}
	    		_ => return Err(err("Message denied for an unknown reason in unpack_replyheader")),
	    	}
	    },
	    MSG_ACCEPTED => { },
	    _            => return Err(err("Neither MSG_DENIED nor MSG_ACCEPTED in unpack_replyheader")),
    }

    let verf = unpack_auth(unpacker)?;

    match unpacker.unpack_enum()? {
    	PROG_UNAVAIL  => return Err(err("Program unavailable in unpack_replyheader")),
    	PROG_MISMATCH => {
			unpacker.unpack_u32()?;
			unpacker.unpack_u32()?;
    		return Err(err("Program mismatch in unpack_replyheader"))
    	},
    	PROC_UNAVAIL  => return Err(err("Procedure unavailable in unpack_replyheader")),
    	GARBAGE_ARGS  => return Err(err("Garbage args in unpack_replyheader")),
    	SUCCESS => { },
    	_ => return Err(err("Call failed for unknown reason in unpack_replyheader")),
    }

	Ok((xid, verf))
}
