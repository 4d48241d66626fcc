// Copyright 2026 Veilnet Developers.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Messages the two ends of a connection exchange, demultiplexed by magic after reassembly.

use crate::core::{
	registry::{Codec, Registry},
	Error, Hash, Id, Magic, PubBytes, Splice, HASH_SIZE, ID_SIZE, MAGIC_SIZE, PUB_SIZE,
};
use std::sync::OnceLock;

pub mod magic {
	use crate::core::Magic;

	pub const NEW_KEY: Magic = *b"nkey";
	pub const ACK: Magic = *b"ackn";
	pub const ONION: Magic = *b"onio";
}

/// Reception report for one message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ack {
	pub id: Id,
	/// Hash of what was rebuilt, zero if nothing was.
	pub hash: Hash,
	/// Shard bytes the sender transmitted.
	pub size: u64,
	/// Shard bytes that arrived.
	pub received: u64,
	/// Time from first to last packet, in microseconds.
	pub duration_us: u64,
	/// Receiver's round trip estimate, in microseconds.
	pub ping_us: u64,
}

const ACK_LEN: usize = ID_SIZE + HASH_SIZE + 4 * 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
	/// Packets from now on go to this key.
	NewKey { key: PubBytes },
	Ack(Ack),
	/// Payload handed to whoever reads the connection.
	Onion(Vec<u8>),
}

impl Codec for Control {
	fn magic(&self) -> Magic {
		match self {
			Control::NewKey { .. } => magic::NEW_KEY,
			Control::Ack(_) => magic::ACK,
			Control::Onion(_) => magic::ONION,
		}
	}

	fn len(&self) -> usize {
		MAGIC_SIZE +
			match self {
				Control::NewKey { .. } => PUB_SIZE,
				Control::Ack(_) => ACK_LEN,
				Control::Onion(bytes) => bytes.len(),
			}
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		s.put_magic(&self.magic())?;
		match self {
			Control::NewKey { key } => s.put_pub_bytes(key),
			Control::Ack(ack) => {
				s.put_id(&ack.id)?;
				s.put_hash(&ack.hash)?;
				s.put_u64(ack.size)?;
				s.put_u64(ack.received)?;
				s.put_u64(ack.duration_us)?;
				s.put_u64(ack.ping_us)
			},
			Control::Onion(bytes) => s.put_raw(bytes),
		}
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		match self {
			Control::NewKey { key } => *key = s.read_pub_bytes()?,
			Control::Ack(ack) => {
				s.require(ACK_LEN)?;
				ack.id = s.read_id()?;
				ack.hash = s.read_hash()?;
				ack.size = s.read_u64()?;
				ack.received = s.read_u64()?;
				ack.duration_us = s.read_u64()?;
				ack.ping_us = s.read_u64()?;
			},
			Control::Onion(bytes) => *bytes = s.read_raw(s.remaining())?,
		}
		Ok(())
	}
}

pub fn controls() -> &'static Registry<Control> {
	static CONTROLS: OnceLock<Registry<Control>> = OnceLock::new();
	CONTROLS.get_or_init(|| {
		let mut registry = Registry::new();
		registry
			.register(magic::NEW_KEY, || Control::NewKey { key: [0; PUB_SIZE] })
			.register(magic::ACK, || Control::Ack(Ack::default()))
			.register(magic::ONION, || Control::Onion(Vec::new()));
		registry
	})
}
