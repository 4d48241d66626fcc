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

//! Packet framing.
//!
//! ```text
//! cloak(8) | sender pub(33) | iv(16) | id(16) seq(2) length(4) parity(1) shard
//!                                    |<-------------- encrypted ------------->|
//! ```
//!
//! The cloak names the receiver key the packet is encrypted to. Each message gets its own
//! ephemeral sender key and each packet its own IV.

use super::keyring::KeyRing;
use crate::core::{
	cloak::{self, CLOAK_SIZE},
	crypto::{encipher, PrvKey, PubKey},
	Error, Hash, Id, Splice, ID_SIZE, IV_SIZE, PUB_SIZE,
};
use rand::RngCore;

pub const HEADER_LEN: usize = CLOAK_SIZE + PUB_SIZE + IV_SIZE;
const BODY_HEADER_LEN: usize = ID_SIZE + 2 + 4 + 1;
/// Bytes of every packet that are not shard.
pub const OVERHEAD: usize = HEADER_LEN + BODY_HEADER_LEN;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
	pub id: Id,
	pub seq: u16,
	/// Length of the whole message.
	pub length: u32,
	/// Parity the message was coded with.
	pub parity: u8,
	pub shard: Vec<u8>,
}

/// Encrypts the packets of one message to the peer's current key.
pub struct Sealer {
	remote: PubKey,
	public: PubKey,
	cipher: Hash,
}

impl Sealer {
	pub fn new(remote: PubKey) -> Self {
		let ephemeral = PrvKey::gen(&mut rand::thread_rng());
		let cipher = ephemeral.cipher(&remote);
		Self { remote, public: ephemeral.public(), cipher }
	}

	pub fn seal(&self, packet: &Packet) -> Result<Vec<u8>, Error> {
		let mut rng = rand::thread_rng();
		let mut iv = [0; IV_SIZE];
		rng.fill_bytes(&mut iv);
		let mut s = Splice::new(OVERHEAD + packet.shard.len());
		s.put_cloak(&cloak::cloak(&self.remote.to_bytes(), &mut rng))?;
		s.put_pub(&self.public)?;
		s.put_iv(&iv)?;
		s.put_id(&packet.id)?;
		s.put_u16(packet.seq)?;
		s.put_u32(packet.length)?;
		s.put_u8(packet.parity)?;
		s.put_raw(&packet.shard)?;
		let mut buf = s.into_vec();
		encipher(&self.cipher, &iv, &mut buf[HEADER_LEN..]);
		Ok(buf)
	}
}

/// Decrypt a packet with whichever of our keys it was sealed to.
pub fn open(buf: Vec<u8>, keys: &mut KeyRing) -> Result<Packet, Error> {
	let mut s = Splice::load(buf);
	s.require(OVERHEAD)?;
	let cloak = s.read_cloak()?;
	let sender = s.read_pub_bytes()?;
	let iv = s.read_iv()?;
	let cipher = keys.cipher(&cloak, &sender)?;
	encipher(&cipher, &iv, &mut s.as_mut_slice()[HEADER_LEN..]);
	let id = s.read_id()?;
	let seq = s.read_u16()?;
	let length = s.read_u32()?;
	let parity = s.read_u8()?;
	let shard = s.read_raw(s.remaining())?;
	Ok(Packet { id, seq, length, parity, shard })
}
