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

use super::{Onion, REPLY_HEADER_LEN, ROUTING_HEADER_LEN};
use crate::core::{
	crypto::encipher,
	registry::Codec,
	sessions::{Billable, SessionManager},
	Ciphers, Error, Id, Nonces, Splice, REPLY_HOPS,
};

/// Three encoded Reverse/Crypt pairs leading back to whoever built them.
pub type RoutingHeader = [u8; ROUTING_HEADER_LEN];

/// Everything a remote node needs to send a reply it cannot read the path of.
#[derive(Clone, Debug)]
pub struct ReplyHeader {
	/// Payload cipher of each return hop, in path order.
	pub ciphers: Ciphers,
	/// Crypt IV of each return hop, in path order.
	pub nonces: Nonces,
	pub routing: Box<RoutingHeader>,
	/// Our sessions on the return hops. Only known to the builder, never sent.
	pub sessions: [Option<Id>; REPLY_HOPS],
}

impl ReplyHeader {
	pub fn new(ciphers: Ciphers, nonces: Nonces, routing: RoutingHeader) -> Self {
		Self { ciphers, nonces, routing: Box::new(routing), sessions: [None; REPLY_HOPS] }
	}

	pub fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		s.put_ciphers(&self.ciphers)?;
		s.put_nonces(&self.nonces)?;
		s.put_raw(&self.routing[..])
	}

	pub fn decode(s: &mut Splice) -> Result<Self, Error> {
		s.require(REPLY_HEADER_LEN)?;
		let ciphers = s.read_ciphers()?;
		let nonces = s.read_nonces()?;
		let mut routing = [0; ROUTING_HEADER_LEN];
		routing.copy_from_slice(&s.read_raw(ROUTING_HEADER_LEN)?);
		Ok(Self::new(ciphers, nonces, routing))
	}

	/// Compose a reply: the routing header followed by `reply`, which is encrypted once under
	/// every return hop's cipher. Each hop on the way back strips one layer.
	pub fn format_reply(&self, reply: &Onion) -> Result<Vec<u8>, Error> {
		let mut s = Splice::new(ROUTING_HEADER_LEN + reply.len());
		s.put_raw(&self.routing[..])?;
		reply.encode(&mut s)?;
		let payload = &mut s.as_mut_slice()[ROUTING_HEADER_LEN..];
		for (cipher, nonce) in self.ciphers.iter().zip(&self.nonces) {
			encipher(cipher, nonce, payload);
		}
		Ok(s.into_vec())
	}

	pub(super) fn account(
		&self,
		size: usize,
		sessions: &SessionManager,
		billable: &mut Vec<Billable>,
	) -> Result<(), Error> {
		for id in self.sessions.iter().flatten() {
			billable.push(sessions.bill(id, size)?);
		}
		Ok(())
	}
}

impl Default for ReplyHeader {
	fn default() -> Self {
		Self::new(Ciphers::default(), Nonces::default(), [0; ROUTING_HEADER_LEN])
	}
}

/// Compares what goes on the wire.
impl PartialEq for ReplyHeader {
	fn eq(&self, other: &Self) -> bool {
		self.ciphers == other.ciphers &&
			self.nonces == other.nonces &&
			self.routing[..] == other.routing[..]
	}
}

impl Eq for ReplyHeader {}
