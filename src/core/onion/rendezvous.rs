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

//! Hidden service rendezvous.
//!
//! A client reaches a hidden service with a [`Route`] addressed to the service key. The service
//! answers with [`Ready`], carrying a reply header for a return path it built for the occasion,
//! and the two sides then trade [`Message`]s, each carrying a fresh reply header for the answer.

use super::{Layer, ReplyHeader, REPLY_HEADER_LEN};
use crate::core::{
	cloak::{self, Cloak, CLOAK_SIZE},
	crypto::{encipher, PrvKey, PubKey},
	Error, Id, Iv, PubBytes, Splice, ID_SIZE, IV_SIZE, PUB_SIZE,
};

const ROUTE_CLEAR_LEN: usize = CLOAK_SIZE + PUB_SIZE + IV_SIZE;
const ROUTE_SEALED_LEN: usize = ID_SIZE + REPLY_HEADER_LEN;

/// Request to a hidden service. The id and reply header are encrypted to the service key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
	/// Hidden service key.
	pub to: Option<PubKey>,
	/// Ephemeral sender key.
	pub from: Option<PrvKey>,
	pub iv: Iv,
	/// Read from the wire.
	pub cloak: Cloak,
	/// Read from the wire.
	pub sender: Option<PubKey>,
	pub id: Id,
	pub reply: ReplyHeader,
}

impl Route {
	pub fn new(to: PubKey, from: PrvKey, iv: Iv, id: Id, reply: ReplyHeader) -> Self {
		Self { to: Some(to), from: Some(from), iv, id, reply, ..Default::default() }
	}

	/// Decrypt and read the sealed part with the hidden service key.
	pub fn open(&mut self, s: &mut Splice, key: &PrvKey) -> Result<(), Error> {
		s.require(ROUTE_SEALED_LEN)?;
		let sender = self.sender.as_ref().ok_or(Error::InvalidPublicKey)?;
		let pos = s.pos();
		encipher(
			&key.cipher(sender),
			&self.iv,
			&mut s.as_mut_slice()[pos..pos + ROUTE_SEALED_LEN],
		);
		self.id = s.read_id()?;
		self.reply = ReplyHeader::decode(s)?;
		Ok(())
	}
}

impl Layer for Route {
	fn len(&self) -> usize {
		ROUTE_CLEAR_LEN + ROUTE_SEALED_LEN
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		let (Some(to), Some(from)) = (&self.to, &self.from) else {
			return Err(Error::InvalidPublicKey)
		};
		s.put_cloak(&cloak::cloak(&to.to_bytes(), &mut rand::thread_rng()))?;
		s.put_pub(&from.public())?;
		s.put_iv(&self.iv)?;
		let start = s.pos();
		s.put_id(&self.id)?;
		self.reply.encode(s)?;
		let end = s.pos();
		encipher(&from.cipher(to), &self.iv, &mut s.as_mut_slice()[start..end]);
		Ok(())
	}

	/// Reads the clear part only; see [`Route::open`].
	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(self.len())?;
		self.cloak = s.read_cloak()?;
		self.sender = Some(s.read_pub()?);
		self.iv = s.read_iv()?;
		Ok(())
	}
}

/// A hidden service accepting a route, with the header that reaches it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ready {
	pub id: Id,
	/// Hidden service key.
	pub address: PubBytes,
	pub forwards: ReplyHeader,
}

impl Default for Ready {
	fn default() -> Self {
		Self { id: Id::default(), address: [0; PUB_SIZE], forwards: ReplyHeader::default() }
	}
}

impl Layer for Ready {
	fn len(&self) -> usize {
		ID_SIZE + PUB_SIZE + REPLY_HEADER_LEN
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		s.put_id(&self.id)?;
		s.put_pub_bytes(&self.address)?;
		self.forwards.encode(s)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(self.len())?;
		self.id = s.read_id()?;
		self.address = s.read_pub_bytes()?;
		self.forwards = ReplyHeader::decode(s)?;
		Ok(())
	}
}

/// Payload exchanged with a hidden service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
	/// Hidden service key.
	pub address: PubBytes,
	pub id: Id,
	/// The message this one answers, [`NO_ID`](crate::core::NO_ID) for a request.
	pub re: Id,
	/// Header for the answer to this message.
	pub forwards: ReplyHeader,
	pub payload: Vec<u8>,
}

impl Default for Message {
	fn default() -> Self {
		Self {
			address: [0; PUB_SIZE],
			id: Id::default(),
			re: Id::default(),
			forwards: ReplyHeader::default(),
			payload: Vec::new(),
		}
	}
}

impl Layer for Message {
	fn len(&self) -> usize {
		PUB_SIZE + 2 * ID_SIZE + REPLY_HEADER_LEN + 4 + self.payload.len()
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		s.put_pub_bytes(&self.address)?;
		s.put_id(&self.id)?;
		s.put_id(&self.re)?;
		self.forwards.encode(s)?;
		s.put_bytes(&self.payload)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(PUB_SIZE + 2 * ID_SIZE + REPLY_HEADER_LEN + 4)?;
		self.address = s.read_pub_bytes()?;
		self.id = s.read_id()?;
		self.re = s.read_id()?;
		self.forwards = ReplyHeader::decode(s)?;
		self.payload = s.read_bytes()?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::{
		crypto::KeySet,
		onion::{onions, Onion, ROUTING_HEADER_LEN},
		registry::Codec,
	};

	#[test]
	fn route_opens_with_service_key() {
		let mut keys = KeySet::from_seed(41);
		let service = keys.key();
		let id = keys.id();
		let reply = ReplyHeader::new([[4; 32]; 3], [keys.iv(); 3], [6; ROUTING_HEADER_LEN]);
		let route = Route::new(service.public(), keys.key(), keys.iv(), id, reply.clone());
		let mut s = Splice::load(Onion::Route(route).to_bytes().unwrap());

		let Onion::Route(mut decoded) = onions().read(&mut s).unwrap() else {
			panic!("not a route")
		};
		assert!(cloak::matches(&decoded.cloak, &service.public().to_bytes()));
		assert_ne!(decoded.id, id);

		let mut wrong = decoded.clone();
		wrong.open(&mut s.clone(), &keys.key()).unwrap();
		assert_ne!(wrong.id, id);

		decoded.open(&mut s, &service).unwrap();
		assert_eq!(decoded.id, id);
		assert_eq!(decoded.reply, reply);
		assert_eq!(s.remaining(), 0);
	}

	#[test]
	fn route_needs_keys() {
		let route = Onion::Route(Route::default());
		assert_eq!(route.to_bytes(), Err(Error::InvalidPublicKey));
	}
}
