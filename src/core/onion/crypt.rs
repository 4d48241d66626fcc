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

use super::{End, Layer, Onion, CRYPT_LEN, REVERSE_CRYPT_LEN};
use crate::core::{
	cloak::{self, Cloak},
	crypto::{encipher, PrvKey, PubKey},
	registry::Codec,
	Error, Id, Iv, Splice, MAGIC_SIZE,
};

/// Per-hop encryption of everything that follows.
///
/// The recipient is addressed by a cloak of its header key. Outside a routing header (`depth`
/// zero) the whole remainder is encrypted under the header cipher. Inside a routing header the
/// layer at `depth` encrypts the `depth - 1` pairs after it under the header cipher, and what comes
/// after the routing header under the payload cipher when a payload key is given.
#[derive(Clone, Debug, PartialEq)]
pub struct Crypt {
	pub depth: u8,
	pub to_header: Option<PubKey>,
	pub to_payload: Option<PubKey>,
	/// Ephemeral sender key.
	pub from: Option<PrvKey>,
	pub iv: Iv,
	/// Read from the wire.
	pub cloak: Cloak,
	/// Read from the wire.
	pub sender: Option<PubKey>,
	/// The session this layer is addressed to: ours when building, the relay's when handled.
	pub session: Option<Id>,
	pub onion: Box<Onion>,
}

impl Crypt {
	pub fn new(
		to_header: PubKey,
		to_payload: Option<PubKey>,
		from: PrvKey,
		iv: Iv,
		depth: u8,
	) -> Self {
		Self {
			depth,
			to_header: Some(to_header),
			to_payload,
			from: Some(from),
			iv,
			..Default::default()
		}
	}

	pub fn with_session(mut self, id: Id) -> Self {
		self.session = Some(id);
		self
	}

	/// Decrypt everything after the cursor with the cipher shared between `key` and the sender.
	pub fn open(&self, s: &mut Splice, key: &PrvKey) -> Result<(), Error> {
		let sender = self.sender.as_ref().ok_or(Error::InvalidPublicKey)?;
		let pos = s.pos();
		encipher(&key.cipher(sender), &self.iv, &mut s.as_mut_slice()[pos..]);
		Ok(())
	}
}

impl Default for Crypt {
	fn default() -> Self {
		Self {
			depth: 0,
			to_header: None,
			to_payload: None,
			from: None,
			iv: Iv::default(),
			cloak: Cloak::default(),
			sender: None,
			session: None,
			onion: Box::new(Onion::End(End)),
		}
	}
}

impl Layer for Crypt {
	fn len(&self) -> usize {
		CRYPT_LEN - MAGIC_SIZE + self.onion.len()
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		let (Some(to), Some(from)) = (&self.to_header, &self.from) else {
			// Unused hop slot.
			s.put_noise(CRYPT_LEN - MAGIC_SIZE)?;
			return self.onion.encode(s)
		};
		s.put_iv(&self.iv)?;
		s.put_cloak(&cloak::cloak(&to.to_bytes(), &mut rand::thread_rng()))?;
		s.put_pub(&from.public())?;
		let start = s.pos();
		self.onion.encode(s)?;
		let end = s.pos();
		let body = &mut s.as_mut_slice()[start..end];
		if self.depth == 0 {
			encipher(&from.cipher(to), &self.iv, body);
			return Ok(())
		}
		let header = (usize::from(self.depth) - 1) * REVERSE_CRYPT_LEN;
		let (header, payload) = body.split_at_mut(header.min(body.len()));
		encipher(&from.cipher(to), &self.iv, header);
		if let Some(to_payload) = &self.to_payload {
			encipher(&from.cipher(to_payload), &self.iv, payload);
		}
		Ok(())
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(CRYPT_LEN - MAGIC_SIZE)?;
		self.iv = s.read_iv()?;
		self.cloak = s.read_cloak()?;
		self.sender = Some(s.read_pub()?);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::{
		crypto::KeySet,
		onion::{onions, Confirmation, Response},
	};

	#[test]
	fn recipient_opens_layer() {
		let mut keys = KeySet::from_seed(31);
		let recipient = keys.key();
		let id = keys.id();
		let crypt = Crypt::new(recipient.public(), None, keys.key(), keys.iv(), 0);
		let onion = Onion::Crypt(crypt)
			.wrap(Onion::Confirmation(Confirmation { id, load: 9 }))
			.unwrap();
		let mut s = Splice::load(onion.to_bytes().unwrap());

		let Onion::Crypt(decoded) = onions().read(&mut s).unwrap() else { panic!("not a crypt") };
		assert!(cloak::matches(&decoded.cloak, &recipient.public().to_bytes()));
		// Still encrypted.
		assert!(onions().recognize(&mut s.clone()).is_none());

		decoded.open(&mut s, &recipient).unwrap();
		assert_eq!(onions().read(&mut s).unwrap(), Onion::Confirmation(Confirmation { id, load: 9 }));
	}

	#[test]
	fn nested_layers_peel_in_order() {
		let mut keys = KeySet::from_seed(32);
		let (first, second) = (keys.key(), keys.key());
		let inner = Onion::Crypt(Crypt::new(second.public(), None, keys.key(), keys.iv(), 0))
			.wrap(Onion::End(End))
			.unwrap();
		let onion = Onion::Crypt(Crypt::new(first.public(), None, keys.key(), keys.iv(), 0))
			.wrap(inner)
			.unwrap();
		let mut s = Splice::load(onion.to_bytes().unwrap());

		for key in [&first, &second] {
			let Onion::Crypt(layer) = onions().read(&mut s).unwrap() else { panic!("not a crypt") };
			assert!(cloak::matches(&layer.cloak, &key.public().to_bytes()));
			layer.open(&mut s, key).unwrap();
		}
		assert_eq!(onions().read(&mut s).unwrap(), Onion::End(End));
		assert_eq!(s.remaining(), 0);
	}

	#[test]
	fn routing_depth_splits_header_and_payload_ciphers() {
		let mut keys = KeySet::from_seed(33);
		let (header, payload) = (keys.key(), keys.key());
		let response = Onion::Response(Response {
			id: keys.id(),
			port: 0,
			load: 0,
			bytes: vec![3; 2 * REVERSE_CRYPT_LEN],
		});
		let mut crypt = Crypt::new(header.public(), Some(payload.public()), keys.key(), keys.iv(), 2);
		crypt.onion = Box::new(response.clone());
		let mut s = Splice::load(Onion::Crypt(crypt).to_bytes().unwrap());
		let Onion::Crypt(layer) = onions().read(&mut s).unwrap() else { panic!("not a crypt") };

		let sender = layer.sender.unwrap();
		let start = s.pos();
		let buf = s.as_mut_slice();
		let (head, tail) = buf[start..].split_at_mut(REVERSE_CRYPT_LEN);
		encipher(&header.cipher(&sender), &layer.iv, head);
		encipher(&payload.cipher(&sender), &layer.iv, tail);
		assert_eq!(s.as_slice()[start..], response.to_bytes().unwrap()[..]);
	}

	#[test]
	fn placeholder_without_keys() {
		let crypt = Crypt::default();
		let onion = Onion::Crypt(crypt).wrap(Onion::End(End)).unwrap();
		let bytes = onion.to_bytes().unwrap();
		assert_eq!(bytes.len(), CRYPT_LEN + MAGIC_SIZE);
		assert_eq!(bytes[CRYPT_LEN..], *b"end!");
	}
}
