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

use super::{onions, Layer, Onion};
use crate::core::{
	crypto::{hash, recover, PrvKey},
	registry::Codec,
	Error, Hash, Id, PubBytes, SigBytes, Splice, ADDRESS_SIZE, ID_SIZE, PUB_SIZE, SIG_SIZE,
	TIMESTAMP_SIZE,
};
use std::{
	net::{Ipv4Addr, SocketAddr},
	time::{Duration, SystemTime, UNIX_EPOCH},
};

const SIGNED_LEN: usize = ID_SIZE + PUB_SIZE + ADDRESS_SIZE + 4 + 2 + TIMESTAMP_SIZE;

/// Signed advertisement of a hidden service and the node introducing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Intro {
	pub id: Id,
	/// Hidden service key, also the signing key.
	pub key: PubBytes,
	/// Node hosting the service.
	pub address: SocketAddr,
	/// Relay rate of the hosting node, in millisatoshi per MiB.
	pub rate: u32,
	pub port: u16,
	pub expiry: SystemTime,
	pub sig: SigBytes,
}

impl Intro {
	/// The expiry is truncated to whole seconds, the resolution it is signed and sent with.
	pub fn new(
		id: Id,
		key: &PrvKey,
		address: SocketAddr,
		rate: u32,
		port: u16,
		expiry: SystemTime,
	) -> Result<Self, Error> {
		let mut intro = Self {
			id,
			key: key.public().to_bytes(),
			address,
			rate,
			port,
			expiry: whole_seconds(expiry),
			sig: [0; SIG_SIZE],
		};
		intro.sig = key.sign(&intro.signing_hash()?)?;
		Ok(intro)
	}

	fn signing_hash(&self) -> Result<Hash, Error> {
		let mut s = Splice::new(SIGNED_LEN);
		self.encode_signed(&mut s)?;
		Ok(hash(s.as_slice()))
	}

	fn encode_signed(&self, s: &mut Splice) -> Result<(), Error> {
		s.put_id(&self.id)?;
		s.put_pub_bytes(&self.key)?;
		s.put_address(&self.address)?;
		s.put_u32(self.rate)?;
		s.put_u16(self.port)?;
		s.put_time(self.expiry)
	}

	/// Read an intro encoded as a complete onion, as carried in the answer to an intro query.
	pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
		match onions().read(&mut Splice::load(bytes))? {
			Onion::Intro(intro) => Ok(intro),
			other => Err(Error::UnexpectedMagic { expected: super::magic::INTRO, found: other.magic() }),
		}
	}

	pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
		Onion::Intro(self.clone()).to_bytes()
	}

	/// Fails if the signature does not belong to the advertised key or the intro has expired.
	pub fn validate(&self, now: SystemTime) -> Result<(), Error> {
		if recover(&self.sig, &self.signing_hash()?)?.to_bytes() != self.key {
			return Err(Error::InvalidSignature)
		}
		if self.expiry <= now {
			return Err(Error::Expired)
		}
		Ok(())
	}
}

fn whole_seconds(time: SystemTime) -> SystemTime {
	UNIX_EPOCH + Duration::from_secs(time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs())
}

impl Default for Intro {
	fn default() -> Self {
		Self {
			id: Id::default(),
			key: [0; PUB_SIZE],
			address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
			rate: 0,
			port: 0,
			expiry: UNIX_EPOCH,
			sig: [0; SIG_SIZE],
		}
	}
}

impl Layer for Intro {
	fn len(&self) -> usize {
		SIGNED_LEN + SIG_SIZE
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		self.encode_signed(s)?;
		s.put_sig(&self.sig)
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		s.require(self.len())?;
		self.id = s.read_id()?;
		self.key = s.read_pub_bytes()?;
		self.address = s.read_address()?;
		self.rate = s.read_u32()?;
		self.port = s.read_u16()?;
		self.expiry = s.read_time()?;
		self.sig = s.read_sig()?;
		Ok(())
	}
}
