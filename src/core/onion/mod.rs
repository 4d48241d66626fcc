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

//! The onion variant set.
//!
//! An onion is a linear chain of layers. Each layer is a 4-byte magic followed by its own fields
//! and, for the wrapping variants, the next layer. Decoding never recurses: a decoded layer leaves
//! the cursor at the start of whatever it wraps, which may still be encrypted, and handling
//! decides how to go on from there.

mod crypt;
mod hop;
mod intro;
mod query;
mod rendezvous;
mod reply;
mod response;
mod session;

pub use self::{
	crypt::Crypt,
	hop::Hop,
	intro::Intro,
	query::{Exit, GetBalance, IntroQuery},
	rendezvous::{Message, Ready, Route},
	reply::{ReplyHeader, RoutingHeader},
	response::{Balance, Confirmation, Response},
	session::{Delay, End, Session},
};
use super::{
	cloak::CLOAK_SIZE,
	registry::{Codec, Registry},
	sessions::{Billable, SessionManager},
	Error, Magic, Splice, ADDRESS_SIZE, HASH_SIZE, IV_SIZE, MAGIC_SIZE, PUB_SIZE, REPLY_HOPS,
};
use std::sync::OnceLock;

pub mod magic {
	use crate::core::Magic;

	pub const CRYPT: Magic = *b"cryp";
	pub const FORWARD: Magic = *b"forw";
	pub const REVERSE: Magic = *b"rvrs";
	pub const EXIT: Magic = *b"exit";
	pub const GET_BALANCE: Magic = *b"getb";
	pub const BALANCE: Magic = *b"bala";
	pub const INTRO_QUERY: Magic = *b"intq";
	pub const INTRO: Magic = *b"intr";
	pub const ROUTE: Magic = *b"rout";
	pub const READY: Magic = *b"redy";
	pub const SESSION: Magic = *b"sess";
	pub const CONFIRMATION: Magic = *b"conf";
	pub const MESSAGE: Magic = *b"mesg";
	pub const RESPONSE: Magic = *b"resp";
	pub const DELAY: Magic = *b"dely";
	pub const END: Magic = *b"end!";
}

/// Encoded length of a Crypt header: magic, IV, cloaked key and sender public key.
pub const CRYPT_LEN: usize = MAGIC_SIZE + IV_SIZE + CLOAK_SIZE + PUB_SIZE;
/// Encoded length of a Forward or Reverse header.
pub const HOP_LEN: usize = MAGIC_SIZE + ADDRESS_SIZE;
/// One return hop in a routing header: a Reverse followed by its Crypt.
pub const REVERSE_CRYPT_LEN: usize = HOP_LEN + CRYPT_LEN;
/// A full routing header, one Reverse/Crypt pair per return hop.
pub const ROUTING_HEADER_LEN: usize = REPLY_HOPS * REVERSE_CRYPT_LEN;
/// Ciphers, nonces and routing header needed to send a reply.
pub const REPLY_HEADER_LEN: usize = REPLY_HOPS * (HASH_SIZE + IV_SIZE) + ROUTING_HEADER_LEN;

/// Body of one layer: everything after its magic.
pub trait Layer {
	/// Encoded length of the body, including any wrapped layers.
	fn len(&self) -> usize;
	fn encode(&self, s: &mut Splice) -> Result<(), Error>;
	/// Read this layer's own fields. Wrapped layers are left in the buffer.
	fn decode(&mut self, s: &mut Splice) -> Result<(), Error>;
}

/// What the message loop should do after a layer was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handled {
	/// Recognise and handle the layer at the cursor.
	Next,
	/// The message has been consumed, relayed or handed off.
	Done,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Onion {
	Crypt(Crypt),
	Forward(Hop),
	Reverse(Hop),
	Exit(Exit),
	GetBalance(GetBalance),
	Balance(Balance),
	IntroQuery(IntroQuery),
	Intro(Intro),
	Route(Route),
	Ready(Ready),
	Session(Session),
	Confirmation(Confirmation),
	Message(Message),
	Response(Response),
	Delay(Delay),
	End(End),
}

impl Onion {
	pub fn name(&self) -> &'static str {
		match self {
			Onion::Crypt(_) => "Crypt",
			Onion::Forward(_) => "Forward",
			Onion::Reverse(_) => "Reverse",
			Onion::Exit(_) => "Exit",
			Onion::GetBalance(_) => "GetBalance",
			Onion::Balance(_) => "Balance",
			Onion::IntroQuery(_) => "IntroQuery",
			Onion::Intro(_) => "Intro",
			Onion::Route(_) => "Route",
			Onion::Ready(_) => "Ready",
			Onion::Session(_) => "Session",
			Onion::Confirmation(_) => "Confirmation",
			Onion::Message(_) => "Message",
			Onion::Response(_) => "Response",
			Onion::Delay(_) => "Delay",
			Onion::End(_) => "End",
		}
	}

	fn layer(&self) -> &dyn Layer {
		match self {
			Onion::Crypt(l) => l,
			Onion::Forward(l) | Onion::Reverse(l) => l,
			Onion::Exit(l) => l,
			Onion::GetBalance(l) => l,
			Onion::Balance(l) => l,
			Onion::IntroQuery(l) => l,
			Onion::Intro(l) => l,
			Onion::Route(l) => l,
			Onion::Ready(l) => l,
			Onion::Session(l) => l,
			Onion::Confirmation(l) => l,
			Onion::Message(l) => l,
			Onion::Response(l) => l,
			Onion::Delay(l) => l,
			Onion::End(l) => l,
		}
	}

	fn layer_mut(&mut self) -> &mut dyn Layer {
		match self {
			Onion::Crypt(l) => l,
			Onion::Forward(l) | Onion::Reverse(l) => l,
			Onion::Exit(l) => l,
			Onion::GetBalance(l) => l,
			Onion::Balance(l) => l,
			Onion::IntroQuery(l) => l,
			Onion::Intro(l) => l,
			Onion::Route(l) => l,
			Onion::Ready(l) => l,
			Onion::Session(l) => l,
			Onion::Confirmation(l) => l,
			Onion::Message(l) => l,
			Onion::Response(l) => l,
			Onion::Delay(l) => l,
			Onion::End(l) => l,
		}
	}

	/// The layer wrapped by this one, `None` for terminal variants.
	pub fn inner(&self) -> Option<&Onion> {
		match self {
			Onion::Crypt(c) => Some(&c.onion),
			Onion::Forward(h) | Onion::Reverse(h) => Some(&h.onion),
			Onion::Session(s) => Some(&s.onion),
			Onion::Delay(d) => Some(&d.onion),
			_ => None,
		}
	}

	fn inner_mut(&mut self) -> Option<&mut Box<Onion>> {
		match self {
			Onion::Crypt(c) => Some(&mut c.onion),
			Onion::Forward(h) | Onion::Reverse(h) => Some(&mut h.onion),
			Onion::Session(s) => Some(&mut s.onion),
			Onion::Delay(d) => Some(&mut d.onion),
			_ => None,
		}
	}

	pub fn is_terminal(&self) -> bool {
		self.inner().is_none()
	}

	/// Place `inner` inside this layer.
	pub fn wrap(mut self, inner: Onion) -> Result<Onion, Error> {
		match self.inner_mut() {
			Some(slot) => {
				*slot = Box::new(inner);
				Ok(self)
			},
			None => Err(Error::Terminal(self.name())),
		}
	}

	/// Collect what sending a message of `size` bytes through this chain costs, per session of
	/// ours that it passes through.
	pub fn account(
		&self,
		size: usize,
		sessions: &SessionManager,
		billable: &mut Vec<Billable>,
	) -> Result<(), Error> {
		match self {
			Onion::Crypt(c) =>
				if let Some(id) = &c.session {
					billable.push(sessions.bill(id, size)?);
				},
			Onion::Exit(Exit { reply, .. }) |
			Onion::GetBalance(GetBalance { reply, .. }) |
			Onion::IntroQuery(IntroQuery { reply, .. }) |
			Onion::Route(Route { reply, .. }) |
			Onion::Message(Message { forwards: reply, .. }) => reply.account(size, sessions, billable)?,
			_ => (),
		}
		match self.inner() {
			Some(inner) => inner.account(size, sessions, billable),
			None => Ok(()),
		}
	}
}

impl Codec for Onion {
	fn magic(&self) -> Magic {
		match self {
			Onion::Crypt(_) => magic::CRYPT,
			Onion::Forward(_) => magic::FORWARD,
			Onion::Reverse(_) => magic::REVERSE,
			Onion::Exit(_) => magic::EXIT,
			Onion::GetBalance(_) => magic::GET_BALANCE,
			Onion::Balance(_) => magic::BALANCE,
			Onion::IntroQuery(_) => magic::INTRO_QUERY,
			Onion::Intro(_) => magic::INTRO,
			Onion::Route(_) => magic::ROUTE,
			Onion::Ready(_) => magic::READY,
			Onion::Session(_) => magic::SESSION,
			Onion::Confirmation(_) => magic::CONFIRMATION,
			Onion::Message(_) => magic::MESSAGE,
			Onion::Response(_) => magic::RESPONSE,
			Onion::Delay(_) => magic::DELAY,
			Onion::End(_) => magic::END,
		}
	}

	fn len(&self) -> usize {
		MAGIC_SIZE + self.layer().len()
	}

	fn encode(&self, s: &mut Splice) -> Result<(), Error> {
		let start = s.pos();
		s.put_magic(&self.magic())?;
		self.layer().encode(s)?;
		debug_assert_eq!(s.pos() - start, self.len(), "{} wrote a wrong length", self.name());
		Ok(())
	}

	fn decode(&mut self, s: &mut Splice) -> Result<(), Error> {
		self.layer_mut().decode(s)
	}
}

/// Every onion variant, keyed by magic.
pub fn onions() -> &'static Registry<Onion> {
	static ONIONS: OnceLock<Registry<Onion>> = OnceLock::new();
	ONIONS.get_or_init(|| {
		let mut registry = Registry::new();
		registry
			.register(magic::CRYPT, || Onion::Crypt(Crypt::default()))
			.register(magic::FORWARD, || Onion::Forward(Hop::default()))
			.register(magic::REVERSE, || Onion::Reverse(Hop::default()))
			.register(magic::EXIT, || Onion::Exit(Exit::default()))
			.register(magic::GET_BALANCE, || Onion::GetBalance(GetBalance::default()))
			.register(magic::BALANCE, || Onion::Balance(Balance::default()))
			.register(magic::INTRO_QUERY, || Onion::IntroQuery(IntroQuery::default()))
			.register(magic::INTRO, || Onion::Intro(Intro::default()))
			.register(magic::ROUTE, || Onion::Route(Route::default()))
			.register(magic::READY, || Onion::Ready(Ready::default()))
			.register(magic::SESSION, || Onion::Session(Session::default()))
			.register(magic::CONFIRMATION, || Onion::Confirmation(Confirmation::default()))
			.register(magic::MESSAGE, || Onion::Message(Message::default()))
			.register(magic::RESPONSE, || Onion::Response(Response::default()))
			.register(magic::DELAY, || Onion::Delay(Delay::default()))
			.register(magic::END, || Onion::End(End));
		registry
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::{
		crypto::KeySet,
		sessions::{Node, SessionData},
		Id,
	};
	use itertools::Itertools;
	use std::{net::SocketAddr, time::Duration};

	/// Decode a plaintext chain back into a nested value.
	fn decode_chain(s: &mut Splice) -> Result<Onion, Error> {
		let mut onion = onions().read(s)?;
		if let Some(slot) = onion.inner_mut() {
			**slot = decode_chain(s)?;
		}
		Ok(onion)
	}

	fn address(port: u16) -> SocketAddr {
		SocketAddr::from(([10, 0, 0, 1], port))
	}

	fn reply_header(keys: &mut KeySet) -> ReplyHeader {
		let mut routing = [0; ROUTING_HEADER_LEN];
		routing.iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
		ReplyHeader::new([[1; HASH_SIZE], [2; HASH_SIZE], [3; HASH_SIZE]], [keys.iv(); 3], routing)
	}

	fn terminals(keys: &mut KeySet) -> Vec<Onion> {
		let id: Id = keys.id();
		vec![
			Onion::Confirmation(Confirmation { id, load: 200 }),
			Onion::Response(Response { id, port: 443, load: 0, bytes: Vec::new() }),
			Onion::Response(Response { id, port: u16::MAX, load: 1, bytes: vec![7; 1500] }),
			Onion::Balance(Balance { id, msat: u64::MAX }),
			Onion::Exit(Exit {
				id,
				port: 80,
				bytes: b"GET /".to_vec(),
				reply: reply_header(keys),
			}),
			Onion::GetBalance(GetBalance { id, session: keys.id(), reply: reply_header(keys) }),
			Onion::IntroQuery(IntroQuery {
				id,
				key: keys.key().public().to_bytes(),
				reply: reply_header(keys),
			}),
			Onion::Ready(Ready {
				id,
				address: keys.key().public().to_bytes(),
				forwards: reply_header(keys),
			}),
			Onion::Message(Message {
				address: keys.key().public().to_bytes(),
				id,
				re: keys.id(),
				forwards: reply_header(keys),
				payload: vec![0xaa; 64],
			}),
			Onion::End(End),
		]
	}

	#[test]
	fn terminal_roundtrip() {
		let mut keys = KeySet::from_seed(11);
		for onion in terminals(&mut keys) {
			let bytes = onion.to_bytes().unwrap();
			assert_eq!(bytes.len(), onion.len());
			let mut s = Splice::load(bytes);
			let decoded = onions().read(&mut s).unwrap();
			assert_eq!(decoded.magic(), onion.magic());
			assert_eq!(decoded, onion, "{} differs after decoding", onion.name());
			assert_eq!(s.remaining(), 0);
		}
	}

	#[test]
	fn plaintext_chain_decodes_in_order() {
		let mut keys = KeySet::from_seed(12);
		let id = keys.id();
		let session = Session::new(2, keys.key(), keys.key());
		let chain = vec![
			Onion::Forward(Hop::new(address(1))),
			Onion::Delay(Delay::new(Duration::from_millis(1500))),
			Onion::Session(session),
			Onion::Reverse(Hop::new("[2001:db8::1]:65535".parse().unwrap())),
			Onion::Confirmation(Confirmation { id, load: 3 }),
		];
		let onion = chain
			.iter()
			.cloned()
			.rev()
			.reduce(|inner, outer| outer.wrap(inner).unwrap())
			.unwrap();
		let bytes = onion.to_bytes().unwrap();

		let mut s = Splice::load(bytes.clone());
		let mut names = Vec::new();
		while s.remaining() > 0 {
			let layer = onions().read(&mut s).unwrap();
			names.push(layer.name());
		}
		assert_eq!(names, chain.iter().map(Onion::name).collect_vec());

		let mut s = Splice::load(bytes);
		assert_eq!(decode_chain(&mut s).unwrap(), onion);
		assert_eq!(s.remaining(), 0);
	}

	#[test]
	fn end_terminates_wrapping_layers() {
		let onion = Onion::Forward(Hop::new(address(2))).wrap(Onion::End(End)).unwrap();
		let mut s = Splice::load(onion.to_bytes().unwrap());
		let decoded = decode_chain(&mut s).unwrap();
		assert_eq!(decoded.inner(), Some(&Onion::End(End)));
		assert_eq!(s.remaining(), 0);
	}

	#[test]
	fn terminals_refuse_to_wrap() {
		let onion = Onion::Balance(Balance::default());
		assert_eq!(onion.wrap(Onion::End(End)), Err(Error::Terminal("Balance")));
	}

	#[test]
	fn registry_recognizes_every_variant() {
		let mut keys = KeySet::from_seed(13);
		let mut all = terminals(&mut keys);
		all.push(Onion::Forward(Hop::new(address(3))));
		all.push(Onion::Crypt(Crypt::default()));
		for onion in all {
			let mut s = Splice::load(onion.to_bytes().unwrap());
			assert_eq!(onions().recognize(&mut s).unwrap().magic(), onion.magic());
		}
		let mut s = Splice::load(b"nope and some more bytes".to_vec());
		assert!(onions().recognize(&mut s).is_none());
	}

	#[test]
	fn truncated_input_is_an_error() {
		let mut keys = KeySet::from_seed(14);
		for onion in terminals(&mut keys).into_iter().filter(|o| !matches!(o, Onion::End(_))) {
			let mut bytes = onion.to_bytes().unwrap();
			bytes.pop();
			let mut s = Splice::load(bytes);
			assert!(
				matches!(onions().read(&mut s), Err(Error::TooShort { .. })),
				"{} decoded from short input",
				onion.name()
			);
		}
	}

	#[test]
	fn account_bills_our_sessions() {
		let mut keys = KeySet::from_seed(15);
		let node = Node { address: address(4), identity: keys.key().public(), relay_rate: 1 << 20 };
		let session = SessionData::new(node, 0, keys.key(), keys.key(), 1_000, true);
		let id = session.id;
		let mut sessions = SessionManager::default();
		sessions.add_session(session);

		let crypt = Crypt::new(keys.key().public(), None, keys.key(), keys.iv(), 0).with_session(id);
		let onion = Onion::Forward(Hop::new(address(4)))
			.wrap(Onion::Crypt(crypt).wrap(Onion::Confirmation(Confirmation::default())).unwrap())
			.unwrap();
		let mut billable = Vec::new();
		onion.account(100, &sessions, &mut billable).unwrap();
		assert_eq!(billable, vec![Billable { session: id, cost: 100 }]);
	}
}
