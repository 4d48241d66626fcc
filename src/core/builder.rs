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

//! Onion construction.
//!
//! [`Skins`] collects layers outermost first and folds them into one nested [`Onion`] from the
//! innermost end. The free functions below are the circuits the engine sends.

use super::{
	crypto::{KeySet, PubKey},
	onion::{
		Balance, Confirmation, Crypt, Delay, End, Exit, GetBalance, Hop, Intro, IntroQuery,
		Message, Onion, Ready, ReplyHeader, Response, Route, Session, ROUTING_HEADER_LEN,
	},
	registry::Codec,
	sessions::{Circuit, HopKeys, Node},
	Ciphers, Error, Id, Nonces, PubBytes, REPLY_HOPS,
};
use arrayref::array_ref;
use std::{net::SocketAddr, time::Duration};

/// Hops of a circuit that carry a request before it is answered.
const REQUEST_HOPS: usize = 3;

/// Layers of an onion, outermost first.
#[derive(Default)]
pub struct Skins(Vec<Onion>);

impl Skins {
	pub fn new() -> Self {
		Self(Vec::new())
	}

	pub fn push(mut self, onion: Onion) -> Self {
		self.0.push(onion);
		self
	}

	pub fn forward(self, address: SocketAddr) -> Self {
		self.push(Onion::Forward(Hop::new(address)))
	}

	pub fn reverse(self, address: SocketAddr) -> Self {
		self.push(Onion::Reverse(Hop::new(address)))
	}

	pub fn crypt(self, crypt: Crypt) -> Self {
		self.push(Onion::Crypt(crypt))
	}

	/// Forward to the node of `hop`, encrypted to its session there.
	pub fn forward_crypt(self, hop: &HopKeys, keys: &mut KeySet) -> Self {
		let crypt = Crypt::new(hop.header, None, keys.key(), keys.iv(), 0).with_session(hop.id);
		self.forward(hop.address).crypt(crypt)
	}

	/// Forward to `node`, encrypted to its identity key. Only a [`Session`] may follow.
	pub fn forward_identity(self, node: &Node, keys: &mut KeySet) -> Self {
		let crypt = Crypt::new(node.identity, None, keys.key(), keys.iv(), 0);
		self.forward(node.address).crypt(crypt)
	}

	pub fn session(self, session: Session) -> Self {
		self.push(Onion::Session(session))
	}

	pub fn delay(self, duration: Duration) -> Self {
		self.push(Onion::Delay(Delay::new(duration)))
	}

	pub fn confirmation(self, id: Id, load: u8) -> Self {
		self.push(Onion::Confirmation(Confirmation { id, load }))
	}

	pub fn response(self, id: Id, port: u16, load: u8, bytes: Vec<u8>) -> Self {
		self.push(Onion::Response(Response { id, port, load, bytes }))
	}

	pub fn balance(self, id: Id, msat: u64) -> Self {
		self.push(Onion::Balance(Balance { id, msat }))
	}

	pub fn exit(self, id: Id, port: u16, bytes: Vec<u8>, reply: ReplyHeader) -> Self {
		self.push(Onion::Exit(Exit { id, port, bytes, reply }))
	}

	pub fn get_balance(self, id: Id, session: Id, reply: ReplyHeader) -> Self {
		self.push(Onion::GetBalance(GetBalance { id, session, reply }))
	}

	pub fn intro_query(self, id: Id, key: PubBytes, reply: ReplyHeader) -> Self {
		self.push(Onion::IntroQuery(IntroQuery { id, key, reply }))
	}

	pub fn intro(self, intro: Intro) -> Self {
		self.push(Onion::Intro(intro))
	}

	pub fn route(self, route: Route) -> Self {
		self.push(Onion::Route(route))
	}

	pub fn ready(self, id: Id, address: PubBytes, forwards: ReplyHeader) -> Self {
		self.push(Onion::Ready(Ready { id, address, forwards }))
	}

	pub fn message(self, message: Message) -> Self {
		self.push(Onion::Message(message))
	}

	/// Nest the layers. A chain that does not end in a terminal variant is closed with [`End`].
	pub fn assemble(mut self) -> Result<Onion, Error> {
		let innermost = match self.0.pop() {
			None => return Ok(Onion::End(End)),
			Some(last) if last.is_terminal() => last,
			Some(last) => last.wrap(Onion::End(End))?,
		};
		self.0.into_iter().rev().try_fold(innermost, |inner, outer| outer.wrap(inner))
	}
}

/// Three Reverse/Crypt pairs through `hops`, and the ciphers to encrypt a reply for them.
pub fn reply_header(hops: &[HopKeys; REPLY_HOPS], keys: &mut KeySet) -> Result<ReplyHeader, Error> {
	let mut ciphers = Ciphers::default();
	let mut nonces = Nonces::default();
	let mut sessions = [None; REPLY_HOPS];
	let mut skins = Skins::new();
	for (i, hop) in hops.iter().enumerate() {
		let (from, iv) = (keys.key(), keys.iv());
		ciphers[i] = from.cipher(&hop.payload);
		nonces[i] = iv;
		sessions[i] = Some(hop.id);
		let depth = (REPLY_HOPS - i) as u8;
		skins = skins.reverse(hop.address).crypt(Crypt::new(hop.header, None, from, iv, depth));
	}
	let bytes = skins.assemble()?.to_bytes()?;
	let mut routing = [0; ROUTING_HEADER_LEN];
	// The closing End is not part of the routing header.
	routing.copy_from_slice(&bytes[..ROUTING_HEADER_LEN]);
	let mut header = ReplyHeader::new(ciphers, nonces, routing);
	header.sessions = sessions;
	Ok(header)
}

fn request_hops(circuit: &Circuit, keys: &mut KeySet) -> Skins {
	circuit[..REQUEST_HOPS].iter().fold(Skins::new(), |skins, hop| skins.forward_crypt(hop, keys))
}

fn return_hops(circuit: &Circuit) -> &[HopKeys; REPLY_HOPS] {
	array_ref![circuit, REQUEST_HOPS, REPLY_HOPS]
}

/// Round trip over every hop of `circuit`, answered by a [`Confirmation`] carrying `id`.
pub fn ping(id: Id, circuit: &Circuit, keys: &mut KeySet) -> Result<Onion, Error> {
	circuit
		.iter()
		.fold(Skins::new(), |skins, hop| skins.forward_crypt(hop, keys))
		.confirmation(id, 0)
		.assemble()
}

/// Send `bytes` to the service on `port` at the third hop, answered by a [`Response`].
pub fn exit(
	id: Id,
	port: u16,
	bytes: Vec<u8>,
	circuit: &Circuit,
	keys: &mut KeySet,
) -> Result<Onion, Error> {
	let reply = reply_header(return_hops(circuit), keys)?;
	request_hops(circuit, keys).exit(id, port, bytes, reply).assemble()
}

/// Ask the third hop for the balance of `session`, answered by a [`Balance`].
pub fn get_balance(
	id: Id,
	session: Id,
	circuit: &Circuit,
	keys: &mut KeySet,
) -> Result<Onion, Error> {
	let reply = reply_header(return_hops(circuit), keys)?;
	request_hops(circuit, keys).get_balance(id, session, reply).assemble()
}

/// Ask the third hop for the introduction of the service with `key`, answered by a
/// [`Response`] holding the encoded [`Intro`].
pub fn intro_query(
	id: Id,
	key: &PubKey,
	circuit: &Circuit,
	keys: &mut KeySet,
) -> Result<Onion, Error> {
	let reply = reply_header(return_hops(circuit), keys)?;
	request_hops(circuit, keys).intro_query(id, key.to_bytes(), reply).assemble()
}

/// Leave `intro` with the third hop.
pub fn introduce(intro: Intro, circuit: &Circuit, keys: &mut KeySet) -> Result<Onion, Error> {
	request_hops(circuit, keys).intro(intro).assemble()
}

/// Reach the hidden service `service` hosted at `address`, answered by [`Ready`].
pub fn route(
	id: Id,
	service: &PubKey,
	address: SocketAddr,
	circuit: &Circuit,
	keys: &mut KeySet,
) -> Result<Onion, Error> {
	let reply = reply_header(return_hops(circuit), keys)?;
	let route = Route::new(*service, keys.key(), keys.iv(), id, reply);
	request_hops(circuit, keys).forward(address).route(route).assemble()
}

/// Deliver each session to its node, then come back over our own return session with a
/// [`Confirmation`] carrying `id`.
pub fn session_purchase(
	id: Id,
	deliveries: &[(Node, Session)],
	ret: &HopKeys,
	keys: &mut KeySet,
) -> Result<Onion, Error> {
	deliveries
		.iter()
		.fold(Skins::new(), |skins, (node, session)| {
			skins.forward_identity(node, keys).session(session.clone())
		})
		.forward_crypt(ret, keys)
		.confirmation(id, 0)
		.assemble()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::{
		onion::{onions, CRYPT_LEN, HOP_LEN},
		sessions::SessionData,
		Splice, RETURN_HOP,
	};

	fn sessions(keys: &mut KeySet) -> Vec<SessionData> {
		(0..=RETURN_HOP)
			.map(|hop| {
				let node = Node {
					address: SocketAddr::from(([10, 0, 0, hop + 1], 9000)),
					identity: keys.key().public(),
					relay_rate: 0,
				};
				SessionData::new(node, hop, keys.key(), keys.key(), 1_000, true)
			})
			.collect()
	}

	fn circuit(sessions: &[SessionData]) -> Circuit {
		let hops: Vec<_> = sessions.iter().map(SessionData::hop_keys).collect();
		hops.try_into().unwrap()
	}

	#[test]
	fn assemble_closes_open_chains() {
		let onion = Skins::new().forward("127.0.0.1:1".parse().unwrap()).assemble().unwrap();
		assert_eq!(onion.inner(), Some(&Onion::End(End)));

		let onion = Skins::new().confirmation([1; 16], 0).assemble().unwrap();
		assert_eq!(onion, Onion::Confirmation(Confirmation { id: [1; 16], load: 0 }));

		let err = Skins::new().balance([0; 16], 0).delay(Duration::ZERO).assemble();
		assert_eq!(err, Err(Error::Terminal("Balance")));
	}

	#[test]
	fn ping_peels_hop_by_hop() {
		let mut keys = KeySet::from_seed(71);
		let sessions = sessions(&mut keys);
		let id: Id = std::array::from_fn(|i| i as u8);
		let onion = ping(id, &circuit(&sessions), &mut keys).unwrap();
		let mut s = Splice::load(onion.to_bytes().unwrap());

		for session in &sessions {
			let Onion::Forward(hop) = onions().read(&mut s).unwrap() else { panic!("no forward") };
			assert_eq!(hop.address, session.node.address);
			let Onion::Crypt(crypt) = onions().read(&mut s).unwrap() else { panic!("no crypt") };
			crypt.open(&mut s, &session.header).unwrap();
		}
		assert_eq!(
			onions().read(&mut s).unwrap(),
			Onion::Confirmation(Confirmation { id, load: 0 })
		);
		assert_eq!(s.remaining(), 0);
	}

	#[test]
	fn reply_header_layout() {
		let mut keys = KeySet::from_seed(72);
		let sessions = sessions(&mut keys);
		let circuit = circuit(&sessions);
		let header = reply_header(return_hops(&circuit), &mut keys).unwrap();

		let mut s = Splice::load(header.routing.to_vec());
		let Onion::Reverse(first) = onions().read(&mut s).unwrap() else { panic!("no reverse") };
		assert_eq!(first.address, circuit[REQUEST_HOPS].address);
		let Onion::Crypt(crypt) = onions().read(&mut s).unwrap() else { panic!("no crypt") };
		assert_eq!(s.pos(), HOP_LEN + CRYPT_LEN);

		// The first crypt hides the following pairs under its header cipher.
		let session = &sessions[REQUEST_HOPS];
		crypt.open(&mut s, &session.header).unwrap();
		let Onion::Reverse(second) = onions().read(&mut s).unwrap() else { panic!("no reverse") };
		assert_eq!(second.address, circuit[REQUEST_HOPS + 1].address);

		let sender = crypt.sender.unwrap();
		assert_eq!(header.ciphers[0], session.payload.cipher(&sender));
		assert_eq!(header.nonces[0], crypt.iv);
		assert_eq!(header.sessions, [Some(circuit[3].id), Some(circuit[4].id), Some(circuit[5].id)]);
	}

	#[test]
	fn purchase_delivers_sessions_behind_identities() {
		let mut keys = KeySet::from_seed(73);
		let sessions = sessions(&mut keys);
		let identities: Vec<_> = (0..2).map(|_| keys.key()).collect();
		let deliveries: Vec<_> = identities
			.iter()
			.zip(&sessions)
			.map(|(identity, session)| {
				let node = Node { identity: identity.public(), ..session.node.clone() };
				(node, Session::new(session.hop, session.header.clone(), session.payload.clone()))
			})
			.collect();
		let ret = sessions[RETURN_HOP as usize].hop_keys();
		let onion = session_purchase([9; 16], &deliveries, &ret, &mut keys).unwrap();
		let mut s = Splice::load(onion.to_bytes().unwrap());

		for (identity, (_, session)) in identities.iter().zip(&deliveries) {
			onions().read(&mut s).unwrap();
			let Onion::Crypt(crypt) = onions().read(&mut s).unwrap() else { panic!("no crypt") };
			crypt.open(&mut s, identity).unwrap();
			let Onion::Session(delivered) = onions().read(&mut s).unwrap() else {
				panic!("no session")
			};
			assert_eq!(delivered.id().unwrap(), session.id().unwrap());
		}
	}
}
