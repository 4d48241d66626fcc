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

//! Session ledger.
//!
//! A session is a prepaid relationship with one relay at one hop position. It consists of two
//! independent key pairs: the header key addresses Crypt layers, the payload key encrypts reply
//! payloads. Both sides hold the private keys; the client learns them first and delivers them to
//! the relay with a `Session` onion once the relay has seen payment for their preimage.

use super::{
	cloak::{self, Cloak},
	crypto::{hash, PrvKey, PubKey},
	Error, Hash, Id, FORWARD_HOPS, ID_SIZE, PRV_SIZE, RETURN_HOP,
};
use std::{collections::HashMap, net::SocketAddr};

/// Relay rates are quoted per this many bytes.
pub const MIB: u64 = 1 << 20;

/// Known relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
	pub address: SocketAddr,
	pub identity: PubKey,
	/// Millisatoshi charged per MiB relayed.
	pub relay_rate: u64,
}

/// Hash of both private keys of a session. Whoever can show it paid for the session.
pub fn preimage(header: &PrvKey, payload: &PrvKey) -> Hash {
	let mut both = zeroize::Zeroizing::new([0; 2 * PRV_SIZE]);
	both[..PRV_SIZE].copy_from_slice(&header.to_bytes()[..]);
	both[PRV_SIZE..].copy_from_slice(&payload.to_bytes()[..]);
	hash(&both[..])
}

pub fn session_id(preimage: &Hash) -> Id {
	let mut id = Id::default();
	id.copy_from_slice(&preimage[..ID_SIZE]);
	id
}

/// Cost of moving `size` bytes at `rate` millisatoshi per MiB, rounded up.
pub fn cost(size: usize, rate: u64) -> u64 {
	let total = size as u128 * u128::from(rate);
	u64::try_from(total.div_ceil(u128::from(MIB))).unwrap_or(u64::MAX)
}

/// Cost of relaying a message: half the rate for the `received` bytes coming in, the other half
/// for the `relayed` bytes going out. Rounded up once, over both legs.
pub fn relay_cost(received: usize, relayed: usize, rate: u64) -> u64 {
	let inbound = rate / 2;
	let outbound = rate - inbound;
	let total = received as u128 * u128::from(inbound) + relayed as u128 * u128::from(outbound);
	u64::try_from(total.div_ceil(u128::from(MIB))).unwrap_or(u64::MAX)
}

pub struct SessionData {
	pub id: Id,
	pub node: Node,
	/// Position in the circuit: 0 to 4 forward, 5 for the return hop.
	pub hop: u8,
	pub header: PrvKey,
	pub payload: PrvKey,
	pub header_pub: PubKey,
	pub payload_pub: PubKey,
	pub preimage: Hash,
	/// We bought this session, as opposed to serving it as a relay.
	pub client: bool,
	remaining: u64,
}

impl SessionData {
	pub fn new(
		node: Node,
		hop: u8,
		header: PrvKey,
		payload: PrvKey,
		remaining: u64,
		client: bool,
	) -> Self {
		let preimage = preimage(&header, &payload);
		Self {
			id: session_id(&preimage),
			node,
			hop,
			header_pub: header.public(),
			payload_pub: payload.public(),
			header,
			payload,
			preimage,
			client,
			remaining,
		}
	}

	/// Remaining balance in millisatoshi.
	pub fn remaining(&self) -> u64 {
		self.remaining
	}

	pub fn inc_sats(&mut self, msat: u64) {
		self.remaining = self.remaining.saturating_add(msat);
	}

	/// Debit `msat`. Returns `false` and leaves the balance alone if it does not cover it.
	pub fn dec_sats(&mut self, msat: u64) -> bool {
		match self.remaining.checked_sub(msat) {
			Some(remaining) => {
				self.remaining = remaining;
				true
			},
			None => false,
		}
	}

	/// What a client needs to address this session in an onion.
	pub fn hop_keys(&self) -> HopKeys {
		HopKeys {
			id: self.id,
			address: self.node.address,
			header: self.header_pub,
			payload: self.payload_pub,
		}
	}
}

/// Public half of a session, as used when building onions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HopKeys {
	pub id: Id,
	pub address: SocketAddr,
	pub header: PubKey,
	pub payload: PubKey,
}

/// One session per hop position: five forward hops and our own return hop.
pub type Circuit = [HopKeys; FORWARD_HOPS + 1];

/// Payment a relay has received for a session it has not been handed the keys of yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payment {
	pub id: Id,
	pub preimage: Hash,
	pub amount: u64,
}

/// Cost to debit from one of our sessions once a reply arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Billable {
	pub session: Id,
	pub cost: u64,
}

#[derive(Default)]
pub struct SessionManager {
	sessions: HashMap<Id, SessionData>,
	nodes: HashMap<SocketAddr, Node>,
	payments: HashMap<Hash, Payment>,
}

impl SessionManager {
	pub fn add_session(&mut self, session: SessionData) {
		self.sessions.insert(session.id, session);
	}

	/// Start serving a session delivered by a client, or top it up if we already know it.
	pub fn adopt(&mut self, session: SessionData) {
		match self.sessions.get_mut(&session.id) {
			Some(known) => known.inc_sats(session.remaining),
			None => self.add_session(session),
		}
	}

	pub fn remove(&mut self, id: &Id) -> Option<SessionData> {
		self.sessions.remove(id)
	}

	pub fn find(&self, id: &Id) -> Option<&SessionData> {
		self.sessions.get(id)
	}

	pub fn find_mut(&mut self, id: &Id) -> Option<&mut SessionData> {
		self.sessions.get_mut(id)
	}

	/// Session whose header key `cloak` was made from.
	pub fn find_by_cloak(&self, cloak: &Cloak) -> Option<&SessionData> {
		self.sessions
			.values()
			.find(|session| cloak::matches(cloak, &session.header_pub.to_bytes()))
	}

	pub fn find_by_header(&self, key: &PubKey) -> Option<&SessionData> {
		self.sessions.values().find(|session| &session.header_pub == key)
	}

	pub fn iter(&self) -> impl Iterator<Item = &SessionData> {
		self.sessions.values()
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}

	pub fn inc_sats(&mut self, id: &Id, msat: u64) -> Result<(), Error> {
		self.find_mut(id).ok_or(Error::SessionNotFound)?.inc_sats(msat);
		Ok(())
	}

	/// Debit a session. `false` if it is unknown or its balance does not cover `msat`.
	pub fn dec_sats(&mut self, id: &Id, msat: u64) -> bool {
		self.find_mut(id).map_or(false, |session| session.dec_sats(msat))
	}

	/// Price of relaying `size` bytes over one of our sessions.
	pub fn bill(&self, id: &Id, size: usize) -> Result<Billable, Error> {
		let session = self.find(id).ok_or(Error::SessionNotFound)?;
		Ok(Billable { session: *id, cost: cost(size, session.node.relay_rate) })
	}

	pub fn add_node(&mut self, node: Node) {
		self.nodes.insert(node.address, node);
	}

	pub fn find_node(&self, address: &SocketAddr) -> Option<&Node> {
		self.nodes.get(address)
	}

	pub fn delete_node(&mut self, address: &SocketAddr) -> Option<Node> {
		self.nodes.remove(address)
	}

	pub fn nodes(&self) -> impl Iterator<Item = &Node> {
		self.nodes.values()
	}

	pub fn add_pending_payment(&mut self, payment: Payment) {
		self.payments.insert(payment.preimage, payment);
	}

	/// Claim the payment made for `preimage`, if any.
	pub fn take_payment(&mut self, preimage: &Hash) -> Option<Payment> {
		self.payments.remove(preimage)
	}

	/// Pick the best funded session we own for every hop position.
	pub fn circuit(&self) -> Result<Circuit, Error> {
		let hops = (0..=RETURN_HOP)
			.map(|hop| {
				self.sessions
					.values()
					.filter(|session| session.client && session.hop == hop)
					.max_by_key(|session| session.remaining)
					.map(SessionData::hop_keys)
					.ok_or(Error::SessionNotFound)
			})
			.collect::<Result<Vec<_>, _>>()?;
		hops.try_into().map_err(|_| Error::SessionNotFound)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::crypto::KeySet;
	use rand::{Rng, SeedableRng};
	use rand_xoshiro::Xoshiro256StarStar;

	fn node(keys: &mut KeySet, port: u16) -> Node {
		Node {
			address: SocketAddr::from(([127, 0, 0, 1], port)),
			identity: keys.key().public(),
			relay_rate: 1_000,
		}
	}

	#[test]
	fn balance_never_negative() {
		let mut keys = KeySet::from_seed(61);
		let mut rng = Xoshiro256StarStar::seed_from_u64(61);
		let mut session = SessionData::new(node(&mut keys, 1), 0, keys.key(), keys.key(), 500, true);
		for _ in 0..10_000 {
			let amount = rng.gen_range(0..300);
			if rng.gen_bool(0.4) {
				session.inc_sats(amount);
			} else {
				let before = session.remaining();
				if session.dec_sats(amount) {
					assert_eq!(session.remaining(), before - amount);
				} else {
					assert!(before < amount);
					assert_eq!(session.remaining(), before);
				}
			}
		}
	}

	#[test]
	fn find_by_cloak_and_header() {
		let mut keys = KeySet::from_seed(62);
		let mut sessions = SessionManager::default();
		for hop in 0..3 {
			let n = node(&mut keys, 10 + u16::from(hop));
			sessions.add_session(SessionData::new(n, hop, keys.key(), keys.key(), 0, false));
		}
		let wanted = sessions.iter().find(|s| s.hop == 1).map(|s| (s.id, s.header_pub)).unwrap();
		let cloak = cloak::cloak(&wanted.1.to_bytes(), &mut rand::thread_rng());
		assert_eq!(sessions.find_by_cloak(&cloak).map(|s| s.id), Some(wanted.0));
		assert_eq!(sessions.find_by_header(&wanted.1).map(|s| s.id), Some(wanted.0));

		let stranger = cloak::cloak(&keys.key().public().to_bytes(), &mut rand::thread_rng());
		assert!(sessions.find_by_cloak(&stranger).is_none());
	}

	#[test]
	fn payments_are_claimed_once() {
		let mut keys = KeySet::from_seed(63);
		let (header, payload) = (keys.key(), keys.key());
		let preimage = preimage(&header, &payload);
		let mut sessions = SessionManager::default();
		sessions.add_pending_payment(Payment { id: session_id(&preimage), preimage, amount: 7 });
		assert_eq!(sessions.take_payment(&preimage).map(|p| p.amount), Some(7));
		assert!(sessions.take_payment(&preimage).is_none());
	}

	#[test]
	fn circuit_needs_every_hop() {
		let mut keys = KeySet::from_seed(64);
		let mut sessions = SessionManager::default();
		for hop in 0..RETURN_HOP {
			let n = node(&mut keys, 20 + u16::from(hop));
			sessions.add_session(SessionData::new(n, hop, keys.key(), keys.key(), 100, true));
		}
		assert!(matches!(sessions.circuit(), Err(Error::SessionNotFound)));

		let n = node(&mut keys, 30);
		sessions.add_session(SessionData::new(n, RETURN_HOP, keys.key(), keys.key(), 100, true));
		let circuit = sessions.circuit().unwrap();
		for (hop, hop_keys) in circuit.iter().enumerate() {
			assert_eq!(sessions.find(&hop_keys.id).unwrap().hop as usize, hop);
		}
	}

	#[test]
	fn cost_rounds_up() {
		assert_eq!(cost(0, 1_000), 0);
		assert_eq!(cost(1, 1_000), 1);
		assert_eq!(cost(MIB as usize, 1_000), 1_000);
		assert_eq!(cost(usize::MAX, u64::MAX), u64::MAX);
	}

	#[test]
	fn relay_bills_both_legs() {
		let mib = MIB as usize;
		assert_eq!(relay_cost(mib, mib, 1_000), 1_000);
		// Stripped layers are paid for coming in, not going out.
		assert_eq!(relay_cost(2 * mib, mib, 1_000), 1_500);
		assert_eq!(relay_cost(mib, 0, 1_001), 500);
		assert_eq!(relay_cost(0, mib, 1_001), 501);
		assert_eq!(relay_cost(1, 1, 1_000), 1);
		assert!(relay_cost(1_000, 900, 1_000) <= cost(1_000, 1_000));
	}
}
