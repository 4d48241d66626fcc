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

//! The node: unwraps incoming onions layer by layer, relays what is not for it, answers queries,
//! and keeps the requests it sent waiting for their reply.
//!
//! All state lives behind short-lived [`parking_lot`] locks that are never held across a
//! suspension point or while handling a nested message. Work that has to wait (local services,
//! [`Delay`](crate::core::onion::Delay) layers) is moved to a background task.

mod config;
mod handle;
mod pending;
mod services;

pub use self::{
	config::Config,
	pending::{Callback, PendingResponses, Reply},
	services::{ServiceRequest, ServiceSender},
};
use self::services::Services;
use crate::{
	core::{
		builder,
		crypto::{KeySet, PrvKey, PubKey},
		new_id,
		onion::{onions, Handled, Intro, Message, Onion, ReplyHeader},
		registry::Codec,
		sessions::{Circuit, HopKeys, Node, Payment, SessionData, SessionManager},
		Error, Id, PubBytes, Splice, FORWARD_HOPS, NO_ID, REPLY_HOPS, RETURN_HOP,
	},
	shutdown::Shutdown,
	traits::Transport,
};
use arrayref::array_ref;
use log::{debug, trace};
use parking_lot::{Mutex, MutexGuard};
use std::{
	net::SocketAddr,
	sync::{
		atomic::{AtomicU8, Ordering},
		Arc,
	},
	time::{Instant, SystemTime},
};
use tokio::{
	sync::{mpsc, oneshot},
	task::JoinHandle,
};

/// Sessions bought from five relays, plus our own return session, before the keys have been
/// delivered.
pub struct Purchase {
	pub id: Id,
	sessions: Vec<SessionData>,
	ret: HopKeys,
}

impl Purchase {
	/// What each relay must have been paid before it accepts its session.
	pub fn payments(&self) -> impl Iterator<Item = (SocketAddr, Payment)> + '_ {
		self.sessions.iter().map(|session| {
			let payment = Payment {
				id: session.id,
				preimage: session.preimage,
				amount: session.remaining(),
			};
			(session.node.address, payment)
		})
	}
}

pub struct Engine {
	config: Config,
	identity: PrvKey,
	identity_pub: PubKey,
	sessions: Mutex<SessionManager>,
	pending: Mutex<PendingResponses>,
	services: Mutex<Services>,
	keys: Mutex<KeySet>,
	load: AtomicU8,
	transport: Arc<dyn Transport>,
	shutdown: Shutdown,
}

impl Engine {
	pub fn new(
		config: Config,
		identity: PrvKey,
		transport: Arc<dyn Transport>,
		shutdown: Shutdown,
	) -> Arc<Self> {
		let pending = PendingResponses::new(config.pending_capacity, config.pending_ttl);
		Arc::new(Self {
			identity_pub: identity.public(),
			identity,
			sessions: Mutex::new(SessionManager::default()),
			pending: Mutex::new(pending),
			services: Mutex::new(Services::default()),
			keys: Mutex::new(KeySet::new()),
			load: AtomicU8::new(0),
			transport,
			shutdown,
			config,
		})
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// How other nodes know this one.
	pub fn node(&self) -> Node {
		Node {
			address: self.config.address,
			identity: self.identity_pub,
			relay_rate: self.config.relay_rate,
		}
	}

	pub fn shutdown(&self) -> &Shutdown {
		&self.shutdown
	}

	pub fn load(&self) -> u8 {
		self.load.load(Ordering::Relaxed)
	}

	/// Load reported in confirmations and responses, 0 idle to 255 saturated.
	pub fn set_load(&self, load: u8) {
		self.load.store(load, Ordering::Relaxed);
	}

	pub fn sessions(&self) -> MutexGuard<'_, SessionManager> {
		self.sessions.lock()
	}

	pub fn add_node(&self, node: Node) {
		self.sessions.lock().add_node(node);
	}

	/// Record a payment, so that the session it pays for is accepted when its keys arrive.
	pub fn add_pending_payment(&self, payment: Payment) {
		self.sessions.lock().add_pending_payment(payment);
	}

	/// Forget requests whose reply is overdue. Returns how many were forgotten.
	pub fn expire_pending(&self) -> usize {
		let expired = self.pending.lock().expire(Instant::now());
		if expired > 0 {
			debug!(target: self.config.log_target, "Forgot {expired} unanswered requests");
		}
		expired
	}

	pub fn pending_len(&self) -> usize {
		self.pending.lock().len()
	}

	/// Serve Exit requests for `port`.
	pub fn register_exit(&self, port: u16, handler: ServiceSender) {
		self.services.lock().register_exit(port, handler);
	}

	/// Host a hidden service with `key`, taking requests on `handler`. Returns the signed
	/// introduction to hand to other nodes.
	pub fn host_hidden_service(
		&self,
		key: PrvKey,
		port: u16,
		expiry: SystemTime,
		handler: ServiceSender,
	) -> Result<Intro, Error> {
		let rate = u32::try_from(self.config.relay_rate).unwrap_or(u32::MAX);
		let intro = Intro::new(new_id(), &key, self.config.address, rate, port, expiry)?;
		let mut services = self.services.lock();
		services.host(key, handler);
		services.add_intro(intro.clone());
		Ok(intro)
	}

	/// Our best funded session for every hop position.
	pub fn circuit(&self) -> Result<Circuit, Error> {
		self.sessions.lock().circuit()
	}

	/// A reply header over our own sessions for hops three to five.
	pub fn return_header(&self) -> Result<ReplyHeader, Error> {
		let circuit = self.circuit()?;
		builder::reply_header(array_ref![circuit, FORWARD_HOPS - 2, REPLY_HOPS], &mut self.keys.lock())
	}

	fn build(
		&self,
		f: impl FnOnce(&Circuit, &mut KeySet) -> Result<Onion, Error>,
	) -> Result<Onion, Error> {
		let circuit = self.circuit()?;
		f(&circuit, &mut self.keys.lock())
	}

	/// Handle one message, from the network or produced locally.
	///
	/// Layers are recognised and handled in order until one of them finishes the message. Bad
	/// input is logged and dropped; nothing is ever sent back about it.
	pub fn handle_message(self: &Arc<Self>, buf: Vec<u8>) {
		let mut s = Splice::load(buf);
		let mut prev: Option<Onion> = None;
		loop {
			let mut onion = match onions().read(&mut s) {
				Ok(onion) => onion,
				Err(err) => {
					debug!(target: self.config.log_target, "Dropping message: {err}");
					return
				},
			};
			trace!(target: self.config.log_target, "Handling {} layer", onion.name());
			match onion.handle(&mut s, prev.as_ref(), self) {
				Ok(Handled::Next) => prev = Some(onion),
				Ok(Handled::Done) => return,
				Err(err) => {
					debug!(target: self.config.log_target,
						"Dropping message at {} layer: {err}", onion.name());
					return
				},
			}
		}
	}

	/// Handle every message coming out of `inbound`, until it closes or shutdown is triggered.
	pub fn listen(self: &Arc<Self>, mut inbound: mpsc::Receiver<Vec<u8>>) -> JoinHandle<()> {
		let engine = self.clone();
		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = engine.shutdown.wait() => break,
					buf = inbound.recv() => match buf {
						Some(buf) => engine.handle_message(buf),
						None => break,
					},
				}
			}
			debug!(target: engine.config.log_target, "Stopped listening");
		})
	}

	/// Send `onion` and run `callback` when the reply carrying `id` comes back. Our sessions the
	/// onion passes through are debited at that point.
	pub fn send_with_response(
		self: &Arc<Self>,
		onion: Onion,
		id: Id,
		callback: Callback,
	) -> Result<(), Error> {
		let buf = onion.to_bytes()?;
		let mut billable = Vec::new();
		onion.account(buf.len(), &self.sessions.lock(), &mut billable)?;
		self.pending.lock().add(id, billable, callback, Instant::now());
		self.handle_message(buf);
		Ok(())
	}

	/// As [`send_with_response`](Self::send_with_response), delivering the reply on a channel. The
	/// channel closes without a value if the request expires.
	pub fn request(self: &Arc<Self>, onion: Onion, id: Id) -> Result<oneshot::Receiver<Reply>, Error> {
		let (tx, rx) = oneshot::channel();
		let callback = Box::new(move |reply| {
			let _ = tx.send(reply);
		});
		self.send_with_response(onion, id, callback)?;
		Ok(rx)
	}

	/// Round trip over our whole circuit.
	pub fn ping(self: &Arc<Self>, id: Id) -> Result<oneshot::Receiver<Reply>, Error> {
		let onion = self.build(|circuit, keys| builder::ping(id, circuit, keys))?;
		self.request(onion, id)
	}

	/// Send `bytes` to the service on `port` at the third hop of our circuit.
	pub fn exit(self: &Arc<Self>, port: u16, bytes: Vec<u8>) -> Result<oneshot::Receiver<Reply>, Error> {
		let id = new_id();
		let onion = self.build(|circuit, keys| builder::exit(id, port, bytes, circuit, keys))?;
		self.request(onion, id)
	}

	/// Ask the third hop of our circuit what is left on `session`.
	pub fn get_balance(self: &Arc<Self>, session: Id) -> Result<oneshot::Receiver<Reply>, Error> {
		let id = new_id();
		let onion = self.build(|circuit, keys| builder::get_balance(id, session, circuit, keys))?;
		self.request(onion, id)
	}

	/// Ask the third hop of our circuit for the introduction of `service`. The answer is a
	/// [`Reply::Response`] whose bytes are read with [`Intro::from_bytes`], or empty if the node
	/// does not know the service.
	pub fn intro_query(self: &Arc<Self>, service: &PubKey) -> Result<oneshot::Receiver<Reply>, Error> {
		let id = new_id();
		let onion = self.build(|circuit, keys| builder::intro_query(id, service, circuit, keys))?;
		self.request(onion, id)
	}

	/// Leave `intro` with the third hop of our circuit. Nothing comes back.
	pub fn introduce(self: &Arc<Self>, intro: Intro) -> Result<(), Error> {
		let onion = self.build(|circuit, keys| builder::introduce(intro, circuit, keys))?;
		self.handle_message(onion.to_bytes()?);
		Ok(())
	}

	/// Reach the hidden service `service` at `address`. Answered by [`Reply::Ready`].
	pub fn route(
		self: &Arc<Self>,
		service: &PubKey,
		address: SocketAddr,
	) -> Result<oneshot::Receiver<Reply>, Error> {
		let id = new_id();
		let onion =
			self.build(|circuit, keys| builder::route(id, service, address, circuit, keys))?;
		self.request(onion, id)
	}

	/// Send `payload` to a hidden service over `forwards`, from a [`Reply::Ready`] or an earlier
	/// [`Reply::Message`]. Answered by [`Reply::Message`].
	pub fn send_message(
		self: &Arc<Self>,
		address: PubBytes,
		forwards: &ReplyHeader,
		payload: Vec<u8>,
	) -> Result<oneshot::Receiver<Reply>, Error> {
		let id = new_id();
		let message = Onion::Message(Message {
			address,
			id,
			re: NO_ID,
			forwards: self.return_header()?,
			payload,
		});
		let buf = forwards.format_reply(&message)?;
		let mut billable = Vec::new();
		message.account(buf.len(), &self.sessions.lock(), &mut billable)?;
		let (tx, rx) = oneshot::channel();
		let callback = Box::new(move |reply| {
			let _ = tx.send(reply);
		});
		self.pending.lock().add(id, billable, callback, Instant::now());
		self.handle_message(buf);
		Ok(rx)
	}

	/// Draw keys for a session with each of `nodes`, in hop order, and adopt our own return
	/// session right away. Each relay must be paid for its session, see [`Purchase::payments`],
	/// before [`send_session_purchase`](Self::send_session_purchase).
	pub fn prepare_sessions(&self, nodes: &[Node; FORWARD_HOPS], amount: u64) -> Purchase {
		let mut keys = self.keys.lock();
		let sessions = nodes
			.iter()
			.zip(0..)
			.map(|(node, hop)| {
				SessionData::new(node.clone(), hop, keys.key(), keys.key(), amount, true)
			})
			.collect();
		let own = Node { relay_rate: 0, ..self.node() };
		let ret = SessionData::new(own, RETURN_HOP, keys.key(), keys.key(), amount, true);
		let purchase = Purchase { id: keys.id(), sessions, ret: ret.hop_keys() };
		self.sessions.lock().add_session(ret);
		purchase
	}

	/// Deliver the keys of a prepared purchase. The sessions are ours to use once the
	/// confirmation comes back.
	pub fn send_session_purchase(
		self: &Arc<Self>,
		purchase: Purchase,
	) -> Result<oneshot::Receiver<Reply>, Error> {
		let Purchase { id, sessions, ret } = purchase;
		let deliveries: Vec<_> = sessions
			.iter()
			.map(|session| {
				let keys = crate::core::onion::Session::new(
					session.hop,
					session.header.clone(),
					session.payload.clone(),
				);
				(session.node.clone(), keys)
			})
			.collect();
		let onion = builder::session_purchase(id, &deliveries, &ret, &mut self.keys.lock())?;

		let engine = Arc::downgrade(self);
		let (tx, rx) = oneshot::channel();
		let callback = Box::new(move |reply| {
			if let Some(engine) = engine.upgrade() {
				let mut known = engine.sessions.lock();
				for session in sessions {
					known.add_session(session);
				}
			}
			let _ = tx.send(reply);
		});
		self.send_with_response(onion, id, callback)?;
		Ok(rx)
	}

	/// Relay `buf` to another node.
	fn send(&self, to: &SocketAddr, buf: Vec<u8>) -> Result<(), Error> {
		trace!(target: self.config.log_target, "Sending {} bytes to {to}", buf.len());
		self.transport.send(to, buf)
	}

	/// Send `reply` back along `header`.
	fn reply(self: &Arc<Self>, header: &ReplyHeader, reply: &Onion) {
		match header.format_reply(reply) {
			Ok(buf) => self.handle_message(buf),
			Err(err) => debug!(target: self.config.log_target,
				"Failed to format {} reply: {err}", reply.name()),
		}
	}
}
