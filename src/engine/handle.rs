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

//! What a node does with each layer it unwraps.

use super::{services, Engine, Reply};
use crate::core::{
	cloak,
	crypto::encipher,
	new_id,
	onion::{
		magic, onions, Balance, Crypt, Delay, Exit, GetBalance, Handled, Hop, Intro, IntroQuery,
		Message, Onion, Ready, Response, Route, Session, HOP_LEN, REVERSE_CRYPT_LEN,
		ROUTING_HEADER_LEN,
	},
	registry::Codec,
	sessions::{relay_cost, SessionData},
	Error, Id, Splice, NO_ID, RETURN_HOP,
};
use log::{debug, warn};
use rand::RngCore;
use std::{
	mem,
	sync::Arc,
	time::{Instant, SystemTime},
};

impl Onion {
	/// Act on this layer, whose own fields have just been decoded from `s`. `prev` is the layer
	/// handled before it in the same message.
	pub(super) fn handle(
		&mut self,
		s: &mut Splice,
		prev: Option<&Onion>,
		engine: &Arc<Engine>,
	) -> Result<Handled, Error> {
		match self {
			Onion::Crypt(crypt) => engine.handle_crypt(crypt, s),
			Onion::Forward(hop) => engine.handle_forward(hop, s, prev),
			Onion::Reverse(hop) => engine.handle_reverse(hop, s, prev),
			Onion::Exit(exit) => engine.handle_exit(exit),
			Onion::GetBalance(query) => engine.handle_get_balance(query),
			Onion::IntroQuery(query) => engine.handle_intro_query(query),
			Onion::Intro(intro) => engine.handle_intro(intro),
			Onion::Route(route) => engine.handle_route(route, s),
			Onion::Session(session) => engine.handle_session(session),
			Onion::Message(message) => engine.handle_service_message(message),
			Onion::Delay(delay) => engine.handle_delay(delay, s),
			Onion::Confirmation(c) => engine.complete(&c.id, Reply::Confirmation { load: c.load }),
			Onion::Balance(Balance { id, msat }) => engine.complete(id, Reply::Balance { msat: *msat }),
			Onion::Response(Response { id, port, load, bytes }) => engine.complete(
				id,
				Reply::Response { port: *port, load: *load, bytes: mem::take(bytes) },
			),
			Onion::Ready(Ready { id, address, forwards }) => engine.complete(
				id,
				Reply::Ready { address: *address, forwards: mem::take(forwards) },
			),
			Onion::End(_) => Ok(Handled::Done),
		}
	}
}

/// Session a relayed message is paid from: the one the previous layer was addressed to.
fn paying_session(prev: Option<&Onion>) -> Option<Id> {
	match prev? {
		Onion::Crypt(crypt) => crypt.session,
		Onion::Reverse(hop) => hop.session,
		Onion::Session(session) => session.id().ok(),
		_ => None,
	}
}

impl Engine {
	/// Bill the previous layer's session for relaying `relayed` of the `received` bytes.
	fn debit(&self, prev: Option<&Onion>, received: usize, relayed: usize) -> Result<(), Error> {
		let Some(id) = paying_session(prev) else { return Ok(()) };
		let msat = relay_cost(received, relayed, self.config.relay_rate);
		if self.sessions.lock().dec_sats(&id, msat) {
			Ok(())
		} else {
			debug!(target: self.config.log_target, "Session {id:x?} cannot pay {msat} msat");
			Err(Error::InsufficientBalance)
		}
	}

	fn handle_crypt(&self, crypt: &mut Crypt, s: &mut Splice) -> Result<Handled, Error> {
		let sessions = self.sessions.lock();
		if let Some(session) = sessions.find_by_cloak(&crypt.cloak) {
			crypt.open(s, &session.header)?;
			crypt.session = Some(session.id);
			return Ok(Handled::Next)
		}
		drop(sessions);

		if !cloak::matches(&crypt.cloak, &self.identity_pub.to_bytes()) {
			return Err(Error::NoMatchingKey)
		}
		crypt.open(s, &self.identity)?;
		// Only a paid-for session may be addressed to our identity key.
		if s.peek_magic()? != magic::SESSION {
			return Err(Error::Unauthenticated)
		}
		Ok(Handled::Next)
	}

	fn handle_forward(
		&self,
		hop: &Hop,
		s: &mut Splice,
		prev: Option<&Onion>,
	) -> Result<Handled, Error> {
		if hop.address == self.config.address {
			return Ok(Handled::Next)
		}
		self.debit(prev, s.len(), s.len() - s.pos())?;
		self.send(&hop.address, s.as_slice()[s.pos()..].to_vec())?;
		Ok(Handled::Done)
	}

	/// Relay a reply, or strip our pair off the front of its routing header.
	///
	/// Stripping decrypts the rest of the routing header and the payload, moves the remaining
	/// pairs to the front and pads the routing header back to its full length with noise.
	fn handle_reverse(
		&self,
		hop: &mut Hop,
		s: &mut Splice,
		prev: Option<&Onion>,
	) -> Result<Handled, Error> {
		let start = s.pos() - HOP_LEN;
		if hop.address != self.config.address {
			self.debit(prev, s.len(), s.len() - start)?;
			self.send(&hop.address, s.as_slice()[start..].to_vec())?;
			return Ok(Handled::Done)
		}

		s.require(ROUTING_HEADER_LEN - HOP_LEN)?;
		let crypt = match onions().read(s)? {
			Onion::Crypt(crypt) => crypt,
			other => return Err(Error::UnexpectedMagic { expected: magic::CRYPT, found: other.magic() }),
		};
		let sender = crypt.sender.ok_or(Error::InvalidPublicKey)?;
		let sessions = self.sessions.lock();
		let session = sessions.find_by_cloak(&crypt.cloak).ok_or(Error::NoMatchingKey)?;

		let end = start + ROUTING_HEADER_LEN;
		let buf = s.as_mut_slice();
		encipher(&session.header.cipher(&sender), &crypt.iv, &mut buf[start + REVERSE_CRYPT_LEN..end]);
		encipher(&session.payload.cipher(&sender), &crypt.iv, &mut buf[end..]);
		buf.copy_within(start + REVERSE_CRYPT_LEN..end, start);
		rand::thread_rng().fill_bytes(&mut buf[end - REVERSE_CRYPT_LEN..end]);
		hop.session = Some(session.id);

		let arrived = session.hop == RETURN_HOP || buf[start..start + 4] != magic::REVERSE;
		s.set_pos(if arrived { end } else { start });
		Ok(Handled::Next)
	}

	fn handle_exit(self: &Arc<Self>, exit: &mut Exit) -> Result<Handled, Error> {
		let Some(handler) = self.services.lock().exit(exit.port) else {
			warn!(target: self.config.log_target, "No exit service on port {}", exit.port);
			return Err(Error::UnknownService)
		};
		let exit = mem::take(exit);
		let engine = self.clone();
		tokio::spawn(async move {
			let timeout = engine.config.exit_timeout;
			let Some(bytes) = services::call(handler, exit.bytes, timeout, &engine.shutdown).await
			else {
				return
			};
			let response =
				Onion::Response(Response { id: exit.id, port: exit.port, load: engine.load(), bytes });
			engine.reply(&exit.reply, &response);
		});
		Ok(Handled::Done)
	}

	fn handle_get_balance(self: &Arc<Self>, query: &GetBalance) -> Result<Handled, Error> {
		let msat = self
			.sessions
			.lock()
			.find(&query.session)
			.map(SessionData::remaining)
			.ok_or(Error::SessionNotFound)?;
		self.reply(&query.reply, &Onion::Balance(Balance { id: query.id, msat }));
		Ok(Handled::Done)
	}

	fn handle_intro_query(self: &Arc<Self>, query: &IntroQuery) -> Result<Handled, Error> {
		let intro = self.services.lock().intro(&query.key).cloned();
		let bytes = match intro {
			Some(intro) => intro.to_bytes()?,
			None => Vec::new(),
		};
		let response = Onion::Response(Response { id: query.id, port: 0, load: self.load(), bytes });
		self.reply(&query.reply, &response);
		Ok(Handled::Done)
	}

	fn handle_intro(&self, intro: &mut Intro) -> Result<Handled, Error> {
		intro.validate(SystemTime::now())?;
		debug!(target: self.config.log_target, "Learned intro for {:x?}", &intro.key[..4]);
		self.services.lock().add_intro(mem::take(intro));
		Ok(Handled::Done)
	}

	/// A client reaching one of our hidden services: answer with a header for our own return
	/// path, over which it sends its messages.
	fn handle_route(self: &Arc<Self>, route: &mut Route, s: &mut Splice) -> Result<Handled, Error> {
		let (key, address) = {
			let services = self.services.lock();
			let service = services.hidden_by_cloak(&route.cloak).ok_or(Error::NoMatchingKey)?;
			(service.key.clone(), service.key_bytes)
		};
		route.open(s, &key)?;
		let ready = Onion::Ready(Ready { id: route.id, address, forwards: self.return_header()? });
		self.reply(&route.reply, &ready);
		Ok(Handled::Done)
	}

	fn handle_session(&self, session: &Session) -> Result<Handled, Error> {
		let preimage = session.preimage()?;
		let mut sessions = self.sessions.lock();
		let payment = sessions.take_payment(&preimage).ok_or(Error::PaymentNotFound)?;
		let (Some(header), Some(payload)) = (session.header.clone(), session.payload.clone()) else {
			return Err(Error::InvalidPrivateKey)
		};
		let adopted = SessionData::new(self.node(), session.hop, header, payload, payment.amount, false);
		debug!(target: self.config.log_target,
			"Adopted session {:x?} for hop {} with {} msat", adopted.id, adopted.hop, payment.amount);
		sessions.adopt(adopted);
		Ok(Handled::Next)
	}

	/// A request for one of our hidden services, or the answer to one we sent.
	fn handle_service_message(self: &Arc<Self>, message: &mut Message) -> Result<Handled, Error> {
		if message.re != NO_ID {
			let Message { address, id, re, forwards, payload } = mem::take(message);
			return self.complete(&re, Reply::Message { address, id, payload, forwards })
		}
		let Some(handler) = self.services.lock().hidden(&message.address).map(|s| s.handler.clone())
		else {
			return Err(Error::UnknownService)
		};
		let request = mem::take(message);
		let engine = self.clone();
		tokio::spawn(async move {
			let timeout = engine.config.exit_timeout;
			let Some(payload) =
				services::call(handler, request.payload, timeout, &engine.shutdown).await
			else {
				return
			};
			let forwards = match engine.return_header() {
				Ok(forwards) => forwards,
				Err(err) => {
					debug!(target: engine.config.log_target, "Cannot answer message: {err}");
					return
				},
			};
			let answer = Onion::Message(Message {
				address: request.address,
				id: new_id(),
				re: request.id,
				forwards,
				payload,
			});
			engine.reply(&request.forwards, &answer);
		});
		Ok(Handled::Done)
	}

	/// Hand the rest of the message back to [`handle_message`](Self::handle_message) later.
	fn handle_delay(self: &Arc<Self>, delay: &Delay, s: &mut Splice) -> Result<Handled, Error> {
		let rest = s.as_slice()[s.pos()..].to_vec();
		let duration = delay.duration;
		let engine = self.clone();
		tokio::spawn(async move {
			tokio::select! {
				_ = engine.shutdown.wait() => (),
				_ = tokio::time::sleep(duration) => engine.handle_message(rest),
			}
		});
		Ok(Handled::Done)
	}

	/// Settle the request `id` was sent with: debit what it cost us, then run its callback.
	fn complete(&self, id: &Id, reply: Reply) -> Result<Handled, Error> {
		let (billable, callback) =
			self.pending.lock().process(id, Instant::now()).ok_or(Error::NoReply)?;
		{
			let mut sessions = self.sessions.lock();
			for bill in billable {
				if !sessions.dec_sats(&bill.session, bill.cost) {
					debug!(target: self.config.log_target,
						"Session {:x?} cannot cover {} msat", bill.session, bill.cost);
				}
			}
		}
		callback(reply);
		Ok(Handled::Done)
	}
}
