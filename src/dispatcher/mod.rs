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

//! Reliable delivery of whole messages over a lossy packet connection.
//!
//! Every message is erasure coded into MTU sized packets, which are shuffled and sent
//! without retransmission. The receiver rebuilds the message as soon as enough packets are in,
//! and reports back how many bytes arrived and how long the transfer took. Those reports steer
//! the amount of parity used for later messages.
//!
//! One reactor task per connection owns the receiving side. Its state is shared with the
//! [`Dispatcher`] handle behind a mutex that is never held across an await.

mod config;
mod keyring;
mod links;
mod message;
mod packet;
mod parity;
mod segment;

pub use config::Config;
pub use links::Links;
pub use message::{controls, Ack, Control};
pub use packet::OVERHEAD;

use crate::{
	core::{
		crypto::{hash, PrvKey, PubKey},
		new_id,
		registry::Codec,
		Error, Hash, Id, Splice, HASH_SIZE,
	},
	shutdown::Shutdown,
};
use hashlink::LinkedHashSet;
use keyring::KeyRing;
use log::{debug, trace, warn};
use packet::{Packet, Sealer};
use parity::ParityControl;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::{
	collections::{hash_map::Entry, HashMap},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	time::{Duration, Instant},
};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Both directions of a packet connection. A full sender drops the packet.
pub struct Connection {
	pub tx: mpsc::Sender<Vec<u8>>,
	pub rx: mpsc::Receiver<Vec<u8>>,
}

impl Connection {
	/// Two in-memory connection ends wired to each other.
	pub fn pair(capacity: usize) -> (Connection, Connection) {
		let (a_tx, b_rx) = mpsc::channel(capacity);
		let (b_tx, a_rx) = mpsc::channel(capacity);
		(Connection { tx: a_tx, rx: a_rx }, Connection { tx: b_tx, rx: b_rx })
	}
}

/// Counters of one connection. Byte counts of messages exclude framing; totals are wire bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
	/// Messages sent that expect an acknowledgement.
	pub sent: u64,
	/// Messages acknowledged with a matching hash.
	pub delivered: u64,
	/// Messages acknowledged as lost, or never acknowledged at all.
	pub failed: u64,
	pub data_sent: u64,
	pub data_received: u64,
	pub total_sent: u64,
	pub total_received: u64,
}

enum Command {
	Send(Control),
	Rekey,
}

/// A message we sent and have no acknowledgement for yet.
struct TxRecord {
	length: usize,
	hash: Hash,
	/// Shard bytes transmitted.
	size: u64,
	sent: Instant,
}

/// A message being received.
struct Partial {
	length: usize,
	parity: u8,
	shard_len: usize,
	expected: usize,
	shards: HashMap<u16, Vec<u8>>,
	received: u64,
	first: Instant,
	last: Instant,
	/// Hash of the rebuilt message, zero until then.
	hash: Hash,
	done: bool,
	no_ack: bool,
}

impl Partial {
	fn new(packet: &Packet, now: Instant) -> Result<Self, Error> {
		let length = packet.length as usize;
		let shard_len = packet.shard.len();
		Ok(Self {
			length,
			parity: packet.parity,
			shard_len,
			expected: segment::expected_packets(length, shard_len, packet.parity)?,
			shards: HashMap::new(),
			received: 0,
			first: now,
			last: now,
			hash: [0; HASH_SIZE],
			done: false,
			no_ack: false,
		})
	}

	fn add(&mut self, packet: Packet, now: Instant) -> Result<(), Error> {
		if packet.length as usize != self.length ||
			packet.parity != self.parity ||
			packet.shard.len() != self.shard_len
		{
			return Err(Error::BadSegment)
		}
		if let Entry::Vacant(entry) = self.shards.entry(packet.seq) {
			self.received += self.shard_len as u64;
			self.last = now;
			entry.insert(packet.shard);
		}
		Ok(())
	}

	fn rebuild(&self) -> Result<Option<Vec<u8>>, Error> {
		if self.done || !segment::sufficient(self.length, self.shard_len, self.parity, &self.shards)? {
			return Ok(None)
		}
		segment::reassemble(self.length, self.shard_len, self.parity, &self.shards).map(Some)
	}
}

struct State {
	log_target: &'static str,
	keys: KeyRing,
	/// Peer key packets are sealed to.
	remote: PubKey,
	parity: ParityControl,
	ping: Duration,
	outbound: HashMap<Id, TxRecord>,
	partials: HashMap<Id, Partial>,
	completed: LinkedHashSet<Id>,
	completed_capacity: usize,
	received_since_rekey: usize,
	stats: Stats,
}

impl State {
	fn new(config: &Config, local: PrvKey, remote: PubKey) -> Self {
		Self {
			log_target: config.log_target,
			keys: KeyRing::new(local, config.key_history),
			remote,
			parity: ParityControl::new(config.parity),
			ping: config.initial_ping,
			outbound: HashMap::new(),
			partials: HashMap::new(),
			completed: LinkedHashSet::with_capacity(config.completed_capacity.saturating_add(1)),
			completed_capacity: config.completed_capacity,
			received_since_rekey: 0,
			stats: Stats::default(),
		}
	}

	/// Take in one packet. Returns the message it completed, if any, and the acknowledgement once
	/// one is due.
	fn receive(&mut self, packet: Packet, now: Instant) -> Result<(Option<Control>, Option<Ack>), Error> {
		let id = packet.id;
		if self.completed.contains(&id) {
			trace!(target: self.log_target, "Late packet for {id:x?}");
			return Ok((None, None))
		}
		let partial = match self.partials.entry(id) {
			Entry::Occupied(entry) => entry.into_mut(),
			Entry::Vacant(entry) => entry.insert(Partial::new(&packet, now)?),
		};
		partial.add(packet, now)?;

		let mut control = None;
		if let Some(message) = partial.rebuild()? {
			partial.done = true;
			partial.hash = hash(&message);
			self.stats.data_received += message.len() as u64;
			let parsed = controls().read(&mut Splice::load(message))?;
			partial.no_ack = matches!(parsed, Control::Ack(_));
			control = Some(parsed);
		}
		let ack = if partial.done && partial.shards.len() >= partial.expected {
			self.finish(&id)
		} else {
			None
		};
		Ok((control, ack))
	}

	/// Forget a received message. Returns its acknowledgement unless it was one itself.
	fn finish(&mut self, id: &Id) -> Option<Ack> {
		let partial = self.partials.remove(id)?;
		self.completed.insert(*id);
		if self.completed.len() > self.completed_capacity {
			self.completed.pop_front();
		}
		if partial.no_ack {
			return None
		}
		Some(Ack {
			id: *id,
			hash: partial.hash,
			size: (partial.expected * partial.shard_len) as u64,
			received: partial.received,
			duration_us: partial.last.saturating_duration_since(partial.first).as_micros() as u64,
			ping_us: self.ping.as_micros() as u64,
		})
	}

	fn acknowledged(&mut self, ack: &Ack) {
		let Some(record) = self.outbound.remove(&ack.id) else {
			debug!(target: self.log_target, "Acknowledgement for unknown message {:x?}", ack.id);
			return
		};
		if ack.hash == record.hash {
			self.stats.delivered += 1;
			self.stats.data_sent += record.length as u64;
		} else {
			debug!(target: self.log_target, "Message {:x?} was lost", ack.id);
			self.stats.failed += 1;
		}
		let error = if record.size == 0 {
			1.0
		} else {
			1.0 - ack.received as f64 / record.size as f64
		};
		let divergence = if ack.ping_us == 0 {
			1.0
		} else {
			(ack.ping_us + ack.duration_us) as f64 / ack.ping_us as f64
		};
		let parity = self.parity.update(error.max(0.0), divergence);
		trace!(target: self.log_target, "Loss {error:.3}, divergence {divergence:.3}: parity {parity}");
	}

	/// Acknowledge messages whose packets have stopped coming, give up on those that cannot be
	/// rebuilt anymore and on sends that were never acknowledged.
	fn gc(&mut self, now: Instant, fail_after_pings: u32) -> Vec<Ack> {
		let ping = self.ping;
		let give_up = ping.saturating_mul(fail_after_pings);
		let due: Vec<Id> = self
			.partials
			.iter()
			.filter(|(_, partial)| {
				let idle = now.saturating_duration_since(partial.last);
				idle >= if partial.done { ping } else { give_up }
			})
			.map(|(id, _)| *id)
			.collect();
		let mut acks = Vec::with_capacity(due.len());
		for id in due {
			if self.partials.get(&id).is_some_and(|partial| !partial.done) {
				debug!(target: self.log_target, "Gave up on message {id:x?}");
			}
			acks.extend(self.finish(&id));
		}

		let before = self.outbound.len();
		self.outbound
			.retain(|_, record| now.saturating_duration_since(record.sent) < give_up.saturating_mul(2));
		self.stats.failed += (before - self.outbound.len()) as u64;
		acks
	}
}

struct Inner {
	config: Config,
	state: Mutex<State>,
	rekeying: AtomicBool,
}

impl Inner {
	fn new(config: Config, local: PrvKey, remote: PubKey) -> Self {
		let state = Mutex::new(State::new(&config, local, remote));
		Self { config, state, rekeying: AtomicBool::new(false) }
	}

	/// Encode, seal and shuffle the packets of one message, recording it as outstanding.
	fn prepare(&self, control: &Control, now: Instant) -> Result<Vec<Vec<u8>>, Error> {
		let bytes = control.to_bytes()?;
		let length = u32::try_from(bytes.len()).map_err(|_| Error::MessageTooLarge)?;
		let shard_len = self.config.mtu.saturating_sub(OVERHEAD);
		let (parity, remote) = {
			let state = self.state.lock();
			(state.parity.value(), state.remote)
		};
		let shards = segment::encode(&bytes, shard_len, parity)?;
		let size = (shards.len() * shard_len) as u64;
		let id = new_id();
		let sealer = Sealer::new(remote);
		let mut packets = shards
			.into_iter()
			.map(|(seq, shard)| sealer.seal(&Packet { id, seq, length, parity, shard }))
			.collect::<Result<Vec<_>, _>>()?;
		packets.shuffle(&mut rand::thread_rng());

		let mut state = self.state.lock();
		if !matches!(control, Control::Ack(_)) {
			state.outbound.insert(id, TxRecord { length: bytes.len(), hash: hash(&bytes), size, sent: now });
			state.stats.sent += 1;
		}
		state.stats.total_sent += packets.iter().map(|packet| packet.len() as u64).sum::<u64>();
		Ok(packets)
	}
}

/// Handle to the reactor of one connection.
#[derive(Clone)]
pub struct Dispatcher {
	inner: Arc<Inner>,
	commands: mpsc::Sender<Command>,
	pings: mpsc::Sender<Duration>,
}

impl Dispatcher {
	/// Start the reactor for `conn`. `local` is the key the peer initially seals packets to,
	/// `remote` the peer's. Rebuilt payloads come out of the returned receiver.
	pub fn spawn(
		config: Config,
		conn: Connection,
		local: PrvKey,
		remote: PubKey,
		shutdown: Shutdown,
	) -> (Self, mpsc::Receiver<Vec<u8>>) {
		let (commands_tx, commands) = mpsc::channel(config.queue_capacity.max(1));
		let (pings_tx, pings) = mpsc::channel(16);
		let (output, output_rx) = mpsc::channel(config.queue_capacity.max(1));
		let inner = Arc::new(Inner::new(config, local, remote));
		let reactor = Reactor { inner: inner.clone(), conn, output, commands, pings, shutdown };
		tokio::spawn(reactor.run());
		(Self { inner, commands: commands_tx, pings: pings_tx }, output_rx)
	}

	fn queue(&self, command: Command) -> Result<(), Error> {
		self.commands.try_send(command).map_err(|err| match err {
			TrySendError::Full(_) => Error::QueueFull,
			TrySendError::Closed(_) => Error::Closed,
		})
	}

	/// Queue `buf` for sending without waiting.
	pub fn try_queue(&self, buf: Vec<u8>) -> Result<(), Error> {
		self.queue(Command::Send(Control::Onion(buf)))
	}

	/// Queue `buf` for sending, waiting for room in the queue.
	pub async fn send(&self, buf: Vec<u8>) -> Result<(), Error> {
		self.commands
			.send(Command::Send(Control::Onion(buf)))
			.await
			.map_err(|_| Error::Closed)
	}

	/// Feed a round trip measurement of the underlying connection.
	pub fn report_ping(&self, rtt: Duration) {
		if let Err(TrySendError::Full(_)) = self.pings.try_send(rtt) {
			trace!(target: self.inner.config.log_target, "Ping sample dropped");
		}
	}

	/// Rotate our key. Does nothing while a rotation is already underway.
	pub fn rekey(&self) -> Result<(), Error> {
		if self.inner.rekeying.swap(true, Ordering::SeqCst) {
			debug!(target: self.inner.config.log_target, "Key rotation already in progress");
			return Ok(())
		}
		self.queue(Command::Rekey).map_err(|err| {
			self.inner.rekeying.store(false, Ordering::SeqCst);
			err
		})
	}

	/// Our key the peer currently seals packets to, as far as we announced it.
	pub fn local_key(&self) -> Option<PubKey> {
		self.inner.state.lock().keys.current()
	}

	/// Parity of the next full section.
	pub fn parity(&self) -> u8 {
		self.inner.state.lock().parity.value()
	}

	pub fn stats(&self) -> Stats {
		self.inner.state.lock().stats
	}
}

struct Reactor {
	inner: Arc<Inner>,
	conn: Connection,
	output: mpsc::Sender<Vec<u8>>,
	commands: mpsc::Receiver<Command>,
	pings: mpsc::Receiver<Duration>,
	shutdown: Shutdown,
}

impl Reactor {
	async fn run(mut self) {
		let log_target = self.inner.config.log_target;
		let mut gc = tokio::time::interval(self.inner.config.gc_interval);
		gc.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		let shutdown = self.shutdown.clone();
		loop {
			tokio::select! {
				_ = shutdown.wait() => break,
				_ = gc.tick() => self.gc(),
				Some(rtt) = self.pings.recv() => self.inner.state.lock().ping = rtt,
				packet = self.conn.rx.recv() => match packet {
					Some(packet) => self.recv_from_conn(packet).await,
					None => {
						debug!(target: log_target, "Connection closed");
						break
					},
				},
				Some(command) = self.commands.recv() => match command {
					Command::Send(control) => self.send_to_conn(&control),
					Command::Rekey => self.rotate(),
				},
			}
		}
		debug!(target: log_target, "Dispatcher stopped");
	}

	fn send_to_conn(&self, control: &Control) {
		let log_target = self.inner.config.log_target;
		let packets = match self.inner.prepare(control, Instant::now()) {
			Ok(packets) => packets,
			Err(err) => {
				warn!(target: log_target, "Cannot send message: {err}");
				return
			},
		};
		for packet in packets {
			match self.conn.tx.try_send(packet) {
				Ok(()) => (),
				Err(TrySendError::Full(_)) => trace!(target: log_target, "Connection full, packet dropped"),
				Err(TrySendError::Closed(_)) => {
					debug!(target: log_target, "Connection closed while sending");
					return
				},
			}
		}
	}

	async fn recv_from_conn(&mut self, buf: Vec<u8>) {
		let log_target = self.inner.config.log_target;
		let (received, rekey_due) = {
			let mut state = self.inner.state.lock();
			state.stats.total_received += buf.len() as u64;
			state.received_since_rekey += buf.len();
			let rekey_due = state.received_since_rekey >= self.inner.config.rekey_after_bytes;
			let received = match packet::open(buf, &mut state.keys) {
				Ok(packet) => state.receive(packet, Instant::now()),
				Err(err) => Err(err),
			};
			(received, rekey_due)
		};
		match received {
			Ok((control, ack)) => {
				if let Some(control) = control {
					self.dispatch(control).await;
				}
				if let Some(ack) = ack {
					self.send_to_conn(&Control::Ack(ack));
				}
			},
			Err(err) => debug!(target: log_target, "Dropped packet: {err}"),
		}
		if rekey_due && !self.inner.rekeying.swap(true, Ordering::SeqCst) {
			self.rotate();
		}
	}

	async fn dispatch(&mut self, control: Control) {
		let log_target = self.inner.config.log_target;
		match control {
			Control::NewKey { key } => match PubKey::from_bytes(&key) {
				Ok(key) => {
					debug!(target: log_target, "Peer rotated its key to {key:?}");
					self.inner.state.lock().remote = key;
				},
				Err(err) => debug!(target: log_target, "Bad key announcement: {err}"),
			},
			Control::Ack(ack) => self.inner.state.lock().acknowledged(&ack),
			Control::Onion(bytes) =>
				if self.output.send(bytes).await.is_err() {
					debug!(target: log_target, "Message dropped, output closed");
				},
		}
	}

	/// Switch to a fresh key. The previous ones stay usable for packets already in flight.
	fn rotate(&self) {
		let key = PrvKey::gen(&mut rand::thread_rng());
		let public = key.public();
		{
			let mut state = self.inner.state.lock();
			state.keys.push(key);
			state.received_since_rekey = 0;
		}
		debug!(target: self.inner.config.log_target, "Rotated our key to {public:?}");
		self.send_to_conn(&Control::NewKey { key: public.to_bytes() });
		self.inner.rekeying.store(false, Ordering::SeqCst);
	}

	fn gc(&self) {
		let acks = self.inner.state.lock().gc(Instant::now(), self.inner.config.fail_after_pings);
		for ack in acks {
			self.send_to_conn(&Control::Ack(ack));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::crypto::KeySet;

	fn pair(seed: u64) -> (Inner, Inner) {
		let mut keys = KeySet::from_seed(seed);
		let (a, b) = (keys.key(), keys.key());
		let (a_pub, b_pub) = (a.public(), b.public());
		let config = Config { log_target: "dispatcher-test", mtu: 280, ..Default::default() };
		(Inner::new(config.clone(), a, b_pub), Inner::new(config, b, a_pub))
	}

	/// Feed packets to `to`, collecting what they complete and acknowledge.
	fn deliver(
		to: &Inner,
		packets: impl IntoIterator<Item = Vec<u8>>,
		now: Instant,
	) -> (Vec<Control>, Vec<Ack>) {
		let (mut controls, mut acks) = (Vec::new(), Vec::new());
		let mut state = to.state.lock();
		for buf in packets {
			let packet = packet::open(buf, &mut state.keys).unwrap();
			let (control, ack) = state.receive(packet, now).unwrap();
			controls.extend(control);
			acks.extend(ack);
		}
		(controls, acks)
	}

	fn payload(len: usize) -> Control {
		Control::Onion((0..len).map(|i| i as u8).collect())
	}

	#[test]
	fn full_delivery_is_acknowledged_at_once() {
		let (a, b) = pair(121);
		let now = Instant::now();
		let message = payload(5000);
		let packets = a.prepare(&message, now).unwrap();
		let (controls, acks) = deliver(&b, packets, now);
		assert_eq!(controls, vec![message]);
		let [ack] = &acks[..] else { panic!("expected one acknowledgement") };
		assert_eq!(ack.received, ack.size);

		let before = a.state.lock().parity.value();
		a.state.lock().acknowledged(ack);
		let state = a.state.lock();
		assert_eq!(state.stats.delivered, 1);
		assert_eq!(state.stats.data_sent, 5000 + 4);
		assert!(state.parity.value() < before);
		assert!(state.outbound.is_empty());
	}

	#[test]
	fn loss_is_acknowledged_after_a_ping() {
		let (a, b) = pair(122);
		let now = Instant::now();
		let message = payload(3000);
		let mut packets = a.prepare(&message, now).unwrap();
		packets.truncate(packets.len() - 2);
		let (controls, acks) = deliver(&b, packets, now);
		assert_eq!(controls, vec![message]);
		assert!(acks.is_empty());

		let ping = b.state.lock().ping;
		assert!(b.state.lock().gc(now + ping / 2, 10).is_empty());
		let acks = b.state.lock().gc(now + ping, 10);
		let [ack] = &acks[..] else { panic!("expected one acknowledgement") };
		assert!(ack.received < ack.size);

		let before = a.state.lock().parity.value();
		a.state.lock().acknowledged(ack);
		assert!(a.state.lock().parity.value() > before);
		assert_eq!(a.state.lock().stats.delivered, 1);
	}

	#[test]
	fn unrecoverable_message_is_reported_lost() {
		let (a, b) = pair(123);
		let now = Instant::now();
		let packets = a.prepare(&payload(3000), now).unwrap();
		let (controls, _) = deliver(&b, packets.into_iter().take(3), now);
		assert!(controls.is_empty());

		let ping = b.state.lock().ping;
		assert!(b.state.lock().gc(now + ping * 9, 10).is_empty());
		let acks = b.state.lock().gc(now + ping * 10, 10);
		let [ack] = &acks[..] else { panic!("expected one acknowledgement") };
		assert_eq!(ack.hash, [0; HASH_SIZE]);
		assert!(b.state.lock().partials.is_empty());

		a.state.lock().acknowledged(ack);
		let stats = a.state.lock().stats;
		assert_eq!((stats.sent, stats.delivered, stats.failed), (1, 0, 1));
	}

	#[test]
	fn late_packets_are_dropped() {
		let (a, b) = pair(124);
		let now = Instant::now();
		let packets = a.prepare(&payload(100), now).unwrap();
		let (controls, acks) = deliver(&b, packets.clone(), now);
		assert_eq!((controls.len(), acks.len()), (1, 1));
		let (controls, acks) = deliver(&b, packets, now);
		assert!(controls.is_empty() && acks.is_empty());
		assert!(b.state.lock().partials.is_empty());
	}

	#[test]
	fn acknowledgements_are_not_acknowledged() {
		let (a, b) = pair(125);
		let now = Instant::now();
		let ack = Control::Ack(Ack { id: [3; 16], ..Default::default() });
		let packets = a.prepare(&ack, now).unwrap();
		assert!(a.state.lock().outbound.is_empty());
		let (controls, acks) = deliver(&b, packets, now);
		assert_eq!(controls, vec![ack]);
		assert!(acks.is_empty());
	}

	#[test]
	fn unacknowledged_sends_fail_eventually() {
		let (a, _) = pair(126);
		let now = Instant::now();
		a.prepare(&payload(10), now).unwrap();
		let ping = a.state.lock().ping;
		assert!(a.state.lock().gc(now + ping * 19, 10).is_empty());
		a.state.lock().gc(now + ping * 20, 10);
		let state = a.state.lock();
		assert!(state.outbound.is_empty());
		assert_eq!(state.stats.failed, 1);
	}

	#[test]
	fn mismatched_packets_are_rejected() {
		let (a, b) = pair(127);
		let now = Instant::now();
		let first = a.prepare(&payload(1000), now).unwrap();
		let mut state = b.state.lock();
		let mut packet = packet::open(first[0].clone(), &mut state.keys).unwrap();
		state.receive(packet.clone(), now).unwrap();
		packet.seq = packet.seq.wrapping_add(1);
		packet.parity = packet.parity.wrapping_add(1);
		assert_eq!(state.receive(packet, now), Err(Error::BadSegment));
	}
}
