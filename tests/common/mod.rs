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

//! In-memory network of engines talking over dispatchers.

#![allow(dead_code)]

use itertools::Itertools;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::timeout};
use veilnet::{
	core::{sessions::MIB, FORWARD_HOPS},
	dispatcher, engine, Connection, Dispatcher, Engine, KeySet, Links, Reply, Shutdown,
};

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestNode {
	pub engine: Arc<Engine>,
	pub links: Arc<Links>,
}

impl TestNode {
	pub fn address(&self) -> SocketAddr {
		self.engine.config().address
	}
}

pub struct Network {
	pub nodes: Vec<TestNode>,
	pub shutdown: Shutdown,
}

impl Drop for Network {
	fn drop(&mut self) {
		self.shutdown.trigger();
	}
}

/// Per-node log targets, so interleaved output can be told apart.
const LOG_TARGETS: [&str; 8] = [
	"veilnet(0)",
	"veilnet(1)",
	"veilnet(2)",
	"veilnet(3)",
	"veilnet(4)",
	"veilnet(5)",
	"veilnet(6)",
	"veilnet(7)",
];

pub fn log_target(index: usize) -> &'static str {
	LOG_TARGETS.get(index).copied().unwrap_or("veilnet")
}

pub fn address(index: usize) -> SocketAddr {
	SocketAddr::from(([127, 0, 0, 1], 9000 + index as u16))
}

pub fn dispatcher_config(index: usize) -> dispatcher::Config {
	dispatcher::Config {
		log_target: log_target(index),
		gc_interval: Duration::from_millis(20),
		..Default::default()
	}
}

/// Dispatchers at both ends of `conns`, each with the other's initial key.
pub fn dispatchers(
	configs: (dispatcher::Config, dispatcher::Config),
	conns: (Connection, Connection),
	keys: &mut KeySet,
	shutdown: &Shutdown,
) -> ((Dispatcher, mpsc::Receiver<Vec<u8>>), (Dispatcher, mpsc::Receiver<Vec<u8>>)) {
	let (a, b) = (keys.key(), keys.key());
	let (a_pub, b_pub) = (a.public(), b.public());
	(
		Dispatcher::spawn(configs.0, conns.0, a, b_pub, shutdown.clone()),
		Dispatcher::spawn(configs.1, conns.1, b, a_pub, shutdown.clone()),
	)
}

/// `n` nodes, each connected to every other by a dispatcher pair.
pub fn network(n: usize, seed: u64) -> Network {
	let _ = env_logger::try_init();
	let shutdown = Shutdown::new();
	let mut keys = KeySet::from_seed(seed);
	let nodes: Vec<_> = (0..n)
		.map(|i| {
			let links = Arc::new(Links::new());
			let config = engine::Config {
				log_target: log_target(i),
				address: address(i),
				..Default::default()
			};
			let engine = Engine::new(config, keys.key(), links.clone(), shutdown.clone());
			TestNode { engine, links }
		})
		.collect();

	for (i, j) in (0..n).tuple_combinations() {
		let ((to_j, from_j), (to_i, from_i)) = dispatchers(
			(dispatcher_config(i), dispatcher_config(j)),
			Connection::pair(4096),
			&mut keys,
			&shutdown,
		);
		nodes[i].links.add(address(j), to_j);
		nodes[i].engine.listen(from_j);
		nodes[j].links.add(address(i), to_i);
		nodes[j].engine.listen(from_i);
	}
	Network { nodes, shutdown }
}

/// Buy sessions for `client` on `relays`, in hop order.
pub async fn buy_sessions(client: &TestNode, relays: [&TestNode; FORWARD_HOPS]) {
	let nodes = relays.map(|relay| relay.engine.node());
	let purchase = client.engine.prepare_sessions(&nodes, MIB);
	for (address, payment) in purchase.payments() {
		let relay = relays.iter().find(|relay| relay.address() == address).unwrap();
		relay.engine.add_pending_payment(payment);
	}
	let confirmed = client.engine.send_session_purchase(purchase).unwrap();
	let reply = timeout(TIMEOUT, confirmed).await.unwrap().unwrap();
	assert!(matches!(reply, Reply::Confirmation { .. }));
}

/// A connection whose `a` to `b` direction drops every `drop_every`th packet. Zero drops
/// nothing. The other direction is clean.
pub fn lossy_pair(capacity: usize, drop_every: usize) -> (Connection, Connection) {
	let (a_tx, mut a_to_b) = mpsc::channel::<Vec<u8>>(capacity);
	let (to_b, b_rx) = mpsc::channel(capacity);
	let (b_tx, a_rx) = mpsc::channel(capacity);
	tokio::spawn(async move {
		let mut count = 0;
		while let Some(packet) = a_to_b.recv().await {
			count += 1;
			if drop_every != 0 && count % drop_every == 0 {
				continue
			}
			if to_b.send(packet).await.is_err() {
				break
			}
		}
	});
	(Connection { tx: a_tx, rx: a_rx }, Connection { tx: b_tx, rx: b_rx })
}
