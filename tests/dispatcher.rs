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

//! Two dispatchers over in-memory links, clean and lossy.

mod common;

use common::{dispatcher_config, dispatchers, lossy_pair, TIMEOUT};
use itertools::Itertools;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::{collections::HashSet, time::Duration};
use tokio::{
	sync::mpsc,
	time::{sleep, timeout, Instant},
};
use veilnet::{Connection, Dispatcher, Error, KeySet, Shutdown};

fn payload(len: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<u8> {
	let mut buf = vec![0; len];
	rng.fill_bytes(&mut buf);
	buf
}

async fn recv(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<u8> {
	timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap()
}

/// Wait until `dispatcher` has an answer for `count` of its messages.
async fn settled(dispatcher: &Dispatcher, count: u64) {
	let deadline = Instant::now() + TIMEOUT;
	loop {
		let stats = dispatcher.stats();
		if stats.delivered + stats.failed >= count {
			return
		}
		assert!(Instant::now() < deadline, "messages never settled: {stats:?}");
		sleep(Duration::from_millis(5)).await;
	}
}

#[tokio::test]
async fn messages_cross_in_both_directions() {
	let _ = env_logger::try_init();
	let shutdown = Shutdown::new();
	let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
	let ((a, mut a_out), (b, mut b_out)) = dispatchers(
		(dispatcher_config(0), dispatcher_config(1)),
		Connection::pair(4096),
		&mut KeySet::from_seed(1),
		&shutdown,
	);

	let sent: Vec<_> = [0, 1, 1381, 20_000].iter().map(|len| payload(*len, &mut rng)).collect();
	for buf in &sent {
		a.send(buf.clone()).await.unwrap();
		b.try_queue(buf.clone()).unwrap();
	}
	let mut at_b = Vec::new();
	let mut at_a = Vec::new();
	for _ in &sent {
		at_b.push(recv(&mut b_out).await);
		at_a.push(recv(&mut a_out).await);
	}
	let expected: HashSet<_> = sent.iter().collect();
	assert_eq!(at_b.iter().collect::<HashSet<_>>(), expected);
	assert_eq!(at_a.iter().collect::<HashSet<_>>(), expected);

	settled(&a, sent.len() as u64).await;
	let stats = a.stats();
	assert_eq!((stats.sent, stats.delivered, stats.failed), (4, 4, 0));
	assert_eq!(stats.data_sent, sent.iter().map(|buf| buf.len() as u64 + 4).sum::<u64>());
	shutdown.trigger();
}

#[tokio::test]
async fn lossy_link_still_delivers() {
	let _ = env_logger::try_init();
	let shutdown = Shutdown::new();
	let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
	let ((a, _a_out), (_b, mut b_out)) = dispatchers(
		(dispatcher_config(0), dispatcher_config(1)),
		lossy_pair(4096, 10),
		&mut KeySet::from_seed(2),
		&shutdown,
	);

	let sent: Vec<_> = (0..8).map(|_| payload(30_000, &mut rng)).collect();
	for buf in &sent {
		a.send(buf.clone()).await.unwrap();
	}
	let mut received = HashSet::new();
	for _ in &sent {
		received.insert(recv(&mut b_out).await);
	}
	assert_eq!(received, sent.into_iter().collect());
	shutdown.trigger();
}

#[tokio::test]
async fn parity_follows_loss() {
	let _ = env_logger::try_init();
	let shutdown = Shutdown::new();
	let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
	// A long round trip keeps transfer time out of the picture.
	let config = |index| veilnet::dispatcher::Config {
		initial_ping: Duration::from_secs(1),
		..dispatcher_config(index)
	};
	let ((a, _a_out), (_b, mut b_out)) = dispatchers(
		(config(0), config(1)),
		lossy_pair(4096, 5),
		&mut KeySet::from_seed(3),
		&shutdown,
	);

	// Every round loses a fifth of its packets; each acknowledgement must raise parity.
	let mut seen = vec![a.parity()];
	for round in 1..=4 {
		a.send(payload(60_000, &mut rng)).await.unwrap();
		recv(&mut b_out).await;
		settled(&a, round).await;
		seen.push(a.parity());
	}
	assert!(seen.iter().tuple_windows().all(|(before, after)| after > before), "{seen:?}");

	let ((clean, _), (_, mut clean_out)) = dispatchers(
		(config(2), config(3)),
		Connection::pair(4096),
		&mut KeySet::from_seed(4),
		&shutdown,
	);
	let mut seen = vec![clean.parity()];
	for round in 1..=4 {
		clean.send(payload(60_000, &mut rng)).await.unwrap();
		recv(&mut clean_out).await;
		settled(&clean, round).await;
		seen.push(clean.parity());
	}
	assert!(seen.iter().tuple_windows().all(|(before, after)| after <= before), "{seen:?}");
	shutdown.trigger();
}

#[tokio::test]
async fn rekeying_keeps_traffic_flowing() {
	let _ = env_logger::try_init();
	let shutdown = Shutdown::new();
	let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
	let ((a, mut a_out), (b, mut b_out)) = dispatchers(
		(dispatcher_config(0), dispatcher_config(1)),
		Connection::pair(4096),
		&mut KeySet::from_seed(5),
		&shutdown,
	);

	for _ in 0..3 {
		let before = a.local_key();
		a.rekey().unwrap();
		// Already rotating: ignored.
		a.rekey().unwrap();
		let deadline = Instant::now() + TIMEOUT;
		while a.local_key() == before {
			assert!(Instant::now() < deadline, "key never rotated");
			sleep(Duration::from_millis(5)).await;
		}
		let buf = payload(5_000, &mut rng);
		b.send(buf.clone()).await.unwrap();
		assert_eq!(recv(&mut a_out).await, buf);
		let buf = payload(5_000, &mut rng);
		a.send(buf.clone()).await.unwrap();
		assert_eq!(recv(&mut b_out).await, buf);
	}
	shutdown.trigger();
}

#[tokio::test]
async fn rekeys_after_enough_traffic() {
	let _ = env_logger::try_init();
	let shutdown = Shutdown::new();
	let mut rng = Xoshiro256PlusPlus::seed_from_u64(6);
	let config = |index| veilnet::dispatcher::Config {
		rekey_after_bytes: 16 * 1024,
		..dispatcher_config(index)
	};
	let ((a, _a_out), (b, mut b_out)) = dispatchers(
		(config(0), config(1)),
		Connection::pair(4096),
		&mut KeySet::from_seed(6),
		&shutdown,
	);

	let before = b.local_key();
	for _ in 0..4 {
		a.send(payload(10_000, &mut rng)).await.unwrap();
		recv(&mut b_out).await;
	}
	assert_ne!(b.local_key(), before);
	// Whatever was sealed to the announced key still gets through.
	let buf = payload(10_000, &mut rng);
	a.send(buf.clone()).await.unwrap();
	assert_eq!(recv(&mut b_out).await, buf);
	shutdown.trigger();
}

#[tokio::test]
async fn shutdown_stops_the_reactor() {
	let _ = env_logger::try_init();
	let shutdown = Shutdown::new();
	let ((a, mut a_out), _) = dispatchers(
		(dispatcher_config(0), dispatcher_config(1)),
		Connection::pair(16),
		&mut KeySet::from_seed(7),
		&shutdown,
	);
	shutdown.trigger();
	assert_eq!(timeout(TIMEOUT, a_out.recv()).await.unwrap(), None);
	assert_eq!(a.try_queue(Vec::new()), Err(Error::Closed));
	assert_eq!(a.send(Vec::new()).await, Err(Error::Closed));
}
