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

//! Local services: exits reachable by port, hidden services hosted here, and the introductions
//! this node knows about.

use crate::{
	core::{
		cloak::{self, Cloak},
		crypto::PrvKey,
		onion::Intro,
		PubBytes,
	},
	shutdown::Shutdown,
};
use std::{collections::HashMap, time::Duration};
use tokio::sync::{mpsc, oneshot};

/// One request to a local service. The service answers on `reply`.
#[derive(Debug)]
pub struct ServiceRequest {
	pub bytes: Vec<u8>,
	pub reply: oneshot::Sender<Vec<u8>>,
}

pub type ServiceSender = mpsc::Sender<ServiceRequest>;

pub struct HiddenService {
	pub key: PrvKey,
	pub key_bytes: PubBytes,
	pub handler: ServiceSender,
}

#[derive(Default)]
pub struct Services {
	exits: HashMap<u16, ServiceSender>,
	hidden: HashMap<PubBytes, HiddenService>,
	intros: HashMap<PubBytes, Intro>,
}

impl Services {
	pub fn register_exit(&mut self, port: u16, handler: ServiceSender) {
		self.exits.insert(port, handler);
	}

	pub fn exit(&self, port: u16) -> Option<ServiceSender> {
		self.exits.get(&port).cloned()
	}

	pub fn host(&mut self, key: PrvKey, handler: ServiceSender) {
		let key_bytes = key.public().to_bytes();
		self.hidden.insert(key_bytes, HiddenService { key, key_bytes, handler });
	}

	pub fn hidden(&self, key: &PubBytes) -> Option<&HiddenService> {
		self.hidden.get(key)
	}

	pub fn hidden_by_cloak(&self, cloak: &Cloak) -> Option<&HiddenService> {
		self.hidden.values().find(|service| cloak::matches(cloak, &service.key_bytes))
	}

	pub fn add_intro(&mut self, intro: Intro) {
		self.intros.insert(intro.key, intro);
	}

	pub fn intro(&self, key: &PubBytes) -> Option<&Intro> {
		self.intros.get(key)
	}
}

/// Hand `bytes` to a local service and wait for its answer.
///
/// A service that is gone or does not answer within `timeout` yields an empty answer. `None`
/// means shutdown was triggered while waiting.
pub async fn call(
	handler: ServiceSender,
	bytes: Vec<u8>,
	timeout: Duration,
	shutdown: &Shutdown,
) -> Option<Vec<u8>> {
	let (reply, answer) = oneshot::channel();
	let request = async move {
		if handler.send(ServiceRequest { bytes, reply }).await.is_err() {
			return Vec::new()
		}
		answer.await.unwrap_or_default()
	};
	tokio::select! {
		biased;
		_ = shutdown.wait() => None,
		answer = tokio::time::timeout(timeout, request) => Some(answer.unwrap_or_default()),
	}
}
