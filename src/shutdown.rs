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

use std::sync::Arc;
use tokio::sync::watch;

/// Process or connection wide stop signal. Clones share the signal; once triggered it stays
/// triggered.
#[derive(Clone, Debug)]
pub struct Shutdown {
	tx: Arc<watch::Sender<bool>>,
	rx: watch::Receiver<bool>,
}

impl Shutdown {
	pub fn new() -> Self {
		let (tx, rx) = watch::channel(false);
		Self { tx: Arc::new(tx), rx }
	}

	pub fn trigger(&self) {
		self.tx.send_replace(true);
	}

	pub fn is_triggered(&self) -> bool {
		*self.rx.borrow()
	}

	/// Resolves once [`trigger`](Self::trigger) has been called on any clone.
	pub async fn wait(&self) {
		let mut rx = self.rx.clone();
		while !*rx.borrow_and_update() {
			if rx.changed().await.is_err() {
				// Sender gone; nobody can trigger any more.
				std::future::pending::<()>().await;
			}
		}
	}
}

impl Default for Shutdown {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn wait_observes_trigger_from_clone() {
		let shutdown = Shutdown::new();
		let waiter = shutdown.clone();
		let task = tokio::spawn(async move { waiter.wait().await });
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert!(!task.is_finished());
		shutdown.trigger();
		tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
		assert!(shutdown.is_triggered());
		// Already triggered: returns at once.
		shutdown.wait().await;
	}
}
