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

//! Onion routed relay protocol.
//!
//! [`core`] builds and reads the layered messages and keeps the session ledger. The [`engine`]
//! is a node: it unwraps what it receives, relays what is not for it and answers what is. The
//! [`dispatcher`] carries whole messages between two nodes over a lossy packet connection.

pub mod core;
pub mod dispatcher;
pub mod engine;
mod shutdown;
mod traits;

pub use crate::{
	core::{
		crypto::{KeySet, PrvKey, PubKey},
		Error,
	},
	dispatcher::{Connection, Dispatcher, Links},
	engine::{Engine, Reply},
	shutdown::Shutdown,
	traits::Transport,
};
