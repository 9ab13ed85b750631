// Copyright 2019 The Weft Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Proof-of-work engine: scans nonces until the block hash satisfies the
//! required difficulty, and yields to cancellation at every batch
//! boundary so any chain mutation can preempt an in-flight proof.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use chrono::prelude::Utc;
use rand::{thread_rng, Rng};

use crate::core::block::Block;
use crate::core::consensus;
use crate::error::Error;
use crate::types::ChainStore;

/// The proof-of-work engine and the cancellation state it shares with
/// the chain's writer lane.
pub struct Prover {
	cancelled: Mutex<bool>,
	cond: Condvar,
	computing: AtomicBool,
	waiting: AtomicBool,
	last_generated: Mutex<Option<(u64, String)>>,
}

impl Prover {
	/// A new, idle prover.
	pub fn new() -> Prover {
		Prover {
			cancelled: Mutex::new(false),
			cond: Condvar::new(),
			computing: AtomicBool::new(false),
			waiting: AtomicBool::new(false),
			last_generated: Mutex::new(None),
		}
	}

	/// Whether a proof is currently being computed.
	pub fn is_computing(&self) -> bool {
		self.computing.load(Ordering::Relaxed)
	}

	/// Whether the engine is parked in a cancellable wait.
	pub fn is_waiting(&self) -> bool {
		self.waiting.load(Ordering::Relaxed)
	}

	/// Preempt the in-flight proof and any pre-proof wait. Observed at
	/// the next nonce-batch boundary.
	pub fn cancel(&self) {
		let mut cancelled = self.cancelled.lock().unwrap();
		*cancelled = true;
		self.cond.notify_all();
	}

	/// Sleep for the given number of seconds unless cancelled first.
	/// Returns false when the wait was cancelled. The waiting flag is
	/// raised under the cancellation lock, so once a caller observes it
	/// a `cancel` is guaranteed to wake the wait.
	pub fn wait_before_pow(&self, secs: u64) -> bool {
		let total = Duration::from_secs(secs);
		let started = Instant::now();
		let mut cancelled = self.cancelled.lock().unwrap();
		*cancelled = false;
		self.waiting.store(true, Ordering::Relaxed);
		let uninterrupted = loop {
			if *cancelled {
				*cancelled = false;
				break false;
			}
			let elapsed = started.elapsed();
			if elapsed >= total {
				break true;
			}
			let (guard, _) = self
				.cond
				.wait_timeout(cancelled, total - elapsed)
				.unwrap();
			cancelled = guard;
		};
		self.waiting.store(false, Ordering::Relaxed);
		uninterrupted
	}

	/// Block until the chain moves (any mutation cancels the prover) or
	/// the timeout elapses. Generation rounds that cannot proceed yet
	/// (no root block, not a member, difficulty out of reach) park here
	/// and re-check their preconditions afterwards.
	pub fn wait_for_continue(&self, secs: u64) {
		if !self.wait_before_pow(secs) {
			debug!("prover woken up by chain activity");
		}
	}

	/// Scan nonces until the block hash satisfies `difficulty`. Returns
	/// the proven block, or nothing when the scan was cancelled.
	pub fn prove(&self, mut block: Block, difficulty: u32) -> Result<Option<Block>, Error> {
		{
			let mut cancelled = self.cancelled.lock().unwrap();
			*cancelled = false;
		}
		self.computing.store(true, Ordering::Relaxed);

		// start away from zero so peers do not all scan the same range
		let mut nonce: u64 = u64::from(thread_rng().gen::<u32>());
		debug!(
			"looking for proof at level {} for block {}",
			difficulty, block.number
		);

		// how often to report scan progress
		let stat_interval = 10;
		let mut next_stat = Utc::now().timestamp() + stat_interval;
		loop {
			{
				let mut cancelled = self.cancelled.lock().unwrap();
				if *cancelled {
					*cancelled = false;
					self.computing.store(false, Ordering::Relaxed);
					info!("proof-of-work canceled at block {}", block.number);
					return Ok(None);
				}
			}
			for _ in 0..consensus::POW_NONCE_BATCH {
				block.nonce = nonce;
				let hash = block.compute_hash();
				if consensus::valid_pow(&hash, difficulty) {
					block.hash = hash;
					self.computing.store(false, Ordering::Relaxed);
					{
						let mut last = self.last_generated.lock().unwrap();
						*last = Some((block.number, block.hash.clone()));
					}
					info!(
						"found proof for block {} at level {}",
						block.stamp(),
						difficulty
					);
					return Ok(Some(block));
				}
				nonce = nonce.wrapping_add(1);
			}
			if Utc::now().timestamp() >= next_stat {
				debug!(
					"still scanning for block {} at level {}, nonce at {}",
					block.number, difficulty, nonce
				);
				next_stat = Utc::now().timestamp() + stat_interval;
			}
		}
	}

	/// Whether the last block this prover generated ended up flagged as
	/// part of a failed switch.
	pub fn last_generated_wrong(&self, store: &dyn ChainStore) -> Result<bool, Error> {
		let last = self.last_generated.lock().unwrap().clone();
		match last {
			Some((number, hash)) => Ok(store
				.absolute_block_by_number_and_hash(number, &hash)?
				.map(|b| b.wrong)
				.unwrap_or(false)),
			None => Ok(false),
		}
	}
}

impl Default for Prover {
	fn default() -> Prover {
		Prover::new()
	}
}
