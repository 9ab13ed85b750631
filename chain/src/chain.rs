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

//! Facade and handler for the rest of the blockchain implementation and
//! mostly the admission pipeline. Every chain-mutating operation runs on
//! a single-writer lane so submitters are serialized; reads go straight
//! to the store and may observe the state before or after any single
//! write, never in between.

use std::slice;
use std::sync::{Arc, Mutex, RwLock};

use lru_cache::LruCache;

use crate::branch;
use crate::bulk;
use crate::cleaner::{self, StopState};
use crate::core::block::Block;
use crate::core::consensus::MAX_BLOCKS_BETWEEN;
use crate::error::{Error, ErrorKind};
use crate::fork;
use crate::pipe::{self, BlockContext};
use crate::prover::Prover;
use crate::requirements::{self, IdentityRequirements};
use crate::types::{
	ChainAdapter, ChainConfig, ChainStore, ExcludingBlockRef, Generator, Options, Rules,
};
use crate::core::wot::Certification;

/// How many recently admitted blockstamps are kept for duplicate
/// fast-rejection.
const HASHES_CACHE_SIZE: usize = 200;

/// Facade to the blockchain admission pipeline and storage. Owns the
/// single-writer lane every chain mutation must go through, and the
/// proof-of-work prover that mutations preempt.
pub struct Chain {
	store: Arc<dyn ChainStore>,
	rules: Arc<dyn Rules>,
	generator: Arc<dyn Generator>,
	adapter: Arc<dyn ChainAdapter>,
	conf: ChainConfig,

	// the single-writer FIFO lane; held for the whole of every mutating
	// task, including all fork-switch sub-steps
	lane: Mutex<()>,
	prover: Prover,
	block_hashes_cache: RwLock<LruCache<String, bool>>,
	cleaner: Mutex<Option<Arc<StopState>>>,
}

impl Chain {
	/// Wire the service to its collaborators.
	pub fn new(
		store: Arc<dyn ChainStore>,
		rules: Arc<dyn Rules>,
		generator: Arc<dyn Generator>,
		adapter: Arc<dyn ChainAdapter>,
		conf: ChainConfig,
	) -> Chain {
		Chain {
			store,
			rules,
			generator,
			adapter,
			conf,
			lane: Mutex::new(()),
			prover: Prover::new(),
			block_hashes_cache: RwLock::new(LruCache::new(HASHES_CACHE_SIZE)),
			cleaner: Mutex::new(None),
		}
	}

	fn ctx(&self, opts: Options) -> BlockContext<'_> {
		BlockContext {
			opts,
			store: &*self.store,
			rules: &*self.rules,
			conf: &self.conf,
		}
	}

	/// The storage this chain materializes into.
	pub fn store(&self) -> &dyn ChainStore {
		&*self.store
	}

	/// The proof-of-work engine.
	pub fn prover(&self) -> &Prover {
		&self.prover
	}

	/// The current head of the canonical chain, none before the root.
	pub fn current(&self) -> Result<Option<Block>, Error> {
		self.store.head()
	}

	/// Canonical block at the given height.
	pub fn promoted(&self, number: u64) -> Result<Block, Error> {
		self.store.get_block(number)
	}

	/// Validate a block against the rule set without touching the chain.
	pub fn check_block(&self, block: &Block, opts: Options) -> Result<(), Error> {
		pipe::check_block(block, &self.ctx(opts))
	}

	/// Candidate heads for fork choice: the tip of every longest side
	/// branch plus the current head.
	pub fn branches(&self) -> Result<Vec<Block>, Error> {
		branch::branches(&*self.store)
	}

	/// Ascending canonical slice of at most `count` blocks starting at
	/// `from`. Bounded to keep a single query from walking the whole
	/// chain.
	pub fn blocks_between(&self, from: u64, count: u64) -> Result<Vec<Block>, Error> {
		if count > MAX_BLOCKS_BETWEEN {
			return Err(ErrorKind::RangeTooLarge(count).into());
		}
		self.store.blocks_between(from, count)
	}

	/// Submit a candidate block. A block extending the head is applied
	/// to the canonical chain; any other block is recorded on its side
	/// chain when `fork_allowed`, which may in turn trigger a chain
	/// switch. Returns the applied or recorded block.
	pub fn submit_block(
		&self,
		block: Block,
		do_check: bool,
		fork_allowed: bool,
	) -> Result<Option<Block>, Error> {
		let _lane = self.lane.lock().unwrap();

		let mut block = block;
		fingerprint_tx_issuers(&mut block)?;
		let stamp = block.stamp();

		// cheap duplicate rejection first, then the authoritative lookup
		{
			let mut cache = self.block_hashes_cache.write().unwrap();
			if cache.contains_key(&stamp) {
				return Err(ErrorKind::AlreadyProcessed.into());
			}
		}
		if self
			.store
			.block_by_number_and_hash(block.number, &block.hash)?
			.is_some()
		{
			return Err(ErrorKind::AlreadyProcessed.into());
		}

		let current = self.store.head()?;
		let follows_current = match current {
			None => block.number == 0,
			Some(ref c) => block.number == c.number + 1 && block.previous_hash == c.hash,
		};

		if follows_current {
			let opts = if do_check { Options::NONE } else { Options::SKIP_POW };
			let ctx = self.ctx(opts);
			if do_check {
				pipe::check_block(&block, &ctx)?;
			}
			let applied = pipe::apply_block(&block, &ctx)?;
			bulk::push_stats(slice::from_ref(&applied), &*self.store)?;
			{
				let mut cache = self.block_hashes_cache.write().unwrap();
				cache.insert(stamp, true);
			}
			info!("block {} added to the chain", applied.stamp());
			self.adapter.block_accepted(&applied);
			self.prover.cancel();
			Ok(Some(applied))
		} else if fork_allowed {
			let current = match current {
				Some(c) => c,
				None => return Err(ErrorKind::ForkRejected.into()),
			};
			if block.number <= current.number
				&& current.number - block.number + 1 >= self.conf.forksize
			{
				return Err(ErrorKind::OutOfForkWindow.into());
			}
			let side = if self
				.store
				.absolute_block_by_number_and_hash(block.number, &block.hash)?
				.is_none()
			{
				let recorded = pipe::apply_side_block(&block, &self.ctx(Options::NONE))?;
				Some(recorded)
			} else {
				None
			};
			if fork::try_to_fork(&*self.store, &*self.rules, &self.conf, &current)? {
				// a switch reverted canonical blocks; their stamps must
				// not keep fast-rejecting resubmission
				self.block_hashes_cache.write().unwrap().clear();
				self.prover.cancel();
			}
			Ok(side)
		} else {
			Err(ErrorKind::ForkRejected.into())
		}
	}

	/// Undo the canonical head. The reverted block stays reachable as a
	/// side block.
	pub fn revert_current_block(&self) -> Result<Block, Error> {
		let _lane = self.lane.lock().unwrap();
		let reverted = pipe::revert_block(&self.ctx(Options::NONE))?;
		self.block_hashes_cache
			.write()
			.unwrap()
			.remove(&reverted.stamp());
		self.prover.cancel();
		Ok(reverted)
	}

	/// Apply a contiguous ascending main-chain segment, the initial-sync
	/// fast path.
	pub fn save_blocks_in_main_branch(
		&self,
		blocks: &[Block],
		target_last_number: u64,
	) -> Result<(), Error> {
		let _lane = self.lane.lock().unwrap();
		bulk::save_blocks_in_main_branch(blocks, target_last_number, &self.ctx(Options::SYNC))
	}

	/// Persist the currency parameters carried by a root block.
	pub fn save_parameters_for_root_block(&self, block: &Block) -> Result<(), Error> {
		pipe::save_parameters_for_root_block(block, &self.ctx(Options::NONE))
	}

	/// Expire certifications, memberships and links aged past their
	/// validity windows as of the given canonical block.
	pub fn obsolete_in_main_branch(&self, block: &Block) -> Result<(), Error> {
		let _lane = self.lane.lock().unwrap();
		pipe::obsolete_in_main_branch(block, &self.ctx(Options::NONE))
	}

	/// Requirements status of one identity against the current head.
	pub fn requirements_of_identity(&self, pubkey: &str) -> Result<IdentityRequirements, Error> {
		let current = self.store.head()?;
		requirements::requirements_of_identity(
			pubkey,
			current.as_ref(),
			&*self.store,
			&*self.rules,
			&*self.generator,
			&self.conf,
		)
	}

	/// Requirements status of several identities against the current
	/// head.
	pub fn requirements_of_identities(
		&self,
		pubkeys: &[String],
	) -> Result<Vec<IdentityRequirements>, Error> {
		let mut all = Vec::with_capacity(pubkeys.len());
		for pubkey in pubkeys {
			all.push(self.requirements_of_identity(pubkey)?);
		}
		Ok(all)
	}

	/// Non-expired certifications received by the given public key.
	pub fn get_valid_certs(&self, pubkey: &str) -> Result<Vec<Certification>, Error> {
		self.store.valid_certs_to(pubkey)
	}

	/// The block below which certifications no longer count. Storage
	/// trouble is swallowed into the `number: -1` sentinel; callers only
	/// need a best-effort answer here.
	pub fn get_certifications_excluding_block(&self) -> ExcludingBlockRef {
		match self
			.store
			.certification_excluding_block(self.conf.sig_validity)
		{
			Ok(b) => ExcludingBlockRef {
				number: b.number as i64,
				hash: b.hash,
			},
			Err(_) => ExcludingBlockRef {
				number: -1,
				hash: String::new(),
			},
		}
	}

	/// A hand-made root block, only before the chain starts.
	pub fn generate_manual_root(&self) -> Result<Block, Error> {
		if self.store.head()?.is_some() {
			return Err(ErrorKind::Other("the root block already exists".to_owned()).into());
		}
		self.generator.manual_root(&self.conf, &*self.store)
	}

	/// The next candidate block, assembled from the pending pools.
	pub fn generate_next(&self) -> Result<Block, Error> {
		self.generator.next_block(&self.conf, &*self.store)
	}

	/// Prove the given candidate block, or the next generated one, at
	/// the given difficulty, or the issuer's personalized level. Returns
	/// nothing when the proof was cancelled under way.
	pub fn make_next_block(
		&self,
		candidate: Option<Block>,
		trial: Option<u32>,
	) -> Result<Option<Block>, Error> {
		let block = match candidate {
			Some(b) => b,
			None => self.generator.next_block(&self.conf, &*self.store)?,
		};
		let difficulty = match trial {
			Some(t) => t,
			None => match self.conf.pair {
				Some(ref pubkey) => self.rules.trial_level(pubkey, &self.conf, &*self.store)?,
				None => block.pow_min,
			},
		};
		self.prover.prove(block, difficulty)
	}

	/// Prove the given block at the given difficulty.
	pub fn prove(&self, block: Block, difficulty: u32) -> Result<Option<Block>, Error> {
		self.prover.prove(block, difficulty)
	}

	/// One round of proof-of-work generation. An unmet precondition is
	/// not an error: a node that cannot prove at all (not participating,
	/// no key) returns straight away, while one that merely cannot prove
	/// yet (no root, not a member, difficulty out of reach) parks on the
	/// prover until the chain moves, then returns so the caller can
	/// re-check.
	pub fn start_generation(&self) -> Result<Option<Block>, Error> {
		if !self.conf.participate {
			debug!("pow: not configured to participate");
			return Ok(None);
		}
		let self_pubkey = match self.conf.pair {
			Some(ref pubkey) => pubkey.clone(),
			None => {
				debug!("pow: no keypair configured");
				return Ok(None);
			}
		};
		let current = match self.store.head()? {
			Some(c) => c,
			None => {
				info!("pow: waiting for the root block");
				self.prover.wait_for_continue(self.conf.avg_gen_time);
				return Ok(None);
			}
		};
		if !self.store.is_member(&self_pubkey)? {
			info!("pow: {} is not a member, waiting", self_pubkey);
			self.prover.wait_for_continue(self.conf.avg_gen_time);
			return Ok(None);
		}
		if current.issuer == self_pubkey && self.conf.pow_delay > 0 {
			debug!(
				"pow: the last block was ours, holding off for {}s",
				self.conf.pow_delay
			);
			if !self.prover.wait_before_pow(self.conf.pow_delay) {
				info!("pow: hold-off canceled");
				return Ok(None);
			}
		}
		let trial = self
			.rules
			.trial_level(&self_pubkey, &self.conf, &*self.store)?;
		if trial > current.pow_min + 2 {
			info!(
				"pow: personalized level {} too far above the common level {}, waiting",
				trial, current.pow_min
			);
			self.prover.wait_for_continue(self.conf.avg_gen_time);
			return Ok(None);
		}
		let candidate = if self.prover.last_generated_wrong(&*self.store)? {
			self.generator.next_empty_block(&self.conf, &*self.store)?
		} else {
			self.generator.next_block(&self.conf, &*self.store)?
		};
		self.make_next_block(Some(candidate), Some(trial))
	}

	/// Preempt any in-flight proof so a queued mutation can be processed;
	/// the generation loop picks itself back up afterwards.
	pub fn stop_pow_then_process_and_restart_pow(&self) {
		debug!("pow: interrupted for incoming chain work");
		self.prover.cancel();
	}

	/// Start the periodic old-block migration, if not already running.
	pub fn regular_clean_memory(&self) {
		let mut guard = self.cleaner.lock().unwrap();
		if let Some(ref stop) = *guard {
			if !stop.is_stopped() {
				return;
			}
		}
		let stop = Arc::new(StopState::new());
		cleaner::run_clean_memory(self.store.clone(), stop.clone());
		*guard = Some(stop);
	}

	/// Stop the periodic old-block migration.
	pub fn stop_clean_memory(&self) {
		if let Some(stop) = self.cleaner.lock().unwrap().take() {
			stop.stop();
		}
	}
}

// Denormalize the issuer public key onto every transaction input so
// source consumption can be checked per key later on.
fn fingerprint_tx_issuers(block: &mut Block) -> Result<(), Error> {
	for tx in &mut block.transactions {
		for input in &mut tx.inputs {
			match tx.issuers.get(input.issuer_index) {
				Some(pubkey) => input.pubkey = pubkey.clone(),
				None => {
					return Err(ErrorKind::InvalidBlock(format!(
						"transaction {} input draws from unknown issuer {}",
						tx.hash, input.issuer_index
					))
					.into());
				}
			}
		}
	}
	Ok(())
}
