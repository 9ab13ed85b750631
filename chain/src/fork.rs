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

//! Fork choice: decide whether a side branch has outgrown the canonical
//! chain enough to switch onto it, and perform the switch by reverting
//! the head down to the fork point and reapplying the branch. A failed
//! switch is rolled back locally and the branch is marked wrong; the
//! submitter never sees it.

use crate::branch;
use crate::core::block::Block;
use crate::core::consensus;
use crate::error::{Error, ErrorKind};
use crate::pipe::{self, BlockContext};
use crate::types::{ChainConfig, ChainStore, Options, Rules};

/// Evaluate the switch policy against every eligible branch. Returns
/// whether the canonical head changed, so the caller can preempt any
/// in-flight proof-of-work.
pub fn try_to_fork(
	store: &dyn ChainStore,
	rules: &dyn Rules,
	conf: &ChainConfig,
	prev_current: &Block,
) -> Result<bool, Error> {
	eventually_switch_on_side_chain(store, rules, conf, prev_current)?;
	let head = store.head()?;
	Ok(match head {
		Some(h) => h.number != prev_current.number || h.hash != prev_current.hash,
		None => false,
	})
}

// A side branch is worth switching to when it runs ahead of the current
// head by the equivalent of SWITCH_ON_BRANCH_AHEAD_BY_X_MINUTES, both in
// blocks and in median time.
fn eventually_switch_on_side_chain(
	store: &dyn ChainStore,
	rules: &dyn Rules,
	conf: &ChainConfig,
	current: &Block,
) -> Result<(), Error> {
	let blocks_advance = consensus::SWITCH_ON_BRANCH_AHEAD_BY_X_MINUTES * 60 / conf.avg_gen_time;
	let time_advance = (consensus::SWITCH_ON_BRANCH_AHEAD_BY_X_MINUTES * 60) as i64;

	let candidates: Vec<Block> = branch::branches(store)?
		.into_iter()
		.filter(|p| p.number != current.number || p.hash != current.hash)
		.filter(|p| {
			p.number >= current.number + blocks_advance
				&& p.median_time - current.median_time >= time_advance
		})
		.collect();

	for candidate in candidates {
		// the head may have moved on a previous iteration, re-read it
		let current = match store.head()? {
			Some(c) => c,
			None => return Ok(()),
		};
		let side_chain = whole_fork_branch(store, &candidate)?;
		let base = match side_chain.first() {
			Some(b) if b.number > 0 => b.number,
			// unusable: dangling, or anchored below the root
			_ => continue,
		};
		match switch_to(store, rules, conf, &side_chain) {
			Ok(()) => info!(
				"switched on fork branch, new head {}",
				candidate.stamp()
			),
			Err(e) => {
				warn!(
					"fork switch on {} failed: {}, restoring previous chain",
					candidate.stamp(),
					e
				);
				if let Err(e) = restore(store, rules, conf, &current, base) {
					error!("could not restore chain after failed switch: {}", e);
				}
				for b in &side_chain {
					if let Err(e) = store.set_side_block_wrong(b.number, &b.hash) {
						error!("could not mark side block {} wrong: {}", b.stamp(), e);
					}
				}
			}
		}
	}
	Ok(())
}

/// The full side branch ending at `tip`, ascending: walked backward
/// through side records until the predecessor sits on the canonical
/// chain. The canonical anchor itself is not included; a branch whose
/// predecessor cannot be found at all is unusable and comes back empty.
pub fn whole_fork_branch(store: &dyn ChainStore, tip: &Block) -> Result<Vec<Block>, Error> {
	let mut chain: Vec<Block> = vec![];
	let mut cursor = match store.absolute_block_by_number_and_hash(tip.number, &tip.hash)? {
		Some(b) => b,
		None => return Ok(vec![]),
	};
	while cursor.fork {
		chain.push(cursor.clone());
		if cursor.number == 0 {
			break;
		}
		match store.absolute_block_by_number_and_hash(cursor.number - 1, &cursor.previous_hash)? {
			Some(prev) => {
				if !prev.fork {
					break;
				}
				cursor = prev;
			}
			None => {
				chain.clear();
				break;
			}
		}
	}
	chain.reverse();
	Ok(chain)
}

/// Revert canonical blocks until the head sits at the given height.
pub fn revert_to_block(
	store: &dyn ChainStore,
	rules: &dyn Rules,
	conf: &ChainConfig,
	number: u64,
) -> Result<(), Error> {
	loop {
		let head = store
			.head()?
			.ok_or_else(|| Error::from(ErrorKind::Other("no head left to revert".to_owned())))?;
		if head.number <= number {
			return Ok(());
		}
		let ctx = BlockContext {
			opts: Options::NONE,
			store,
			rules,
			conf,
		};
		pipe::revert_block(&ctx)?;
	}
}

// Replace the canonical suffix above the branch base with the branch,
// validating every block on the way in.
fn switch_to(
	store: &dyn ChainStore,
	rules: &dyn Rules,
	conf: &ChainConfig,
	side_chain: &[Block],
) -> Result<(), Error> {
	revert_to_block(store, rules, conf, side_chain[0].number - 1)?;
	let ctx = BlockContext {
		opts: Options::NONE,
		store,
		rules,
		conf,
	};
	for b in side_chain {
		let mut incoming = b.clone();
		incoming.fork = false;
		incoming.wrong = false;
		pipe::check_block(&incoming, &ctx)?;
		pipe::apply_block(&incoming, &ctx)?;
	}
	Ok(())
}

// Put the chain that was canonical before a failed switch back in place:
// the reverted blocks are side records now, walk them from the old head
// and reapply them over their common base.
fn restore(
	store: &dyn ChainStore,
	rules: &dyn Rules,
	conf: &ChainConfig,
	previous_head: &Block,
	base: u64,
) -> Result<(), Error> {
	let reverted = whole_fork_branch(store, previous_head)?;
	let reverted_base = match reverted.first() {
		Some(b) if b.number > 0 => b.number,
		_ => {
			return Err(ErrorKind::Other(format!(
				"previous chain ending at {} is gone",
				previous_head.stamp()
			))
			.into());
		}
	};
	revert_to_block(store, rules, conf, reverted_base.min(base) - 1)?;
	let ctx = BlockContext {
		// these blocks were canonical moments ago, structure is enough
		opts: Options::SKIP_POW,
		store,
		rules,
		conf,
	};
	for b in &reverted {
		let mut back = b.clone();
		back.fork = false;
		back.wrong = false;
		pipe::apply_block(&back, &ctx)?;
	}
	Ok(())
}
