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

//! Bulk application of a contiguous main-chain segment, the fast path
//! used by initial sync: derived fields and indices are computed in one
//! pass over the segment, blocks land in the store as a single bunch and
//! the per-block activity counters are pushed at the end.

use std::collections::HashMap;

use crate::core::block::Block;
use crate::error::{Error, ErrorKind};
use crate::pipe::{self, BlockContext};
use crate::types::{ChainStore, Stat};

/// Apply a contiguous ascending segment of main-chain blocks.
/// `target_last_number` is the height sync is aiming for, used for
/// progress reporting only.
pub fn save_blocks_in_main_branch(
	blocks: &[Block],
	target_last_number: u64,
	ctx: &BlockContext<'_>,
) -> Result<(), Error> {
	let first = match blocks.first() {
		Some(b) => b,
		None => return Ok(()),
	};
	for pair in blocks.windows(2) {
		if pair[1].number != pair[0].number + 1 {
			return Err(ErrorKind::InvalidBlock(format!(
				"segment is not contiguous at block {}",
				pair[1].number
			))
			.into());
		}
	}
	if first.number == 0 {
		pipe::save_parameters_for_root_block(first, ctx)?;
	}

	// enrich and index block by block; later blocks of the segment may
	// reference earlier ones before they hit the store, hence the local
	// cache in front of it
	let mut cache: HashMap<u64, Block> = HashMap::new();
	let mut enriched: Vec<Block> = Vec::with_capacity(blocks.len());
	for (i, b) in blocks.iter().enumerate() {
		let prev = if i > 0 {
			Some(enriched[i - 1].clone())
		} else if b.number > 0 {
			Some(ctx.store.get_block(b.number - 1)?)
		} else {
			None
		};
		let e = pipe::enrich(b, prev.as_ref(), ctx.conf);
		let store = ctx.store;
		let delta = {
			let resolver = |n: u64| -> Result<Option<Block>, Error> {
				if let Some(cached) = cache.get(&n) {
					return Ok(Some(cached.clone()));
				}
				store.get_block_or_null(n)
			};
			pipe::index_delta(&e, store, ctx.conf, &resolver)?
		};
		store.apply_index(e.number, &delta)?;
		cache.insert(e.number, e.clone());
		enriched.push(e);
	}

	ctx.store.save_bunch(&enriched)?;
	let last = enriched.last().map(|b| b.number).unwrap_or(0);
	debug!(
		"main branch extended with {} blocks, at {} / {}",
		enriched.len(),
		last,
		target_last_number
	);
	push_stats(&enriched, ctx.store)
}

/// Record every block of the batch against the activity counters it
/// triggers.
pub fn push_stats(blocks: &[Block], store: &dyn ChainStore) -> Result<(), Error> {
	for stat in Stat::ALL.iter() {
		for b in blocks {
			if stat.triggered(b) {
				store.push_stat(*stat, b.number)?;
			}
		}
	}
	Ok(())
}
