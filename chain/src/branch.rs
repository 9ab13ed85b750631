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

//! Enumeration of the side branches anchored on the canonical chain.
//! Candidate heads for a chain switch are the tips of the longest of
//! those branches.

use crate::core::block::Block;
use crate::error::Error;
use crate::types::ChainStore;

/// Every longest side branch, each as an ascending run of side blocks
/// whose first block anchors on the canonical chain.
pub fn side_branches(store: &dyn ChainStore) -> Result<Vec<Vec<Block>>, Error> {
	let mut side = store.fork_blocks()?;
	side.sort_by_key(|b| b.number);

	// seed one branch per block whose predecessor is canonical, keep the
	// rest for attachment
	let mut branches: Vec<Vec<Block>> = vec![];
	let mut others: Vec<Block> = vec![];
	for b in side {
		let anchored = match b.number.checked_sub(1) {
			Some(prev_number) => store
				.block_by_number_and_hash(prev_number, &b.previous_hash)?
				.is_some(),
			None => false,
		};
		if anchored {
			branches.push(vec![b]);
		} else {
			others.push(b);
		}
	}

	// attach the remaining blocks in ascending order. A block extending
	// a tip grows the branch in place; a block attaching to an interior
	// position forks off a duplicate, the original stays intact so its
	// own tip can still grow. Duplicates join the pool before the next
	// block is considered.
	for other in others {
		let mut split_off: Vec<Vec<Block>> = vec![];
		for branch in branches.iter_mut() {
			let tip = match branch.last() {
				Some(tip) => tip.clone(),
				None => continue,
			};
			if other.number == tip.number + 1 && other.previous_hash == tip.hash {
				branch.push(other.clone());
			} else if branch.len() >= 2 {
				let first = branch[0].number;
				if other.number > first && ((other.number - first) as usize) < branch.len() {
					let depth = (other.number - first) as usize;
					if branch[depth - 1].hash == other.previous_hash {
						let mut duplicate = branch[..depth].to_vec();
						duplicate.push(other.clone());
						split_off.push(duplicate);
					}
				}
			}
		}
		branches.extend(split_off);
	}

	let longest = branches.iter().map(|b| b.len()).max().unwrap_or(0);
	Ok(branches.into_iter().filter(|b| b.len() == longest).collect())
}

/// Candidate heads for fork choice: the tip of every longest side
/// branch, with the current canonical head appended.
pub fn branches(store: &dyn ChainStore) -> Result<Vec<Block>, Error> {
	let mut tips: Vec<Block> = side_branches(store)?
		.into_iter()
		.filter_map(|branch| branch.into_iter().last())
		.collect();
	if let Some(head) = store.head()? {
		tips.push(head);
	}
	Ok(tips)
}
