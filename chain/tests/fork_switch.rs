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

mod chain_test_helper;

use chain_test_helper::*;
use weft_chain::{Chain, ChainConfig, ChainStore};
use weft_core::block::Block;

// The guards with avg_gen_time = 300: a branch must be 6 blocks and
// 1800 seconds of median time ahead of the head before a switch.

fn build_main(chain: &Chain, conf: &ChainConfig, height: u64) -> Vec<Block> {
	let root = root_block(conf);
	chain.submit_block(root.clone(), true, false).unwrap();
	let mut blocks = vec![root];
	for _ in 0..height {
		let b = seal(next_block(blocks.last().unwrap(), conf));
		chain.submit_block(b.clone(), true, false).unwrap();
		blocks.push(b);
	}
	blocks
}

// A rival branch forking off `anchor`, issued by bob, with the given
// median-time step between blocks.
fn side_blocks(anchor: &Block, conf: &ChainConfig, tip_number: u64, step: i64) -> Vec<Block> {
	let mut blocks: Vec<Block> = vec![];
	let mut prev = anchor.clone();
	for _ in anchor.number..tip_number {
		let mut b = next_block(&prev, conf);
		b.issuer = FOUNDERS[1].to_owned();
		b.median_time = prev.median_time + step;
		let b = seal(b);
		blocks.push(b.clone());
		prev = b;
	}
	blocks
}

fn submit_all(chain: &Chain, blocks: &[Block]) {
	for b in blocks {
		chain.submit_block(b.clone(), true, true).unwrap();
	}
}

#[test]
fn switch_happens_once_the_branch_is_far_enough_ahead() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (store, chain) = new_chain(&conf);
	let main = build_main(&chain, &conf, 4);
	let head = chain.current().unwrap().unwrap();

	// a rival branch anchored at #2, on the same schedule
	let rival = side_blocks(&main[2], &conf, 10, 300);

	// up to #9 the branch is only 5 blocks and 1500s ahead: no switch
	submit_all(&chain, &rival[..7]);
	assert_eq!(chain.current().unwrap().unwrap(), head);

	// #10 makes it 6 blocks and 1800s ahead: the chain switches
	submit_all(&chain, &rival[7..]);
	let new_head = chain.current().unwrap().unwrap();
	assert_eq!(new_head.number, 10);
	assert_eq!(new_head.hash, rival.last().unwrap().hash);

	// the rival blocks are canonical now, the old suffix is on the side
	for b in &rival {
		assert_eq!(chain.promoted(b.number).unwrap().hash, b.hash);
		let absolute = store
			.absolute_block_by_number_and_hash(b.number, &b.hash)
			.unwrap()
			.unwrap();
		assert!(!absolute.fork);
	}
	for b in &main[3..] {
		let absolute = store
			.absolute_block_by_number_and_hash(b.number, &b.hash)
			.unwrap()
			.unwrap();
		assert!(absolute.fork);
	}
}

#[test]
fn no_switch_without_enough_median_time_ahead() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (_store, chain) = new_chain(&conf);
	let main = build_main(&chain, &conf, 4);
	let head = chain.current().unwrap().unwrap();

	// 6 blocks ahead but crawling: 8 * 100s keeps the tip 200s ahead
	let rival = side_blocks(&main[2], &conf, 10, 100);
	submit_all(&chain, &rival);
	assert_eq!(chain.current().unwrap().unwrap(), head);
}

#[test]
fn no_switch_without_enough_blocks_ahead() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (_store, chain) = new_chain(&conf);
	let main = build_main(&chain, &conf, 4);
	let head = chain.current().unwrap().unwrap();

	// hours ahead in median time but only 4 blocks ahead
	let rival = side_blocks(&main[2], &conf, 8, 1000);
	submit_all(&chain, &rival);
	assert_eq!(chain.current().unwrap().unwrap(), head);
}

#[test]
fn failed_switch_restores_the_previous_chain_exactly() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (store, chain) = new_chain(&conf);
	let main = build_main(&chain, &conf, 4);
	let head = chain.current().unwrap().unwrap();
	let members_before = store.members().unwrap();

	// rival branch long enough to switch, with a corrupt block #7
	let mut rival = side_blocks(&main[2], &conf, 10, 300);
	rival[4].hash = "0BAD".to_owned();
	for idx in 5..8 {
		let prev_hash = rival[idx - 1].hash.clone();
		rival[idx].previous_hash = prev_hash;
		let resealed = seal(rival[idx].clone());
		rival[idx] = resealed;
	}

	// no submission errors: the failed switch is recovered locally
	submit_all(&chain, &rival);

	// the old head is back, exactly
	assert_eq!(chain.current().unwrap().unwrap(), head);
	for b in &main {
		assert_eq!(chain.promoted(b.number).unwrap().hash, b.hash);
	}
	assert_eq!(store.members().unwrap(), members_before);

	// the whole rival branch is flagged wrong
	for b in &rival {
		let side = store
			.absolute_block_by_number_and_hash(b.number, &b.hash)
			.unwrap()
			.unwrap();
		assert!(side.fork);
		assert!(side.wrong, "side block {} not flagged", b.number);
	}
}

// The fork store keeps rivals only as long as they could still win.
#[test]
fn memory_maintenance_drops_stale_side_records() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (store, chain) = new_chain(&conf);
	let main = build_main(&chain, &conf, 4);

	let mut stale = next_block(&main[3], &conf);
	stale.median_time += 7;
	let stale = seal(stale);
	chain.submit_block(stale.clone(), true, true).unwrap();
	assert_eq!(store.fork_blocks().unwrap().len(), 1);

	// grow the chain far past the hot window
	let mut prev = chain.current().unwrap().unwrap();
	for _ in 0..210 {
		let b = seal(next_block(&prev, &conf));
		chain.submit_block(b.clone(), true, false).unwrap();
		prev = b;
	}
	let moved = store.migrate_old_blocks().unwrap();
	assert!(moved > 0);
	assert!(store.fork_blocks().unwrap().is_empty());
}
