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

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chain_test_helper::*;
use weft_chain::{Chain, ChainStore, ErrorKind, Stat};
use weft_core::block::Block;
use weft_core::tx::SourceKind;

#[test]
fn linear_extension_moves_the_head() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (_store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();
	assert_eq!(chain.current().unwrap().unwrap().number, 0);

	let mut prev = root;
	for n in 1..4 {
		let b = seal(next_block(&prev, &conf));
		let applied = chain.submit_block(b.clone(), true, false).unwrap().unwrap();
		assert_eq!(applied.number, n);

		// checking our new head
		let head = chain.current().unwrap().unwrap();
		assert_eq!(head.number, n);
		assert_eq!(head.hash, b.hash);
		assert_eq!(head.previous_hash, prev.hash);
		prev = b;
	}

	// every promoted block is reachable by height
	for n in 0..4 {
		assert_eq!(chain.promoted(n).unwrap().number, n);
	}
	assert_eq!(
		chain.promoted(42).unwrap_err().kind(),
		ErrorKind::BlockNotFound(42)
	);
}

#[test]
fn duplicate_submission_is_rejected() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (_store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();
	let b1 = seal(next_block(&root, &conf));
	chain.submit_block(b1.clone(), true, false).unwrap();

	let err = chain.submit_block(b1, true, false).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::AlreadyProcessed);
	let err = chain.submit_block(root, true, false).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::AlreadyProcessed);
	assert_eq!(chain.current().unwrap().unwrap().number, 1);
}

#[test]
fn submission_preempts_the_prover() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (_store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();

	let chain = Arc::new(chain);
	let worker = chain.clone();
	let handle = thread::spawn(move || {
		// a difficulty this high will never be met
		worker.prove(Block::empty(99, "XX"), u32::max_value())
	});
	while !chain.prover().is_computing() {
		thread::sleep(Duration::from_millis(10));
	}

	let b1 = seal(next_block(&root, &conf));
	chain.submit_block(b1, true, false).unwrap();

	// the accepted block cancelled the scan
	let outcome = handle.join().unwrap().unwrap();
	assert!(outcome.is_none());
}

#[test]
fn side_block_below_the_fork_window_is_rejected() {
	let _ = env_logger::try_init();
	let conf = conf();
	assert_eq!(conf.forksize, 10);
	let (store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();
	let mut prev = root;
	for _ in 0..20 {
		let b = seal(next_block(&prev, &conf));
		chain.submit_block(b.clone(), true, false).unwrap();
		prev = b;
	}

	// a variant of block 5: 20 - 5 + 1 = 16 deep, window is 10
	let mut stale = next_block(&store.get_block(4).unwrap(), &conf);
	stale.median_time += 7;
	let stale = seal(stale);
	let err = chain.submit_block(stale, true, true).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::OutOfForkWindow);

	// a recent variant is admitted as a side block
	let mut recent = next_block(&store.get_block(15).unwrap(), &conf);
	recent.median_time += 7;
	let recent = seal(recent);
	let side = chain.submit_block(recent.clone(), true, true).unwrap().unwrap();
	assert!(side.fork);
	assert!(store
		.absolute_block_by_number_and_hash(recent.number, &recent.hash)
		.unwrap()
		.is_some());
	// resubmitting the same side block records nothing new
	assert!(chain.submit_block(recent, true, true).unwrap().is_none());
}

#[test]
fn non_extending_block_needs_fork_permission() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (_store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();
	let b1 = seal(next_block(&root, &conf));
	chain.submit_block(b1.clone(), true, false).unwrap();

	// same height as b1, same parent, different content
	let mut rival = next_block(&root, &conf);
	rival.median_time += 7;
	let rival = seal(rival);
	let err = chain.submit_block(rival, true, false).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::ForkRejected);
	assert_eq!(chain.current().unwrap().unwrap().hash, b1.hash);
}

#[test]
fn dividend_block_pays_every_member() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();

	let mut b1 = next_block(&root, &conf);
	b1.dividend = Some(5);
	b1.unit_base = 2;
	let b1 = seal(b1);
	chain.submit_block(b1.clone(), true, false).unwrap();

	for pubkey in FOUNDERS.iter() {
		let sources = store.sources_of(pubkey).unwrap();
		assert_eq!(sources.len(), 1);
		let source = &sources[0];
		assert_eq!(source.kind, SourceKind::D);
		assert_eq!(source.amount, 5);
		assert_eq!(source.base, 2);
		assert_eq!(source.conditions, format!("SIG({})", pubkey));
		assert!(!source.consumed);
	}

	let head = chain.current().unwrap().unwrap();
	assert_eq!(head.monetary_mass, 15);
	assert_eq!(head.ud_time, root.median_time + conf.dt);
	assert_eq!(store.stat_blocks(Stat::Ud).unwrap(), vec![1]);
}

#[test]
fn revert_then_reapply_restores_the_head_state() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();

	let mut b1 = next_block(&root, &conf);
	b1.dividend = Some(5);
	b1.certifications.push(certification("alice", "bob", 0));
	let b1 = seal(b1);
	chain.submit_block(b1.clone(), true, false).unwrap();

	let head_before = chain.current().unwrap().unwrap();
	let links_before = store.valid_links().unwrap();
	let alice_sources = store.sources_of("alice").unwrap();
	assert_eq!(alice_sources.len(), 1);

	let reverted = chain.revert_current_block().unwrap();
	assert_eq!(reverted.number, 1);
	assert_eq!(chain.current().unwrap().unwrap().hash, root.hash);
	assert!(store.sources_of("alice").unwrap().is_empty());
	// the written certification and its link are gone, the root ones stay
	assert_eq!(store.valid_links().unwrap().len(), links_before.len() - 1);
	// the reverted block stays reachable on its side chain
	let side = store
		.absolute_block_by_number_and_hash(b1.number, &b1.hash)
		.unwrap()
		.unwrap();
	assert!(side.fork);

	chain.submit_block(b1, true, false).unwrap();
	assert_eq!(chain.current().unwrap().unwrap(), head_before);
	assert_eq!(store.valid_links().unwrap().len(), links_before.len());
	assert_eq!(store.sources_of("alice").unwrap(), alice_sources);
}

#[test]
fn bulk_application_matches_sequential_submission() {
	let _ = env_logger::try_init();
	let conf = conf();

	let root = root_block(&conf);
	let mut b1 = next_block(&root, &conf);
	b1.dividend = Some(5);
	let b1 = seal(b1);
	let mut b2 = next_block(&b1, &conf);
	b2.certifications.push(certification("bob", "carol", 1));
	let b2 = seal(b2);
	let b3 = seal(next_block(&b2, &conf));
	let blocks = vec![root, b1, b2, b3];

	let (seq_store, seq_chain) = new_chain(&conf);
	for b in &blocks {
		seq_chain.submit_block(b.clone(), true, false).unwrap();
	}

	let (bulk_store, bulk_chain) = new_chain(&conf);
	bulk_chain.save_blocks_in_main_branch(&blocks, 3).unwrap();

	assert_eq!(
		seq_chain.current().unwrap().unwrap(),
		bulk_chain.current().unwrap().unwrap()
	);
	for pubkey in FOUNDERS.iter() {
		assert_eq!(
			seq_store.sources_of(pubkey).unwrap(),
			bulk_store.sources_of(pubkey).unwrap()
		);
	}
	assert_eq!(
		seq_store.members().unwrap().len(),
		bulk_store.members().unwrap().len()
	);
	for stat in Stat::ALL.iter() {
		assert_eq!(
			seq_store.stat_blocks(*stat).unwrap(),
			bulk_store.stat_blocks(*stat).unwrap(),
			"diverging counter {:?}",
			stat
		);
	}
	assert_eq!(bulk_store.stat_blocks(Stat::Ud).unwrap(), vec![1]);
	assert_eq!(bulk_store.stat_blocks(Stat::Certs).unwrap(), vec![0, 2]);
	assert_eq!(bulk_store.parameters().unwrap(), seq_store.parameters().unwrap());
}

#[test]
fn ranged_queries_are_bounded() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (_store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();
	let b1 = seal(next_block(&root, &conf));
	chain.submit_block(b1, true, false).unwrap();

	assert_eq!(chain.blocks_between(0, 2).unwrap().len(), 2);
	assert_eq!(chain.blocks_between(0, 5000).unwrap().len(), 2);
	let err = chain.blocks_between(0, 5001).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::RangeTooLarge(5001));
}

#[test]
fn excluding_block_falls_back_to_a_sentinel() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (_store, chain) = new_chain(&conf);

	// no chain yet: the query cannot be answered and falls back
	let sentinel = chain.get_certifications_excluding_block();
	assert_eq!(sentinel.number, -1);
	assert!(sentinel.hash.is_empty());
}

#[test]
fn generation_fails_fast_without_participation_or_key() {
	let _ = env_logger::try_init();
	let mut conf = conf();
	let (_store, chain) = new_chain(&conf);
	// not configured to participate: give up immediately, no parking
	assert!(chain.start_generation().unwrap().is_none());
	assert!(!chain.prover().is_waiting());

	// participating but no keypair configured
	conf.participate = true;
	conf.pair = None;
	let (_store, chain) = new_chain(&conf);
	assert!(chain.start_generation().unwrap().is_none());
	assert!(!chain.prover().is_waiting());
}

// A round that cannot prove yet must park on the prover's cancellable
// wait; a chain mutation (here an explicit cancel) wakes it and the
// round comes back empty for the caller to retry.
fn expect_parked_generation(chain: Arc<Chain>) {
	let worker = chain.clone();
	let handle = thread::spawn(move || worker.start_generation());
	while !chain.prover().is_waiting() {
		thread::sleep(Duration::from_millis(10));
	}
	chain.prover().cancel();
	let outcome = handle.join().unwrap().unwrap();
	assert!(outcome.is_none());
	assert!(!chain.prover().is_waiting());
}

#[test]
fn generation_waits_for_the_root_block() {
	let _ = env_logger::try_init();
	let mut conf = conf();
	conf.participate = true;
	conf.pair = Some("bob".to_owned());
	let (_store, chain) = new_chain(&conf);
	expect_parked_generation(Arc::new(chain));
}

#[test]
fn generation_waits_until_membership() {
	let _ = env_logger::try_init();
	let mut conf = conf();
	conf.participate = true;
	conf.pair = Some("mallory".to_owned());
	let (_store, chain) = new_chain(&conf);
	chain.submit_block(root_block(&conf), true, false).unwrap();
	expect_parked_generation(Arc::new(chain));
}

#[test]
fn generation_proves_the_next_block() {
	let _ = env_logger::try_init();
	let mut conf = conf();
	conf.participate = true;
	conf.pair = Some("bob".to_owned());
	let (_store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();
	let b1 = seal(next_block(&root, &conf));
	chain.submit_block(b1, true, false).unwrap();

	let proven = chain.start_generation().unwrap().unwrap();
	assert_eq!(proven.number, 2);
	assert_eq!(proven.hash, proven.compute_hash());
	// the proven candidate goes back through regular admission
	chain.submit_block(proven, false, false).unwrap();
	assert_eq!(chain.current().unwrap().unwrap().number, 2);
}

#[test]
fn generation_backs_off_on_a_high_personalized_level() {
	let _ = env_logger::try_init();
	let mut conf = conf();
	conf.participate = true;
	// alice issued every recent block, her level is head.pow_min + 5
	conf.pair = Some("alice".to_owned());
	let (_store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();
	let mut prev = root;
	for _ in 0..5 {
		let b = seal(next_block(&prev, &conf));
		chain.submit_block(b.clone(), true, false).unwrap();
		prev = b;
	}
	expect_parked_generation(Arc::new(chain));
}

#[test]
fn requirements_of_a_founder() {
	let _ = env_logger::try_init();
	let conf = conf();
	let (_store, chain) = new_chain(&conf);

	let root = root_block(&conf);
	chain.submit_block(root.clone(), true, false).unwrap();
	let b1 = seal(next_block(&root, &conf));
	chain.submit_block(b1, true, false).unwrap();

	let reqs = chain.requirements_of_identity("alice").unwrap();
	assert_eq!(reqs.pubkey, "alice");
	assert_eq!(reqs.uid, "alice");
	assert!(!reqs.outdistanced);
	// certified by the two other founders at the root
	assert_eq!(reqs.certifications.len(), 2);
	assert!(reqs.certifications.iter().all(|c| c.expires_in > 0));
	assert!(reqs.membership_expires_in > 0);
	assert!(reqs.membership_pending_expires_in > 0);
}
