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

//! Common helpers for chain integration tests: block builders over a
//! three-founder test currency, a stub generator, and a chain wired to
//! the in-memory store.

#![allow(dead_code)]

use std::sync::Arc;

use weft_chain::rules::StandardRules;
use weft_chain::store::MemStore;
use weft_chain::{Chain, ChainConfig, ChainStore, Error, Generator, NoopAdapter, PreJoinData};
use weft_core::block::Block;
use weft_core::wot::{Certification, Identity, Membership, MembershipKind};

/// Median time of the root block in every fixture.
pub const T0: i64 = 1_500_000_000;

/// Founding members of the test currency.
pub const FOUNDERS: [&str; 3] = ["alice", "bob", "carol"];

/// Test configuration: a small fork window so rejection is easy to hit.
pub fn conf() -> ChainConfig {
	ChainConfig {
		forksize: 10,
		avg_gen_time: 300,
		..ChainConfig::default()
	}
}

/// Sign and hash a finished block.
pub fn seal(mut b: Block) -> Block {
	b.signature = "TESTSIG".to_owned();
	b.hash = b.compute_hash();
	b
}

/// A joining membership document.
pub fn membership(pubkey: &str, number: u64, block_hash: &str) -> Membership {
	Membership {
		issuer: pubkey.to_owned(),
		kind: MembershipKind::Join,
		number,
		block_hash: block_hash.to_owned(),
		sig: "MSIG".to_owned(),
		median_time: 0,
		written_on: 0,
		expired: false,
	}
}

/// A certification document anchored at the given block.
pub fn certification(from: &str, to: &str, block_number: u64) -> Certification {
	Certification {
		from: from.to_owned(),
		to: to.to_owned(),
		block_number,
		sig: "CSIG".to_owned(),
		timestamp: 0,
		written_on: 0,
		expired: false,
	}
}

/// The root block of the test currency: three founders, no dividend.
pub fn root_block(conf: &ChainConfig) -> Block {
	let mut b = Block::empty(0, "");
	b.currency = conf.currency.clone();
	b.issuer = FOUNDERS[0].to_owned();
	b.median_time = T0;
	b.parameters = Some("ud0:5;dt:86400;sigValidity:63115200".to_owned());
	b.members_count = FOUNDERS.len() as u64;
	for pubkey in FOUNDERS.iter() {
		b.identities.push(Identity::new(pubkey, pubkey, "0-ROOT", "ISIG"));
		b.joiners.push(membership(pubkey, 0, ""));
	}
	for from in FOUNDERS.iter() {
		for to in FOUNDERS.iter().filter(|to| to != &from) {
			b.certifications.push(certification(from, to, 0));
		}
	}
	seal(b)
}

/// An unsealed empty block extending `prev` on the regular schedule.
pub fn next_block(prev: &Block, conf: &ChainConfig) -> Block {
	let mut b = Block::empty(prev.number + 1, &prev.hash);
	b.currency = conf.currency.clone();
	b.issuer = FOUNDERS[0].to_owned();
	b.median_time = prev.median_time + conf.avg_gen_time as i64;
	b.members_count = prev.members_count;
	b
}

/// Stub generator: empty candidate blocks, pre-join data straight from
/// the written indices, no pending documents.
pub struct TestGenerator;

impl Generator for TestGenerator {
	fn manual_root(&self, conf: &ChainConfig, _store: &dyn ChainStore) -> Result<Block, Error> {
		Ok(root_block(conf))
	}

	fn next_block(&self, conf: &ChainConfig, store: &dyn ChainStore) -> Result<Block, Error> {
		self.next_empty_block(conf, store)
	}

	fn next_empty_block(
		&self,
		conf: &ChainConfig,
		store: &dyn ChainStore,
	) -> Result<Block, Error> {
		let head = store.head()?.ok_or_else(|| {
			Error::from(weft_chain::ErrorKind::Other("no head to build on".to_owned()))
		})?;
		Ok(seal(next_block(&head, conf)))
	}

	fn pre_join_data(&self, pubkey: &str, store: &dyn ChainStore) -> Result<PreJoinData, Error> {
		let identity = store
			.identity(pubkey)?
			.unwrap_or_else(|| Identity::new(pubkey, pubkey, "0-ROOT", "ISIG"));
		Ok(PreJoinData {
			was_member: identity.was_member,
			current_msn: identity.ms_number,
			identity,
		})
	}

	fn compute_new_certs(
		&self,
		_target_number: u64,
		_pubkeys: &[String],
		_store: &dyn ChainStore,
	) -> Result<Vec<Certification>, Error> {
		Ok(vec![])
	}

	fn new_certs_to_links(&self, _certs: &[Certification]) -> Vec<weft_core::wot::Link> {
		vec![]
	}
}

/// A chain over a fresh in-memory store, with the standard rules and the
/// stub generator.
pub fn new_chain(conf: &ChainConfig) -> (Arc<MemStore>, Chain) {
	let store = Arc::new(MemStore::new());
	let chain = Chain::new(
		store.clone(),
		Arc::new(StandardRules),
		Arc::new(TestGenerator),
		Arc::new(NoopAdapter {}),
		conf.clone(),
	);
	(store, chain)
}
