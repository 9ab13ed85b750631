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

//! Per-identity membership status against the current head: what an
//! identity still needs, or still has, to be (or stay) a member.

use crate::core::block::Block;
use crate::error::Error;
use crate::types::{ChainConfig, ChainStore, Generator, Rules};

/// One incoming certification and the time it has left.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CertificationStatus {
	/// Public key of the certifier.
	pub from: String,
	/// Public key of the certified identity.
	pub to: String,
	/// Validity origin of the certification.
	pub timestamp: i64,
	/// Seconds before the certification expires, floored at zero.
	pub expires_in: i64,
}

/// Requirements status of one identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IdentityRequirements {
	/// Public key of the identity.
	pub pubkey: String,
	/// Unique identifier of the identity.
	pub uid: String,
	/// Blockstamp the identity was signed against.
	pub timestamp: String,
	/// Whether the identity would sit too far from some member.
	pub outdistanced: bool,
	/// Incoming certifications, written and provisional.
	pub certifications: Vec<CertificationStatus>,
	/// Seconds before the latest pending join expires, zero when none.
	pub membership_pending_expires_in: i64,
	/// Seconds before the current membership expires, zero when none.
	pub membership_expires_in: i64,
}

/// Evaluate the requirements of one identity against the given head.
pub fn requirements_of_identity(
	pubkey: &str,
	current: Option<&Block>,
	store: &dyn ChainStore,
	rules: &dyn Rules,
	generator: &dyn Generator,
	conf: &ChainConfig,
) -> Result<IdentityRequirements, Error> {
	let pre_join = generator.pre_join_data(pubkey, store)?;
	let current_time = current.map(|c| c.median_time).unwrap_or(0);
	let next_number = current.map(|c| c.number + 1).unwrap_or(0);

	// certifications the pools would add if the identity joined now,
	// converted to the links the distance rule runs on
	let new_certs = generator.compute_new_certs(next_number, &[pubkey.to_owned()], store)?;
	let new_links = generator.new_certs_to_links(&new_certs);

	let mut certifications: Vec<CertificationStatus> = vec![];
	for link in store.valid_links_to(pubkey)? {
		certifications.push(CertificationStatus {
			from: link.source,
			to: pubkey.to_owned(),
			timestamp: link.timestamp,
			expires_in: (link.timestamp + conf.sig_validity - current_time).max(0),
		});
	}
	for cert in new_certs.iter().filter(|c| c.to == pubkey) {
		certifications.push(CertificationStatus {
			from: cert.from.clone(),
			to: cert.to.clone(),
			timestamp: cert.timestamp,
			expires_in: (cert.timestamp + conf.sig_validity - current_time).max(0),
		});
	}

	let outdistanced = rules.is_over_3_hops(
		pubkey,
		&new_links,
		&[pubkey.to_owned()],
		current,
		conf,
		store,
	)?;

	let membership_expires_in = if pre_join.current_msn >= 0 {
		match store.get_block_or_null(pre_join.current_msn as u64)? {
			Some(ms_block) => (ms_block.median_time + conf.ms_validity - current_time).max(0),
			None => 0,
		}
	} else {
		0
	};

	let membership_pending_expires_in = match store.last_join_of(pubkey)? {
		Some(join) => match store.get_block_or_null(join.number)? {
			Some(b) => (b.median_time + conf.ms_validity - current_time).max(0),
			None => 0,
		},
		None => 0,
	};

	Ok(IdentityRequirements {
		pubkey: pre_join.identity.pubkey,
		uid: pre_join.identity.uid,
		timestamp: pre_join.identity.buid,
		outdistanced,
		certifications,
		membership_pending_expires_in,
		membership_expires_in,
	})
}
