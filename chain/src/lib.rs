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

//! The block chain itself: validates and accepts new blocks, maintains
//! side branches and decides chain switches, keeps the materialized
//! web-of-trust and money indices in step with the head, and drives
//! proof-of-work generation.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate bitflags;
extern crate chrono;
extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
extern crate lru_cache;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;

extern crate weft_core as core;

pub mod branch;
mod bulk;
mod chain;
pub mod cleaner;
pub mod error;
pub mod fork;
pub mod pipe;
mod prover;
mod requirements;
pub mod rules;
pub mod store;
pub mod types;

// Re-export the base interface

pub use crate::chain::Chain;
pub use crate::error::{Error, ErrorKind};
pub use crate::prover::Prover;
pub use crate::requirements::{CertificationStatus, IdentityRequirements};
pub use crate::types::{
	ChainAdapter, ChainConfig, ChainStore, ExcludingBlockRef, Generator, IndexDelta,
	MemberChange, NoopAdapter, Options, PreJoinData, Rules, Stat,
};
