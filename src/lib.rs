#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A wait-free, resizable concurrent hash map based on extendible hashing.
//!
//! [`HashMap`] is shared by a fixed number of threads, each identified by a
//! small integer id. Inserts and removes announce themselves in a per-thread
//! slot; any thread that works on a bucket also applies the operations other
//! threads announced for it, so every operation finishes in a bounded number of
//! steps even if other threads stall. Full buckets are split cooperatively and
//! the directory addressing them doubles as needed. Lookups are read-only and
//! see the bucket as it was at one instant.
//!
//! # Example
//!
//! ```rust
//! use wfexth::HashMap;
//!
//! use std::thread;
//!
//! let map = HashMap::builder(2).bucket_size(4).build();
//!
//! thread::scope(|s| {
//!     for id in 0..2 {
//!         let map = &map;
//!         s.spawn(move || {
//!             for i in 0..50 {
//!                 map.insert(format!("key-{id}-{i}"), i, id);
//!             }
//!         });
//!     }
//! });
//!
//! assert_eq!(map.len(), 100);
//! assert_eq!(map.lookup("key-1-7"), Some(7));
//! ```
//!
//! # Crate features
//!
//! - `logging`: emits `log` records when buckets are split and resized
//!   directories are published.
//! - `unstable-debug-counters`: adds [`GlobalDebugCounters`], counting the
//!   table's internal allocations. Intended for debugging.

pub(crate) mod builder;
pub(crate) mod error;
pub(crate) mod map;
pub(crate) mod wfext;

#[cfg(feature = "unstable-debug-counters")]
#[cfg_attr(docsrs, doc(cfg(feature = "unstable-debug-counters")))]
mod debug_counters;

pub use builder::HashMapBuilder;
pub use error::BuildError;
pub use map::{DefaultHashBuilder, HashMap};
pub use wfext::iter::Iter;

#[cfg(feature = "unstable-debug-counters")]
#[cfg_attr(docsrs, doc(cfg(feature = "unstable-debug-counters")))]
pub use debug_counters::GlobalDebugCounters;
