#![cfg(feature = "unstable-debug-counters")]

use crossbeam_utils::atomic::AtomicCell;
use once_cell::sync::Lazy;

/// Process-wide counts of the table's internal allocations.
///
/// A bucket state or directory that was created but not yet dropped is either
/// live in some table or waiting for epoch-based reclamation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalDebugCounters {
    pub bucket_creation_count: u64,
    pub bucket_drop_count: u64,
    pub bucket_state_creation_count: u64,
    pub bucket_state_drop_count: u64,
    pub directory_creation_count: u64,
    pub directory_drop_count: u64,
}

impl GlobalDebugCounters {
    pub fn current() -> Self {
        InternalGlobalDebugCounters::current()
    }
}

static COUNTERS: Lazy<InternalGlobalDebugCounters> =
    Lazy::new(InternalGlobalDebugCounters::default);

#[derive(Default)]
pub(crate) struct InternalGlobalDebugCounters {
    bucket_creation_count: AtomicCell<u64>,
    bucket_drop_count: AtomicCell<u64>,
    bucket_state_creation_count: AtomicCell<u64>,
    bucket_state_drop_count: AtomicCell<u64>,
    directory_creation_count: AtomicCell<u64>,
    directory_drop_count: AtomicCell<u64>,
}

impl InternalGlobalDebugCounters {
    fn current() -> GlobalDebugCounters {
        let c = &COUNTERS;
        GlobalDebugCounters {
            bucket_creation_count: c.bucket_creation_count.load(),
            bucket_drop_count: c.bucket_drop_count.load(),
            bucket_state_creation_count: c.bucket_state_creation_count.load(),
            bucket_state_drop_count: c.bucket_state_drop_count.load(),
            directory_creation_count: c.directory_creation_count.load(),
            directory_drop_count: c.directory_drop_count.load(),
        }
    }

    pub(crate) fn bucket_created() {
        COUNTERS.bucket_creation_count.fetch_add(1);
    }

    pub(crate) fn bucket_dropped() {
        COUNTERS.bucket_drop_count.fetch_add(1);
    }

    pub(crate) fn bucket_state_created() {
        COUNTERS.bucket_state_creation_count.fetch_add(1);
    }

    pub(crate) fn bucket_state_dropped() {
        COUNTERS.bucket_state_drop_count.fetch_add(1);
    }

    pub(crate) fn directory_created() {
        COUNTERS.directory_creation_count.fetch_add(1);
    }

    pub(crate) fn directory_dropped() {
        COUNTERS.directory_drop_count.fetch_add(1);
    }
}
