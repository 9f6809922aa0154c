//! A wait-free extendible hash table.
//!
//! The table is a directory of `2^depth` slots, each pointing to a bucket. A
//! bucket has a `prefix` and a local `depth`, and holds the entries whose hash
//! starts with those `depth` bits; it fills every directory slot whose index
//! starts with its prefix. Directories and bucket contents (`BState`s) are
//! immutable once published. Changing either means building a private copy and
//! installing it with a single compare-and-swap on an epoch-managed atomic
//! pointer.
//!
//! Progress is guaranteed by helping. Each participating thread owns a slot in
//! an announcement array, where it publishes its current operation together
//! with a strictly increasing sequence number. Every bucket state records, per
//! thread, the sequence number and outcome of the last operation of that thread
//! it applied. A thread whose operation is not yet recorded flips its bit in
//! the bucket's `toggle` vector. Whoever next updates the bucket compares that
//! vector against the `applied` vector stored in the state; it executes the
//! announced operation of every thread whose bits differ, then publishes the
//! new state with `applied` set to the toggle it read. The update is attempted
//! twice, so an announcement that raced with the first attempt is picked up by
//! the second one.
//!
//! Inserting a new key into a full bucket fails. The thread then resizes: it
//! copies the directory, splits every bucket that blocks some announced
//! operation into two buckets one level deeper (doubling the copy when
//! needed), executes the blocked operations on the new buckets, and tries to
//! publish the copy. Buckets created during a resize are invisible to other
//! threads until the copy is published, so they are mutated in place.
//!
//! Deletes and updates still succeed on a full bucket, so its contents can
//! change after a resizer decides to split it. Before splitting, a resizer
//! therefore *seals* the bucket: it raises a flag that stops helpers, then
//! replaces the state with a copy marked as sealed. Sealed states are final,
//! and the split partitions exactly their entries. A sealed bucket that stays
//! in a published directory, because its resizer lost the race to publish, is
//! split by the next resize touching it.
//!
//! Retired directories, bucket states and announcements are reclaimed with
//! `crossbeam-epoch`. Entries and buckets are reference counted, since
//! consecutive states share entries and consecutive directories share buckets.

pub(crate) mod big_word;
pub(crate) mod bucket;
pub(crate) mod directory;
pub(crate) mod help;
pub(crate) mod iter;
pub(crate) mod table_ref;

#[cfg(test)]
#[macro_use]
pub(crate) mod test_util;
