use std::collections::HashSet;

use crate::listing::Listing;

/// Seal every listing and keep the first occurrence of each content hash,
/// preserving batch order. Returns the survivors and how many were dropped.
pub fn dedup<T: Listing>(batch: Vec<T>) -> (Vec<T>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(batch.len());
    let mut keep = Vec::with_capacity(batch.len());
    let mut removed = 0usize;

    for mut item in batch {
        let hash = item.seal().to_string();
        if seen.insert(hash) {
            keep.push(item);
        } else {
            removed += 1;
        }
    }
    (keep, removed)
}
