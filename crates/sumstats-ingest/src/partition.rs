//! Chromosome partitioner

use std::collections::BTreeMap;

use crate::model::CanonicalRecord;

/// Group records by their chromosome code
///
/// Every record lands in exactly one group and input order is kept inside a
/// group. Empty input yields an empty map.
pub fn partition(records: Vec<CanonicalRecord>) -> BTreeMap<i32, Vec<CanonicalRecord>> {
    let mut partitions: BTreeMap<i32, Vec<CanonicalRecord>> = BTreeMap::new();
    for record in records {
        partitions.entry(record.chr).or_default().push(record);
    }
    partitions
}
