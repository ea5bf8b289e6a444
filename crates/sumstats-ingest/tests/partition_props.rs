//! Property tests for normalisation, chromosome handling, partitioning and
//! the oracle

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use sumstats_ingest::layout::{self, NameRule};
use sumstats_ingest::lookup::LookupSet;
use sumstats_ingest::model::{all_chromosomes, CanonicalRecord, CompletionState};
use sumstats_ingest::normalize::{normalize, ChromosomeEncoding, ColumnMapping, PValueRule, SourceProfile};
use sumstats_ingest::oracle::CompletionOracle;
use sumstats_ingest::partition::partition;
use sumstats_ingest::storage::MemoryObjectStore;
use sumstats_ingest::tabular::{RawFormat, RawTable};

fn record(index: usize, chr: i32) -> CanonicalRecord {
    CanonicalRecord {
        snp: format!("rs{}", index),
        chr,
        pos: index as i64,
        effect_allele: "A".to_string(),
        other_allele: "G".to_string(),
        eaf: None,
        beta: 0.0,
        se: 1.0,
        pval: 1.0,
        mlogp: 0.0,
        file_name: "f".to_string(),
    }
}

const HEADERS: [&str; 10] = ["SNP", "CHR", "POS", "A1", "A2", "AF", "BETA", "SE", "P", "MLOGP"];

fn profile(p_value: PValueRule) -> SourceProfile {
    SourceProfile {
        name: "props".to_string(),
        format: RawFormat::tsv(),
        columns: ColumnMapping {
            snp: "SNP".to_string(),
            chr: "CHR".to_string(),
            pos: "POS".to_string(),
            effect_allele: "A1".to_string(),
            other_allele: "A2".to_string(),
            eaf: "AF".to_string(),
            beta: "BETA".to_string(),
            se: "SE".to_string(),
            pval: Some("P".to_string()),
            mlogp: Some("MLOGP".to_string()),
        },
        chromosome: ChromosomeEncoding::passthrough_x(),
        p_value,
        joins: Vec::new(),
        output_name: NameRule::default(),
    }
}

fn raw_row(snp: Option<String>, chr: i32, pval: &str, mlogp: &str) -> Vec<Option<String>> {
    let chr = chr.to_string();
    let mut row = vec![snp];
    row.extend(
        [chr.as_str(), "100", "A", "G", "NA", "0.1", "0.01", pval, mlogp]
            .iter()
            .map(|cell| Some(cell.to_string())),
    );
    row
}

fn table(rows: Vec<Vec<Option<String>>>) -> RawTable {
    RawTable::new(HEADERS.iter().map(|h| h.to_string()).collect(), rows)
}

fn snp_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        "rs[0-9]{1,9}".prop_map(Some),
        "[0-9]{1,2}:[0-9]{1,9}_[ACGT]_[ACGT]".prop_map(Some),
        "(RS|r|s)[0-9]{1,4}".prop_map(Some),
        Just(Some(String::new())),
    ]
}

proptest! {
    #[test]
    fn normalize_keeps_exactly_the_rsid_rows(
        rows in prop::collection::vec((snp_strategy(), 1i32..=23), 0..100)
    ) {
        let expected: Vec<String> = rows
            .iter()
            .filter_map(|(snp, _)| snp.clone())
            .filter(|snp| snp.starts_with("rs"))
            .collect();
        let raw = table(rows.into_iter().map(|(snp, chr)| raw_row(snp, chr, "0.5", "0.30103")).collect());

        let records = normalize(&raw, &profile(PValueRule::Direct), &LookupSet::new(), "props.gz").unwrap();

        prop_assert!(records.iter().all(|r| r.snp.starts_with("rs")));
        prop_assert_eq!(records.into_iter().map(|r| r.snp).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn pval_is_derived_from_mlogp(mlogp in 0.0f64..300.0) {
        let raw = table(vec![raw_row(Some("rs1".into()), 1, "NA", &mlogp.to_string())]);
        let records = normalize(&raw, &profile(PValueRule::FromMlogp), &LookupSet::new(), "props.gz").unwrap();

        prop_assert_eq!(records[0].mlogp, mlogp);
        prop_assert!((-records[0].pval.log10() - mlogp).abs() < 1e-9);
    }

    #[test]
    fn mlogp_is_derived_from_pval(pval in 1e-300f64..=1.0) {
        let raw = table(vec![raw_row(Some("rs1".into()), 1, &pval.to_string(), "NA")]);
        let records = normalize(&raw, &profile(PValueRule::FromPval), &LookupSet::new(), "props.gz").unwrap();

        prop_assert_eq!(records[0].pval, pval);
        prop_assert!(records[0].mlogp >= 0.0);
        prop_assert!((10f64.powf(-records[0].mlogp) - pval).abs() <= pval * 1e-9);
    }
}

proptest! {
    #[test]
    fn partition_preserves_every_record(chromosomes in prop::collection::vec(1i32..=23, 0..200)) {
        let records: Vec<CanonicalRecord> = chromosomes
            .iter()
            .enumerate()
            .map(|(i, chr)| record(i, *chr))
            .collect();

        let groups = partition(records.clone());

        let total: usize = groups.values().map(Vec::len).sum();
        prop_assert_eq!(total, records.len());

        let distinct: BTreeSet<i32> = chromosomes.iter().copied().collect();
        prop_assert_eq!(groups.keys().copied().collect::<BTreeSet<_>>(), distinct);

        for (chr, group) in &groups {
            prop_assert!(!group.is_empty());
            prop_assert!(group.iter().all(|r| r.chr == *chr));
            // input order survives within a group
            let positions: Vec<i64> = group.iter().map(|r| r.pos).collect();
            let mut sorted = positions.clone();
            sorted.sort_unstable();
            prop_assert_eq!(positions, sorted);
        }
    }

    #[test]
    fn prefixed_labels_parse_to_their_code(chr in 1i32..=22) {
        let encoding = ChromosomeEncoding::prefixed("chr");
        prop_assert_eq!(encoding.parse(&format!("chr{}", chr)), Some(chr));
        prop_assert_eq!(encoding.parse(&chr.to_string()), Some(chr));
        prop_assert_eq!(ChromosomeEncoding::passthrough_x().parse(&chr.to_string()), Some(chr));
    }

    #[test]
    fn out_of_range_labels_are_rejected(chr in prop_oneof![-50i32..=0, 24i32..=500]) {
        prop_assert_eq!(ChromosomeEncoding::prefixed("chr").parse(&format!("chr{}", chr)), None);
        prop_assert_eq!(ChromosomeEncoding::passthrough_x().parse(&chr.to_string()), None);
    }

    #[test]
    fn oracle_reports_exactly_the_missing_chromosomes(present in prop::collection::btree_set(1i32..=23, 0..=23)) {
        let store = Arc::new(MemoryObjectStore::default());
        for chr in &present {
            store.insert(layout::partition_key("TER/FinnGen_r10", *chr, "finngen_R10_T2D"), b"x".to_vec());
        }
        let oracle = CompletionOracle::new(store, "TER/FinnGen_r10");

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let state = runtime.block_on(oracle.status("finngen_R10_T2D")).unwrap();

        let expected = if present.is_empty() {
            CompletionState::NotStarted
        } else if present.len() == 23 {
            CompletionState::Complete
        } else {
            CompletionState::PartiallyComplete(all_chromosomes().filter(|c| !present.contains(c)).collect())
        };
        prop_assert_eq!(state, expected);
    }
}

#[test]
fn x_labels_map_to_23() {
    assert_eq!(ChromosomeEncoding::prefixed("chr").parse("chrX"), Some(23));
    assert_eq!(ChromosomeEncoding::passthrough_x().parse("X"), Some(23));
    assert_eq!(ChromosomeEncoding::passthrough_x().parse("23"), Some(23));
    assert_eq!(ChromosomeEncoding::passthrough_x().parse("Y"), None);
}
