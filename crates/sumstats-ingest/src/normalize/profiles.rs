//! Built-in source profiles

use super::{ChromosomeEncoding, ColumnMapping, JoinSpec, PValueRule, SourceProfile};
use crate::layout::NameRule;
use crate::tabular::{Archive, Delimiter, RawFormat};

/// Lookup table holding deCODE effect-allele frequencies keyed by variant name
pub const DECODE_ANNOTATION: &str = "decode_annotation";
/// Lookup table mapping UKB-PPP variant ids to rsid and GRCh38 position
pub const UKB_BUILD_MAPPING: &str = "ukb_build_mapping";

/// FinnGen R10 endpoint summary statistics
pub fn finngen() -> SourceProfile {
    SourceProfile {
        name: "finngen".to_string(),
        format: RawFormat::tsv(),
        columns: ColumnMapping {
            snp: "rsids".to_string(),
            chr: "#chrom".to_string(),
            pos: "pos".to_string(),
            effect_allele: "alt".to_string(),
            other_allele: "ref".to_string(),
            eaf: "af_alt".to_string(),
            beta: "beta".to_string(),
            se: "sebeta".to_string(),
            pval: Some("pval".to_string()),
            mlogp: Some("mlogp".to_string()),
        },
        chromosome: ChromosomeEncoding::passthrough_x(),
        p_value: PValueRule::Direct,
        joins: Vec::new(),
        output_name: NameRule::strip(&[".gz"]),
    }
}

/// deCODE SomaScan protein GWAS; `eaf` comes from the annotation table
pub fn decode() -> SourceProfile {
    SourceProfile {
        name: "decode".to_string(),
        format: RawFormat::tsv(),
        columns: ColumnMapping {
            snp: "rsids".to_string(),
            chr: "Chrom".to_string(),
            pos: "Pos".to_string(),
            effect_allele: "effectAllele".to_string(),
            other_allele: "otherAllele".to_string(),
            eaf: "effectAlleleFreq".to_string(),
            beta: "Beta".to_string(),
            se: "SE".to_string(),
            pval: Some("Pval".to_string()),
            mlogp: Some("minus_log10_pval".to_string()),
        },
        chromosome: ChromosomeEncoding::prefixed("chr"),
        p_value: PValueRule::Direct,
        joins: vec![JoinSpec {
            table: DECODE_ANNOTATION.to_string(),
            on: "Name".to_string(),
        }],
        output_name: NameRule::default(),
    }
}

/// UKB-PPP Olink pQTL archives; rsid and position come from the build mapping
pub fn ukb_olink() -> SourceProfile {
    SourceProfile {
        name: "ukb_olink".to_string(),
        format: RawFormat {
            delimiter: Delimiter::Space,
            archive: Archive::TarOfGz,
        },
        columns: ColumnMapping {
            snp: "rsid".to_string(),
            chr: "CHROM".to_string(),
            pos: "POS38".to_string(),
            effect_allele: "ALLELE1".to_string(),
            other_allele: "ALLELE0".to_string(),
            eaf: "A1FREQ".to_string(),
            beta: "BETA".to_string(),
            se: "SE".to_string(),
            pval: None,
            mlogp: Some("LOG10P".to_string()),
        },
        chromosome: ChromosomeEncoding::passthrough_x(),
        p_value: PValueRule::FromMlogp,
        joins: vec![JoinSpec {
            table: UKB_BUILD_MAPPING.to_string(),
            on: "ID".to_string(),
        }],
        output_name: NameRule::strip(&[".tar"]).lowercased(),
    }
}

pub fn builtin(name: &str) -> Option<SourceProfile> {
    match name {
        "finngen" => Some(finngen()),
        "decode" => Some(decode()),
        "ukb_olink" | "ukb-olink" => Some(ukb_olink()),
        _ => None,
    }
}
