//! Schema normalisation
//!
//! A [`SourceProfile`] is a declarative description of one source's raw
//! layout: which raw (or joined) column feeds each canonical field, how the
//! chromosome is encoded, and which p-value representation is authoritative.
//! [`normalize`] applies a profile to a [`RawTable`] and produces
//! [`CanonicalRecord`]s.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{IngestError, IngestResult};
use crate::layout::NameRule;
use crate::lookup::{LookupSet, LookupTable};
use crate::model::{is_valid_chromosome, CanonicalRecord, X_CHROMOSOME};
use crate::tabular::{RawFormat, RawTable};

pub mod profiles;

/// Prefix every retained `SNP` value must start with
pub const RSID_PREFIX: &str = "rs";

/// Source column name for each canonical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub snp: String,
    pub chr: String,
    pub pos: String,
    pub effect_allele: String,
    pub other_allele: String,
    pub eaf: String,
    pub beta: String,
    pub se: String,
    #[serde(default)]
    pub pval: Option<String>,
    #[serde(default)]
    pub mlogp: Option<String>,
}

/// How raw chromosome labels become integer codes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromosomeEncoding {
    /// Label prefix removed before parsing, e.g. `chr`
    #[serde(default)]
    pub strip_prefix: Option<String>,
    /// Map `X` to 23
    #[serde(default)]
    pub x_as_23: bool,
}

impl ChromosomeEncoding {
    pub fn passthrough_x() -> Self {
        Self {
            strip_prefix: None,
            x_as_23: true,
        }
    }

    pub fn prefixed(prefix: &str) -> Self {
        Self {
            strip_prefix: Some(prefix.to_string()),
            x_as_23: true,
        }
    }

    /// Integer code of a raw label, `None` if it is not a chromosome in `1..=23`
    pub fn parse(&self, raw: &str) -> Option<i32> {
        self.code(raw).filter(|&chr| is_valid_chromosome(chr))
    }

    /// Integer code of a raw label without the range check
    pub fn code(&self, raw: &str) -> Option<i32> {
        let label = raw.trim();
        let label = match &self.strip_prefix {
            Some(prefix) => label.strip_prefix(prefix.as_str()).unwrap_or(label),
            None => label,
        };

        if self.x_as_23 && label.eq_ignore_ascii_case("X") {
            Some(X_CHROMOSOME)
        } else {
            label.parse::<i32>().ok()
        }
    }
}

/// Which p-value columns are read and which are derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PValueRule {
    /// Both `pval` and `mlogp` are read as is
    #[default]
    Direct,
    /// `pval = 10^(-mlogp)`
    FromMlogp,
    /// `mlogp = -log10(pval)`
    FromPval,
}

/// Left join of a lookup table on a raw column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Name of the lookup table in the run's [`LookupSet`]
    pub table: String,
    /// Raw column whose value is looked up
    pub on: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub name: String,
    #[serde(default)]
    pub format: RawFormat,
    pub columns: ColumnMapping,
    #[serde(default)]
    pub chromosome: ChromosomeEncoding,
    #[serde(default)]
    pub p_value: PValueRule,
    #[serde(default)]
    pub joins: Vec<JoinSpec>,
    #[serde(default)]
    pub output_name: NameRule,
}

impl SourceProfile {
    /// Check that the p-value rule has the columns it reads
    pub fn validate(&self) -> IngestResult<()> {
        let missing = match self.p_value {
            PValueRule::Direct if self.columns.pval.is_none() => Some("pval"),
            PValueRule::Direct | PValueRule::FromMlogp if self.columns.mlogp.is_none() => Some("mlogp"),
            PValueRule::FromPval if self.columns.pval.is_none() => Some("pval"),
            _ => None,
        };

        match missing {
            Some(column) => Err(IngestError::Config(format!(
                "Profile {} uses p-value rule {:?} but maps no {} column",
                self.name, self.p_value, column
            ))),
            None => Ok(()),
        }
    }
}

/// Where a canonical field is read from
#[derive(Debug, Clone, Copy)]
enum Cell {
    Raw(usize),
    Joined { join: usize, position: usize },
}

struct ResolvedJoin {
    key: usize,
    table: Arc<LookupTable>,
}

struct Resolver<'a> {
    raw: &'a RawTable,
    joins: Vec<ResolvedJoin>,
    file_name: &'a str,
}

impl<'a> Resolver<'a> {
    fn new(raw: &'a RawTable, profile: &SourceProfile, lookups: &LookupSet, file_name: &'a str) -> IngestResult<Self> {
        let mut joins = Vec::with_capacity(profile.joins.len());
        for join in &profile.joins {
            let table = lookups.get(&join.table).cloned().ok_or_else(|| {
                IngestError::Config(format!(
                    "Profile {} joins lookup table {} which was not loaded",
                    profile.name, join.table
                ))
            })?;
            let key = raw.column_index(&join.on).ok_or_else(|| {
                IngestError::schema(file_name, format!("missing join column {}", join.on))
            })?;
            joins.push(ResolvedJoin { key, table });
        }

        Ok(Self { raw, joins, file_name })
    }

    /// Raw columns shadow joined ones with the same name
    fn resolve(&self, column: &str) -> IngestResult<Cell> {
        if let Some(index) = self.raw.column_index(column) {
            return Ok(Cell::Raw(index));
        }

        self.joins
            .iter()
            .enumerate()
            .find_map(|(join, resolved)| {
                resolved
                    .table
                    .column_position(column)
                    .map(|position| Cell::Joined { join, position })
            })
            .ok_or_else(|| IngestError::schema(self.file_name, format!("missing column {}", column)))
    }
}

struct Row<'r> {
    raw: &'r [Option<String>],
    joined: Vec<Option<&'r [Option<String>]>>,
}

impl<'r> Row<'r> {
    fn get(&self, cell: Cell) -> Option<&'r str> {
        match cell {
            Cell::Raw(index) => self.raw.get(index)?.as_deref(),
            Cell::Joined { join, position } => self.joined.get(join).copied().flatten()?.get(position)?.as_deref(),
        }
    }
}

struct Cells {
    snp: Cell,
    chr: Cell,
    pos: Cell,
    effect_allele: Cell,
    other_allele: Cell,
    eaf: Cell,
    beta: Cell,
    se: Cell,
    pval: Option<Cell>,
    mlogp: Option<Cell>,
}

fn is_missing_token(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == "NA" || value.eq_ignore_ascii_case("nan")
}

/// Parse a statistic; missing tokens become NaN
fn parse_stat(value: Option<&str>) -> Option<f64> {
    match value {
        None => Some(f64::NAN),
        Some(v) if is_missing_token(v) => Some(f64::NAN),
        Some(v) => v.trim().parse().ok(),
    }
}

/// Parse an optional frequency; missing tokens become null
fn parse_optional(value: Option<&str>) -> Option<Option<f64>> {
    match value {
        None => Some(None),
        Some(v) if is_missing_token(v) => Some(None),
        Some(v) => v.trim().parse().ok().map(Some),
    }
}

/// Integer position, tolerating integral floats such as `12345.0`
fn parse_position(value: &str) -> Option<i64> {
    let value = value.trim();
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            // i64::MAX as f64 is 2^63, one past the largest i64
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Map a raw table onto canonical records
///
/// Rows whose `SNP` is null or does not start with `rs` are dropped before
/// any other field is parsed; every remaining row must parse cleanly or the
/// whole file fails with `SchemaMismatch`.
pub fn normalize(
    raw: &RawTable,
    profile: &SourceProfile,
    lookups: &LookupSet,
    file_name: &str,
) -> IngestResult<Vec<CanonicalRecord>> {
    profile.validate()?;
    let resolver = Resolver::new(raw, profile, lookups, file_name)?;

    let mapping = &profile.columns;
    let optional = |column: &Option<String>, wanted: bool| -> IngestResult<Option<Cell>> {
        match column {
            Some(name) if wanted => resolver.resolve(name).map(Some),
            _ => Ok(None),
        }
    };
    let cells = Cells {
        snp: resolver.resolve(&mapping.snp)?,
        chr: resolver.resolve(&mapping.chr)?,
        pos: resolver.resolve(&mapping.pos)?,
        effect_allele: resolver.resolve(&mapping.effect_allele)?,
        other_allele: resolver.resolve(&mapping.other_allele)?,
        eaf: resolver.resolve(&mapping.eaf)?,
        beta: resolver.resolve(&mapping.beta)?,
        se: resolver.resolve(&mapping.se)?,
        pval: optional(&mapping.pval, profile.p_value != PValueRule::FromMlogp)?,
        mlogp: optional(&mapping.mlogp, profile.p_value != PValueRule::FromPval)?,
    };

    let mut records = Vec::new();
    for (line, raw_row) in raw.rows().iter().enumerate() {
        let row = Row {
            raw: raw_row,
            joined: resolver
                .joins
                .iter()
                .map(|join| {
                    raw_row
                        .get(join.key)
                        .and_then(|cell| cell.as_deref())
                        .and_then(|key| join.table.get(key))
                })
                .collect(),
        };

        let Some(snp) = row.get(cells.snp).filter(|s| s.starts_with(RSID_PREFIX)) else {
            continue;
        };

        let bad = |field: &str, value: Option<&str>| {
            IngestError::schema(
                file_name,
                format!("row {}: unparseable {} {:?}", line + 1, field, value.unwrap_or("<null>")),
            )
        };

        let chr_raw = row.get(cells.chr);
        let chr = chr_raw
            .and_then(|v| profile.chromosome.parse(v))
            .ok_or_else(|| bad("chromosome", chr_raw))?;

        let pos_raw = row.get(cells.pos);
        let pos = pos_raw.and_then(parse_position).ok_or_else(|| bad("position", pos_raw))?;

        let allele = |cell: Cell, field: &str| {
            let value = row.get(cell);
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| bad(field, value))
        };
        let effect_allele = allele(cells.effect_allele, "effect_allele")?;
        let other_allele = allele(cells.other_allele, "other_allele")?;

        let stat = |cell: Cell, field: &str| {
            let value = row.get(cell);
            parse_stat(value).ok_or_else(|| bad(field, value))
        };
        let eaf_raw = row.get(cells.eaf);
        let eaf = parse_optional(eaf_raw).ok_or_else(|| bad("eaf", eaf_raw))?;
        let beta = stat(cells.beta, "beta")?;
        let se = stat(cells.se, "se")?;
        let pval_read = cells.pval.map(|c| stat(c, "pval")).transpose()?;
        let mlogp_read = cells.mlogp.map(|c| stat(c, "mlogp")).transpose()?;

        let (pval, mlogp) = match profile.p_value {
            PValueRule::Direct => (pval_read.unwrap_or(f64::NAN), mlogp_read.unwrap_or(f64::NAN)),
            PValueRule::FromMlogp => {
                let mlogp = mlogp_read.unwrap_or(f64::NAN);
                (10f64.powf(-mlogp), mlogp)
            }
            PValueRule::FromPval => {
                let pval = pval_read.unwrap_or(f64::NAN);
                (pval, -pval.log10())
            }
        };

        records.push(CanonicalRecord {
            snp: snp.to_string(),
            chr,
            pos,
            effect_allele,
            other_allele,
            eaf,
            beta,
            se,
            pval,
            mlogp,
            file_name: file_name.to_string(),
        });
    }

    Ok(records)
}

/// Hold already-typed records to the rules [`normalize`] applies to raw rows
///
/// Records whose `SNP` does not start with `rs` are dropped; any remaining
/// record outside chromosomes 1..=23 fails the file with `SchemaMismatch`.
pub fn conform(mut records: Vec<CanonicalRecord>, file_name: &str) -> IngestResult<Vec<CanonicalRecord>> {
    records.retain(|r| r.snp.starts_with(RSID_PREFIX));

    if let Some(bad) = records.iter().find(|r| !is_valid_chromosome(r.chr)) {
        return Err(IngestError::schema(
            file_name,
            format!("record {}: chromosome {} outside 1..=23", bad.snp, bad.chr),
        ));
    }

    Ok(records)
}
