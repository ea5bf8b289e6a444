//! Destination key layout
//!
//! ```text
//! {base_prefix}/{stem}.parquet          legacy merged object
//! {base_prefix}/chr{chr}/{stem}.parquet one object per chromosome
//! ```

use serde::{Deserialize, Serialize};

pub const PARQUET_SUFFIX: &str = ".parquet";

/// How a source file name becomes the output stem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRule {
    /// Suffixes removed from the end of the name, tried in order, first match wins
    #[serde(default)]
    pub strip_suffixes: Vec<String>,
    #[serde(default)]
    pub lowercase: bool,
}

impl NameRule {
    pub fn strip(suffixes: &[&str]) -> Self {
        Self {
            strip_suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
            lowercase: false,
        }
    }

    pub fn lowercased(mut self) -> Self {
        self.lowercase = true;
        self
    }

    pub fn stem(&self, name: &str) -> String {
        let trimmed = self
            .strip_suffixes
            .iter()
            .find_map(|suffix| name.strip_suffix(suffix.as_str()))
            .unwrap_or(name);

        if self.lowercase {
            trimmed.to_lowercase()
        } else {
            trimmed.to_string()
        }
    }
}

fn join(base_prefix: &str, rest: &str) -> String {
    let base = base_prefix.trim_end_matches('/');
    if base.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", base, rest)
    }
}

/// Key of the single unpartitioned object for a stem
pub fn merged_key(base_prefix: &str, stem: &str) -> String {
    join(base_prefix, &format!("{}{}", stem, PARQUET_SUFFIX))
}

/// Key of one chromosome partition for a stem
pub fn partition_key(base_prefix: &str, chr: i32, stem: &str) -> String {
    join(base_prefix, &format!("chr{}/{}{}", chr, stem, PARQUET_SUFFIX))
}

/// Stem of a merged object directly under `base_prefix`, or `None` for
/// partition objects, nested keys, and non-parquet keys
pub fn merged_stem<'a>(base_prefix: &str, key: &'a str) -> Option<&'a str> {
    let base = base_prefix.trim_end_matches('/');
    let relative = if base.is_empty() {
        key
    } else {
        key.strip_prefix(base)?.strip_prefix('/')?
    };

    if relative.contains('/') {
        return None;
    }

    relative.strip_suffix(PARQUET_SUFFIX).filter(|stem| !stem.is_empty())
}

/// Last path segment of a URL ending in `.gz`
pub fn gz_name_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|segment| segment.len() > ".gz".len() && segment.ends_with(".gz"))
}
