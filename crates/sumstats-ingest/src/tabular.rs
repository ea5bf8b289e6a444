//! Raw delimited tables
//!
//! Sources deliver summary statistics as delimited text, optionally gzip
//! compressed (plain or BGZF multi-member) and optionally bundled as a tar
//! archive of gzip members that are concatenated vertically.

use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{Cursor, Read};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Field separator of a raw file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    #[default]
    Tab,
    Comma,
    Space,
}

impl Delimiter {
    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
            Delimiter::Space => b' ',
        }
    }
}

/// Container around the delimited text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Archive {
    /// A single (possibly gzipped) delimited file
    #[default]
    None,
    /// A tar archive whose `.gz` members share one header
    TarOfGz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawFormat {
    #[serde(default)]
    pub delimiter: Delimiter,
    #[serde(default)]
    pub archive: Archive,
}

impl RawFormat {
    pub fn tsv() -> Self {
        Self::default()
    }

    pub fn csv() -> Self {
        Self {
            delimiter: Delimiter::Comma,
            archive: Archive::None,
        }
    }
}

/// Untyped table: a header row and string cells, empty cells are `None`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Ragged rows are padded with nulls or truncated to the header width
    pub fn new(headers: Vec<String>, mut rows: Vec<Vec<Option<String>>>) -> Self {
        let width = headers.len();
        for row in rows.iter_mut().filter(|row| row.len() != width) {
            row.resize(width, None);
        }
        Self { headers, rows }
    }

    /// Convenience constructor for literal tables
    pub fn from_rows(headers: &[&str], rows: &[&[Option<&str>]]) -> Self {
        Self::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.map(str::to_string)).collect())
                .collect(),
        )
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Vertical concatenation; both tables must share the same header
    pub fn append(&mut self, other: RawTable) -> Result<()> {
        if self.headers.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.headers != other.headers {
            bail!(
                "Cannot concatenate tables with different headers: {:?} vs {:?}",
                self.headers,
                other.headers
            );
        }
        self.rows.extend(other.rows);
        Ok(())
    }
}

/// Inflate gzip data if it carries the gzip magic, otherwise borrow it as is
pub fn maybe_gunzip(data: &[u8]) -> Result<Cow<'_, [u8]>> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(data));
    }

    let mut decoder = MultiGzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .context("Failed to decompress gzip data")?;
    debug!("Decompressed {} -> {} bytes", data.len(), decompressed.len());
    Ok(Cow::Owned(decompressed))
}

/// `.gz` members of a tar archive, in archive order
pub fn tar_gz_members(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = tar::Archive::new(Cursor::new(data));
    let mut members = Vec::new();

    for entry_result in archive.entries().context("Failed to read tar entries")? {
        let mut entry = entry_result.context("Failed to read tar entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .context("Failed to get entry path")?
            .to_string_lossy()
            .to_string();
        if !path.ends_with(".gz") {
            continue;
        }

        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .with_context(|| format!("Failed to read tar member {}", path))?;
        members.push((path, contents));
    }

    debug!("Found {} gzip members in tar archive", members.len());
    Ok(members)
}

/// Parse delimited text with a header row
///
/// Ragged lines are padded with nulls or truncated to the header width.
pub fn parse_delimited(data: &[u8], delimiter: Delimiter) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let width = headers.len();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read data row {}", line + 1))?;
        rows.push(
            record
                .iter()
                .take(width)
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect(),
        );
    }

    Ok(RawTable::new(headers, rows))
}

/// Decode a fetched payload into a raw table according to its format
pub fn read_table(data: &[u8], format: RawFormat) -> Result<RawTable> {
    match format.archive {
        Archive::None => {
            let text = maybe_gunzip(data)?;
            parse_delimited(&text, format.delimiter)
        }
        Archive::TarOfGz => {
            let members = tar_gz_members(data)?;
            if members.is_empty() {
                bail!("Tar archive contains no .gz members");
            }

            let mut table = RawTable::default();
            for (name, compressed) in members {
                let text = maybe_gunzip(&compressed)
                    .with_context(|| format!("Failed to decompress tar member {}", name))?;
                let part = parse_delimited(&text, format.delimiter)
                    .with_context(|| format!("Failed to parse tar member {}", name))?;
                table.append(part)?;
            }
            Ok(table)
        }
    }
}
