//! Parquet codec for canonical records
//!
//! Partitions are written as single-row-group Parquet files with Snappy
//! compression. Decoding is lenient about physical types so that legacy
//! merged objects (large strings, 64-bit chromosome codes) can be read back.

use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::model::CanonicalRecord;
use crate::normalize::ChromosomeEncoding;
use crate::tabular::RawTable;

/// Arrow schema of a canonical partition
pub fn canonical_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("SNP", DataType::Utf8, false),
        Field::new("chr", DataType::Int32, false),
        Field::new("pos", DataType::Int64, false),
        Field::new("effect_allele", DataType::Utf8, false),
        Field::new("other_allele", DataType::Utf8, false),
        Field::new("eaf", DataType::Float64, true),
        Field::new("beta", DataType::Float64, false),
        Field::new("se", DataType::Float64, false),
        Field::new("pval", DataType::Float64, false),
        Field::new("mlogp", DataType::Float64, false),
        Field::new("file_name", DataType::Utf8, false),
    ]))
}

fn codec_error(err: anyhow::Error) -> IngestError {
    IngestError::Codec(format!("{:#}", err))
}

/// Serialize records into an in-memory Parquet file
pub fn encode(records: &[CanonicalRecord]) -> IngestResult<Vec<u8>> {
    encode_batch(records).map_err(codec_error)
}

fn encode_batch(records: &[CanonicalRecord]) -> Result<Vec<u8>> {
    let schema = canonical_schema();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.snp.as_str()))),
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.chr))),
        Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.pos))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.effect_allele.as_str()))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.other_allele.as_str()))),
        Arc::new(Float64Array::from(records.iter().map(|r| r.eaf).collect::<Vec<_>>())),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.beta))),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.se))),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.pval))),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.mlogp))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.file_name.as_str()))),
    ];

    let batch = RecordBatch::try_new(schema.clone(), columns).context("Failed to build record batch")?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buffer = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buffer, schema, Some(props)).context("Failed to create Parquet writer")?;
    writer.write(&batch).context("Failed to write record batch")?;
    writer.close().context("Failed to finalize Parquet file")?;

    debug!("Encoded {} records into {} bytes", records.len(), buffer.len());
    Ok(buffer)
}

fn batches(data: Vec<u8>) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))
        .context("Not a readable Parquet file")?
        .build()
        .context("Failed to build Parquet reader")?;

    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to read record batch")
}

fn column_as(batch: &RecordBatch, name: &str, to: &DataType) -> Result<ArrayRef> {
    let index = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow!("Missing column {}", name))?;
    cast(batch.column(index), to).with_context(|| format!("Column {} cannot be read as {}", name, to))
}

fn typed<'a, T: Array + 'static>(array: &'a ArrayRef, name: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("Column {} has unexpected type {}", name, array.data_type()))
}

fn required<T>(value: Option<T>, name: &str, row: usize) -> Result<T> {
    value.ok_or_else(|| anyhow!("Null {} at row {}", name, row))
}

/// Integer `chr` column; text labels such as `X` or `chr7` are mapped to codes
fn chromosome_column(batch: &RecordBatch) -> Result<ArrayRef> {
    let index = batch
        .schema()
        .index_of("chr")
        .map_err(|_| anyhow!("Missing column chr"))?;
    if !matches!(
        batch.column(index).data_type(),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
    ) {
        return column_as(batch, "chr", &DataType::Int32);
    }

    let labels = column_as(batch, "chr", &DataType::Utf8)?;
    let labels = typed::<StringArray>(&labels, "chr")?;
    let encoding = ChromosomeEncoding::prefixed("chr");
    let codes = labels
        .iter()
        .enumerate()
        .map(|(row, label)| match label {
            Some(label) => encoding
                .code(label)
                .map(Some)
                .ok_or_else(|| anyhow!("Unparseable chr {:?} at row {}", label, row)),
            None => Ok(None),
        })
        .collect::<Result<Int32Array>>()?;
    Ok(Arc::new(codes))
}

/// Read canonical records back from Parquet bytes
///
/// When the file has no `file_name` column every record is stamped with
/// `default_file_name`; null statistics decode as NaN and a null `SNP`
/// decodes as an empty string. Text chromosome labels are accepted.
pub fn decode(data: Vec<u8>, default_file_name: &str) -> IngestResult<Vec<CanonicalRecord>> {
    decode_batches(data, default_file_name).map_err(codec_error)
}

fn decode_batches(data: Vec<u8>, default_file_name: &str) -> Result<Vec<CanonicalRecord>> {
    let mut records = Vec::new();

    for batch in batches(data)? {
        let snp_col = column_as(&batch, "SNP", &DataType::Utf8)?;
        let chr_col = chromosome_column(&batch)?;
        let pos_col = column_as(&batch, "pos", &DataType::Int64)?;
        let ea_col = column_as(&batch, "effect_allele", &DataType::Utf8)?;
        let oa_col = column_as(&batch, "other_allele", &DataType::Utf8)?;
        let eaf_col = column_as(&batch, "eaf", &DataType::Float64)?;
        let beta_col = column_as(&batch, "beta", &DataType::Float64)?;
        let se_col = column_as(&batch, "se", &DataType::Float64)?;
        let pval_col = column_as(&batch, "pval", &DataType::Float64)?;
        let mlogp_col = column_as(&batch, "mlogp", &DataType::Float64)?;
        let file_col = match batch.schema().index_of("file_name") {
            Ok(_) => Some(column_as(&batch, "file_name", &DataType::Utf8)?),
            Err(_) => None,
        };

        let snp = typed::<StringArray>(&snp_col, "SNP")?;
        let chr = typed::<Int32Array>(&chr_col, "chr")?;
        let pos = typed::<Int64Array>(&pos_col, "pos")?;
        let effect_allele = typed::<StringArray>(&ea_col, "effect_allele")?;
        let other_allele = typed::<StringArray>(&oa_col, "other_allele")?;
        let eaf = typed::<Float64Array>(&eaf_col, "eaf")?;
        let beta = typed::<Float64Array>(&beta_col, "beta")?;
        let se = typed::<Float64Array>(&se_col, "se")?;
        let pval = typed::<Float64Array>(&pval_col, "pval")?;
        let mlogp = typed::<Float64Array>(&mlogp_col, "mlogp")?;
        let file_name = file_col
            .as_ref()
            .map(|col| typed::<StringArray>(col, "file_name"))
            .transpose()?;

        let text = |array: &StringArray, i: usize| (!array.is_null(i)).then(|| array.value(i).to_string());
        let float = |array: &Float64Array, i: usize| if array.is_null(i) { f64::NAN } else { array.value(i) };

        for i in 0..batch.num_rows() {
            records.push(CanonicalRecord {
                snp: text(snp, i).unwrap_or_default(),
                chr: required((!chr.is_null(i)).then(|| chr.value(i)), "chr", i)?,
                pos: required((!pos.is_null(i)).then(|| pos.value(i)), "pos", i)?,
                effect_allele: text(effect_allele, i).unwrap_or_default(),
                other_allele: text(other_allele, i).unwrap_or_default(),
                eaf: (!eaf.is_null(i)).then(|| eaf.value(i)),
                beta: float(beta, i),
                se: float(se, i),
                pval: float(pval, i),
                mlogp: float(mlogp, i),
                file_name: file_name
                    .and_then(|col| text(col, i))
                    .unwrap_or_else(|| default_file_name.to_string()),
            });
        }
    }

    Ok(records)
}

/// Read selected columns of a Parquet file as text cells
///
/// Used for side tables stored as Parquet; every column is cast to UTF-8 so
/// the result can be joined like a delimited table. An empty `columns` slice
/// selects every column.
pub fn parquet_to_raw_table(data: Vec<u8>, columns: &[&str]) -> Result<RawTable> {
    let mut headers: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    let mut rows = Vec::new();

    for batch in batches(data)? {
        if headers.is_empty() {
            headers = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
        }

        let cast_columns = headers
            .iter()
            .map(|name| column_as(&batch, name, &DataType::Utf8))
            .collect::<Result<Vec<_>>>()?;
        let strings = cast_columns
            .iter()
            .zip(&headers)
            .map(|(col, name)| typed::<StringArray>(col, name))
            .collect::<Result<Vec<_>>>()?;

        for i in 0..batch.num_rows() {
            rows.push(
                strings
                    .iter()
                    .map(|col| (!col.is_null(i)).then(|| col.value(i).to_string()))
                    .collect(),
            );
        }
    }

    Ok(RawTable::new(headers, rows))
}
