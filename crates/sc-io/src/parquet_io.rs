//! Parquet file read/write for histogram tables.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::StoreError;

/// Read a Parquet file into Arrow RecordBatches.
pub fn read_parquet_batches(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let reader = builder.build()?;
    let batches: Result<Vec<_>, _> = reader.collect();
    Ok(batches?)
}

/// Read only the Arrow schema metadata of a Parquet file.
pub fn read_parquet_metadata(path: &Path) -> Result<HashMap<String, String>, StoreError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    Ok(builder.schema().metadata().clone())
}

/// Write Arrow RecordBatches to a Parquet file (Snappy compressed).
///
/// The first batch's schema, including its metadata, becomes the file schema.
pub fn write_parquet(path: &Path, batches: &[RecordBatch]) -> Result<(), StoreError> {
    let Some(first) = batches.first() else {
        return Ok(());
    };

    let props = WriterProperties::builder().set_compression(Compression::SNAPPY).build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, first.schema(), Some(props))?;

    for batch in batches {
        writer.write(batch)?;
    }

    writer.close()?;
    Ok(())
}
