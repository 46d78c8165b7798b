//! Histograms ↔ Arrow RecordBatch conversion.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, Float64Array, Float64Builder, ListArray, ListBuilder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use sc_core::Histogram;

use crate::error::StoreError;

/// Build the histogram table for `rows`, each `(name, histogram)`.
///
/// The row name overrides the histogram's own name so that store keys and
/// histogram identities can differ.
pub fn histograms_to_record_batch<'a, I>(
    rows: I,
    metadata: HashMap<String, String>,
) -> Result<RecordBatch, StoreError>
where
    I: IntoIterator<Item = (&'a str, &'a Histogram)>,
{
    let mut name_builder = StringBuilder::new();
    let mut edges_builder = ListBuilder::new(Float64Builder::new());
    let mut contents_builder = ListBuilder::new(Float64Builder::new());
    let mut sumw2_builder = ListBuilder::new(Float64Builder::new());

    for (name, hist) in rows {
        name_builder.append_value(name);
        edges_builder.values().append_slice(hist.edges());
        edges_builder.append(true);
        contents_builder.values().append_slice(hist.contents());
        contents_builder.append(true);
        sumw2_builder.values().append_slice(hist.sumw2());
        sumw2_builder.append(true);
    }

    let list_f64_field = Arc::new(Field::new_list_field(DataType::Float64, true));
    let schema = Arc::new(Schema::new_with_metadata(
        vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("edges", DataType::List(list_f64_field.clone()), false),
            Field::new("contents", DataType::List(list_f64_field.clone()), false),
            Field::new("sumw2", DataType::List(list_f64_field), true),
        ],
        metadata,
    ));

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(name_builder.finish()) as ArrayRef,
            Arc::new(edges_builder.finish()) as ArrayRef,
            Arc::new(contents_builder.finish()) as ArrayRef,
            Arc::new(sumw2_builder.finish()) as ArrayRef,
        ],
    )?;

    Ok(batch)
}

/// Decode every row of every batch into a [`Histogram`].
///
/// A missing or null `sumw2` falls back to Poisson variances (`|content|`).
pub fn record_batches_to_histograms(batches: &[RecordBatch]) -> Result<Vec<Histogram>, StoreError> {
    let mut out = Vec::new();
    let mut row_offset = 0;
    for batch in batches {
        extract_rows(batch, row_offset, &mut out)?;
        row_offset += batch.num_rows();
    }
    Ok(out)
}

fn extract_rows(
    batch: &RecordBatch,
    row_offset: usize,
    out: &mut Vec<Histogram>,
) -> Result<(), StoreError> {
    let schema = batch.schema();

    let name_idx =
        schema.index_of("name").map_err(|_| StoreError::MissingColumn("name".into()))?;
    let edges_idx =
        schema.index_of("edges").map_err(|_| StoreError::MissingColumn("edges".into()))?;
    let contents_idx =
        schema.index_of("contents").map_err(|_| StoreError::MissingColumn("contents".into()))?;
    let sumw2_idx = schema.index_of("sumw2").ok();

    validate_utf8(batch, name_idx, "name")?;
    validate_list_f64(batch, edges_idx, "edges")?;
    validate_list_f64(batch, contents_idx, "contents")?;
    if let Some(idx) = sumw2_idx {
        validate_list_f64(batch, idx, "sumw2")?;
    }

    let names = batch.column(name_idx).as_string::<i32>();
    let edges = batch.column(edges_idx).as_list::<i32>();
    let contents = batch.column(contents_idx).as_list::<i32>();
    let sumw2: Option<&ListArray> = sumw2_idx.map(|idx| batch.column(idx).as_list());

    for i in 0..batch.num_rows() {
        let row = row_offset + i;
        let name = names.value(i).to_string();
        let edges_v = list_row_f64(edges, i, "edges")?;
        let contents_v = list_row_f64(contents, i, "contents")?;
        let sumw2_v = match sumw2 {
            Some(arr) if !arr.is_null(i) => list_row_f64(arr, i, "sumw2")?,
            _ => contents_v.iter().map(|c| c.abs()).collect(),
        };
        let hist = Histogram::new(name, edges_v, contents_v, sumw2_v)
            .map_err(|source| StoreError::Histogram { row, source })?;
        out.push(hist);
    }
    Ok(())
}

fn list_row_f64(arr: &ListArray, row: usize, col: &str) -> Result<Vec<f64>, StoreError> {
    let values = arr.value(row);
    let f64s = values.as_any().downcast_ref::<Float64Array>().ok_or_else(|| {
        StoreError::WrongType {
            col: col.into(),
            expected: "Float64".into(),
            actual: format!("{:?}", values.data_type()),
        }
    })?;
    if f64s.null_count() > 0 {
        return Err(StoreError::NullValue { col: col.into(), row, nulls: f64s.null_count() });
    }
    Ok(f64s.values().to_vec())
}

fn validate_utf8(batch: &RecordBatch, idx: usize, name: &str) -> Result<(), StoreError> {
    let dt = batch.column(idx).data_type();
    if !matches!(dt, DataType::Utf8) {
        return Err(StoreError::WrongType {
            col: name.into(),
            expected: "Utf8".into(),
            actual: format!("{dt:?}"),
        });
    }
    Ok(())
}

fn validate_list_f64(batch: &RecordBatch, idx: usize, name: &str) -> Result<(), StoreError> {
    let dt = batch.column(idx).data_type();
    match dt {
        DataType::List(field) if matches!(field.data_type(), DataType::Float64) => Ok(()),
        DataType::List(field) => Err(StoreError::WrongType {
            col: name.into(),
            expected: "List<Float64>".into(),
            actual: format!("List<{:?}>", field.data_type()),
        }),
        _ => Err(StoreError::WrongType {
            col: name.into(),
            expected: "List<Float64>".into(),
            actual: format!("{dt:?}"),
        }),
    }
}
