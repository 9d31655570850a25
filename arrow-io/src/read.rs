use anyhow::{bail, format_err, Context, Error};
use arrow::array::{
    Array, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array, Int8Array, StringArray,
    UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::DataType;
use arrow::ipc::reader::{FileReader, StreamReader};
use arrow::record_batch::RecordBatch;
use findr_types::{CisPairs, ExpressionMatrix, GenotypeMatrix};
use log::debug;
use ndarray::prelude::*;
use std::fs::File;
use std::path::Path;

/// Read all record batches from an Arrow IPC file, accepting either the file
/// or the stream framing.
fn open_batches(path: &Path) -> Result<Vec<RecordBatch>, Error> {
    let file = File::open(path).with_context(|| path.display().to_string())?;
    if let Ok(reader) = FileReader::try_new(file, None) {
        let batches: Result<Vec<_>, _> = reader.collect();
        return batches.map_err(Error::from);
    }

    let file = File::open(path).with_context(|| path.display().to_string())?;
    let reader = StreamReader::try_new(file, None)
        .with_context(|| format!("{}: not an Arrow IPC file or stream", path.display()))?;
    let batches: Result<Vec<_>, _> = reader.collect();
    batches.map_err(Error::from)
}

/// Indices of the sample-id column (first Utf8 column, if any) and of all
/// columns matching `keep`.
fn classify_columns(
    batch: &RecordBatch,
    keep: impl Fn(&DataType) -> bool,
) -> (Option<usize>, Vec<usize>, Vec<String>) {
    let schema = batch.schema();
    let mut sample_col = None;
    let mut value_cols = Vec::new();
    let mut names = Vec::new();
    for (idx, field) in schema.fields().iter().enumerate() {
        if matches!(field.data_type(), DataType::Utf8) {
            if sample_col.is_none() {
                sample_col = Some(idx);
            }
        } else if keep(field.data_type()) {
            value_cols.push(idx);
            names.push(field.name().clone());
        }
    }
    (sample_col, value_cols, names)
}

fn string_column(batch: &RecordBatch, col: usize, out: &mut Vec<String>) -> Result<(), Error> {
    let arr = batch
        .column(col)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| format_err!("column {col} is not a string column"))?;
    for i in 0..arr.len() {
        if arr.is_null(i) {
            bail!("null entry in string column {col}");
        }
        out.push(arr.value(i).to_string());
    }
    Ok(())
}

fn float_column(batch: &RecordBatch, col: usize, name: &str) -> Result<Vec<f64>, Error> {
    let array = batch.column(col);
    let values: Option<Vec<f64>> = match array.data_type() {
        DataType::Float64 => {
            let a = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| format_err!("column {name} failed to downcast to Float64"))?;
            (0..a.len()).map(|i| (!a.is_null(i)).then(|| a.value(i))).collect()
        }
        DataType::Float32 => {
            let a = array
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| format_err!("column {name} failed to downcast to Float32"))?;
            (0..a.len())
                .map(|i| (!a.is_null(i)).then(|| a.value(i) as f64))
                .collect()
        }
        other => bail!("column {name} has unsupported float type {other}"),
    };
    values.ok_or_else(|| format_err!("column {name} contains null values"))
}

fn int_column(batch: &RecordBatch, col: usize, name: &str) -> Result<Vec<i64>, Error> {
    macro_rules! take {
        ($arr:ty) => {{
            let a = batch
                .column(col)
                .as_any()
                .downcast_ref::<$arr>()
                .ok_or_else(|| format_err!("column {name} failed to downcast"))?;
            (0..a.len())
                .map(|i| (!a.is_null(i)).then(|| a.value(i) as i64))
                .collect::<Option<Vec<i64>>>()
        }};
    }
    let values = match batch.column(col).data_type() {
        DataType::Int8 => take!(Int8Array),
        DataType::Int16 => take!(Int16Array),
        DataType::Int32 => take!(Int32Array),
        DataType::Int64 => take!(Int64Array),
        DataType::UInt8 => take!(UInt8Array),
        DataType::UInt16 => take!(UInt16Array),
        DataType::UInt32 => take!(UInt32Array),
        DataType::UInt64 => take!(UInt64Array),
        other => bail!("column {name} has unsupported integer type {other}"),
    };
    values.ok_or_else(|| format_err!("column {name} contains null values"))
}

fn sample_ids(batches: &[RecordBatch], sample_col: Option<usize>, n_rows: usize) -> Result<Vec<String>, Error> {
    match sample_col {
        Some(col) => {
            let mut samples = Vec::with_capacity(n_rows);
            for batch in batches {
                string_column(batch, col, &mut samples)?;
            }
            Ok(samples)
        }
        None => Ok((0..n_rows).map(|i| format!("s{i}")).collect()),
    }
}

/// Load a samples-by-genes expression table: every Float64/Float32 column is
/// a gene, an optional leading Utf8 column carries sample ids.
pub fn read_expression(path: impl AsRef<Path>) -> Result<ExpressionMatrix, Error> {
    let path = path.as_ref();
    let batches = open_batches(path)?;
    let Some(first) = batches.first() else {
        bail!("{}: empty Arrow file", path.display())
    };
    let (sample_col, gene_cols, genes) =
        classify_columns(first, |t| matches!(t, DataType::Float64 | DataType::Float32));
    if gene_cols.is_empty() {
        bail!("{}: no float gene columns found", path.display());
    }

    let n_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    debug!("{}: {} samples x {} genes", path.display(), n_rows, genes.len());

    let mut data = Array2::zeros((n_rows, gene_cols.len()));
    let mut row0 = 0;
    for batch in &batches {
        for (out_col, (&col, name)) in gene_cols.iter().zip(&genes).enumerate() {
            let values = float_column(batch, col, name)?;
            for (i, v) in values.into_iter().enumerate() {
                data[[row0 + i, out_col]] = v;
            }
        }
        row0 += batch.num_rows();
    }

    let samples = sample_ids(&batches, sample_col, n_rows)?;
    ExpressionMatrix::new(data, samples, genes)
}

/// Load a samples-by-variants genotype table: every integer column is a
/// variant, an optional leading Utf8 column carries sample ids. Genotype
/// categories must fit in u8.
pub fn read_genotypes(path: impl AsRef<Path>) -> Result<GenotypeMatrix, Error> {
    let path = path.as_ref();
    let batches = open_batches(path)?;
    let Some(first) = batches.first() else {
        bail!("{}: empty Arrow file", path.display())
    };
    let (sample_col, variant_cols, variants) = classify_columns(
        first,
        |t| {
            matches!(
                t,
                DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64
            )
        },
    );
    if variant_cols.is_empty() {
        bail!("{}: no integer variant columns found", path.display());
    }

    let n_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    debug!("{}: {} samples x {} variants", path.display(), n_rows, variants.len());

    let mut data = Array2::zeros((n_rows, variant_cols.len()));
    let mut row0 = 0;
    for batch in &batches {
        for (out_col, (&col, name)) in variant_cols.iter().zip(&variants).enumerate() {
            let values = int_column(batch, col, name)?;
            for (i, v) in values.into_iter().enumerate() {
                if !(0..=u8::MAX as i64).contains(&v) {
                    bail!("column {name} holds {v}, not a genotype category");
                }
                data[[row0 + i, out_col]] = v as u8;
            }
        }
        row0 += batch.num_rows();
    }

    let samples = sample_ids(&batches, sample_col, n_rows)?;
    GenotypeMatrix::new(data, samples, variants)
}

/// Load a cis gene/eQTL pair table from two Utf8 columns, using the
/// `gene`/`variant` names when present and falling back to the first two
/// string columns otherwise.
pub fn read_pairs(path: impl AsRef<Path>) -> Result<CisPairs, Error> {
    let path = path.as_ref();
    let batches = open_batches(path)?;
    let Some(first) = batches.first() else {
        bail!("{}: empty Arrow file", path.display())
    };

    let schema = first.schema();
    let string_cols: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| matches!(f.data_type(), DataType::Utf8))
        .map(|(i, _)| i)
        .collect();
    let by_name = |wanted: &str| {
        schema
            .fields()
            .iter()
            .position(|f| f.name() == wanted && matches!(f.data_type(), DataType::Utf8))
    };
    let (gene_col, variant_col) = match (by_name("gene"), by_name("variant")) {
        (Some(g), Some(v)) => (g, v),
        _ => {
            if string_cols.len() < 2 {
                bail!("{}: pair table needs two string columns", path.display());
            }
            (string_cols[0], string_cols[1])
        }
    };

    let mut genes = Vec::new();
    let mut variants = Vec::new();
    for batch in &batches {
        string_column(batch, gene_col, &mut genes)?;
        string_column(batch, variant_col, &mut variants)?;
    }
    CisPairs::new(genes, variants)
}
