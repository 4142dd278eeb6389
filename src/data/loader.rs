use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use ndarray::{Array as NdArray, Array2, Array3, Axis, Dimension};
use ndarray_npy::{read_npy, ReadNpyError};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a numeric table (rows = time steps, columns = features).
/// Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, then one numeric record per time step
/// * `.parquet` – any numeric columns; cast to `f32` in schema order
pub fn load_table(path: &Path) -> Result<Array2<f32>> {
    match extension(path).as_str() {
        "csv" => load_csv_table(path),
        "parquet" | "pq" => load_parquet_table(path),
        other => bail!("Unsupported table extension: .{other}"),
    }
}

/// Load a 2-D `.npy` array, e.g. per-chunk text embeddings.
pub fn load_npy_matrix(path: &Path) -> Result<Array2<f32>> {
    read_npy_f32(path)
}

/// Load a 3-D `.npy` array of shape `(time, 1, features)` and drop the
/// singleton axis.
pub fn load_npy_squeezed(path: &Path) -> Result<Array2<f32>> {
    let array: Array3<f32> = read_npy_f32(path)?;
    let singleton = array.len_of(Axis(1));
    if singleton != 1 {
        bail!(
            "{}: expected axis 1 of length 1, got shape {:?}",
            path.display(),
            array.shape()
        );
    }
    Ok(array.index_axis_move(Axis(1), 0))
}

/// Write a numeric table as CSV with the given header.
pub fn write_csv_table(path: &Path, header: &[String], table: &Array2<f32>) -> Result<()> {
    if header.len() != table.ncols() {
        bail!(
            "header has {} columns but table has {}",
            header.len(),
            table.ncols()
        );
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(header).context("writing CSV header")?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one record per time step.
/// Every cell must parse as a float.
fn load_csv_table(path: &Path) -> Result<Array2<f32>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening CSV {}", path.display()))?;
    let n_cols = reader.headers().context("reading CSV headers")?.len();

    let mut values = Vec::new();
    let mut n_rows = 0;
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("{}: CSV row {row_no}", path.display()))?;
        if record.len() != n_cols {
            bail!(
                "{}: CSV row {row_no} has {} fields, header has {n_cols}",
                path.display(),
                record.len()
            );
        }
        for (col, cell) in record.iter().enumerate() {
            let value = cell.trim().parse::<f32>().with_context(|| {
                format!("{}: row {row_no}, column {col}: '{cell}' is not a number", path.display())
            })?;
            values.push(value);
        }
        n_rows += 1;
    }

    Array2::from_shape_vec((n_rows, n_cols), values)
        .with_context(|| format!("{}: building {n_rows}x{n_cols} table", path.display()))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet table whose columns are all numeric (Int32/Int64/Float32/
/// Float64). Record batches are concatenated in file order.
fn load_parquet_table(path: &Path) -> Result<Array2<f32>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening parquet file {}", path.display()))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let n_cols = builder.schema().fields().len();
    let reader = builder.build().context("building parquet reader")?;

    let mut values = Vec::new();
    let mut n_rows = 0;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let columns = batch
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| column_as_f64(col.as_ref(), i))
            .collect::<Result<Vec<Float64Array>>>()?;

        for row in 0..batch.num_rows() {
            for (i, col) in columns.iter().enumerate() {
                if col.is_null(row) {
                    bail!("{}: null value at row {}, column {i}", path.display(), n_rows + row);
                }
                values.push(col.value(row) as f32);
            }
        }
        n_rows += batch.num_rows();
    }

    Array2::from_shape_vec((n_rows, n_cols), values)
        .with_context(|| format!("{}: building {n_rows}x{n_cols} table", path.display()))
}

// -- Arrow helpers --

fn column_as_f64(col: &dyn Array, index: usize) -> Result<Float64Array> {
    match col.data_type() {
        DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64 => {}
        other => bail!("column {index}: expected a numeric column, got {other:?}"),
    }
    let casted = cast(col, &DataType::Float64)
        .with_context(|| format!("column {index}: casting to Float64"))?;
    let floats = casted
        .as_any()
        .downcast_ref::<Float64Array>()
        .context("expected Float64Array after cast")?;
    Ok(floats.clone())
}

// ---------------------------------------------------------------------------
// NPY loader
// ---------------------------------------------------------------------------

/// Read an `.npy` file stored as either `<f4` or `<f8`.
fn read_npy_f32<D: Dimension>(path: &Path) -> Result<NdArray<f32, D>> {
    match read_npy::<_, NdArray<f32, D>>(path) {
        Ok(array) => Ok(array),
        Err(ReadNpyError::WrongDescriptor(_)) => {
            let array: NdArray<f64, D> = read_npy(path)
                .with_context(|| format!("reading {} as f64", path.display()))?;
            Ok(array.mapv(|v| v as f32))
        }
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}
