//! Dataset loading.
//!
//! Turns a [`DataRef`] into an in-memory DataFrame plus a [`LoadProfile`].
//! Only local files are supported; csv, xlsx, parquet, and json formats.
//! CSV text encoding and delimiter are auto-detected when not declared.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use polars::prelude::*;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::stage::PipelineStage;
use crate::types::{DataFormat, DataRef, LoadProfile, StorageKind};
use crate::utils::{dtype_label, total_missing_cells};

/// Cell values treated as null when parsing CSV.
pub const DEFAULT_NULL_VALUES: [&str; 7] = ["", "NA", "N/A", "null", "NULL", "None", "none"];

/// Delimiters tried, in priority order, when none is declared.
pub const DELIMITER_CANDIDATES: [u8; 4] = [b',', b'\t', b';', b'|'];

/// Load a dataset from its source reference.
pub fn load_dataset(
    data_ref: &DataRef,
    config: &EngineConfig,
) -> Result<(DataFrame, LoadProfile)> {
    if data_ref.storage != StorageKind::LocalFile {
        return Err(load_error(
            "Unsupported storage kind: only local_file sources are supported",
            data_ref,
        ));
    }

    let path = Path::new(&data_ref.path);
    if !path.is_file() {
        return Err(load_error(
            format!("File not found: {}", data_ref.path),
            data_ref,
        ));
    }

    let size = std::fs::metadata(path)
        .map_err(|e| load_error(format!("Cannot stat file: {}", e), data_ref))?
        .len();
    if size > config.max_file_size_bytes {
        return Err(load_error(
            format!(
                "File size {} bytes exceeds the {} byte limit",
                size, config.max_file_size_bytes
            ),
            data_ref,
        ));
    }

    let df = match data_ref.format {
        DataFormat::Csv => load_csv(data_ref, config)?,
        DataFormat::Xlsx => load_xlsx(data_ref)?,
        DataFormat::Parquet => load_parquet(data_ref)?,
        DataFormat::Json => load_json(data_ref)?,
    };

    if df.height() == 0 || df.width() == 0 {
        return Err(load_error("Dataset is empty after parsing", data_ref));
    }
    if df.height() > config.max_rows {
        return Err(load_error(
            format!(
                "Dataset has {} rows, exceeding the {} row limit",
                df.height(),
                config.max_rows
            ),
            data_ref,
        ));
    }
    if df.width() > config.max_cols {
        return Err(load_error(
            format!(
                "Dataset has {} columns, exceeding the {} column limit",
                df.width(),
                config.max_cols
            ),
            data_ref,
        ));
    }

    let profile = profile_loaded(&df);
    debug!(
        rows = profile.rows,
        cols = profile.cols,
        missing = profile.total_missing_cells,
        "dataset loaded"
    );
    Ok((df, profile))
}

fn load_error(message: impl Into<String>, data_ref: &DataRef) -> PipelineError {
    PipelineError::stage_with_detail(
        PipelineStage::Load,
        message,
        Some(json!({"path": data_ref.path, "format": data_ref.format})),
    )
}

fn profile_loaded(df: &DataFrame) -> LoadProfile {
    let rows = df.height();
    let cols = df.width();
    let mut dtypes = BTreeMap::new();
    for column in df.get_columns() {
        dtypes.insert(
            column.name().to_string(),
            dtype_label(column.dtype()).to_string(),
        );
    }
    let total_missing = total_missing_cells(df);
    let total_cells = rows * cols;
    LoadProfile {
        rows,
        cols,
        dtypes,
        total_missing_cells: total_missing,
        missing_rate: if total_cells == 0 {
            0.0
        } else {
            total_missing as f64 / total_cells as f64
        },
    }
}

// =============================================================================
// CSV
// =============================================================================

fn load_csv(data_ref: &DataRef, config: &EngineConfig) -> Result<DataFrame> {
    let bytes = std::fs::read(&data_ref.path)
        .map_err(|e| load_error(format!("Cannot read file: {}", e), data_ref))?;
    let text = decode_text(&bytes, data_ref, config)?;

    if let Some(delimiter) = data_ref.delimiter {
        let delim = u8::try_from(delimiter as u32)
            .map_err(|_| load_error("Declared delimiter is not a single-byte character", data_ref))?;
        return try_parse_csv(&text, delim)
            .map_err(|e| load_error(format!("CSV parse failed: {}", e), data_ref))
            .and_then(|df| non_empty(df, data_ref));
    }

    // try each candidate, keeping the parse that yields the most columns
    // with at least one row
    let mut best: Option<DataFrame> = None;
    for &delim in &DELIMITER_CANDIDATES {
        match try_parse_csv(&text, delim) {
            Ok(df) if df.height() >= 1 => {
                let better = best
                    .as_ref()
                    .map(|b| df.width() > b.width())
                    .unwrap_or(true);
                if better {
                    best = Some(df);
                }
            }
            Ok(_) => {}
            Err(e) => debug!(delimiter = %(delim as char), error = %e, "delimiter candidate failed"),
        }
    }
    if let Some(df) = best {
        return Ok(df);
    }

    // final fallback: infer by counting candidate bytes in the sample
    let sample = &text.as_bytes()[..text.len().min(config.sniff_bytes)];
    let inferred = DELIMITER_CANDIDATES
        .iter()
        .copied()
        .max_by_key(|d| sample.iter().filter(|&&b| b == *d).count())
        .unwrap_or(b',');
    warn!(
        delimiter = %(inferred as char),
        "all delimiter candidates failed, retrying with inferred delimiter"
    );
    try_parse_csv(&text, inferred)
        .map_err(|e| load_error(format!("CSV parse failed: {}", e), data_ref))
        .and_then(|df| non_empty(df, data_ref))
}

fn non_empty(df: DataFrame, data_ref: &DataRef) -> Result<DataFrame> {
    if df.height() == 0 {
        Err(load_error("CSV parsed to zero rows", data_ref))
    } else {
        Ok(df)
    }
}

fn try_parse_csv(text: &str, delimiter: u8) -> PolarsResult<DataFrame> {
    let null_markers: Vec<PlSmallStr> = DEFAULT_NULL_VALUES.iter().map(|s| (*s).into()).collect();
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(delimiter)
                .with_quote_char(Some(b'"'))
                .with_null_values(Some(NullValues::AllColumns(null_markers))),
        )
        .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
        .finish()
}

/// Decode raw bytes using the declared encoding, or detect by sampling:
/// valid UTF-8 wins, otherwise Latin-1 (every byte maps to the same code
/// point, so it cannot fail).
fn decode_text(bytes: &[u8], data_ref: &DataRef, config: &EngineConfig) -> Result<String> {
    match data_ref.encoding.as_deref().map(str::to_ascii_lowercase) {
        Some(enc) if enc == "utf-8" || enc == "utf8" => String::from_utf8(bytes.to_vec())
            .map_err(|e| load_error(format!("File is not valid UTF-8: {}", e), data_ref)),
        Some(enc) if enc == "latin-1" || enc == "latin1" || enc == "iso-8859-1" => {
            Ok(decode_latin1(bytes))
        }
        Some(enc) => Err(load_error(
            format!("Unsupported encoding: {}", enc),
            data_ref,
        )),
        None => {
            let sample = &bytes[..bytes.len().min(config.sniff_bytes)];
            if std::str::from_utf8(sample).is_ok() {
                match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Ok(text),
                    // sample was clean but the tail is not
                    Err(_) => Ok(decode_latin1(bytes)),
                }
            } else {
                debug!("sample is not valid UTF-8, falling back to Latin-1");
                Ok(decode_latin1(bytes))
            }
        }
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

// =============================================================================
// XLSX
// =============================================================================

fn load_xlsx(data_ref: &DataRef) -> Result<DataFrame> {
    use calamine::{Data, Reader};

    let mut workbook = calamine::open_workbook_auto(&data_ref.path)
        .map_err(|e| load_error(format!("Cannot open workbook: {}", e), data_ref))?;

    let sheet_name = match &data_ref.sheet {
        Some(name) => name.clone(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| load_error("Workbook has no sheets", data_ref))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| load_error(format!("Cannot read sheet '{}': {}", sheet_name, e), data_ref))?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| load_error("Sheet is empty", data_ref))?
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Data::Empty => format!("column_{}", i),
            other => other.to_string(),
        })
        .collect();

    let mut raw_columns: Vec<Vec<Option<String>>> = vec![Vec::new(); header.len()];
    for row in rows {
        for (i, slot) in raw_columns.iter_mut().enumerate() {
            let cell = row.get(i).unwrap_or(&Data::Empty);
            slot.push(match cell {
                Data::Empty => None,
                Data::String(s) if s.trim().is_empty() => None,
                Data::String(s) => Some(s.clone()),
                Data::Float(f) => Some(format_float_cell(*f)),
                Data::Int(i) => Some(i.to_string()),
                Data::Bool(b) => Some(b.to_string()),
                other => Some(other.to_string()),
            });
        }
    }

    let columns: Vec<Column> = header
        .iter()
        .zip(raw_columns)
        .map(|(name, values)| infer_series(name, values).into())
        .collect();
    DataFrame::new(columns).map_err(|e| load_error(format!("Cannot build frame: {}", e), data_ref))
}

fn format_float_cell(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Build a Series from stringly cell values, preferring Int64, then
/// Float64, falling back to String.
fn infer_series(name: &str, values: Vec<Option<String>>) -> Series {
    let non_null: Vec<&String> = values.iter().flatten().collect();
    if !non_null.is_empty() && non_null.iter().all(|v| v.trim().parse::<i64>().is_ok()) {
        let ints: Vec<Option<i64>> = values
            .iter()
            .map(|v| v.as_ref().and_then(|s| s.trim().parse::<i64>().ok()))
            .collect();
        return Series::new(name.into(), ints);
    }
    if !non_null.is_empty() && non_null.iter().all(|v| v.trim().parse::<f64>().is_ok()) {
        let floats: Vec<Option<f64>> = values
            .iter()
            .map(|v| v.as_ref().and_then(|s| s.trim().parse::<f64>().ok()))
            .collect();
        return Series::new(name.into(), floats);
    }
    Series::new(name.into(), values)
}

// =============================================================================
// Parquet and JSON
// =============================================================================

fn load_parquet(data_ref: &DataRef) -> Result<DataFrame> {
    let file = std::fs::File::open(&data_ref.path)
        .map_err(|e| load_error(format!("Cannot open file: {}", e), data_ref))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| load_error(format!("Parquet parse failed: {}", e), data_ref))
}

fn load_json(data_ref: &DataRef) -> Result<DataFrame> {
    let bytes = std::fs::read(&data_ref.path)
        .map_err(|e| load_error(format!("Cannot read file: {}", e), data_ref))?;
    JsonReader::new(Cursor::new(bytes))
        .finish()
        .map_err(|e| load_error(format!("JSON parse failed: {}", e), data_ref))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str, ext: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{}", ext))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn csv_ref(path: &str) -> DataRef {
        DataRef::local_csv(path)
    }

    #[test]
    fn test_load_simple_csv() {
        let file = write_temp("a,b\n1,x\n2,y\n", "csv");
        let config = EngineConfig::default();
        let (df, profile) = load_dataset(&csv_ref(file.path().to_str().unwrap()), &config).unwrap();
        assert_eq!(df.shape(), (2, 2));
        assert_eq!(profile.rows, 2);
        assert_eq!(profile.dtypes["a"], "numeric");
        assert_eq!(profile.dtypes["b"], "string");
    }

    #[test]
    fn test_delimiter_detection_prefers_most_columns() {
        let file = write_temp("a;b;c\n1;2;3\n4;5;6\n", "csv");
        let config = EngineConfig::default();
        let (df, _) = load_dataset(&csv_ref(file.path().to_str().unwrap()), &config).unwrap();
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn test_null_markers_become_missing() {
        let file = write_temp("a,b\n1,NA\n2,null\n3,x\n", "csv");
        let config = EngineConfig::default();
        let (df, profile) = load_dataset(&csv_ref(file.path().to_str().unwrap()), &config).unwrap();
        assert_eq!(df.column("b").unwrap().null_count(), 2);
        assert_eq!(profile.total_missing_cells, 2);
    }

    #[test]
    fn test_missing_file_fails_at_load() {
        let config = EngineConfig::default();
        let err = load_dataset(&csv_ref("/nonexistent/file.csv"), &config).unwrap_err();
        assert_eq!(err.stage(), "load");
    }

    #[test]
    fn test_size_limit_enforced() {
        let file = write_temp("a,b\n1,x\n2,y\n", "csv");
        let config = EngineConfig::builder()
            .max_file_size_bytes(4)
            .build()
            .unwrap();
        let err = load_dataset(&csv_ref(file.path().to_str().unwrap()), &config).unwrap_err();
        assert_eq!(err.stage(), "load");
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_row_limit_enforced() {
        let file = write_temp("a\n1\n2\n3\n4\n", "csv");
        let config = EngineConfig::builder().max_rows(2).build().unwrap();
        let err = load_dataset(&csv_ref(file.path().to_str().unwrap()), &config).unwrap_err();
        assert_eq!(err.stage(), "load");
    }

    #[test]
    fn test_non_local_storage_rejected() {
        let mut data_ref = csv_ref("/tmp/whatever.csv");
        data_ref.storage = StorageKind::ObjectStore;
        let err = load_dataset(&data_ref, &EngineConfig::default()).unwrap_err();
        assert_eq!(err.stage(), "load");
    }

    #[test]
    fn test_header_only_csv_is_empty() {
        let file = write_temp("a,b\n", "csv");
        let err =
            load_dataset(&csv_ref(file.path().to_str().unwrap()), &EngineConfig::default())
                .unwrap_err();
        assert_eq!(err.stage(), "load");
    }

    #[test]
    fn test_latin1_fallback() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        // 0xE9 is 'é' in Latin-1 and invalid as a standalone UTF-8 byte
        file.write_all(b"name,v\ncaf\xe9,1\n").unwrap();
        file.flush().unwrap();
        let (df, _) = load_dataset(
            &csv_ref(file.path().to_str().unwrap()),
            &EngineConfig::default(),
        )
        .unwrap();
        let val = df.column("name").unwrap().get(0).unwrap().to_string();
        assert!(val.contains('é'));
    }

    #[test]
    fn test_load_json_records() {
        let file = write_temp(r#"[{"a": 1, "b": "x"}, {"a": 2, "b": "y"}]"#, "json");
        let mut data_ref = csv_ref(file.path().to_str().unwrap());
        data_ref.format = DataFormat::Json;
        let (df, _) = load_dataset(&data_ref, &EngineConfig::default()).unwrap();
        assert_eq!(df.shape(), (2, 2));
    }
}
