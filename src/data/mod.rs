use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub train_file: String,
    pub test_file: String,
    pub labels_file: String,
    pub encoder_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_file: "train_normal.csv".to_string(),
            test_file: "test_features.csv".to_string(),
            labels_file: "test_labels.csv".to_string(),
            encoder_file: "label_encoder.json".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} row {row}: non-numeric value '{value}' in column '{column}'")]
    NonNumeric {
        path: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("{path} row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        path: String,
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("test table has {test} columns but training table has {train}")]
    ColumnMismatch { train: usize, test: usize },

    #[error("label vector has {labels} entries but test table has {rows} rows")]
    LabelMismatch { labels: usize, rows: usize },
}

/// Fixed-width table of real-valued features with a header row.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<f32>>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f32>>) -> Self {
        Self { columns, rows }
    }

    pub fn from_csv_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path_str = path.as_ref().display().to_string();
        let file = File::open(&path).map_err(|source| LoadError::Io {
            path: path_str.clone(),
            source,
        })?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let columns: Vec<String> = reader
            .headers()
            .map_err(|source| LoadError::Csv {
                path: path_str.clone(),
                source,
            })?
            .iter()
            .map(String::from)
            .collect();

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.map_err(|source| LoadError::Csv {
                path: path_str.clone(),
                source,
            })?;
            if record.len() != columns.len() {
                return Err(LoadError::RaggedRow {
                    path: path_str,
                    row: idx,
                    found: record.len(),
                    expected: columns.len(),
                });
            }
            let mut row = Vec::with_capacity(columns.len());
            for (col, field) in record.iter().enumerate() {
                let value = field.parse::<f32>().map_err(|_| LoadError::NonNumeric {
                    path: path_str.clone(),
                    row: idx,
                    column: columns[col].clone(),
                    value: field.to_string(),
                })?;
                row.push(value);
            }
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }
}

/// Bijection between integer class codes and class names. Code = index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path_str = path.as_ref().display().to_string();
        let content = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path_str.clone(),
            source,
        })?;
        let classes: Vec<String> =
            serde_json::from_str(&content).map_err(|source| LoadError::Json {
                path: path_str,
                source,
            })?;
        Ok(Self { classes })
    }

    pub fn class_name(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn read_label_column<P: AsRef<Path>>(path: P) -> Result<Vec<usize>, LoadError> {
    let path_str = path.as_ref().display().to_string();
    let file = File::open(&path).map_err(|source| LoadError::Io {
        path: path_str.clone(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let column = reader
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path_str.clone(),
            source,
        })?
        .get(0)
        .unwrap_or("label")
        .to_string();

    let mut labels = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|source| LoadError::Csv {
            path: path_str.clone(),
            source,
        })?;
        let field = record.get(0).unwrap_or("");
        let code = field.parse::<usize>().map_err(|_| LoadError::NonNumeric {
            path: path_str.clone(),
            row: idx,
            column: column.clone(),
            value: field.to_string(),
        })?;
        labels.push(code);
    }
    Ok(labels)
}

/// The four preprocessing artifacts the pipeline consumes.
pub struct Dataset {
    pub train: FeatureTable,
    pub test: FeatureTable,
    pub labels: Vec<usize>,
    pub encoder: LabelEncoder,
}

impl Dataset {
    /// Loads all artifacts from `dir`. A missing file is reported and yields
    /// `Ok(None)` so the caller can halt without partial state; parse and
    /// shape errors are returned with their cause.
    pub fn load<P: AsRef<Path>>(dir: P, config: &DataConfig) -> Result<Option<Self>, LoadError> {
        let dir = dir.as_ref();
        let expected = [
            &config.train_file,
            &config.test_file,
            &config.labels_file,
            &config.encoder_file,
        ];

        let mut missing = false;
        for name in expected {
            let path = dir.join(name);
            if !path.exists() {
                log::error!("missing artifact: {}", path.display());
                missing = true;
            }
        }
        if missing {
            return Ok(None);
        }

        let train = FeatureTable::from_csv_file(dir.join(&config.train_file))?;
        let test = FeatureTable::from_csv_file(dir.join(&config.test_file))?;
        let labels = read_label_column(dir.join(&config.labels_file))?;
        let encoder = LabelEncoder::from_json_file(dir.join(&config.encoder_file))?;

        if test.num_columns() != train.num_columns() {
            return Err(LoadError::ColumnMismatch {
                train: train.num_columns(),
                test: test.num_columns(),
            });
        }
        if labels.len() != test.num_rows() {
            return Err(LoadError::LabelMismatch {
                labels: labels.len(),
                rows: test.num_rows(),
            });
        }

        Ok(Some(Self {
            train,
            test,
            labels,
            encoder,
        }))
    }

    /// Feature dimensionality, taken from the training table.
    pub fn input_dim(&self) -> usize {
        self.train.num_columns()
    }
}
