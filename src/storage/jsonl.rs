//! JSONL (JSON Lines) storage.
//!
//! JSONL is the format of both the normalized inputs and the derived
//! outputs. Each line is a valid JSON object representing one row.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::StorageError;

/// JSONL file writer.
pub struct JsonlWriter<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize> JsonlWriter<T> {
    /// Create a new JSONL writer for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Ensure the parent directory exists.
    fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Write entities, replacing the entire file.
    pub fn write_all(&self, entities: &[T]) -> Result<usize, StorageError> {
        self.ensure_dir()?;

        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        let mut count = 0;

        for entity in entities {
            let json = serde_json::to_string(entity)?;
            writeln!(writer, "{}", json)?;
            count += 1;
        }

        writer.flush()?;
        info!("Wrote {} entities to {:?}", count, self.path);

        Ok(count)
    }
}

/// JSONL file reader.
///
/// Blank lines are skipped. A line that does not parse is an error: every
/// line is a competitor row, and skipping one would silently lose it.
pub struct JsonlReader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    /// Create a new JSONL reader for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Check if the file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read all entities from the file. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<T>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut entities = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;

            if line.trim().is_empty() {
                continue;
            }

            let entity = serde_json::from_str(&line).map_err(|source| StorageError::MalformedLine {
                path: self.path.clone(),
                line: i + 1,
                source,
            })?;
            entities.push(entity);
        }

        debug!("Read {} entities from {:?}", entities.len(), self.path);
        Ok(entities)
    }
}

/// One discovered per-year input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearFile {
    pub year: i32,
    pub path: PathBuf,
}

impl YearFile {
    /// File name, used as provenance label.
    pub fn label(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Read the file as loosely typed JSON rows.
    pub fn read_rows(&self) -> Result<Vec<Map<String, Value>>, StorageError> {
        JsonlReader::new(self.path.clone()).read_all()
    }
}

/// Find every `<year>.jsonl` in a directory, ascending by year.
///
/// A missing directory yields nothing; a `.jsonl` whose stem is not a year
/// is an error.
pub fn discover_year_files(dir: &Path) -> Result<Vec<YearFile>, StorageError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let pattern = dir.join("*.jsonl");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| StorageError::InvalidPath(format!("{:?}", dir)))?;

    let mut files = Vec::new();
    for entry in glob::glob(pattern).map_err(|e| StorageError::InvalidPath(e.to_string()))? {
        let path = entry.map_err(|e| StorageError::Io(e.into()))?;
        let year = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or_else(|| StorageError::InvalidYearFile(path.clone()))?;
        files.push(YearFile { year, path });
    }

    files.sort_by_key(|f| f.year);
    debug!("Discovered {} year files in {:?}", files.len(), dir);
    Ok(files)
}

/// Write a value as pretty JSON, replacing the file.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestEntity {
        id: String,
        name: String,
        value: u32,
    }

    #[test]
    fn test_jsonl_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("test.jsonl");

        let entities = vec![
            TestEntity {
                id: "1".to_string(),
                name: "First".to_string(),
                value: 100,
            },
            TestEntity {
                id: "2".to_string(),
                name: "Second".to_string(),
                value: 200,
            },
        ];

        let writer: JsonlWriter<TestEntity> = JsonlWriter::new(path.clone());
        let count = writer.write_all(&entities).unwrap();
        assert_eq!(count, 2);

        let reader: JsonlReader<TestEntity> = JsonlReader::new(path);
        assert!(reader.exists());
        let read_entities = reader.read_all().unwrap();

        assert_eq!(read_entities, entities);
    }

    #[test]
    fn test_jsonl_read_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let reader: JsonlReader<TestEntity> =
            JsonlReader::new(temp_dir.path().join("nonexistent.jsonl"));
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_jsonl_skips_blank_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blank.jsonl");
        fs::write(&path, "{\"id\":\"1\",\"name\":\"A\",\"value\":1}\n\n   \n").unwrap();

        let reader: JsonlReader<TestEntity> = JsonlReader::new(path);
        assert_eq!(reader.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_jsonl_malformed_line_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.jsonl");
        fs::write(&path, "{\"id\":\"1\",\"name\":\"A\",\"value\":1}\n{not json\n").unwrap();

        let reader: JsonlReader<TestEntity> = JsonlReader::new(path);
        match reader.read_all().unwrap_err() {
            StorageError::MalformedLine { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_discover_year_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("2024.jsonl"), "").unwrap();
        fs::write(temp_dir.path().join("2016.jsonl"), "").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "").unwrap();

        let files = discover_year_files(temp_dir.path()).unwrap();
        let years: Vec<i32> = files.iter().map(|f| f.year).collect();
        assert_eq!(years, vec![2016, 2024]);
        assert_eq!(files[1].label(), "2024.jsonl");
    }

    #[test]
    fn test_discover_rejects_non_year_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("latest.jsonl"), "").unwrap();

        let err = discover_year_files(temp_dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidYearFile(_)));
    }

    #[test]
    fn test_discover_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let files = discover_year_files(&temp_dir.path().join("absent")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_year_file_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("2024.jsonl");
        fs::write(&path, "{\"name\":\"Alice\",\"total_points\":\"1,200\"}\n").unwrap();

        let file = YearFile { year: 2024, path };
        let rows = file.read_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], Value::String("Alice".to_string()));
    }

    #[test]
    fn test_write_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("report.json");
        write_json(&path, &serde_json::json!({"a": 1})).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
    }
}
