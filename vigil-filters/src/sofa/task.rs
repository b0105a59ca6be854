//! Sofa task: score log rows in batches through the interpreter
//!
//! Rows missing from the cache are written to the task's input CSV, the
//! configured function is called with `(input_csv, output_csv, output_json)`,
//! and `output_json` is read back as one result per written row. Scratch files
//! are removed after every call.

use super::interpreter::InterpreterHandle;
use super::FILTER_NAME;
use crate::error::{FilterError, FilterResult};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;
use vigil_common::context::{ERROR_CERTITUDE, MAX_CERTITUDE};
use vigil_common::protocol::FilterRequest;
use vigil_common::{CachedResult, FilterContext, Fingerprint, ResultCache};

/// Per-task scratch file paths, unique per task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchFiles {
    pub input_csv: PathBuf,
    pub output_csv: PathBuf,
    pub output_json: PathBuf,
}

impl ScratchFiles {
    /// Fresh random names under `dir`
    pub fn generate(dir: &Path) -> Self {
        Self {
            input_csv: dir.join(format!("{}.csv", Uuid::new_v4())),
            output_csv: dir.join(format!("{}.csv", Uuid::new_v4())),
            output_json: dir.join(format!("{}.json", Uuid::new_v4())),
        }
    }

    fn arguments(&self) -> Vec<String> {
        [&self.input_csv, &self.output_csv, &self.output_json]
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }

    fn remove(&self) {
        for path in [&self.input_csv, &self.output_csv, &self.output_json] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "Unable to remove scratch file: {}", e),
            }
        }
    }
}

/// Score for one row as returned by the script
#[derive(Debug, Clone, PartialEq)]
struct RowResult {
    certitude: u32,
    details: Value,
}

struct Pending {
    index: usize,
    key: Fingerprint,
}

pub struct SofaTask {
    interpreter: Arc<InterpreterHandle>,
    scratch: ScratchFiles,
}

impl SofaTask {
    pub fn new(interpreter: Arc<InterpreterHandle>, scratch: ScratchFiles) -> Self {
        Self {
            interpreter,
            scratch,
        }
    }

    pub fn scratch(&self) -> &ScratchFiles {
        &self.scratch
    }

    pub async fn evaluate(
        &self,
        ctx: &FilterContext,
        cache: &ResultCache,
        request: &FilterRequest,
    ) -> Vec<u32> {
        let mut results: Vec<Option<RowResult>> = vec![None; request.data.len()];
        let mut pending = Vec::new();
        let mut rows = Vec::new();

        for (index, item) in request.data.iter().enumerate() {
            let Some(row) = row_of(item) else {
                warn!("Invalid row at index {}, expected an array of strings", index);
                continue;
            };
            let key = Fingerprint::of(FILTER_NAME, item);
            match cache.lookup(&key) {
                Some(hit) => {
                    results[index] = Some(RowResult {
                        certitude: hit.certitude,
                        details: hit.payload.unwrap_or(Value::Null),
                    });
                }
                None => {
                    pending.push(Pending { index, key });
                    rows.push(row);
                }
            }
        }

        if !rows.is_empty() {
            match self.invoke(rows).await {
                Ok(scored) => {
                    for (slot, result) in pending.into_iter().zip(scored) {
                        if let Some(result) = result {
                            cache.insert(
                                slot.key,
                                CachedResult::with_payload(result.certitude, result.details.clone()),
                            );
                            results[slot.index] = Some(result);
                        }
                    }
                }
                Err(e) => error!("Sofa invocation failed: {}", e),
            }
        }

        results
            .into_iter()
            .zip(&request.data)
            .map(|(result, item)| match result {
                Some(result) => {
                    if ctx.should_alert(result.certitude) {
                        ctx.alerts().alert(
                            &item.to_string(),
                            result.certitude,
                            request.evt_id.as_deref(),
                            result.details,
                        );
                    }
                    result.certitude
                }
                None => ERROR_CERTITUDE,
            })
            .collect()
    }

    /// One interpreter call for `rows`; `None` marks a row the script scored invalidly
    async fn invoke(&self, rows: Vec<Vec<String>>) -> FilterResult<Vec<Option<RowResult>>> {
        let interpreter = Arc::clone(&self.interpreter);
        let scratch = self.scratch.clone();
        let expected = rows.len();

        let outcome = tokio::task::spawn_blocking(move || -> FilterResult<Value> {
            let outcome = run_script(&interpreter, &scratch, &rows);
            scratch.remove();
            outcome
        })
        .await
        .map_err(|e| FilterError::Invocation(format!("interpreter worker failed: {}", e)))??;

        parse_output(outcome, expected)
    }
}

fn run_script(
    interpreter: &InterpreterHandle,
    scratch: &ScratchFiles,
    rows: &[Vec<String>],
) -> FilterResult<Value> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(&scratch.input_csv)?);
    write_csv(&mut file, rows)?;
    file.flush()?;
    drop(file);

    debug!(rows = rows.len(), "Calling sofa function");
    if !interpreter.call(&scratch.arguments())? {
        return Err(FilterError::Invocation(
            "function reported failure".to_string(),
        ));
    }

    let text = std::fs::read_to_string(&scratch.output_json)?;
    Ok(serde_json::from_str(&text)?)
}

fn parse_output(output: Value, expected: usize) -> FilterResult<Vec<Option<RowResult>>> {
    let Value::Array(entries) = output else {
        return Err(FilterError::Invocation(
            "output is not a JSON array".to_string(),
        ));
    };
    if entries.len() != expected {
        return Err(FilterError::Invocation(format!(
            "expected {} results, got {}",
            expected,
            entries.len()
        )));
    }
    Ok(entries.into_iter().map(parse_result).collect())
}

fn parse_result(entry: Value) -> Option<RowResult> {
    match entry {
        Value::Object(mut fields) => {
            let certitude = fields.remove("certitude").as_ref().and_then(certitude_of)?;
            Some(RowResult {
                certitude,
                details: Value::Object(fields),
            })
        }
        other => certitude_of(&other).map(|certitude| RowResult {
            certitude,
            details: Value::Object(Map::new()),
        }),
    }
}

fn certitude_of(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .filter(|c| *c <= u64::from(MAX_CERTITUDE))
        .map(|c| c as u32)
}

/// Fields of a row: an array of strings (numbers and booleans are accepted as text)
fn row_of(item: &Value) -> Option<Vec<String>> {
    let Value::Array(fields) = item else {
        return None;
    };
    fields
        .iter()
        .map(|field| match field {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}

/// RFC 4180 CSV: fields holding a comma, quote or line break are quoted
fn write_csv<W: Write>(out: &mut W, rows: &[Vec<String>]) -> std::io::Result<()> {
    for row in rows {
        let line = row
            .iter()
            .map(|field| {
                if field.contains([',', '"', '\n', '\r']) {
                    format!("\"{}\"", field.replace('"', "\"\""))
                } else {
                    field.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_csv_quotes_special_fields() {
        let rows = vec![
            vec!["plain".to_string(), "a,b".to_string()],
            vec!["say \"hi\"".to_string(), "two\nlines".to_string()],
        ];
        let mut out = Vec::new();
        write_csv(&mut out, &rows).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "plain,\"a,b\"\n\"say \"\"hi\"\"\",\"two\nlines\"\n"
        );
    }

    #[test]
    fn test_row_of() {
        assert_eq!(
            row_of(&json!(["10.0.0.1", 443, true])),
            Some(vec!["10.0.0.1".to_string(), "443".to_string(), "true".to_string()])
        );
        assert_eq!(row_of(&json!("flat")), None);
        assert_eq!(row_of(&json!([{"nested": 1}])), None);
    }

    #[test]
    fn test_parse_output_shapes() {
        let parsed = parse_output(
            json!([42, {"certitude": 90, "cluster": 3}, {"cluster": 1}, 150]),
            4,
        )
        .unwrap();
        assert_eq!(parsed[0].as_ref().unwrap().certitude, 42);
        assert_eq!(parsed[1].as_ref().unwrap().details, json!({"cluster": 3}));
        assert!(parsed[2].is_none());
        assert!(parsed[3].is_none());
    }

    #[test]
    fn test_parse_output_length_mismatch() {
        assert!(parse_output(json!([1, 2]), 3).is_err());
        assert!(parse_output(json!({"certitude": 1}), 1).is_err());
    }

    #[test]
    fn test_scratch_files_are_unique() {
        let dir = std::env::temp_dir();
        let a = ScratchFiles::generate(&dir);
        let b = ScratchFiles::generate(&dir);
        assert_ne!(a, b);
        assert_ne!(a.input_csv, a.output_csv);
        assert!(a.output_json.to_string_lossy().ends_with(".json"));
    }
}
