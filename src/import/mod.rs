//! Bulk enqueue sources
//!
//! Every source turns a file into raw [`JobRequest`]s that go through the same
//! enqueue path as a single `add`. Records without a usable prompt are skipped.
//!
//! - TXT: one prompt per non-empty line
//! - YAML / JSON: a list of `{prompt, negative_prompt?, seed?, person_generation?}`
//! - CSV: a header row naming `prompt`, `negativePrompt`, `seed` and
//!   `personGeneration` (snake_case headers work too), one request per row

mod watch;

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::domain::JobRequest;
use crate::error::{QueueError, Result};
use crate::scheduler::QueueHandle;

pub use watch::{DirectoryWatcher, WATCH_EXTENSIONS};

/// One prompt per non-empty trimmed line
pub fn parse_txt(text: &str) -> Vec<JobRequest> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(JobRequest::new)
        .collect()
}

/// A YAML (or JSON) list of request records. Records that do not deserialize
/// or have an empty prompt are dropped.
pub fn parse_batch(text: &str) -> Result<Vec<JobRequest>> {
    let records: Vec<serde_yaml::Value> = serde_yaml::from_str(text)?;
    let total = records.len();

    let requests: Vec<JobRequest> = records
        .into_iter()
        .filter_map(|record| serde_yaml::from_value::<JobRequest>(record).ok())
        .filter(|request| !request.prompt.trim().is_empty())
        .collect();

    if requests.len() < total {
        log::debug!("Skipped {} malformed batch records", total - requests.len());
    }
    Ok(requests)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    prompt: String,
    #[serde(default, alias = "negativePrompt")]
    negative_prompt: Option<String>,
    #[serde(default)]
    seed: Option<u32>,
    #[serde(default, alias = "personGeneration")]
    person_generation: Option<String>,
}

impl From<CsvRow> for JobRequest {
    fn from(row: CsvRow) -> Self {
        Self {
            prompt: row.prompt,
            negative_prompt: row.negative_prompt.filter(|s| !s.is_empty()),
            seed: row.seed,
            person_generation: row.person_generation.filter(|s| !s.is_empty()),
        }
    }
}

/// Header-keyed CSV rows. Rows that do not deserialize or have an empty prompt
/// are dropped; unknown columns are ignored.
pub fn parse_csv(text: &str) -> Vec<JobRequest> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut skipped = 0;
    let requests: Vec<JobRequest> = reader
        .deserialize::<CsvRow>()
        .filter_map(|row| match row {
            Ok(row) if !row.prompt.is_empty() => Some(JobRequest::from(row)),
            Ok(_) => {
                skipped += 1;
                None
            }
            Err(e) => {
                log::debug!("Skipped CSV row: {}", e);
                skipped += 1;
                None
            }
        })
        .collect();

    if skipped > 0 {
        log::debug!("Skipped {} CSV rows", skipped);
    }
    requests
}

/// Read requests from a file, choosing the parser by extension
pub fn read_requests(path: &Path) -> Result<Vec<JobRequest>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let text = fs::read_to_string(path)?;
    match extension.as_str() {
        "txt" => Ok(parse_txt(&text)),
        "yml" | "yaml" | "json" => parse_batch(&text),
        "csv" => Ok(parse_csv(&text)),
        other => Err(QueueError::InvalidRequest(format!(
            "unsupported import file type '{}': {}",
            other,
            path.display()
        ))),
    }
}

/// Enqueue every request from `path`. Returns how many jobs were added.
pub async fn import_file(handle: &QueueHandle, path: &Path) -> Result<usize> {
    let requests = read_requests(path)?;
    let mut added = 0;
    for request in requests {
        match handle.enqueue(request).await {
            Ok(_) => added += 1,
            Err(QueueError::InvalidRequest(reason)) => {
                log::debug!("Skipped record from {}: {}", path.display(), reason);
            }
            Err(e) => return Err(e),
        }
    }
    log::info!("Imported {} jobs from {}", added, path.display());
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_txt() {
        let requests = parse_txt("a fox\n\n   \n  a whale  \r\nan owl");
        let prompts: Vec<_> = requests.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["a fox", "a whale", "an owl"]);
    }

    #[test]
    fn test_parse_batch_yaml() {
        let text = r#"
- prompt: a fox
  seed: 7
- prompt: a whale
  negative_prompt: boats
  person_generation: dont_allow
"#;
        let requests = parse_batch(text).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].seed, Some(7));
        assert_eq!(requests[1].negative_prompt.as_deref(), Some("boats"));
        assert_eq!(requests[1].person_generation.as_deref(), Some("dont_allow"));
    }

    #[test]
    fn test_parse_batch_json() {
        let text = r#"[{"prompt": "a fox"}, {"prompt": "a whale", "seed": 3}]"#;
        let requests = parse_batch(text).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].seed, Some(3));
    }

    #[test]
    fn test_parse_batch_skips_malformed_records() {
        let text = r#"
- prompt: good
- prompt: ""
- seed: not-a-number
- just a string
- prompt: also good
"#;
        let requests = parse_batch(text).unwrap();
        let prompts: Vec<_> = requests.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["good", "also good"]);
    }

    #[test]
    fn test_parse_batch_not_a_list() {
        assert!(matches!(parse_batch("prompt: a fox"), Err(QueueError::Yaml(_))));
    }

    #[test]
    fn test_read_requests_by_extension() {
        let temp = TempDir::new().unwrap();
        let txt = temp.path().join("prompts.txt");
        fs::write(&txt, "one\ntwo\n").unwrap();
        assert_eq!(read_requests(&txt).unwrap().len(), 2);

        let json = temp.path().join("batch.JSON");
        fs::write(&json, r#"[{"prompt": "three"}]"#).unwrap();
        assert_eq!(read_requests(&json).unwrap().len(), 1);

        let csv = temp.path().join("prompts.csv");
        fs::write(&csv, "prompt\nfour\n").unwrap();
        assert_eq!(read_requests(&csv).unwrap()[0].prompt, "four");

        let md = temp.path().join("notes.md");
        fs::write(&md, "five\n").unwrap();
        assert!(matches!(read_requests(&md), Err(QueueError::InvalidRequest(_))));
    }

    #[test]
    fn test_parse_csv_skips_empty_prompts() {
        let requests = parse_csv("prompt,negativePrompt,seed\na fox,blurry,7\n,skip,\na whale,,\n");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].prompt, "a fox");
        assert_eq!(requests[0].negative_prompt.as_deref(), Some("blurry"));
        assert_eq!(requests[0].seed, Some(7));
        assert_eq!(requests[1].prompt, "a whale");
        assert!(requests[1].negative_prompt.is_none());
        assert!(requests[1].seed.is_none());
    }

    #[test]
    fn test_parse_csv_header_aliases_and_bad_rows() {
        let text = "seed,person_generation,prompt,extra\n\
                    3,dont_allow,\"a lantern, lit\",x\n\
                    not-a-number,,a kite,\n\
                    ,allow_adult, an owl ,\n";
        let requests = parse_csv(text);
        let prompts: Vec<_> = requests.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["a lantern, lit", "an owl"]);
        assert_eq!(requests[0].seed, Some(3));
        assert_eq!(requests[0].person_generation.as_deref(), Some("dont_allow"));
        assert_eq!(requests[1].person_generation.as_deref(), Some("allow_adult"));
    }

    #[test]
    fn test_parse_csv_without_prompt_column() {
        assert!(parse_csv("title,seed\na fox,1\n").is_empty());
        assert!(parse_csv("").is_empty());
    }
}
