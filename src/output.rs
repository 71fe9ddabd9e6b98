//! Output writers for the final proxy set

use crate::pipeline::RunReport;
use crate::proxy::{Anonymity, ProxyRecord, Scheme};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use tracing::info;

const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_STATUS_FILE: &str = "STATUS.md";

const TXT_FILE: &str = "proxies.txt";
const JSON_FILE: &str = "proxies.json";
const JSON_ALL_FILE: &str = "proxies_all.json";
const CSV_FILE: &str = "proxies.csv";
const METADATA_FILE: &str = "metadata.json";

const CSV_HEADER: &str = "address,port,scheme,country,anonymity,latency,last_checked";

static LAST_UPDATED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\*\*Last Updated:\*\*.*$").expect("Invalid status regex"));
static TOTAL_PROXIES_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\*\*Total Proxies:\*\*.*$").expect("Invalid status regex"));

const STATUS_TEMPLATE: &str = "# Proxy List

Automatically updated list of free public HTTP/HTTPS proxies, validated on every run.

**Last Updated:** `never`
**Total Proxies:** `0`

## Files
- `proxies.txt`: working proxies, one `IP:PORT` per line
- `proxies.json`: working proxies keyed by `IP:PORT`
- `proxies_all.json`: every proxy checked in the last run
- `proxies.csv`: working proxies as CSV
- `metadata.json`: run metadata
";

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Name of the status document inside `dir`
    pub status_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            status_file: DEFAULT_STATUS_FILE.to_string(),
        }
    }
}

impl OutputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_status_file(mut self, name: &str) -> Self {
        self.status_file = name.to_string();
        self
    }
}

/// One record as it appears in the JSON artifacts
#[derive(Debug, Serialize)]
struct RecordEntry<'a> {
    address: String,
    port: u16,
    scheme: Scheme,
    country: Option<&'a str>,
    anonymity: Anonymity,
    latency: f64,
    last_checked: Option<String>,
    working: bool,
}

impl<'a> From<&'a ProxyRecord> for RecordEntry<'a> {
    fn from(record: &'a ProxyRecord) -> Self {
        Self {
            address: record.address().to_string(),
            port: record.port(),
            scheme: record.scheme,
            country: record.country.as_deref(),
            anonymity: record.anonymity.unwrap_or_default(),
            latency: record.latency_seconds,
            last_checked: record.last_checked.map(timestamp),
            working: record.is_working,
        }
    }
}

#[derive(Debug, Serialize)]
struct Metadata {
    last_updated: String,
    count: usize,
    checked: usize,
    sources: Vec<String>,
    quick_filter: bool,
    anonymity_check: bool,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Writes every artifact of a run into the output directory
pub struct OutputWriter {
    config: OutputConfig,
}

impl OutputWriter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Create the output directory. Failing here aborts the run.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.config.dir).with_context(|| {
            format!("cannot create output directory {}", self.config.dir.display())
        })
    }

    pub fn write_all(&self, report: &RunReport) -> Result<()> {
        let working = report.working();

        self.write(TXT_FILE, render_txt(&working))?;
        self.write(JSON_FILE, render_json(&working)?)?;
        self.write(JSON_ALL_FILE, render_json(&report.sorted_records())?)?;
        self.write(CSV_FILE, render_csv(&working))?;
        self.write(METADATA_FILE, render_metadata(report)?)?;
        self.update_status(working.len(), report.finished_at)?;

        info!(
            dir = %self.config.dir.display(),
            working = working.len(),
            checked = report.records.len(),
            "artifacts written"
        );
        Ok(())
    }

    fn write(&self, name: &str, content: String) -> Result<()> {
        let path = self.config.dir.join(name);
        fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Rewrite the status lines of the status document, creating it if missing
    pub fn update_status(&self, count: usize, at: DateTime<Utc>) -> Result<()> {
        let path = self.config.dir.join(&self.config.status_file);
        let existing = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => STATUS_TEMPLATE.to_string(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        fs::write(&path, render_status(&existing, count, at))
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

fn render_txt(working: &[&ProxyRecord]) -> String {
    working
        .iter()
        .map(|r| format!("{}\n", r.to_simple_string()))
        .collect()
}

fn render_json(records: &[&ProxyRecord]) -> Result<String> {
    let keyed: BTreeMap<String, RecordEntry<'_>> = records
        .iter()
        .map(|r| (r.to_simple_string(), RecordEntry::from(*r)))
        .collect();
    Ok(serde_json::to_string_pretty(&keyed)?)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_csv(working: &[&ProxyRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for record in working {
        let row = [
            record.address().to_string(),
            record.port().to_string(),
            record.scheme.to_string(),
            csv_field(record.country.as_deref().unwrap_or("")),
            record.anonymity.unwrap_or_default().to_string(),
            format!("{:.2}", record.latency_seconds),
            record.last_checked.map(timestamp).unwrap_or_default(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn render_metadata(report: &RunReport) -> Result<String> {
    let hosts: BTreeSet<String> = report
        .sources
        .iter()
        .map(|s| {
            reqwest::Url::parse(&s.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| s.name.clone())
        })
        .collect();

    let metadata = Metadata {
        last_updated: timestamp(report.finished_at),
        count: report.working().len(),
        checked: report.records.len(),
        sources: hosts.into_iter().collect(),
        quick_filter: report.quick_filtered(),
        anonymity_check: report.anonymity_checked,
    };
    Ok(serde_json::to_string_pretty(&metadata)?)
}

fn render_status(existing: &str, count: usize, at: DateTime<Utc>) -> String {
    let now = at.format("%A %d-%m-%Y %H:%M:%S UTC");
    let content = LAST_UPDATED_LINE.replace_all(
        existing,
        format!("**Last Updated:** `{}`  ", now).as_str(),
    );
    TOTAL_PROXIES_LINE
        .replace_all(&content, format!("**Total Proxies:** `{}`", count).as_str())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineState, SourceSummary};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 18, 15, 15, 4).unwrap()
    }

    fn record(addr: &str, working: bool, latency: f64) -> ProxyRecord {
        let mut record = ProxyRecord::new(addr.parse().unwrap(), Scheme::Http);
        if working {
            record.mark_working(latency, fixed_time());
            record.anonymity = Some(Anonymity::High);
        } else {
            record.mark_failed(fixed_time());
        }
        record
    }

    fn report(records: Vec<ProxyRecord>) -> RunReport {
        RunReport {
            records,
            sources: vec![SourceSummary {
                name: "speedx".to_string(),
                url: "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt"
                    .to_string(),
                format: None,
                candidates: 0,
                accepted: 0,
                error: None,
            }],
            states: vec![PipelineState::Idle, PipelineState::Done],
            registered: 0,
            anonymity_checked: true,
            started_at: fixed_time(),
            finished_at: fixed_time(),
        }
    }

    #[test]
    fn test_render_txt_sorted_working_only() {
        let report = report(vec![
            record("5.6.7.8:3128", true, 0.5),
            record("9.9.9.9:80", false, 0.0),
            record("1.2.3.4:8080", true, 0.25),
        ]);
        assert_eq!(render_txt(&report.working()), "1.2.3.4:8080\n5.6.7.8:3128\n");
    }

    #[test]
    fn test_render_csv() {
        let mut with_country = record("1.2.3.4:8080", true, 0.256);
        with_country.country = Some("Korea, Republic of".to_string());
        let report = report(vec![with_country, record("5.6.7.8:3128", true, 1.0)]);

        let csv = render_csv(&report.working());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "1.2.3.4,8080,http,\"Korea, Republic of\",high,0.26,2025-05-18T15:15:04Z"
        );
        assert_eq!(lines[2], "5.6.7.8,3128,http,,high,1.00,2025-05-18T15:15:04Z");
    }

    #[test]
    fn test_render_json_keyed_by_endpoint() {
        let report = report(vec![record("1.2.3.4:8080", true, 0.5)]);
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&report.working()).unwrap()).unwrap();
        let entry = &json["1.2.3.4:8080"];
        assert_eq!(entry["address"], "1.2.3.4");
        assert_eq!(entry["port"], 8080);
        assert_eq!(entry["scheme"], "http");
        assert_eq!(entry["anonymity"], "high");
        assert_eq!(entry["latency"], 0.5);
        assert_eq!(entry["working"], true);
        assert_eq!(entry["last_checked"], "2025-05-18T15:15:04Z");
        assert!(entry["country"].is_null());
    }

    #[test]
    fn test_render_status_replaces_lines() {
        let existing = "# Title\n\n**Last Updated:** `old`  \n**Total Proxies:** `3`\n\nfooter\n";
        let rendered = render_status(existing, 42, fixed_time());
        assert_eq!(
            rendered,
            "# Title\n\n**Last Updated:** `Sunday 18-05-2025 15:15:04 UTC`  \n**Total Proxies:** `42`\n\nfooter\n"
        );
    }

    #[test]
    fn test_write_all_creates_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested").join("output");
        let writer = OutputWriter::new(OutputConfig::new().with_dir(&out_dir));
        writer.prepare().unwrap();

        let report = report(vec![
            record("1.2.3.4:8080", true, 0.5),
            record("9.9.9.9:80", false, 0.0),
        ]);
        writer.write_all(&report).unwrap();

        let txt = fs::read_to_string(out_dir.join(TXT_FILE)).unwrap();
        assert_eq!(txt, "1.2.3.4:8080\n");

        let all: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out_dir.join(JSON_ALL_FILE)).unwrap())
                .unwrap();
        assert_eq!(all.as_object().unwrap().len(), 2);
        assert_eq!(all["9.9.9.9:80"]["working"], false);

        let metadata: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out_dir.join(METADATA_FILE)).unwrap())
                .unwrap();
        assert_eq!(metadata["count"], 1);
        assert_eq!(metadata["checked"], 2);
        assert_eq!(metadata["sources"][0], "raw.githubusercontent.com");

        let status = fs::read_to_string(out_dir.join(DEFAULT_STATUS_FILE)).unwrap();
        assert!(status.contains("**Total Proxies:** `1`"));
        assert!(status.contains("Sunday 18-05-2025 15:15:04 UTC"));
    }

    #[test]
    fn test_write_all_with_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(OutputConfig::new().with_dir(dir.path()));
        writer.prepare().unwrap();
        writer.write_all(&report(Vec::new())).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join(TXT_FILE)).unwrap(), "");
        assert_eq!(
            fs::read_to_string(dir.path().join(CSV_FILE)).unwrap(),
            format!("{}\n", CSV_HEADER)
        );
        assert_eq!(fs::read_to_string(dir.path().join(JSON_FILE)).unwrap(), "{}");
    }

    #[test]
    fn test_prepare_fails_when_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let writer = OutputWriter::new(OutputConfig::new().with_dir(blocker.join("out")));
        assert!(writer.prepare().is_err());
    }
}
