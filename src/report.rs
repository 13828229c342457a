//! Findings, the scan report and its JSON persistence.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ReportError;
use crate::fetch::Method;

pub const TOOL_NAME: &str = "IDXSS PRO";

/// Where a payload came back in the response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reflection {
    /// Echoed verbatim, no script tag in the page.
    Reflected,
    /// Echoed verbatim and the page opens a `<script` tag.
    Script,
}

/// Outcome of one payload against one target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub endpoint: Url,
    pub method: Method,
    pub params: Vec<String>,
    pub payload: String,
    pub context: Option<Reflection>,
    /// Similarity between the baseline and the probe response. Absent when
    /// the baseline could not be fetched or the responses were too far apart
    /// to align.
    #[serde(rename = "diff")]
    pub similarity: Option<f64>,
    #[serde(rename = "response")]
    pub raw_response: String,
}

impl Finding {
    pub fn is_flagged(&self) -> bool {
        self.context.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub tool: String,
    pub target: Url,
    pub time: DateTime<Utc>,
    pub results: Vec<Finding>,
}

impl Report {
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("report written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let content = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            findings: self.results.len(),
            ..Summary::default()
        };
        let mut endpoints = HashSet::new();
        for finding in &self.results {
            match finding.context {
                Some(Reflection::Reflected) => summary.reflected += 1,
                Some(Reflection::Script) => summary.script += 1,
                None => continue,
            }
            endpoints.insert(finding.endpoint.as_str());
        }
        summary.flagged_endpoints = endpoints.len();
        summary
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub findings: usize,
    pub reflected: usize,
    pub script: usize,
    pub flagged_endpoints: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Collects findings from concurrent probes.
///
/// Findings are keyed by target index; `finish` orders them by that index and
/// keeps the per-target catalog order, so the report order does not depend on
/// which target finished first.
pub struct Aggregator {
    target: Url,
    started: DateTime<Utc>,
    total: AtomicUsize,
    completed: AtomicUsize,
    findings: Mutex<Vec<(usize, Finding)>>,
}

impl Aggregator {
    pub fn new(target: Url) -> Self {
        Self {
            target,
            started: Utc::now(),
            total: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            findings: Mutex::new(Vec::new()),
        }
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Counts one attempted probe.
    pub fn tick(&self) -> Progress {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        Progress {
            completed,
            total: self.total.load(Ordering::Relaxed),
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.completed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }

    pub fn append(&self, target_index: usize, findings: Vec<Finding>) {
        let mut guard = self
            .findings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.extend(findings.into_iter().map(|f| (target_index, f)));
    }

    pub fn finish(self) -> Report {
        let mut findings = self
            .findings
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        findings.sort_by_key(|(index, _)| *index);

        Report {
            tool: TOOL_NAME.to_string(),
            target: self.target,
            time: self.started,
            results: findings.into_iter().map(|(_, f)| f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(endpoint: &str, payload: &str, context: Option<Reflection>) -> Finding {
        Finding {
            endpoint: Url::parse(endpoint).unwrap(),
            method: Method::Get,
            params: vec!["q".into(), "page".into()],
            payload: payload.into(),
            context,
            similarity: Some(0.8125),
            raw_response: format!("<html>{payload}\n</html>"),
        }
    }

    #[test]
    fn finish_orders_by_target_then_insertion() {
        let agg = Aggregator::new(Url::parse("http://t/").unwrap());
        agg.append(1, vec![finding("http://t/b", "p1", None), finding("http://t/b", "p2", None)]);
        agg.append(0, vec![finding("http://t/a", "p1", None), finding("http://t/a", "p2", None)]);

        let report = agg.finish();
        let order: Vec<(String, String)> = report
            .results
            .iter()
            .map(|f| (f.endpoint.path().to_string(), f.payload.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("/a".into(), "p1".into()),
                ("/a".into(), "p2".into()),
                ("/b".into(), "p1".into()),
                ("/b".into(), "p2".into()),
            ]
        );
        assert_eq!(report.tool, TOOL_NAME);
    }

    #[test]
    fn tick_tracks_progress_against_total() {
        let agg = Aggregator::new(Url::parse("http://t/").unwrap());
        agg.set_total(10);
        agg.tick();
        assert_eq!(agg.tick(), Progress { completed: 2, total: 10 });
        assert_eq!(agg.progress().completed, 2);
    }

    #[test]
    fn summary_counts_contexts_and_endpoints() {
        let report = Report {
            tool: TOOL_NAME.into(),
            target: Url::parse("http://t/").unwrap(),
            time: Utc::now(),
            results: vec![
                finding("http://t/a", "p1", Some(Reflection::Reflected)),
                finding("http://t/a", "p2", Some(Reflection::Script)),
                finding("http://t/b", "p1", None),
                finding("http://t/c", "p1", Some(Reflection::Script)),
            ],
        };
        assert_eq!(
            report.summary(),
            Summary {
                findings: 4,
                reflected: 1,
                script: 2,
                flagged_endpoints: 2,
            }
        );
    }

    #[test]
    fn json_uses_report_field_names() {
        let value = serde_json::to_value(finding("http://t/a", "<x>", Some(Reflection::Script))).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["endpoint", "method", "params", "payload", "context", "diff", "response"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj["context"], "script");
        assert_eq!(obj["method"], "get");

        let mut unflagged = finding("http://t/a", "<x>", None);
        unflagged.similarity = None;
        let value = serde_json::to_value(unflagged).unwrap();
        assert!(value["context"].is_null());
        assert!(value["diff"].is_null());
    }

    #[test]
    fn saved_report_loads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut post = finding("https://t/login", "'><svg/onload=alert(1)>", Some(Reflection::Reflected));
        post.method = Method::Post;
        post.similarity = Some(1.0 / 3.0);
        let report = Report {
            tool: TOOL_NAME.into(),
            target: Url::parse("https://t/").unwrap(),
            time: Utc::now(),
            results: vec![
                finding("https://t/a?x=1", "<script>alert(1)</script>", Some(Reflection::Script)),
                post,
                finding("https://t/b", "';alert(1);//", None),
            ],
        };

        report.save(&path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for key in ["tool", "target", "time", "results"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["time"].as_str().unwrap().ends_with('Z'));

        assert_eq!(Report::load(&path).unwrap(), report);
    }

    #[test]
    fn loading_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Report::load(&path), Err(ReportError::Json(_))));
    }
}
