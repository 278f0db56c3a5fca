//! Scanner Runner (spec §4.C5): invokes the external `mcp-scanner` /
//! `a2a-scanner` binaries as subprocesses, enforces a timeout, and
//! normalizes their stdout into a [`ScanRecord`].

use regex::Regex;
use registry_types::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;

/// The closed severity vocabulary of spec §4.C5. `Unknown` carries through
/// anything a future analyzer emits that isn't in the closed set, without
/// counting toward any bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Safe,
    #[serde(other)]
    Unknown,
}

impl Severity {
    fn from_raw(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "safe" => Severity::Safe,
            _ => Severity::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    #[serde(default)]
    pub threat_names: Vec<String>,
    #[serde(default)]
    pub threat_summary: String,
    #[serde(default = "default_true")]
    pub is_safe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_name: Option<String>,
    pub analyzer: String,
}

fn default_true() -> bool {
    true
}

/// The normalized shape every scan, server or agent, is reduced to (spec
/// §4.C5): findings grouped by analyzer, plus whichever raw payload the
/// underlying scanner returned for archival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub analysis_results: BTreeMap<String, Vec<Finding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_results: Option<serde_json::Value>,
}

impl ScanRecord {
    /// Sums findings across every analyzer (spec §4.C6 "Verdict counters").
    pub fn severity_counts(&self) -> (u32, u32, u32, u32) {
        let (mut critical, mut high, mut medium, mut low) = (0, 0, 0, 0);
        for findings in self.analysis_results.values() {
            for finding in findings {
                match finding.severity {
                    Severity::Critical => critical += 1,
                    Severity::High => high += 1,
                    Severity::Medium => medium += 1,
                    Severity::Low => low += 1,
                    Severity::Safe | Severity::Unknown => {}
                }
            }
        }
        (critical, high, medium, low)
    }
}

/// What to scan: a remote MCP server by URL, or an A2A agent by card.
pub enum ScanTarget<'a> {
    Server {
        proxy_url: &'a str,
        headers: Option<&'a str>,
    },
    Agent {
        agent_card: &'a serde_json::Value,
    },
}

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid ansi regex")
    })
}

fn strip_ansi(text: &str) -> String {
    ansi_re().replace_all(text, "").into_owned()
}

/// Extracts a bearer token from a `headers.X-Authorization` value (spec
/// §4.C5). Malformed JSON is an `Invalid` error; a present-but-unrelated
/// header yields `None` rather than failing the scan.
pub fn extract_bearer_token(headers_json: &str) -> GatewayResult<Option<String>> {
    let headers: serde_json::Value = serde_json::from_str(headers_json)
        .map_err(|e| GatewayError::invalid(format!("invalid headers JSON: {e}")))?;
    let auth = headers
        .get("X-Authorization")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    Ok(auth.strip_prefix("Bearer ").map(str::to_string))
}

/// Locates the first top-level JSON object or array — a `[` or `{`
/// beginning a line — in `clean`. Falls back to the first `[`/`{` anywhere
/// in the text when no line-leading one is found, since some scanner
/// builds emit it inline after a single log prefix.
fn locate_json_start(clean: &str) -> Option<usize> {
    let bytes = clean.as_bytes();
    let line_leading = bytes.iter().enumerate().find_map(|(i, &b)| {
        let is_open = b == b'[' || b == b'{';
        let at_line_start = i == 0 || bytes[i - 1] == b'\n' || bytes[i - 1] == b'\r';
        (is_open && at_line_start).then_some(i)
    });
    line_leading.or_else(|| clean.find(['[', '{']))
}

/// Strips ANSI escapes, locates the first top-level JSON value, and parses
/// it (spec §4.C5 Open Question: object-first, array-fallback). A JSON
/// object is returned as-is. A bare JSON array is wrapped depending on what
/// its elements look like: a list of tool-results (each carrying its own
/// `findings` map) becomes `{"tool_results": [...]}`; a list of bare
/// findings (each carrying its own `severity`) becomes `{"findings":
/// [...]}`, the same object shape [`organize_agent_findings`] already
/// reduces (defaulting the missing `analyzer` field to `"unknown"`, which
/// is exactly the resolution's `analysis_results.unknown` bucket). Anything
/// else — including an array whose elements match neither shape — is a
/// hard parse failure.
pub fn parse_scanner_output(stdout: &str) -> GatewayResult<serde_json::Value> {
    let clean = strip_ansi(stdout);
    let start = locate_json_start(&clean).ok_or_else(|| {
        GatewayError::internal("no JSON object or array found in scanner output".to_string())
    })?;

    let value: serde_json::Value = serde_json::from_str(&clean[start..])
        .map_err(|e| GatewayError::internal(format!("failed to parse scanner output: {e}")))?;

    match value {
        serde_json::Value::Object(_) => Ok(value),
        serde_json::Value::Array(items) => wrap_array(items),
        _ => Err(GatewayError::internal(
            "scanner output was neither a JSON object nor array".to_string(),
        )),
    }
}

fn wrap_array(items: Vec<serde_json::Value>) -> GatewayResult<serde_json::Value> {
    let looks_like_tool_results = !items.is_empty()
        && items
            .iter()
            .all(|item| item.get("findings").map(|f| f.is_object()).unwrap_or(false));
    if looks_like_tool_results {
        return Ok(serde_json::json!({ "tool_results": items }));
    }

    let looks_like_findings = !items.is_empty() && items.iter().all(|item| item.get("severity").is_some());
    if looks_like_findings {
        return Ok(serde_json::json!({ "findings": items }));
    }

    Err(GatewayError::internal(
        "scanner emitted a JSON array whose elements are not shaped like tool-results or findings".to_string(),
    ))
}

/// Organizes a server scan's `tool_results` array (spec §4.C5): each tool
/// result carries a `findings` map of analyzer name to a single finding.
pub fn organize_server_findings(tool_results: &[serde_json::Value]) -> BTreeMap<String, Vec<Finding>> {
    let mut organized: BTreeMap<String, Vec<Finding>> = BTreeMap::new();
    for tool_result in tool_results {
        let tool_name = tool_result.get("tool_name").and_then(|v| v.as_str());
        let is_safe = tool_result
            .get("is_safe")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let findings = match tool_result.get("findings").and_then(|v| v.as_object()) {
            Some(f) => f,
            None => continue,
        };
        for (analyzer_name, analyzer_findings) in findings {
            let severity_raw = analyzer_findings
                .get("severity")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            let threat_names = analyzer_findings
                .get("threat_names")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let threat_summary = analyzer_findings
                .get("threat_summary")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            organized.entry(analyzer_name.clone()).or_default().push(Finding {
                severity: Severity::from_raw(severity_raw),
                threat_names,
                threat_summary,
                is_safe,
                tool_name: tool_name.map(str::to_string),
                skill_name: None,
                analyzer: analyzer_name.clone(),
            });
        }
    }
    organized
}

/// Organizes an agent scan's `{findings: [...]}` object (spec §4.C5): each
/// finding already carries its own analyzer name.
pub fn organize_agent_findings(scan_results: &serde_json::Value) -> BTreeMap<String, Vec<Finding>> {
    let mut organized: BTreeMap<String, Vec<Finding>> = BTreeMap::new();
    let findings = match scan_results.get("findings").and_then(|v| v.as_array()) {
        Some(f) => f,
        None => return organized,
    };
    for finding in findings {
        let analyzer = finding
            .get("analyzer")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let severity_raw = finding.get("severity").and_then(|v| v.as_str()).unwrap_or("unknown");
        let threat_names = finding
            .get("threat_names")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let threat_summary = finding
            .get("threat_summary")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let is_safe = finding.get("is_safe").and_then(|v| v.as_bool()).unwrap_or(true);
        let skill_name = finding
            .get("skill_name")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        organized.entry(analyzer.clone()).or_default().push(Finding {
            severity: Severity::from_raw(severity_raw),
            threat_names,
            threat_summary,
            is_safe,
            tool_name: None,
            skill_name,
            analyzer,
        });
    }
    organized
}

/// Thin wrapper over the two scanner binaries; stateless beyond its
/// construction parameters, so one instance is shared across scans.
#[derive(Debug, Clone, Default)]
pub struct ScannerRunner;

impl ScannerRunner {
    pub fn new() -> Self {
        Self
    }

    /// Runs the scanner for `target` under `timeout`, returning the
    /// normalized record. Never panics on scanner failure; every failure
    /// mode becomes a `GatewayError` for the orchestrator to fail closed on
    /// (spec §4.C6 step 5).
    pub async fn run(
        &self,
        target: ScanTarget<'_>,
        analyzers: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> GatewayResult<ScanRecord> {
        match target {
            ScanTarget::Server { proxy_url, headers } => {
                self.run_server(proxy_url, headers, analyzers, api_key, timeout).await
            }
            ScanTarget::Agent { agent_card } => {
                self.run_agent(agent_card, analyzers, api_key, timeout).await
            }
        }
    }

    async fn run_server(
        &self,
        proxy_url: &str,
        headers: Option<&str>,
        analyzers: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> GatewayResult<ScanRecord> {
        let server_url = if proxy_url.ends_with("/mcp") {
            proxy_url.to_string()
        } else {
            format!("{proxy_url}/mcp")
        };

        let mut cmd = Command::new("mcp-scanner");
        cmd.args(["--analyzers", analyzers, "--raw", "remote", "--server-url", &server_url]);

        if let Some(headers) = headers {
            if let Some(token) = extract_bearer_token(headers)? {
                cmd.args(["--bearer-token", &token]);
            }
        }
        if let Some(key) = api_key {
            cmd.env("MCP_SCANNER_LLM_API_KEY", key);
        }

        let stdout = run_and_capture(cmd, timeout).await?;
        let parsed = parse_scanner_output(&stdout)?;
        Ok(record_from_parsed(parsed))
    }

    async fn run_agent(
        &self,
        agent_card: &serde_json::Value,
        analyzers: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> GatewayResult<ScanRecord> {
        let card_bytes = serde_json::to_vec_pretty(agent_card)?;
        let tmp = tokio::task::spawn_blocking(move || -> GatewayResult<tempfile::NamedTempFile> {
            let mut tmp = tempfile::Builder::new()
                .suffix(".json")
                .tempfile()
                .map_err(|e| GatewayError::internal(format!("failed to create agent card temp file: {e}")))?;
            use std::io::Write;
            tmp.write_all(&card_bytes)
                .map_err(|e| GatewayError::internal(format!("failed to write agent card temp file: {e}")))?;
            Ok(tmp)
        })
        .await
        .map_err(|e| GatewayError::internal(format!("temp file task panicked: {e}")))??;
        let tmp_path = tmp.path().to_path_buf();

        let mut cmd = Command::new("a2a-scanner");
        cmd.args([
            "scan-card",
            tmp_path.to_string_lossy().as_ref(),
            "--analyzers",
            analyzers,
            "--format",
            "json",
        ]);
        if let Some(key) = api_key {
            cmd.env("AZURE_OPENAI_API_KEY", key);
        }

        let stdout = run_and_capture(cmd, timeout).await;
        // `tmp` deletes itself on drop regardless of scan outcome.
        let stdout = stdout?;
        let parsed = parse_scanner_output(&stdout)?;
        Ok(record_from_parsed(parsed))
    }
}

/// Reduces `parse_scanner_output`'s normalized value into a [`ScanRecord`],
/// shared by both runners so neither hard-codes a single expected shape
/// (spec §4.C5 Open Question): a `tool_results` array is organized the
/// server way, anything else (including the `{"findings": [...]}` shape,
/// whether from the agent scanner natively or from the array-fallback
/// wrap) is organized the agent way.
fn record_from_parsed(parsed: serde_json::Value) -> ScanRecord {
    match parsed.get("tool_results").and_then(|v| v.as_array()).cloned() {
        Some(tool_results) => ScanRecord {
            analysis_results: organize_server_findings(&tool_results),
            tool_results: Some(serde_json::Value::Array(tool_results)),
            scan_results: None,
        },
        None => ScanRecord {
            analysis_results: organize_agent_findings(&parsed),
            tool_results: None,
            scan_results: Some(parsed),
        },
    }
}

async fn run_and_capture(mut cmd: Command, timeout: Duration) -> GatewayResult<String> {
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    // A timed-out scan must not leave the subprocess running (spec §5 "kill
    // process group"); tokio kills the child on drop, which is what happens
    // when `timeout` below elapses and the `wait_with_output` future is
    // dropped.
    cmd.kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| GatewayError::internal(format!("failed to spawn scanner process: {e}")))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| GatewayError::internal(format!("scanner process failed: {e}")))?,
        Err(_) => {
            return Err(GatewayError::timeout(format!(
                "scan timed out after {} seconds",
                timeout.as_secs()
            )))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GatewayError::internal(format!(
            "scanner exited with {}: {stderr}",
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_token_from_headers() {
        let headers = r#"{"X-Authorization": "Bearer abc123"}"#;
        assert_eq!(extract_bearer_token(headers).unwrap(), Some("abc123".to_string()));
    }

    #[test]
    fn missing_bearer_prefix_yields_none() {
        let headers = r#"{"X-Authorization": "Basic abc123"}"#;
        assert_eq!(extract_bearer_token(headers).unwrap(), None);
    }

    #[test]
    fn malformed_headers_json_is_invalid() {
        let err = extract_bearer_token("not json").unwrap_err();
        assert_eq!(err.kind(), registry_types::ErrorKind::Invalid);
    }

    #[test]
    fn parses_json_array_after_log_lines_and_ansi() {
        let stdout = "\x1b[32mINFO\x1b[0m starting scan\n[{\"tool_name\": \"a\", \"is_safe\": true, \"findings\": {}}]";
        let parsed = parse_scanner_output(stdout).unwrap();
        assert!(parsed["tool_results"].is_array());
    }

    #[test]
    fn parses_json_object_for_agent_scanner() {
        let stdout = "some log line\n{\"findings\": []}";
        let parsed = parse_scanner_output(stdout).unwrap();
        assert!(parsed.is_object());
        assert!(parsed["findings"].is_array());
    }

    #[test]
    fn no_json_found_is_an_error() {
        assert!(parse_scanner_output("just log output, nothing else").is_err());
    }

    #[test]
    fn object_is_returned_as_is() {
        let stdout = "{\"tool_results\": [], \"extra\": true}";
        let parsed = parse_scanner_output(stdout).unwrap();
        assert_eq!(parsed["extra"], true);
    }

    #[test]
    fn bare_array_of_findings_wraps_into_findings_object() {
        let stdout = "[{\"severity\": \"high\", \"analyzer\": \"spec\"}]";
        let parsed = parse_scanner_output(stdout).unwrap();
        assert_eq!(parsed["findings"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn array_shaped_like_neither_tool_results_nor_findings_is_a_hard_failure() {
        let stdout = "[{\"unrelated\": true}]";
        let err = parse_scanner_output(stdout).unwrap_err();
        assert_eq!(err.kind(), registry_types::ErrorKind::Internal);
    }

    #[test]
    fn record_from_parsed_organizes_tool_results_array_the_server_way() {
        let parsed = serde_json::json!({
            "tool_results": [
                {"tool_name": "a", "is_safe": false, "findings": {"yara": {"severity": "critical"}}}
            ]
        });
        let record = record_from_parsed(parsed);
        assert_eq!(record.severity_counts(), (1, 0, 0, 0));
        assert!(record.tool_results.is_some());
    }

    #[test]
    fn record_from_parsed_organizes_findings_object_the_agent_way() {
        let parsed = serde_json::json!({"findings": [{"severity": "high", "analyzer": "spec"}]});
        let record = record_from_parsed(parsed);
        assert_eq!(record.severity_counts(), (0, 1, 0, 0));
        assert!(record.scan_results.is_some());
    }

    #[test]
    fn organizes_server_findings_by_analyzer() {
        let tool_results = serde_json::json!([
            {
                "tool_name": "resolve-library-id",
                "is_safe": false,
                "findings": {
                    "yara": {"severity": "HIGH", "threat_names": ["xss"], "threat_summary": "bad"}
                }
            }
        ]);
        let organized = organize_server_findings(tool_results.as_array().unwrap());
        let findings = &organized["yara"];
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].tool_name.as_deref(), Some("resolve-library-id"));
    }

    #[test]
    fn organizes_agent_findings_by_analyzer() {
        let scan_results = serde_json::json!({
            "findings": [
                {"analyzer": "spec", "severity": "critical", "skill_name": "book-flight"}
            ]
        });
        let organized = organize_agent_findings(&scan_results);
        let findings = &organized["spec"];
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].skill_name.as_deref(), Some("book-flight"));
    }

    #[test]
    fn severity_counts_sum_across_analyzers() {
        let record = ScanRecord {
            analysis_results: BTreeMap::from([
                (
                    "yara".to_string(),
                    vec![Finding {
                        severity: Severity::Critical,
                        threat_names: vec![],
                        threat_summary: String::new(),
                        is_safe: false,
                        tool_name: None,
                        skill_name: None,
                        analyzer: "yara".to_string(),
                    }],
                ),
                (
                    "spec".to_string(),
                    vec![Finding {
                        severity: Severity::High,
                        threat_names: vec![],
                        threat_summary: String::new(),
                        is_safe: false,
                        tool_name: None,
                        skill_name: None,
                        analyzer: "spec".to_string(),
                    }],
                ),
            ]),
            tool_results: None,
            scan_results: None,
        };
        assert_eq!(record.severity_counts(), (1, 1, 0, 0));
    }
}
