use std::fmt;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContractViolation;

pub const MIN_PORT: i64 = 1;
pub const MAX_PORT: i64 = 65_535;
pub const MIN_TIMEOUT_MS: i64 = 100;

/// Current form inputs. Out-of-range numbers, negative ones included, are kept as
/// typed and only reported as hints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanForm {
    pub target: String,
    pub start_port: i64,
    pub end_port: i64,
    #[serde(rename = "timeout")]
    pub timeout_ms: i64,
}

impl Default for ScanForm {
    fn default() -> Self {
        Self {
            target: String::new(),
            start_port: 1,
            end_port: 1024,
            timeout_ms: 500,
        }
    }
}

impl ScanForm {
    pub fn has_target(&self) -> bool {
        !self.target.is_empty()
    }

    /// Range hints for the numeric inputs. These never block a submission.
    pub fn hints(&self) -> Vec<InputHint> {
        let mut out = Vec::new();
        if !(MIN_PORT..=MAX_PORT).contains(&self.start_port) {
            out.push(InputHint::StartPortOutOfRange(self.start_port));
        }
        if !(MIN_PORT..=MAX_PORT).contains(&self.end_port) {
            out.push(InputHint::EndPortOutOfRange(self.end_port));
        }
        if self.timeout_ms < MIN_TIMEOUT_MS {
            out.push(InputHint::TimeoutBelowMinimum(self.timeout_ms));
        }
        out
    }

    pub fn scan_query(&self) -> ScanQuery {
        ScanQuery {
            url: self.target.clone(),
            start_port: self.start_port,
            end_port: self.end_port,
            timeout: self.timeout_ms,
        }
    }

    pub fn analyze_query(&self) -> AnalyzeQuery {
        AnalyzeQuery {
            url: self.target.clone(),
        }
    }

    /// Apply the fields present in `patch`, leaving the others as they are.
    pub fn apply(&mut self, patch: FormPatch) {
        if let Some(t) = patch.target {
            self.target = t;
        }
        if let Some(p) = patch.start_port {
            self.start_port = p;
        }
        if let Some(p) = patch.end_port {
            self.end_port = p;
        }
        if let Some(t) = patch.timeout_ms {
            self.timeout_ms = t;
        }
    }
}

/// Partial form update as sent by the browser UI.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct FormPatch {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub start_port: Option<i64>,
    #[serde(default)]
    pub end_port: Option<i64>,
    #[serde(default, rename = "timeout")]
    pub timeout_ms: Option<i64>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum InputHint {
    StartPortOutOfRange(i64),
    EndPortOutOfRange(i64),
    TimeoutBelowMinimum(i64),
}

impl fmt::Display for InputHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputHint::StartPortOutOfRange(p) => {
                write!(f, "start port {p} is outside {MIN_PORT}-{MAX_PORT}")
            }
            InputHint::EndPortOutOfRange(p) => {
                write!(f, "end port {p} is outside {MIN_PORT}-{MAX_PORT}")
            }
            InputHint::TimeoutBelowMinimum(t) => {
                write!(f, "timeout {t}ms is below the {MIN_TIMEOUT_MS}ms minimum")
            }
        }
    }
}

/// Query string of `GET /api/portscanner`. Field order is the wire order.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanQuery {
    pub url: String,
    pub start_port: i64,
    pub end_port: i64,
    pub timeout: i64,
}

/// Query string of `GET /api/webpageanalyzer`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeQuery {
    pub url: String,
}

/// Body of `POST /vulnerabilities/match`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest<'a> {
    pub scan_result: &'a ScanResult,
}

/// Shape check applied to every decoded response before it reaches the session.
pub trait Contract: Sized {
    fn from_value(value: Value) -> Result<Self, ContractViolation>;
}

/// Response of `GET /network/info`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub network_range: String,
}

impl NetworkInfo {
    /// The range as a CIDR, when the service reports one.
    pub fn cidr(&self) -> Option<IpNet> {
        self.network_range.trim().parse().ok()
    }
}

impl Contract for NetworkInfo {
    fn from_value(value: Value) -> Result<Self, ContractViolation> {
        let info: NetworkInfo = serde_json::from_value(value)
            .map_err(|e| ContractViolation::new(format!("network info: {e}")))?;
        if info.network_range.trim().is_empty() {
            return Err(ContractViolation::new("network info: empty networkRange"));
        }
        Ok(info)
    }
}

/// Number of usable IPv4 host addresses in `net` (network and broadcast excluded).
///
/// IPv6 ranges are not counted.
pub fn host_count(net: &IpNet) -> Option<u64> {
    match net {
        IpNet::V4(n4) => {
            let start = u32::from(n4.network()) as u64;
            let end = u32::from(n4.broadcast()) as u64;
            if end <= start + 1 {
                Some(0)
            } else {
                Some(end - start - 1)
            }
        }
        IpNet::V6(_) => None,
    }
}

/// Result of a port scan or page analysis. Its schema belongs to the service;
/// the client only requires a JSON object or array.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct ScanResult(Value);

impl ScanResult {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn to_pretty_json(&self) -> String {
        pretty(&self.0)
    }
}

impl Contract for ScanResult {
    fn from_value(value: Value) -> Result<Self, ContractViolation> {
        match value {
            Value::Object(_) | Value::Array(_) => Ok(ScanResult(value)),
            other => Err(ContractViolation::new(format!(
                "scan result must be an object or array, got {}",
                kind_of(&other)
            ))),
        }
    }
}

/// One matched weakness as reported by the service. Must be a JSON object.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct VulnerabilityRecord(Value);

impl VulnerabilityRecord {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn to_pretty_json(&self) -> String {
        pretty(&self.0)
    }
}

impl Contract for Vec<VulnerabilityRecord> {
    fn from_value(value: Value) -> Result<Self, ContractViolation> {
        let Value::Array(items) = value else {
            return Err(ContractViolation::new(format!(
                "vulnerability list must be an array, got {}",
                kind_of(&value)
            )));
        };
        items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(_) => Ok(VulnerabilityRecord(item)),
                other => Err(ContractViolation::new(format!(
                    "vulnerability #{idx} must be an object, got {}",
                    kind_of(&other)
                ))),
            })
            .collect()
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn pretty(v: &Value) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
}
