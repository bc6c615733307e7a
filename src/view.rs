//! Presentation of a [`SessionSnapshot`]: a serializable view model for the
//! browser UI and a plain-text rendering for the terminal.
//!
//! Failures are deliberately absent from both; they live in the snapshot's outcomes.

use std::fmt::Write as _;

use serde::Serialize;

use crate::session::{Operation, SessionSnapshot};
use crate::types::{host_count, InputHint, ScanForm};

pub const TITLE: &str = "Vulnerability Scanner";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ButtonState {
    pub label: &'static str,
    pub enabled: bool,
    pub visible: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Controls {
    pub scan_ports: ButtonState,
    pub analyze_web_page: ButtonState,
    pub match_vulnerabilities: ButtonState,
}

impl Controls {
    pub fn from_snapshot(snap: &SessionSnapshot) -> Self {
        let loading = snap.loading;
        let has_target = snap.form.has_target();
        let has_result = snap.scan_result.is_some();
        Self {
            scan_ports: ButtonState {
                label: if loading { "Scanning Ports..." } else { "Scan Ports" },
                enabled: !loading && has_target,
                visible: true,
            },
            analyze_web_page: ButtonState {
                label: if loading {
                    "Analyzing Web Page..."
                } else {
                    "Analyze Web Page"
                },
                enabled: !loading && has_target,
                visible: true,
            },
            match_vulnerabilities: ButtonState {
                label: if loading {
                    "Matching..."
                } else {
                    "Match Vulnerabilities"
                },
                enabled: !loading && has_result,
                visible: has_result,
            },
        }
    }
}

/// Everything the page shows, precomputed so the browser only has to paint it.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub title: &'static str,
    pub network_line: Option<String>,
    /// The mount-time network lookup is still outstanding.
    pub network_pending: bool,
    pub form: ScanForm,
    pub hints: Vec<String>,
    pub controls: Controls,
    pub loading: bool,
    pub scan_result: Option<String>,
    pub vulnerabilities: Vec<String>,
}

impl ViewModel {
    pub fn from_snapshot(snap: &SessionSnapshot) -> Self {
        Self {
            title: TITLE,
            network_line: snap.network_info.as_ref().map(|info| {
                let count = info.cidr().as_ref().and_then(host_count);
                match count {
                    Some(n) => format!("Current Local Network: {} ({n} hosts)", info.network_range),
                    None => format!("Current Local Network: {}", info.network_range),
                }
            }),
            network_pending: snap.outcome(Operation::NetworkInfo).is_pending(),
            form: snap.form.clone(),
            hints: snap.form.hints().iter().map(InputHint::to_string).collect(),
            controls: Controls::from_snapshot(snap),
            loading: snap.loading,
            scan_result: snap.scan_result.as_ref().map(|r| r.to_pretty_json()),
            vulnerabilities: snap
                .vulnerabilities
                .iter()
                .map(|v| v.to_pretty_json())
                .collect(),
        }
    }
}

/// Render the session as terminal text.
pub fn render(snap: &SessionSnapshot) -> String {
    let vm = ViewModel::from_snapshot(snap);
    let mut out = String::new();

    let _ = writeln!(out, "{}", vm.title);
    let _ = writeln!(out, "{}", "=".repeat(vm.title.len()));
    if let Some(line) = &vm.network_line {
        let _ = writeln!(out, "{line}");
    }

    let target = if vm.form.target.is_empty() {
        "<none>"
    } else {
        vm.form.target.as_str()
    };
    let _ = writeln!(out, "\nTarget       : {target}");
    let _ = writeln!(out, "Start Port   : {}", vm.form.start_port);
    let _ = writeln!(out, "End Port     : {}", vm.form.end_port);
    let _ = writeln!(out, "Timeout (ms) : {}", vm.form.timeout_ms);
    for hint in &vm.hints {
        let _ = writeln!(out, "  hint: {hint}");
    }

    let _ = writeln!(out);
    for b in [&vm.controls.scan_ports, &vm.controls.analyze_web_page, &vm.controls.match_vulnerabilities] {
        if b.visible {
            let mark = if b.enabled { ' ' } else { 'x' };
            let _ = writeln!(out, "[{mark}] {}", b.label);
        }
    }

    if let Some(json) = &vm.scan_result {
        let _ = writeln!(out, "\nScan Results\n------------\n{json}");
    }

    if !vm.vulnerabilities.is_empty() {
        let _ = writeln!(out, "\nVulnerabilities Found\n---------------------");
        for (idx, entry) in vm.vulnerabilities.iter().enumerate() {
            let _ = writeln!(out, "#{}\n{entry}", idx + 1);
        }
    }
    out
}
