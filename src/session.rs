//! Session state and the controller that drives the scanning service.
//!
//! Every action follows the same shape: take a ticket for the slot it writes
//! (bumping that slot's generation and cancelling the previous request), await
//! the service without holding the lock, then apply the response only if the
//! ticket is still current. Failures are logged and recorded as an [`Outcome`];
//! they never clear data already on screen.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use ::time::{format_description::well_known, OffsetDateTime};

use crate::api::ScannerApi;
use crate::error::ApiError;
use crate::types::{FormPatch, NetworkInfo, ScanForm, ScanResult, VulnerabilityRecord};

/// A user- or mount-triggered call against the service.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    NetworkInfo,
    ScanPorts,
    AnalyzeWebPage,
    MatchVulnerabilities,
}

impl Operation {
    /// The piece of state a successful response overwrites.
    pub fn slot(self) -> Slot {
        match self {
            Operation::NetworkInfo => Slot::NetworkInfo,
            Operation::ScanPorts | Operation::AnalyzeWebPage => Slot::ScanResult,
            Operation::MatchVulnerabilities => Slot::Vulnerabilities,
        }
    }

    /// Whether the call drives the loading indicator. The mount-time fetch does not.
    pub fn shows_loading(self) -> bool {
        !matches!(self, Operation::NetworkInfo)
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    NetworkInfo,
    ScanResult,
    Vulnerabilities,
}

impl Slot {
    fn index(self) -> usize {
        self as usize
    }
}

/// What happened to the latest call of an operation.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    /// Never run in this session.
    #[default]
    Idle,
    Pending { started_at: String },
    Succeeded { finished_at: String },
    Failed { error: ApiError, finished_at: String },
    /// A newer request for the same slot started before this one finished.
    Superseded,
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Outcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// An action refused before any request was made.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    #[error("a target is required")]
    MissingTarget,
    #[error("there is no scan result to match vulnerabilities against")]
    NoScanResult,
}

/// Point-in-time copy of the session, used for rendering and the UI state endpoint.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub form: ScanForm,
    pub network_info: Option<NetworkInfo>,
    pub scan_result: Option<ScanResult>,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
    pub loading: bool,
    pub outcomes: Outcomes,
}

impl SessionSnapshot {
    pub fn outcome(&self, op: Operation) -> &Outcome {
        self.outcomes.get(op)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcomes {
    pub network_info: Outcome,
    pub scan_ports: Outcome,
    pub analyze_web_page: Outcome,
    pub match_vulnerabilities: Outcome,
}

impl Outcomes {
    pub fn get(&self, op: Operation) -> &Outcome {
        match op {
            Operation::NetworkInfo => &self.network_info,
            Operation::ScanPorts => &self.scan_ports,
            Operation::AnalyzeWebPage => &self.analyze_web_page,
            Operation::MatchVulnerabilities => &self.match_vulnerabilities,
        }
    }

    fn set(&mut self, op: Operation, outcome: Outcome) {
        let slot = match op {
            Operation::NetworkInfo => &mut self.network_info,
            Operation::ScanPorts => &mut self.scan_ports,
            Operation::AnalyzeWebPage => &mut self.analyze_web_page,
            Operation::MatchVulnerabilities => &mut self.match_vulnerabilities,
        };
        *slot = outcome;
    }
}

#[derive(Debug, Default)]
struct SlotGuard {
    generation: u64,
    cancel: Option<CancellationToken>,
}

#[derive(Debug, Default)]
struct SessionState {
    form: ScanForm,
    network_info: Option<NetworkInfo>,
    scan_result: Option<ScanResult>,
    vulnerabilities: Vec<VulnerabilityRecord>,
    in_flight: usize,
    slots: [SlotGuard; 3],
    // Generation each operation's outcome was recorded for, so a superseded
    // scan cannot overwrite the outcome of a later scan.
    outcome_generation: [u64; 4],
    outcomes: Outcomes,
}

impl SessionState {
    fn begin(&mut self, op: Operation) -> Ticket {
        let guard = &mut self.slots[op.slot().index()];
        if let Some(prev) = guard.cancel.take() {
            prev.cancel();
        }
        guard.generation += 1;
        let cancel = CancellationToken::new();
        guard.cancel = Some(cancel.clone());
        let generation = guard.generation;

        if op.shows_loading() {
            self.in_flight += 1;
        }
        self.outcome_generation[op.index()] = generation;
        self.outcomes.set(
            op,
            Outcome::Pending {
                started_at: now_rfc3339(),
            },
        );
        Ticket {
            op,
            generation,
            cancel,
        }
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        self.slots[ticket.op.slot().index()].generation == ticket.generation
    }

    /// Release the ticket. Returns false when a newer request owns the slot.
    fn finish(&mut self, ticket: &Ticket) -> bool {
        if ticket.op.shows_loading() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
        if !self.is_current(ticket) {
            if self.outcome_generation[ticket.op.index()] == ticket.generation {
                self.outcomes.set(ticket.op, Outcome::Superseded);
            }
            return false;
        }
        self.slots[ticket.op.slot().index()].cancel = None;
        true
    }

    fn record(&mut self, op: Operation, outcome: Outcome) {
        self.outcomes.set(op, outcome);
    }
}

struct Ticket {
    op: Operation,
    generation: u64,
    cancel: CancellationToken,
}

/// View/controller for one scanning session.
///
/// Cheap to share behind an `Arc`; all actions take `&self`.
pub struct Session<A> {
    api: A,
    state: Arc<RwLock<SessionState>>,
}

impl<A: ScannerApi> Session<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(SessionState::default())),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let s = self.state.read().await;
        SessionSnapshot {
            form: s.form.clone(),
            network_info: s.network_info.clone(),
            scan_result: s.scan_result.clone(),
            vulnerabilities: s.vulnerabilities.clone(),
            loading: s.in_flight > 0,
            outcomes: s.outcomes.clone(),
        }
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.in_flight > 0
    }

    pub async fn form(&self) -> ScanForm {
        self.state.read().await.form.clone()
    }

    pub async fn set_form(&self, form: ScanForm) {
        self.state.write().await.form = form;
    }

    pub async fn update_form(&self, patch: FormPatch) -> ScanForm {
        let mut s = self.state.write().await;
        s.form.apply(patch);
        s.form.clone()
    }

    /// Fetch the local network range once the view is up.
    ///
    /// A failure leaves whatever network info was shown before.
    pub async fn mount(&self) -> Outcome {
        let ticket = self.state.write().await.begin(Operation::NetworkInfo);
        let res = tokio::select! {
            _ = ticket.cancel.cancelled() => None,
            r = self.api.network_info() => Some(r),
        };
        self.complete(ticket, res, |s, info| {
            info!(network_range = %info.network_range, "network info loaded");
            s.network_info = Some(info);
        })
        .await
    }

    /// Port-scan the current target with the current port range and timeout.
    pub async fn scan_ports(&self) -> Result<Outcome, Rejected> {
        let (query, ticket) = {
            let mut s = self.state.write().await;
            if !s.form.has_target() {
                return Err(Rejected::MissingTarget);
            }
            let q = s.form.scan_query();
            (q, s.begin(Operation::ScanPorts))
        };
        debug!(url = %query.url, start = query.start_port, end = query.end_port, timeout_ms = query.timeout, "scanning ports");
        let res = tokio::select! {
            _ = ticket.cancel.cancelled() => None,
            r = self.api.scan_ports(&query) => Some(r),
        };
        Ok(self
            .complete(ticket, res, |s, result| s.scan_result = Some(result))
            .await)
    }

    /// Analyze the current target as a web page. Shares the scan-result slot with [`Session::scan_ports`].
    pub async fn analyze_web_page(&self) -> Result<Outcome, Rejected> {
        let (query, ticket) = {
            let mut s = self.state.write().await;
            if !s.form.has_target() {
                return Err(Rejected::MissingTarget);
            }
            let q = s.form.analyze_query();
            (q, s.begin(Operation::AnalyzeWebPage))
        };
        debug!(url = %query.url, "analyzing web page");
        let res = tokio::select! {
            _ = ticket.cancel.cancelled() => None,
            r = self.api.analyze_web_page(&query) => Some(r),
        };
        Ok(self
            .complete(ticket, res, |s, result| s.scan_result = Some(result))
            .await)
    }

    /// Submit the stored scan result for matching and replace the vulnerability list.
    pub async fn match_vulnerabilities(&self) -> Result<Outcome, Rejected> {
        let (scan_result, ticket) = {
            let mut s = self.state.write().await;
            let Some(result) = s.scan_result.clone() else {
                return Err(Rejected::NoScanResult);
            };
            (result, s.begin(Operation::MatchVulnerabilities))
        };
        let res = tokio::select! {
            _ = ticket.cancel.cancelled() => None,
            r = self.api.match_vulnerabilities(&scan_result) => Some(r),
        };
        Ok(self
            .complete(ticket, res, |s, records| {
                info!(count = records.len(), "vulnerabilities matched");
                s.vulnerabilities = records;
            })
            .await)
    }

    /// Apply a finished call. `res` is `None` when the call was cancelled by a newer one.
    async fn complete<T>(
        &self,
        ticket: Ticket,
        res: Option<Result<T, ApiError>>,
        apply: impl FnOnce(&mut SessionState, T),
    ) -> Outcome {
        let mut s = self.state.write().await;
        let op = ticket.op;
        if !s.finish(&ticket) {
            debug!(?op, generation = ticket.generation, "discarding superseded response");
            return Outcome::Superseded;
        }
        let outcome = match res {
            Some(Ok(value)) => {
                apply(&mut *s, value);
                Outcome::Succeeded {
                    finished_at: now_rfc3339(),
                }
            }
            Some(Err(e)) => {
                error!(?op, error = %e, "request failed");
                Outcome::Failed {
                    error: e,
                    finished_at: now_rfc3339(),
                }
            }
            // Only a newer ticket cancels ours, and finish() saw ours as current.
            None => Outcome::Superseded,
        };
        s.record(op, outcome.clone());
        outcome
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
