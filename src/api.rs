use std::future::Future;

use anyhow::{Context, Result};
use reqwest::{header, Client, RequestBuilder, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::types::{
    AnalyzeQuery, Contract, MatchRequest, NetworkInfo, ScanQuery, ScanResult, VulnerabilityRecord,
};

pub const NETWORK_INFO_PATH: &str = "/network/info";
pub const PORT_SCANNER_PATH: &str = "/api/portscanner";
pub const WEB_PAGE_ANALYZER_PATH: &str = "/api/webpageanalyzer";
pub const VULNERABILITY_MATCH_PATH: &str = "/vulnerabilities/match";

/// The four calls the session makes against the scanning service.
///
/// Implemented over HTTP by [`HttpScannerApi`]; tests substitute scripted doubles.
pub trait ScannerApi: Send + Sync + 'static {
    fn network_info(&self) -> impl Future<Output = Result<NetworkInfo, ApiError>> + Send;

    fn scan_ports(
        &self,
        query: &ScanQuery,
    ) -> impl Future<Output = Result<ScanResult, ApiError>> + Send;

    fn analyze_web_page(
        &self,
        query: &AnalyzeQuery,
    ) -> impl Future<Output = Result<ScanResult, ApiError>> + Send;

    fn match_vulnerabilities(
        &self,
        scan_result: &ScanResult,
    ) -> impl Future<Output = Result<Vec<VulnerabilityRecord>, ApiError>> + Send;
}

/// `reqwest` client bound to one configured base address.
#[derive(Debug, Clone)]
pub struct HttpScannerApi {
    client: Client,
    network_info_url: Url,
    port_scanner_url: Url,
    web_page_analyzer_url: Url,
    vulnerability_match_url: Url,
}

impl HttpScannerApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(t) = config.request_timeout() {
            builder = builder.timeout(t);
        }
        let client = builder.build().context("failed to build HTTP client")?;
        Ok(Self {
            client,
            network_info_url: config.endpoint(NETWORK_INFO_PATH)?,
            port_scanner_url: config.endpoint(PORT_SCANNER_PATH)?,
            web_page_analyzer_url: config.endpoint(WEB_PAGE_ANALYZER_PATH)?,
            vulnerability_match_url: config.endpoint(VULNERABILITY_MATCH_PATH)?,
        })
    }
}

impl ScannerApi for HttpScannerApi {
    async fn network_info(&self) -> Result<NetworkInfo, ApiError> {
        let req = self.client.get(self.network_info_url.clone());
        send_json(NETWORK_INFO_PATH, req).await
    }

    async fn scan_ports(&self, query: &ScanQuery) -> Result<ScanResult, ApiError> {
        let req = self.client.get(self.port_scanner_url.clone()).query(query);
        send_json(PORT_SCANNER_PATH, req).await
    }

    async fn analyze_web_page(&self, query: &AnalyzeQuery) -> Result<ScanResult, ApiError> {
        let req = self.client.get(self.web_page_analyzer_url.clone()).query(query);
        send_json(WEB_PAGE_ANALYZER_PATH, req).await
    }

    async fn match_vulnerabilities(
        &self,
        scan_result: &ScanResult,
    ) -> Result<Vec<VulnerabilityRecord>, ApiError> {
        let req = self
            .client
            .post(self.vulnerability_match_url.clone())
            .json(&MatchRequest { scan_result });
        send_json(VULNERABILITY_MATCH_PATH, req).await
    }
}

/// Send `req`, then require a 2xx status, a JSON body and the payload contract, in that order.
async fn send_json<T: Contract>(endpoint: &str, req: RequestBuilder) -> Result<T, ApiError> {
    let res = req
        .header(header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| ApiError::transport(endpoint, e))?;

    let status = res.status();
    debug!(endpoint, status = status.as_u16(), "response received");
    if !status.is_success() {
        return Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    let body = res
        .bytes()
        .await
        .map_err(|e| ApiError::transport(endpoint, e))?;
    let value: Value = serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })?;
    T::from_value(value).map_err(|violation| ApiError::Contract {
        endpoint: endpoint.to_string(),
        violation,
    })
}
