//! Route table and base-URL resolution for the broker's mock/live hosts.
//! Grounded on the original implementation's `kia/endpoint_resolver.py`.

use super::contracts::ServiceType;
use ktengine_core::csm::Mode;

#[derive(Debug, Clone, Copy)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
}

pub const DEFAULT_MOCK_BASE_URL: &str = "https://mockapi.kiwoom.com";
pub const DEFAULT_LIVE_BASE_URL: &str = "https://api.kiwoom.com";

pub fn resolve_route(service_type: ServiceType) -> EndpointInfo {
    let (method, path) = match service_type {
        ServiceType::Auth => ("POST", "/oauth2/token"),
        ServiceType::Quote => ("POST", "/api/dostk/mrkcond"),
        ServiceType::Chart => ("POST", "/api/dostk/chart"),
        ServiceType::Order => ("POST", "/api/dostk/ordr"),
        ServiceType::Execution => ("POST", "/api/dostk/websocket"),
    };
    EndpointInfo { method, path }
}

pub fn resolve_base_url(mode: Mode, credential_base_url: Option<&str>) -> String {
    if let Some(url) = credential_base_url {
        if !url.trim().is_empty() {
            return url.trim().to_string();
        }
    }
    match mode {
        Mode::Mock => DEFAULT_MOCK_BASE_URL.to_string(),
        Mode::Live => DEFAULT_LIVE_BASE_URL.to_string(),
    }
}
