//! HTTP status and transport-exception mapping to the engine's error taxonomy.
//! Grounded on the original implementation's `kia/error_mapper.py`.

use ktengine_core::EngineError;

pub fn map_http_status(status_code: u16, body: &str) -> EngineError {
    match status_code {
        401 => EngineError::KiaAuthTokenExpired,
        403 => EngineError::KiaAuthForbidden,
        404 => EngineError::KiaQuoteSymbolNotFound(body.to_string()),
        409 => EngineError::KiaOrderDuplicated(body.to_string()),
        429 => EngineError::KiaRateLimited,
        500..=599 => EngineError::KiaUpstreamUnavailable(format!("status {status_code}: {body}")),
        _ => EngineError::KiaUnknown(format!("status {status_code}: {body}")),
    }
}

pub fn map_transport_error(err: &reqwest::Error) -> EngineError {
    if err.is_timeout() || err.is_connect() {
        EngineError::KiaApiTimeout
    } else if err.is_decode() {
        EngineError::KiaResponseInvalid(err.to_string())
    } else {
        EngineError::KiaUnknown(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_status_codes() {
        assert!(matches!(
            map_http_status(401, ""),
            EngineError::KiaAuthTokenExpired
        ));
        assert!(matches!(
            map_http_status(429, ""),
            EngineError::KiaRateLimited
        ));
        assert!(matches!(
            map_http_status(503, ""),
            EngineError::KiaUpstreamUnavailable(_)
        ));
        assert!(matches!(map_http_status(418, ""), EngineError::KiaUnknown(_)));
    }

    #[test]
    fn retryable_flags_match_the_status_family() {
        assert!(map_http_status(401, "").retryable());
        assert!(map_http_status(429, "").retryable());
        assert!(map_http_status(500, "").retryable());
        assert!(!map_http_status(403, "").retryable());
        assert!(!map_http_status(404, "").retryable());
        assert!(!map_http_status(409, "").retryable());
    }
}
