//! Settings & credential validation and masking (C0).
//!
//! Grounded on the original implementation's `csm/{validators,masking,
//! models}.py`. The on-disk file format these are persisted to is out of
//! scope (spec.md §1); the validation/masking logic itself is domain logic
//! and stays in scope.

use crate::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Mock,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsmCredential {
    pub app_key: String,
    pub app_secret: String,
    pub account_no: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsmSettings {
    pub watch_symbols: Vec<String>,
    pub mode: Mode,
    pub live_mode_confirmed: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradingGuardStatus {
    pub open_orders: i64,
    pub open_positions: i64,
    pub engine_state: &'static str,
}

const SYMBOL_LEN: usize = 6;
const MAX_WATCH_SYMBOLS: usize = 20;

pub fn normalize_symbols(watch_symbols: &[String]) -> Vec<String> {
    watch_symbols.iter().map(|s| s.trim().to_string()).collect()
}

pub fn validate_watch_symbols(watch_symbols: &[String]) -> Result<()> {
    if watch_symbols.is_empty() || watch_symbols.len() > MAX_WATCH_SYMBOLS {
        return Err(EngineError::CsmSymbolCountOutOfRange(watch_symbols.len()));
    }
    if watch_symbols
        .iter()
        .any(|s| s.len() != SYMBOL_LEN || !s.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(EngineError::CsmSymbolFormatInvalid(watch_symbols.join(",")));
    }
    let mut seen = std::collections::HashSet::new();
    for symbol in watch_symbols {
        if !seen.insert(symbol.as_str()) {
            return Err(EngineError::CsmSymbolDuplicated(symbol.clone()));
        }
    }
    Ok(())
}

pub fn validate_mode(mode: Mode, live_mode_confirmed: bool) -> Result<()> {
    if mode == Mode::Live && !live_mode_confirmed {
        return Err(EngineError::CsmLiveConfirmRequired);
    }
    Ok(())
}

pub fn normalize_credential(credential: CsmCredential) -> CsmCredential {
    CsmCredential {
        app_key: credential.app_key.trim().to_string(),
        app_secret: credential.app_secret.trim().to_string(),
        account_no: credential.account_no.replace('-', "").trim().to_string(),
        user_id: credential.user_id.trim().to_string(),
    }
}

pub fn validate_credential(credential: &CsmCredential) -> Result<()> {
    if credential.app_key.is_empty() {
        return Err(EngineError::CsmCredentialRequiredFieldMissing("appKey".into()));
    }
    if credential.app_secret.is_empty() {
        return Err(EngineError::CsmCredentialRequiredFieldMissing(
            "appSecret".into(),
        ));
    }
    if credential.account_no.is_empty() || !credential.account_no.chars().all(|c| c.is_ascii_digit()) {
        return Err(EngineError::CsmCredentialRequiredFieldMissing(
            "accountNo".into(),
        ));
    }
    if credential.user_id.is_empty() {
        return Err(EngineError::CsmCredentialRequiredFieldMissing("userId".into()));
    }
    Ok(())
}

pub fn validate_mode_switch_guard(guard: &TradingGuardStatus) -> Result<()> {
    if guard.open_orders != 0 || guard.open_positions != 0 || guard.engine_state != "IDLE" {
        return Err(EngineError::CsmModeSwitchPreconditionFailed(format!(
            "openOrders={} openPositions={} engineState={}",
            guard.open_orders, guard.open_positions, guard.engine_state
        )));
    }
    Ok(())
}

pub fn mask_app_key(_: &str) -> &'static str {
    "***masked***"
}

pub fn mask_app_secret(_: &str) -> &'static str {
    "***masked***"
}

pub fn mask_account_no(account_no: &str) -> String {
    let suffix = if account_no.len() >= 4 {
        &account_no[account_no.len() - 4..]
    } else {
        account_no
    };
    format!("******{suffix}")
}

pub fn mask_user_id(user_id: &str) -> String {
    let prefix = if user_id.len() >= 2 { &user_id[..2] } else { user_id };
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_count_out_of_range_rejected() {
        assert!(validate_watch_symbols(&[]).is_err());
        let too_many: Vec<String> = (0..21).map(|i| format!("{:06}", i)).collect();
        assert!(validate_watch_symbols(&too_many).is_err());
    }

    #[test]
    fn symbol_format_must_be_six_digits() {
        assert!(validate_watch_symbols(&["12345".to_string()]).is_err());
        assert!(validate_watch_symbols(&["00593A".to_string()]).is_err());
        assert!(validate_watch_symbols(&["005930".to_string()]).is_ok());
    }

    #[test]
    fn duplicate_symbols_rejected() {
        assert!(validate_watch_symbols(&["005930".to_string(), "005930".to_string()]).is_err());
    }

    #[test]
    fn live_mode_requires_confirmation() {
        assert!(validate_mode(Mode::Live, false).is_err());
        assert!(validate_mode(Mode::Live, true).is_ok());
        assert!(validate_mode(Mode::Mock, false).is_ok());
    }

    #[test]
    fn masking_preserves_only_the_specified_fragments() {
        assert_eq!(mask_account_no("123456789"), "******6789");
        assert_eq!(mask_user_id("traderjoe"), "tr***");
        assert_eq!(mask_app_key("secret-key"), "***masked***");
    }

    #[test]
    fn mode_switch_guard_rejects_when_not_idle() {
        let guard = TradingGuardStatus {
            open_orders: 1,
            open_positions: 0,
            engine_state: "IDLE",
        };
        assert!(validate_mode_switch_guard(&guard).is_err());
    }
}
