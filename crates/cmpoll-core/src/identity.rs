//! ---
//! cmp_section: "01-core-functionality"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Modem polling state machine and result records."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use cmpoll_logging::LogContext;
use serde::{Deserialize, Serialize};

/// Who a modem is and where to reach it. Fixed for the duration of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModemIdentity {
    /// Customer reference; may be empty.
    pub business_id: String,
    /// MAC address as 12 lowercase hex digits.
    pub hardware_id: String,
    /// Host or `host:port` the agent listens on.
    pub address: String,
}

impl ModemIdentity {
    pub fn new(
        business_id: impl Into<String>,
        hardware_id: impl AsRef<str>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            business_id: business_id.into(),
            hardware_id: normalize_hardware_id(hardware_id.as_ref()),
            address: address.into(),
        }
    }

    /// Logging context carrying this identity.
    pub fn log_context(&self) -> LogContext<'_> {
        LogContext::new()
            .with_business_id(&self.business_id)
            .with_hardware_id(&self.hardware_id)
            .with_address(&self.address)
    }
}

/// Everything a worker needs to poll one modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub community: String,
    pub address: String,
    pub business_id: String,
    pub hardware_id: String,
}

impl PollRequest {
    pub fn new(identity: ModemIdentity, community: impl Into<String>) -> Self {
        Self {
            community: community.into(),
            address: identity.address,
            business_id: identity.business_id,
            hardware_id: identity.hardware_id,
        }
    }

    pub fn identity(&self) -> ModemIdentity {
        ModemIdentity {
            business_id: self.business_id.clone(),
            hardware_id: self.hardware_id.clone(),
            address: self.address.clone(),
        }
    }
}

/// Lowercase a MAC and drop `:`, `-` and `.` separators.
pub fn normalize_hardware_id(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}
