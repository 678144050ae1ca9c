//! Backend submission payloads.
//!
//! The core does not call the backend. It produces a
//! [`SubmissionRequest`] the app forwards as-is, and parses the
//! [`SubmissionResponse`] it gets back.

use bpesa_crypto::permit::PermitIntent;
use bpesa_types::TxType;
use serde::{Deserialize, Serialize};

/// Permit fields as decimal strings, as the backend expects them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitData {
    pub owner: String,
    pub spender: String,
    pub value: String,
    pub nonce: String,
    pub deadline: String,
}

impl PermitData {
    pub fn from_intent(intent: &PermitIntent) -> Self {
        Self {
            owner: intent.owner.to_checksum(None),
            spender: intent.spender.to_checksum(None),
            value: intent.value.to_string(),
            nonce: intent.nonce.to_string(),
            deadline: intent.deadline.to_string(),
        }
    }
}

/// Body of a send or withdraw request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub from: String,
    pub to: String,
    /// Whole-token decimal amount (`"12.5"`).
    pub amount: String,
    /// `0x`-prefixed 65-byte signature.
    pub signature: String,
    pub permit_data: PermitData,
    pub tx_type: TxType,
}

/// Backend reply to a [`SubmissionRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
