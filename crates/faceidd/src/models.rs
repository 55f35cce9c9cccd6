//! JSON bodies returned by the HTTP API.

use crate::engine::Verification;
use faceid_core::ConfidenceLevel;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Success,
    Failed,
}

/// Outcome of one document verification. Unset fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationData {
    pub status: VerificationStatus,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<ConfidenceLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_manual_review: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_1: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_2: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerificationData {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Failed,
            matched: None,
            confidence: None,
            confidence_level: None,
            requires_manual_review: None,
            similarity: None,
            quality_1: None,
            quality_2: None,
            threshold_used: None,
            processing_time_seconds: None,
            reason: Some(reason.into()),
        }
    }

    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time_seconds = Some(seconds);
        self
    }
}

impl From<Verification> for VerificationData {
    fn from(v: Verification) -> Self {
        Self {
            status: VerificationStatus::Success,
            matched: Some(v.matched),
            confidence: Some(v.confidence),
            confidence_level: Some(v.level),
            requires_manual_review: Some(v.requires_manual_review),
            similarity: Some(v.similarity),
            quality_1: Some(v.quality_1),
            quality_2: Some(v.quality_2),
            threshold_used: Some(v.threshold),
            processing_time_seconds: None,
            reason: None,
        }
    }
}

/// Envelope of `POST /api/verify-face`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<VerificationData>,
}

impl ApiResponse {
    pub fn success(data: VerificationData) -> Self {
        Self {
            status: true,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: String,
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_name: String,
    pub detection_size: (usize, usize),
    pub backend: String,
}
