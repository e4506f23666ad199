//! Cross-domain transfer ledger and eligibility matrix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::dossier::Dossier;
use crate::domain::errors::{DomainError, DomainResult};

/// Status of a transfer attempt. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Ledger row written; duplication not finished.
    InProgress,
    /// Target dossier created and linked.
    Completed,
    /// Duplication rolled back; `error_message` says why.
    Failed,
}

impl TransferStatus {
    /// Stored name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the attempt is finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source state captured when the transfer starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSnapshot {
    /// Source title at initiation.
    pub title: String,
    /// Source reference at initiation.
    pub reference: Option<String>,
    /// Source business status at initiation.
    pub source_status: String,
    /// Whether the source carried client information.
    pub had_client_info: bool,
}

impl TransferSnapshot {
    /// Snapshot of `source` as it is now.
    pub fn capture(source: &Dossier, had_client_info: bool) -> Self {
        Self {
            title: source.title.clone(),
            reference: source.reference.clone(),
            source_status: source.status.clone(),
            had_client_info,
        }
    }
}

/// Append-only ledger record of one transfer attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DossierTransfer {
    /// Unique identifier.
    pub id: Uuid,
    /// Dossier being duplicated.
    pub source_dossier_id: Uuid,
    /// Domain code of the source.
    pub source_domain: String,
    /// Domain code of the new dossier.
    pub target_domain: String,
    /// New dossier, once it exists.
    pub target_dossier_id: Option<Uuid>,
    /// Progress of the attempt.
    pub status: TransferStatus,
    /// User who requested the transfer.
    pub actor_id: Uuid,
    /// Source state captured at initiation.
    pub metadata: TransferSnapshot,
    /// Why the attempt failed.
    pub error_message: Option<String>,
    /// When the attempt started.
    pub created_at: DateTime<Utc>,
    /// When the attempt finished, either way.
    pub completed_at: Option<DateTime<Utc>>,
}

impl DossierTransfer {
    /// Open a ledger row for a new attempt.
    pub fn begin(
        source: &Dossier,
        target_domain: impl Into<String>,
        actor_id: Uuid,
        metadata: TransferSnapshot,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_dossier_id: source.id,
            source_domain: source.domain_code.clone(),
            target_domain: target_domain.into(),
            target_dossier_id: None,
            status: TransferStatus::InProgress,
            actor_id,
            metadata,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record the attempt as failed. A finished row never changes again.
    pub fn fail(&mut self, error_message: impl Into<String>) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: TransferStatus::Failed.to_string(),
                reason: "transfer already finished".to_string(),
            });
        }
        self.status = TransferStatus::Failed;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

/// Transfer targets one source domain may use.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferRule {
    /// Domain codes this source may transfer into.
    #[serde(default)]
    pub allowed_targets: Vec<String>,
    /// Human-readable reason shown when a transfer is refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
}

/// Which domain may transfer into which, keyed by source domain code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferMatrix {
    rules: BTreeMap<String, TransferRule>,
}

impl Default for TransferMatrix {
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            "JDE".to_string(),
            TransferRule {
                allowed_targets: vec!["JDMO".to_string(), "DBCS".to_string()],
                denial_reason: None,
            },
        );
        rules.insert(
            "JDMO".to_string(),
            TransferRule {
                allowed_targets: vec!["DBCS".to_string()],
                denial_reason: None,
            },
        );
        rules.insert(
            "DBCS".to_string(),
            TransferRule {
                allowed_targets: vec![],
                denial_reason: Some("transfers from DBCS are not permitted".to_string()),
            },
        );
        Self { rules }
    }
}

impl TransferMatrix {
    /// Matrix with no rules; every transfer is refused.
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Add or replace the rule of `source`.
    pub fn with_rule(mut self, source: impl Into<String>, rule: TransferRule) -> Self {
        self.rules.insert(source.into(), rule);
        self
    }

    /// Rules by source domain code.
    pub fn rules(&self) -> &BTreeMap<String, TransferRule> {
        &self.rules
    }

    /// Targets `source` may use; empty for an unknown source.
    pub fn allowed_targets(&self, source: &str) -> &[String] {
        self.rules
            .get(source)
            .map(|rule| rule.allowed_targets.as_slice())
            .unwrap_or_default()
    }

    /// Refuse any pair the matrix does not explicitly allow.
    pub fn check(&self, source: &str, target: &str) -> DomainResult<()> {
        let refuse = |reason: String| DomainError::TransferNotEligible {
            source_domain: source.to_string(),
            target_domain: target.to_string(),
            reason,
        };

        let Some(rule) = self.rules.get(source) else {
            return Err(refuse(format!("no transfer rule is declared for {source}")));
        };
        if rule.allowed_targets.is_empty() {
            return Err(refuse(rule.denial_reason.clone().unwrap_or_else(|| {
                format!("transfers from {source} are not permitted")
            })));
        }
        if !rule.allowed_targets.iter().any(|t| t == target) {
            return Err(refuse(rule.denial_reason.clone().unwrap_or_else(|| {
                format!("transfers from {source} to {target} are not permitted")
            })));
        }
        Ok(())
    }
}
