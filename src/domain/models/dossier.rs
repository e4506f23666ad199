//! Dossier, business domain and client-info models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An organisational namespace with its own template, dossiers and users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDomain {
    /// Short code, e.g. `JDE`.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Status given to dossiers created in (or transferred into) the domain.
    pub initial_status: String,
}

impl BusinessDomain {
    /// Domain with the given code, name and initial dossier status.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        initial_status: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            initial_status: initial_status.into(),
        }
    }
}

/// A case file worked through its domain's workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dossier {
    /// Unique identifier, generated at construction.
    pub id: Uuid,
    /// Business domain the dossier belongs to.
    pub domain_code: String,
    /// Display title.
    pub title: String,
    /// External reference, such as a claim number.
    pub reference: Option<String>,
    /// Business status, starting at the domain's `initial_status`.
    pub status: String,
    /// Free-form labels.
    pub tags: Vec<String>,
    /// User owning the dossier; required to transfer it.
    pub owner_id: Option<Uuid>,
    /// Source dossier when this one was created by a transfer.
    pub transferred_from: Option<Uuid>,
    /// When the dossier was created.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Dossier {
    /// Create a dossier in the domain's initial status.
    pub fn new(domain: &BusinessDomain, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            domain_code: domain.code.clone(),
            title: title.into(),
            reference: None,
            status: domain.initial_status.clone(),
            tags: Vec::new(),
            owner_id: None,
            transferred_from: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the owner.
    pub fn with_owner(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Set the external reference.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Replace the tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Names of the fields a transfer needs but this dossier lacks.
    pub fn missing_transfer_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.owner_id.is_none() {
            missing.push("owner".to_string());
        }
        if self.title.trim().is_empty() {
            missing.push("title".to_string());
        }
        missing
    }

    /// Fresh copy of this dossier in another domain.
    ///
    /// Identity and status are reset; title, reference, tags and owner carry over.
    pub fn duplicate_into(&self, target: &BusinessDomain) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            domain_code: target.code.clone(),
            title: self.title.clone(),
            reference: self.reference.clone(),
            status: target.initial_status.clone(),
            tags: self.tags.clone(),
            owner_id: self.owner_id,
            transferred_from: Some(self.id),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Client data attached to a dossier. The payload is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Unique identifier.
    pub id: Uuid,
    /// Dossier the information describes.
    pub dossier_id: Uuid,
    /// Opaque client payload.
    pub data: Value,
    /// When the information was recorded.
    pub created_at: DateTime<Utc>,
}

impl ClientInfo {
    /// Client information for `dossier_id`.
    pub fn new(dossier_id: Uuid, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            dossier_id,
            data,
            created_at: Utc::now(),
        }
    }

    /// Copy for another dossier, with a fresh identity.
    pub fn duplicate_for(&self, dossier_id: Uuid) -> Self {
        Self::new(dossier_id, self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_resets_identity_and_status() {
        let jde = BusinessDomain::new("JDE", "Insurance expertise", "new");
        let jdmo = BusinessDomain::new("JDMO", "Project management", "draft");
        let mut source = Dossier::new(&jde, "Water damage")
            .with_owner(Uuid::new_v4())
            .with_reference("JDE-2024-001")
            .with_tags(vec!["urgent".to_string()]);
        source.status = "visit_done".to_string();

        let copy = source.duplicate_into(&jdmo);

        assert_ne!(copy.id, source.id);
        assert_eq!(copy.domain_code, "JDMO");
        assert_eq!(copy.status, "draft");
        assert_eq!(copy.title, source.title);
        assert_eq!(copy.tags, source.tags);
        assert_eq!(copy.owner_id, source.owner_id);
        assert_eq!(copy.transferred_from, Some(source.id));
    }

    #[test]
    fn test_missing_transfer_fields() {
        let jde = BusinessDomain::new("JDE", "Insurance expertise", "new");
        let dossier = Dossier::new(&jde, "  ");
        assert_eq!(dossier.missing_transfer_fields(), vec!["owner", "title"]);

        let complete = Dossier::new(&jde, "Roof").with_owner(Uuid::new_v4());
        assert!(complete.missing_transfer_fields().is_empty());
    }
}
