//! Dossier, business domain and client-info repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BusinessDomain, ClientInfo, Dossier};

/// Repository interface for dossiers and the data hanging off them.
#[async_trait]
pub trait DossierRepository: Send + Sync {
    /// Insert or update a business domain.
    async fn upsert_domain(&self, domain: &BusinessDomain) -> DomainResult<()>;

    /// Get a business domain by code.
    async fn get_domain(&self, code: &str) -> DomainResult<Option<BusinessDomain>>;

    /// List all business domains.
    async fn list_domains(&self) -> DomainResult<Vec<BusinessDomain>>;

    /// Create a new dossier.
    async fn create(&self, dossier: &Dossier) -> DomainResult<()>;

    /// Get a dossier by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Dossier>>;

    /// Set the free-form status of a dossier. Returns false when the dossier does not exist.
    async fn update_status(&self, id: Uuid, status: &str) -> DomainResult<bool>;

    /// List dossiers of a domain, newest first.
    async fn list_by_domain(&self, domain_code: &str) -> DomainResult<Vec<Dossier>>;

    /// Attach or replace the client info of a dossier.
    async fn save_client_info(&self, info: &ClientInfo) -> DomainResult<()>;

    /// Get the client info of a dossier.
    async fn get_client_info(&self, dossier_id: Uuid) -> DomainResult<Option<ClientInfo>>;
}
