//! Repository toggle backend

use async_trait::async_trait;

use crate::error::PackageError;

/// Enables and disables repositories by label on one host
#[async_trait]
pub trait RepositoryBackend: Send + Sync {
    /// Enable one repository
    async fn enable(&self, repo: &str) -> Result<(), PackageError>;

    /// Disable one repository
    async fn disable(&self, repo: &str) -> Result<(), PackageError>;

    /// Disable every repository the host knows about
    async fn disable_all(&self) -> Result<(), PackageError>;

    /// Host the backend acts on, for logs
    fn host(&self) -> &str;
}
