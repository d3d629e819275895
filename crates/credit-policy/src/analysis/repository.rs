use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::domain::{LoanApplication, LoanId};

/// Storage abstraction for loan applications.
///
/// `save` is a compare-and-swap on [`LoanApplication::version`]: the stored copy must still
/// carry the version the caller read, and the returned copy carries the bumped version.
pub trait LoanRepository: Send + Sync {
    fn insert(&self, application: LoanApplication) -> Result<LoanApplication, RepositoryError>;
    fn get(&self, id: &LoanId) -> Result<LoanApplication, RepositoryError>;
    fn save(&self, application: LoanApplication) -> Result<LoanApplication, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("loan {0} does not exist")]
    NotFound(LoanId),
    #[error("loan {0} already exists")]
    Conflict(LoanId),
    #[error("loan {id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        id: LoanId,
        expected: u64,
        found: u64,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Process-local repository, used by the service binary and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLoanRepository {
    records: Arc<Mutex<HashMap<LoanId, LoanApplication>>>,
}

impl InMemoryLoanRepository {
    pub fn len(&self) -> usize {
        self.records.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<LoanId, LoanApplication>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

impl LoanRepository for InMemoryLoanRepository {
    fn insert(&self, application: LoanApplication) -> Result<LoanApplication, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Conflict(application.id));
        }
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn get(&self, id: &LoanId) -> Result<LoanApplication, RepositoryError> {
        let guard = self.lock()?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    fn save(&self, mut application: LoanApplication) -> Result<LoanApplication, RepositoryError> {
        let mut guard = self.lock()?;
        let stored = guard
            .get(&application.id)
            .ok_or_else(|| RepositoryError::NotFound(application.id.clone()))?;
        if stored.version != application.version {
            return Err(RepositoryError::VersionConflict {
                id: application.id,
                expected: application.version,
                found: stored.version,
            });
        }
        application.version += 1;
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }
}
