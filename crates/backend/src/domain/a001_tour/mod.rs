pub mod hooks;
pub mod repository;
pub mod service;

use contracts::domain::common::ValidationError;
use thiserror::Error;

use crate::shared::docstore::StoreError;

/// Ошибки операций над турами
#[derive(Debug, Error)]
pub enum TourError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<StoreError> for TourError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => TourError::Validation(e),
            StoreError::Storage(e) => TourError::Storage(e),
        }
    }
}
