use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use shared_database::{DirectoryStore, Stores};
use shared_models::{Clinic, Provider};

use crate::models::AvailabilityError;

pub struct DirectoryService {
    directory: Arc<dyn DirectoryStore>,
}

impl DirectoryService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            directory: stores.directory.clone(),
        }
    }

    pub async fn list_clinics(&self) -> Result<Vec<Clinic>, AvailabilityError> {
        Ok(self.directory.list_clinics().await?)
    }

    pub async fn clinic_providers(&self, clinic_id: Uuid) -> Result<Vec<Provider>, AvailabilityError> {
        Ok(self.directory.list_clinic_providers(clinic_id).await?)
    }

    pub async fn get_provider(&self, provider_id: Uuid) -> Result<Provider, AvailabilityError> {
        self.directory
            .get_provider(provider_id)
            .await?
            .ok_or(AvailabilityError::ProviderNotFound(provider_id))
    }

    /// True when `user_id` is the auth account behind `provider_id`.
    pub async fn is_provider_account(
        &self,
        provider_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AvailabilityError> {
        Ok(self
            .directory
            .get_provider(provider_id)
            .await?
            .is_some_and(|p| p.user_id() == user_id))
    }

    /// General practitioner of the clinic when there is one, else its first doctor.
    pub async fn default_provider_for_clinic(
        &self,
        clinic_id: Uuid,
    ) -> Result<Provider, AvailabilityError> {
        let providers = self.directory.list_clinic_providers(clinic_id).await?;
        let picked = pick_default_provider(providers)
            .ok_or(AvailabilityError::NoProviderInClinic(clinic_id))?;
        debug!("Picked doctor {} for clinic {}", picked.id, clinic_id);
        Ok(picked)
    }
}

pub fn pick_default_provider(mut providers: Vec<Provider>) -> Option<Provider> {
    let gp = providers.iter().position(Provider::is_general_practitioner);
    match gp {
        Some(index) => Some(providers.swap_remove(index)),
        None => providers.into_iter().next(),
    }
}
