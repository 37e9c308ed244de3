use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Supabase puts the database role ("authenticated") in `role`; the product role
    /// lives in `user_metadata.role` when present.
    pub fn product_role(&self) -> Option<String> {
        self.user_metadata
            .as_ref()
            .and_then(|meta| meta.get("role"))
            .and_then(|role| role.as_str())
            .map(str::to_string)
            .or_else(|| self.role.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn subject_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.id)
            .map_err(|_| AppError::Auth("Token subject is not a valid identifier".to_string()))
    }

    fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    pub fn is_provider(&self) -> bool {
        self.has_role("doctor")
    }

    /// Clinic secretaries and admins act on behalf of patients.
    pub fn is_staff(&self) -> bool {
        self.has_role("secretary") || self.is_admin()
    }

    /// A patient may only act for themselves; staff may act for anyone.
    pub fn ensure_can_act_for_patient(&self, patient_id: Uuid) -> Result<(), AppError> {
        if self.is_staff() || self.subject_id()? == patient_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Not authorized to act for this patient".to_string(),
            ))
        }
    }
}
