use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::info;

use shared_models::Notification;

use crate::supabase::SupabaseClient;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Writes rows into the `notifications` table.
pub struct SupabaseNotificationSink {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseNotificationSink {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl NotificationSink for SupabaseNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let body = serde_json::to_value(&notification)?;
        let _: Value = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notifications",
                None,
                Some(body),
                &[("prefer", "return=representation")],
            )
            .await?;
        Ok(())
    }
}

pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        info!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            "Notification: {}",
            notification.title
        );
        Ok(())
    }
}
