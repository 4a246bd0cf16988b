//! Keyword discovery polling
//!
//! After a project is created the backend discovers keywords in the
//! background. The client polls until the first non-empty list shows up.

use super::PollingSupervisor;
use crate::api::{ChatBackend, Keyword};
use crate::error::ChatError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Poll `project_id` for keywords on `supervisor`, replacing whatever it was
/// polling before. The returned receiver is updated with the first
/// non-empty list, at which point polling stops.
pub fn start_keyword_discovery<B>(
    supervisor: &PollingSupervisor,
    backend: Arc<B>,
    project_id: impl Into<String>,
    interval: Duration,
) -> watch::Receiver<Vec<Keyword>>
where
    B: ChatBackend + 'static,
{
    let project_id: Arc<str> = Arc::from(project_id.into());
    let (tx, rx) = watch::channel(Vec::new());
    let tx = Arc::new(tx);

    tracing::info!(project_id = %project_id, "Starting keyword discovery");

    let check = move || {
        let backend = Arc::clone(&backend);
        let project_id = Arc::clone(&project_id);
        let tx = Arc::clone(&tx);
        async move {
            let keywords = backend.check_keywords(&project_id).await?;
            tracing::debug!(project_id = %project_id, count = keywords.len(), "Keyword check");
            if !keywords.is_empty() {
                tx.send_replace(keywords.clone());
            }
            Ok::<_, ChatError>(keywords)
        }
    };

    supervisor.start(check, |keywords: &Vec<Keyword>| !keywords.is_empty(), interval);
    rx
}
