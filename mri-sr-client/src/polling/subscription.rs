//! Subscription handles.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::PollEvent;
use super::controller::PollRegistry;
use crate::domain::JobId;

struct Attachment {
    registry: Arc<Mutex<PollRegistry>>,
    generation: u64,
    listener: u64,
}

/// A listener on one job's polling loop.
///
/// Dropping the handle detaches it the same way
/// [`unsubscribe`](Self::unsubscribe) does.
pub struct PollSubscription {
    job_id: JobId,
    receiver: mpsc::UnboundedReceiver<PollEvent>,
    attachment: Option<Attachment>,
}

impl PollSubscription {
    pub(super) fn attached(
        job_id: JobId,
        receiver: mpsc::UnboundedReceiver<PollEvent>,
        registry: Arc<Mutex<PollRegistry>>,
        generation: u64,
        listener: u64,
    ) -> Self {
        Self {
            job_id,
            receiver,
            attachment: Some(Attachment {
                registry,
                generation,
                listener,
            }),
        }
    }

    /// A subscription that only replays what was already sent.
    pub(super) fn detached(job_id: JobId, receiver: mpsc::UnboundedReceiver<PollEvent>) -> Self {
        Self {
            job_id,
            receiver,
            attachment: None,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// The next notification, or `None` once the loop has ended.
    pub async fn recv(&mut self) -> Option<PollEvent> {
        self.receiver.recv().await
    }

    /// A notification that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<PollEvent> {
        self.receiver.try_recv().ok()
    }

    /// Detach from the loop. The last detach stops it.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            attachment.registry.lock().detach(
                &self.job_id,
                attachment.generation,
                attachment.listener,
            );
        }
        self.receiver.close();
    }
}

impl Drop for PollSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for PollSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollSubscription")
            .field("job_id", &self.job_id)
            .field("attached", &self.attachment.is_some())
            .finish()
    }
}
