//! SessionStart / SessionEnd / Notification handlers.
//!
//! Lifecycle hooks never influence control: every handler returns `{}`.

use std::sync::Arc;

use serde_json::{json, Value};

use claudecube_core::session::SessionRegistry;

use crate::hooks::LifecycleEvent;
use crate::notify::Notifier;

pub struct LifecyclePipeline {
    registry: Arc<SessionRegistry>,
    notifier: Notifier,
}

impl LifecyclePipeline {
    pub fn new(registry: Arc<SessionRegistry>, notifier: Notifier) -> Self {
        Self { registry, notifier }
    }

    pub async fn session_start(&self, event: LifecycleEvent) -> Value {
        self.registry.ensure_registered(
            &event.session_id,
            &event.cwd,
            event.transcript_path.as_deref(),
        );
        if let Some(label) = self.registry.get_label(&event.session_id) {
            self.notifier.session_started(&label, &event.cwd).await;
        }
        json!({})
    }

    pub async fn session_end(&self, event: LifecycleEvent) -> Value {
        if let Some(info) = self.registry.deregister(&event.session_id) {
            self.notifier.session_ended(&info.label).await;
        }
        json!({})
    }

    pub async fn notification(&self, event: LifecycleEvent) -> Value {
        self.registry.touch(&event.session_id);
        json!({})
    }
}
