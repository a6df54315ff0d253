//! Consumer-side lifecycle state machine, spec.md §4.5.
//!
//! This module owns only the pure transition legality and logging; actual
//! frame/pop-up creation is a DOM concern excluded from the core per
//! spec.md §1 and driven by `forgeframe-web::consumer::ConsumerEngine`.

use forgeframe_protocol::ForgeFrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Created,
    Prerendered,
    Opened,
    Ready,
    Updating,
    Closing,
    Destroyed,
}

impl InstanceState {
    fn allowed_next(self) -> &'static [InstanceState] {
        use InstanceState::*;
        match self {
            Created => &[Prerendered, Closing],
            Prerendered => &[Opened, Closing],
            Opened => &[Ready, Closing],
            Ready => &[Updating, Closing],
            Updating => &[Ready, Closing],
            Closing => &[Destroyed],
            Destroyed => &[],
        }
    }

    pub fn can_transition_to(self, next: InstanceState) -> bool {
        self.allowed_next().contains(&next)
    }
}

/// Lifecycle events the engine emits on the instance's event bus, spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Prerender,
    Prerendered,
    Render,
    Rendered,
    Display,
    Props,
    Resize,
    Focus,
    Close,
    Destroy,
    Error,
}

/// Pure state-transition tracker for one component instance.
pub struct Instance {
    pub uid: String,
    pub tag: String,
    state: InstanceState,
    span: tracing::Span,
}

impl Instance {
    pub fn new(uid: String, tag: String) -> Self {
        let span = tracing::info_span!("forgeframe_instance", uid = %uid, tag = %tag);
        {
            let _enter = span.enter();
            tracing::info!("instance created");
        }
        Self {
            uid,
            tag,
            state: InstanceState::Created,
            span,
        }
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Advance the state machine, rejecting illegal transitions.
    pub fn transition(&mut self, next: InstanceState) -> Result<(), ForgeFrameError> {
        let _enter = self.span.enter();
        if !self.state.can_transition_to(next) {
            return Err(ForgeFrameError::InvalidState(format!(
                "{:?} -> {:?}",
                self.state, next
            )));
        }
        tracing::info!(from = ?self.state, to = ?next, "instance state transition");
        self.state = next;
        Ok(())
    }

    /// spec.md §4.5 step 2: render() requires state = CREATED.
    pub fn ensure_renderable(&self) -> Result<(), ForgeFrameError> {
        if self.state != InstanceState::Created {
            return Err(ForgeFrameError::InvalidState(format!("{:?}", self.state)));
        }
        Ok(())
    }

    pub fn ensure_ready(&self) -> Result<(), ForgeFrameError> {
        if self.state != InstanceState::Ready {
            return Err(ForgeFrameError::InvalidState(format!("{:?}", self.state)));
        }
        Ok(())
    }

    /// Idempotent close: returns `false` (no-op) if already destroyed,
    /// `true` if this call actually performed the teardown.
    pub fn close(&mut self) -> Result<bool, ForgeFrameError> {
        if self.state == InstanceState::Destroyed {
            return Ok(false);
        }
        // Any live state can move to Closing per `allowed_next`.
        self.transition(InstanceState::Closing)?;
        self.transition(InstanceState::Destroyed)?;
        Ok(true)
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == InstanceState::Destroyed
    }
}
