use crate::host::lifecycle::{ControlContext, OutputNotifier, Outputs, StandardControl, View};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Constructed,
    Initialized,
    Destroyed,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("control '{component}' is not initialized")]
    NotInitialized { component: String },
    #[error("control '{component}' is already initialized")]
    AlreadyInitialized { component: String },
    #[error("control '{component}' has been destroyed")]
    Destroyed { component: String },
    #[error("control '{component}' failed to initialize")]
    InitFailed {
        component: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Drives one control through its lifecycle
///
/// Calls made out of order are rejected with a [`LifecycleError`] and never
/// reach the control.
pub struct ControlHost<C> {
    control: C,
    context: ControlContext,
    notifier: OutputNotifier,
    state: ControlState,
}

impl<C> ControlHost<C>
where
    C: StandardControl,
{
    pub fn new(control: C, context: ControlContext) -> Self {
        Self::with_notifier(control, context, OutputNotifier::new())
    }

    pub fn with_notifier(control: C, context: ControlContext, notifier: OutputNotifier) -> Self {
        Self {
            control,
            context,
            notifier,
            state: ControlState::Constructed,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn context(&self) -> &ControlContext {
        &self.context
    }

    /// Replace the bound parameters; takes effect on the next `update_view`
    pub fn context_mut(&mut self) -> &mut ControlContext {
        &mut self.context
    }

    pub fn output_changes(&self) -> usize {
        self.notifier.change_count()
    }

    pub fn init(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            ControlState::Constructed => {}
            ControlState::Initialized => {
                return Err(LifecycleError::AlreadyInitialized {
                    component: self.context.component_id.clone(),
                });
            }
            ControlState::Destroyed => return Err(self.destroyed()),
        }

        self.control
            .init(&self.context, self.notifier.clone())
            .map_err(|source| LifecycleError::InitFailed {
                component: self.context.component_id.clone(),
                source,
            })?;

        log::debug!("Control '{}' initialized", self.context.component_id);
        self.state = ControlState::Initialized;
        Ok(())
    }

    pub fn update_view(&mut self) -> Result<View, LifecycleError> {
        self.ensure_initialized()?;
        Ok(self.control.update_view(&self.context))
    }

    pub fn get_outputs(&self) -> Result<Outputs, LifecycleError> {
        self.ensure_initialized()?;
        Ok(self.control.get_outputs())
    }

    /// Tear the control down; destroying a control that never initialized
    /// only marks it destroyed
    pub fn destroy(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            ControlState::Destroyed => return Err(self.destroyed()),
            ControlState::Initialized => self.control.destroy(),
            ControlState::Constructed => {}
        }

        log::debug!("Control '{}' destroyed", self.context.component_id);
        self.state = ControlState::Destroyed;
        Ok(())
    }

    /// Access the initialized control to drive its own actions
    pub fn control(&self) -> Result<&C, LifecycleError> {
        self.ensure_initialized()?;
        Ok(&self.control)
    }

    pub fn control_mut(&mut self) -> Result<&mut C, LifecycleError> {
        self.ensure_initialized()?;
        Ok(&mut self.control)
    }

    fn ensure_initialized(&self) -> Result<(), LifecycleError> {
        match self.state {
            ControlState::Initialized => Ok(()),
            ControlState::Constructed => Err(LifecycleError::NotInitialized {
                component: self.context.component_id.clone(),
            }),
            ControlState::Destroyed => Err(self.destroyed()),
        }
    }

    fn destroyed(&self) -> LifecycleError {
        LifecycleError::Destroyed {
            component: self.context.component_id.clone(),
        }
    }
}

impl<C> Drop for ControlHost<C> {
    fn drop(&mut self) {
        if self.state == ControlState::Initialized {
            log::debug!(
                "Control '{}' dropped without destroy",
                self.context.component_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ServiceRegistry;
    use pcf_event_bus::PageContext;
    use pcf_types::Config;
    use std::sync::Arc;

    #[derive(Default)]
    struct Probe {
        calls: Vec<&'static str>,
        fail_init: bool,
    }

    impl StandardControl for Probe {
        fn init(&mut self, _: &ControlContext, notifier: OutputNotifier) -> anyhow::Result<()> {
            if self.fail_init {
                anyhow::bail!("missing parameter");
            }
            self.calls.push("init");
            notifier.notify_output_changed();
            Ok(())
        }

        fn update_view(&mut self, _: &ControlContext) -> View {
            self.calls.push("update_view");
            View::new().line("probe")
        }

        fn get_outputs(&self) -> Outputs {
            Outputs::new()
        }

        fn destroy(&mut self) {
            self.calls.push("destroy");
        }
    }

    fn context() -> ControlContext {
        ControlContext::new(
            "probe",
            Arc::new(PageContext::default()),
            ServiceRegistry::new(Arc::new(Config::default())),
        )
    }

    #[test]
    fn test_calls_before_init_are_rejected() {
        let mut host = ControlHost::new(Probe::default(), context());
        assert!(matches!(
            host.update_view(),
            Err(LifecycleError::NotInitialized { .. })
        ));
        assert!(host.get_outputs().is_err());
        assert!(host.control().is_err());
    }

    #[test]
    fn test_full_lifecycle_in_order() {
        let mut host = ControlHost::new(Probe::default(), context());
        host.init().unwrap();
        assert!(matches!(
            host.init(),
            Err(LifecycleError::AlreadyInitialized { .. })
        ));

        assert!(host.update_view().unwrap().contains("probe"));
        host.get_outputs().unwrap();
        assert_eq!(host.output_changes(), 1);

        host.destroy().unwrap();
        assert_eq!(host.state(), ControlState::Destroyed);
        assert!(matches!(host.update_view(), Err(LifecycleError::Destroyed { .. })));
        assert!(host.destroy().is_err());
        assert!(host.init().is_err());
    }

    #[test]
    fn test_failed_init_leaves_control_constructed() {
        let probe = Probe {
            fail_init: true,
            ..Default::default()
        };
        let mut host = ControlHost::new(probe, context());

        assert!(matches!(host.init(), Err(LifecycleError::InitFailed { .. })));
        assert_eq!(host.state(), ControlState::Constructed);

        // Never initialized, so destroy must not reach the control
        host.destroy().unwrap();
        assert!(host.control.calls.is_empty());
    }
}
