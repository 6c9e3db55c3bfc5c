//! Sample controls
//!
//! Each control implements [`crate::host::StandardControl`] and only talks to
//! its peers through the page channel in its [`crate::host::ControlContext`].

mod debounce_input;
mod event_passer;
mod event_receiver;
mod execute_multiple;
mod lazy_loader;
mod text_echo;
mod web_api_sample;

pub use debounce_input::DebouncedInput;
pub use event_passer::{DEFAULT_PASSER_ID, EventPasser, PASSER_COMPONENT_TYPE, PASSER_MESSAGE};
pub use event_receiver::EventReceiver;
pub use execute_multiple::{ExecuteMultipleSample, SAMPLE_ENTITY, SampleStatus, sample_account};
pub use lazy_loader::{GRID_TITLE, LazyLoaderGrid};
pub use text_echo::{DEFAULT_ECHO_LABEL, TextEcho};
pub use web_api_sample::{
    ACCOUNT_ENTITY_SET, CONTACT_ENTITY_SET, ENVIRONMENT_VARIABLE_NAME, SAMPLE_FETCH_XML,
    WebApiSample, sample_contact_query,
};
