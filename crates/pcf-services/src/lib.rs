pub mod execute_service;
pub mod in_memory;
pub mod odata;
pub mod web_api;

pub use execute_service::{BatchOutcome, ExecuteError, ExecuteService};
pub use in_memory::InMemoryWebApi;
pub use odata::{ODataClient, ODataQuery};
pub use web_api::{EntityCollection, WebApi, WebApiResponse};
