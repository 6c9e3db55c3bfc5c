//! Typed Web API requests
//!
//! Every request handed to the host `execute`/`executeMultiple` calls is an
//! [`ExecuteRequest`] with a closed [`OperationKind`]. Requests are validated
//! before submission and produce the metadata block the host expects.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Action,
    Function,
}

impl OperationKind {
    pub fn is_crud(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }

    pub fn operation_type(self) -> OperationType {
        match self {
            Self::Create | Self::Update | Self::Delete => OperationType::Crud,
            Self::Action => OperationType::Action,
            Self::Function => OperationType::Function,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Action => "Action",
            Self::Function => "Function",
        };
        f.write_str(name)
    }
}

/// Numeric operation type understood by the host runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationType {
    Action = 0,
    Function = 1,
    Crud = 2,
}

impl OperationType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Declared type of a request parameter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterType {
    pub type_name: String,
    /// 0 unknown, 1 primitive, 2 complex, 3 enumeration, 4 collection, 5 entity
    pub structural_property: u8,
}

impl ParameterType {
    fn entity(entity_name: &str) -> Self {
        Self {
            type_name: format!("mscrm.{}", entity_name),
            structural_property: 5,
        }
    }

    fn infer(value: &Value) -> Self {
        let (type_name, structural_property) = match value {
            Value::Bool(_) => ("Edm.Boolean", 1),
            Value::Number(n) if n.as_i64().is_some_and(|v| i32::try_from(v).is_ok()) => {
                ("Edm.Int32", 1)
            }
            Value::Number(n) if n.is_i64() || n.is_u64() => ("Edm.Int64", 1),
            Value::Number(_) => ("Edm.Double", 1),
            Value::String(_) | Value::Null => ("Edm.String", 1),
            Value::Array(_) => ("Collection(mscrm.crmbaseentity)", 4),
            Value::Object(_) => ("mscrm.crmbaseentity", 5),
        };
        Self {
            type_name: type_name.to_string(),
            structural_property,
        }
    }
}

/// Metadata block returned by a request's `getMetadata`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub bound_parameter: Option<String>,
    pub parameter_types: BTreeMap<String, ParameterType>,
    pub operation_type: u8,
    pub operation_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("{kind} request is missing an entity name")]
    MissingEntityName { kind: OperationKind },
    #[error("'{0}' is not a valid entity logical name")]
    InvalidEntityName(String),
    #[error("{kind} request on '{entity}' requires an entity id")]
    MissingEntityId { kind: OperationKind, entity: String },
    #[error("{kind} payload must be a JSON object")]
    PayloadNotObject { kind: OperationKind },
    #[error("{kind} payload must contain at least one attribute")]
    EmptyPayload { kind: OperationKind },
    #[error("{kind} request must not carry a payload")]
    UnexpectedPayload { kind: OperationKind },
    #[error("{kind} request is missing an operation name")]
    MissingOperationName { kind: OperationKind },
    #[error("function '{function}' parameter '{parameter}' must be a primitive value")]
    InvalidFunctionParameter { function: String, parameter: String },
    #[error("batch contains no requests")]
    EmptyBatch,
    #[error("change set at batch position {index} is empty")]
    EmptyChangeSet { index: usize },
    #[error("change set at batch position {index} contains a function call")]
    FunctionInChangeSet { index: usize },
    #[error("invalid request at batch position {index}: {source}")]
    InvalidBatchItem {
        index: usize,
        #[source]
        source: Box<RequestError>,
    },
}

/// A single request for the host Web API
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub kind: OperationKind,
    /// Entity logical name; for actions and functions the bound entity, empty when unbound
    #[serde(default)]
    pub entity_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
    /// Name of the action or function; CRUD requests use the kind name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl ExecuteRequest {
    pub fn create(entity_name: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: OperationKind::Create,
            entity_name: entity_name.into(),
            entity_id: None,
            operation_name: None,
            payload,
        }
    }

    pub fn update(entity_name: impl Into<String>, entity_id: Uuid, payload: Value) -> Self {
        Self {
            kind: OperationKind::Update,
            entity_name: entity_name.into(),
            entity_id: Some(entity_id),
            operation_name: None,
            payload,
        }
    }

    pub fn delete(entity_name: impl Into<String>, entity_id: Uuid) -> Self {
        Self {
            kind: OperationKind::Delete,
            entity_name: entity_name.into(),
            entity_id: Some(entity_id),
            operation_name: None,
            payload: Value::Null,
        }
    }

    /// Unbound action
    pub fn action(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: OperationKind::Action,
            entity_name: String::new(),
            entity_id: None,
            operation_name: Some(name.into()),
            payload: parameters,
        }
    }

    /// Action bound to a specific record
    pub fn bound_action(
        name: impl Into<String>,
        entity_name: impl Into<String>,
        entity_id: Uuid,
        parameters: Value,
    ) -> Self {
        Self {
            kind: OperationKind::Action,
            entity_name: entity_name.into(),
            entity_id: Some(entity_id),
            operation_name: Some(name.into()),
            payload: parameters,
        }
    }

    /// Unbound function
    pub fn function(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: OperationKind::Function,
            entity_name: String::new(),
            entity_id: None,
            operation_name: Some(name.into()),
            payload: parameters,
        }
    }

    pub fn is_bound(&self) -> bool {
        !self.entity_name.is_empty() && !self.kind.is_crud()
    }

    /// Name the host dispatches on
    pub fn operation_name(&self) -> String {
        match self.kind {
            OperationKind::Action | OperationKind::Function => {
                self.operation_name.clone().unwrap_or_default()
            }
            kind => kind.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        let kind = self.kind;

        if kind.is_crud() {
            if self.entity_name.is_empty() {
                return Err(RequestError::MissingEntityName { kind });
            }
            validate_logical_name(&self.entity_name)?;
        } else {
            let name = self.operation_name.as_deref().unwrap_or("");
            if name.trim().is_empty() {
                return Err(RequestError::MissingOperationName { kind });
            }
            if !self.entity_name.is_empty() {
                validate_logical_name(&self.entity_name)?;
            }
        }

        if matches!(kind, OperationKind::Update | OperationKind::Delete)
            && self.entity_id.is_none()
        {
            return Err(RequestError::MissingEntityId {
                kind,
                entity: self.entity_name.clone(),
            });
        }

        match kind {
            OperationKind::Create => {
                self.payload_object()?;
            }
            OperationKind::Update => {
                if self.payload_object()?.is_empty() {
                    return Err(RequestError::EmptyPayload { kind });
                }
            }
            OperationKind::Delete => {
                if !self.payload.is_null() {
                    return Err(RequestError::UnexpectedPayload { kind });
                }
            }
            OperationKind::Action => {
                if !self.payload.is_null() {
                    self.payload_object()?;
                }
            }
            OperationKind::Function => {
                if !self.payload.is_null() {
                    let parameters = self.payload_object()?;
                    if let Some((name, _)) = parameters
                        .iter()
                        .find(|(_, value)| value.is_object() || value.is_array())
                    {
                        return Err(RequestError::InvalidFunctionParameter {
                            function: self.operation_name(),
                            parameter: name.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    pub fn metadata(&self) -> RequestMetadata {
        let mut parameter_types = BTreeMap::new();
        let mut bound_parameter = None;

        if self.is_bound() {
            bound_parameter = Some("entity".to_string());
            parameter_types.insert(
                "entity".to_string(),
                ParameterType::entity(&self.entity_name),
            );
        }

        if !self.kind.is_crud() {
            if let Value::Object(parameters) = &self.payload {
                for (name, value) in parameters {
                    parameter_types.insert(name.clone(), ParameterType::infer(value));
                }
            }
        }

        RequestMetadata {
            bound_parameter,
            parameter_types,
            operation_type: self.kind.operation_type().code(),
            operation_name: self.operation_name(),
        }
    }

    fn payload_object(&self) -> Result<&Map<String, Value>, RequestError> {
        self.payload
            .as_object()
            .ok_or(RequestError::PayloadNotObject { kind: self.kind })
    }
}

fn validate_logical_name(name: &str) -> Result<(), RequestError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RequestError::InvalidEntityName(name.to_string()))
    }
}

/// One entry of an `executeMultiple` batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchItem {
    Request(ExecuteRequest),
    /// Requests applied atomically: all succeed or none do
    ChangeSet(Vec<ExecuteRequest>),
}

impl BatchItem {
    /// Number of individual requests in this entry
    pub fn request_count(&self) -> usize {
        match self {
            Self::Request(_) => 1,
            Self::ChangeSet(requests) => requests.len(),
        }
    }

    pub fn requests(&self) -> &[ExecuteRequest] {
        match self {
            Self::Request(request) => std::slice::from_ref(request),
            Self::ChangeSet(requests) => requests,
        }
    }

    /// Validate every entry of a batch; `index` in errors is the entry position
    pub fn validate_batch(items: &[BatchItem]) -> Result<(), RequestError> {
        if items.is_empty() {
            return Err(RequestError::EmptyBatch);
        }

        for (index, item) in items.iter().enumerate() {
            if let BatchItem::ChangeSet(requests) = item {
                if requests.is_empty() {
                    return Err(RequestError::EmptyChangeSet { index });
                }
                if requests.iter().any(|r| r.kind == OperationKind::Function) {
                    return Err(RequestError::FunctionInChangeSet { index });
                }
            }

            for request in item.requests() {
                request
                    .validate()
                    .map_err(|source| RequestError::InvalidBatchItem {
                        index,
                        source: Box::new(source),
                    })?;
            }
        }

        Ok(())
    }
}

impl From<ExecuteRequest> for BatchItem {
    fn from(request: ExecuteRequest) -> Self {
        Self::Request(request)
    }
}
