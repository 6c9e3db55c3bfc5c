//! In-memory Web API host
//!
//! Stands in for the hosting runtime in demos and tests: per-entity record
//! tables, atomic change sets and registered action/function handlers.

use std::{
    cmp::Ordering as CmpOrdering,
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use pcf_types::{BatchItem, ExecuteRequest, OperationKind};

use crate::odata::ODataQuery;
use crate::web_api::{EntityCollection, WebApi, WebApiResponse};

/// Handler for an action or function, called with the request parameters
pub type OperationHandler = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

type Tables = HashMap<String, Vec<Map<String, Value>>>;

const FAILED_DEPENDENCY: u16 = 424;

pub struct InMemoryWebApi {
    tables: RwLock<Tables>,
    operations: RwLock<HashMap<String, OperationHandler>>,
    environment_variables: Arc<RwLock<HashMap<String, String>>>,
    calls: AtomicUsize,
}

impl InMemoryWebApi {
    /// Empty host with the built-in `RetrieveEnvironmentVariableValue` and
    /// `ValidateFetchXmlExpression` functions registered
    pub fn new() -> Self {
        let api = Self {
            tables: RwLock::new(HashMap::new()),
            operations: RwLock::new(HashMap::new()),
            environment_variables: Arc::new(RwLock::new(HashMap::new())),
            calls: AtomicUsize::new(0),
        };

        let variables = api.environment_variables.clone();
        api.register_operation("RetrieveEnvironmentVariableValue", move |parameters| {
            let name = parameters
                .get("DefinitionSchemaName")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("DefinitionSchemaName is required"))?;
            let variables = variables.read().unwrap_or_else(PoisonError::into_inner);
            let value = variables
                .get(name)
                .ok_or_else(|| anyhow!("Environment variable '{}' not found", name))?;
            Ok(json!({ "Value": value }))
        });

        api.register_operation("ValidateFetchXmlExpression", |parameters| {
            let fetch_xml = parameters
                .get("FetchXml")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("FetchXml is required"))?;
            let trimmed = fetch_xml.trim();
            let valid = trimmed.starts_with("<fetch")
                && trimmed.ends_with("</fetch>")
                && trimmed.contains("<entity");
            Ok(json!({ "ValidationResult": { "IsValid": valid } }))
        });

        api
    }

    /// Register or replace an action or function handler
    pub fn register_operation<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(handler));
    }

    pub fn set_environment_variable(&self, name: impl Into<String>, value: impl Into<String>) {
        self.environment_variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    /// Insert a record directly, bypassing the request path; returns its id
    pub fn seed(&self, entity_name: &str, record: Value) -> Result<Uuid> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        insert_record(&mut tables, entity_name, &record)
    }

    /// Snapshot of every record of `entity_name`
    pub fn records(&self, entity_name: &str) -> Vec<Value> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_name)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Entities that have a record table, sorted
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of host calls served (`execute`, `execute_multiple`, queries)
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn apply(&self, tables: &mut Tables, request: &ExecuteRequest) -> WebApiResponse {
        if let Err(e) = request.validate() {
            return WebApiResponse::failure(400, e.to_string());
        }

        match request.kind {
            OperationKind::Create => match insert_record(tables, &request.entity_name, &request.payload) {
                Ok(id) => WebApiResponse::success(204, json!({ "id": id })),
                Err(e) => WebApiResponse::failure(400, e.to_string()),
            },
            OperationKind::Update => {
                let Some(record) = find_record(tables, request) else {
                    return not_found(request);
                };
                if let Value::Object(changes) = &request.payload {
                    for (key, value) in changes {
                        record.insert(key.clone(), value.clone());
                    }
                }
                WebApiResponse::success(204, Value::Null)
            }
            OperationKind::Delete => {
                let key = primary_key(&request.entity_name);
                let id = request.entity_id.map(|id| id.to_string());
                let Some(rows) = tables.get_mut(&request.entity_name) else {
                    return not_found(request);
                };
                let before = rows.len();
                rows.retain(|row| row.get(&key).and_then(Value::as_str) != id.as_deref());
                if rows.len() == before {
                    not_found(request)
                } else {
                    WebApiResponse::success(204, Value::Null)
                }
            }
            OperationKind::Action | OperationKind::Function => {
                let name = request.operation_name();
                let handler = self
                    .operations
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&name)
                    .cloned();
                let Some(handler) = handler else {
                    return WebApiResponse::failure(
                        404,
                        format!("Resource not found for the segment '{}'", name),
                    );
                };
                if request.is_bound() && find_record(tables, request).is_none() {
                    return not_found(request);
                }
                match handler(&request.payload) {
                    Ok(body) => WebApiResponse::success(200, body),
                    Err(e) => WebApiResponse::failure(400, e.to_string()),
                }
            }
        }
    }

    /// Apply a change set atomically; on failure the tables are restored
    fn apply_change_set(&self, tables: &mut Tables, requests: &[ExecuteRequest]) -> Vec<WebApiResponse> {
        let snapshot = tables.clone();
        let mut responses = Vec::with_capacity(requests.len());

        for (position, request) in requests.iter().enumerate() {
            let response = self.apply(tables, request);
            if !response.ok {
                *tables = snapshot;
                log::debug!(
                    "Change set rolled back at request {} of {}",
                    position + 1,
                    requests.len()
                );

                let message = response.error_message().unwrap_or("").to_string();
                return requests
                    .iter()
                    .enumerate()
                    .map(|(i, _)| {
                        if i == position {
                            response.clone()
                        } else {
                            WebApiResponse::failure(
                                FAILED_DEPENDENCY,
                                format!("Change set rolled back: {}", message),
                            )
                        }
                    })
                    .collect();
            }
            responses.push(response);
        }

        responses
    }
}

impl Default for InMemoryWebApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebApi for InMemoryWebApi {
    async fn execute(&self, request: &ExecuteRequest) -> Result<WebApiResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Ok(self.apply(&mut tables, request))
    }

    async fn execute_multiple(&self, items: &[BatchItem]) -> Result<Vec<WebApiResponse>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut responses = Vec::new();

        // Independent requests continue after a failure
        for item in items {
            match item {
                BatchItem::Request(request) => responses.push(self.apply(&mut tables, request)),
                BatchItem::ChangeSet(requests) => {
                    responses.extend(self.apply_change_set(&mut tables, requests))
                }
            }
        }

        Ok(responses)
    }

    async fn retrieve_multiple_records(
        &self,
        entity_name: &str,
        query: &str,
    ) -> Result<EntityCollection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query = ODataQuery::parse(query)?;
        if query.filter.is_some() {
            return Err(anyhow!("$filter is not supported by the in-memory host"));
        }

        let mut rows: Vec<Map<String, Value>> = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_name)
            .cloned()
            .unwrap_or_default();

        if let Some(order_by) = &query.order_by {
            let mut parts = order_by.split_whitespace();
            let field = parts.next().unwrap_or_default().to_string();
            let descending = parts.next().is_some_and(|d| d.eq_ignore_ascii_case("desc"));
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&field), b.get(&field));
                if descending { ordering.reverse() } else { ordering }
            });
        }

        if let Some(top) = query.top {
            rows.truncate(top);
        }

        let key = primary_key(entity_name);
        let entities = rows
            .into_iter()
            .map(|row| {
                if query.select.is_empty() {
                    return Value::Object(row);
                }
                let projected = row
                    .into_iter()
                    .filter(|(field, _)| *field == key || query.select.contains(field))
                    .collect();
                Value::Object(projected)
            })
            .collect();

        Ok(EntityCollection {
            entities,
            next_link: None,
        })
    }
}

fn primary_key(entity_name: &str) -> String {
    format!("{}id", entity_name)
}

fn insert_record(tables: &mut Tables, entity_name: &str, record: &Value) -> Result<Uuid> {
    let mut row = record
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow!("Record for '{}' must be a JSON object", entity_name))?;

    let key = primary_key(entity_name);
    let id = match row.get(&key).and_then(Value::as_str) {
        Some(existing) => Uuid::parse_str(existing)
            .map_err(|_| anyhow!("'{}' is not a valid {} value", existing, key))?,
        None => Uuid::new_v4(),
    };
    row.insert(key, Value::String(id.to_string()));

    tables.entry(entity_name.to_string()).or_default().push(row);
    Ok(id)
}

fn find_record<'a>(
    tables: &'a mut Tables,
    request: &ExecuteRequest,
) -> Option<&'a mut Map<String, Value>> {
    let key = primary_key(&request.entity_name);
    let id = request.entity_id?.to_string();
    tables
        .get_mut(&request.entity_name)?
        .iter_mut()
        .find(|row| row.get(&key).and_then(Value::as_str) == Some(id.as_str()))
}

fn not_found(request: &ExecuteRequest) -> WebApiResponse {
    WebApiResponse::failure(
        404,
        format!(
            "Entity '{}' With Id = {} Does Not Exist",
            request.entity_name,
            request.entity_id.map(|id| id.to_string()).unwrap_or_default()
        ),
    )
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => CmpOrdering::Greater,
        (None, Some(_)) => CmpOrdering::Less,
        _ => CmpOrdering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> ExecuteRequest {
        ExecuteRequest::create("account", json!({ "name": name }))
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let api = InMemoryWebApi::new();

        let created = api.execute(&account("Fabrikam Inc.")).await.unwrap();
        assert!(created.ok);
        let id: Uuid = serde_json::from_value(created.body["id"].clone()).unwrap();

        let updated = api
            .execute(&ExecuteRequest::update(
                "account",
                id,
                json!({ "telephone1": "555-0100" }),
            ))
            .await
            .unwrap();
        assert!(updated.ok);
        assert_eq!(api.records("account")[0]["telephone1"], "555-0100");

        let deleted = api
            .execute(&ExecuteRequest::delete("account", id))
            .await
            .unwrap();
        assert!(deleted.ok);
        assert!(api.records("account").is_empty());

        let again = api
            .execute(&ExecuteRequest::delete("account", id))
            .await
            .unwrap();
        assert_eq!(again.status, 404);
    }

    #[tokio::test]
    async fn test_delete_from_unknown_entity_leaves_tables_alone() {
        let api = InMemoryWebApi::new();
        api.seed("account", json!({ "name": "kept" })).unwrap();

        let response = api
            .execute(&ExecuteRequest::delete("lead", Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(response.error_message().unwrap_or_default().contains("lead"));
        assert_eq!(api.entity_names(), vec!["account".to_string()]);
    }

    #[tokio::test]
    async fn test_change_set_rolls_back_on_failure() {
        let api = InMemoryWebApi::new();
        let items = vec![
            BatchItem::from(account("standalone")),
            BatchItem::ChangeSet(vec![
                account("first"),
                ExecuteRequest::delete("account", Uuid::new_v4()),
                account("third"),
            ]),
        ];

        let responses = api.execute_multiple(&items).await.unwrap();
        assert_eq!(responses.len(), 4);
        assert!(responses[0].ok);
        assert_eq!(responses[1].status, FAILED_DEPENDENCY);
        assert_eq!(responses[2].status, 404);
        assert_eq!(responses[3].status, FAILED_DEPENDENCY);

        let names: Vec<_> = api
            .records("account")
            .iter()
            .map(|r| r["name"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["standalone".to_string()]);
    }

    #[tokio::test]
    async fn test_retrieve_applies_select_order_and_top() {
        let api = InMemoryWebApi::new();
        for (name, email) in [("Carol", "c@x.com"), ("Alice", "a@x.com"), ("Bob", "b@x.com")] {
            api.seed(
                "contact",
                json!({ "fullname": name, "emailaddress1": email, "jobtitle": "Dev" }),
            )
            .unwrap();
        }

        let result = api
            .retrieve_multiple_records("contact", "?$select=fullname&$orderby=fullname&$top=2")
            .await
            .unwrap();

        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.entities[0]["fullname"], "Alice");
        assert_eq!(result.entities[1]["fullname"], "Bob");
        assert!(result.entities[0].get("jobtitle").is_none());
        assert!(result.entities[0].get("contactid").is_some());

        assert!(
            api.retrieve_multiple_records("contact", "?$filter=fullname eq 'Bob'")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_builtin_functions() {
        let api = InMemoryWebApi::new();
        api.set_environment_variable("ktcs_ExampleEV", "hello");

        let value = api
            .execute(&ExecuteRequest::function(
                "RetrieveEnvironmentVariableValue",
                json!({ "DefinitionSchemaName": "ktcs_ExampleEV" }),
            ))
            .await
            .unwrap();
        assert_eq!(value.body["Value"], "hello");

        let valid = api
            .execute(&ExecuteRequest::function(
                "ValidateFetchXmlExpression",
                json!({ "FetchXml": "<fetch top=\"50\"><entity name=\"contact\" /></fetch>" }),
            ))
            .await
            .unwrap();
        assert_eq!(valid.body["ValidationResult"]["IsValid"], true);

        let unknown = api
            .execute(&ExecuteRequest::function("WhoAmI", Value::Null))
            .await
            .unwrap();
        assert_eq!(unknown.status, 404);
        assert_eq!(api.call_count(), 3);
    }
}
