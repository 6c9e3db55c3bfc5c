//! OData query strings and a small HTTP client for the Dataverse Web API

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use serde_json::Value;

use crate::web_api::EntityCollection;

/// Headers sent with every GET
pub const ODATA_GET_HEADERS: &[(&str, &str)] = &[
    ("OData-MaxVersion", "4.0"),
    ("OData-Version", "4.0"),
    ("Accept", "application/json"),
    ("Content-Type", "application/json; charset=utf-8"),
    ("Prefer", "odata.include-annotations=\"*\""),
];

/// Headers sent with POST and DELETE
pub const ODATA_WRITE_HEADERS: &[(&str, &str)] = &[
    ("OData-MaxVersion", "4.0"),
    ("OData-Version", "4.0"),
    ("Accept", "application/json"),
    ("Content-Type", "application/json; charset=utf-8"),
];

/// System query options of an OData request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ODataQuery {
    pub select: Vec<String>,
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub top: Option<usize>,
}

impl ODataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        self.filter = Some(expression.into());
        self
    }

    pub fn order_by(mut self, expression: impl Into<String>) -> Self {
        self.order_by = Some(expression.into());
        self
    }

    pub fn top(mut self, count: usize) -> Self {
        self.top = Some(count);
        self
    }

    /// Render as `?$select=a,b&$top=50`; empty when no option is set
    pub fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        if !self.select.is_empty() {
            parts.push(format!("$select={}", self.select.join(",")));
        }
        if let Some(filter) = &self.filter {
            parts.push(format!("$filter={}", filter));
        }
        if let Some(order_by) = &self.order_by {
            parts.push(format!("$orderby={}", order_by));
        }
        if let Some(top) = self.top {
            parts.push(format!("$top={}", top));
        }

        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join("&"))
        }
    }

    /// Parse a query string produced by [`ODataQuery::to_query_string`] or
    /// written by hand; unknown options are ignored
    pub fn parse(query: &str) -> Result<Self> {
        let mut parsed = Self::default();
        let query = query.trim().trim_start_matches('?');

        for part in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| anyhow!("Malformed query option '{}'", part))?;

            match key {
                "$select" => {
                    parsed.select = value
                        .split(',')
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "$filter" => parsed.filter = Some(value.to_string()),
                "$orderby" => parsed.order_by = Some(value.to_string()),
                "$top" => {
                    let top = value
                        .parse()
                        .with_context(|| format!("Invalid $top value '{}'", value))?;
                    parsed.top = Some(top);
                }
                other => log::debug!("Ignoring unsupported query option '{}'", other),
            }
        }

        Ok(parsed)
    }
}

/// Build the URL of an unbound function call with aliased parameters,
/// e.g. `RetrieveEnvironmentVariableValue(DefinitionSchemaName=@p1)?@p1='ktcs_ExampleEV'`
pub fn function_url(base_url: &Url, name: &str, parameters: &[(&str, &str)]) -> Result<Url> {
    let mut signature = Vec::with_capacity(parameters.len());
    let mut aliases = Vec::with_capacity(parameters.len());

    for (index, (parameter, value)) in parameters.iter().enumerate() {
        let alias = format!("@p{}", index + 1);
        signature.push(format!("{}={}", parameter, alias));
        // OData string literals escape a quote by doubling it
        aliases.push(format!("{}='{}'", alias, value.replace('\'', "''")));
    }

    let mut relative = format!("{}({})", name, signature.join(","));
    if !aliases.is_empty() {
        relative.push('?');
        relative.push_str(&aliases.join("&"));
    }

    base_url
        .join(&relative)
        .with_context(|| format!("Failed to build URL for function '{}'", name))
}

/// HTTP client for an OData endpoint
pub struct ODataClient {
    http_client: reqwest::Client,
    base_url: Url,
}

impl ODataClient {
    /// `base_url` is the service root, e.g. `https://org.crm.dynamics.com/api/data/v9.2/`
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url =
            Url::parse(&base_url).with_context(|| format!("Invalid Web API URL '{}'", base_url))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Call an unbound function and return its JSON body
    pub async fn call_function(&self, name: &str, parameters: &[(&str, &str)]) -> Result<Value> {
        let url = function_url(&self.base_url, name, parameters)?;
        let request = with_headers(self.http_client.get(url), ODATA_GET_HEADERS)
            .build()
            .context("Failed to build Web API request")?;
        self.send_json(request)
            .await
            .with_context(|| format!("Function '{}' failed", name))
    }

    /// GET request for an entity set query, e.g. `contacts?$top=50`
    pub fn retrieve_multiple_request(
        &self,
        entity_set: &str,
        query: &ODataQuery,
    ) -> Result<reqwest::Request> {
        let url = self
            .base_url
            .join(&format!("{}{}", entity_set, query.to_query_string()))
            .with_context(|| format!("Failed to build URL for '{}'", entity_set))?;
        with_headers(self.http_client.get(url), ODATA_GET_HEADERS)
            .build()
            .context("Failed to build Web API request")
    }

    /// POST request creating `record` in `entity_set`
    pub fn create_request(&self, entity_set: &str, record: &Value) -> Result<reqwest::Request> {
        let url = self
            .base_url
            .join(entity_set)
            .with_context(|| format!("Failed to build URL for '{}'", entity_set))?;
        with_headers(self.http_client.post(url), ODATA_WRITE_HEADERS)
            .json(record)
            .build()
            .context("Failed to build Web API request")
    }

    /// Query an entity set, e.g. `contacts`
    pub async fn retrieve_multiple(
        &self,
        entity_set: &str,
        query: &ODataQuery,
    ) -> Result<EntityCollection> {
        let request = self.retrieve_multiple_request(entity_set, query)?;
        let body = self.send_json(request).await?;
        collection_from_body(entity_set, body)
    }

    /// Create a record and return the `OData-EntityId` of the new record
    pub async fn create(&self, entity_set: &str, record: &Value) -> Result<Option<String>> {
        let request = self.create_request(entity_set, record)?;
        let response = self.send(request).await?;

        Ok(response
            .headers()
            .get("OData-EntityId")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        log::debug!("{} {}", request.method(), request.url());

        let response = self
            .http_client
            .execute(request)
            .await
            .context("Failed to send request to Web API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(match status.as_u16() {
                401 => anyhow!("Not authorized to call the Web API"),
                404 => anyhow!("Web API resource not found: {}", error_text),
                429 => anyhow!("Web API rate limit reached. Please try again later"),
                _ => anyhow!("Web API request failed ({}): {}", status, error_text),
            });
        }

        Ok(response)
    }

    async fn send_json(&self, request: reqwest::Request) -> Result<Value> {
        self.send(request)
            .await?
            .json::<Value>()
            .await
            .context("Failed to parse Web API response")
    }
}

fn with_headers(
    mut request: reqwest::RequestBuilder,
    headers: &[(&str, &str)],
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    request
}

/// Read the `value` array and `@odata.nextLink` of a collection response
fn collection_from_body(entity_set: &str, body: Value) -> Result<EntityCollection> {
    let next_link = body
        .get("@odata.nextLink")
        .and_then(Value::as_str)
        .map(str::to_string);
    let entities = match body.get("value") {
        Some(Value::Array(values)) => values.clone(),
        _ => return Err(anyhow!("Response for '{}' has no value array", entity_set)),
    };

    Ok(EntityCollection {
        entities,
        next_link,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_for_contacts() {
        let query = ODataQuery::new()
            .select(["fullname", "contactid", "emailaddress1"])
            .top(50);
        assert_eq!(
            query.to_query_string(),
            "?$select=fullname,contactid,emailaddress1&$top=50"
        );
        assert_eq!(ODataQuery::new().to_query_string(), "");
    }

    #[test]
    fn test_parse_query_string() {
        let query =
            ODataQuery::parse("?$select=fullname, contactid&$top=5&$count=true&$orderby=fullname")
                .unwrap();
        assert_eq!(query.select, vec!["fullname", "contactid"]);
        assert_eq!(query.top, Some(5));
        assert_eq!(query.order_by.as_deref(), Some("fullname"));

        assert!(ODataQuery::parse("?$top=many").is_err());
        assert!(ODataQuery::parse("?$select").is_err());
        assert_eq!(ODataQuery::parse("").unwrap(), ODataQuery::default());
    }

    #[test]
    fn test_function_url_uses_parameter_aliases() {
        let base = Url::parse("https://org.crm.dynamics.com/api/data/v9.2/").unwrap();
        let url = function_url(
            &base,
            "RetrieveEnvironmentVariableValue",
            &[("DefinitionSchemaName", "ktcs_ExampleEV")],
        )
        .unwrap();

        assert!(
            url.path()
                .ends_with("/api/data/v9.2/RetrieveEnvironmentVariableValue(DefinitionSchemaName=@p1)")
        );
        assert!(url.query().unwrap().starts_with("@p1="));
        assert!(url.query().unwrap().contains("ktcs_ExampleEV"));
    }

    #[test]
    fn test_function_url_escapes_quotes() {
        let base = Url::parse("https://org.crm.dynamics.com/api/data/v9.2/").unwrap();
        let url = function_url(&base, "Echo", &[("Text", "it's")]).unwrap();
        let query = url.query().unwrap().replace("%27", "'");
        assert!(query.contains("it''s"));
    }

    #[test]
    fn test_retrieve_request_targets_entity_set() {
        let client = ODataClient::new("https://org.crm.dynamics.com/api/data/v9.2").unwrap();
        let query = ODataQuery::new()
            .select(["fullname", "contactid", "emailaddress1"])
            .top(50);
        let request = client.retrieve_multiple_request("contacts", &query).unwrap();

        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/api/data/v9.2/contacts");
        assert_eq!(
            request.url().query(),
            Some("$select=fullname,contactid,emailaddress1&$top=50")
        );
        assert_eq!(request.headers()["OData-MaxVersion"], "4.0");
        assert_eq!(request.headers()["Prefer"], "odata.include-annotations=\"*\"");
    }

    #[test]
    fn test_create_request_carries_json_record() {
        let client = ODataClient::new("https://org.crm.dynamics.com/api/data/v9.2/").unwrap();
        let record = serde_json::json!({ "name": "Fabrikam Inc.", "telephone1": "555-0100" });
        let request = client.create_request("accounts", &record).unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/api/data/v9.2/accounts");
        assert_eq!(request.headers()["OData-Version"], "4.0");
        assert!(request.headers().get("Prefer").is_none());
        assert!(
            request.headers()["Content-Type"]
                .to_str()
                .unwrap()
                .starts_with("application/json")
        );

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(serde_json::from_slice::<Value>(body).unwrap(), record);
    }

    #[test]
    fn test_collection_body_keeps_next_link() {
        let body = serde_json::json!({
            "value": [{ "fullname": "Nancy Anderson" }],
            "@odata.nextLink": "https://org.crm.dynamics.com/api/data/v9.2/contacts?$skiptoken=2"
        });
        let collection = collection_from_body("contacts", body).unwrap();
        assert_eq!(collection.entities.len(), 1);
        assert!(collection.next_link.unwrap().contains("$skiptoken=2"));

        assert!(collection_from_body("contacts", serde_json::json!({})).is_err());
    }

    #[test]
    fn test_client_normalizes_base_url() {
        let client = ODataClient::new("https://org.crm.dynamics.com/api/data/v9.2").unwrap();
        assert_eq!(
            client.base_url().as_str(),
            "https://org.crm.dynamics.com/api/data/v9.2/"
        );
        assert!(ODataClient::new("not a url").is_err());
    }
}
