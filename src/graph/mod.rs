//! Neo4j access over the HTTP Query API.
//!
//! Bolt-style URIs from the environment are mapped onto the server's HTTP
//! endpoint so the rest of the crate only ever talks JSON over `reqwest`.

pub mod history;
pub mod schema;
pub mod vector;

use crate::config::Neo4jCredentials;
use crate::error::{Error, Result};
use crate::http::{Auth, HttpClient};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

pub use history::ChatHistory;
pub use schema::GraphSchema;
pub use vector::{Document, VectorStore};

/// One result row: field name → value, in the order the query returned them.
pub type Record = Map<String, Value>;

#[derive(Serialize)]
struct QueryRequest<'a> {
    statement: &'a str,
    parameters: &'a Value,
}

#[derive(Deserialize)]
struct QueryResponse {
    data: Option<QueryData>,
    #[serde(default)]
    errors: Vec<QueryError>,
}

#[derive(Deserialize)]
struct QueryData {
    fields: Vec<String>,
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct QueryError {
    code: String,
    message: String,
}

#[derive(Clone)]
pub struct GraphClient {
    uri: String,
    query_url: String,
    username: String,
    password: String,
    http: HttpClient,
}

impl GraphClient {
    pub fn new(creds: &Neo4jCredentials) -> Result<Self> {
        let base = http_endpoint(&creds.uri)?;
        let query_url = format!("{base}/db/{}/query/v2", creds.database);
        let http = HttpClient::new("cinegraph/0.1.0", None, 0)?;
        Ok(Self {
            uri: creds.uri.clone(),
            query_url,
            username: creds.username.clone(),
            password: creds.password.clone(),
            http,
        })
    }

    /// The URI as configured, before HTTP mapping.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub async fn query(&self, statement: &str, params: Value) -> Result<Vec<Record>> {
        debug!(statement = statement.trim(), "running Cypher");
        let body = serde_json::to_string(&QueryRequest {
            statement,
            parameters: &params,
        })
        .map_err(|e| Error::parse(format!("serialize query: {e}")))?;

        let auth = Auth::Basic {
            username: &self.username,
            password: &self.password,
        };
        let text = match self.http.post_json_raw(&self.query_url, &body, auth).await {
            Ok(text) => text,
            Err(Error::Api {
                message,
                status_code,
                platform,
            }) => {
                return Err(graph_error_from_body(&message).unwrap_or(Error::Api {
                    platform,
                    message,
                    status_code,
                }));
            }
            Err(e) => return Err(e),
        };
        parse_records(&text)
    }

    pub async fn verify_connectivity(&self) -> Result<()> {
        self.query("RETURN 1 AS ok", json!({})).await.map(|_| ())
    }

    /// Text schema of labels, relationship types, their properties and patterns.
    pub async fn schema(&self) -> Result<GraphSchema> {
        let nodes = self.query(schema::NODE_PROPERTIES_QUERY, json!({})).await?;
        let rels = self.query(schema::REL_PROPERTIES_QUERY, json!({})).await?;
        let patterns = self.query(schema::PATTERNS_QUERY, json!({})).await?;
        Ok(GraphSchema::from_records(&nodes, &rels, &patterns))
    }
}

/// Map a `neo4j://`, `bolt://` (and `+s`/`+ssc`) or `http(s)://` URI to the HTTP base URL.
pub fn http_endpoint(uri: &str) -> Result<String> {
    let (scheme, rest) = uri
        .trim()
        .split_once("://")
        .ok_or_else(|| Error::config(format!("invalid Neo4j URI: {uri}")))?;
    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    if authority.is_empty() {
        return Err(Error::config(format!("Neo4j URI has no host: {uri}")));
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => (h, Some(p)),
        _ => (authority, None),
    };

    match scheme {
        "http" | "https" => Ok(format!("{scheme}://{authority}")),
        "neo4j" | "bolt" => Ok(format!("http://{host}:7474")),
        "neo4j+s" | "neo4j+ssc" | "bolt+s" | "bolt+ssc" => Ok(match port {
            Some(_) => format!("https://{host}:7473"),
            None => format!("https://{host}"),
        }),
        other => Err(Error::config(format!(
            "unsupported Neo4j URI scheme '{other}'"
        ))),
    }
}

fn parse_records(text: &str) -> Result<Vec<Record>> {
    let resp: QueryResponse = serde_json::from_str(text)
        .map_err(|e| Error::parse(format!("parse Neo4j response: {e}")))?;
    if let Some(err) = resp.errors.into_iter().next() {
        return Err(Error::graph(err.code, err.message));
    }
    let Some(data) = resp.data else {
        return Ok(Vec::new());
    };
    Ok(data
        .values
        .into_iter()
        .map(|row| data.fields.iter().cloned().zip(row).collect())
        .collect())
}

fn graph_error_from_body(body: &str) -> Option<Error> {
    let resp: QueryResponse = serde_json::from_str(body).ok()?;
    let err = resp.errors.into_iter().next()?;
    Some(Error::graph(err.code, err.message))
}

/// Properties of a node value, whether returned as a typed node or a plain map.
pub fn node_properties(value: &Value) -> Option<&Map<String, Value>> {
    let obj = value.as_object()?;
    match obj.get("properties") {
        Some(Value::Object(props)) if obj.contains_key("labels") => Some(props),
        _ => Some(obj),
    }
}

/// Render a JSON value the way it should read in a prompt or terminal.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".into(),
        other => other.to_string(),
    }
}
