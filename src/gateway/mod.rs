use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

/// One request to the query backend: either a named remote procedure with
/// typed parameters, or a raw query string against the same data surface.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Rpc {
        name: String,
        params: BTreeMap<String, Value>,
    },
    Query {
        sql: String,
    },
}

impl GatewayCall {
    pub fn rpc(name: impl Into<String>, params: BTreeMap<String, Value>) -> Self {
        GatewayCall::Rpc {
            name: name.into(),
            params,
        }
    }

    pub fn query(sql: impl Into<String>) -> Self {
        GatewayCall::Query { sql: sql.into() }
    }

    /// The routing key: RPC name or the query text.
    pub fn key(&self) -> &str {
        match self {
            GatewayCall::Rpc { name, .. } => name,
            GatewayCall::Query { sql } => sql,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayError {
    pub message: String,
}

/// The gateway wire contract. Any non-null `error` or null `rows` is
/// treated as a tier failure by the fallback controller.
#[derive(Debug, Clone, Default)]
pub struct GatewayResponse {
    pub rows: Option<Vec<Value>>,
    pub error: Option<GatewayError>,
}

impl GatewayResponse {
    pub fn ok(rows: Vec<Value>) -> Self {
        Self {
            rows: Some(rows),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            rows: None,
            error: Some(GatewayError {
                message: message.into(),
            }),
        }
    }

    /// Collapse the response into usable rows or a gateway error.
    pub fn into_rows(self) -> Result<Vec<Value>> {
        if let Some(e) = self.error {
            return Err(Error::Gateway(e.message));
        }
        self.rows
            .ok_or_else(|| Error::Gateway("gateway returned no rows and no error".into()))
    }
}

/// Executes calls against the backing store. Implementations may fail
/// transiently or lack a capability entirely; the fallback controller owns
/// recovery. Timeout policy also lives in the implementation.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn invoke(&self, call: &GatewayCall) -> GatewayResponse;
}

/// A gateway serving canned rows from an in-memory map keyed by RPC name or
/// query text. Backs the CLI and integration-style tests; a key with no
/// entry fails the call, which exercises the fallback path end to end.
#[derive(Debug, Clone, Default)]
pub struct FixtureGateway {
    tables: HashMap<String, Vec<Value>>,
}

impl FixtureGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load fixtures from a JSON file shaped `{ "rpc_or_query_key": [rows] }`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let parsed: HashMap<String, Vec<Value>> = serde_json::from_str(&text)?;
        Ok(Self { tables: parsed })
    }

    pub fn with_rows(mut self, key: impl Into<String>, rows: Vec<Value>) -> Self {
        self.tables.insert(key.into(), rows);
        self
    }
}

#[async_trait]
impl Gateway for FixtureGateway {
    async fn invoke(&self, call: &GatewayCall) -> GatewayResponse {
        match self.tables.get(call.key()) {
            Some(rows) => GatewayResponse::ok(rows.clone()),
            None => GatewayResponse::err(format!("no fixture for {}", call.key())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fixture_gateway_hit_and_miss() {
        let gw = FixtureGateway::new().with_rows(
            "leads_by_period",
            vec![json!({"period_date": "2024-01-07", "lead_count": 5})],
        );

        let hit = gw
            .invoke(&GatewayCall::rpc("leads_by_period", BTreeMap::new()))
            .await;
        assert!(hit.error.is_none());
        assert_eq!(hit.rows.unwrap().len(), 1);

        let miss = gw
            .invoke(&GatewayCall::rpc("unknown_proc", BTreeMap::new()))
            .await;
        assert!(miss.error.is_some());
        assert!(miss.rows.is_none());
    }

    #[tokio::test]
    async fn test_fixture_gateway_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"arr_by_period": [{{"period_date": "2024-01-01", "arr_amount": "1200"}}]}}"#
        )
        .unwrap();

        let gw = FixtureGateway::from_file(file.path()).unwrap();
        let resp = gw
            .invoke(&GatewayCall::rpc("arr_by_period", BTreeMap::new()))
            .await;
        assert_eq!(resp.rows.unwrap().len(), 1);
    }

    #[test]
    fn test_into_rows_error_paths() {
        assert!(GatewayResponse::err("backend down").into_rows().is_err());
        assert!(GatewayResponse::default().into_rows().is_err());
        assert_eq!(GatewayResponse::ok(vec![]).into_rows().unwrap().len(), 0);
    }
}
