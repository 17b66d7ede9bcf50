use crate::aggregate::{AggregateOptions, Aggregator, ResourceFilter, ResourceKind, SourceId};
use crate::vcloud::VcdClient;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

const LIST_TOOLS: [(&str, ResourceKind, &str); 5] = [
    (
        "list_vms",
        ResourceKind::VirtualMachine,
        "List virtual machines merged from the CloudAPI and the legacy query service",
    ),
    (
        "list_tasks",
        ResourceKind::Task,
        "List tasks merged from the admin and tenant query services",
    ),
    (
        "list_events",
        ResourceKind::Event,
        "List audit events merged from the CloudAPI audit trail and the legacy query service",
    ),
    (
        "list_storage_profiles",
        ResourceKind::StorageProfile,
        "List org VDC storage profiles merged from every available source",
    ),
    (
        "list_catalogs",
        ResourceKind::Catalog,
        "List catalogs merged from every available source",
    ),
];

#[derive(Clone)]
pub struct McpServer {
    client: VcdClient,
    aggregator: Arc<Aggregator>,
    defaults: AggregateOptions,
}

impl McpServer {
    pub fn new(client: VcdClient) -> Self {
        Self::with_options(client, Aggregator::with_default_sources(), AggregateOptions::default())
    }

    pub fn with_options(client: VcdClient, aggregator: Aggregator, defaults: AggregateOptions) -> Self {
        Self {
            client,
            aggregator: Arc::new(aggregator),
            defaults,
        }
    }

    pub async fn run_stdio(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut reader = stdin.lock();
        let mut line = String::new();

        loop {
            line.clear();
            let bytes = reader.read_line(&mut line)?;
            if bytes == 0 {
                break; // EOF
            }

            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            debug!("Received: {}", input);

            match serde_json::from_str::<JsonRpcRequest>(input) {
                Ok(req) => {
                    let id = req.id.clone();
                    let resp = self.handle_request(req).await;

                    if let Some(req_id) = id {
                        let json_resp = match resp {
                            Ok(result) => JsonRpcResponse {
                                jsonrpc: "2.0".to_string(),
                                id: Some(req_id),
                                result: Some(result),
                                error: None,
                            },
                            Err(e) => JsonRpcResponse {
                                jsonrpc: "2.0".to_string(),
                                id: Some(req_id),
                                result: None,
                                error: Some(JsonRpcError {
                                    code: -32603, // Internal error
                                    message: format!("{:#}", e),
                                    data: None,
                                }),
                            },
                        };

                        let out = serde_json::to_string(&json_resp)?;
                        println!("{}", out);
                        io::stdout().flush()?;
                    } else if let Err(e) = resp {
                        error!("Error handling notification: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to parse JSON-RPC: {}", e);
                }
            }
        }
        Ok(())
    }

    pub async fn handle_request(&self, req: JsonRpcRequest) -> Result<Value> {
        match req.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": {
                    "name": "vcloud-mcp-rs",
                    "version": env!("CARGO_PKG_VERSION")
                },
                "capabilities": {
                    "tools": {},
                    "resources": {}
                }
            })),
            "notifications/initialized" => {
                info!("Client initialized");
                Ok(Value::Null)
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({
                "tools": self.get_tool_definitions()
            })),
            "tools/call" => {
                if let Some(params) = req.params {
                    let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
                    let args = params.get("arguments").unwrap_or(&Value::Null);
                    self.call_tool(name, args).await
                } else {
                    anyhow::bail!("Missing params for tools/call");
                }
            }
            "resources/list" => Ok(json!({
                "resources": self.get_resource_definitions()
            })),
            "resources/read" => {
                if let Some(params) = req.params {
                    let uri = params.get("uri").and_then(|n| n.as_str()).unwrap_or("");
                    self.handle_resource_read(uri).await
                } else {
                    anyhow::bail!("Missing params for resources/read");
                }
            }
            _ => anyhow::bail!("Method not found: {}", req.method),
        }
    }

    fn get_resource_definitions(&self) -> Vec<Value> {
        vec![json!({
            "uri": "vcloud://vms",
            "name": "List of VMs",
            "description": "A live, merged list of all virtual machines",
            "mimeType": "application/json"
        })]
    }

    fn filter_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Case-insensitive substring of the name" },
                "container": { "type": "string", "description": "Container name substring (vApp, VDC, org) or exact container id" },
                "status": { "type": "string", "description": "Exact status value (e.g. POWERED_ON)" },
                "since": { "type": "string", "description": "RFC 3339 timestamp; only records at or after it" },
                "limit": { "type": "integer", "description": "Maximum number of merged records" },
                "sources": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Sources to query, highest priority first (cloudapi, admin-query, query)"
                },
                "require_success": { "type": "boolean", "description": "Fail when no source answers (default: true)" }
            },
            "required": []
        })
    }

    fn get_tool_definitions(&self) -> Vec<Value> {
        let mut tools: Vec<Value> = LIST_TOOLS
            .iter()
            .map(|(name, _, description)| {
                json!({
                    "name": name,
                    "description": description,
                    "inputSchema": Self::filter_schema()
                })
            })
            .collect();
        tools.push(json!({
            "name": "list_sources",
            "description": "Show which backend sources are consulted for each resource kind, in priority order",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "required": []
            }
        }));
        tools
    }

    async fn handle_resource_read(&self, uri: &str) -> Result<Value> {
        match uri {
            "vcloud://vms" => {
                let result = self
                    .aggregator
                    .aggregate(
                        &self.client,
                        ResourceKind::VirtualMachine,
                        &ResourceFilter::default(),
                        &self.defaults,
                    )
                    .await?;
                let content = serde_json::to_string_pretty(&result)?;
                Ok(json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": "application/json",
                        "text": content
                    }]
                }))
            }
            _ => anyhow::bail!("Resource not found: {}", uri),
        }
    }

    pub async fn call_tool(&self, name: &str, args: &Value) -> Result<Value> {
        if let Some((_, kind, _)) = LIST_TOOLS.iter().find(|(tool, _, _)| *tool == name) {
            return self.handle_list(args, *kind).await;
        }
        match name {
            "list_sources" => self.handle_list_sources(),
            _ => anyhow::bail!("Unknown tool: {}", name),
        }
    }

    async fn handle_list(&self, args: &Value, kind: ResourceKind) -> Result<Value> {
        let filter = parse_filter(args)?;
        let options = self.options_for(args)?;

        let result = self
            .aggregator
            .aggregate(&self.client, kind, &filter, &options)
            .await?;
        Ok(
            json!({ "content": [{ "type": "text", "text": serde_json::to_string_pretty(&result)? }] }),
        )
    }

    fn handle_list_sources(&self) -> Result<Value> {
        let mut by_kind = serde_json::Map::new();
        for kind in ResourceKind::ALL {
            let ids: Vec<String> = self
                .aggregator
                .sources_for(kind)
                .iter()
                .map(|s| s.to_string())
                .collect();
            by_kind.insert(kind.to_string(), json!(ids));
        }
        Ok(
            json!({ "content": [{ "type": "text", "text": serde_json::to_string_pretty(&by_kind)? }] }),
        )
    }

    fn options_for(&self, args: &Value) -> Result<AggregateOptions> {
        let mut options = self.defaults.clone();
        match args.get("sources") {
            Some(Value::Array(items)) => {
                let ids = items
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(SourceId::from)
                            .ok_or(anyhow::anyhow!("sources must be strings"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                options.priority = Some(ids);
            }
            Some(Value::String(s)) => {
                options.priority = Some(
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(SourceId::from)
                        .collect(),
                );
            }
            Some(Value::Null) | None => {}
            Some(_) => anyhow::bail!("sources must be a list of source names"),
        }
        if let Some(require) = args.get("require_success").and_then(|v| v.as_bool()) {
            options.require_success = require;
        }
        Ok(options)
    }
}

fn parse_filter(args: &Value) -> Result<ResourceFilter> {
    let text = |key: &str| {
        args.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let since = match text("since") {
        Some(s) => Some(
            DateTime::parse_from_rfc3339(&s)
                .with_context(|| format!("Invalid 'since' timestamp: {}", s))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(ResourceFilter {
        name: text("name"),
        container: text("container"),
        status: text("status"),
        since,
        limit: args.get("limit").and_then(|v| v.as_u64()).map(|l| l as usize),
    })
}
