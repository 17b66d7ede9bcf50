#[cfg(test)]
mod tests {
    use crate::aggregate::{
        AggregateOptions, Aggregator, FailureCause, ResourceFilter, ResourceKind, SourceId,
    };
    use crate::mcp::{JsonRpcRequest, McpServer};
    use crate::vcloud::client::DEFAULT_API_VERSION;
    use crate::vcloud::VcdClient;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const VM_PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<QueryResultRecords xmlns="http://www.vmware.com/vcloud/v1.5" total="2" page="1" pageSize="128">
    <VMRecord name="web-01" status="POWERED_ON" numberOfCpus="1" containerName="shop" href="https://vcd/api/vApp/vm-1"/>
    <VMRecord name="db-01" status="POWERED_OFF" numberOfCpus="4" memoryMB="8192" containerName="shop" href="https://vcd/api/vApp/vm-2"/>
</QueryResultRecords>"#;

    const TASK_PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<QueryResultRecords total="2" page="1" pageSize="128">
    <AdminTaskRecord name="vappDeploy" status="success" objectName="shop" startDate="2024-06-01T10:00:00.000Z" href="https://vcd/api/task/t-1"/>
    <AdminTaskRecord name="vappDeploy" status="running" objectName="blog" startDate="2024-06-02T10:00:00.000Z" href="https://vcd/api/task/t-2"/>
</QueryResultRecords>"#;

    fn client_for(server: &MockServer) -> VcdClient {
        VcdClient::new(&server.uri(), None, true, DEFAULT_API_VERSION).unwrap()
    }

    fn payload(res: &Value) -> Value {
        let text = res["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    async fn mount_vm_sources(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/cloudapi/1.0.0/vms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultTotal": 1,
                "pageCount": 1,
                "page": 1,
                "pageSize": 128,
                "values": [
                    { "id": "urn:vcloud:vm:1", "name": "web-01", "status": "POWERED_ON",
                      "cpuCount": 2, "memoryMB": 4096, "vApp": { "name": "shop", "id": "urn:vcloud:vapp:9" } }
                ]
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("type", "adminVM"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Access is forbidden"))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("type", "vm"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VM_PAGE))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_list_vms_merges_and_reports() {
        let mock_server = MockServer::start().await;
        mount_vm_sources(&mock_server).await;

        let server = McpServer::new(client_for(&mock_server));
        let res = server.call_tool("list_vms", &json!({})).await.unwrap();
        let body = payload(&res);

        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "web-01");
        assert_eq!(records[0]["source"], "cloudapi");
        assert_eq!(records[0]["cpu_count"], 2);
        assert_eq!(records[0]["memory_mb"], 4096);
        assert_eq!(records[1]["name"], "db-01");
        assert_eq!(records[1]["source"], "query");
        assert_eq!(records[1]["id"], "vm-2");

        let outcomes = body["outcomes"].as_array().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0]["source"], "cloudapi");
        assert_eq!(outcomes[0]["result"], "success");
        assert_eq!(outcomes[0]["count"], 1);
        assert_eq!(outcomes[1]["source"], "admin-query");
        assert_eq!(outcomes[1]["result"], "failure");
        assert_eq!(outcomes[1]["cause"], "forbidden");
        assert_eq!(outcomes[1]["status"], 403);
        assert_eq!(outcomes[2]["source"], "query");
        assert_eq!(outcomes[2]["count"], 2);
    }

    #[tokio::test]
    async fn test_list_vms_with_status_filter_and_priority() {
        let mock_server = MockServer::start().await;
        mount_vm_sources(&mock_server).await;

        let server = McpServer::new(client_for(&mock_server));
        let args = json!({ "status": "POWERED_ON", "sources": ["query", "cloudapi"] });
        let res = server.call_tool("list_vms", &args).await.unwrap();
        let body = payload(&res);

        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "web-01");
        // the legacy source now outranks the CloudAPI copy
        assert_eq!(records[0]["source"], "query");
        assert_eq!(records[0]["cpu_count"], 1);
        assert_eq!(body["outcomes"].as_array().unwrap().len(), 2);
    }

    /// Query service double that applies the FIQL it receives the way a strict
    /// backend would: `attr==*x*` is a case-sensitive substring match, `attr==x`
    /// is exact, and a record without the attribute never matches.
    struct StrictQueryService {
        records: Vec<Vec<(&'static str, &'static str)>>,
    }

    impl StrictQueryService {
        fn keeps(filter: &str, attrs: &[(&'static str, &'static str)]) -> bool {
            filter.split(';').filter(|t| !t.is_empty()).all(|term| {
                let Some((attr, want)) = term.split_once("==") else {
                    return true;
                };
                let Some(have) = attrs.iter().find(|(k, _)| *k == attr).map(|(_, v)| *v) else {
                    return false;
                };
                match want.strip_prefix('*').and_then(|w| w.strip_suffix('*')) {
                    Some(part) => have.contains(part),
                    None => have == want,
                }
            })
        }
    }

    impl Respond for StrictQueryService {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let filter = request
                .url
                .query_pairs()
                .find(|(k, _)| k == "filter")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            let rows: Vec<String> = self
                .records
                .iter()
                .filter(|r| Self::keeps(&filter, r.as_slice()))
                .map(|r| {
                    let attrs: Vec<String> = r.iter().map(|(k, v)| format!("{}=\"{}\"", k, v)).collect();
                    format!("<VMRecord {}/>", attrs.join(" "))
                })
                .collect();
            ResponseTemplate::new(200).set_body_string(format!(
                "<QueryResultRecords total=\"{}\">{}</QueryResultRecords>",
                rows.len(),
                rows.join("")
            ))
        }
    }

    fn strict_vms() -> StrictQueryService {
        StrictQueryService {
            records: vec![
                vec![
                    ("name", "Web-01"),
                    ("status", "POWERED_ON"),
                    ("isVAppTemplate", "false"),
                    ("containerName", "shop"),
                    ("container", "https://vcd/api/vApp/vapp-11"),
                    ("href", "https://vcd/api/vApp/vm-1"),
                ],
                vec![
                    ("name", "db-01"),
                    ("status", "POWERED_OFF"),
                    ("isVAppTemplate", "false"),
                    ("containerName", "billing"),
                    ("container", "https://vcd/api/vApp/vapp-22"),
                    ("href", "https://vcd/api/vApp/vm-2"),
                ],
            ],
        }
    }

    fn query_only() -> AggregateOptions {
        AggregateOptions {
            priority: Some(vec![SourceId::from("query")]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_container_id_filter_reaches_client_side() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("type", "vm"))
            .respond_with(strict_vms())
            .expect(1)
            .mount(&mock_server)
            .await;

        let filter = ResourceFilter {
            container: Some("vapp-11".into()),
            ..Default::default()
        };
        let res = Aggregator::with_default_sources()
            .aggregate(&client_for(&mock_server), ResourceKind::VirtualMachine, &filter, &query_only())
            .await
            .unwrap();

        assert_eq!(res.records.len(), 1);
        assert_eq!(res.records[0].name.as_deref(), Some("Web-01"));
        assert_eq!(res.records[0].container_id.as_deref(), Some("vapp-11"));
        assert_eq!(res.outcomes[0].to_string(), "query: 2 records");
    }

    #[tokio::test]
    async fn test_pushdown_never_narrows_below_client_filter() {
        let mock_server = MockServer::start().await;

        // status is exact on both sides, so it is the only predicate sent
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("type", "vm"))
            .and(query_param("filter", "isVAppTemplate==false;status==POWERED_ON"))
            .respond_with(strict_vms())
            .expect(1)
            .mount(&mock_server)
            .await;

        let filter = ResourceFilter {
            name: Some("WEB".into()),
            container: Some("SHOP".into()),
            status: Some("POWERED_ON".into()),
            ..Default::default()
        };
        let res = Aggregator::with_default_sources()
            .aggregate(&client_for(&mock_server), ResourceKind::VirtualMachine, &filter, &query_only())
            .await
            .unwrap();

        assert_eq!(res.records.len(), 1);
        assert_eq!(res.records[0].name.as_deref(), Some("Web-01"));
        assert_eq!(res.records[0].container_name.as_deref(), Some("shop"));
    }

    #[tokio::test]
    async fn test_list_vms_by_container_id_over_mcp() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("type", "vm"))
            .respond_with(strict_vms())
            .mount(&mock_server)
            .await;

        let server = McpServer::new(client_for(&mock_server));
        let args = json!({ "container": "vapp-22", "sources": "query" });
        let res = server.call_tool("list_vms", &args).await.unwrap();
        let records = payload(&res)["records"].as_array().unwrap().clone();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "db-01");
        assert_eq!(records[0]["container_id"], "vapp-22");
    }

    #[tokio::test]
    async fn test_cloudapi_pagination() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/cloudapi/1.0.0/catalogs"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pageCount": 2,
                "values": [ { "id": "urn:vcloud:catalog:1", "name": "public", "org": { "name": "acme" } } ]
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/cloudapi/1.0.0/catalogs"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pageCount": 2,
                "values": [ { "id": "urn:vcloud:catalog:2", "name": "private", "org": { "name": "acme" } } ]
            })))
            .mount(&mock_server)
            .await;

        let options = AggregateOptions {
            priority: Some(vec![SourceId::from("cloudapi")]),
            ..Default::default()
        };
        let res = Aggregator::with_default_sources()
            .aggregate(
                &client_for(&mock_server),
                ResourceKind::Catalog,
                &ResourceFilter::default(),
                &options,
            )
            .await
            .unwrap();

        let names: Vec<_> = res.records.iter().map(|r| r.name.as_deref().unwrap()).collect();
        assert_eq!(names, vec!["public", "private"]);
        assert!(res.outcomes[0].is_success());
    }

    #[tokio::test]
    async fn test_cloudapi_page_cap_keeps_partial_result() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/cloudapi/1.0.0/catalogs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pageCount": 60,
                "values": [ { "name": "public", "org": { "name": "acme" } } ]
            })))
            .expect(50)
            .mount(&mock_server)
            .await;

        let options = AggregateOptions {
            priority: Some(vec![SourceId::from("cloudapi")]),
            ..Default::default()
        };
        let res = Aggregator::with_default_sources()
            .aggregate(
                &client_for(&mock_server),
                ResourceKind::Catalog,
                &ResourceFilter::default(),
                &options,
            )
            .await
            .unwrap();

        assert_eq!(res.outcomes[0].to_string(), "cloudapi: 50 records");
        assert_eq!(res.records.len(), 1);
    }

    #[tokio::test]
    async fn test_list_vms_limit_argument() {
        let mock_server = MockServer::start().await;
        mount_vm_sources(&mock_server).await;

        let server = McpServer::new(client_for(&mock_server));
        let res = server.call_tool("list_vms", &json!({ "limit": 1 })).await.unwrap();
        let body = payload(&res);

        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "web-01");
        assert_eq!(body["outcomes"][2]["count"], 2);
    }

    #[tokio::test]
    async fn test_list_tasks_skips_cloudapi_and_dedupes_by_id() {
        let mock_server = MockServer::start().await;

        for query_type in ["adminTask", "task"] {
            Mock::given(method("GET"))
                .and(path("/api/query"))
                .and(query_param("type", query_type))
                .respond_with(ResponseTemplate::new(200).set_body_string(TASK_PAGE))
                .mount(&mock_server)
                .await;
        }

        let server = McpServer::new(client_for(&mock_server));
        let res = server.call_tool("list_tasks", &json!({ "container": "shop" })).await.unwrap();
        let body = payload(&res);

        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], "t-1");
        assert_eq!(records[0]["source"], "admin-query");

        let outcomes = body["outcomes"].as_array().unwrap();
        let sources: Vec<_> = outcomes.iter().map(|o| o["source"].as_str().unwrap()).collect();
        assert_eq!(sources, vec!["admin-query", "query"]);
    }

    #[tokio::test]
    async fn test_garbage_body_is_a_decode_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let options = AggregateOptions {
            priority: Some(vec![SourceId::from("admin-query"), SourceId::from("query")]),
            require_success: false,
            ..Default::default()
        };
        let res = Aggregator::with_default_sources()
            .aggregate(
                &client_for(&mock_server),
                ResourceKind::StorageProfile,
                &ResourceFilter::default(),
                &options,
            )
            .await
            .unwrap();
        assert!(res.records.is_empty());
        assert!(res
            .outcomes
            .iter()
            .all(|o| o.failure().map(|f| f.cause) == Some(FailureCause::Decode)));
    }

    #[tokio::test]
    async fn test_all_sources_down_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let server = McpServer::new(client_for(&mock_server));
        let err = server.call_tool("list_catalogs", &json!({})).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("No source produced a result for catalog"));
        assert!(msg.contains("unavailable (503)"));

        let res = server
            .call_tool("list_catalogs", &json!({ "require_success": false }))
            .await
            .unwrap();
        assert_eq!(payload(&res)["outcomes"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_login_sets_bearer_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/cloudapi/1.0.0/sessions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-vmware-vcloud-access-token", "tok-123")
                    .set_body_json(json!({ "id": "urn:vcloud:session:1" })),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/cloudapi/1.0.0/vms"))
            .and(header("Authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pageCount": 1, "values": [] })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut client = client_for(&mock_server);
        client.login("acme", "ops", "secret").await.unwrap();

        let options = AggregateOptions {
            priority: Some(vec![SourceId::from("cloudapi")]),
            ..Default::default()
        };
        let res = Aggregator::with_default_sources()
            .aggregate(&client, ResourceKind::VirtualMachine, &ResourceFilter::default(), &options)
            .await
            .unwrap();
        assert!(res.records.is_empty());
        assert!(res.outcomes[0].is_success());
    }

    #[tokio::test]
    async fn test_protocol_surface() {
        let mock_server = MockServer::start().await;
        mount_vm_sources(&mock_server).await;
        let server = McpServer::new(client_for(&mock_server));

        let req = |method: &str, params: Option<Value>| JsonRpcRequest {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: Some(json!(1)),
        };

        let tools = server.handle_request(req("tools/list", None)).await.unwrap();
        let names: Vec<_> = tools["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"list_vms".to_string()));
        assert!(names.contains(&"list_sources".to_string()));

        let sources = server
            .handle_request(req("tools/call", Some(json!({ "name": "list_sources", "arguments": {} }))))
            .await
            .unwrap();
        let by_kind = payload(&sources);
        assert_eq!(by_kind["task"], json!(["admin-query", "query"]));
        assert_eq!(by_kind["virtual_machine"], json!(["cloudapi", "admin-query", "query"]));

        let read = server
            .handle_request(req("resources/read", Some(json!({ "uri": "vcloud://vms" }))))
            .await
            .unwrap();
        let text = read["contents"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["records"].as_array().unwrap().len(), 2);

        assert!(server.call_tool("reboot_everything", &json!({})).await.is_err());
    }
}
