use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser};
use log::{error, info};
use std::process;
use vcloud_mcp_rs::aggregate::{AggregateOptions, Aggregator, ResourceFilter, ResourceKind, SourceId};
use vcloud_mcp_rs::cli::{Args, Commands};
use vcloud_mcp_rs::logging;
use vcloud_mcp_rs::mcp::McpServer;
use vcloud_mcp_rs::settings::Settings;
use vcloud_mcp_rs::vcloud::client::DEFAULT_API_VERSION;
use vcloud_mcp_rs::vcloud::VcdClient;

fn merge_args(settings: &mut Settings, args: &Args) {
    if let Some(host) = &args.host {
        settings.host = Some(host.clone());
    }
    if let Some(port) = args.port {
        settings.port = Some(port);
    }
    if let Some(org) = &args.org {
        settings.org = Some(org.clone());
    }
    if let Some(user) = &args.user {
        settings.user = Some(user.clone());
    }
    if let Some(password) = &args.password {
        settings.password = Some(password.clone());
    }
    if let Some(token) = &args.api_token {
        settings.api_token = Some(token.clone());
    }
    if let Some(version) = &args.api_version {
        settings.api_version = Some(version.clone());
    }
    // A false CLI flag keeps whatever the config file said.
    if args.no_verify_ssl {
        settings.no_verify_ssl = Some(true);
    }
    if let Some(sources) = &args.sources {
        settings.sources = Some(sources.clone());
    }
    if let Some(secs) = args.source_timeout_secs {
        settings.source_timeout_secs = Some(secs);
    }
    if let Some(scope) = &args.identity_scope {
        settings.identity_scope = Some(scope.clone());
    }
    if args.sequential {
        settings.concurrent = Some(false);
    }
    if args.lenient {
        settings.require_success = Some(false);
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<VcdClient> {
    let host = settings
        .host
        .as_deref()
        .ok_or(anyhow::anyhow!("Host is required"))?;
    let api_version = settings.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION);
    let verify_ssl = !settings.no_verify_ssl.unwrap_or(false);

    info!("Connecting to vCloud Director at {}", host);
    let mut client = VcdClient::new(host, settings.port, verify_ssl, api_version)?;

    if let Some(token) = settings.api_token.as_deref().filter(|t| !t.is_empty()) {
        info!("Using API token authentication");
        client.set_api_token(token);
    } else if let (Some(org), Some(user), Some(password)) =
        (&settings.org, &settings.user, &settings.password)
    {
        client.login(org, user, password).await?;
    } else {
        anyhow::bail!("No authentication method provided");
    }
    Ok(client)
}

async fn run_query(
    client: &VcdClient,
    options: &AggregateOptions,
    kind: &str,
    filter: ResourceFilter,
) -> anyhow::Result<()> {
    let kind: ResourceKind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let result = Aggregator::with_default_sources()
        .aggregate(client, kind, &filter, options)
        .await?;
    for failed in result.failed_sources() {
        error!("{}", failed);
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Some(Commands::Completions { shell }) = &args.command {
        let mut cmd = Args::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    let _guard = match logging::init(&args) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    let mut settings = match Settings::new(args.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    merge_args(&mut settings, &args);

    if let Err(e) = settings.validate() {
        error!("Configuration error: {}", e);
        process::exit(1);
    }
    let options = match settings.aggregate_options() {
        Ok(o) => o,
        Err(e) => {
            error!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    if let Some(ids) = &options.priority {
        let known = Aggregator::with_default_sources().source_ids();
        if let Some(unknown) = ids.iter().find(|id| !known.contains(id)) {
            error!(
                "Configuration error: unknown source '{}' (known: {})",
                unknown,
                known.iter().map(SourceId::to_string).collect::<Vec<_>>().join(", ")
            );
            process::exit(1);
        }
    }

    let client = match connect(&settings).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to connect: {:#}", e);
            process::exit(1);
        }
    };

    if let Some(Commands::Query {
        kind,
        name,
        container,
        status,
        since,
        limit,
    }) = args.command
    {
        let since = match since.as_deref().map(DateTime::parse_from_rfc3339).transpose() {
            Ok(s) => s.map(|dt| dt.with_timezone(&Utc)),
            Err(e) => {
                error!("Invalid --since timestamp: {}", e);
                process::exit(1);
            }
        };
        let filter = ResourceFilter {
            name,
            container,
            status,
            since,
            limit,
        };
        if let Err(e) = run_query(&client, &options, &kind, filter).await {
            error!("Query failed: {:#}", e);
            process::exit(1);
        }
        return;
    }

    let mut server = McpServer::with_options(client, Aggregator::with_default_sources(), options);

    info!("Starting MCP Server (stdio transport)...");
    if let Err(e) = server.run_stdio().await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}
