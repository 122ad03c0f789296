use std::env;
use std::fs;
use std::process;

use anyhow::{Context, Result};
use netconf_session::rpc::{OperationRequest, RpcBuilder};
use netconf_session::schema::discover_schemas;
use netconf_session::session::{
    DeviceEndpoint, Dispatcher, LockPolicy, OperationResult, SessionIdentity, SessionRegistry,
};
use netconf_session::xml::NamespacePolicy;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Batch {
    user: String,
    device: DeviceEndpoint,
    #[serde(default)]
    lock_policy: LockPolicy,
    operations: Vec<OperationRequest>,
}

fn print_usage() {
    eprintln!(
        "Usage: cargo run --example run_batch -- <batch.json> [--dry-run] [--prefixes] [--schemas]"
    );
}

fn print_results(results: &[OperationResult]) {
    for (idx, result) in results.iter().enumerate() {
        println!("[{idx}] {} {:?}", result.operation, result.status);
        println!("{}", result.text);
    }
}

fn print_plan(batch: &Batch, builder: &RpcBuilder) -> Result<()> {
    println!(
        "dry-run device={} operations={}",
        batch.device.name,
        batch.operations.len()
    );
    for (idx, request) in batch.operations.iter().enumerate() {
        let rpc = builder
            .render(request, 101 + idx as u64)
            .with_context(|| format!("operation {idx} ({})", request.kind()))?;
        println!("[{idx}] {}\n{rpc}", request.kind());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(2);
    }

    let path = &args[1];
    let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let batch: Batch = serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;

    let policy = if args.iter().any(|arg| arg == "--prefixes") {
        NamespacePolicy::Always
    } else {
        NamespacePolicy::Minimal
    };
    let builder = RpcBuilder::new(policy);

    if args.iter().any(|arg| arg == "--dry-run") {
        return print_plan(&batch, &builder);
    }

    let registry = SessionRegistry::default().with_builder(builder);
    let identity = SessionIdentity::new(batch.user.clone(), batch.device.name.clone());
    let session = registry
        .connect(&identity, &batch.device)
        .await
        .with_context(|| format!("connecting to {}", batch.device.name))?;

    let capabilities = session.capabilities().await;
    println!(
        "connected session-id={:?} write datastores={:?}",
        session.session_id().await,
        capabilities.write_datastores()
    );

    if args.iter().any(|arg| arg == "--schemas") {
        let list = discover_schemas(&session).await?;
        println!("schemas via {:?}:", list.source);
        for schema in &list.schemas {
            println!("  {}@{}", schema.name, schema.revision);
        }
    }

    let results = Dispatcher::new(batch.lock_policy)
        .dispatch(&session, &batch.operations)
        .await?;
    print_results(&results);

    println!("--- session log ---\n{}", session.log().drain_text());
    registry.shutdown().await;
    Ok(())
}
