// crates/watercli/src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use watercore::{
    CallbackSpec, FlowData, FlowGraph, FlowNode, FlowNodeType, JoberSpec,
};
use waterstream::{JoberRegistry, RuntimeConfig, WaterflowRuntime};

#[derive(Parser)]
#[command(name = "waterflow")]
#[command(about = "Waterflow Engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow definition file
    Run {
        /// Path to flow definition JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input payload as a JSON object or array of objects
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow definition file
    Validate {
        /// Path to flow definition JSON file
        file: PathBuf,
    },

    /// List available jober types
    Jobers,

    /// Create a new example flow definition
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            verbose,
        } => {
            // Initialize logging
            if verbose {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::DEBUG)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::INFO)
                    .init();
            }

            run_flow(file, input).await?;
        }

        Commands::Validate { file } => {
            validate_flow(file)?;
        }

        Commands::Jobers => {
            list_jobers();
        }

        Commands::Init { output } => {
            create_example_flow(output)?;
        }
    }

    Ok(())
}

/// Parse the --input string into a batch of payloads
fn parse_inputs(input: Option<String>) -> Result<Vec<FlowData>> {
    let Some(input) = input else {
        return Ok(vec![FlowData::new(serde_json::json!({}))]);
    };
    let json: serde_json::Value = serde_json::from_str(&input)?;
    match json {
        serde_json::Value::Array(items) => {
            let mut batch = Vec::with_capacity(items.len());
            for item in items {
                if !item.is_object() {
                    return Err(anyhow::anyhow!("Each input item must be a JSON object"));
                }
                batch.push(FlowData::new(item));
            }
            Ok(batch)
        }
        object @ serde_json::Value::Object(_) => Ok(vec![FlowData::new(object)]),
        _ => Err(anyhow::anyhow!(
            "Input must be a JSON object or an array of objects"
        )),
    }
}

async fn run_flow(file: PathBuf, input: Option<String>) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());

    let definition = std::fs::read_to_string(&file)?;
    let graph: FlowGraph = serde_json::from_str(&definition)?;

    println!("📋 Flow: {} (v{})", graph.name, graph.version);
    println!("   Nodes: {}", graph.nodes.len());
    println!("   Events: {}", graph.events().count());
    println!();

    let batch = parse_inputs(input)?;

    // Create runtime with registered jobers
    let mut registry = JoberRegistry::new();
    waterjober::register_all(&mut registry);

    let runtime =
        WaterflowRuntime::with_registry(std::sync::Arc::new(registry), RuntimeConfig::default());
    let mut callbacks = runtime.subscribe_callbacks();
    runtime.register_flow(graph.clone()).await?;

    println!("▶️  Executing with {} payload(s)...", batch.len());
    let products = runtime.execute_flow(&graph.meta_id, batch).await?;

    println!();
    println!("✅ Flow finished with {} product(s):", products.len());
    for (index, product) in products.iter().enumerate() {
        println!("--- product {} ---", index + 1);
        println!("{}", serde_json::to_string_pretty(&product.business)?);
        if let Some(message) = product.error_message() {
            println!("⚠️  error: {}", message);
        }
    }

    while let Ok(notice) = callbacks.try_recv() {
        let name = notice
            .callback
            .as_ref()
            .map(|c| c.name.as_str())
            .unwrap_or("(unnamed)");
        println!(
            "🔔 callback '{}' from node {}: {} context(s)",
            name,
            notice.node_id,
            notice.contexts.len()
        );
    }

    Ok(())
}

fn validate_flow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating: {}", file.display());

    let definition = std::fs::read_to_string(&file)?;
    let graph: FlowGraph = serde_json::from_str(&definition)?;

    match graph.validate() {
        Ok(()) => {
            println!("✅ Flow '{}' is valid", graph.name);
            println!("   Nodes: {}", graph.nodes.len());
            println!("   Events: {}", graph.events().count());
        }
        Err(error) => {
            println!("❌ Flow '{}' is invalid: {}", graph.name, error);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn list_jobers() {
    let mut registry = JoberRegistry::new();
    waterjober::register_all(&mut registry);

    println!("Available jober types:");
    let mut types = registry.list_jober_types();
    types.sort();
    for jober_type in types {
        match registry.get_metadata(&jober_type) {
            Some(metadata) => println!("  {} - {}", jober_type, metadata.description),
            None => println!("  {}", jober_type),
        }
    }
}

fn create_example_flow(output: PathBuf) -> Result<()> {
    let graph = FlowGraph::new("example_flow", "Example Flow")
        .with_node(
            FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e1", "check"),
        )
        .with_node(
            FlowNode::new("check", "check amount", FlowNodeType::Condition)
                .connect_when("e2", "double", "amount > 0")
                .connect_when("e3", "end1", "amount <= 0"),
        )
        .with_node(
            FlowNode::new("double", "double amount", FlowNodeType::State)
                .with_jober(JoberSpec::new("general.transform").with_properties(
                    serde_json::json!({ "set": { "doubled": true } }),
                ))
                .connect_to("e4", "end1"),
        )
        .with_node(
            FlowNode::new("end1", "end", FlowNodeType::End)
                .with_callback(CallbackSpec::new("notify", "channel")),
        );

    graph.validate()?;
    std::fs::write(&output, serde_json::to_string_pretty(&graph)?)?;
    println!("📝 Example flow written to {}", output.display());
    println!("   Run it with: waterflow run -f {} -i '{{\"amount\": 2}}'", output.display());

    Ok(())
}
