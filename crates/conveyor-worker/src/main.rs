//! Conveyor Worker - Main entry point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use conveyor_broker::{AmqpDriver, RabbitMqConfig, RabbitMqProvider, ShutdownLoop, StaticSettings};
use conveyor_core::{ConveyorConfig, JobDescriptor, JobId, Serializer};
use conveyor_telemetry::{init_logging, LoggingConfig};
use conveyor_worker::{JobRegistry, Worker};
use std::sync::Arc;
use tracing::info;

/// Conveyor Worker - Consume and publish jobs over AMQP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "CONVEYOR_CONFIG", global = true)]
    config: Option<String>,

    /// Broker URL
    #[arg(long, env = "CONVEYOR_BROKER_URL", global = true)]
    broker_url: Option<String>,

    /// Queue to consume from
    #[arg(short, long, env = "CONVEYOR_QUEUE", global = true)]
    queue: Option<String>,

    /// Exchange to publish to ("" for the default exchange)
    #[arg(short, long, env = "CONVEYOR_EXCHANGE", global = true)]
    exchange: Option<String>,

    /// Routing key for publishing and binding
    #[arg(long, global = true)]
    routing_key: Option<String>,

    /// Payload serializer (json, msgpack)
    #[arg(long, env = "CONVEYOR_SERIALIZER", global = true)]
    serializer: Option<Serializer>,

    /// Log level
    #[arg(long, env = "CONVEYOR_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe and handle jobs until interrupted
    Listen {
        /// Worker ID (defaults to hostname@pid)
        #[arg(long, env = "CONVEYOR_WORKER_ID")]
        worker_id: Option<String>,

        /// How long each iteration waits for a delivery (0 = poll)
        #[arg(long)]
        wait_timeout_ms: Option<u64>,

        /// Stop after this many iterations
        #[arg(long)]
        max_iterations: Option<u64>,
    },

    /// Handle every pending job, then exit
    Run,

    /// Publish one job
    Push {
        /// Job name
        name: String,

        /// Job ID; integers are sent as numbers (a UUID is generated if omitted)
        #[arg(long)]
        id: Option<JobId>,

        /// Auxiliary context string
        #[arg(long)]
        meta: Option<String>,

        /// Job body as a JSON object
        #[arg(long, default_value = "{}")]
        body: String,
    },
}

fn load_config(args: &Args) -> Result<ConveyorConfig> {
    let mut config = ConveyorConfig::load(args.config.as_deref())
        .with_context(|| format!("loading configuration from {:?}", args.config))?;

    // CLI flags win over file and environment
    if let Some(url) = &args.broker_url {
        config.broker.url = url.clone();
    }
    if let Some(queue) = &args.queue {
        config.queue.name = queue.clone();
    }
    if let Some(exchange) = &args.exchange {
        config.exchange.name = exchange.clone();
    }
    if let Some(routing_key) = &args.routing_key {
        config.exchange.routing_key = routing_key.clone();
    }
    if let Some(serializer) = args.serializer {
        config.broker.serializer = serializer;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Command::Listen {
        worker_id,
        wait_timeout_ms,
        max_iterations,
    } = &args.command
    {
        if let Some(id) = worker_id {
            config.worker.id = Some(id.clone());
        }
        if let Some(ms) = wait_timeout_ms {
            config.worker.wait_timeout_ms = *ms;
        }
        if let Some(n) = max_iterations {
            config.worker.max_iterations = Some(*n);
        }
    }

    Ok(config)
}

fn build_job(name: String, id: Option<JobId>, meta: Option<String>, body: &str) -> Result<JobDescriptor> {
    let body: serde_json::Value = serde_json::from_str(body).context("parsing --body")?;
    let serde_json::Value::Object(body) = body else {
        bail!("--body must be a JSON object");
    };

    let id = id.unwrap_or_else(JobId::generate);
    let job = JobDescriptor::new(name, id).with_body(body);
    Ok(match meta {
        Some(meta) => job.with_meta(meta),
        None => job,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging(LoggingConfig::from_config(&config.logging)?)?;
    info!("Starting Conveyor Worker v{}", env!("CARGO_PKG_VERSION"));

    let run_loop = match config.worker.max_iterations {
        Some(n) => ShutdownLoop::new().with_max_iterations(n),
        None => ShutdownLoop::new(),
    };
    let provider = RabbitMqProvider::connect(RabbitMqConfig::from(&config.broker)).await?;
    let driver = AmqpDriver::from_config(
        provider,
        StaticSettings::from_config(&config),
        run_loop.clone(),
        &config,
    );

    let registry = Arc::new(JobRegistry::with_builtins());
    info!("Registered built-in job handlers: {:?}", registry.names());

    let mut worker = Worker::new(config.worker.get_id(), &config.queue.name, driver, registry);

    match args.command {
        Command::Listen { .. } => {
            let _signal = run_loop.stop_on_ctrl_c();
            worker.listen().await?;
        }
        Command::Run => {
            worker.run().await?;
        }
        Command::Push {
            name,
            id,
            meta,
            body,
        } => {
            let job = build_job(name, id, meta, &body)?;
            let message = worker.push(job).await?;
            println!("{}", message.id());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_numeric_id_is_sent_as_number() {
        let args = Args::parse_from(["conveyor-worker", "push", "ext-simple", "--id", "7"]);
        let Command::Push { name, id, meta, body } = args.command else {
            panic!("expected push");
        };

        let job = build_job(name, id, meta, &body).unwrap();
        assert_eq!(job.id(), &JobId::from(7));
        assert_eq!(
            serde_json::to_value(&job).unwrap(),
            serde_json::json!({"name": "ext-simple", "id": 7})
        );
    }

    #[test]
    fn test_push_text_id_and_body() {
        let job = build_job(
            "mail".to_string(),
            Some("a-7".parse().unwrap()),
            Some("tenant=4".to_string()),
            r#"{"to":"ops@example.com"}"#,
        )
        .unwrap();
        assert_eq!(job.id(), &JobId::from("a-7"));
        assert_eq!(job.meta(), Some("tenant=4"));
        assert!(build_job("mail".to_string(), None, None, "[1]").is_err());
    }
}
