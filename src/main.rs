//! kubehealth (kh) - monitor Kubernetes resource health

use std::io::Read;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kubehealth::analyze::default_registry;
use kubehealth::cli::{exit_code, parse_resource_args, read_manifest, Cli, ResourceArg};
use kubehealth::client::{ClientOptions, ClusterClient, KubeClusterClient};
use kubehealth::config::read_targets;
use kubehealth::eval::poller::StatusPoller;
use kubehealth::eval::{Evaluator, RootTarget};
use kubehealth::object::Object;
use kubehealth::print::{PeriodicPrinter, TablePrinter};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const COMMIT: &str = match option_env!("KH_COMMIT") {
    Some(commit) => commit,
    None => "dev",
};
const BUILD_DATE: &str = match option_env!("KH_BUILD_DATE") {
    Some(date) => date,
    None => "n/a",
};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            process::exit(128);
        }
    };

    setup_tracing(cli.verbose);

    if cli.no_color {
        owo_colors::set_override(false);
    }

    if cli.version {
        println!("kubehealth {VERSION} (commit {COMMIT}, built at {BUILD_DATE})");
        return;
    }

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(128);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let options = ClientOptions {
        kubeconfig: cli.kubeconfig.clone(),
        context: cli.context.clone(),
    };
    let client = Arc::new(
        KubeClusterClient::connect(&options)
            .await
            .context("failed to connect to the cluster")?,
    );

    let targets = resolve_targets(&cli, client.as_ref()).await?;
    if targets.is_empty() {
        bail!("no resources specified");
    }

    let evaluator = Arc::new(Evaluator::new(
        Arc::clone(&client) as Arc<dyn ClusterClient>,
        default_registry(),
    ));

    let cancel = CancellationToken::new();
    let poller = StatusPoller::new(Duration::from_secs(cli.interval.max(1)), targets);
    let updates = poller.start(Arc::clone(&evaluator), cancel.clone());

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let policy = cli.wait_policy();
    let printer = TablePrinter::new(cli.print_options());
    let last = PeriodicPrinter::new(printer, std::io::stdout())
        .run(updates, |statuses| {
            if policy.should_stop(statuses) {
                cancel.cancel();
            }
        })
        .await;

    Ok(exit_code(&last))
}

/// Turn arguments, manifest inputs and the targets file into root targets.
async fn resolve_targets(cli: &Cli, client: &KubeClusterClient) -> Result<Vec<RootTarget>> {
    let namespace = cli
        .namespace
        .clone()
        .or_else(|| Some(client.default_namespace().to_string()))
        .filter(|ns| !ns.is_empty());

    let mut targets = Vec::new();

    let mut args = cli.resources.clone();
    if args.len() == 1 && args[0] == "-" {
        args.clear();
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        for obj in read_manifest(buf.as_bytes())? {
            targets.push(manifest_target(obj, namespace.as_deref()));
        }
    }

    for path in &cli.filenames {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        for obj in read_manifest(file)? {
            targets.push(manifest_target(obj, namespace.as_deref()));
        }
    }

    if let Some(path) = &cli.targets {
        let config = read_targets(client, path)?;
        for target in config.targets {
            for kind in target.kinds {
                targets.push(RootTarget::Kind {
                    kind,
                    namespace: namespace.clone(),
                });
            }
        }
    }

    for arg in parse_resource_args(&args)? {
        match arg {
            ResourceArg::Kind(resource) => {
                let kind = client
                    .resource_to_kind(&resource)
                    .with_context(|| format!("unknown resource type '{resource}'"))?;
                targets.push(RootTarget::Kind {
                    kind,
                    namespace: namespace.clone(),
                });
            }
            ResourceArg::Named(resource, name) => {
                targets.push(RootTarget::Resource {
                    resource,
                    namespace: namespace.clone(),
                    name,
                });
            }
        }
    }

    Ok(targets)
}

fn manifest_target(mut obj: Object, namespace: Option<&str>) -> RootTarget {
    if obj.meta.namespace.is_none() {
        obj.meta.namespace = namespace.map(str::to_string);
    }
    RootTarget::Object(Arc::new(obj))
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
