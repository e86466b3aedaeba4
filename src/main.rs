// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use clusterzone::{
    authority::{
        cloud_dns::{CloudDnsAuthority, CloudDnsConfig, Credentials},
        memory::InMemoryAuthority,
        DnsAuthority,
    },
    cluster::{watch_cluster_changes, KubeClusterObserver},
    config::{Backend, Config},
    constants::{LOCAL_NETWORK_SCOPE, TOKIO_WORKER_THREADS},
    metadata::{MetadataClient, NetworkScopeResolver, StaticNetworkScope},
    metrics_server,
    reconciler::{retry::failure_backoff, scheduler, Reconciler},
};
use kube::Client;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    let config = Config::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("clusterzone")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<()> {
    // Initialize logging with custom format
    // Format: timestamp file:line LEVEL message
    //
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Respects RUST_LOG_FORMAT environment variable for output format (json or text)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!(
        zone = %config.zone_name,
        backend = ?config.backend,
        watch = config.watch_enabled(),
        "Starting clusterzone"
    );
    config.validate().context("invalid configuration")?;

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("A rustls crypto provider was already installed");
    }

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let Some((authority, scope)) = build_backend(&config).await? else {
        info!("Shutdown requested before the DNS backend was ready");
        return Ok(());
    };
    let observer = Arc::new(KubeClusterObserver::new(client.clone()));
    let reconciler = Arc::new(Reconciler::new(
        config.reconcile_settings(),
        authority,
        observer,
        scope,
    ));

    // Dropping the sender stops the metrics server
    let (stop_metrics, mut metrics_stopped) = watch::channel(());
    let mut metrics_task = tokio::spawn(metrics_server::serve(
        config.metrics_bind_address,
        reconciler.subscribe(),
        async move {
            let _ = metrics_stopped.changed().await;
        },
    ));

    let trigger = Arc::new(Notify::new());
    let watcher = config
        .watch_enabled()
        .then(|| tokio::spawn(watch_cluster_changes(client.clone(), trigger.clone())));

    info!("Starting reconciliation loop");
    tokio::select! {
        () = scheduler::run(reconciler, trigger, shutdown_signal()) => {
            info!("Reconciliation loop stopped");
        }
        result = &mut metrics_task => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result??;
            anyhow::bail!("metrics server exited unexpectedly without error");
        }
    }

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    drop(stop_metrics);
    metrics_task.await??;

    info!("clusterzone stopped");
    Ok(())
}

type Backends = (Arc<dyn DnsAuthority>, Arc<dyn NetworkScopeResolver>);

/// Select the DNS backend and the network scope resolver.
///
/// Returns `None` if shutdown was requested while waiting for instance metadata.
async fn build_backend(config: &Config) -> Result<Option<Backends>> {
    match config.backend {
        Backend::Memory => {
            warn!("Using the in-memory DNS backend, records are not published outside this process");
            let scope = config
                .network_scope
                .clone()
                .unwrap_or_else(|| LOCAL_NETWORK_SCOPE.to_string());
            let authority: Arc<dyn DnsAuthority> = Arc::new(InMemoryAuthority::new());
            let scope: Arc<dyn NetworkScopeResolver> = Arc::new(StaticNetworkScope(scope));
            Ok(Some((authority, scope)))
        }
        Backend::CloudDns => {
            let metadata = MetadataClient::new(&config.metadata_endpoint)?;

            let project = match &config.project {
                Some(project) => project.clone(),
                None => {
                    let backoff = failure_backoff(config.retry_initial, config.retry_max);
                    tokio::select! {
                        project = metadata.wait_for_project_id(backoff) => project,
                        () = shutdown_signal() => return Ok(None),
                    }
                }
            };

            let credentials = match &config.access_token {
                Some(token) => Credentials::Static(token.clone()),
                None => Credentials::Metadata(metadata.clone()),
            };

            let scope: Arc<dyn NetworkScopeResolver> = match &config.network_scope {
                Some(scope) => Arc::new(StaticNetworkScope(scope.clone())),
                None => Arc::new(metadata),
            };

            let authority: Arc<dyn DnsAuthority> =
                Arc::new(CloudDnsAuthority::new(CloudDnsConfig::new(
                    config.dns_endpoint.clone(),
                    project.clone(),
                    credentials,
                ))?);
            info!(project = %project, endpoint = %config.dns_endpoint, "Using Cloud DNS backend");

            Ok(Some((authority, scope)))
        }
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
