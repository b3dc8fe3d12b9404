use crate::capture;
use crate::cli::Cli;
use crate::dns::{DnsCache, SystemResolver};
use crate::metrics::{PacketMetrics, PrometheusExporter};
use crate::options::Options;
use crate::pipeline::{PacketAnalyser, Pipeline, PipelineConfig};
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub async fn handle_command(cli: Cli) -> Result<()> {
    if cli.list_interfaces {
        return handle_list_interfaces();
    }

    let options = cli.options();
    handle_serve(options, cli.listen_address).await
}

fn handle_list_interfaces() -> Result<()> {
    let interfaces = capture::list_interfaces()?;

    println!("available interfaces:\n");
    for interface in interfaces {
        println!("{}", interface);
    }
    Ok(())
}

async fn handle_serve(options: Options, listen_address: SocketAddr) -> Result<()> {
    debug!("Running with options:\n{}", options);

    let metrics = PacketMetrics::new(&options.labels)?;
    let exporter = PrometheusExporter::new(metrics.clone(), options.clone(), listen_address);
    let listener = exporter.bind().await?;

    let dns_cache = Arc::new(DnsCache::new(SystemResolver));
    let eviction = dns_cache.start_eviction(options.dns_flush_interval)?;

    let source = match capture::open_live(&options.capture_options()) {
        Ok(source) => source,
        Err(e) => {
            eviction.stop();
            return Err(e);
        }
    };

    let mut analyser = PacketAnalyser::new(options.labels.clone(), Arc::new(metrics));
    if options.resolve_dns {
        analyser = analyser.with_dns(Arc::clone(&dns_cache));
    }
    let pipeline = Pipeline::start(
        source,
        PipelineConfig::from_options(&options),
        Arc::new(analyser),
    )?;

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(exporter.serve(listener, shutdown.clone()));

    match wait_for_signal().await {
        Ok(signal) => warn!("received exit signal {}, quitting now...", signal),
        Err(e) => error!("unable to listen for exit signals: {}", e),
    }

    let stopped = tokio::task::spawn_blocking(move || {
        pipeline.stop();
        eviction.stop();
    })
    .await;
    if let Err(e) = stopped {
        error!("shutdown task failed: {}", e);
    }

    shutdown.cancel();
    match server.await {
        Ok(result) => result?,
        Err(e) => error!("exporter task failed: {}", e),
    }

    info!("pcap exporter stopped");
    Ok(())
}

async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
    }
}
