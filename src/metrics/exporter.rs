use crate::metrics::collector::PacketMetrics;
use crate::options::Options;
use crate::{ExporterError, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const INDEX_HTML: &str = "<html>
	<head>
		<title>PCAP Exporter</title>
	</head>
	<body>
		<h1>PCAP Exporter</h1>
		<p>
			<a href='/metrics'>Metrics</a>
		</p>
		<p>
			<a href='/options'>Options</a>
		</p>
	</body>
</html>";

struct ExporterState {
    metrics: PacketMetrics,
    options: Options,
}

pub struct PrometheusExporter {
    state: Arc<ExporterState>,
    address: SocketAddr,
}

impl PrometheusExporter {
    pub fn new(metrics: PacketMetrics, options: Options, address: SocketAddr) -> Self {
        Self {
            state: Arc::new(ExporterState { metrics, options }),
            address,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/metrics", get(metrics_handler))
            .route("/options", get(options_handler))
            .route("/options.json", get(options_json_handler))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http())
    }

    /// Binds the listener. Failing to bind is fatal to startup.
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.address)
            .await
            .map_err(|source| ExporterError::Bind {
                address: self.address,
                source,
            })
    }

    /// Serves until `shutdown` is cancelled.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let address = listener.local_addr()?;
        info!("started exporter at {}", address);
        info!("metrics are available at http://{}/metrics", address);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("stopped exporter");
        Ok(())
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn metrics_handler(State(state): State<Arc<ExporterState>>) -> impl IntoResponse {
    let gathered = tokio::task::spawn_blocking(move || state.metrics.gather_text()).await;

    match gathered {
        Ok(Ok(body)) => (StatusCode::OK, body),
        Ok(Err(e)) => {
            error!("failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {e}"),
            )
        }
        Err(e) => {
            error!("metrics gathering task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to gather metrics".to_string(),
            )
        }
    }
}

async fn options_handler(State(state): State<Arc<ExporterState>>) -> Html<String> {
    Html(state.options.to_html())
}

async fn options_json_handler(State(state): State<Arc<ExporterState>>) -> Json<Options> {
    Json(state.options.clone())
}
