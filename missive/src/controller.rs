use std::{
    future::Future,
    path::Path,
    sync::{Arc, LazyLock},
};

use missive_common::{Signal, internal, logging};
use missive_delivery::{
    DeliveryConfig, DeliveryProcessor, IngestionAdapter, RetryScheduler, TransportConfig,
};
use missive_store::StoreConfig;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

/// The whole service, as described by the configuration file
#[derive(Debug, Default, Deserialize)]
pub struct Missive {
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    transport: TransportConfig,
    #[serde(default)]
    delivery: DeliveryConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r?;
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

/// Wait for `trigger`, then stop every task and wait for them to finish.
///
/// The stop signal goes out even when `trigger` fails, and the trigger's
/// error is what gets returned.
async fn stop_after<F>(
    trigger: F,
    broadcast: &broadcast::Sender<Signal>,
    tasks: Vec<JoinHandle<()>>,
) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let ret = trigger.await;

    internal!("Shutting down...");

    if broadcast.send(Signal::Shutdown).is_err() {
        tracing::debug!("No running tasks to signal");
    }

    for task in tasks {
        task.await?;
    }

    ret
}

/// Forward every non-blank line of `input` to the ingestion channel.
///
/// Returns the number of lines forwarded, stopping early if the channel
/// closes.
pub(crate) async fn forward_lines<R>(input: R, sender: mpsc::Sender<Vec<u8>>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if sender.send(line.as_bytes().to_vec()).await.is_err() {
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}

impl Missive {
    /// Parse a RON configuration
    ///
    /// Newtype variants may be written with their fields inline, and
    /// optional values without `Some`.
    ///
    /// # Errors
    /// If `source` is not a valid configuration
    pub fn from_ron(source: &str) -> anyhow::Result<Self> {
        let missive: Self = ron::Options::default()
            .with_default_extension(
                ron::extensions::Extensions::IMPLICIT_SOME
                    | ron::extensions::Extensions::UNWRAP_VARIANT_NEWTYPES,
            )
            .from_str(source)?;

        Ok(missive)
    }

    /// Read and parse the configuration file at `path`
    ///
    /// # Errors
    /// If the file cannot be read or is not a valid configuration
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {e}", path.display())
        })?;

        Self::from_ron(&source)
    }

    pub const fn store(&self) -> &StoreConfig {
        &self.store
    }

    pub const fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    pub const fn delivery(&self) -> &DeliveryConfig {
        &self.delivery
    }

    /// Run the service until SIGINT or SIGTERM
    ///
    /// Inbound messages are read from standard input, one JSON object per
    /// line. When input ends the service keeps retrying until it is told to
    /// stop.
    ///
    /// # Errors
    ///
    /// This function will return an error if the configuration is invalid,
    /// or the store or transport cannot be set up.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        self.delivery.validate()?;

        let store = self.store.into_store()?;
        let transport = self.transport.into_transport()?;
        let processor = Arc::new(DeliveryProcessor::new(store, transport));

        let scheduler = RetryScheduler::new(Arc::clone(&processor), &self.delivery);
        let adapter = IngestionAdapter::new(processor, &self.delivery);

        internal!("Controller running");

        let (sender, receiver) = mpsc::channel(self.delivery.ingest_queue_size);

        let reader = tokio::spawn(async move {
            match forward_lines(BufReader::new(tokio::io::stdin()), sender).await {
                Ok(count) => internal!(level = INFO, "Input closed after {count} messages"),
                Err(e) => tracing::error!("Unable to read input: {e}"),
            }
        });

        let ingestion = tokio::spawn({
            let shutdown = SHUTDOWN_BROADCAST.subscribe();
            async move { adapter.serve(receiver, shutdown).await }
        });

        let retries = tokio::spawn({
            let shutdown = SHUTDOWN_BROADCAST.subscribe();
            async move { scheduler.serve(shutdown).await }
        });

        let ret = stop_after(shutdown(), &SHUTDOWN_BROADCAST, vec![ingestion, retries]).await;
        reader.abort();

        ret
    }
}
