use std::{process, sync::Arc};

use pressroom::{
    application::{
        bundles::BundleProvider, error::AppError, pdf::PdfService, render::RendererPool,
        store::Store,
    },
    config,
    infra::{
        assets,
        chrome::{ChromeLauncher, ChromeOptions},
        error::InfraError,
        http::{self, ApiState, LoopbackState, LoopbackUrls},
        store::S3Store,
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error_chain(error);
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut messages = vec![error.to_string()];
    let mut current = error.source();
    while let Some(inner) = current {
        messages.push(inner.to_string());
        current = inner.source();
    }
    messages.join(": ")
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let assets = Arc::new(assets::load(&settings.assets.preload).await);
    let bundles = Arc::new(BundleProvider::new(connect_store(&settings.store).await?));

    let loopback_listener = http::bind(settings.server.loopback_addr).await?;
    let public_listener = http::bind(settings.server.public_addr).await?;
    let loopback_addr = loopback_listener.local_addr().map_err(InfraError::from)?;
    let urls = LoopbackUrls::new(loopback_addr)
        .map_err(|err| AppError::unexpected(format!("invalid loopback address: {err}")))?;

    let launcher = Arc::new(ChromeLauncher::new(ChromeOptions {
        executable: settings.renderer.chrome_path.clone(),
        no_sandbox: settings.renderer.no_sandbox,
    }));
    let pool = Arc::new(
        RendererPool::start(
            settings
                .renderer
                .pool_config(settings.server.graceful_shutdown),
            launcher,
        )
        .await?,
    );

    let pdf = Arc::new(PdfService::new(
        assets.clone(),
        bundles.clone(),
        pool.clone(),
        urls,
        settings.renderer.timeout,
    )
    .with_entry_limit(u64::try_from(settings.server.max_body_bytes).unwrap_or(u64::MAX)));
    let api_state = ApiState {
        pdf,
        bundles: bundles.clone(),
        pool: pool.clone(),
        secret: settings.server.secret.as_deref().map(Arc::from),
        max_body_bytes: settings.server.max_body_bytes,
    };

    info!(
        target = "pressroom::startup",
        workers = settings.renderer.workers.get(),
        timeout_ms = settings.renderer.timeout.as_millis() as u64,
        store = bundles.has_store(),
        auth = api_state.secret.is_some(),
        assets = assets.keys().count(),
        "pressroom ready"
    );

    // The bridge outlives the public listener so draining renders can still load their pages.
    let (loopback_stop, loopback_stopped) = watch::channel(false);
    let loopback_router = http::build_loopback_router(LoopbackState { bundles, assets });
    let loopback_task = tokio::spawn(http::serve(
        "loopback",
        loopback_listener,
        loopback_router,
        wait_for_stop(loopback_stopped),
    ));

    let public_result = http::serve(
        "public",
        public_listener,
        http::build_api_router(api_state),
        shutdown_signal(),
    )
    .await;

    pool.close().await;
    let _ = loopback_stop.send(true);
    let loopback_result = loopback_task
        .await
        .map_err(|err| AppError::unexpected(format!("loopback server task failed: {err}")))?;

    public_result?;
    loopback_result?;
    info!(target = "pressroom::shutdown", "shutdown complete");
    Ok(())
}

async fn connect_store(settings: &config::StoreSettings) -> Result<Option<Arc<dyn Store>>, AppError> {
    let Some(endpoint) = settings.endpoint.as_deref() else {
        info!(
            target = "pressroom::startup",
            "no store endpoint configured; stored bundles are disabled"
        );
        return Ok(None);
    };

    let store = S3Store::connect(settings, endpoint).await?;
    info!(
        target = "pressroom::startup",
        endpoint,
        bucket = %settings.bucket,
        "bundle store connected"
    );
    Ok(Some(Arc::new(store)))
}

async fn wait_for_stop(mut stopped: watch::Receiver<bool>) {
    let _ = stopped.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(
                target = "pressroom::shutdown",
                error = %err,
                "failed to listen for ctrl-c"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(
                    target = "pressroom::shutdown",
                    error = %err,
                    "failed to listen for SIGTERM"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(
        target = "pressroom::shutdown",
        "shutdown signal received; draining"
    );
}
