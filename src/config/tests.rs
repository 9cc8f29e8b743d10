use super::*;

#[test]
fn defaults_resolve_to_a_runnable_service() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), DEFAULT_PUBLIC_PORT);
    assert_eq!(
        settings.server.loopback_addr,
        SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_LOOPBACK_PORT))
    );
    assert_eq!(settings.server.max_body_bytes, 32 * 1024 * 1024);
    assert!(settings.server.secret.is_none());
    assert_eq!(settings.renderer.timeout, Duration::from_secs(30));
    assert_eq!(settings.renderer.workers.get(), DEFAULT_WORKERS);
    assert_eq!(settings.renderer.queue_capacity.get(), DEFAULT_WORKERS * 4);
    assert!(settings.store.endpoint.is_none());
    assert_eq!(settings.store.region, DEFAULT_STORE_REGION);
    assert!(settings.store.secure);
    assert!(settings.assets.preload.is_empty());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.renderer.workers = Some(8);

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        renderer: RendererOverrides {
            workers: Some(2),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.renderer.workers.get(), 2);
    assert_eq!(settings.renderer.queue_capacity.get(), 8);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_workers_are_rejected() {
    let mut raw = RawSettings::default();
    raw.renderer.workers = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero workers");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "renderer.workers",
            ..
        }
    ));
}

#[test]
fn loopback_port_must_not_collide_with_public_port() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(9000);
    raw.server.loopback_port = Some(9000);

    let err = Settings::from_raw(raw).expect_err("port collision");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "server.loopback_port",
            ..
        }
    ));
}

#[test]
fn blank_secret_disables_authentication() {
    let mut raw = RawSettings::default();
    raw.server.secret = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.server.secret.is_none());
}

#[test]
fn store_endpoint_requires_bucket() {
    let mut raw = RawSettings::default();
    raw.store.endpoint = Some("minio:9000".to_string());
    raw.store.bucket = Some(String::new());

    let err = Settings::from_raw(raw).expect_err("empty bucket");
    assert!(matches!(err, LoadError::Invalid { key: "store.bucket", .. }));
}

#[test]
fn pool_config_carries_renderer_settings() {
    let mut raw = RawSettings::default();
    raw.renderer.workers = Some(3);
    raw.renderer.restart_backoff_ms = Some(50);
    let settings = Settings::from_raw(raw).expect("valid settings");

    let pool = settings
        .renderer
        .pool_config(settings.server.graceful_shutdown);
    assert_eq!(pool.workers.get(), 3);
    assert_eq!(pool.restart_backoff, Duration::from_millis(50));
    assert_eq!(pool.graceful_shutdown, Duration::from_secs(10));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["pressroom"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "pressroom",
        "serve",
        "--server-host",
        "127.0.0.1",
        "--renderer-workers",
        "4",
        "--renderer-no-sandbox",
        "true",
        "--assets-preload",
        "brand:https://cdn.example.com/brand.css",
        "--assets-preload",
        "print:/etc/pressroom/print.css",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("127.0.0.1"));
            assert_eq!(serve.overrides.renderer.workers, Some(4));
            assert_eq!(serve.overrides.renderer.no_sandbox, Some(true));
            assert_eq!(serve.overrides.assets_preload.len(), 2);
        }
    }
}
