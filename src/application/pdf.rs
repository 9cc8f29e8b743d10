//! Bundle → rendered HTML → ephemeral registration → pool job → PDF bytes.

use std::{cell::Cell, sync::Arc, time::Duration, time::Instant as StdInstant};

use bytes::Bytes;
use lol_html::{RewriteStrSettings, element, html_content::ContentType, rewrite_str};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::domain::{
    bundle::{Bundle, BundleError, DEFAULT_ENTRY_LIMIT},
    job::{Job, RenderOptions},
};
use crate::infra::http::loopback::LoopbackUrls;

use super::assets::AssetsProvider;
use super::bundles::BundleProvider;
use super::render::{RenderError, RendererPool};
use super::store::StoreError;
use super::templating::{TemplateEngine, TemplateEngines, TemplateError, parse_model};

#[derive(Debug, Error)]
pub enum PdfError {
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("stylesheet injection failed: {message}")]
    Stylesheet { message: String },
    #[error("bundle decoding task failed: {message}")]
    Task { message: String },
}

pub struct PdfService {
    engines: TemplateEngines,
    assets: Arc<AssetsProvider>,
    bundles: Arc<BundleProvider>,
    pool: Arc<RendererPool>,
    urls: LoopbackUrls,
    render_timeout: Duration,
    entry_limit: u64,
}

impl PdfService {
    pub fn new(
        assets: Arc<AssetsProvider>,
        bundles: Arc<BundleProvider>,
        pool: Arc<RendererPool>,
        urls: LoopbackUrls,
        render_timeout: Duration,
    ) -> Self {
        Self {
            engines: TemplateEngines::new(),
            assets,
            bundles,
            pool,
            urls,
            render_timeout,
            entry_limit: DEFAULT_ENTRY_LIMIT,
        }
    }

    /// Cap the decompressed size of any single bundle entry.
    pub fn with_entry_limit(mut self, limit: u64) -> Self {
        self.entry_limit = limit;
        self
    }

    pub fn engines(&self) -> &TemplateEngines {
        &self.engines
    }

    /// Execute the bundle's templates with `model` and print the result.
    pub async fn pdf_from_bundle(
        &self,
        bundle: Bundle,
        model: &str,
        engine_key: &str,
        mut options: RenderOptions,
    ) -> Result<Bytes, PdfError> {
        let started_at = StdInstant::now();
        let mut bundle = bundle.with_entry_limit(self.entry_limit);
        bundle.test_index_file()?;

        let engine = self.engines.resolve(engine_key)?;
        let model = parse_model(model)?;
        let css = (!options.exclude_builtin_styles).then(|| self.assets.merged_css());

        let index_path = bundle
            .index_path()
            .map(str::to_string)
            .ok_or(BundleError::MissingIndex)?;
        let index_html = execute_entry(&bundle, &index_path, engine.as_ref(), &model)?;
        let index_html = match css {
            Some(css) => inject_stylesheet(&index_html, css)?,
            None => index_html,
        };
        bundle.replace(&index_path, Bytes::from(index_html))?;

        if let Some(path) = bundle.header_path().map(str::to_string) {
            let header = execute_entry(&bundle, &path, engine.as_ref(), &model)?;
            options.header_html = Some(with_stylesheet(css, header));
        }
        if let Some(path) = bundle.footer_path().map(str::to_string) {
            let footer = execute_entry(&bundle, &path, engine.as_ref(), &model)?;
            options.footer_html = Some(with_stylesheet(css, footer));
        }

        let registration = self.bundles.provide(bundle);
        let job = Job::new(
            self.urls.bundle_index(registration.id()),
            options,
            Instant::now() + self.render_timeout,
        );
        let job_id = job.id;
        let outcome = self.pool.render(job).await;
        drop(registration);

        match &outcome {
            Ok(pdf) => info!(
                target = "pressroom::pdf",
                op = "pdf_from_bundle",
                job_id = %job_id,
                engine = engine.key(),
                pdf_bytes = pdf.len(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "pdf rendered"
            ),
            Err(err) => warn!(
                target = "pressroom::pdf",
                op = "pdf_from_bundle",
                job_id = %job_id,
                engine = engine.key(),
                error = %err,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "pdf render failed"
            ),
        }

        Ok(outcome?)
    }

    /// Render a stored bundle by name with its recorded template engine.
    pub async fn pdf_from_stored(&self, name: &str, model: &str) -> Result<Bytes, PdfError> {
        let info = self.bundles.get(name).await?;
        let engine_key = info.template_engine;
        let data = info.data;
        let bundle = tokio::task::spawn_blocking(move || Bundle::read_from_zip(data))
            .await
            .map_err(|err| PdfError::Task {
                message: err.to_string(),
            })??;

        self.pdf_from_bundle(bundle, model, &engine_key, RenderOptions::default())
            .await
    }
}

fn execute_entry(
    bundle: &Bundle,
    path: &str,
    engine: &dyn TemplateEngine,
    model: &Value,
) -> Result<String, PdfError> {
    let source = bundle.resolve(path)?;
    let template = String::from_utf8_lossy(&source);
    Ok(engine.execute(&template, model)?)
}

fn with_stylesheet(css: Option<&str>, html: String) -> String {
    match css {
        Some(css) => format!("<style>{css}</style>{html}"),
        None => html,
    }
}

/// Insert `css` as the first child of `<head>`, or in front of the document when there is none.
pub fn inject_stylesheet(html: &str, css: &str) -> Result<String, PdfError> {
    let style = format!("<style>{css}</style>");
    let injected = Cell::new(false);

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("head", |el| {
                if !injected.get() {
                    el.prepend(&style, ContentType::Html);
                    injected.set(true);
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| PdfError::Stylesheet {
        message: err.to_string(),
    })?;

    if injected.get() {
        Ok(rewritten)
    } else {
        Ok(format!("{style}{rewritten}"))
    }
}
