use std::sync::Arc;

use crate::application::bundles::BundleProvider;
use crate::application::pdf::PdfService;
use crate::application::render::RendererPool;

#[derive(Clone)]
pub struct ApiState {
    pub pdf: Arc<PdfService>,
    pub bundles: Arc<BundleProvider>,
    pub pool: Arc<RendererPool>,
    /// Bearer secret required on `/api/*` when set.
    pub secret: Option<Arc<str>>,
    pub max_body_bytes: usize,
}
