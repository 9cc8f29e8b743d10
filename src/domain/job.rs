use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// One unit of work for the renderer pool: print the page behind `url`.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub url: String,
    pub options: RenderOptions,
    pub deadline: Instant,
}

impl Job {
    pub fn new(url: impl Into<String>, options: RenderOptions, deadline: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            options,
            deadline,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperFormat {
    #[default]
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl PaperFormat {
    /// Width and height in millimetres, portrait orientation.
    pub fn size_mm(self) -> (f64, f64) {
        match self {
            PaperFormat::A3 => (297.0, 420.0),
            PaperFormat::A4 => (210.0, 297.0),
            PaperFormat::A5 => (148.0, 210.0),
            PaperFormat::Letter => (215.9, 279.4),
            PaperFormat::Legal => (215.9, 355.6),
            PaperFormat::Tabloid => (279.4, 431.8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 10.0,
            right: 10.0,
            bottom: 10.0,
            left: 10.0,
        }
    }
}

/// Page setup for one render. Lengths are millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    pub paper_format: PaperFormat,
    /// Explicit page size; wins over `paper_format` when present.
    pub paper_size: Option<PaperSize>,
    pub landscape: bool,
    pub margins: Margins,
    pub print_background: bool,
    pub prefer_css_page_size: bool,
    pub scale: f64,
    pub exclude_builtin_styles: bool,
    #[serde(skip_deserializing)]
    pub header_html: Option<String>,
    #[serde(skip_deserializing)]
    pub footer_html: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            paper_format: PaperFormat::default(),
            paper_size: None,
            landscape: false,
            margins: Margins::default(),
            print_background: true,
            prefer_css_page_size: false,
            scale: 1.0,
            exclude_builtin_styles: false,
            header_html: None,
            footer_html: None,
        }
    }
}

impl RenderOptions {
    /// Paper size in millimetres before orientation is applied.
    pub fn paper_size_mm(&self) -> (f64, f64) {
        match self.paper_size {
            Some(size) => (size.width, size.height),
            None => self.paper_format.size_mm(),
        }
    }

    /// Effective page size in millimetres after applying orientation.
    pub fn page_size_mm(&self) -> (f64, f64) {
        let (width, height) = self.paper_size_mm();
        if self.landscape {
            (height, width)
        } else {
            (width, height)
        }
    }

    pub fn has_header_or_footer(&self) -> bool {
        self.header_html.is_some() || self.footer_html.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn options_parse_camel_case_with_defaults() {
        let options: RenderOptions = serde_json::from_str(
            r#"{"paperFormat":"letter","landscape":true,"margins":{"top":5},"excludeBuiltinStyles":true}"#,
        )
        .expect("valid options");

        assert_eq!(options.paper_format, PaperFormat::Letter);
        assert!(options.landscape);
        assert!(options.exclude_builtin_styles);
        assert_eq!(options.margins.top, 5.0);
        assert_eq!(options.margins.left, 10.0);
        assert!(options.print_background);
        assert_eq!(options.page_size_mm(), (279.4, 215.9));
    }

    #[test]
    fn header_html_cannot_be_injected_from_json() {
        let options: RenderOptions =
            serde_json::from_str(r#"{"headerHtml":"<b>x</b>"}"#).expect("unknown keys ignored");
        assert!(options.header_html.is_none());
    }

    #[test]
    fn explicit_paper_size_wins() {
        let options = RenderOptions {
            paper_size: Some(PaperSize {
                width: 100.0,
                height: 150.0,
            }),
            ..RenderOptions::default()
        };
        assert_eq!(options.page_size_mm(), (100.0, 150.0));
    }

    #[tokio::test(start_paused = true)]
    async fn job_expires_at_deadline() {
        let job = Job::new(
            "http://127.0.0.1:1/",
            RenderOptions::default(),
            Instant::now() + Duration::from_secs(1),
        );
        assert!(!job.is_expired());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(job.is_expired());
    }
}
