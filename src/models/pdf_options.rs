use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Document to convert: raw markup or an address to navigate to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentInput {
    Markup(String),
    Address(Url),
}

impl DocumentInput {
    /// Short description for logs (never the full markup)
    pub fn describe(&self) -> String {
        match self {
            DocumentInput::Markup(html) => format!("markup ({} bytes)", html.len()),
            DocumentInput::Address(url) => url.to_string(),
        }
    }
}

impl From<String> for DocumentInput {
    fn from(html: String) -> Self {
        DocumentInput::Markup(html)
    }
}

impl From<&str> for DocumentInput {
    fn from(html: &str) -> Self {
        DocumentInput::Markup(html.to_string())
    }
}

impl From<Url> for DocumentInput {
    fn from(url: Url) -> Self {
        DocumentInput::Address(url)
    }
}

/// Paper sizes understood by the print pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
}

impl PageFormat {
    /// CSS `@page size` value
    pub fn css_size(self) -> &'static str {
        match self {
            PageFormat::Letter => "8.5in 11in",
            PageFormat::Legal => "8.5in 14in",
            PageFormat::Tabloid => "11in 17in",
            PageFormat::Ledger => "17in 11in",
            PageFormat::A0 => "841mm 1189mm",
            PageFormat::A1 => "594mm 841mm",
            PageFormat::A2 => "420mm 594mm",
            PageFormat::A3 => "297mm 420mm",
            PageFormat::A4 => "210mm 297mm",
            PageFormat::A5 => "148mm 210mm",
            PageFormat::A6 => "105mm 148mm",
        }
    }
}

/// Page margins as CSS lengths (e.g. `"100px"`, `"1cm"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    #[serde(default = "zero")]
    pub top: String,
    #[serde(default = "zero")]
    pub right: String,
    #[serde(default = "zero")]
    pub bottom: String,
    #[serde(default = "zero")]
    pub left: String,
}

fn zero() -> String {
    "0".to_string()
}

impl Margins {
    pub fn css(&self) -> String {
        format!("{} {} {} {}", self.top, self.right, self.bottom, self.left)
    }
}

/// Options forwarded to the renderer's print call.
///
/// Keys the renderer understands but this crate does not model are kept in
/// `extra` and passed through unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<PageFormat>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<Margins>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PdfOptions {
    /// Options used when the caller supplies none: A4 with 100px/50px margins
    pub fn print_defaults() -> Self {
        Self {
            format: Some(PageFormat::A4),
            margin: Some(Margins {
                top: "100px".to_string(),
                right: "50px".to_string(),
                bottom: "100px".to_string(),
                left: "50px".to_string(),
            }),
            ..Default::default()
        }
    }

    /// CSS `@page` rule expressing format, orientation and margins, if any
    pub fn page_rule(&self) -> Option<String> {
        let mut declarations = Vec::new();

        if let Some(format) = self.format {
            let size = if self.landscape.unwrap_or(false) {
                format!("{} landscape", format.css_size())
            } else {
                format.css_size().to_string()
            };
            declarations.push(format!("size: {size};"));
        } else if self.landscape.unwrap_or(false) {
            declarations.push("size: landscape;".to_string());
        }

        if let Some(margin) = &self.margin {
            declarations.push(format!("margin: {};", margin.css()));
        }

        if declarations.is_empty() {
            None
        } else {
            Some(format!("@page {{ {} }}", declarations.join(" ")))
        }
    }
}
