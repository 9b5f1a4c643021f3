use axum::{
    body::Body,
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{DocumentInput, PdfOptions};
use crate::rendering::RendererHandle;
use crate::services::{PdfGenerator, PdfOutput, ResourceFactory};

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Request body for PDF generation
#[derive(Debug, Deserialize, ToSchema)]
pub struct PdfRequest {
    /// Markup to render (mutually exclusive with `url`)
    #[serde(default)]
    pub html: Option<String>,
    /// Address to navigate to (mutually exclusive with `html`)
    #[serde(default)]
    pub url: Option<String>,
    /// Stream the PDF as it is produced instead of buffering it
    #[serde(default)]
    pub stream: bool,
    /// Print options (format, margin, landscape, ...); unknown keys are forwarded to the renderer
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub options: Option<PdfOptions>,
}

impl PdfRequest {
    /// Validate the request and split it into input, stream flag and options
    pub fn into_parts(self) -> Result<(DocumentInput, bool, Option<PdfOptions>), ApiError> {
        let input = match (self.html, self.url) {
            (Some(html), None) => DocumentInput::Markup(html),
            (None, Some(url)) => {
                let url = Url::parse(&url)
                    .map_err(|e| ApiError::BadRequest(format!("invalid url: {e}")))?;
                DocumentInput::Address(url)
            }
            (Some(_), Some(_)) => {
                return Err(ApiError::BadRequest(
                    "provide either html or url, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(ApiError::BadRequest("one of html or url is required".to_string()))
            }
        };

        Ok((input, self.stream, self.options))
    }
}

/// Convert markup or a URL to PDF
///
/// Returns the whole document, or a chunked body when `stream` is set.
#[utoipa::path(
    post,
    path = "/api/pdf",
    request_body = PdfRequest,
    responses(
        (status = 200, description = "Rendered PDF", content_type = "application/pdf"),
        (status = 400, description = "Invalid request"),
        (status = 422, description = "Content could not be loaded"),
        (status = 500, description = "Rendering failed"),
        (status = 503, description = "Renderer pool closed or busy"),
    ),
    tag = "PDF"
)]
pub async fn handle_pdf<F>(
    State(generator): State<Arc<PdfGenerator<F>>>,
    Json(request): Json<PdfRequest>,
) -> Result<Response, ApiError>
where
    F: ResourceFactory,
    F::Resource: RendererHandle,
{
    let (input, stream, options) = request.into_parts()?;

    tracing::info!(input = %input.describe(), stream, "PDF requested");

    let response = match generator.generate(input, stream, options).await? {
        PdfOutput::Buffer(pdf) => ([(CONTENT_TYPE, PDF_CONTENT_TYPE)], pdf).into_response(),
        PdfOutput::Stream(pdf) => {
            ([(CONTENT_TYPE, PDF_CONTENT_TYPE)], Body::from_stream(pdf)).into_response()
        }
    };

    Ok(response)
}
