//! OpenAPI documentation and schema generation
//!
//! The specification is generated at compile time with utoipa.

use utoipa::OpenApi;

/// OpenAPI documentation for the weather-batch REST API
///
/// The spec can be accessed via:
/// - `/api/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation (if enabled)
#[derive(OpenApi)]
#[openapi(
    info(
        title = "weather-batch REST API",
        version = "0.1.0",
        description = "Submit batches of ZIP codes, follow their progress live, and retrieve the collected weather observations",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:5328", description = "Local development server")
    ),
    paths(
        // Batches
        crate::api::routes::fetch_weather,
        crate::api::routes::progress_stream,

        // Results
        crate::api::routes::preview_results,
        crate::api::routes::download_results,
        crate::api::routes::batch_status,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::SessionId,
        crate::types::BatchRequest,
        crate::types::WeatherRecord,
        crate::types::OutcomeClass,
        crate::types::ProgressEvent,
        crate::types::BatchState,
        crate::types::BatchStatus,
        crate::types::ResultPreview,
        crate::types::HealthStatus,

        // API request/response types from routes
        crate::api::routes::SubmitResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
        crate::error::FailureKind,
        crate::error::FetchError,
    )),
    tags(
        (name = "batches", description = "Batch submission and live progress"),
        (name = "results", description = "Preview, CSV download, and batch status of completed batches"),
        (name = "system", description = "System endpoints - Health check and OpenAPI spec"),
    )
)]
pub struct ApiDoc;
