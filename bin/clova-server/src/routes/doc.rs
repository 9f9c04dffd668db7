use crate::routes::{generate, health};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "clova-server",
    description = "Local HyperCLOVA X SEED text generation API",
    version = "0.1.0"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(generate::GenerateApi::openapi());
    root
}
