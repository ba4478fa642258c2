//! services/api/src/bin/openapi.rs
//!
//! Writes the PetTales REST API description to `openapi.json`, or to the path given
//! as the first argument.

use api_lib::{error::ApiError, web::rest::ApiDoc};
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn main() -> Result<(), ApiError> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    let doc = ApiDoc::openapi();
    std::fs::write(&path, doc.to_pretty_json()?)?;
    println!(
        "Wrote {} API paths to {}",
        doc.paths.paths.len(),
        path
    );
    Ok(())
}
