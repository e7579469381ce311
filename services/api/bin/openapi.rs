//! Writes the coach API's OpenAPI document, by default to `openapi.json`.
//!
//! Usage: `openapi [OUTPUT_PATH]`

use coach_api::router::ApiDoc;
use std::path::Path;
use utoipa::OpenApi;

fn write_document(api_doc: utoipa::openapi::OpenApi, path: &Path) -> anyhow::Result<()> {
    let json = api_doc.to_pretty_json()?;
    std::fs::write(path, json)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    write_document(ApiDoc::openapi(), Path::new(&output))?;
    println!("OpenAPI document written to {output}");
    Ok(())
}
