//! services/api/src/bin/openapi.rs
//!
//! Dumps the OpenAPI document of the authentication API. With a path argument the
//! document goes to that file, otherwise (or with `-`) to stdout.

use anki_sync_api::{tokens::APP_NAME, web::rest::ApiDoc};
use std::io::Write;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let document = ApiDoc::openapi().to_pretty_json()?;

    match std::env::args().nth(1).filter(|target| target != "-") {
        Some(path) => {
            std::fs::write(&path, document)?;
            eprintln!("{APP_NAME} OpenAPI document written to {path}");
        }
        None => writeln!(std::io::stdout().lock(), "{document}")?,
    }
    Ok(())
}
