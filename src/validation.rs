//! Validation artifacts for the authority's HTTP file check.
//!
//! Before issuing, the authority fetches
//! `http://<ip>/.well-known/pki-validation/<file>` and compares it against the
//! proof material attached to the request. This module places those files
//! under the configured web root; nothing here ever deletes them — the next
//! request simply overwrites.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    api,
    error::{Error, Result},
};

/// Writes one proof file per validation method and returns the written paths.
///
/// Content tokens are joined with a newline; the file name is the last path
/// segment of the method's HTTP validation URL. Methods without content
/// tokens are skipped with a warning, not treated as errors.
pub fn write_validation_files(
    validation_dir: &Path,
    validation: &api::Validation,
) -> Result<Vec<PathBuf>> {
    let Some(methods) = &validation.other_methods else {
        log::warn!("request carries no file validation methods");
        return Ok(Vec::new());
    };

    let target_dir = validation_dir.join(".well-known").join("pki-validation");
    fs::create_dir_all(&target_dir).map_err(Error::filesystem(&target_dir))?;

    let mut written = Vec::new();

    for (method, data) in methods {
        if data.file_validation_content.is_empty() {
            log::warn!("skipping validation method {method}: no file content");
            continue;
        }

        let Some(file_name) = file_name_from_url(&data.file_validation_url_http) else {
            log::warn!(
                "skipping validation method {method}: no usable file name in {:?}",
                data.file_validation_url_http
            );
            continue;
        };

        let path = target_dir.join(file_name);
        let content = data.file_validation_content.join("\n");

        fs::write(&path, &content).map_err(Error::filesystem(&path))?;

        log::info!("validation file written: {}", path.display());
        written.push(path);
    }

    Ok(written)
}

fn file_name_from_url(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|name| !name.is_empty())
}
