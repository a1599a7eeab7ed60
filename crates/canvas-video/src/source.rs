use std::path::Path;

use crate::error::VideoError;

/// Marker for sources relative to the application root.
pub const APP_RELATIVE_PREFIX: &str = "~/";

/// Turn a host-supplied source string into the URI handed to the engine.
///
/// `~/`-prefixed sources are joined onto `app_root`; every other string is
/// passed through untouched.
pub fn resolve_source(source: &str, app_root: &Path) -> Result<String, VideoError> {
    let reject = |reason: &str| VideoError::SourceResolution {
        input: source.to_string(),
        reason: reason.to_string(),
    };

    if source.trim().is_empty() {
        return Err(reject("empty source"));
    }
    if source.chars().any(char::is_control) {
        return Err(reject("source contains control characters"));
    }

    let Some(relative) = source.strip_prefix(APP_RELATIVE_PREFIX) else {
        return Ok(source.to_string());
    };
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return Err(reject("app-relative source names no file"));
    }
    Ok(app_root.join(relative).to_string_lossy().into_owned())
}
