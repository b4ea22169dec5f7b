use crate::error::{Error, Result};

/// Cancel and reject require a human-readable reason.
pub fn require_reason(reason: Option<&str>) -> Result<String> {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => {
            if r.chars().count() > 1000 {
                return Err(Error::BadRequest("Reason must be at most 1000 characters".into()));
            }
            Ok(r.to_string())
        }
        _ => Err(Error::BadRequest("A reason is required".into())),
    }
}
