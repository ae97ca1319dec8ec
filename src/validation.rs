use crate::error::ApiError;

pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between {min} and {max} characters (got {len})"
        )));
    }
    Ok(())
}

/// Company and user names: 3-25 characters.
pub fn check_name(value: &str) -> Result<(), ApiError> {
    check_length("name", value, 3, 25)
}

pub fn check_url(field: &str, value: &str) -> Result<(), ApiError> {
    check_length(field, value, 1, 2048)?;
    let parsed =
        url::Url::parse(value).map_err(|_| ApiError::BadRequest(format!("{field} must be a valid URL")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ApiError::BadRequest(format!(
            "{field} must use http or https scheme"
        )));
    }
    Ok(())
}

/// StarkNet account address: `0x` followed by 64 hex digits.
pub fn check_public_address(value: &str) -> Result<(), ApiError> {
    let hex = value.strip_prefix("0x").ok_or_else(|| {
        ApiError::BadRequest("public address must start with 0x".into())
    })?;
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::BadRequest(
            "public address must be 0x followed by 64 hex characters".into(),
        ));
    }
    Ok(())
}

/// Git commit hash: 7-40 lowercase hex characters.
pub fn check_commit_hash(field: &str, value: &str) -> Result<(), ApiError> {
    let len = value.len();
    if !(7..=40).contains(&len)
        || !value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(ApiError::BadRequest(format!(
            "{field} must be a valid git commit hash"
        )));
    }
    Ok(())
}

/// Cairo compiler version in `x.y.z` form.
pub fn check_version(field: &str, value: &str) -> Result<(), ApiError> {
    let parts: Vec<&str> = value.split('.').collect();
    let valid = parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if !valid {
        return Err(ApiError::BadRequest(format!(
            "{field} must be in format x.y.z"
        )));
    }
    Ok(())
}
