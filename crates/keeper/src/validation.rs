//! Request field limits

use crate::error::ServiceError;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CONTENT_LEN: usize = 1024 * 1024;
pub const MIN_EMAIL_LEN: usize = 3;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

fn invalid(msg: impl Into<String>) -> Result<(), ServiceError> {
    Err(ServiceError::InvalidInput(msg.into()))
}

pub fn validate_name(name: &str) -> Result<(), ServiceError> {
    if name.is_empty() {
        return invalid("name is required");
    }
    if name.len() > MAX_NAME_LEN {
        return invalid(format!("name exceeds {} bytes", MAX_NAME_LEN));
    }
    if name.chars().any(char::is_control) {
        return invalid("name must not contain control characters");
    }
    Ok(())
}

pub fn validate_content(content: &[u8]) -> Result<(), ServiceError> {
    if content.len() > MAX_CONTENT_LEN {
        return invalid(format!("content exceeds {} bytes", MAX_CONTENT_LEN));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ServiceError> {
    if email.len() < MIN_EMAIL_LEN || email.len() > MAX_EMAIL_LEN {
        return invalid(format!(
            "email must be {}..={} bytes",
            MIN_EMAIL_LEN, MAX_EMAIL_LEN
        ));
    }

    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => {}
        _ => return invalid("invalid email format"),
    }

    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return invalid("invalid email format");
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.len() < MIN_PASSWORD_LEN || password.len() > MAX_PASSWORD_LEN {
        return invalid(format!(
            "password must be {}..={} bytes",
            MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
        ));
    }
    Ok(())
}
