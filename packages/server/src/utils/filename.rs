use chrono::{DateTime, Utc};

/// Longest accepted file or directory name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    Empty,
    TooLong,
    NullByte,
    ControlCharacter,
    PathSeparator,
    Traversal,
    Hidden,
    MissingExtension,
}

impl NameError {
    pub fn message(&self) -> &'static str {
        match self {
            NameError::Empty => "Name cannot be empty",
            NameError::TooLong => "Name is too long",
            NameError::NullByte => "Name cannot contain null bytes",
            NameError::ControlCharacter => "Name cannot contain control characters",
            NameError::PathSeparator => "Name cannot contain path separators",
            NameError::Traversal => "Name cannot be a path traversal sequence",
            NameError::Hidden => "Name cannot start with a dot",
            NameError::MissingExtension => "File name must include an extension",
        }
    }
}

fn validate_flat_name(raw: &str) -> Result<&str, NameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong);
    }
    if name.contains('\0') {
        return Err(NameError::NullByte);
    }
    if name.chars().any(char::is_control) {
        return Err(NameError::ControlCharacter);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(NameError::PathSeparator);
    }
    if name == ".." {
        return Err(NameError::Traversal);
    }
    if name.starts_with('.') {
        return Err(NameError::Hidden);
    }
    Ok(name)
}

/// Validates a user-supplied file name and returns it trimmed.
///
/// Names are flat: no separators, no leading dot, and the name must
/// carry an extension.
pub fn validate_file_name(raw: &str) -> Result<&str, NameError> {
    let name = validate_flat_name(raw)?;
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Ok(name),
        _ => Err(NameError::MissingExtension),
    }
}

/// Validates a user-supplied directory name and returns it trimmed.
pub fn validate_directory_name(raw: &str) -> Result<&str, NameError> {
    validate_flat_name(raw)
}

/// Derives a sibling name that will not collide with `file_name` by
/// splicing a microsecond timestamp in front of the extension:
/// `report.pdf` becomes `report_20260825143015123456.pdf`.
pub fn disambiguate(file_name: &str, now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%d%H%M%S%6f");
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_{stamp}.{ext}"),
        None => format!("{file_name}_{stamp}"),
    }
}
