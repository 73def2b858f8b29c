//! Object naming: whitespace normalization, allow-list validation and
//! variant name derivation.

use crate::error::NameKind;
use crate::{BucketError, BucketResult};

/// Normalized folder/file pair and the object path built from them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    pub folder_name: String,
    pub file_name: String,
    pub path: String,
}

impl ObjectPath {
    /// Normalize and validate both segments; the path joins the normalized names
    pub fn new(folder_name: &str, file_name: &str) -> BucketResult<Self> {
        let folder_name = normalize_segment(folder_name);
        validate_segment(NameKind::Folder, &folder_name)?;

        let file_name = normalize_segment(file_name);
        validate_segment(NameKind::File, &file_name)?;

        let path = format!("{folder_name}/{file_name}");
        Ok(Self {
            folder_name,
            file_name,
            path,
        })
    }
}

/// Replace every whitespace character with a hyphen
pub fn normalize_segment(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect()
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// A segment is accepted when it holds at least one `[A-Za-z0-9-]` character
/// and cannot leave its folder.
///
/// Dots are allowed alongside, so `cat.jpg` passes while `...`, `é€`,
/// `a/b` or `..` do not.
pub fn validate_segment(kind: NameKind, normalized: &str) -> BucketResult<()> {
    let has_separator = normalized.contains(['/', '\\']);
    if !has_separator && normalized.chars().any(is_allowed) {
        Ok(())
    } else {
        Err(BucketError::InvalidName {
            kind,
            name: normalized.to_string(),
        })
    }
}

/// True when the name ends in a non-empty `.ext`
pub fn has_extension(name: &str) -> bool {
    match name.rfind('.') {
        Some(idx) => idx + 1 < name.len(),
        None => false,
    }
}

/// Swap the trailing `.ext` for `.{extension}`
pub fn replace_extension(name: &str, extension: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => format!("{}.{}", &name[..idx], extension),
        _ => append_extension(name, extension),
    }
}

fn append_extension(name: &str, extension: &str) -> String {
    format!("{}.{}", name.trim_end_matches('.'), extension)
}

/// Name of a derived variant: `prefix + (override or base)`, with the
/// extension replaced or appended when a target format is requested.
pub fn derive_variant_name(
    prefix: &str,
    base_name: &str,
    override_name: Option<&str>,
    extension: Option<&str>,
) -> String {
    let name = format!("{}{}", prefix, override_name.unwrap_or(base_name));
    match extension {
        Some(ext) if has_extension(&name) => replace_extension(&name, ext),
        Some(ext) => append_extension(&name, ext),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_name_replaces_extension() {
        assert_eq!(
            derive_variant_name("small-", "cat.jpg", None, Some("webp")),
            "small-cat.webp"
        );
    }

    #[test]
    fn test_variant_name_without_format() {
        assert_eq!(derive_variant_name("medium-", "cat.jpg", None, None), "medium-cat.jpg");
    }

    #[test]
    fn test_variant_name_appends_with_separator() {
        assert_eq!(derive_variant_name("thumb-", "cat", None, Some("png")), "thumb-cat.png");
        assert_eq!(derive_variant_name("thumb-", "cat.", None, Some("png")), "thumb-cat.png");
    }

    #[test]
    fn test_variant_name_override() {
        assert_eq!(
            derive_variant_name("x2-", "cat.jpg", Some("dog.png"), Some("avif")),
            "x2-dog.avif"
        );
        assert_eq!(derive_variant_name("x2-", "cat.jpg", Some("dog"), None), "x2-dog");
    }

    #[test]
    fn test_only_last_extension_is_replaced() {
        assert_eq!(replace_extension("archive.tar.gz", "webp"), "archive.tar.webp");
        assert!(has_extension("a.b"));
        assert!(!has_extension("ab"));
        assert!(!has_extension("ab."));
    }

    #[test]
    fn test_object_path_normalizes_whitespace() {
        let path = ObjectPath::new("user uploads", "my cat.jpg").unwrap();
        assert_eq!(path.folder_name, "user-uploads");
        assert_eq!(path.file_name, "my-cat.jpg");
        assert_eq!(path.path, "user-uploads/my-cat.jpg");
    }

    #[test]
    fn test_invalid_names() {
        let err = ObjectPath::new("avatars", "...").unwrap_err();
        assert!(matches!(err, BucketError::InvalidName { kind: NameKind::File, .. }));

        let err = ObjectPath::new("", "cat.jpg").unwrap_err();
        assert!(matches!(err, BucketError::InvalidName { kind: NameKind::Folder, .. }));

        // whitespace becomes hyphens, which are allowed
        assert!(ObjectPath::new("   ", "cat.jpg").is_ok());
        assert!(ObjectPath::new("fotos", "é€.ü").is_err());
    }

    #[test]
    fn test_names_cannot_leave_their_folder() {
        for name in ["../user2/avatar.png", "a/b.png", "a\\b.png", ".."] {
            let err = ObjectPath::new("user1", name).unwrap_err();
            assert!(
                matches!(err, BucketError::InvalidName { kind: NameKind::File, .. }),
                "{name} should be rejected"
            );
        }

        let err = ObjectPath::new("user1/../user2", "avatar.png").unwrap_err();
        assert!(matches!(err, BucketError::InvalidName { kind: NameKind::Folder, .. }));

        assert!(ObjectPath::new("user1", "my.cat.png").is_ok());
        assert!(ObjectPath::new("user1", "cat..png").is_ok());
    }
}
