//! Preset naming rules.
//!
//! A preset is a saved workflow stored as `<slug>.json`. The slug is the
//! user-supplied name lowercased with spaces replaced by underscores. File
//! I/O lives in `zenith-studio::presets`.

use crate::error::CoreError;

/// Extension of preset and base-workflow files.
pub const PRESET_EXTENSION: &str = ".json";

/// Maximum length of a user-supplied preset name.
pub const MAX_PRESET_NAME_LEN: usize = 120;

/// Presets shown per page when listing.
pub const PRESETS_PER_PAGE: usize = 5;

/// Validate a user-supplied preset name.
pub fn validate_preset_name(name: &str) -> Result<(), CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Preset name must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_PRESET_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Preset name too long (max {MAX_PRESET_NAME_LEN} characters)"
        )));
    }
    if trimmed.contains(['/', '\\']) || trimmed.contains("..") || trimmed.contains('\0') {
        return Err(CoreError::Validation(format!(
            "Preset name '{trimmed}' contains path characters"
        )));
    }
    Ok(())
}

/// File name a preset called `name` is saved under.
///
/// ```
/// assert_eq!(zenith_core::preset::preset_file_name("Portrait Sci Fi").unwrap(), "portrait_sci_fi.json");
/// ```
pub fn preset_file_name(name: &str) -> Result<String, CoreError> {
    validate_preset_name(name)?;
    Ok(format!(
        "{}{PRESET_EXTENSION}",
        name.trim().replace(' ', "_").to_lowercase()
    ))
}

/// Human-readable name for a preset file: underscores become spaces and
/// the first letter is capitalised.
pub fn display_name(file_name: &str) -> String {
    let stem = file_name.strip_suffix(PRESET_EXTENSION).unwrap_or(file_name);
    let spaced = stem.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Validate a file name received from a caller before it touches the
/// filesystem: a single `.json` path component.
pub fn validate_file_name(file_name: &str) -> Result<(), CoreError> {
    let stem = file_name.strip_suffix(PRESET_EXTENSION).ok_or_else(|| {
        CoreError::Validation(format!("'{file_name}' is not a {PRESET_EXTENSION} file"))
    })?;
    if stem.is_empty()
        || file_name.contains(['/', '\\', '\0'])
        || file_name.starts_with('.')
        || file_name.contains("..")
    {
        return Err(CoreError::Validation(format!("Invalid file name '{file_name}'")));
    }
    Ok(())
}

/// Zero-based `page` of `items`, `per_page` at a time, plus the page count.
pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> (&[T], usize) {
    let per_page = per_page.max(1);
    let total_pages = items.len().div_ceil(per_page);
    let start = page.saturating_mul(per_page).min(items.len());
    let end = (start + per_page).min(items.len());
    (&items[start..end], total_pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn file_name_is_lowercase_slug() {
        assert_eq!(preset_file_name("Portrait Sci Fi").unwrap(), "portrait_sci_fi.json");
        assert_eq!(preset_file_name("  Night  ").unwrap(), "night.json");
    }

    #[test]
    fn empty_or_pathlike_names_rejected() {
        assert_matches!(preset_file_name("   "), Err(CoreError::Validation(_)));
        assert_matches!(preset_file_name("../etc"), Err(CoreError::Validation(_)));
        assert_matches!(preset_file_name("a/b"), Err(CoreError::Validation(_)));
        assert_matches!(
            preset_file_name(&"x".repeat(MAX_PRESET_NAME_LEN + 1)),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn display_name_capitalises_first_letter() {
        assert_eq!(display_name("portrait_sci_fi.json"), "Portrait sci fi");
        assert_eq!(display_name(".json"), "");
    }

    #[test]
    fn file_name_validation() {
        assert!(validate_file_name("night.json").is_ok());
        assert_matches!(validate_file_name("night.txt"), Err(CoreError::Validation(_)));
        assert_matches!(validate_file_name(".json"), Err(CoreError::Validation(_)));
        assert_matches!(validate_file_name("../night.json"), Err(CoreError::Validation(_)));
        assert_matches!(validate_file_name("sub/night.json"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn pagination_pages_of_five() {
        let items: Vec<u32> = (0..12).collect();
        let (page, total) = paginate(&items, 0, PRESETS_PER_PAGE);
        assert_eq!(page, &[0, 1, 2, 3, 4]);
        assert_eq!(total, 3);
        let (page, _) = paginate(&items, 2, PRESETS_PER_PAGE);
        assert_eq!(page, &[10, 11]);
        let (page, _) = paginate(&items, 9, PRESETS_PER_PAGE);
        assert!(page.is_empty());
    }
}
