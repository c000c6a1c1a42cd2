//! Bundle id derivation.

/// Derives the bundle id of a source path.
///
/// Path separators, dots and spaces become `_`, then the result is
/// lowercased. Pure and deterministic: the same path always yields the same
/// id, which keeps incremental hash comparisons valid across builds.
///
/// # Examples
///
/// ```
/// use kodegen_bundler_assets::bundler::bundle_id;
///
/// assert_eq!(bundle_id("Assets/UI/Main Menu.prefab"), "assets_ui_main_menu_prefab");
/// ```
pub fn bundle_id(path: &str) -> String {
    path.trim_end_matches(['/', '\\'])
        .chars()
        .map(|c| match c {
            '/' | '\\' | '.' | ' ' => '_',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}
