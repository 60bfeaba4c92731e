//! String helpers for storage paths.
//!
//! Storage paths are logical, forward-slash strings relative to the
//! storage root (`/uploads/img1.jpg`). Callers may hand in backslashes
//! or omit the leading slash, so every comparison goes through these
//! helpers instead of `std::path`, whose separator rules depend on the
//! host platform.

/// Infix marking a path produced by applying filters.
pub const FILTERED_INFIX: &str = "_filtered";

/// Forward slashes, no leading slash.
///
/// This is the form used when comparing two paths that may have been
/// spelled differently.
#[must_use]
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_owned()
}

/// Forward slashes with exactly one leading slash.
#[must_use]
pub fn canonical(path: &str) -> String {
    format!("/{}", normalize(path))
}

/// Terminal file name, ignoring any directory.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// File name without its final extension.
///
/// `a.b.jpg` has stem `a.b`; a name without a dot is its own stem.
#[must_use]
pub fn stem(path: &str) -> &str {
    let name = file_name(path);
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

/// Final extension including the dot (`.jpg`), or `""`.
#[must_use]
pub fn extension(path: &str) -> &str {
    let name = file_name(path);
    name.rfind('.').map_or("", |dot| &name[dot..])
}

/// Directory part without a trailing slash. Empty for bare file names,
/// `/` for files directly under the root.
#[must_use]
pub fn parent(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => "",
    }
}

/// Join a logical directory and a file name.
#[must_use]
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches(['/', '\\']);
    if dir.is_empty() {
        name.to_owned()
    } else {
        format!("{dir}/{name}")
    }
}

/// Heuristic grouping key: the stem up to the first underscore.
///
/// `abc123_filtered.jpg` and `abc123_ai_20240101_120000.jpg` share the
/// file ID `abc123`. Returns `None` when that prefix is empty.
#[must_use]
pub fn file_id(path: &str) -> Option<&str> {
    stem(path).split('_').next().filter(|id| !id.is_empty())
}

/// The stem with everything from the first [`FILTERED_INFIX`] removed,
/// or `None` if the stem has no such infix.
#[must_use]
pub fn strip_filtered(path: &str) -> Option<&str> {
    let stem = stem(path);
    stem.find(FILTERED_INFIX).map(|index| &stem[..index])
}

/// Whether the file name carries the [`FILTERED_INFIX`].
#[must_use]
pub fn is_filtered(path: &str) -> bool {
    stem(path).contains(FILTERED_INFIX)
}

/// Path a filter application on `path` writes to.
///
/// Inserts [`FILTERED_INFIX`] before the extension unless the name
/// already carries it, in which case the same file is overwritten.
/// The result stays in the source's directory and is [`canonical`].
#[must_use]
pub fn filtered_path(path: &str) -> String {
    if is_filtered(path) {
        return canonical(path);
    }
    let name = format!("{}{FILTERED_INFIX}{}", stem(path), extension(path));
    canonical(&join(parent(path), &name))
}

/// `path` with its file name replaced by the `_filtered`-free base name.
///
/// Returns `None` if the name has no [`FILTERED_INFIX`].
#[must_use]
pub fn unfiltered_path(path: &str) -> Option<String> {
    let base = strip_filtered(path)?;
    let name = format!("{base}{}", extension(path));
    Some(canonical(&join(parent(path), &name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_leading_slashes_and_backslashes() {
        assert_eq!(normalize("/uploads/a.jpg"), "uploads/a.jpg");
        assert_eq!(normalize("\\uploads\\a.jpg"), "uploads/a.jpg");
        assert_eq!(normalize("uploads/a.jpg"), "uploads/a.jpg");
        assert_eq!(canonical("uploads\\a.jpg"), "/uploads/a.jpg");
    }

    #[test]
    fn name_parts() {
        assert_eq!(file_name("/uploads/a.b.jpg"), "a.b.jpg");
        assert_eq!(file_name("a.jpg"), "a.jpg");
        assert_eq!(file_name("dir\\a.jpg"), "a.jpg");
        assert_eq!(stem("/uploads/a.b.jpg"), "a.b");
        assert_eq!(stem("/uploads/noext"), "noext");
        assert_eq!(extension("/uploads/a.b.jpg"), ".jpg");
        assert_eq!(extension("/uploads/noext"), "");
    }

    #[test]
    fn parent_forms() {
        assert_eq!(parent("/uploads/a.jpg"), "/uploads");
        assert_eq!(parent("/a.jpg"), "/");
        assert_eq!(parent("a.jpg"), "");
        assert_eq!(join("/", "a.jpg"), "a.jpg");
        assert_eq!(join("/uploads/", "a.jpg"), "/uploads/a.jpg");
    }

    #[test]
    fn file_id_is_prefix_before_underscore() {
        assert_eq!(file_id("/uploads/abc123_filtered.jpg"), Some("abc123"));
        assert_eq!(file_id("/uploads/abc123.jpg"), Some("abc123"));
        assert_eq!(file_id("/uploads/_x.jpg"), None);
    }

    #[test]
    fn filtered_path_inserts_infix_once() {
        assert_eq!(filtered_path("/uploads/img1.jpg"), "/uploads/img1_filtered.jpg");
        assert_eq!(
            filtered_path("/uploads/img1_filtered.jpg"),
            "/uploads/img1_filtered.jpg"
        );
        assert_eq!(filtered_path("uploads\\img1.png"), "/uploads/img1_filtered.png");
        assert_eq!(filtered_path("/uploads/noext"), "/uploads/noext_filtered");
    }

    #[test]
    fn unfiltered_path_strips_from_first_infix() {
        assert_eq!(
            unfiltered_path("/uploads/img1_filtered.jpg").as_deref(),
            Some("/uploads/img1.jpg")
        );
        assert_eq!(
            unfiltered_path("/uploads/img1_filtered_v2.jpg").as_deref(),
            Some("/uploads/img1.jpg")
        );
        assert_eq!(unfiltered_path("/uploads/img1.jpg"), None);
    }
}
