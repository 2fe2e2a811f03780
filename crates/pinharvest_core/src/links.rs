use url::Url;

/// Appends links from `found` that are not already in `collected`, keeping
/// first-seen order, and stops once `max` links are held.
///
/// Returns how many links were added.
pub fn merge_unique_links<I>(collected: &mut Vec<String>, found: I, max: usize) -> usize
where
    I: IntoIterator<Item = String>,
{
    let before = collected.len();
    for link in found {
        if collected.len() >= max {
            break;
        }
        if !collected.contains(&link) {
            collected.push(link);
        }
    }
    collected.len().saturating_sub(before)
}

/// Resolves `href` against `base`, keeping only http(s) results.
pub fn resolve_link(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let resolved = match Url::parse(href) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base).ok()?.join(href).ok()?,
        Err(_) => return None,
    };
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_pin_links_resolve_against_search_page() {
        let resolved = resolve_link("https://pins.example/search/pins/?q=cats", "/pin/123/");
        assert_eq!(resolved.as_deref(), Some("https://pins.example/pin/123/"));
    }

    #[test]
    fn non_http_links_are_ignored() {
        assert_eq!(resolve_link("https://pins.example/", "javascript:void(0)"), None);
        assert_eq!(resolve_link("https://pins.example/", "mailto:a@b.c"), None);
        assert_eq!(resolve_link("https://pins.example/", "  "), None);
    }
}
