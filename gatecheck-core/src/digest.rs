//! Structural page digest and content checksums
//!
//! The digest is sensitive to tag names, attribute names and child order but
//! insensitive to text and attribute values, so dynamic content (seat
//! counters, embedded JSON) never changes it while any skeleton change does.

use crc32fast::Hasher;
use scraper::{ElementRef, Html};

/// Structural digest of a parsed document's root element
pub fn structural_digest(document: &Html) -> u32 {
    let mut hasher = Hasher::new();
    hash_element(document.root_element(), &mut hasher);
    hasher.finalize()
}

fn hash_element(element: ElementRef<'_>, hasher: &mut Hasher) {
    hasher.update(b"<");
    hasher.update(element.value().name().as_bytes());

    // Attribute order is serialization detail, not structure
    let mut attr_names: Vec<&str> = element.value().attrs().map(|(name, _)| name).collect();
    attr_names.sort_unstable();
    for name in attr_names {
        hasher.update(b" ");
        hasher.update(name.as_bytes());
    }
    hasher.update(b">");

    for child in element.children().filter_map(ElementRef::wrap) {
        hash_element(child, hasher);
    }

    hasher.update(b"</");
    hasher.update(element.value().name().as_bytes());
    hasher.update(b">");
}

/// CRC32 checksum of a response body, used for static asset verification
pub fn content_checksum(body: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(body);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div id="app-wrapper" data-events="[]" data-login-user="null">
          <span class="remains">42</span>
        </div>
    </body></html>"#;

    #[test]
    fn test_digest_ignores_text_and_attribute_values() {
        let a = Html::parse_document(PAGE);
        let b = Html::parse_document(
            &PAGE
                .replace("42", "17")
                .replace("data-login-user=\"null\"", "data-login-user=\"someone\""),
        );
        assert_eq!(structural_digest(&a), structural_digest(&b));
    }

    #[test]
    fn test_digest_changes_when_a_node_is_added() {
        let a = Html::parse_document(PAGE);
        let b = Html::parse_document(&PAGE.replace(
            "<span class=\"remains\">42</span>",
            "<span class=\"remains\">42</span><span>new</span>",
        ));
        assert_ne!(structural_digest(&a), structural_digest(&b));
    }

    #[test]
    fn test_digest_changes_when_a_node_is_removed() {
        let a = Html::parse_document(PAGE);
        let b = Html::parse_document(&PAGE.replace("<span class=\"remains\">42</span>", ""));
        assert_ne!(structural_digest(&a), structural_digest(&b));
    }

    #[test]
    fn test_digest_is_order_sensitive() {
        let a = Html::parse_document("<html><body><p></p><div></div></body></html>");
        let b = Html::parse_document("<html><body><div></div><p></p></body></html>");
        assert_ne!(structural_digest(&a), structural_digest(&b));
    }

    #[test]
    fn test_content_checksum_is_deterministic() {
        assert_eq!(content_checksum(b"body { }"), content_checksum(b"body { }"));
        assert_ne!(content_checksum(b"body { }"), content_checksum(b"body {}"));
    }
}
