//! HTML to text content extraction.
//!
//! Light boilerplate stripping: chrome elements (nav, header, footer) and
//! non-content elements (script, style, iframe, noscript) are dropped, the
//! rest of the document's text is collected line by line with blank lines
//! removed. Good enough to feed the chunker; not a readability engine.
use ego_tree::NodeRef;
use scraper::{Html, Node, Selector};
use std::sync::LazyLock;
use tracing::debug;

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("static selector"));
static H1_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("static selector"));

/// Elements whose entire subtree is excluded from the extracted text.
const EXCLUDED: &[&str] = &[
    "script", "style", "header", "footer", "nav", "iframe", "noscript", "head",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub text: String,
}

/// Extract the title and main text from a fetched page.
pub fn extract(html: &str, url: &str) -> Extracted {
    if html.is_empty() {
        return Extracted::default();
    }

    let doc = Html::parse_document(html);

    let title = doc
        .select(&TITLE_SELECTOR)
        .next()
        .or_else(|| doc.select(&H1_SELECTOR).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let mut raw = String::new();
    collect_text(doc.tree.root(), &mut raw);

    // Strip each line, drop the empty ones.
    let text = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    debug!("extracted {} chars of text from {url}", text.chars().count());
    Extracted { title, text }
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Element(el) => {
                if EXCLUDED.contains(&el.name()) {
                    continue;
                }
                collect_text(child, out);
                // Block-ish separation keeps unrelated phrases off one line.
                out.push('\n');
            }
            Node::Text(text) => out.push_str(&text),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_html() {
        let extracted = extract("", "https://example.com");
        assert_eq!(extracted, Extracted::default());
    }

    #[test]
    fn test_title_from_title_tag() {
        let html = "<html><head><title> Docs Home </title></head><body><p>Body</p></body></html>";
        let extracted = extract(html, "https://example.com");
        assert_eq!(extracted.title, "Docs Home");
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let html = "<html><body><h1>Fallback Heading</h1><p>Body</p></body></html>";
        let extracted = extract(html, "https://example.com");
        assert_eq!(extracted.title, "Fallback Heading");
    }

    #[test]
    fn test_scripts_and_chrome_are_stripped() {
        let html = r#"<html><head><title>T</title><style>p{color:red}</style></head>
            <body>
              <nav>Site navigation</nav>
              <script>var secret = 1;</script>
              <p>Visible paragraph.</p>
              <footer>Copyright</footer>
            </body></html>"#;
        let extracted = extract(html, "https://example.com");
        assert!(extracted.text.contains("Visible paragraph."));
        assert!(!extracted.text.contains("secret"));
        assert!(!extracted.text.contains("Site navigation"));
        assert!(!extracted.text.contains("Copyright"));
        assert!(!extracted.text.contains("color:red"));
    }

    #[test]
    fn test_blank_lines_removed() {
        let html = "<html><body><p>one</p>\n\n\n<p>two</p></body></html>";
        let extracted = extract(html, "https://example.com");
        for line in extracted.text.lines() {
            assert!(!line.trim().is_empty());
        }
        assert!(extracted.text.contains("one"));
        assert!(extracted.text.contains("two"));
    }
}
