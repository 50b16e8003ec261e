//! Reading-mode sanitizer. Reduces arbitrary rendered HTML to a canonical,
//! safe subset: chrome stripped, icons replaced by their accessible labels,
//! code blocks tagged with their language, everything else unwrapped.
//!
//! The parser is read-only, so the transform is expressed in the serializer:
//! one walk over the parsed tree re-emits only the canonical subset.

use scraper::{ElementRef, Html, Node};

/// Tags that survive sanitization. Everything else is unwrapped (tag removed,
/// children kept) or, for chrome, removed with its subtree.
const ALLOWED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "pre", "code", "img", "blockquote", "ul", "ol",
    "li", "table", "thead", "tbody", "tr", "th", "td", "hr",
];

/// Structural chrome removed with its whole subtree.
const CHROME_TAGS: &[&str] = &[
    "nav", "aside", "footer", "header", "button", "form", "script", "style", "noscript",
    "iframe", "input", "select", "textarea", "label", "object", "embed", "video", "audio",
    "canvas",
];

/// Class markers matched as a substring of any class token. Long enough that
/// substring matching does not mow down unrelated content.
const CHROME_CLASS_SUBSTRINGS: &[&str] = &[
    "menu",
    "sidebar",
    "navigation",
    "breadcrumb",
    "toolbar",
    "pagination",
    "banner",
    "sponsor",
    "search",
    "logo",
];

/// Short class markers matched only as a whole token ("ad" as a substring
/// would also hit "header", "readme", ...).
const CHROME_CLASS_EXACT: &[&str] = &["ad", "ads", "toc"];

/// Placeholder for icon glyphs without an accessible label. Stripped from the
/// final string so icon glyphs never leak into non-visual output.
const ICON_PLACEHOLDER: &str = "[ICON]";

/// Transform raw HTML into the canonical subset.
///
/// Deterministic and pure: no network access, never panics. Malformed HTML
/// degrades to best-effort text extraction via the parser's error recovery.
pub fn sanitize(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    walk_children(fragment.root_element(), &mut out);
    out.replace(ICON_PLACEHOLDER, "")
}

fn walk_children(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => push_escaped_text(&text.text, out),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    visit_element(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn visit_element(el: ElementRef, out: &mut String) {
    let name = el.value().name();
    if name == "svg" {
        return;
    }
    if is_icon_element(el) {
        match icon_label(el) {
            Some(label) => push_escaped_text(label, out),
            None => out.push_str(ICON_PLACEHOLDER),
        }
        return;
    }
    if CHROME_TAGS.contains(&name) || has_chrome_class(el) {
        return;
    }
    if ALLOWED_TAGS.contains(&name) {
        emit_allowed(el, out);
    } else {
        // Unwrap: keep children in order, drop the tag.
        walk_children(el, out);
    }
}

fn emit_allowed(el: ElementRef, out: &mut String) {
    let name = el.value().name();
    match name {
        "img" => {
            let src = el.value().attr("src").unwrap_or("");
            let alt = el.value().attr("alt").unwrap_or("");
            out.push_str(&format!(
                r#"<img src="{}" alt="{}"/>"#,
                escape_attr(src),
                escape_attr(alt)
            ));
            if !alt.trim().is_empty() {
                out.push_str(r#"<p class="image-caption">"#);
                push_escaped_text(alt, out);
                out.push_str("</p>");
            }
        }
        "hr" => out.push_str("<hr/>"),
        "pre" => {
            match detect_code_language(el) {
                Some(lang) => {
                    out.push_str(&format!(r#"<pre data-lang="{}">"#, escape_attr(&lang)))
                }
                None => out.push_str("<pre>"),
            }
            walk_children(el, out);
            out.push_str("</pre>");
        }
        "code" => {
            let lang_class = el
                .value()
                .classes()
                .find(|c| c.starts_with("language-"))
                .map(String::from);
            match lang_class {
                Some(class) => {
                    out.push_str(&format!(r#"<code class="{}">"#, escape_attr(&class)))
                }
                None => out.push_str("<code>"),
            }
            walk_children(el, out);
            out.push_str("</code>");
        }
        _ => {
            out.push_str(&format!("<{}>", name));
            walk_children(el, out);
            out.push_str(&format!("</{}>", name));
        }
    }
}

/// Language from a `language-xxx` class on a code element inside the pre.
fn detect_code_language(pre: ElementRef) -> Option<String> {
    for node in pre.descendants() {
        if let Some(code) = ElementRef::wrap(node) {
            if code.value().name() != "code" {
                continue;
            }
            if let Some(class) = code.value().classes().find(|c| c.starts_with("language-")) {
                let lang = class.trim_start_matches("language-");
                if !lang.is_empty() {
                    return Some(lang.to_string());
                }
            }
        }
    }
    None
}

fn is_icon_element(el: ElementRef) -> bool {
    let name = el.value().name();
    if name != "i" && name != "span" {
        return false;
    }
    el.value()
        .classes()
        .any(|c| c == "icon" || c == "material-icons" || c == "fa" || c.starts_with("fa-"))
}

fn icon_label(el: ElementRef) -> Option<&str> {
    el.value()
        .attr("aria-label")
        .or_else(|| el.value().attr("title"))
        .filter(|label| !label.trim().is_empty())
}

fn has_chrome_class(el: ElementRef) -> bool {
    el.value().classes().any(|c| {
        let token = c.to_ascii_lowercase();
        CHROME_CLASS_EXACT.contains(&token.as_str())
            || CHROME_CLASS_SUBSTRINGS
                .iter()
                .any(|marker| token.contains(marker))
    })
}

fn push_escaped_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
