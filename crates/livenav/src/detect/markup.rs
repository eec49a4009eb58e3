//! Structural markup signals: generator meta tag, script sources and
//! framework DOM attributes.

use scraper::{Html, Selector};

/// Collect technology labels from rendered markup, in discovery order and
/// without duplicates.
///
/// Parsing is lenient; malformed markup yields whatever the parser recovers.
pub fn scan_markup_signals(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut labels: Vec<String> = Vec::new();
    let mut push = |label: String| {
        if !labels.contains(&label) {
            labels.push(label);
        }
    };

    if let Ok(sel) = Selector::parse(r#"meta[name="generator"]"#) {
        if let Some(content) = document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("content"))
            .filter(|c| !c.is_empty())
        {
            push(format!("Generator: {content}"));
        }
    }

    if let Ok(sel) = Selector::parse("script[src]") {
        for el in document.select(&sel) {
            let src = el.value().attr("src").unwrap_or("").to_lowercase();
            if let Some(label) = script_source_label(&src) {
                push(label.to_string());
            }
        }
    }

    let mut react_root = false;
    let mut ng_attr = false;
    let mut v_attr = false;
    let mut data_vue = false;
    for node in document.tree.nodes() {
        let Some(element) = node.value().as_element() else {
            continue;
        };
        for (name, _) in element.attrs() {
            match name {
                "data-reactroot" => react_root = true,
                "data-vue" => data_vue = true,
                n if n.starts_with("ng-") => ng_attr = true,
                n if n.starts_with("v-") => v_attr = true,
                _ => {}
            }
        }
    }

    if react_root {
        push("React (data-reactroot)".to_string());
    }
    if ng_attr {
        push("Angular (ng-*)".to_string());
    }
    if v_attr {
        push("Vue.js (v-*)".to_string());
    }
    if data_vue {
        push("Vue.js (data-vue)".to_string());
    }

    labels
}

/// First framework named in a lowercased script source.
fn script_source_label(src: &str) -> Option<&'static str> {
    if src.contains("react") {
        Some("React (via script)")
    } else if src.contains("angular") {
        Some("Angular (via script)")
    } else if src.contains("vue") {
        Some("Vue.js (via script)")
    } else if src.contains("jquery") {
        Some("jQuery (via script)")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_meta() {
        let html = r#"<html><head><meta name="generator" content="WordPress 6.4"></head></html>"#;
        assert_eq!(scan_markup_signals(html), vec!["Generator: WordPress 6.4"]);
    }

    #[test]
    fn test_script_sources_first_match_wins() {
        let html = r#"<html><head>
            <script src="/static/React-Vue-bundle.js"></script>
            <script src="https://cdn.example.com/jquery.min.js"></script>
            <script src="/static/jquery-ui.js"></script>
            <script>inline()</script>
        </head></html>"#;
        assert_eq!(
            scan_markup_signals(html),
            vec!["React (via script)", "jQuery (via script)"]
        );
    }

    #[test]
    fn test_framework_attributes() {
        let html = r#"<html><body>
            <div data-reactroot=""></div>
            <div ng-app="demo"></div>
            <li v-for="item in items"></li>
            <section data-vue="1"></section>
        </body></html>"#;
        assert_eq!(
            scan_markup_signals(html),
            vec![
                "React (data-reactroot)",
                "Angular (ng-*)",
                "Vue.js (v-*)",
                "Vue.js (data-vue)"
            ]
        );
    }

    #[test]
    fn test_plain_and_malformed_markup() {
        assert!(scan_markup_signals("<html><body><p>hi</p></body></html>").is_empty());
        assert!(scan_markup_signals("<div <<< data-x='").is_empty());
        assert!(scan_markup_signals("").is_empty());
    }
}
