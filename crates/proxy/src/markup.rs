//! Bounded element dumps for diagnostics.

use roxmltree::Node;

/// Render `node` and its element children as indented lines.
///
/// Recursion stops below `max_depth` (a `…` marker replaces the cut subtree)
/// and at most `max_children` children are shown per element, followed by a
/// `… K more children hidden` marker when some were skipped.
pub fn dump_element(node: Node<'_, '_>, max_depth: usize, max_children: usize) -> Vec<String> {
    let mut lines = Vec::new();
    dump_into(node, 0, max_depth, max_children, &mut lines);
    lines
}

fn dump_into(
    node: Node<'_, '_>,
    depth: usize,
    max_depth: usize,
    max_children: usize,
    out: &mut Vec<String>,
) {
    let padding = " ".repeat(depth);
    out.push(format!("{} {}", padding, describe(node)));

    let children: Vec<Node<'_, '_>> = node.children().filter(|n| n.is_element()).collect();
    for child in children.iter().take(max_children) {
        if depth >= max_depth {
            out.push(format!("{}  …", padding));
            break;
        }
        dump_into(*child, depth + 1, max_depth, max_children, out);
    }

    let hidden = children.len().saturating_sub(max_children);
    if hidden > 0 {
        out.push(format!("{}  … {} more children hidden", padding, hidden));
    }
}

fn describe(node: Node<'_, '_>) -> String {
    let attrs: Vec<String> = node
        .attributes()
        .map(|a| format!("{}={:?}", a.name(), a.value()))
        .collect();
    let text = node.text().map(str::trim).filter(|t| !t.is_empty());
    format!(
        "<{}> attrib: {{{}}} text: {}",
        node.tag_name().name(),
        attrs.join(", "),
        text.unwrap_or("-")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumps_attributes_and_text() {
        let doc = roxmltree::Document::parse(r#"<body action="x" r="1">hello</body>"#).unwrap();
        let lines = dump_element(doc.root_element(), 2, 3);
        assert_eq!(lines, vec![r#" <body> attrib: {action="x", r="1"} text: hello"#]);
    }

    #[test]
    fn truncates_breadth() {
        let doc = roxmltree::Document::parse("<r><a/><b/><c/><d/><e/></r>").unwrap();
        let lines = dump_element(doc.root_element(), 2, 3);
        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains("<a>"));
        assert!(lines[3].contains("<c>"));
        assert_eq!(lines[4], "  … 2 more children hidden");
    }

    #[test]
    fn truncates_depth() {
        let doc = roxmltree::Document::parse("<a><b><c><d/></c></b></a>").unwrap();
        let lines = dump_element(doc.root_element(), 1, 3);
        assert_eq!(
            lines,
            vec![
                " <a> attrib: {} text: -".to_string(),
                "  <b> attrib: {} text: -".to_string(),
                "   …".to_string(),
            ]
        );
    }

    #[test]
    fn zero_depth_shows_only_root() {
        let doc = roxmltree::Document::parse("<a><b/><b/></a>").unwrap();
        let lines = dump_element(doc.root_element(), 0, 3);
        assert_eq!(lines, vec![" <a> attrib: {} text: -".to_string(), "  …".to_string()]);
    }
}
