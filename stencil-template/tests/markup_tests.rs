use pretty_assertions::assert_eq;
use stencil_dom::{Document, Dom};
use stencil_template::{
    Attr, MarkupError, MarkupNode, append_to_dom, find_element, from_dom, parse_markup,
    template_roots, text_content,
};

#[test]
fn parses_nested_elements_and_attribute_forms() {
    let nodes = parse_markup(r#"<div id=main *for="x of xs" hidden><input type=text/>hi</div>"#)
        .unwrap();
    assert_eq!(
        nodes,
        vec![MarkupNode::element(
            "div",
            vec![
                Attr::new("id", "main"),
                Attr::new("*for", "x of xs"),
                Attr::new("hidden", ""),
            ],
            vec![
                MarkupNode::element("input", vec![Attr::new("type", "text/")], vec![]),
                MarkupNode::text("hi"),
            ],
        )]
    );
}

#[test]
fn void_and_self_closing_elements_take_no_children() {
    let nodes = parse_markup("<p>a<br>b<img src='x.png' /></p>").unwrap();
    let p = &nodes[0];
    assert_eq!(p.children().len(), 4);
    assert_eq!(p.children()[1].tag(), Some("br"));
    assert_eq!(p.children()[3].attr("src"), Some("x.png"));
}

#[test]
fn raw_text_bodies_are_not_parsed() {
    let nodes = parse_markup("<script>if (a < b) { x = '</p>' }</SCRIPT><p>ok</p>").unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(text_content(&nodes[0]), "if (a < b) { x = '</p>' }");
}

#[test]
fn comments_doctype_and_entities() {
    let nodes = parse_markup("<!DOCTYPE html><!-- note --><p title=\"a&quot;b\">x &amp; y</p>")
        .unwrap();
    assert_eq!(nodes[0], MarkupNode::Comment(" note ".into()));
    assert_eq!(nodes[1].attr("title"), Some("a\"b"));
    assert_eq!(text_content(&nodes[1]), "x & y");
}

#[test]
fn whitespace_is_dropped_only_at_the_root() {
    let nodes = parse_markup("\n  <ul>\n    <li>a</li>\n  </ul>\n").unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].children().len(), 3);
    assert!(nodes[0].children()[0].is_blank_text());
}

#[test]
fn structural_errors_report_offsets() {
    assert_eq!(
        parse_markup("<div><span></div>"),
        Err(MarkupError::MismatchedClose {
            expected: "span".into(),
            found: "div".into(),
            offset: 11,
        })
    );
    assert_eq!(
        parse_markup("text</p>"),
        Err(MarkupError::UnexpectedClose {
            tag: "p".into(),
            offset: 4,
        })
    );
    assert_eq!(
        parse_markup("<a><b></b>"),
        Err(MarkupError::Unclosed {
            tag: "a".into(),
            offset: 0,
        })
    );
    assert!(matches!(
        parse_markup("<!-- open"),
        Err(MarkupError::Unterminated { what: "comment", .. })
    ));
}

#[test]
fn template_wrapper_and_lookup_helpers() {
    let nodes = parse_markup("<!-- c --> <template><h1>T</h1><p><b>x</b></p></template>").unwrap();
    let roots = template_roots(&nodes);
    assert_eq!(roots.len(), 2);
    assert_eq!(find_element(roots, "b").map(text_content).as_deref(), Some("x"));
    assert!(find_element(roots, "table").is_none());

    let plain = parse_markup("<p>a</p><p>b</p>").unwrap();
    assert_eq!(template_roots(&plain).len(), 2);
}

#[test]
fn markup_survives_a_trip_through_the_document() {
    let nodes = parse_markup(r#"<form><button is="x-btn" onclick="go()">Go</button></form>"#)
        .unwrap();
    let mut doc = Document::new();
    let root = doc.root();
    append_to_dom(&mut doc, root, &nodes).unwrap();
    let form = doc.first_child(root).unwrap();
    assert_eq!(from_dom(&doc, form), nodes[0]);
}
