use std::cell::Cell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use stencil_dom::{Document, Dom, DomError, Event, ListenerResult};

fn sample() -> (Document, stencil_dom::NodeId) {
    let mut doc = Document::new();
    let root = doc.root();
    let app = doc.create_element("div", None);
    doc.set_attribute(app, "id", "app").unwrap();
    doc.set_attribute(app, "class", "shell dark").unwrap();
    doc.append_child(root, app).unwrap();

    let list = doc.create_element("ul", None);
    doc.append_child(app, list).unwrap();
    for (i, label) in ["one", "two"].iter().enumerate() {
        let li = doc.create_element("li", None);
        doc.set_attribute(li, "data-idx", &i.to_string()).unwrap();
        let t = doc.create_text(label);
        doc.append_child(li, t).unwrap();
        doc.append_child(list, li).unwrap();
    }
    (doc, app)
}

#[test]
fn query_selector_finds_first_match_in_document_order() {
    let (doc, app) = sample();
    let root = doc.root();
    assert_eq!(doc.query_selector(root, "#app").unwrap(), Some(app));
    assert_eq!(doc.query_selector(root, "div.dark.shell").unwrap(), Some(app));

    let li = doc.query_selector(root, "ul li").unwrap().unwrap();
    assert_eq!(doc.text_content(li), "one");

    let second = doc.query_selector(root, "li[data-idx=\"1\"]").unwrap().unwrap();
    assert_eq!(doc.text_content(second), "two");

    assert_eq!(doc.query_selector(root, "span, li").unwrap(), Some(li));
    assert_eq!(doc.query_selector(root, ".missing").unwrap(), None);
    assert_eq!(doc.query_selector_all(root, "li").unwrap().len(), 2);
}

#[test]
fn query_selector_searches_descendants_only() {
    let (doc, app) = sample();
    assert_eq!(doc.query_selector(app, "div").unwrap(), None);
}

#[test]
fn invalid_selector_is_reported() {
    let (doc, _) = sample();
    let err = doc.query_selector(doc.root(), "div > li").unwrap_err();
    assert!(matches!(err, DomError::InvalidSelector { .. }));
}

#[test]
fn replace_child_swaps_in_place() {
    let (mut doc, app) = sample();
    let old = doc.first_child(app).unwrap();
    let fresh = doc.create_element("p", None);
    doc.replace_child(app, fresh, old).unwrap();
    assert_eq!(doc.children(app), vec![fresh]);
    assert_eq!(doc.parent(old), None);
    assert_eq!(
        doc.replace_child(app, fresh, old),
        Err(DomError::NotAChild { parent: app, child: old })
    );
}

#[test]
fn html_serialization() {
    let (mut doc, app) = sample();
    let input = doc.create_element("input", Some("fancy-input"));
    doc.set_attribute(input, "value", "a \"quoted\" <b>").unwrap();
    doc.append_child(app, input).unwrap();
    assert_eq!(
        doc.outer_html(app),
        concat!(
            r#"<div id="app" class="shell dark"><ul><li data-idx="0">one</li><li data-idx="1">two</li></ul>"#,
            r#"<input is="fancy-input" value="a &quot;quoted&quot; &lt;b&gt;"></div>"#
        )
    );
    assert_eq!(doc.inner_html(doc.root()), doc.outer_html(app));
}

#[test]
fn dispatch_runs_listeners_in_order_and_reports_failures() {
    let (mut doc, app) = sample();
    let hits = Rc::new(Cell::new(0));
    let h = hits.clone();
    doc.add_listener(
        app,
        "click",
        Rc::new(move |ev: &Event| -> ListenerResult {
            assert_eq!(ev.target, Some(app));
            h.set(h.get() + 1);
            Ok(())
        }),
    )
    .unwrap();
    assert_eq!(doc.dispatch(app, Event::new("click")).unwrap(), 1);
    assert_eq!(doc.dispatch(app, Event::new("keyup")).unwrap(), 0);
    assert_eq!(hits.get(), 1);

    doc.add_listener(app, "click", Rc::new(|_: &Event| -> ListenerResult { Err("nope".into()) }))
        .unwrap();
    let err = doc.dispatch(app, Event::new("click")).unwrap_err();
    assert_eq!(
        err,
        DomError::Listener {
            event: "click".into(),
            message: "nope".into()
        }
    );
    assert_eq!(hits.get(), 2);
}
