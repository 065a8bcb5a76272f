use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use stencil_core::EventLoop;
use stencil_runtime::{Context, ElementRegistry, ErrorKind, Page, TemplateElement};

const TICK: Duration = Duration::from_millis(200);

const COUNTER: &str = r#"<h1>Counter</h1><st-tpl id="counter" observe="state"><template><button onclick="count += 1">+</button><span>${count}</span></template></st-tpl>"#;

fn new_page() -> (Page, EventLoop) {
    let lp = EventLoop::new();
    (Page::new(Context::new(lp.clone())), lp)
}

#[test]
fn elements_connect_on_ready_and_follow_their_global() {
    let (page, _lp) = new_page();
    let state = page.context().set_global("state", json!({"count": 0}));
    page.load(COUNTER).unwrap();

    assert!(page.html().contains("<template>"), "setup waits for ready");
    assert_eq!(page.context().mounted_count(), 0);

    page.ready().unwrap();
    assert_eq!(
        page.html(),
        r#"<h1>Counter</h1><st-tpl id="counter" observe="state"><div><button>+</button><span>0</span></div></st-tpl>"#
    );
    assert!(page.context().with_mounted(|els| els[0].is_observing()));

    assert_eq!(page.dispatch("#counter button", "click").unwrap(), 1);
    assert_eq!(state.borrow()["count"], json!(1));
    page.advance(TICK);
    assert!(page.html().contains("<span>1</span>"));

    state.borrow_mut()["count"] = json!(10);
    page.advance(TICK);
    assert!(page.html().contains("<span>10</span>"));
}

#[test]
fn markup_loaded_after_ready_connects_at_once() {
    let (page, _lp) = new_page();
    page.context().set_global("state", json!({"count": 3}));
    page.ready().unwrap();
    page.load(COUNTER).unwrap();
    assert!(page.html().contains("<span>3</span>"));
    assert_eq!(page.context().mounted_count(), 1);
}

#[test]
fn missing_template_names_the_element() {
    let (page, _lp) = new_page();
    page.load(r#"<st-tpl id="broken"><p>no</p></st-tpl>"#).unwrap();
    let err = page.ready().unwrap_err();
    assert_eq!(err.to_string(), "<st-tpl#broken> requires <template> child");
    assert_eq!(err.kind(), ErrorKind::Lookup);
    assert_eq!(page.context().mounted_count(), 0);
}

#[test]
fn observed_values_must_be_objects() {
    let (page, _lp) = new_page();
    page.context().set_global("count", json!(3));
    page.load(r#"<st-tpl observe="count"><template><p></p></template></st-tpl>"#)
        .unwrap();
    let err = page.ready().unwrap_err();
    assert_eq!(
        err.to_string(),
        "observed variable 'count' is typeof number but object required"
    );
    assert_eq!(err.kind(), ErrorKind::Type);

    let (page, _lp) = new_page();
    page.load(r#"<st-tpl observe="[1, 2]"><template><p></p></template></st-tpl>"#)
        .unwrap();
    let err = page.ready().unwrap_err();
    assert_eq!(
        err.to_string(),
        "observed variable '[1, 2]' is typeof array but object required"
    );
}

#[test]
fn scope_and_bind_render_once() {
    let (page, lp) = new_page();
    let state = page.context().set_global("state", json!({"title": "Hi"}));
    page.load(r#"<st-tpl id="a" scope="{title: 'Hello'}"><template><h2>${title}</h2></template></st-tpl><st-tpl id="b" bind="state"><template><h3>${title}</h3></template></st-tpl>"#)
        .unwrap();
    page.ready().unwrap();
    assert!(page.html().contains("<h2>Hello</h2>"));
    assert!(page.html().contains("<h3>Hi</h3>"));
    assert!(page.context().with_mounted(|els| els.iter().all(|e| !e.is_observing())));

    state.borrow_mut()["title"] = json!("changed");
    page.advance(TICK * 2);
    assert!(page.html().contains("<h3>Hi</h3>"));
    assert_eq!(lp.pending(), 0);
}

#[test]
fn observe_expressions_get_their_own_scope() {
    let (page, _lp) = new_page();
    page.load(r#"<st-tpl observe="{n: 1 + 1, items: range(3)}"><template><i *for="x of items">${x * n}</i></template></st-tpl>"#)
        .unwrap();
    page.ready().unwrap();
    assert!(page.html().contains("<div><i>0</i><i>2</i><i>4</i></div>"), "{}", page.html());
    assert!(page.context().with_mounted(|els| els[0].is_observing()));
}

#[test]
fn registry_is_injectable_and_template_content_is_skipped() {
    let probes = Rc::new(Cell::new(0));
    let seen = probes.clone();
    let mut registry = ElementRegistry::new();
    registry
        .define("X-View", TemplateElement::upgrade)
        .define("x-probe", move |_, _| {
            seen.set(seen.get() + 1);
            Ok(())
        });
    assert!(registry.contains("x-view"));
    assert!(!registry.contains("st-tpl"));

    let lp = EventLoop::new();
    let page = Page::new(Context::new(lp).with_registry(registry));
    page.load(r#"<x-view scope="{}"><template><x-probe></x-probe></template></x-view><st-tpl></st-tpl><x-probe></x-probe>"#)
        .unwrap();
    assert_eq!(probes.get(), 1);

    page.ready().unwrap();
    assert_eq!(
        page.html(),
        "<x-view scope=\"{}\"><div><x-probe></x-probe></div></x-view><st-tpl></st-tpl><x-probe></x-probe>"
    );
    assert_eq!(probes.get(), 1);
}

#[test]
fn dropping_the_page_stops_polling() {
    let (page, lp) = new_page();
    page.context().set_global("state", json!({"count": 0}));
    page.load(COUNTER).unwrap();
    page.ready().unwrap();
    assert_eq!(lp.pending(), 1);
    drop(page);
    assert_eq!(lp.pending(), 0);
}

#[test]
fn ready_hooks_may_register_further_hooks() {
    let runs = Rc::new(Cell::new(0));
    let seen = runs.clone();
    let mut registry = ElementRegistry::new();
    registry.define("x-late", move |ctx, _| {
        let weak = Rc::downgrade(ctx);
        let seen = seen.clone();
        ctx.on_ready(move || {
            let Some(ctx) = weak.upgrade() else {
                return Ok(());
            };
            ctx.on_ready(move || {
                seen.set(seen.get() + 1);
                Ok(())
            })
        })
    });

    let page = Page::new(Context::new(EventLoop::new()).with_registry(registry));
    page.load("<x-late></x-late><x-late></x-late>").unwrap();
    assert_eq!(runs.get(), 0);
    page.ready().unwrap();
    assert_eq!(runs.get(), 2);
    assert!(page.context().is_ready());
}
