use std::rc::Rc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use stencil_core::{SharedScope, shared};
use stencil_dom::{Document, Dom, Event, NodeId};
use stencil_expr::Functions;
use stencil_template::{
    CompileError, Compiler, CompilerConfig, RenderCause, compile_str, parse_markup,
};

fn fns() -> Rc<Functions> {
    Rc::new(Functions::with_builtins())
}

fn render(src: &str, scope: Value) -> String {
    let mut doc = Document::new();
    let builder = compile_str(src).expect("compile");
    let frag = builder.build(&mut doc, &shared(scope), &fns()).expect("build");
    doc.inner_html(frag)
}

fn build_into(doc: &mut Document, src: &str, scope: &SharedScope) -> NodeId {
    let frag = compile_str(src).expect("compile").build(doc, scope, &fns()).expect("build");
    let root = doc.root();
    doc.append_child(root, frag).unwrap();
    frag
}

#[test]
fn guarded_element_renders_only_when_truthy() {
    let src = r#"<div *if="show"><span>{{name}}</span></div>"#;
    assert_eq!(render(src, json!({"show": true, "name": "A"})), "<div><span>A</span></div>");

    let mut doc = Document::new();
    let builder = compile_str(src).unwrap();
    let frag = builder
        .build(&mut doc, &shared(json!({"show": false, "name": "A"})), &fns())
        .unwrap();
    assert_eq!(doc.query_selector(frag, "div").unwrap(), None);
    assert!(doc.children(frag).is_empty());
}

#[test]
fn iteration_repeats_in_source_order() {
    let src = r#"<ul><li *for="item of items" class="row">${item}</li></ul>"#;
    assert_eq!(
        render(src, json!({"items": ["a", "b", "c"]})),
        r#"<ul><li class="row">a</li><li class="row">b</li><li class="row">c</li></ul>"#
    );
    assert_eq!(render(src, json!({"items": []})), "<ul></ul>");
}

#[test]
fn guard_is_checked_before_iterating() {
    // with the guard false the null iterable is never touched
    let src = r#"<p *for="x of xs" *if="ready">${x}</p>"#;
    assert_eq!(render(src, json!({"ready": false, "xs": null})), "");
    assert_eq!(render(src, json!({"ready": true, "xs": [1, 2]})), "<p>1</p><p>2</p>");
}

#[test]
fn indexed_and_nested_loops_see_outer_locals() {
    let src = r#"<div *for="(row, i) of rows"><b *for="cell of row">${i}:${cell}</b></div>"#;
    assert_eq!(
        render(src, json!({"rows": [["a"], ["b", "c"]]})),
        "<div><b>0:a</b></div><div><b>1:b</b><b>1:c</b></div>"
    );
}

#[test]
fn compiling_twice_gives_identical_builders() {
    let src = r#"<section id="s"><h1>${title}</h1><p *for="p of paras">${p}</p></section>"#;
    let a = compile_str(src).unwrap();
    let b = compile_str(src).unwrap();
    assert_eq!(a, b);

    let scope = json!({"title": "T", "paras": ["x", "y"]});
    let mut doc = Document::new();
    let fa = a.build(&mut doc, &shared(scope.clone()), &fns()).unwrap();
    let fb = b.build(&mut doc, &shared(scope), &fns()).unwrap();
    assert_ne!(fa, fb);
    assert_eq!(doc.inner_html(fa), doc.inner_html(fb));
}

#[test]
fn render_errors_carry_the_construction_path() {
    let src = r#"<div class="card"><p><span title="${user.name}">x</span></p></div>"#;
    let mut doc = Document::new();
    let err = compile_str(src)
        .unwrap()
        .build(&mut doc, &shared(json!({"user": null})), &fns())
        .unwrap_err();
    assert_eq!(
        err.path,
        r#"(root) > DIV class="card" > P > SPAN title="${user.name}""#
    );
    assert_eq!(
        err.to_string(),
        r#"Error in (root) > DIV class="card" > P > SPAN title="${user.name}": cannot read property 'name' of null"#
    );
    // the partial fragment was thrown away
    assert_eq!(doc.len(), 1);
}

#[test]
fn text_failures_point_at_the_text_node() {
    let mut doc = Document::new();
    let err = compile_str("<p>${missing}</p>")
        .unwrap()
        .build(&mut doc, &shared(json!({})), &fns())
        .unwrap_err();
    assert_eq!(err.path, "(root) > P > (text)");
    assert!(matches!(err.cause, RenderCause::Eval(_)));
}

#[test]
fn handlers_write_to_the_scope() {
    let scope = shared(json!({"count": 0, "items": ["a", "b"], "picked": null}));
    let mut doc = Document::new();
    let src = r#"<div><button onclick="count += 1; last = e.type">+</button><i *for="(item, i) of items" onclick="picked = item + i">${item}</i></div>"#;
    let frag = build_into(&mut doc, src, &scope);

    let button = doc.query_selector(frag, "button").unwrap().unwrap();
    doc.dispatch(button, Event::new("click")).unwrap();
    doc.dispatch(button, Event::new("click")).unwrap();
    assert_eq!(scope.borrow()["count"], json!(2));
    assert_eq!(scope.borrow()["last"], json!("click"));

    let second = doc.children(doc.first_child(frag).unwrap())[2];
    doc.dispatch(second, Event::new("click")).unwrap();
    assert_eq!(scope.borrow()["picked"], json!("b1"));
}

#[test]
fn loop_item_handlers_update_the_scope_element() {
    let scope = shared(json!({"todos": [
        {"done": false, "tags": ["a"]},
        {"done": false, "tags": []}
    ]}));
    let mut doc = Document::new();
    let src = r#"<ul><li *for="todo of todos" onclick="todo.done = !todo.done"><b *for="tag of todo.tags" onclick="tag = 'local'; todo.tags[0] = tag + '!'">${tag}</b></li></ul>"#;
    let frag = build_into(&mut doc, src, &scope);

    let first = doc.query_selector(frag, "li").unwrap().unwrap();
    doc.dispatch(first, Event::new("click")).unwrap();
    assert_eq!(scope.borrow()["todos"][0]["done"], json!(true));
    assert_eq!(scope.borrow()["todos"][1]["done"], json!(false));

    // the listener reads the live element, so a second click toggles back
    doc.dispatch(first, Event::new("click")).unwrap();
    assert_eq!(scope.borrow()["todos"][0]["done"], json!(false));

    let tag = doc.query_selector(frag, "b").unwrap().unwrap();
    doc.dispatch(tag, Event::new("click")).unwrap();
    assert_eq!(scope.borrow()["todos"][0]["tags"], json!(["local!"]));
}

#[test]
fn handler_failures_name_the_element() {
    let scope = shared(json!({}));
    let mut doc = Document::new();
    let frag = build_into(&mut doc, r#"<a onclick="nope()">x</a>"#, &scope);
    let a = doc.first_child(frag).unwrap();
    let err = doc.dispatch(a, Event::new("click")).unwrap_err();
    assert!(err.to_string().contains(r#"Error in (root) > A onclick="nope()""#), "{err}");
}

#[test]
fn script_locals_reach_following_siblings_only() {
    let src = r#"<div><script>let greeting = 'hi ' + name; seen = true</script><p>${greeting}</p></div>"#;
    let scope = shared(json!({"name": "bo"}));
    let mut doc = Document::new();
    let frag = build_into(&mut doc, src, &scope);
    assert_eq!(doc.inner_html(frag), "<div><p>hi bo</p></div>");
    assert_eq!(scope.borrow()["seen"], json!(true));

    let leak = format!("{src}<span>${{greeting}}</span>");
    let err = compile_str(&leak)
        .unwrap()
        .build(&mut doc, &shared(json!({"name": "bo"})), &fns())
        .unwrap_err();
    assert_eq!(err.to_string(), "Error in (root) > SPAN > (text): greeting is not defined");
}

#[test]
fn customized_elements_keep_their_tag() {
    assert_eq!(
        render(r#"<button is="fancy-button" type="button">go</button>"#, json!({})),
        r#"<button is="fancy-button" type="button">go</button>"#
    );
}

#[test]
fn template_wrapper_children_are_the_roots() {
    assert_eq!(
        render("<template>\n  <p>a</p><p>b</p>\n</template>", json!({})),
        "\n  <p>a</p><p>b</p>\n"
    );
}

#[test]
fn prefix_is_configurable_and_unknown_directives_are_ignored() {
    let compiler = Compiler::new(CompilerConfig::default().with_attr_prefix("x-"));
    let builder = compiler
        .compile_str(r#"<p x-if="false">hidden</p><p x-bogus="1" *if="false">shown</p>"#)
        .unwrap();
    let mut doc = Document::new();
    let frag = builder.build(&mut doc, &shared(json!({})), &fns()).unwrap();
    assert_eq!(doc.inner_html(frag), r#"<p *if="false">shown</p>"#);
}

#[test]
fn bad_expressions_fail_at_compile_time() {
    let err = compile_str(r#"<main><p *if="a +">x</p></main>"#).unwrap_err();
    match err {
        CompileError::Expression { path, .. } => {
            assert_eq!(path, r#"(root) > MAIN > P *if="a +""#)
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(compile_str("<p>"), Err(CompileError::Markup(_))));
}

#[test]
fn busy_scope_is_reported() {
    let scope = shared(json!({}));
    let _guard = scope.borrow_mut();
    let mut doc = Document::new();
    let err = compile_str("<p></p>").unwrap().build(&mut doc, &scope, &fns()).unwrap_err();
    assert_eq!(err.cause, RenderCause::ScopeBusy);
}

#[test]
fn compiling_does_not_touch_the_markup() {
    let nodes = parse_markup(r#"<p *if="x" onclick="y = 1">t</p>"#).unwrap();
    let before = nodes.clone();
    let _ = Compiler::default().compile(&nodes).unwrap();
    assert_eq!(nodes, before);
}
