use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde_json::json;
use stencil_core::{BindError, ChangeDetector, EventLoop, shared};

const TICK: Duration = Duration::from_millis(200);

fn counting(detector: &mut ChangeDetector) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    detector.set_on_change(move |scope| sink.borrow_mut().push(scope.borrow().to_string()));
    seen
}

#[test]
fn bind_rejects_non_objects() {
    let lp = EventLoop::new();
    let mut d = ChangeDetector::new(lp);
    let err = d.bind(shared(json!(5))).err();
    assert_eq!(err, Some(BindError::NotAnObject("number")));
    let err = d.bind(shared(json!([1, 2]))).err();
    assert_eq!(err, Some(BindError::NotAnObject("array")));
    assert!(!d.is_bound());
}

#[test]
fn first_poll_notifies_then_only_on_change() {
    let lp = EventLoop::new();
    let mut d = ChangeDetector::new(lp.clone());
    let seen = counting(&mut d);
    let scope = shared(json!({"a": 1}));
    d.bind(scope.clone()).unwrap();

    lp.advance(TICK);
    assert_eq!(seen.borrow().len(), 1);

    lp.advance(TICK * 3);
    assert_eq!(seen.borrow().len(), 1, "unchanged snapshot must not notify");

    scope.borrow_mut()["a"] = json!(2);
    lp.advance(TICK);
    assert_eq!(&*seen.borrow(), &vec![r#"{"a":1}"#.to_string(), r#"{"a":2}"#.to_string()]);
}

#[test]
fn write_without_trigger_is_silent() {
    let lp = EventLoop::new();
    let mut d = ChangeDetector::new(lp.clone());
    let seen = counting(&mut d);
    let scope = shared(json!({"name": "a"}));
    d.bind(scope.clone()).unwrap().mark_clean().unwrap();

    d.set_data_without_trigger(&json!({"name": "b", "extra": true})).unwrap();
    lp.advance(TICK * 2);
    assert!(seen.borrow().is_empty());
    assert_eq!(*scope.borrow(), json!({"name": "b", "extra": true}));

    // identical content is a no-op as well
    d.set_data_without_trigger(&json!({"name": "b"})).unwrap();
    lp.advance(TICK);
    assert!(seen.borrow().is_empty());
}

#[test]
fn write_before_bind_is_a_state_error() {
    let mut d = ChangeDetector::new(EventLoop::new());
    let err = d.set_data_without_trigger(&json!({"x": 1})).err();
    assert_eq!(err, Some(BindError::Unbound));
}

#[test]
fn reverting_before_the_poll_is_invisible() {
    let lp = EventLoop::new();
    let mut d = ChangeDetector::new(lp.clone());
    let seen = counting(&mut d);
    let scope = shared(json!({"n": 1}));
    d.bind(scope.clone()).unwrap().mark_clean().unwrap();

    scope.borrow_mut()["n"] = json!(2);
    lp.advance(Duration::from_millis(50));
    scope.borrow_mut()["n"] = json!(1);
    lp.advance(TICK);
    assert!(seen.borrow().is_empty());
}

#[test]
fn rebinding_cancels_previous_poll() {
    let lp = EventLoop::new();
    let mut d = ChangeDetector::new(lp.clone());
    let seen = counting(&mut d);
    let first = shared(json!({"v": "first"}));
    let second = shared(json!({"v": "second"}));
    d.bind(first.clone()).unwrap();
    d.bind(second.clone()).unwrap();
    assert_eq!(lp.pending(), 1);

    first.borrow_mut()["v"] = json!("changed");
    lp.advance(TICK);
    assert_eq!(&*seen.borrow(), &vec![r#"{"v":"second"}"#.to_string()]);
}

#[test]
fn subscriber_is_replaced_not_accumulated() {
    let lp = EventLoop::new();
    let mut d = ChangeDetector::new(lp.clone());
    let old = counting(&mut d);
    let new = counting(&mut d);
    d.bind(shared(json!({}))).unwrap();
    lp.advance(TICK);
    assert!(old.borrow().is_empty());
    assert_eq!(new.borrow().len(), 1);
}

#[test]
fn disposing_the_subscription_stops_polling() {
    let lp = EventLoop::new();
    let mut d = ChangeDetector::new(lp.clone());
    let seen = counting(&mut d);
    let scope = shared(json!({"n": 0}));
    d.bind(scope.clone()).unwrap().mark_clean().unwrap();
    let sub = d.subscription();
    assert!(sub.is_active());

    sub.dispose();
    assert!(!d.is_polling());
    scope.borrow_mut()["n"] = json!(1);
    lp.advance(TICK * 5);
    assert!(seen.borrow().is_empty());
    assert_eq!(lp.pending(), 0);
}

#[test]
fn stale_subscription_does_not_cancel_a_rebind() {
    let lp = EventLoop::new();
    let mut d = ChangeDetector::new(lp.clone());
    d.bind(shared(json!({}))).unwrap();
    let stale = d.subscription();
    d.bind(shared(json!({"b": 1}))).unwrap();
    drop(stale);
    assert!(d.is_polling());
}

#[test]
fn dropping_the_detector_clears_its_timer() {
    let lp = EventLoop::new();
    {
        let mut d = ChangeDetector::new(lp.clone());
        d.bind(shared(json!({}))).unwrap();
        assert_eq!(lp.pending(), 1);
    }
    assert_eq!(lp.pending(), 0);
}

#[test]
fn change_seen_while_the_subscriber_runs_is_not_lost() {
    let lp = EventLoop::new();
    let detector = Rc::new(RefCell::new(ChangeDetector::new(lp.clone())));
    let scope = shared(json!({"n": 0}));
    detector.borrow_mut().bind(scope.clone()).unwrap().mark_clean().unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let nested = Rc::new(RefCell::new(Vec::new()));
    {
        let weak = Rc::downgrade(&detector);
        let seen = seen.clone();
        let nested = nested.clone();
        detector.borrow_mut().set_on_change(move |scope| {
            let n = scope.borrow()["n"].clone();
            seen.borrow_mut().push(n.clone());
            if n == json!(1) {
                scope.borrow_mut()["n"] = json!(2);
                if let Some(d) = weak.upgrade() {
                    nested.borrow_mut().push(d.borrow().check());
                }
            }
        });
    }

    scope.borrow_mut()["n"] = json!(1);
    lp.advance(TICK);
    assert_eq!(&*nested.borrow(), &vec![false]);
    assert_eq!(&*seen.borrow(), &vec![json!(1)]);

    lp.advance(TICK);
    assert_eq!(&*seen.borrow(), &vec![json!(1), json!(2)]);
    assert_eq!(detector.borrow().snapshot().as_deref(), Some(r#"{"n":2}"#));
}
