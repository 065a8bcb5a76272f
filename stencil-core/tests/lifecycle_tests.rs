use std::cell::RefCell;
use std::rc::Rc;

use stencil_core::Lifecycle;

#[test]
fn hooks_wait_for_ready_and_run_in_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut lc: Lifecycle<String> = Lifecycle::new();
    for n in 1..=3 {
        let log = log.clone();
        lc.on_ready(move || {
            log.borrow_mut().push(n);
            Ok(())
        })
        .unwrap();
    }
    assert!(log.borrow().is_empty());
    lc.ready().unwrap();
    assert_eq!(&*log.borrow(), &vec![1, 2, 3]);

    // late registrations run straight away
    let late = log.clone();
    lc.on_ready(move || {
        late.borrow_mut().push(4);
        Ok(())
    })
    .unwrap();
    assert_eq!(log.borrow().last(), Some(&4));
}

#[test]
fn failing_hook_stops_the_run() {
    let ran = Rc::new(RefCell::new(false));
    let mut lc: Lifecycle<&'static str> = Lifecycle::new();
    lc.on_ready(|| Err("boom")).unwrap();
    let r = ran.clone();
    lc.on_ready(move || {
        *r.borrow_mut() = true;
        Ok(())
    })
    .unwrap();

    assert_eq!(lc.ready(), Err("boom"));
    assert!(!*ran.borrow());
    assert_eq!(lc.pending(), 1);
    lc.ready().unwrap();
    assert!(*ran.borrow());
}

#[test]
fn hooks_taken_out_can_be_requeued() {
    let ran = Rc::new(RefCell::new(Vec::new()));
    let mut lc: Lifecycle<&'static str> = Lifecycle::new();
    for n in 1..=3 {
        let ran = ran.clone();
        lc.on_ready(move || {
            ran.borrow_mut().push(n);
            if n == 2 { Err("second") } else { Ok(()) }
        })
        .unwrap();
    }

    let mut queued = lc.take_ready().into_iter();
    assert!(lc.is_ready());
    assert_eq!(lc.pending(), 0);
    assert!(lc.defer(Box::new(|| Ok(()))).is_some(), "late hooks are handed back");

    let mut failure = None;
    while let Some(hook) = queued.next() {
        if let Err(e) = hook() {
            failure = Some(e);
            lc.requeue(queued);
            break;
        }
    }
    assert_eq!(failure, Some("second"));
    assert_eq!(&*ran.borrow(), &vec![1, 2]);
    assert_eq!(lc.pending(), 1);

    lc.ready().unwrap();
    assert_eq!(&*ran.borrow(), &vec![1, 2, 3]);
}
