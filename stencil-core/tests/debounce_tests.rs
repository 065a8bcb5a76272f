use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use stencil_core::{Debouncer, EventLoop};

#[test]
fn burst_collapses_into_one_call() {
    let lp = EventLoop::new();
    let calls = Rc::new(Cell::new(0));
    let c = calls.clone();
    let mut d = Debouncer::new(lp.clone(), move || c.set(c.get() + 1));

    for _ in 0..5 {
        d.debounce();
        lp.advance(Duration::from_millis(100));
    }
    assert_eq!(calls.get(), 0);
    lp.advance(Duration::from_millis(300));
    assert_eq!(calls.get(), 1);
}

#[test]
fn trigger_fires_now_and_drops_pending() {
    let lp = EventLoop::new();
    let calls = Rc::new(Cell::new(0));
    let c = calls.clone();
    let mut d = Debouncer::with_timeout(lp.clone(), Duration::from_millis(50), move || {
        c.set(c.get() + 1)
    });
    d.debounce();
    d.trigger();
    assert_eq!(calls.get(), 1);
    lp.advance(Duration::from_secs(1));
    assert_eq!(calls.get(), 1);
}
