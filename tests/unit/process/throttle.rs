use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn zero_capacity_is_rejected() {
    assert!(Throttle::new(0).is_err());
}

#[test]
fn never_more_than_capacity_holders() {
    let throttle = Throttle::new(3).unwrap();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    std::thread::scope(|scope| {
        for _ in 0..16 {
            let throttle = throttle.clone();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            scope.spawn(move || {
                for _ in 0..5 {
                    throttle.run(|| {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(2));
                        current.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });
        }
    });

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 1);
    assert_eq!(throttle.in_use(), 0);
}

#[test]
fn slot_is_released_when_the_operation_panics() {
    let throttle = Throttle::new(1).unwrap();
    let t = throttle.clone();
    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _: () = t.run(|| panic!("boom"));
    }));
    assert!(res.is_err());
    assert_eq!(throttle.in_use(), 0);
    let permit = throttle.try_acquire();
    assert!(permit.is_some());
}

#[test]
fn try_acquire_respects_capacity() {
    let throttle = Throttle::new(2).unwrap();
    let a = throttle.try_acquire().unwrap();
    let _b = throttle.try_acquire().unwrap();
    assert!(throttle.try_acquire().is_none());
    drop(a);
    assert!(throttle.try_acquire().is_some());
}

#[test]
fn blocked_acquire_wakes_on_release() {
    let throttle = Throttle::new(1).unwrap();
    let held = throttle.acquire();
    let t = throttle.clone();
    let waiter = std::thread::spawn(move || {
        let _p = t.acquire();
        7
    });
    std::thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished());
    drop(held);
    assert_eq!(waiter.join().unwrap(), 7);
}
