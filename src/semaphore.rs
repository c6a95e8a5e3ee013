//! Counting semaphore and mutex.
//!
//! Waiters queue FIFO and are served strictly head-first: the head must be
//! fully satisfiable before any later waiter advances, even one requesting
//! fewer permits. An interrupted waiter is unqueued and the queue drained
//! again, since removing the head may unblock its successors.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::deferred::Deferred;
use crate::effect::Effect;
use crate::value::Value;

struct Waiter {
    id: u64,
    count: u64,
    granted: Deferred,
}

struct SemState {
    permits: u64,
    next_waiter: u64,
    waiters: VecDeque<Waiter>,
}

/// A counting semaphore built on the runtime's cancellation contract.
#[derive(Clone)]
pub struct Semaphore {
    state: Rc<RefCell<SemState>>,
}

impl Semaphore {
    /// Create a semaphore holding `permits` permits.
    #[must_use]
    pub fn new(permits: u64) -> Semaphore {
        Semaphore {
            state: Rc::new(RefCell::new(SemState {
                permits,
                next_waiter: 0,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Currently available permits, read from host code.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.state.borrow().permits
    }

    /// Currently available permits, as an effect.
    pub fn count(&self) -> Effect {
        let state = Rc::clone(&self.state);
        Effect::suspend(move || {
            let permits = state.borrow().permits;
            Effect::of(permits as i64)
        })
    }

    /// Acquire one permit.
    pub fn acquire(&self) -> Effect {
        self.acquire_n(1)
    }

    /// Acquire `count` permits, suspending until they are all available.
    ///
    /// If other fibers are already queued the caller queues behind them
    /// even when enough permits are free; overtaking the head would starve
    /// large requests. Interruption while queued removes the waiter and
    /// leaves the permit count untouched.
    pub fn acquire_n(&self, count: u64) -> Effect {
        let state = Rc::clone(&self.state);
        Effect::from_async(move |switch| {
            let (granted, waiter_id) = {
                let mut sem = state.borrow_mut();
                if sem.waiters.is_empty() && sem.permits >= count {
                    sem.permits -= count;
                    drop(sem);
                    switch.resume(Ok(Value::Unit));
                    return;
                }
                let id = sem.next_waiter;
                sem.next_waiter += 1;
                let granted = Deferred::new();
                sem.waiters.push_back(Waiter {
                    id,
                    count,
                    granted: granted.clone(),
                });
                (granted, id)
            };
            let waker = Rc::clone(&switch);
            let listener = granted.listen(move |_| waker.resume(Ok(Value::Unit)));
            let queue = Rc::clone(&state);
            switch.set_abort(move || {
                granted.unlisten(listener);
                queue.borrow_mut().waiters.retain(|w| w.id != waiter_id);
                drain(&queue);
            });
        })
    }

    /// Release one permit.
    pub fn release(&self) -> Effect {
        self.release_n(1)
    }

    /// Return `count` permits and wake satisfiable waiters from the head.
    pub fn release_n(&self, count: u64) -> Effect {
        let state = Rc::clone(&self.state);
        Effect::suspend(move || {
            state.borrow_mut().permits += count;
            drain(&state);
            Effect::unit()
        })
    }

    /// Non-blocking acquire. Succeeds with `true` and the permits taken,
    /// or `false` with the count unchanged.
    pub fn try_acquire_n(&self, count: u64) -> Effect {
        let state = Rc::clone(&self.state);
        Effect::suspend(move || {
            let mut sem = state.borrow_mut();
            if sem.waiters.is_empty() && sem.permits >= count {
                sem.permits -= count;
                Effect::of(true)
            } else {
                Effect::of(false)
            }
        })
    }

    /// Run `effect` holding `count` permits, returning them on any exit.
    pub fn with_permits(&self, count: u64, effect: Effect) -> Effect {
        let release = self.release_n(count);
        self.acquire_n(count)
            .and_then(move |_| effect.on_exit(release))
    }

    /// Run `effect` holding one permit.
    pub fn with_permit(&self, effect: Effect) -> Effect {
        self.with_permits(1, effect)
    }
}

/// Serve waiters from the head while each can be fully satisfied. Grants
/// fire outside the borrow: a woken fiber may re-enter the semaphore.
fn drain(state: &Rc<RefCell<SemState>>) {
    loop {
        let granted = {
            let mut sem = state.borrow_mut();
            let need = match sem.waiters.front() {
                Some(head) if head.count <= sem.permits => head.count,
                _ => return,
            };
            sem.permits -= need;
            sem.waiters.pop_front().expect("head waiter").granted
        };
        granted.fill_now(Value::Unit);
    }
}

/// Mutual exclusion: a semaphore of exactly one permit.
#[derive(Clone)]
pub struct Mutex {
    sem: Semaphore,
}

impl Mutex {
    /// Create an unlocked mutex.
    #[must_use]
    pub fn new() -> Mutex {
        Mutex {
            sem: Semaphore::new(1),
        }
    }

    /// Whether the mutex is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.sem.available() == 0
    }

    /// Run `effect` holding the lock, releasing it on any exit.
    pub fn with_lock(&self, effect: Effect) -> Effect {
        self.sem.with_permit(effect)
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Mutex::new()
    }
}
