//! Observer registry for state changes.
//!
//! UI code subscribes to a match and is called with a [`StateChange`] for
//! every successful fold on that match, in fold order. Observers of the same
//! match run in subscription order. A failing or panicking observer is
//! isolated: the failure is logged and reported, and the remaining observers
//! still run.
//!
//! ```
//! use broadside_client::dispatch::Dispatcher;
//! use broadside_client::state::StateChange;
//!
//! let mut dispatcher = Dispatcher::new();
//! let handle = dispatcher.subscribe("match-1", |change: &StateChange| {
//!     println!("{} is now {}", change.match_id(), change.current.phase());
//! });
//! assert_eq!(dispatcher.subscriber_count(&"match-1".into()), 1);
//! assert!(dispatcher.unsubscribe(&handle));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{trace, warn};

use crate::error::ObserverError;
use crate::event::MatchId;
use crate::state::StateChange;

/// Receives state changes for a subscribed match.
///
/// Any `FnMut(&StateChange) + Send` closure is an observer. Wrap a closure
/// that can fail in [`fallible`].
pub trait Observer: Send {
    /// Called once per committed fold on the subscribed match.
    ///
    /// # Errors
    ///
    /// An error is reported as a diagnostic; it never affects the fold or
    /// other observers.
    fn on_change(&mut self, change: &StateChange) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: FnMut(&StateChange) + Send,
{
    fn on_change(&mut self, change: &StateChange) -> Result<(), ObserverError> {
        self(change);
        Ok(())
    }
}

/// An [`Observer`] built from a closure that returns a `Result`.
pub struct Fallible<F>(F);

/// Adapt a fallible closure into an [`Observer`].
pub fn fallible<F>(f: F) -> Fallible<F>
where
    F: FnMut(&StateChange) -> Result<(), ObserverError> + Send,
{
    Fallible(f)
}

impl<F> Observer for Fallible<F>
where
    F: FnMut(&StateChange) -> Result<(), ObserverError> + Send,
{
    fn on_change(&mut self, change: &StateChange) -> Result<(), ObserverError> {
        (self.0)(change)
    }
}

/// Identifies one subscription. Pass it to [`Dispatcher::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    match_id: MatchId,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }
}

/// An observer that failed during [`Dispatcher::notify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverFailure {
    pub handle: SubscriptionHandle,
    pub error: ObserverError,
}

/// Outcome of one [`Dispatcher::notify`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Observers that were invoked, including those that failed.
    pub notified: usize,
    pub failures: Vec<ObserverFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Subscription {
    id: u64,
    observer: Box<dyn Observer>,
}

/// Per-match observer registry.
#[derive(Default)]
pub struct Dispatcher {
    subscriptions: HashMap<MatchId, Vec<Subscription>>,
    next_id: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` for changes to `match_id`.
    ///
    /// Subscribing to a match that does not exist yet is allowed; the
    /// observer will see the `MatchCreated` change.
    pub fn subscribe(
        &mut self,
        match_id: impl Into<MatchId>,
        observer: impl Observer + 'static,
    ) -> SubscriptionHandle {
        let match_id = match_id.into();
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.subscriptions
            .entry(match_id.clone())
            .or_default()
            .push(Subscription {
                id,
                observer: Box::new(observer),
            });
        trace!(match_id = %match_id, subscription = id, "observer subscribed");

        SubscriptionHandle { id, match_id }
    }

    /// Remove a subscription. Returns `false` if it was already removed.
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        let Some(subs) = self.subscriptions.get_mut(&handle.match_id) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != handle.id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            self.subscriptions.remove(&handle.match_id);
        }
        if removed {
            trace!(match_id = %handle.match_id, subscription = handle.id, "observer unsubscribed");
        }
        removed
    }

    pub fn subscriber_count(&self, match_id: &MatchId) -> usize {
        self.subscriptions.get(match_id).map_or(0, Vec::len)
    }

    /// Invoke every observer of the changed match, in subscription order.
    pub fn notify(&mut self, change: &StateChange) -> DispatchReport {
        let mut report = DispatchReport::default();
        let match_id = change.match_id();
        let Some(subs) = self.subscriptions.get_mut(match_id) else {
            return report;
        };

        for sub in subs.iter_mut() {
            report.notified += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| sub.observer.on_change(change)));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(panic) => ObserverError::new(format!(
                    "observer panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };
            warn!(
                match_id = %match_id,
                subscription = sub.id,
                kind = %change.event.kind(),
                "{error}"
            );
            report.failures.push(ObserverFailure {
                handle: SubscriptionHandle {
                    id: sub.id,
                    match_id: match_id.clone(),
                },
                error,
            });
        }
        report
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&MatchId, usize> = self
            .subscriptions
            .iter()
            .map(|(id, subs)| (id, subs.len()))
            .collect();
        f.debug_struct("Dispatcher")
            .field("subscriptions", &counts)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::event::GameEvent;
    use crate::state::{FoldOutcome, MatchStore};
    use std::sync::{Arc, Mutex};

    fn change_for(match_id: &str) -> StateChange {
        let mut store = MatchStore::default();
        match store
            .fold(&GameEvent::MatchCreated {
                match_id: match_id.into(),
            })
            .unwrap()
        {
            FoldOutcome::Changed(change) => change,
            FoldOutcome::Unchanged => panic!("creation must change state"),
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl Observer + 'static {
        let log = Arc::clone(log);
        move |change: &StateChange| {
            log.lock()
                .unwrap()
                .push(format!("{tag}:{}", change.match_id()));
        }
    }

    #[test]
    fn observers_run_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.subscribe("m1", recorder(&log, "a"));
        dispatcher.subscribe("m1", recorder(&log, "b"));
        dispatcher.subscribe("m1", recorder(&log, "c"));

        let report = dispatcher.notify(&change_for("m1"));
        assert_eq!(report.notified, 3);
        assert!(report.is_clean());
        assert_eq!(*log.lock().unwrap(), vec!["a:m1", "b:m1", "c:m1"]);
    }

    #[test]
    fn only_matching_observers_are_notified() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.subscribe("m1", recorder(&log, "one"));
        dispatcher.subscribe("m2", recorder(&log, "two"));

        dispatcher.notify(&change_for("m2"));
        assert_eq!(*log.lock().unwrap(), vec!["two:m2"]);
    }

    #[test]
    fn unsubscribed_observer_is_not_called() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let a = dispatcher.subscribe("m1", recorder(&log, "a"));
        dispatcher.subscribe("m1", recorder(&log, "b"));

        assert!(dispatcher.unsubscribe(&a));
        assert!(!dispatcher.unsubscribe(&a));
        dispatcher.notify(&change_for("m1"));
        assert_eq!(*log.lock().unwrap(), vec!["b:m1"]);
        assert_eq!(dispatcher.subscriber_count(&"m1".into()), 1);
    }

    #[test]
    fn failing_and_panicking_observers_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let failing =
            dispatcher.subscribe("m1", fallible(|_: &StateChange| Err(ObserverError::new("nope"))));
        let panicking = dispatcher.subscribe("m1", |_: &StateChange| panic!("render crashed"));
        dispatcher.subscribe("m1", recorder(&log, "survivor"));

        let report = dispatcher.notify(&change_for("m1"));
        assert_eq!(report.notified, 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].handle, failing);
        assert_eq!(report.failures[0].error, ObserverError::new("nope"));
        assert_eq!(report.failures[1].handle, panicking);
        assert!(report.failures[1].error.0.contains("render crashed"));
        assert_eq!(*log.lock().unwrap(), vec!["survivor:m1"]);
    }

    #[test]
    fn handles_are_unique_across_matches() {
        let mut dispatcher = Dispatcher::new();
        let a = dispatcher.subscribe("m1", |_: &StateChange| {});
        let b = dispatcher.subscribe("m2", |_: &StateChange| {});
        assert_ne!(a.id(), b.id());
        assert_eq!(b.match_id().as_str(), "m2");
    }
}
