//! Recurring trigger: sleeps until the next matching instant of a
//! [`TimeExpression`], fires a callback, and re-arms.
//!
//! The trigger is a best-effort heartbeat: the callback runs on its own task,
//! so a slow, failing or panicking callback never delays or stops the next
//! fire. Time is evaluated in the local time zone.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::cron::TimeExpression;
use korona_core::error::{KoronaError, Result};

type FireFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Snapshot of the trigger's schedule.
#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub expression: TimeExpression,
    pub next_fire: Option<DateTime<Local>>,
    pub running: bool,
}

#[derive(Default)]
struct Inner {
    state: Option<ScheduleState>,
    /// Bumped on every start/stop so a stale loop can tell it was replaced.
    generation: u64,
    stop_tx: Option<oneshot::Sender<()>>,
    fire_count: u64,
}

/// Cron-driven trigger with explicit start/stop.
#[derive(Clone, Default)]
pub struct RecurringTrigger {
    inner: Arc<Mutex<Inner>>,
}

impl RecurringTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the trigger. Must be called inside a tokio runtime.
    ///
    /// Fails with `AlreadyRunning` if started twice, or `NoMatch` if the
    /// expression can never fire.
    pub fn start<F, Fut>(&self, expression: TimeExpression, callback: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let on_fire: FireFn = Arc::new(move || -> BoxFuture<'static, Result<()>> {
            Box::pin(callback())
        });

        let mut inner = self.lock();
        if inner.state.as_ref().is_some_and(|s| s.running) {
            return Err(KoronaError::AlreadyRunning);
        }

        let first = expression.next_fire_after(&Local::now())?;
        let (stop_tx, stop_rx) = oneshot::channel();
        inner.generation += 1;
        inner.stop_tx = Some(stop_tx);
        inner.state = Some(ScheduleState {
            expression: expression.clone(),
            next_fire: Some(first),
            running: true,
        });

        tracing::info!("⏰ Trigger started: '{}' (next fire {})", expression, first);

        tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            inner.generation,
            expression,
            on_fire,
            stop_rx,
            first,
        ));
        Ok(())
    }

    /// Cancel the pending wait. A fire already in progress completes, but
    /// nothing new is armed. Returns false if the trigger was idle.
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        let was_running = inner.state.take().is_some_and(|s| s.running);
        inner.generation += 1;
        if let Some(tx) = inner.stop_tx.take() {
            // The loop may already have exited
            let _ = tx.send(());
        }
        if was_running {
            tracing::info!("⏹️ Trigger stopped");
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.lock().state.as_ref().is_some_and(|s| s.running)
    }

    /// Current schedule, `None` when idle.
    pub fn state(&self) -> Option<ScheduleState> {
        self.lock().state.clone()
    }

    /// How many times the callback has been launched since creation.
    pub fn fire_count(&self) -> u64 {
        self.lock().fire_count
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_loop(
    inner: Arc<Mutex<Inner>>,
    generation: u64,
    expression: TimeExpression,
    on_fire: FireFn,
    mut stop_rx: oneshot::Receiver<()>,
    first: DateTime<Local>,
) {
    let lock = || inner.lock().unwrap_or_else(PoisonError::into_inner);
    let mut next = first;

    loop {
        let wait = (next - Local::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = &mut stop_rx => {
                tracing::debug!("Trigger loop cancelled");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        // Check-and-fire under the lock so stop() cannot interleave
        {
            let mut guard = lock();
            if guard.generation != generation {
                return;
            }
            guard.fire_count += 1;
            tracing::info!("🔔 Trigger fired: '{}' at {}", expression, next);
            let f = Arc::clone(&on_fire);
            let fire = tokio::spawn(async move { f().await });
            tokio::spawn(async move {
                match fire.await {
                    Ok(Ok(())) => tracing::debug!("Trigger callback completed"),
                    Ok(Err(e)) => tracing::warn!("⚠️ Trigger callback failed: {e}"),
                    Err(e) => tracing::error!("❌ Trigger callback panicked: {e}"),
                }
            });
        }

        // An early wake-up must not fire the same minute twice
        let base = std::cmp::max(Local::now(), next);
        match expression.next_fire_after(&base) {
            Ok(n) => {
                next = n;
                let mut guard = lock();
                if guard.generation != generation {
                    return;
                }
                if let Some(state) = guard.state.as_mut() {
                    state.next_fire = Some(n);
                }
            }
            Err(e) => {
                tracing::error!("❌ Trigger cannot reschedule: {e}");
                let mut guard = lock();
                if guard.generation == generation {
                    guard.state = None;
                    guard.stop_tx = None;
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn every_minute() -> TimeExpression {
        TimeExpression::parse("* * * * *").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let trigger = RecurringTrigger::new();
        let counter = Arc::clone(&fired);
        trigger
            .start(every_minute(), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();
        assert!(trigger.stop());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(trigger.fire_count(), 0);
        assert!(!trigger.is_running());
    }

    // Waits are measured against the wall clock, which stands still while
    // tokio time is paused. Fire n therefore sleeps roughly n paused minutes
    // after the previous one, so two fires land inside 200 paused seconds.
    // This checks re-arming after failures, not minute-boundary alignment.
    #[tokio::test(start_paused = true)]
    async fn test_fires_and_keeps_rescheduling_after_errors() {
        let fired = Arc::new(AtomicUsize::new(0));
        let trigger = RecurringTrigger::new();
        let counter = Arc::clone(&fired);
        trigger
            .start(every_minute(), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(KoronaError::fetch("source down"))
                }
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(fired.load(Ordering::SeqCst) >= 2);
        assert!(trigger.is_running());

        trigger.stop();
        let after_stop = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_callback_does_not_stop_trigger() {
        let trigger = RecurringTrigger::new();
        trigger
            .start(every_minute(), || async {
                let fail = true;
                if fail {
                    panic!("boom");
                }
                Ok(())
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(trigger.fire_count() >= 2);
        assert!(trigger.is_running());
        trigger.stop();
    }

    #[tokio::test]
    async fn test_state_and_double_start() {
        let trigger = RecurringTrigger::new();
        assert!(trigger.state().is_none());
        assert!(!trigger.stop());

        let expr = TimeExpression::parse("0 19 * * *").unwrap();
        trigger.start(expr.clone(), || async { Ok(()) }).unwrap();

        let state = trigger.state().unwrap();
        assert!(state.running);
        assert_eq!(state.expression, expr);
        let next = state.next_fire.unwrap();
        assert!(next > Local::now());
        assert!(expr.matches(&next));

        assert!(matches!(
            trigger.start(expr.clone(), || async { Ok(()) }),
            Err(KoronaError::AlreadyRunning)
        ));

        assert!(trigger.stop());
        assert!(trigger.state().is_none());

        // Restart after stop is allowed
        trigger.start(expr, || async { Ok(()) }).unwrap();
        assert!(trigger.is_running());
        trigger.stop();
    }

    #[tokio::test]
    async fn test_impossible_expression_does_not_start() {
        let trigger = RecurringTrigger::new();
        let expr = TimeExpression::parse("0 0 30 2 *").unwrap();
        assert!(matches!(
            trigger.start(expr, || async { Ok(()) }),
            Err(KoronaError::NoMatch(_))
        ));
        assert!(!trigger.is_running());
    }
}
