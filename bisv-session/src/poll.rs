//! Digital input polling loop
//!
//! One loop per claimed pin. Every tick first reconciles the device
//! configuration, since the pin must actually be configured as an input
//! before its value means anything, and only then reads the pin. The
//! next tick is scheduled `poll_interval` after the listener returns,
//! so a slow device lowers the effective frequency instead of piling up
//! overlapping reads.

use crate::config;
use crate::listener;
use crate::session::SessionInner;
use bisv_core::{BisvError, BisvResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Pin value listener; receives each tick's outcome exactly once.
pub type ReadCallback = Box<dyn FnMut(BisvResult<bool>) + Send>;

/// Options of a polling loop.
pub struct PollOptions {
    pub poll_interval: Duration,
    pub on_read: ReadCallback,
}

/// Stop handle of a polling loop.
///
/// Stopping is cooperative: a tick already in flight completes its
/// device call, but its outcome is no longer delivered and no further
/// tick is scheduled. Stopping an already-stopped loop has no effect.
pub struct PollHandle {
    stopped: Arc<AtomicBool>,
}

impl PollHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn start(
    inner: Arc<SessionInner>,
    pin_number: u8,
    options: PollOptions,
) -> PollHandle {
    let stopped = Arc::new(AtomicBool::new(false));
    let handle = PollHandle {
        stopped: stopped.clone(),
    };

    let PollOptions {
        poll_interval,
        mut on_read,
    } = options;

    tokio::spawn(async move {
        loop {
            if inner.is_closed() || stopped.load(Ordering::SeqCst) {
                return;
            }

            let Some(outcome) = tick(&inner, pin_number, &stopped).await else {
                // stop or close observed mid-tick: suppress delivery
                return;
            };

            listener::deliver("poll read", || {
                on_read(outcome);
            });

            tokio::time::sleep(poll_interval).await;
        }
    });

    handle
}

/// Run one tick. Returns `None` when the loop was stopped or the
/// session closed while the tick was in flight.
async fn tick(
    inner: &Arc<SessionInner>,
    pin_number: u8,
    stopped: &AtomicBool,
) -> Option<BisvResult<bool>> {
    let suppressed = || inner.is_closed() || stopped.load(Ordering::SeqCst);

    if let Err(error) = config::reconcile(inner).await {
        if suppressed() {
            return None;
        }
        return Some(Err(error));
    }

    if suppressed() {
        return None;
    }

    let device = match inner.device() {
        Ok(device) => device,
        Err(_) => return None,
    };

    let read = inner
        .fail_on_transport_error(device.read_digital_input_pin(pin_number).await)
        .await;

    if suppressed() {
        return None;
    }

    Some(match read {
        Err(error) => Err(error),
        Ok(read) if !read.status.is_ok() => Err(BisvError::from_status(read.status)),
        Ok(read) => Ok(read.value),
    })
}
