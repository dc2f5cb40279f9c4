//! Background provisioner.
//!
//! One thread per pool keeps headroom ahead of demand. It re-evaluates the
//! growth rule whenever `occupy` signals pressure, and at least once per
//! poll interval otherwise. Dropping the stop sender ends the loop.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use allocator_api2::alloc::Allocator;
use crossbeam_channel::{select, Receiver, Sender};
use tracing::{debug, warn};

use crate::pool::Shared;

/// Whether the pool should add a page.
///
/// An empty pool always grows. Otherwise growth is needed when the
/// least-loaded page cannot absorb an average request without reaching the
/// watermark, unless that page is still empty, in which case another empty
/// page would not help.
pub(crate) fn needs_growth(least_load: Option<f64>, average: f64, watermark: f64) -> bool {
    match least_load {
        None => true,
        Some(load) => load > 0.0 && load + average >= watermark,
    }
}

/// Handle to a running provisioner thread.
pub(crate) struct Provisioner {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Provisioner {
    pub(crate) fn spawn<const SIZE: usize, const ALIGN: usize, A>(
        shared: Arc<Shared<SIZE, ALIGN, A>>,
        wake: Receiver<()>,
    ) -> io::Result<Self>
    where
        A: Allocator + Send + Sync + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("pagepool-provisioner".into())
            .spawn(move || run(&shared, &stop_rx, &wake))?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread to stop and wait for it.
    pub(crate) fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("provisioner thread panicked");
            }
        }
    }
}

impl Drop for Provisioner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<const SIZE: usize, const ALIGN: usize, A: Allocator>(
    shared: &Shared<SIZE, ALIGN, A>,
    stop: &Receiver<()>,
    wake: &Receiver<()>,
) {
    debug!(page_size = SIZE, align = ALIGN, "provisioner started");
    let poll = shared.config().poll_interval;
    let mut capped = false;

    loop {
        let at_cap = shared.provision();
        if at_cap && !capped {
            warn!(
                max_pages = ?shared.config().max_pages,
                "pool needs to grow but reached its page cap"
            );
        }
        capped = at_cap;

        select! {
            recv(stop) -> _ => break,
            recv(wake) -> _ => {},
            default(poll) => {},
        }
    }
    debug!("provisioner stopped");
}
