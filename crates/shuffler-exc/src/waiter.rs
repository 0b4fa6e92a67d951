//! `CompletionWaiter`: the busy-wait/IRQ duality called out in the design
//! notes, behind one interface so the delegate loop does not care which
//! implementation it was given at system init.

use std::sync::Arc;
use std::time::Duration;

use shuffler_hcs::Hcs;

/// Blocks until every bit of `mask` is set in the shuffler's ready register.
pub trait CompletionWaiter: Send + Sync {
    fn wait(&self, mask: u32);
}

/// Polls the ready register with a short sleep between samples. Used when
/// no interrupt source is wired up (the hosted build, most tests).
pub struct BusyWaitWaiter {
    hcs: Arc<Hcs>,
    poll_interval: Duration,
}

impl BusyWaitWaiter {
    pub fn new(hcs: Arc<Hcs>) -> Self { BusyWaitWaiter { hcs, poll_interval: Duration::from_micros(50) } }

    pub fn with_poll_interval(hcs: Arc<Hcs>, poll_interval: Duration) -> Self { BusyWaitWaiter { hcs, poll_interval } }
}

impl CompletionWaiter for BusyWaitWaiter {
    fn wait(&self, mask: u32) {
        while !self.hcs.transfer_is_done(mask) {
            std::thread::sleep(self.poll_interval);
        }
    }
}

/// The interrupt-source collaborator (out of scope per §1): `wait_irq(mask)`
/// blocks the caller until the hardware posts an interrupt for every slot in
/// `mask`. Abstracted so a hosted build without a real interrupt line can
/// substitute [`BusyWaitWaiter`] instead.
pub trait IrqSource: Send + Sync {
    fn wait_irq(&self, mask: u32);
}

pub struct IrqWaiter<S: IrqSource> {
    source: S,
}

impl<S: IrqSource> IrqWaiter<S> {
    pub fn new(source: S) -> Self { IrqWaiter { source } }
}

impl<S: IrqSource> CompletionWaiter for IrqWaiter<S> {
    fn wait(&self, mask: u32) { self.source.wait_irq(mask); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuffler_hcs::MockRegisterWindow;

    #[test]
    fn busy_wait_returns_once_the_ready_bits_are_set() {
        let window = Arc::new(MockRegisterWindow::new(1 << 16));
        window.poke(shuffler_hcs::regs::N_SLOTS, 4);
        let hcs = Arc::new(Hcs::new(window.clone()).unwrap());
        let waiter = BusyWaitWaiter::with_poll_interval(hcs, Duration::from_micros(10));

        let w2 = window.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            w2.poke(shuffler_hcs::regs::READY, 0b0011);
        });

        waiter.wait(0b0011);
    }
}
