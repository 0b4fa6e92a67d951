//! The daemon round-trip scenario from §8: a client drives the full
//! create/load/alloc/execute/free/release lifecycle through the
//! coordinator, never touching the Registry/Scheduler/Executor directly.

use std::sync::Arc;

use shuffler_api::Direction;
use shuffler_dea::{Dea, MockDmaProvider};
use shuffler_exc::{new_daemon, BusyWaitWaiter, Client};
use shuffler_hcs::{Hcs, MockRegisterWindow};
use shuffler_kpr::Registry;
use shuffler_shs::{MockBitstreamLoader, Scheduler};

fn spawn_daemon() -> Arc<shuffler_exc::Daemon> {
    let window = Arc::new(MockRegisterWindow::new(1 << 20));
    window.poke(shuffler_hcs::regs::N_SLOTS, 4);
    window.poke(shuffler_hcs::regs::READY, u32::MAX);
    let hcs = Arc::new(Hcs::new(window).unwrap());
    let registry = Arc::new(Registry::new(4));
    let scheduler = Arc::new(Scheduler::new(hcs.clone(), registry.clone()));
    let dea = Arc::new(Dea::new(MockDmaProvider::new(), hcs.clone()));
    let waiter = Arc::new(BusyWaitWaiter::new(hcs));
    let loader = Arc::new(MockBitstreamLoader::new());
    let daemon = new_daemon(registry, scheduler, dea, waiter, loader);
    let receiver = daemon.clone();
    std::thread::spawn(move || receiver.run());
    daemon
}

#[test]
fn client_drives_the_full_kernel_lifecycle_through_the_coordinator() {
    let daemon = spawn_daemon();
    let client = Client::connect(daemon.clone(), "user_0000000").unwrap();

    client.kernel_create("k", 8192, 2, 2).unwrap();
    client.load("k", 0, 0, 0, false).unwrap();
    client.alloc("k", "x", 4096, Direction::Input).unwrap();
    client.kernel_execute("k", 1024, 1024).unwrap();
    client.kernel_wait("k").unwrap();
    client.free("k", "x").unwrap();
    client.unload(0).unwrap();
    client.kernel_release("k").unwrap();
    client.disconnect();

    daemon.mailbox.request_termination();
}

#[test]
fn a_second_user_gets_its_own_id_and_can_run_concurrently() {
    let daemon = spawn_daemon();
    let a = Client::connect(daemon.clone(), "user_0000001").unwrap();
    let b = Client::connect(daemon.clone(), "user_0000002").unwrap();

    a.kernel_create("ka", 4096, 2, 0).unwrap();
    b.kernel_create("kb", 4096, 2, 0).unwrap();
    a.load("ka", 0, 0, 0, false).unwrap();
    b.load("kb", 1, 0, 0, false).unwrap();
    assert_eq!(a.get_naccs("ka").unwrap(), 1);
    assert_eq!(b.get_naccs("kb").unwrap(), 1);

    a.unload(0).unwrap();
    a.kernel_release("ka").unwrap();
    b.unload(1).unwrap();
    b.kernel_release("kb").unwrap();
    a.disconnect();
    b.disconnect();

    daemon.mailbox.request_termination();
}
