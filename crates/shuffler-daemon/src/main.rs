//! The standalone coordinator process (§3, §4.5.4, §4.8): binds HCS/DEA to
//! the configured device paths (or falls back to a hosted mock when no
//! hardware is present, matching the teacher's hosted/hw split), creates
//! the POSIX shared-memory mailbox named by `--shm-name`, then runs the
//! daemon's receiver loop over it on the main thread until SIGINT/SIGTERM.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use shuffler_dea::{Dea, MockDmaProvider};
use shuffler_exc::{new_daemon, BusyWaitWaiter, ShmMailbox};
use shuffler_hcs::{Hcs, MmapRegisterWindow, MockRegisterWindow, RegisterWindow};
use shuffler_kpr::Registry;
use shuffler_shs::{BitstreamLoader, MockBitstreamLoader, Scheduler};

/// `shuffler-daemon` wires the shuffler collaborators together and serves
/// the coordinator mailbox. It never exposes a kernel-operating surface of
/// its own (no subcommands to create, load or execute a kernel) — only the
/// process's own collaborator wiring is configurable here.
#[derive(Debug, Parser)]
#[clap(name = "shuffler-daemon", about = "Shuffler accelerator coordinator daemon", long_about = None)]
struct Cli {
    /// Coordinator shared-memory object name.
    #[clap(long, default_value = "a3d")]
    shm_name: String,

    /// Register aperture device path. Falls back to an in-process mock
    /// register file when omitted (hosted build, demos, CI).
    #[clap(long)]
    register_device: Option<String>,

    /// Size in bytes of the register aperture mapping.
    #[clap(long, default_value_t = 1 << 20)]
    register_window_bytes: usize,

    /// Poll the ready register instead of waiting on the (out-of-scope)
    /// interrupt source. The hosted build always behaves this way
    /// regardless of this flag, since no real IRQ source is wired up here.
    #[clap(long)]
    busy_wait: bool,

    /// Increase log verbosity (stackable).
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity (stackable).
    #[clap(short, long, action = clap::ArgAction::Count)]
    quiet: u8,
}

static TERMINATE: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_sig: libc::c_int) {
    TERMINATE.store(true, Ordering::SeqCst);
}

fn init_logging(verbose: u8, quiet: u8) {
    let level = match i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_module_path(true)
        .init();
}

fn open_register_window(cli: &Cli) -> Arc<dyn RegisterWindow> {
    match &cli.register_device {
        Some(path) => match MmapRegisterWindow::open(path, cli.register_window_bytes) {
            Ok(w) => {
                log::info!("mapped register aperture at {path}");
                Arc::new(w)
            }
            Err(e) => {
                log::warn!("could not map register device {path} ({e}); falling back to the hosted mock");
                fallback_window()
            }
        },
        None => {
            log::info!("no register device configured; running the hosted mock register file");
            fallback_window()
        }
    }
}

fn fallback_window() -> Arc<dyn RegisterWindow> {
    let window = Arc::new(MockRegisterWindow::new(1 << 20));
    window.poke(shuffler_hcs::regs::N_SLOTS, 4);
    window
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }

    let window = open_register_window(&cli);
    let hcs = match Hcs::new(window) {
        Ok(hcs) => Arc::new(hcs),
        Err(e) => {
            log::error!("failed to initialise the hardware control surface: {e}");
            std::process::exit(1);
        }
    };

    let registry = Arc::new(Registry::new(hcs.n_slots() as usize));
    let scheduler = Arc::new(Scheduler::new(hcs.clone(), registry.clone()));
    // A real DMA engine driver is out of scope (§1 Non-goals); every
    // deployment of this daemon runs against the in-process mock provider.
    let dea = Arc::new(Dea::new(MockDmaProvider::new(), hcs.clone()));
    let waiter = Arc::new(BusyWaitWaiter::new(hcs.clone()));
    let loader: Arc<dyn BitstreamLoader> = Arc::new(MockBitstreamLoader::new());
    if !cli.busy_wait {
        log::info!("no interrupt source wired up in this build; using the busy-wait completion waiter regardless");
    }

    let mailbox = match ShmMailbox::create(&cli.shm_name) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            log::error!("failed to create coordinator shared-memory object '{}': {e}", cli.shm_name);
            std::process::exit(1);
        }
    };
    log::info!("shuffler-daemon starting, coordinator shm object '{}'", cli.shm_name);
    let daemon = new_daemon(registry, scheduler, dea, waiter, loader);

    let watcher_mailbox = mailbox.clone();
    std::thread::spawn(move || loop {
        if TERMINATE.load(Ordering::SeqCst) {
            watcher_mailbox.request_termination();
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    });

    daemon.run_shm(mailbox.clone());
    mailbox.unlink();
    log::info!("shuffler-daemon terminated");
}
