//! The daemon side of the coordinator (§4.5.4): a single receiver thread
//! drains the mailbox and spawns a detached worker per request, which
//! executes the corresponding function, writes the response into the
//! client's channel, and signals it back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use shuffler_api::limits::{MAX_KERNELS, MAX_USERS};
use shuffler_api::wire::{AllocArgs, FreeArgs, KernelCreateArgs, KernelExecuteArgs, LoadArgs, NameArgs, RcfgArgs, UnloadArgs, WcfgArgs};
use shuffler_api::{Error, FunctionTag};
use shuffler_dea::Dea;
use shuffler_kpr::Registry;
use shuffler_shs::{BitstreamLoader, Scheduler};

use crate::buffers::PortBuffers;
use crate::coordinator::mailbox::Mailbox;
use crate::coordinator::response::Response;
use crate::coordinator::shm::{ShmMailbox, ShmUser};
use crate::coordinator::user::User;
use crate::executor::Executor;
use crate::waiter::CompletionWaiter;

/// Everything the daemon needs to answer one request. Shared (behind
/// `Arc`) between the receiver thread and every worker it spawns.
pub struct Daemon {
    pub registry: Arc<Registry>,
    pub scheduler: Arc<Scheduler>,
    pub executor: Arc<Executor>,
    pub dea: Arc<Dea>,
    pub loader: Arc<dyn BitstreamLoader>,
    pub mailbox: Arc<Mailbox>,
    users: Mutex<Vec<Option<Arc<User>>>>,
    /// Heap-backed stand-in for the client's mapped shared memory: the
    /// hosted build and every test here keep port contents in process
    /// rather than behind a second `mmap` (§4.5.2's buffers are opaque to
    /// the dispatch logic either way).
    port_storage: Mutex<HashMap<String, PortBuffers>>,
}

impl Daemon {
    pub fn new(registry: Arc<Registry>, scheduler: Arc<Scheduler>, executor: Arc<Executor>, dea: Arc<Dea>, loader: Arc<dyn BitstreamLoader>) -> Arc<Self> {
        Arc::new(Daemon {
            registry,
            scheduler,
            executor,
            dea,
            loader,
            mailbox: Arc::new(Mailbox::new()),
            users: Mutex::new((0..MAX_USERS).map(|_| None).collect()),
            port_storage: Mutex::new(HashMap::new()),
        })
    }

    /// Runs the receiver loop on the current thread until termination is
    /// requested. Each request is handled on a freshly spawned worker
    /// thread so a slow `KernelExecute` never stalls other clients'
    /// requests from being picked up... except that the mailbox itself is
    /// single-slot, so the *next* publish still waits for this one to
    /// clear — matching §4.5.4's single-writer mailbox discipline.
    pub fn run(self: &Arc<Self>) {
        loop {
            let request = match self.mailbox.take() {
                Some(r) => r,
                None => break,
            };
            let daemon = self.clone();
            std::thread::spawn(move || daemon.handle(request));
        }
    }

    /// Runs the receiver loop over the POSIX shared-memory transport
    /// instead of the in-process mailbox — this is what lets a separate OS
    /// process reach this daemon (§2 scope item (f), §4.5.4, §6). `mailbox`
    /// must already be created (or attached) by the caller, so it can also
    /// hold a handle to signal termination.
    pub fn run_shm(self: &Arc<Self>, mailbox: Arc<ShmMailbox>) {
        let shm_users: Mutex<HashMap<u32, Arc<ShmUser>>> = Mutex::new(HashMap::new());
        loop {
            let Some((user_id, channel_id, func, shm_arg)) = mailbox.take() else { break };
            let Some(func) = num_traits::FromPrimitive::from_u32(func) else {
                log::error!("unknown function tag {}", func);
                continue;
            };

            if func == FunctionTag::AddUser {
                let reply = self.add_user(&shm_arg).and_then(|assigned| {
                    ShmUser::create(assigned).map(|u| (assigned, u)).map_err(|e| {
                        self.remove_user(assigned);
                        e
                    })
                });
                match reply {
                    Ok((assigned, shm_user)) => {
                        shm_users.lock().unwrap().insert(assigned, Arc::new(shm_user));
                        mailbox.fulfill_control(MAX_KERNELS as i32, assigned);
                    }
                    Err(e) => mailbox.fulfill_control(e.wire_code(), 0),
                }
                continue;
            }
            if func == FunctionTag::RemoveUser {
                self.remove_user(user_id);
                shm_users.lock().unwrap().remove(&user_id);
                continue;
            }

            let Some(user) = shm_users.lock().unwrap().get(&user_id).cloned() else {
                log::warn!("request from unknown shm user {}", user_id);
                continue;
            };
            let daemon = self.clone();
            std::thread::spawn(move || {
                let args = user.read_args(channel_id as usize);
                let response = daemon.dispatch_bytes(func, &args);
                let mut buf = [0u8; shuffler_api::wire::ARGS_CAPACITY];
                response.encode(&mut buf);
                user.publish_response(channel_id as usize, &buf);
            });
        }
    }

    fn handle(&self, request: shuffler_api::wire::Request) {
        let func: Option<FunctionTag> = num_traits::FromPrimitive::from_u32(request.func);
        let Some(func) = func else {
            log::error!("unknown function tag {}", request.func);
            return;
        };

        if func == FunctionTag::AddUser {
            // No user id exists yet to own a channel; the reply goes back
            // through the mailbox's control slot instead (§4.5.4).
            let (status, user_id) = match self.add_user(request.shm_name()) {
                Ok(user_id) => (MAX_KERNELS as i32, user_id),
                Err(e) => (e.wire_code(), 0),
            };
            self.mailbox.fulfill_control(status, user_id);
            return;
        }

        let response = match func {
            FunctionTag::RemoveUser => self.remove_user(request.user_id),
            _ => self.dispatch_user_request(func, request.user_id, request.channel_id),
        };

        self.reply(request.user_id, request.channel_id, response, func);
    }

    fn reply(&self, user_id: u32, channel_id: u32, response: Response, func: FunctionTag) {
        if func == FunctionTag::RemoveUser {
            // the user (and its channels) may no longer exist by the time
            // we would reply; RemoveUser's caller does not wait on one.
            return;
        }
        let Ok(user) = self.user_handle(user_id) else {
            log::warn!("reply target user {} vanished", user_id);
            return;
        };
        let Some(channel) = user.channels.get(channel_id as usize) else {
            return;
        };
        {
            let mut args = channel.args.lock().unwrap();
            response.encode(&mut args);
        }
        *channel.response_available.lock().unwrap() = true;
        channel.cond_response.notify_all();
    }

    /// Registers `shm_name` as a new user, returning the id it was assigned.
    /// Per §4.5.4 the *wire* response to `AddUser` is `MAX_KERNELS` (the
    /// catalogue size), not this id — see [`Daemon::handle`], which carries
    /// the id back to the client through the mailbox's control slot
    /// alongside that status word.
    fn add_user(&self, shm_name: &str) -> Result<u32, Error> {
        let mut users = self.users.lock().unwrap();
        if users.iter().flatten().any(|u| u.shm_name == shm_name) {
            return Err(Error::DuplicateName);
        }
        let Some(slot) = users.iter().position(|u| u.is_none()) else {
            return Err(Error::TooManyUsers);
        };
        users[slot] = Some(Arc::new(User::new(slot as u32, shm_name)));
        Ok(slot as u32)
    }

    fn remove_user(&self, user_id: u32) -> Response {
        let mut users = self.users.lock().unwrap();
        match users.get_mut(user_id as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Response::ok()
            }
            _ => Response::err(Error::NotFound),
        }
    }

    /// Clones the `Arc<User>` out from under the table lock so callers never
    /// hold it while blocking on a channel's own condvar.
    fn user_handle(&self, user_id: u32) -> Result<Arc<User>, Error> {
        let users = self.users.lock().unwrap();
        users.get(user_id as usize).and_then(|u| u.clone()).ok_or(Error::NotFound)
    }

    /// Acquires a free channel for `user_id` (§4.5.4, `NoFreeChannel` on
    /// exhaustion). In-process transport entry point for [`super::client::Client`].
    pub fn acquire_channel(&self, user_id: u32) -> Result<usize, Error> {
        self.user_handle(user_id)?.acquire_channel().ok_or(Error::NoFreeChannel)
    }

    pub fn release_channel(&self, user_id: u32, channel_id: usize) {
        if let Ok(user) = self.user_handle(user_id) {
            user.release_channel(channel_id);
        }
    }

    /// Copies `bytes` into the channel's args buffer, ahead of publishing
    /// the request through the mailbox.
    pub fn write_args(&self, user_id: u32, channel_id: usize, bytes: &[u8]) -> Result<(), Error> {
        let user = self.user_handle(user_id)?;
        let channel = user.channels.get(channel_id).ok_or(Error::NotFound)?;
        let mut args = channel.args.lock().unwrap();
        args[..bytes.len()].copy_from_slice(bytes);
        *channel.response_available.lock().unwrap() = false;
        Ok(())
    }

    /// Blocks until the daemon has written a response into the channel,
    /// then hands back its raw bytes.
    pub fn wait_response(&self, user_id: u32, channel_id: usize) -> Result<[u8; shuffler_api::wire::ARGS_CAPACITY], Error> {
        let user = self.user_handle(user_id)?;
        let channel = user.channels.get(channel_id).ok_or(Error::NotFound)?;
        let mut available = channel.response_available.lock().unwrap();
        while !*available {
            available = channel.cond_response.wait(available).unwrap();
        }
        Ok(*channel.args.lock().unwrap())
    }

    fn acquire_channel_args(&self, user_id: u32, channel_id: u32) -> Result<[u8; shuffler_api::wire::ARGS_CAPACITY], Error> {
        let user = self.user_handle(user_id)?;
        let channel = user.channels.get(channel_id as usize).ok_or(Error::NotFound)?;
        Ok(*channel.args.lock().unwrap())
    }

    fn dispatch_user_request(&self, func: FunctionTag, user_id: u32, channel_id: u32) -> Response {
        let args = match self.acquire_channel_args(user_id, channel_id) {
            Ok(a) => a,
            Err(e) => return Response::err(e),
        };
        self.dispatch_bytes(func, &args)
    }

    /// The pure request handler: decodes `args` per `func` and calls into
    /// registry/scheduler/executor. Shared by the in-process mailbox path
    /// above (args already sitting in an in-process [`crate::coordinator::user::Channel`])
    /// and [`Daemon::run_shm`] (args read out of a [`crate::coordinator::shm::ShmUser`]
    /// channel instead) — the dispatch logic does not care which transport
    /// delivered the bytes.
    fn dispatch_bytes(&self, func: FunctionTag, args: &[u8; shuffler_api::wire::ARGS_CAPACITY]) -> Response {
        match func {
            FunctionTag::KernelCreate => {
                let a = KernelCreateArgs::decode(args);
                match self.registry.create_kernel(&a.name, a.mem_bytes as usize, a.mem_banks as usize, a.regs as usize) {
                    Ok(_id) => Response::ok(),
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::KernelRelease => {
                let a = NameArgs::decode(args);
                match self.registry.release_kernel(&a.name) {
                    Ok(()) => {
                        self.port_storage.lock().unwrap().remove(&a.name);
                        Response::ok()
                    }
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::Load => {
                let a = LoadArgs::decode(args);
                let kernel_id = match self.registry.kernel_id(&a.name) {
                    Ok(id) => id as u8,
                    Err(e) => return Response::err(e),
                };
                match self.scheduler.load(self.loader.as_ref(), a.slot as usize, kernel_id, &a.name, a.tmr, a.dmr, a.force) {
                    Ok(()) => Response::ok(),
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::Unload => {
                let a = UnloadArgs::decode(args);
                match self.scheduler.unload(a.slot as usize) {
                    Ok(()) => Response::ok(),
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::Alloc => {
                let a = AllocArgs::decode(args);
                let direction: shuffler_api::Direction = match num_traits::FromPrimitive::from_u32(a.direction) {
                    Some(d) => d,
                    None => return Response::err(Error::NotFound),
                };
                match self.registry.alloc_port(&a.kernel_name, &a.port_name, a.size as usize, direction) {
                    Ok(_bank) => {
                        let words = a.size as usize / 4;
                        self.port_storage
                            .lock()
                            .unwrap()
                            .entry(a.kernel_name.clone())
                            .or_default()
                            .insert(a.port_name, vec![0u32; words]);
                        Response::ok()
                    }
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::Free => {
                let a = FreeArgs::decode(args);
                match self.registry.free_port(&a.kernel_name, &a.port_name) {
                    Ok(()) => Response::ok(),
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::KernelExecute => {
                let a = KernelExecuteArgs::decode(args);
                let buffers = self.port_storage.lock().unwrap().remove(&a.name).unwrap_or_default();
                match self.executor.execute(&a.name, a.gsize, a.lsize, buffers) {
                    Ok(()) => Response::ok(),
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::KernelWait => {
                let a = NameArgs::decode(args);
                match self.executor.wait(&a.name) {
                    Ok(buffers) => {
                        self.port_storage.lock().unwrap().insert(a.name, buffers);
                        Response::ok()
                    }
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::KernelReset => {
                // No reset-specific state exists outside the catalogue and
                // the shadow registers, both already reachable through
                // Release/Unload; this tag validates the kernel exists and
                // otherwise is a no-op.
                let a = NameArgs::decode(args);
                match self.registry.kernel_id(&a.name) {
                    Ok(_) => Response::ok(),
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::KernelWcfg => {
                let a = NameArgs::decode(args);
                let kernel_id = match self.registry.kernel_id(&a.name) {
                    Ok(id) => id as u8,
                    Err(e) => return Response::err(e),
                };
                let naccs = match self.scheduler.naccs(kernel_id) {
                    Ok(n) => n as usize,
                    Err(e) => return Response::err(e),
                };
                let wcfg = WcfgArgs::decode(args, naccs);
                match self.scheduler.wcfg(kernel_id, wcfg.offset, &wcfg.words) {
                    Ok(()) => Response::ok(),
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::KernelRcfg => {
                let a = RcfgArgs::decode(args);
                let kernel_id = match self.registry.kernel_id(&a.name) {
                    Ok(id) => id as u8,
                    Err(e) => return Response::err(e),
                };
                match self.scheduler.rcfg(kernel_id, a.offset) {
                    Ok(words) => Response::words(words),
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::GetNaccs => {
                let a = NameArgs::decode(args);
                let kernel_id = match self.registry.kernel_id(&a.name) {
                    Ok(id) => id as u8,
                    Err(e) => return Response::err(e),
                };
                match self.scheduler.naccs(kernel_id) {
                    Ok(n) => Response::value(n as i32),
                    Err(e) => Response::err(e),
                }
            }
            FunctionTag::AddUser | FunctionTag::RemoveUser => unreachable!("handled before dispatch_user_request"),
        }
    }
}

/// Convenience constructor bundling HCS/DEA/KPR/SHS/EXC wiring plus a
/// `CompletionWaiter`, for the daemon binary and for tests that want the
/// whole stack without repeating the plumbing.
pub fn new_daemon(
    registry: Arc<Registry>,
    scheduler: Arc<Scheduler>,
    dea: Arc<Dea>,
    waiter: Arc<dyn CompletionWaiter>,
    loader: Arc<dyn BitstreamLoader>,
) -> Arc<Daemon> {
    let executor = Arc::new(Executor::new(registry.clone(), scheduler.clone(), dea.clone(), waiter));
    Daemon::new(registry, scheduler, executor, dea, loader)
}
