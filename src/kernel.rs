pub(crate) mod kernel_ref;
pub(crate) mod mailbox;
pub(crate) mod provider;
pub(crate) mod queue;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use slog::warn;

use crate::{
    actor::actor_cell::{Context, ExtendedCell},
    actor::*,
    kernel::{
        kernel_ref::KernelRef,
        mailbox::{flush_to_deadletters, run_mailbox, Mailbox},
    },
    system::{ActorRestarted, ActorSystem, ActorTerminated, SystemMsg},
    Message,
};

pub use self::kernel_ref::{dispatch, dispatch_any};

#[derive(Debug)]
pub enum KernelMsg {
    RunActor,
    RestartActor,
    TerminateActor,
}

pub struct Dock<Msg: Message> {
    pub actor: Arc<Mutex<Option<BoxActor<Msg>>>>,
    pub cell: ExtendedCell<Msg>,
}

impl<Msg: Message> Clone for Dock<Msg> {
    fn clone(&self) -> Dock<Msg> {
        Dock {
            actor: self.actor.clone(),
            cell: self.cell.clone(),
        }
    }
}

pub fn kernel<A>(
    props: BoxActorProd<A>,
    cell: ExtendedCell<A::Msg>,
    mailbox: Mailbox<A::Msg>,
    sys: &ActorSystem,
) -> Result<KernelRef, CreateError>
where
    A: Actor + 'static,
{
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<KernelMsg>();
    let kr = KernelRef { tx };

    let actor: BoxActor<A::Msg> = Box::new(start_actor(&props)?);
    cell.init(&kr);

    let mut dock = Dock {
        actor: Arc::new(Mutex::new(Some(actor))),
        cell: cell.clone(),
    };

    let actor_ref = ActorRef::new(cell);
    let asys = sys.clone();
    let akr = kr.clone();

    let f = async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                KernelMsg::RunActor => {
                    let ctx = Context::new(actor_ref.clone(), asys.clone(), akr.clone());

                    let run = catch_unwind(AssertUnwindSafe(|| {
                        run_mailbox(&mailbox, ctx, &mut dock)
                    }));

                    // a panic that escapes run_mailbox came from a system
                    // signal handler: the cell moves straight to stopping
                    if run.is_err() {
                        warn!(
                            asys.log(),
                            "actor failed in a system handler, stopping";
                            "path" => %actor_ref.path()
                        );
                        terminate_actor(&mailbox, actor_ref.clone().into(), &asys);
                        break;
                    }
                }
                KernelMsg::RestartActor => {
                    restart_actor(&dock, &actor_ref, &props, &asys, &akr);
                }
                KernelMsg::TerminateActor => {
                    terminate_actor(&mailbox, actor_ref.clone().into(), &asys);
                    break;
                }
            }
        }
    };

    use crate::executor::Run;
    sys.run(f).map_err(|_| CreateError::System)?.forget();
    Ok(kr)
}

fn restart_actor<A>(
    dock: &Dock<A::Msg>,
    actor_ref: &ActorRef<A::Msg>,
    props: &BoxActorProd<A>,
    sys: &ActorSystem,
    kernel: &KernelRef,
) where
    A: Actor,
{
    let mut a = dock.actor.lock().expect("actor dock poisoned");
    match start_actor(props) {
        Ok(actor) => {
            let mut actor: BoxActor<A::Msg> = Box::new(actor);
            let ctx = Context::new(actor_ref.clone(), sys.clone(), kernel.clone());
            actor.post_restart(&ctx);
            *a = Some(actor);
            drop(a);

            actor_ref.sys_tell(SystemMsg::ActorInit);
            sys.publish_event(
                ActorRestarted {
                    actor: actor_ref.clone().into(),
                }
                .into(),
            );
        }
        Err(_) => {
            warn!(sys.log(), "actor failed to restart"; "path" => %actor_ref.path());
        }
    }
}

fn terminate_actor<Msg>(mbox: &Mailbox<Msg>, actor_ref: BasicActorRef, sys: &ActorSystem)
where
    Msg: Message,
{
    sys.registry().unregister(&actor_ref);
    flush_to_deadletters(mbox, &actor_ref, sys);
    sys.publish_event(
        ActorTerminated {
            actor: actor_ref.clone(),
        }
        .into(),
    );

    for watcher in actor_ref.cell.drain_watchers() {
        watcher.sys_tell(SystemMsg::Terminated(actor_ref.clone()));
    }

    if let Some(parent) = actor_ref.cell.parent_opt() {
        parent.sys_tell(SystemMsg::Terminated(actor_ref));
    }
}

fn start_actor<A>(props: &BoxActorProd<A>) -> Result<A, CreateError>
where
    A: Actor,
{
    let actor = catch_unwind(AssertUnwindSafe(|| props.produce()))
        .map_err(|_| CreateError::Panicked)?;

    Ok(actor)
}
