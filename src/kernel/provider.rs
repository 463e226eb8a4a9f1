use std::sync::{Arc, Mutex};

use slog::{trace, Logger};

use crate::{
    actor::actor_cell::{ActorCell, ExtendedCell},
    actor::*,
    kernel::kernel,
    kernel::mailbox::mailbox,
    system::{ActorSystem, SysActors, SystemMsg},
    validate::validate_name,
};

/// Creates cells, mailboxes and kernels for new actors and keeps the
/// path registry consistent.
#[derive(Clone)]
pub struct Provider {
    registry: PathRegistry,
    log: Logger,
}

impl Provider {
    pub fn new(registry: PathRegistry, log: Logger) -> Self {
        Provider { registry, log }
    }

    pub fn create_actor<A>(
        &self,
        props: BoxActorProd<A>,
        name: &str,
        parent: &BasicActorRef,
        sys: &ActorSystem,
    ) -> Result<ActorRef<A::Msg>, CreateError>
    where
        A: Actor + 'static,
    {
        // `$anon-` names are generated internally and bypass validation
        if !name.starts_with('$') {
            validate_name(name)?;
        }

        let path = parent.path().child(name);
        trace!(self.log, "Attempting to create actor at: {}", path);

        if self.registry.contains(&path) {
            return Err(CreateError::AlreadyExists(path));
        }

        let uri = ActorUri {
            uid: sys.next_id(),
            name: Arc::from(name),
            path: path.clone(),
        };

        let (sender, sys_sender, mb) = mailbox::<A::Msg>(sys.sys_settings().msg_process_limit);

        let cell = ActorCell::new(
            uri,
            Some(parent.clone()),
            sys,
            Arc::new(sender.clone()),
            sys_sender,
        );
        let cell = ExtendedCell::new(cell, sender);

        kernel(props, cell.clone(), mb, sys)?;

        let actor = ActorRef::new(cell);
        let child = BasicActorRef::from(actor.clone());
        self.registry.register(&child, &path);
        parent.cell.add_child(child);
        actor.sys_tell(SystemMsg::ActorInit);

        Ok(actor)
    }
}

pub fn create_root(sys: &ActorSystem, shutdown_tx: std::sync::mpsc::Sender<()>) -> SysActors {
    let root = root(sys, shutdown_tx);

    let actors = SysActors {
        user: guardian("user", &root, sys),
        sysm: guardian("system", &root, sys),
        temp: guardian("temp", &root, sys),
        root,
    };

    sys.registry().register(&actors.user, actors.user.path());
    sys.registry().register(&actors.sysm, actors.sysm.path());
    sys.registry().register(&actors.temp, actors.temp.path());

    actors
}

fn root(sys: &ActorSystem, shutdown_tx: std::sync::mpsc::Sender<()>) -> BasicActorRef {
    let uri = ActorUri {
        uid: sys.next_id(),
        name: Arc::from("root"),
        path: ActorPath::root(sys.address().clone()),
    };

    // Big bang: all actors have a parent, which means root also needs
    // one. An ActorCell and ActorRef are created without a kernel;
    // anything sent to it is quietly dropped.
    let (bb_sender, bb_sys_sender, _bb_mb) = mailbox::<SystemMsg>(100);
    let bb_cell = ActorCell::new(
        uri.clone(),
        None,
        sys,
        Arc::new(bb_sender),
        bb_sys_sender,
    );
    let bigbang = BasicActorRef::new(bb_cell);

    // root
    let props: BoxActorProd<Guardian> = Props::new_args::<Guardian, _>((
        "root".to_string(),
        sys.log(),
        Arc::new(Mutex::new(Some(shutdown_tx))),
    ));
    let (sender, sys_sender, mb) = mailbox::<SystemMsg>(100);

    let cell = ActorCell::new(uri, Some(bigbang), sys, Arc::new(sender.clone()), sys_sender);
    let cell = ExtendedCell::new(cell, sender);

    kernel(props, cell.clone(), mb, sys).expect("failed to start root guardian");
    let actor_ref = ActorRef::new(cell);
    actor_ref.sys_tell(SystemMsg::ActorInit);

    BasicActorRef::from(actor_ref)
}

fn guardian(name: &str, root: &BasicActorRef, sys: &ActorSystem) -> BasicActorRef {
    let uri = ActorUri {
        uid: sys.next_id(),
        name: Arc::from(name),
        path: root.path().child(name),
    };

    let props: BoxActorProd<Guardian> =
        Props::new_args::<Guardian, _>((name.to_string(), sys.log(), Arc::new(Mutex::new(None))));
    let (sender, sys_sender, mb) = mailbox::<SystemMsg>(100);

    let cell = ActorCell::new(
        uri,
        Some(root.clone()),
        sys,
        Arc::new(sender.clone()),
        sys_sender,
    );
    let cell = ExtendedCell::new(cell, sender);

    kernel(props, cell.clone(), mb, sys).expect("failed to start guardian");
    let actor_ref = ActorRef::new(cell);
    actor_ref.sys_tell(SystemMsg::ActorInit);

    let actor = BasicActorRef::from(actor_ref);
    root.cell.add_child(actor.clone());
    actor
}

type ShutdownTx = Arc<Mutex<Option<std::sync::mpsc::Sender<()>>>>;

struct Guardian {
    name: String,
    log: Logger,
    shutdown_tx: ShutdownTx,
}

impl ActorFactoryArgs<(String, Logger, ShutdownTx)> for Guardian {
    fn create_args((name, log, shutdown_tx): (String, Logger, ShutdownTx)) -> Self {
        Guardian {
            name,
            log,
            shutdown_tx,
        }
    }
}

impl Actor for Guardian {
    type Msg = SystemMsg;

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        Next::Same
    }

    fn sys_recv(&mut self, _: &Context<Self::Msg>, msg: SystemMsg, _: Sender) {
        // the root guardian completes system shutdown once the user
        // guardian has fully stopped
        if let SystemMsg::Terminated(terminated) = msg {
            if terminated.name() == "user" {
                if let Some(tx) = self.shutdown_tx.lock().expect("shutdown tx poisoned").take() {
                    let _ = tx.send(());
                }
            }
        }
    }

    fn post_stop(&mut self) {
        trace!(self.log, "{} guardian stopped", self.name);
    }
}
