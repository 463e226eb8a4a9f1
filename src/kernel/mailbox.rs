use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    actor::actor_cell::{DeathWatchOutcome, ExtendedCell},
    actor::*,
    kernel::queue::{queue, EnqueueResult, QueueEmpty, QueueReader, QueueWriter},
    kernel::Dock,
    system::{ActorCreated, ActorSystem, SystemCmd, SystemMsg},
    AnyMessage, Envelope, Message,
};

pub trait MailboxSchedule {
    fn set_scheduled(&self, b: bool);

    fn is_scheduled(&self) -> bool;
}

#[derive(Debug)]
pub struct AnyEnqueueError;

impl From<()> for AnyEnqueueError {
    fn from(_: ()) -> AnyEnqueueError {
        AnyEnqueueError
    }
}

pub trait AnySender: Send + Sync {
    fn try_any_enqueue(&self, msg: &mut AnyMessage, sender: Sender) -> Result<(), AnyEnqueueError>;

    fn set_sched(&self, b: bool);

    fn is_sched(&self) -> bool;
}

#[derive(Clone)]
pub struct MailboxSender<Msg: Message> {
    queue: QueueWriter<Msg>,
    scheduled: Arc<AtomicBool>,
}

impl<Msg> MailboxSender<Msg>
where
    Msg: Message,
{
    pub fn try_enqueue(&self, msg: Envelope<Msg>) -> EnqueueResult<Msg> {
        self.queue.try_enqueue(msg)
    }
}

impl<Msg> MailboxSchedule for MailboxSender<Msg>
where
    Msg: Message,
{
    fn set_scheduled(&self, b: bool) {
        self.scheduled.store(b, Ordering::Relaxed);
    }

    fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Relaxed)
    }
}

impl<Msg> AnySender for MailboxSender<Msg>
where
    Msg: Message,
{
    fn try_any_enqueue(&self, msg: &mut AnyMessage, sender: Sender) -> Result<(), AnyEnqueueError> {
        let actual: Msg = match msg.take::<Msg>() {
            Ok(m) => m,
            Err(_) => {
                // A mailbox whose message type is `AnyMessage` accepts the
                // erased envelope as-is. This is what lets a reply of any
                // registered type reach the remoting ask-replier.
                let whole = AnyMessage {
                    one_time: msg.one_time,
                    msg: msg.msg.take(),
                };
                match (Box::new(whole) as Box<dyn std::any::Any>).downcast::<Msg>() {
                    Ok(m) => *m,
                    Err(_) => return Err(AnyEnqueueError),
                }
            }
        };
        let msg = Envelope {
            msg: actual,
            sender,
        };
        self.try_enqueue(msg).map_err(|_| AnyEnqueueError)
    }

    fn set_sched(&self, b: bool) {
        self.set_scheduled(b)
    }

    fn is_sched(&self) -> bool {
        self.is_scheduled()
    }
}

#[derive(Clone)]
pub struct Mailbox<Msg: Message> {
    inner: Arc<MailboxInner<Msg>>,
}

pub struct MailboxInner<Msg: Message> {
    msg_process_limit: u32,
    queue: QueueReader<Msg>,
    sys_queue: QueueReader<SystemMsg>,
    suspended: Arc<AtomicBool>,
    scheduled: Arc<AtomicBool>,
}

impl<Msg: Message> Mailbox<Msg> {
    pub fn try_dequeue(&self) -> Result<Envelope<Msg>, QueueEmpty> {
        self.inner.queue.try_dequeue()
    }

    pub fn sys_try_dequeue(&self) -> Result<Envelope<SystemMsg>, QueueEmpty> {
        self.inner.sys_queue.try_dequeue()
    }

    pub fn has_msgs(&self) -> bool {
        self.inner.queue.has_msgs()
    }

    pub fn has_sys_msgs(&self) -> bool {
        self.inner.sys_queue.has_msgs()
    }

    pub fn set_suspended(&self, b: bool) {
        self.inner.suspended.store(b, Ordering::Relaxed);
    }

    fn is_suspended(&self) -> bool {
        self.inner.suspended.load(Ordering::Relaxed)
    }

    fn msg_process_limit(&self) -> u32 {
        self.inner.msg_process_limit
    }
}

impl<Msg> MailboxSchedule for Mailbox<Msg>
where
    Msg: Message,
{
    fn set_scheduled(&self, b: bool) {
        self.inner.scheduled.store(b, Ordering::Relaxed);
    }

    fn is_scheduled(&self) -> bool {
        self.inner.scheduled.load(Ordering::Relaxed)
    }
}

pub fn mailbox<Msg>(
    msg_process_limit: u32,
) -> (MailboxSender<Msg>, MailboxSender<SystemMsg>, Mailbox<Msg>)
where
    Msg: Message,
{
    let (qw, qr) = queue::<Msg>();
    let (sqw, sqr) = queue::<SystemMsg>();

    let scheduled = Arc::new(AtomicBool::new(false));

    let sender = MailboxSender {
        queue: qw,
        scheduled: scheduled.clone(),
    };

    let sys_sender = MailboxSender {
        queue: sqw,
        scheduled: scheduled.clone(),
    };

    let mailbox = MailboxInner {
        msg_process_limit,
        queue: qr,
        sys_queue: sqr,
        // actors start suspended until ActorInit has run pre_start
        suspended: Arc::new(AtomicBool::new(true)),
        scheduled,
    };

    let mailbox = Mailbox {
        inner: Arc::new(mailbox),
    };

    (sender, sys_sender, mailbox)
}

pub fn run_mailbox<Msg>(mbox: &Mailbox<Msg>, ctx: Context<Msg>, dock: &mut Dock<Msg>)
where
    Msg: Message,
{
    let mut actor = dock.actor.lock().expect("actor dock poisoned").take();
    let cell = dock.cell.clone();

    process_sys_msgs(mbox, &ctx, &cell, &mut actor);

    if actor.is_some() && !mbox.is_suspended() {
        process_msgs(mbox, &ctx, &cell, &mut actor);
    }

    process_sys_msgs(mbox, &ctx, &cell, &mut actor);

    if actor.is_some() {
        let mut a = dock.actor.lock().expect("actor dock poisoned");
        *a = actor;
    }

    mbox.set_scheduled(false);

    let has_msgs = (mbox.has_msgs() && !mbox.is_suspended()) || mbox.has_sys_msgs();
    if has_msgs && !mbox.is_scheduled() {
        mbox.set_scheduled(true);
        ctx.kernel().schedule();
    }
}

fn process_msgs<Msg>(
    mbox: &Mailbox<Msg>,
    ctx: &Context<Msg>,
    cell: &ExtendedCell<Msg>,
    actor: &mut Option<BoxActor<Msg>>,
) where
    Msg: Message,
{
    let mut count = 0;

    while count < mbox.msg_process_limit() {
        match mbox.try_dequeue() {
            Ok(Envelope { msg, sender }) => {
                let next = {
                    let a = actor.as_mut().expect("actor during processing");
                    catch_unwind(AssertUnwindSafe(|| a.recv(ctx, msg, sender.clone())))
                };

                match next {
                    Ok(Next::Same) => {}
                    Ok(Next::Become(new_actor)) => {
                        *actor = Some(new_actor);
                    }
                    Ok(Next::Unhandled) => {
                        unhandled(cell, sender, std::any::type_name::<Msg>().to_string());
                    }
                    Ok(Next::Stopped) => {
                        ctx.myself().sys_tell(SystemCmd::Stop.into());
                    }
                    Err(panic) => {
                        // user code failed: suspend and let the parent decide
                        mbox.set_suspended(true);
                        cell.report_failure(panic_reason(panic));
                        break;
                    }
                }

                process_sys_msgs(mbox, ctx, cell, actor);
                if actor.is_none() || mbox.is_suspended() {
                    break;
                }

                count += 1;
            }
            Err(_) => {
                break;
            }
        }
    }
}

fn process_sys_msgs<Msg>(
    mbox: &Mailbox<Msg>,
    ctx: &Context<Msg>,
    cell: &ExtendedCell<Msg>,
    actor: &mut Option<BoxActor<Msg>>,
) where
    Msg: Message,
{
    // All system messages are processed in this mailbox execution
    // and we prevent any new messages that have since been added to the
    // queue from being processed by staging them in a Vec.
    // This prevents reordering during actor restart.
    let mut sys_msgs: Vec<Envelope<SystemMsg>> = Vec::new();
    while let Ok(sys_msg) = mbox.sys_try_dequeue() {
        sys_msgs.push(sys_msg);
    }

    for Envelope { msg, sender } in sys_msgs {
        match msg {
            SystemMsg::ActorInit => handle_init(mbox, ctx, cell, actor),
            SystemMsg::Command(cmd) => handle_cmd(cmd, mbox, ctx, cell, actor),
            SystemMsg::Failed { actor: failed, error } => {
                let cfg = actor
                    .as_ref()
                    .map(|a| a.supervision())
                    .unwrap_or_default();
                cell.handle_failure(failed, error, cfg);
            }
            SystemMsg::Watch(watcher) => {
                if cell.is_terminating() {
                    watcher.sys_tell(SystemMsg::Terminated(cell.myself()));
                } else {
                    cell.add_watcher(watcher);
                }
            }
            SystemMsg::Unwatch(watcher) => cell.remove_watcher(&watcher),
            SystemMsg::Terminated(terminated) => {
                if let Some(a) = actor.as_mut() {
                    a.sys_recv(ctx, SystemMsg::Terminated(terminated.clone()), sender);
                }
                match cell.death_watch(&terminated) {
                    DeathWatchOutcome::ReadyToStop => finish_stop(ctx, cell, actor),
                    DeathWatchOutcome::ReadyToRestart => cell.kernel().restart(),
                    DeathWatchOutcome::Pending | DeathWatchOutcome::NotChild => {}
                }
            }
        }
    }
}

fn handle_init<Msg>(
    mbox: &Mailbox<Msg>,
    ctx: &Context<Msg>,
    cell: &ExtendedCell<Msg>,
    actor: &mut Option<BoxActor<Msg>>,
) where
    Msg: Message,
{
    let started = {
        let a = actor.as_mut().expect("actor during init");
        catch_unwind(AssertUnwindSafe(|| a.pre_start(ctx)))
    };

    // panics in pre_start are not supervised: the actor is terminated
    if started.is_err() {
        finish_stop(ctx, cell, actor);
        return;
    }

    mbox.set_suspended(false);

    if cell.is_user() {
        ctx.system.publish_event(
            ActorCreated {
                actor: cell.myself(),
            }
            .into(),
        );
    }

    if let Some(a) = actor.as_mut() {
        a.post_start(ctx);
    }
}

fn handle_cmd<Msg>(
    cmd: SystemCmd,
    mbox: &Mailbox<Msg>,
    ctx: &Context<Msg>,
    cell: &ExtendedCell<Msg>,
    actor: &mut Option<BoxActor<Msg>>,
) where
    Msg: Message,
{
    match cmd {
        SystemCmd::Stop => {
            if cell.is_terminating() {
                return;
            }
            mbox.set_suspended(true);
            if let Some(a) = actor.as_mut() {
                a.pre_stop(ctx);
            }
            if cell.start_terminating() {
                finish_stop(ctx, cell, actor);
            }
        }
        SystemCmd::Restart => {
            if cell.is_terminating() {
                return;
            }
            mbox.set_suspended(true);
            if let Some(a) = actor.as_mut() {
                a.pre_restart(ctx);
            }
            if cell.start_restarting() {
                cell.kernel().restart();
            }
        }
        SystemCmd::Resume => {
            mbox.set_suspended(false);
        }
    }
}

fn finish_stop<Msg>(ctx: &Context<Msg>, cell: &ExtendedCell<Msg>, actor: &mut Option<BoxActor<Msg>>)
where
    Msg: Message,
{
    let _ = ctx;
    if let Some(mut act) = actor.take() {
        let _ = catch_unwind(AssertUnwindSafe(|| act.post_stop()));
    }
    cell.kernel().terminate();
}

fn unhandled<Msg>(cell: &ExtendedCell<Msg>, sender: Sender, msg_dbg: String)
where
    Msg: Message,
{
    let sys = cell.system();
    if let Some(dl) = sys.dead_letters_opt() {
        let dl_msg = DeadLetter {
            msg: msg_dbg,
            sender,
            recipient: cell.path().to_string(),
        };
        dl.tell(
            Publish {
                topic: "dead_letter".into(),
                msg: dl_msg,
            },
            None,
        );
    }
}

fn panic_reason(panic: Box<dyn std::any::Any + Send>) -> Arc<str> {
    if let Some(s) = panic.downcast_ref::<&str>() {
        Arc::from(*s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        Arc::from(s.as_str())
    } else {
        Arc::from("actor panicked")
    }
}

pub fn flush_to_deadletters<Msg>(mbox: &Mailbox<Msg>, actor: &BasicActorRef, sys: &ActorSystem)
where
    Msg: Message,
{
    while let Ok(Envelope { msg, sender }) = mbox.try_dequeue() {
        let dl = DeadLetter {
            msg: format!("{:?}", msg),
            sender,
            recipient: actor.path().to_string(),
        };

        if let Some(chan) = sys.dead_letters_opt() {
            chan.tell(
                Publish {
                    topic: "dead_letter".into(),
                    msg: dl,
                },
                None,
            );
        }
    }
}
