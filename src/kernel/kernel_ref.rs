use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::{
    actor::{MsgError, MsgResult, Sender},
    kernel::{
        mailbox::{AnyEnqueueError, AnySender, MailboxSchedule, MailboxSender},
        KernelMsg,
    },
    AnyMessage, Envelope, Message,
};

/// Handle to one actor's kernel task.
#[derive(Clone)]
pub struct KernelRef {
    pub(crate) tx: UnboundedSender<KernelMsg>,
}

impl KernelRef {
    pub(crate) fn schedule(&self) {
        self.send(KernelMsg::RunActor);
    }

    pub(crate) fn restart(&self) {
        self.send(KernelMsg::RestartActor);
    }

    pub(crate) fn terminate(&self) {
        self.send(KernelMsg::TerminateActor);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, msg: KernelMsg) {
        // the kernel task has exited when the actor terminated; the
        // message is simply dropped in that case
        let _ = self.tx.send(msg);
    }
}

pub fn dispatch<Msg>(
    msg: Envelope<Msg>,
    mbox: &MailboxSender<Msg>,
    kernel: &KernelRef,
) -> MsgResult<Envelope<Msg>>
where
    Msg: Message,
{
    if kernel.is_stopped() {
        return Err(MsgError::new(msg));
    }

    match mbox.try_enqueue(msg) {
        Ok(_) => {
            if !mbox.is_scheduled() {
                mbox.set_scheduled(true);
                kernel.schedule();
            }

            Ok(())
        }
        Err(e) => Err(MsgError::new(e.msg)),
    }
}

pub fn dispatch_any(
    msg: &mut AnyMessage,
    sender: Sender,
    mbox: &Arc<dyn AnySender>,
    kernel: &KernelRef,
) -> Result<(), AnyEnqueueError> {
    if kernel.is_stopped() {
        return Err(AnyEnqueueError);
    }

    mbox.try_any_enqueue(msg, sender).map(|_| {
        if !mbox.is_sched() {
            mbox.set_sched(true);
            kernel.schedule();
        }
    })
}
