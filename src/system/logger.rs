use slog::{info, o, Discard, Logger};

use crate::{
    actor::{
        ActorFactoryArgs, ActorRef, All, Context, DLChannelMsg, DeadLetter, Next, Sender,
        Subscribe, Tell,
    },
    actor::Actor,
    config::Config,
};

pub(crate) fn default_log(_cfg: &Config) -> Logger {
    // embedders wire a real drain through `SystemBuilder::log`
    Logger::root(Discard, o!())
}

/// Simple actor that subscribes to the dead letters channel and logs
/// each entry.
pub struct DeadLetterLogger {
    dl_chan: ActorRef<DLChannelMsg>,
    log: Logger,
}

impl ActorFactoryArgs<(ActorRef<DLChannelMsg>, Logger)> for DeadLetterLogger {
    fn create_args((dl_chan, log): (ActorRef<DLChannelMsg>, Logger)) -> Self {
        DeadLetterLogger { dl_chan, log }
    }
}

impl Actor for DeadLetterLogger {
    type Msg = DeadLetter;

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        let sub = Box::new(ctx.myself());
        self.dl_chan.tell(
            Subscribe {
                topic: All.into(),
                actor: sub,
            },
            None,
        );
    }

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        info!(
            self.log,
            "DeadLetter: {:?} => {:?} ({:?})", msg.sender, msg.recipient, msg.msg
        );
        Next::Same
    }
}
