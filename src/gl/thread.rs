//! The dedicated GL thread and its command mailbox.
//!
//! All GL work funnels through one OS thread that owns the context. The
//! mailbox holds exactly one command: under load, submitting while a
//! command is queued drops the *new* command, so a slow GPU sheds frames
//! instead of building a latency queue. Teardown must never be shed, so
//! [`GlThread::release`] drains the mailbox and delivers the final
//! command with a blocking send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, trace, warn};

use crate::error::GpuError;
use crate::gl::context::GpuContext;

/// Work executed on the GL thread. Receives `None` when the context has
/// no usable API; implementations must skip their GL work in that case.
pub type GlAction = Box<dyn FnOnce(Option<&glow::Context>) + Send>;

/// How the event loop frames the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// One-off state changes. Make current, run.
    Configure,
    /// Per-frame drawing. Make current, run, present.
    Render,
    /// Reads back results without presenting. Make current, run.
    Compute,
    /// Final command; the loop exits and the context is destroyed after.
    Destroy,
}

struct GlCommand {
    kind: CommandKind,
    tag: &'static str,
    action: GlAction,
}

pub struct GlThread {
    tx: flume::Sender<GlCommand>,
    rx: flume::Receiver<GlCommand>,
    released: Arc<AtomicBool>,
}

impl GlThread {
    /// Start the GL thread. The context moves onto it and never leaves.
    pub fn spawn(context: Box<dyn GpuContext>) -> Result<Self, GpuError> {
        let (tx, rx) = flume::bounded::<GlCommand>(1);
        let loop_rx = rx.clone();
        std::thread::Builder::new()
            .name("gl-thread".into())
            .spawn(move || run(loop_rx, context))?;
        Ok(Self {
            tx,
            rx,
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Submit a command. Returns `false` when it was dropped because the
    /// mailbox is occupied or the thread has been released.
    pub fn submit(&self, kind: CommandKind, tag: &'static str, action: GlAction) -> bool {
        if self.released.load(Ordering::Acquire) {
            trace!(tag, "command refused: thread released");
            return false;
        }
        let accepted = self
            .tx
            .try_send(GlCommand { kind, tag, action })
            .is_ok();
        if !accepted {
            metrics::counter!("gl_commands_dropped").increment(1);
            trace!(tag, "command dropped: mailbox full");
        }
        accepted
    }

    /// Tear the thread down. Refuses further submissions, discards
    /// whatever sits in the mailbox, then delivers `final_action` as the
    /// Destroy command through a blocking send so it cannot be shed.
    /// Idempotent; only the first call delivers the action.
    pub fn release(&self, final_action: GlAction) {
        if self.released.swap(true, Ordering::AcqRel) {
            debug!("release: already released");
            return;
        }
        let mut discarded = 0;
        while let Ok(cmd) = self.rx.try_recv() {
            discarded += 1;
            trace!(tag = cmd.tag, "discarding queued command on release");
        }
        if discarded > 0 {
            debug!(discarded, "mailbox drained for release");
        }
        if self
            .tx
            .send(GlCommand {
                kind: CommandKind::Destroy,
                tag: "destroy",
                action: final_action,
            })
            .is_err()
        {
            warn!("GL thread gone before destroy could be delivered");
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

fn run(rx: flume::Receiver<GlCommand>, mut context: Box<dyn GpuContext>) {
    debug!("GL thread started");
    while let Ok(cmd) = rx.recv() {
        match cmd.kind {
            CommandKind::Render => {
                if let Err(e) = context.make_current() {
                    error!(tag = cmd.tag, "make_current failed: {e}");
                    continue;
                }
                let started = Instant::now();
                (cmd.action)(context.api());
                if let Err(e) = context.present() {
                    error!(tag = cmd.tag, "present failed: {e}");
                }
                metrics::histogram!("render_time_us")
                    .record(started.elapsed().as_micros() as f64);
            }
            CommandKind::Configure | CommandKind::Compute => {
                if let Err(e) = context.make_current() {
                    error!(tag = cmd.tag, "make_current failed: {e}");
                    continue;
                }
                (cmd.action)(context.api());
            }
            CommandKind::Destroy => {
                // Runs even when the target is already gone.
                let current = context.make_current().is_ok();
                (cmd.action)(if current { context.api() } else { None });
                break;
            }
        }
    }
    context.destroy();
    debug!("GL thread exited");
}
