//! Fan-out Coordinator
//!
//! Turns one logical request into an ordered list of sub-requests and
//! drives them through an explicit state machine:
//!
//! ```text
//! Dispatching(next) -> Awaiting(index) -> Dispatching(next + 1) -> ... -> Done
//!                                    \-> Done (first error)
//! ```
//!
//! Sub-requests are dispatched strictly one at a time, in list order. The
//! next one is only sent after the previous one delivered its terminal
//! reply, so at most one sub-request is ever outstanding. Entries and
//! referrals stream to the caller as they arrive. The caller sees exactly
//! one terminal reply: after the last sub-request completes (preceded by
//! any collected referrals), or at the first error. Once `Done`, further
//! replies are discarded and the undispatched sub-requests are dropped.

use std::sync::Arc;

use crate::backend::{Backend, ReplySink};
use crate::dn::Dn;
use crate::error::DirectoryError;
use crate::message::{
    Completion, Operation, PartitionSelector, Reply, Request, Scope, OID_START_TLS,
};
use crate::observability::{event_enabled, log_event, Event, MetricsRegistry};

use super::table::Partition;

/// One generated sub-request and the store it goes to.
pub struct SubRequest {
    pub target: Arc<dyn Backend>,
    /// Root of the partition the sub-request goes to
    pub partition: Dn,
    pub request: Request,
}

impl SubRequest {
    fn label(&self) -> String {
        self.partition.linearized()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FanoutState {
    Dispatching { next: usize },
    Awaiting { index: usize },
    Done,
}

/// Counters and flags the relay needs while a sub-request runs.
struct FanoutCore {
    state: FanoutState,
    total: usize,
    completed: usize,
    referrals: Vec<String>,
    is_search: bool,
    is_extended: bool,
    op_name: &'static str,
    metrics: Arc<MetricsRegistry>,
}

impl FanoutCore {
    /// Deliver a terminal error and stop.
    fn abort(&mut self, sink: &mut dyn ReplySink, mut completion: Completion, partition: &str) {
        if let Err(err) = &completion.status {
            log_event(
                Event::FanoutAborted,
                &[
                    ("code", err.code()),
                    ("completed", &self.completed.to_string()),
                    ("op", self.op_name),
                    ("partition", partition),
                    ("total", &self.total.to_string()),
                ],
            );
        }
        if self.total != 1 {
            completion.partition = None;
        }
        self.metrics.increment_fanout_aborts();
        self.state = FanoutState::Done;
        sink.send(Reply::Done(completion));
    }

    fn abort_with(&mut self, sink: &mut dyn ReplySink, err: DirectoryError, partition: &str) {
        self.abort(sink, Completion::failed(err), partition);
    }

    /// A sub-request finished successfully.
    fn complete_one(&mut self, sink: &mut dyn ReplySink, mut completion: Completion) {
        self.completed += 1;
        if self.completed < self.total {
            self.state = FanoutState::Dispatching {
                next: self.completed,
            };
            return;
        }

        self.metrics.add_referrals(self.referrals.len() as u64);
        for referral in self.referrals.drain(..) {
            sink.send(Reply::Referral(referral));
        }
        if self.total != 1 {
            completion.partition = None;
        }
        self.state = FanoutState::Done;
        log_event(
            Event::FanoutComplete,
            &[("op", self.op_name), ("total", &self.total.to_string())],
        );
        sink.send(Reply::Done(completion));
    }
}

/// Relays one sub-request's replies to the caller.
struct Relay<'a> {
    core: &'a mut FanoutCore,
    sink: &'a mut dyn ReplySink,
    index: usize,
    partition: &'a Dn,
}

impl Relay<'_> {
    fn label(&self) -> String {
        self.partition.linearized()
    }
}

impl ReplySink for Relay<'_> {
    fn send(&mut self, mut reply: Reply) {
        if self.core.state != (FanoutState::Awaiting { index: self.index }) {
            log_event(
                Event::LateReplyDiscarded,
                &[("op", self.core.op_name), ("partition", &self.label())],
            );
            return;
        }

        if self.core.total == 1 || matches!(reply, Reply::Entry { .. }) {
            reply.tag_partition(self.partition);
        }

        match reply {
            Reply::Referral(_) => self.sink.send(reply),
            Reply::Entry { .. } if !self.core.is_search => {
                let label = self.label();
                self.core.abort_with(
                    self.sink,
                    DirectoryError::operations(format!(
                        "unsupported reply type for {} request",
                        self.core.op_name
                    )),
                    &label,
                );
            }
            Reply::Entry { .. } => self.sink.send(reply),
            Reply::Done(completion) => {
                let label = self.label();
                if completion.status.is_err() {
                    self.core.abort(self.sink, completion, &label);
                    return;
                }
                if self.core.is_extended {
                    if let Some(response) = &completion.response {
                        if response.oid() != OID_START_TLS {
                            let err = DirectoryError::operations(format!(
                                "unknown extended reply {}, only StartTLS is supported",
                                response.oid()
                            ));
                            self.core.abort_with(self.sink, err, &label);
                            return;
                        }
                    }
                }
                self.core.complete_one(self.sink, completion);
            }
        }
    }
}

/// One logical request fanned out over several stores.
///
/// The context owns every sub-request it generated; they are freed
/// together when the context is dropped.
pub struct FanoutContext {
    parent: Request,
    subrequests: Vec<SubRequest>,
    referrals: Vec<String>,
    metrics: Arc<MetricsRegistry>,
}

impl FanoutContext {
    pub fn new(parent: &Request, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            parent: parent.clone(),
            subrequests: Vec::new(),
            referrals: Vec::new(),
            metrics,
        }
    }

    /// Referrals flushed just before the terminal reply.
    pub fn with_referrals(mut self, referrals: Vec<String>) -> Self {
        self.referrals = referrals;
        self
    }

    pub fn len(&self) -> usize {
        self.subrequests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subrequests.is_empty()
    }

    pub fn subrequests(&self) -> &[SubRequest] {
        &self.subrequests
    }

    /// Add a sub-request for `partition`.
    ///
    /// The copy carries a selector bound to the partition. A search whose
    /// base lies above the partition is rebased onto the partition root so
    /// the backend's base check passes. A one-level search becomes a base
    /// search of the root when the root is a child of the base; any other
    /// partition below the base holds nothing in scope and gets no
    /// sub-request.
    pub fn push_partition(&mut self, partition: &Partition) {
        let mut operation = self.parent.operation.clone();
        if let Operation::Search(search) = &mut operation {
            if !partition.dn.is_base_of(&search.base) {
                if search.scope == Scope::OneLevel {
                    if partition.dn.parent().as_ref() != Some(&search.base) {
                        return;
                    }
                    search.scope = Scope::Base;
                }
                search.base = partition.dn.clone();
            }
        }

        let mut request = self.parent.child(operation);
        request.controls = self.parent.controls.for_subrequest();
        request.controls.partition = Some(PartitionSelector::bound(partition.dn.clone()));

        self.subrequests.push(SubRequest {
            target: Arc::clone(&partition.backend),
            partition: partition.dn.clone(),
            request,
        });
    }

    /// Run every sub-request and deliver exactly one terminal reply.
    pub fn run(self, sink: &mut dyn ReplySink) {
        let FanoutContext {
            parent,
            subrequests,
            referrals,
            metrics,
        } = self;

        let mut core = FanoutCore {
            state: FanoutState::Dispatching { next: 0 },
            total: subrequests.len(),
            completed: 0,
            referrals,
            is_search: matches!(parent.operation, Operation::Search(_)),
            is_extended: matches!(parent.operation, Operation::Extended(_)),
            op_name: parent.operation.name(),
            metrics,
        };

        log_event(
            Event::FanoutBegin,
            &[
                ("op", core.op_name),
                ("request_id", &parent.id.to_string()),
                ("total", &core.total.to_string()),
            ],
        );

        if subrequests.is_empty() {
            core.complete_one_empty(sink);
            return;
        }

        while let FanoutState::Dispatching { next } = core.state {
            let sub = &subrequests[next];
            core.state = FanoutState::Awaiting { index: next };
            core.metrics.increment_subrequests();
            if event_enabled(Event::SubrequestDispatch) {
                log_event(
                    Event::SubrequestDispatch,
                    &[
                        ("index", &next.to_string()),
                        ("op", core.op_name),
                        ("partition", &sub.label()),
                    ],
                );
            }

            let outcome = {
                let mut relay = Relay {
                    core: &mut core,
                    sink: &mut *sink,
                    index: next,
                    partition: &sub.partition,
                };
                sub.target.request(&sub.request, &mut relay)
            };

            if core.state == (FanoutState::Awaiting { index: next }) {
                let err = match outcome {
                    Err(err) => err,
                    Ok(()) => DirectoryError::operations(format!(
                        "{} returned no terminal reply for {}",
                        sub.target.name(),
                        core.op_name
                    )),
                };
                core.abort_with(sink, err, &sub.label());
            }
        }
    }
}

impl FanoutCore {
    /// Nothing to dispatch: flush referrals and succeed.
    fn complete_one_empty(&mut self, sink: &mut dyn ReplySink) {
        self.total = 1;
        self.complete_one(sink, Completion::success());
    }
}
