//! Replies delivered to a request's caller

use crate::dn::Dn;
use crate::error::{DirResult, DirectoryError};

use super::entry::Message;
use super::extended::ExtendedResponse;

/// Terminal status of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub status: DirResult<()>,
    pub response: Option<ExtendedResponse>,
    /// Partition that handled the request, when unambiguous
    pub partition: Option<Dn>,
}

impl Completion {
    pub fn success() -> Self {
        Self {
            status: Ok(()),
            response: None,
            partition: None,
        }
    }

    pub fn failed(error: DirectoryError) -> Self {
        Self {
            status: Err(error),
            response: None,
            partition: None,
        }
    }

    pub fn with_response(mut self, response: ExtendedResponse) -> Self {
        self.response = Some(response);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }
}

/// One reply in a request's reply stream.
///
/// A stream is zero or more `Entry`/`Referral` replies followed by
/// exactly one `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Entry {
        message: Message,
        partition: Option<Dn>,
    },
    Referral(String),
    Done(Completion),
}

impl Reply {
    pub fn entry(message: Message) -> Self {
        Reply::Entry {
            message,
            partition: None,
        }
    }

    pub fn done() -> Self {
        Reply::Done(Completion::success())
    }

    pub fn failed(error: DirectoryError) -> Self {
        Reply::Done(Completion::failed(error))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Reply::Done(_))
    }

    /// Record which partition produced this reply.
    pub fn tag_partition(&mut self, dn: &Dn) {
        match self {
            Reply::Entry { partition, .. } => *partition = Some(dn.clone()),
            Reply::Done(completion) => completion.partition = Some(dn.clone()),
            Reply::Referral(_) => {}
        }
    }
}
