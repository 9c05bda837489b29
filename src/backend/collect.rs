//! Run a request to completion and collect its replies

use crate::error::{DirResult, DirectoryError};
use crate::message::{ExtendedResponse, Message, Reply, Request};

use super::Backend;

/// Everything a successful request produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    pub entries: Vec<Message>,
    pub referrals: Vec<String>,
    pub response: Option<ExtendedResponse>,
}

/// Issue `req` against `backend` and wait for its terminal reply.
///
/// A failed terminal status becomes the `Err`. A backend that returns
/// without producing a terminal reply is an operations error.
pub fn execute(backend: &dyn Backend, req: &Request) -> DirResult<Collected> {
    let mut replies: Vec<Reply> = Vec::new();
    backend.request(req, &mut replies)?;

    let mut collected = Collected::default();
    for reply in replies {
        match reply {
            Reply::Entry { message, .. } => collected.entries.push(message),
            Reply::Referral(referral) => collected.referrals.push(referral),
            Reply::Done(completion) => {
                completion.status?;
                collected.response = completion.response;
                return Ok(collected);
            }
        }
    }

    Err(DirectoryError::operations(format!(
        "{} returned no terminal reply for {}",
        backend.name(),
        req.operation.name()
    )))
}
