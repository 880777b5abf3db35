//! The rejection taxonomy for transition attempts.
//!
//! A transition that does not succeed settles with exactly one [`Rejection`].
//! Rejections are data, not panics: the kind decides how the caller reacts
//! (follow a redirect, treat an ignore as a no-op, report an error).

use crate::target::TargetState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static REJECTION_IDS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionKind {
    /// A newer transition began, or this one was redirected.
    Superseded = 2,
    /// A hook vetoed the transition, or the router is gone.
    Aborted = 3,
    /// The target state or its parameters are not valid.
    Invalid = 4,
    /// The transition would not change anything.
    Ignored = 5,
    /// Anything else, including hook and resolver failures.
    Error = 6,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Extra information carried by a rejection.
#[derive(Debug, Clone, Default)]
pub enum RejectionDetail {
    #[default]
    None,
    Message(String),
    /// The replacement target of a redirect.
    Redirect(TargetState),
    /// The original failure of a hook or resolver.
    Cause(Arc<anyhow::Error>),
}

impl fmt::Display for RejectionDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionDetail::None => write!(f, "undefined"),
            RejectionDetail::Message(msg) => write!(f, "{msg}"),
            RejectionDetail::Redirect(target) => write!(f, "{target}"),
            RejectionDetail::Cause(err) => write!(f, "{err:#}"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Transition Rejection($id: {id} type: {kind}, message: {message}, detail: {detail})")]
pub struct Rejection {
    pub id: u64,
    pub kind: RejectionKind,
    pub message: String,
    pub detail: RejectionDetail,
    /// Set on superseded rejections caused by a redirect.
    pub redirected: bool,
}

impl Rejection {
    pub fn new(kind: RejectionKind, message: impl Into<String>, detail: RejectionDetail) -> Self {
        Self {
            id: REJECTION_IDS.fetch_add(1, Ordering::Relaxed),
            kind,
            message: message.into(),
            detail,
            redirected: false,
        }
    }

    pub fn superseded(detail: RejectionDetail) -> Self {
        Self::new(
            RejectionKind::Superseded,
            "The transition has been superseded by a different transition",
            detail,
        )
    }

    pub fn redirected(target: TargetState) -> Self {
        let mut rejection = Self::superseded(RejectionDetail::Redirect(target));
        rejection.redirected = true;
        rejection
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::new(
            RejectionKind::Invalid,
            "This transition is invalid",
            RejectionDetail::Message(detail.into()),
        )
    }

    pub fn ignored(detail: RejectionDetail) -> Self {
        Self::new(RejectionKind::Ignored, "The transition was ignored", detail)
    }

    pub fn aborted(detail: impl Into<String>) -> Self {
        Self::new(
            RejectionKind::Aborted,
            "The transition has been aborted",
            RejectionDetail::Message(detail.into()),
        )
    }

    pub fn errored(detail: RejectionDetail) -> Self {
        Self::new(RejectionKind::Error, "The transition errored", detail)
    }

    /// Error-kind rejection wrapping `cause`.
    pub fn from_cause(cause: anyhow::Error) -> Self {
        Self::errored(RejectionDetail::Cause(Arc::new(cause)))
    }

    /// Recover a rejection carried by `err`, or wrap `err` as an Error-kind rejection.
    pub fn normalize(err: anyhow::Error) -> Self {
        match err.downcast::<Rejection>() {
            Ok(rejection) => rejection,
            Err(other) => Self::from_cause(other),
        }
    }

    pub fn is_redirect(&self) -> bool {
        self.redirected && matches!(self.detail, RejectionDetail::Redirect(_))
    }

    /// The replacement target, if this rejection is a redirect.
    pub fn redirect_target(&self) -> Option<&TargetState> {
        match &self.detail {
            RejectionDetail::Redirect(target) if self.redirected => Some(target),
            _ => None,
        }
    }

    /// The underlying failure, if this rejection wraps one.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match &self.detail {
            RejectionDetail::Cause(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
