//! Typed requests and replies.
//!
//! Every request pairs an [`Action`] with a one-shot reply channel. The
//! supervisor dispatches on the action with a plain `match`.

use std::net::IpAddr;

use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;
use warden_core::{GrantScope, KexMessage};
use warden_perms::{AuthRequest, Verdict};

use crate::error::{ResultCode, SupervisorError};

/// An encrypted credential request following a key exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedRequest {
    /// Request id from the `kex_init` reply.
    pub request_id: Uuid,
    /// Base64 ciphertext of a `CredentialRequest`.
    pub payload: String,
    pub client_address: IpAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryAction {
    List,
    Add(String),
    Remove(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionAction {
    List,
    Show(String),
    Add { name: String, category: String },
    Remove(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RightAction {
    List {
        user: String,
    },
    Grant {
        user: String,
        permission: String,
        scope: GrantScope,
    },
    Revoke {
        user: String,
        permission: String,
        scope: GrantScope,
    },
}

/// Everything the supervisor can be asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    KexInit {
        message: KexMessage,
        client_address: IpAddr,
    },
    BootstrapRoot(SealedRequest),
    IssueToken(SealedRequest),
    ActivateUser {
        /// The user named by the request path.
        user: String,
        request: SealedRequest,
    },
    Authorize(AuthRequest),
    ValidateToken {
        user: String,
        token: String,
        client_address: IpAddr,
    },
    Category(CategoryAction),
    Permission(PermissionAction),
    Right(RightAction),
}

impl Action {
    /// Name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Action::KexInit { .. } => "kex_init",
            Action::BootstrapRoot(_) => "bootstrap_root",
            Action::IssueToken(_) => "issue_token",
            Action::ActivateUser { .. } => "activate_user",
            Action::Authorize(_) => "authorize",
            Action::ValidateToken { .. } => "validate_token",
            Action::Category(_) => "category",
            Action::Permission(_) => "permission",
            Action::Right(_) => "right",
        }
    }

    /// Whether the action changes durable state.
    pub fn is_mutating(&self) -> bool {
        match self {
            Action::BootstrapRoot(_) | Action::IssueToken(_) | Action::ActivateUser { .. } => true,
            Action::Category(action) => !matches!(action, CategoryAction::List),
            Action::Permission(action) => {
                !matches!(action, PermissionAction::List | PermissionAction::Show(_))
            }
            Action::Right(action) => !matches!(action, RightAction::List { .. }),
            Action::KexInit { .. } | Action::Authorize(_) | Action::ValidateToken { .. } => false,
        }
    }
}

/// A permission and its category, as listed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionInfo {
    pub name: String,
    pub category: String,
}

/// A grant held by a user, as listed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RightInfo {
    pub permission: String,
    pub scope: GrantScope,
}

/// Reply payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Empty,
    Kex(KexMessage),
    /// Base64 ciphertext of a bearer token, under the consumed exchange.
    Sealed(String),
    Verdict(Verdict),
    Categories(Vec<String>),
    Permissions(Vec<PermissionInfo>),
    Rights(Vec<RightInfo>),
    Error(&'static str),
}

/// What the supervisor sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub code: ResultCode,
    pub body: ReplyBody,
}

impl Reply {
    pub fn ok(body: ReplyBody) -> Self {
        Self {
            code: ResultCode::Ok,
            body,
        }
    }

    pub fn accepted() -> Self {
        Self {
            code: ResultCode::Accepted,
            body: ReplyBody::Empty,
        }
    }

    pub fn from_error(err: &SupervisorError) -> Self {
        Self {
            code: err.code(),
            body: ReplyBody::Error(err.public_message()),
        }
    }
}

/// A request in the supervisor's queue.
#[derive(Debug)]
pub struct Request {
    pub action: Action,
    pub reply: oneshot::Sender<Reply>,
}
