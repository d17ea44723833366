//! Access policy.
//!
//! Every permission decision in the service goes through [`authorize`]. The
//! function is pure: it looks only at the acting principal, the action, the kind
//! of resource and (for user targets) the target id. Checks that need stored state,
//! such as verifying a current password, belong to the stores.

use std::fmt;

use uuid::Uuid;

use crate::{auth::Principal, error::AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    Delete,
    /// Setting `is_admin` / `is_author` on a user.
    AssignRoles,
    ChangePassword,
    /// Reading the caller's own profile.
    Me,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    User,
    ContentItem,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    AdminRequired,
    AuthorRequired,
    NotSelf,
    Unsupported,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            DenyReason::NotAuthenticated => "authentication credentials were not provided",
            DenyReason::AdminRequired => "administrator role required",
            DenyReason::AuthorRequired => "author role required",
            DenyReason::NotSelf => "only the account owner may perform this action",
            DenyReason::Unsupported => "action not supported on this resource",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Anonymous denials become 401, everything else 403.
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::NotAuthenticated) => Err(AppError::Unauthorized(
                DenyReason::NotAuthenticated.to_string(),
            )),
            Decision::Deny(reason) => Err(AppError::Forbidden(reason.to_string())),
        }
    }
}

/// authorize
///
/// Rules, in precedence order:
/// - reads of content items and categories are open to everyone;
/// - user creation (registration) is open to everyone;
/// - everything else requires an authenticated principal;
/// - listing, retrieving and deleting users, and assigning roles, require an administrator;
/// - updating a user requires being that user or an administrator;
/// - changing a password requires being that user;
/// - writes on content items and categories require an author or administrator,
///   with no ownership check.
pub fn authorize(
    principal: &Principal,
    action: Action,
    resource: ResourceKind,
    target: Option<Uuid>,
) -> Decision {
    use Action::*;
    use ResourceKind::*;

    match (resource, action) {
        (ContentItem | Category, List | Retrieve) => return Decision::Allow,
        (User, Create) => return Decision::Allow,
        _ => {}
    }

    let Principal::User(user) = principal else {
        return Decision::Deny(DenyReason::NotAuthenticated);
    };

    match (resource, action) {
        (User, Me) => Decision::Allow,
        (User, List | Retrieve | Delete | AssignRoles) => {
            if user.is_admin {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::AdminRequired)
            }
        }
        (User, Update) => {
            if user.is_admin || target == Some(user.id) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotSelf)
            }
        }
        (User, ChangePassword) => {
            if target == Some(user.id) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotSelf)
            }
        }
        (ContentItem | Category, Create | Update | Delete) => {
            if user.is_author || user.is_admin {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::AuthorRequired)
            }
        }
        _ => Decision::Deny(DenyReason::Unsupported),
    }
}

/// Evaluate the policy and turn a denial into the matching `AppError`.
pub fn require(
    principal: &Principal,
    action: Action,
    resource: ResourceKind,
    target: Option<Uuid>,
) -> Result<(), AppError> {
    let decision = authorize(principal, action, resource, target);
    if let Decision::Deny(reason) = decision {
        tracing::debug!(
            principal = %principal,
            ?action,
            ?resource,
            ?target,
            %reason,
            "access denied"
        );
    }
    decision.into_result()
}
