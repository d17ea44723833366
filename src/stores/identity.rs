use uuid::Uuid;

use super::UpdateMode;
use crate::{
    auth::{Principal, TokenIssuer, TokenKind},
    error::AppError,
    models::{
        AccessToken, ChangePasswordRequest, NewUser, ProfileFields, RefreshRequest,
        RegisterUserRequest, TokenPair, TokenRequest, UpdateUserRequest, User, normalize_email,
        validate_password,
    },
    password::{hash_password, verify_dummy, verify_password},
    policy::{Action, ResourceKind, require},
    repository::RepositoryState,
};

/// IdentityStore
///
/// Registration, credential verification, token refresh, user CRUD, the `me`
/// lookup and self-service password change.
#[derive(Clone)]
pub struct IdentityStore {
    repo: RepositoryState,
    tokens: TokenIssuer,
}

impl IdentityStore {
    pub fn new(repo: RepositoryState, tokens: TokenIssuer) -> Self {
        Self { repo, tokens }
    }

    /// Creates an account. Anonymous callers get an author account; only an
    /// administrator may pick the role flags.
    pub async fn register(
        &self,
        principal: &Principal,
        req: RegisterUserRequest,
    ) -> Result<User, AppError> {
        require(principal, Action::Create, ResourceKind::User, None)?;
        if req.is_admin.is_some() || req.is_author.is_some() {
            require(principal, Action::AssignRoles, ResourceKind::User, None)?;
        }
        req.validate()?;

        let new_user = NewUser {
            username: req.username,
            email: normalize_email(&req.email),
            password_hash: hash_password(&req.password)?,
            profile: req.profile,
            is_admin: req.is_admin.unwrap_or(false),
            is_author: req.is_author.unwrap_or(true),
        };
        let record = self.repo.create_user(new_user).await?;
        tracing::info!(user_id = %record.id, created_by = %principal, "user registered");
        Ok(record.into())
    }

    /// Verifies credentials and issues an access/refresh pair. Unknown email and
    /// wrong password fail identically.
    pub async fn authenticate(&self, req: TokenRequest) -> Result<TokenPair, AppError> {
        let email = normalize_email(&req.email);
        match self.repo.find_user_by_email(&email).await? {
            Some(user) if verify_password(&req.password, &user.password_hash) => {
                tracing::info!(user_id = %user.id, "token pair issued");
                self.tokens.issue_pair(user.id)
            }
            Some(_) => {
                tracing::info!("authentication failed");
                Err(AppError::InvalidCredentials)
            }
            None => {
                verify_dummy(&req.password);
                tracing::info!("authentication failed");
                Err(AppError::InvalidCredentials)
            }
        }
    }

    /// Exchanges a refresh token for a new access token.
    pub async fn refresh(&self, req: RefreshRequest) -> Result<AccessToken, AppError> {
        let claims = self.tokens.verify(&req.refresh, TokenKind::Refresh)?;
        if self.repo.get_user(claims.sub).await?.is_none() {
            return Err(AppError::Unauthorized("user no longer exists".to_string()));
        }
        Ok(AccessToken {
            access: self.tokens.issue(claims.sub, TokenKind::Access)?,
        })
    }

    pub async fn list(&self, principal: &Principal) -> Result<Vec<User>, AppError> {
        require(principal, Action::List, ResourceKind::User, None)?;
        let users = self.repo.list_users().await?;
        Ok(users.into_iter().map(User::from).collect())
    }

    pub async fn get(&self, principal: &Principal, id: Uuid) -> Result<User, AppError> {
        require(principal, Action::Retrieve, ResourceKind::User, Some(id))?;
        self.repo
            .get_user(id)
            .await?
            .map(User::from)
            .ok_or_else(|| AppError::not_found("user not found"))
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        req: UpdateUserRequest,
        mode: UpdateMode,
    ) -> Result<User, AppError> {
        require(principal, Action::Update, ResourceKind::User, Some(id))?;
        if req.changes_roles() {
            require(principal, Action::AssignRoles, ResourceKind::User, Some(id))?;
        }
        if mode == UpdateMode::Replace && req.email.is_none() {
            return Err(AppError::validation("email is required"));
        }
        req.validate()?;

        let record = self.repo.update_user(id, req.into()).await?;
        tracing::info!(user_id = %id, updated_by = %principal, "user updated");
        Ok(record.into())
    }

    pub async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), AppError> {
        require(principal, Action::Delete, ResourceKind::User, Some(id))?;
        self.repo.delete_user(id).await?;
        tracing::info!(user_id = %id, deleted_by = %principal, "user deleted");
        Ok(())
    }

    pub async fn me(&self, principal: &Principal) -> Result<User, AppError> {
        require(principal, Action::Me, ResourceKind::User, None)?;
        let Principal::User(user) = principal else {
            return Err(AppError::Unauthorized(
                "authentication credentials were not provided".to_string(),
            ));
        };
        self.repo
            .get_user(user.id)
            .await?
            .map(User::from)
            .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))
    }

    /// Replaces the password hash if `old_password` verifies. Issued tokens stay valid.
    pub async fn change_password(
        &self,
        principal: &Principal,
        id: Uuid,
        req: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        require(principal, Action::ChangePassword, ResourceKind::User, Some(id))?;
        validate_password(&req.new_password)?;

        let new_hash = hash_password(&req.new_password)?;
        let check = |stored: &str| verify_password(&req.old_password, stored);
        if !self.repo.replace_password(id, &check, new_hash).await? {
            return Err(AppError::validation("old password is incorrect"));
        }
        tracing::info!(user_id = %id, "password changed");
        Ok(())
    }

    /// Creates the bootstrap administrator unless a user with that email exists.
    /// Returns the new user, or `None` when nothing was created.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<Option<User>, AppError> {
        let email = normalize_email(email);
        if self.repo.find_user_by_email(&email).await?.is_some() {
            return Ok(None);
        }
        validate_password(password)?;

        let record = self
            .repo
            .create_user(NewUser {
                username: None,
                email,
                password_hash: hash_password(password)?,
                profile: ProfileFields::default(),
                is_admin: true,
                is_author: true,
            })
            .await?;
        tracing::info!(user_id = %record.id, "bootstrap administrator created");
        Ok(Some(record.into()))
    }
}
