//! Request handling.
//!
//! Credential flows (`bootstrap_root`, `activate_user`, `issue_token`) share
//! one pipeline:
//!
//! 1. reject on a read-only instance
//! 2. take the key exchange by request id; it is gone from the store from
//!    here on, whatever happens next
//! 3. check the request comes from the address that opened the exchange
//! 4. decrypt and parse the payload
//! 5. run the flow's own checks
//! 6. hash the password and mint a bearer token
//! 7. commit to the durable store, then update memory
//! 8. seal the token under the consumed exchange
//!
//! Credential flows and token checks never answer faster than the
//! configured minimum latency.

use std::net::IpAddr;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::{
    perpetual, BearerToken, CoreError, Credential, CredentialRequest, KexMessage, KeyExchange,
    ROOT_USER,
};
use warden_perms::{AuthRequest, PermissionTables, PermsError};
use warden_store::{GrantRecord, PermissionRecord, StoreOp, ROOT_USER_ID};

use crate::config::ActivationMethod;
use crate::error::{Result, ResultCode, SupervisorError};
use crate::hashing;
use crate::request::{
    Action, CategoryAction, PermissionAction, PermissionInfo, Reply, ReplyBody, RightAction,
    RightInfo, SealedRequest,
};
use crate::supervisor::Shared;

impl Shared {
    /// Handle one action and turn any error into its reply.
    pub(crate) async fn handle(&self, action: Action) -> Reply {
        let name = action.name();
        let floor = matches!(
            action,
            Action::BootstrapRoot(_)
                | Action::IssueToken(_)
                | Action::ActivateUser { .. }
                | Action::ValidateToken { .. }
        );

        let result = if floor {
            let (result, ()) = tokio::join!(
                self.dispatch(action),
                tokio::time::sleep(self.config.minimum_latency())
            );
            result
        } else {
            self.dispatch(action).await
        };

        match result {
            Ok(reply) => {
                debug!(action = name, code = %reply.code, "request handled");
                reply
            }
            Err(err) => {
                let code = err.code();
                if code == ResultCode::ServerError {
                    warn!(action = name, %code, error = %err, "request failed");
                } else {
                    debug!(action = name, %code, error = %err, "request rejected");
                }
                Reply::from_error(&err)
            }
        }
    }

    async fn dispatch(&self, action: Action) -> Result<Reply> {
        if self.config.readonly && action.is_mutating() {
            return Err(SupervisorError::Conflict(format!(
                "{} on a read-only instance",
                action.name()
            )));
        }

        match action {
            Action::KexInit {
                message,
                client_address,
            } => self.kex_init(&message, client_address).await,
            Action::BootstrapRoot(request) => self.bootstrap_root(request).await,
            Action::ActivateUser { user, request } => self.activate_user(&user, request).await,
            Action::IssueToken(request) => self.issue_token(request).await,
            Action::Authorize(request) => Ok(self.authorize(&request).await),
            Action::ValidateToken {
                user,
                token,
                client_address,
            } => self.validate_token(&user, &token, client_address).await,
            Action::Category(action) => self.category(action).await,
            Action::Permission(action) => self.permission(action).await,
            Action::Right(action) => self.right(action).await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key exchange
    // ─────────────────────────────────────────────────────────────────────────

    async fn kex_init(&self, message: &KexMessage, client_address: IpAddr) -> Result<Reply> {
        let peer_key = message
            .public_key_bytes()
            .map_err(|e| SupervisorError::BadRequest(e.to_string()))?;

        let mut kex = KeyExchange::create(self.config.kex_expiry())?;
        kex.set_peer_key(peer_key);
        kex.set_request_id(Uuid::new_v4());
        kex.set_source_address(client_address);

        let reply = kex.to_message();
        self.kex.insert(kex.request_id(), kex).await;

        debug!(request_id = %reply.request_id, %client_address, "key exchange opened");
        Ok(Reply::ok(ReplyBody::Kex(reply)))
    }

    /// Take the exchange and decrypt the credential payload.
    async fn open_sealed(
        &self,
        sealed: &SealedRequest,
    ) -> Result<(KeyExchange, CredentialRequest)> {
        let mut kex = self.kex.remove(&sealed.request_id).await.ok_or_else(|| {
            SupervisorError::NotFound(format!("key exchange {}", sealed.request_id))
        })?;

        if kex.is_expired() {
            return Err(SupervisorError::NotFound(format!(
                "key exchange {} expired",
                sealed.request_id
            )));
        }
        if !kex.is_same_source(sealed.client_address) {
            return Err(SupervisorError::NotFound(format!(
                "key exchange {} used from {}",
                sealed.request_id, sealed.client_address
            )));
        }

        let plaintext = kex.decode_and_decrypt(&sealed.payload)?;
        let request = serde_json::from_slice(&plaintext)
            .map_err(|e| SupervisorError::BadRequest(format!("credential payload: {e}")))?;
        Ok((kex, request))
    }

    fn mint(&self, user: &str, client_address: IpAddr) -> BearerToken {
        BearerToken::generate(
            user,
            client_address,
            self.config.token_lifetime(),
            &self.token_key,
            &self.config.token_seed,
        )
    }

    async fn remember(&self, credential: Option<Credential>, token: &BearerToken) {
        if let Some(credential) = credential {
            self.credentials
                .insert(credential.user_name.clone(), credential)
                .await;
        }
        self.tokens.insert(token.value.clone(), token.clone()).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Credential flows
    // ─────────────────────────────────────────────────────────────────────────

    async fn bootstrap_root(&self, sealed: SealedRequest) -> Result<Reply> {
        let (mut kex, request) = self.open_sealed(&sealed).await?;
        if request.username != ROOT_USER {
            return Err(SupervisorError::BadRequest(format!(
                "bootstrap for {}",
                request.username
            )));
        }

        let _gate = self.mutation_gate.lock().await;

        let flags = self.store.load_root_flags().await?;
        if flags.enabled {
            return Err(SupervisorError::Conflict("root already bootstrapped".into()));
        }
        let stored = self
            .store
            .load_root_password()
            .await?
            .ok_or_else(|| SupervisorError::Unauthorized("no root bootstrap token".into()))?;
        if !hashing::verify(&stored, &request.token).await? {
            return Err(SupervisorError::Unauthorized(
                "root bootstrap token mismatch".into(),
            ));
        }

        let credential = Credential::new(
            ROOT_USER_ID,
            ROOT_USER,
            hashing::hash(&request.password).await?,
            Utc::now(),
            perpetual(),
        );
        let token = self.mint(ROOT_USER, sealed.client_address);

        self.store
            .commit(vec![
                StoreOp::SetRootCredentials(credential.clone()),
                StoreOp::EnableRoot,
                StoreOp::InsertToken(token.clone()),
            ])
            .await?;
        self.remember(Some(credential), &token).await;

        info!(client_address = %sealed.client_address, "root bootstrapped");
        seal(&mut kex, &token)
    }

    async fn activate_user(&self, user: &str, sealed: SealedRequest) -> Result<Reply> {
        let (mut kex, request) = self.open_sealed(&sealed).await?;
        if request.username != user {
            return Err(SupervisorError::BadRequest(format!(
                "payload names {} on activation of {user}",
                request.username
            )));
        }
        if user == ROOT_USER {
            return Err(SupervisorError::BadRequest(
                "root is activated by bootstrap".into(),
            ));
        }

        let _gate = self.mutation_gate.lock().await;

        let record = self
            .store
            .find_user(user)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(format!("user {user}")))?;
        if record.is_active {
            return Err(SupervisorError::Conflict(format!("user {user} already active")));
        }

        match self.config.activation {
            ActivationMethod::Ldap => {
                if !self.directory.verify(user, &request.token).await {
                    return Err(SupervisorError::Unauthorized(format!(
                        "directory rejected {user}"
                    )));
                }
                if request.password == request.token {
                    return Err(SupervisorError::NotAcceptable);
                }
            }
            ActivationMethod::Token => {
                let stored = self
                    .store
                    .load_activation_token(record.id)
                    .await?
                    .ok_or_else(|| {
                        SupervisorError::Unauthorized(format!("no activation token for {user}"))
                    })?;
                if !hashing::verify(&stored, &request.token).await? {
                    return Err(SupervisorError::Unauthorized(format!(
                        "activation token mismatch for {user}"
                    )));
                }
            }
        }

        let now = Utc::now();
        let expires_at = request.expires_at.unwrap_or_else(perpetual);
        if expires_at <= now {
            return Err(SupervisorError::BadRequest(
                "credential expiry in the past".into(),
            ));
        }

        let credential = Credential::new(
            record.id,
            user,
            hashing::hash(&request.password).await?,
            now,
            expires_at,
        );
        let token = self.mint(user, sealed.client_address);

        self.store
            .commit(vec![
                StoreOp::SetUserCredential(credential.clone()),
                StoreOp::ActivateUser(record.id),
                StoreOp::InsertToken(token.clone()),
            ])
            .await?;
        self.tables
            .write()
            .await
            .upsert_user(user, record.id, record.team_id);
        self.remember(Some(credential), &token).await;

        info!(user, method = ?self.config.activation, "user activated");
        seal(&mut kex, &token)
    }

    async fn issue_token(&self, sealed: SealedRequest) -> Result<Reply> {
        let (mut kex, request) = self.open_sealed(&sealed).await?;
        let user = request.username.as_str();

        let credential = self
            .credentials
            .read(&request.username, Credential::clone)
            .await
            .ok_or_else(|| SupervisorError::Unauthorized(format!("no credential for {user}")))?;
        if !credential.is_valid_at(Utc::now()) {
            return Err(SupervisorError::Unauthorized(format!(
                "credential of {user} inactive or expired"
            )));
        }
        if !hashing::verify(&credential.password_hash, &request.password).await? {
            return Err(SupervisorError::Unauthorized(format!(
                "password mismatch for {user}"
            )));
        }
        if user == ROOT_USER && self.root_restricted && !sealed.client_address.is_loopback() {
            return Err(SupervisorError::Unauthorized(format!(
                "root token requested from {}",
                sealed.client_address
            )));
        }

        let token = self.mint(user, sealed.client_address);
        self.store
            .commit(vec![StoreOp::InsertToken(token.clone())])
            .await?;
        self.remember(None, &token).await;

        info!(user, client_address = %sealed.client_address, "token issued");
        seal(&mut kex, &token)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization and token checks
    // ─────────────────────────────────────────────────────────────────────────

    async fn authorize(&self, request: &AuthRequest) -> Reply {
        let verdict = {
            let tables = self.tables.read().await;
            self.engine.evaluate(&tables, request)
        };
        debug!(
            user = %request.user,
            action = %request.action,
            authorized = verdict.authorized,
            admin = verdict.admin,
            "authorization evaluated"
        );

        let code = if verdict.authorized {
            ResultCode::Ok
        } else {
            ResultCode::Forbidden
        };
        Reply {
            code,
            body: ReplyBody::Verdict(verdict),
        }
    }

    async fn validate_token(
        &self,
        user: &str,
        value: &str,
        client_address: IpAddr,
    ) -> Result<Reply> {
        let now = Utc::now();
        let token = self
            .tokens
            .read(&value.to_string(), BearerToken::clone)
            .await
            .ok_or_else(|| SupervisorError::Unauthorized(format!("unknown token for {user}")))?;

        if token.user_name != user {
            return Err(SupervisorError::Unauthorized(format!(
                "token of {} presented by {user}",
                token.user_name
            )));
        }
        if now > token.expires_at {
            self.tokens.remove(&token.value).await;
            return Err(SupervisorError::Unauthorized(format!(
                "expired token for {user}"
            )));
        }
        if !token.is_valid_at(now) {
            return Err(SupervisorError::Unauthorized(format!(
                "token for {user} not yet valid"
            )));
        }

        let active = self
            .credentials
            .read(&token.user_name, |c| c.is_valid_at(now))
            .await
            .unwrap_or(false);
        if !active {
            return Err(SupervisorError::Unauthorized(format!(
                "credential of {user} inactive"
            )));
        }

        debug!(user, %client_address, "token validated");
        Ok(Reply::ok(ReplyBody::Empty))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Categories, permissions and rights
    // ─────────────────────────────────────────────────────────────────────────

    /// Check a table change, persist it, then apply it.
    async fn change_tables<C, A>(&self, check: C, ops: Vec<StoreOp>, apply: A) -> Result<Reply>
    where
        C: FnOnce(&PermissionTables) -> std::result::Result<(), PermsError>,
        A: FnOnce(&mut PermissionTables) -> std::result::Result<(), PermsError>,
    {
        let _gate = self.mutation_gate.lock().await;

        check(&*self.tables.read().await)?;
        let names: Vec<_> = ops.iter().map(StoreOp::name).collect();
        self.store.commit(ops).await?;
        apply(&mut *self.tables.write().await)?;

        info!(ops = ?names, "permission tables changed");
        Ok(Reply::accepted())
    }

    async fn user_id(&self, user: &str) -> Result<Uuid> {
        self.tables
            .read()
            .await
            .user(user)
            .map(|entry| entry.id)
            .ok_or_else(|| PermsError::UnknownUser(user.to_string()).into())
    }

    async fn category(&self, action: CategoryAction) -> Result<Reply> {
        match action {
            CategoryAction::List => {
                let categories = self.tables.read().await.categories();
                Ok(Reply::ok(ReplyBody::Categories(categories)))
            }
            CategoryAction::Add(name) => {
                self.change_tables(
                    |t| t.check_add_category(&name),
                    vec![StoreOp::AddCategory(name.clone())],
                    |t| t.add_category(&name),
                )
                .await
            }
            CategoryAction::Remove(name) => {
                self.change_tables(
                    |t| t.check_remove_category(&name),
                    vec![StoreOp::RemoveCategory(name.clone())],
                    |t| t.remove_category(&name),
                )
                .await
            }
        }
    }

    async fn permission(&self, action: PermissionAction) -> Result<Reply> {
        match action {
            PermissionAction::List => {
                let permissions = self
                    .tables
                    .read()
                    .await
                    .permissions()
                    .into_iter()
                    .map(|(name, category)| PermissionInfo { name, category })
                    .collect();
                Ok(Reply::ok(ReplyBody::Permissions(permissions)))
            }
            PermissionAction::Show(name) => {
                let category = self
                    .tables
                    .read()
                    .await
                    .permission_category(&name)
                    .map(str::to_string)
                    .ok_or_else(|| PermsError::UnknownPermission(name.clone()))?;
                Ok(Reply::ok(ReplyBody::Permissions(vec![PermissionInfo {
                    name,
                    category,
                }])))
            }
            PermissionAction::Add { name, category } => {
                let record = PermissionRecord {
                    name: name.clone(),
                    category: category.clone(),
                };
                self.change_tables(
                    |t| t.check_add_permission(&name, &category),
                    vec![StoreOp::AddPermission(record)],
                    |t| t.add_permission(&name, &category),
                )
                .await
            }
            PermissionAction::Remove(name) => {
                self.change_tables(
                    |t| t.check_remove_permission(&name),
                    vec![StoreOp::RemovePermission(name.clone())],
                    |t| t.remove_permission(&name),
                )
                .await
            }
        }
    }

    async fn right(&self, action: RightAction) -> Result<Reply> {
        match action {
            RightAction::List { user } => {
                let user_id = self.user_id(&user).await?;
                let rights = self
                    .tables
                    .read()
                    .await
                    .rights_of(user_id)
                    .into_iter()
                    .map(|(permission, scope)| RightInfo { permission, scope })
                    .collect();
                Ok(Reply::ok(ReplyBody::Rights(rights)))
            }
            RightAction::Grant {
                user,
                permission,
                scope,
            } => {
                let user_id = self.user_id(&user).await?;
                let record = GrantRecord {
                    user_id,
                    permission: permission.clone(),
                    scope,
                };
                self.change_tables(
                    |t| t.check_grant(user_id, &permission, scope),
                    vec![StoreOp::GrantRight(record)],
                    |t| t.grant(user_id, &permission, scope),
                )
                .await
            }
            RightAction::Revoke {
                user,
                permission,
                scope,
            } => {
                let user_id = self.user_id(&user).await?;
                let record = GrantRecord {
                    user_id,
                    permission: permission.clone(),
                    scope,
                };
                self.change_tables(
                    |t| t.check_revoke(user_id, &permission, scope),
                    vec![StoreOp::RevokeRight(record)],
                    |t| t.revoke(user_id, &permission, scope),
                )
                .await
            }
        }
    }
}

/// Seal a token under the exchange the request arrived on.
fn seal(kex: &mut KeyExchange, token: &BearerToken) -> Result<Reply> {
    let json = serde_json::to_vec(token).map_err(CoreError::from)?;
    let sealed = kex.encrypt_and_encode(&json)?;
    Ok(Reply::ok(ReplyBody::Sealed(sealed)))
}
