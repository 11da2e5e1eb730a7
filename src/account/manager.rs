/// Account manager implementation using runtime queries
use crate::{
    account::{ChangePasswordRequest, LoginRequest, RegisterRequest, TrainerProfileUpdate},
    auth::{lockout_policy, Actor, IssuedToken, LockoutPolicy, PasswordHasher, Role, RoleResolver, SessionClaims, TokenClaims, TokenService},
    config::ServerConfig,
    db::{
        self,
        account::{Principal, TrainerProfile},
    },
    error::{HubError, HubResult},
    moderation,
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;

const MIN_PASSWORD_LENGTH: usize = 8;

const TRAINER_PROFILE_COLUMNS: &str =
    "t.id AS trainer_id, t.principal_id, p.display_name, t.speciality, t.bio";

const PRINCIPAL_COLUMNS: &str =
    "id, email, display_name, password_hash, active, failed_attempts, locked_until, created_at";

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    tokens: Arc<TokenService>,
    roles: RoleResolver,
    lockout: Arc<dyn LockoutPolicy>,
    hasher: PasswordHasher,
}

impl AccountManager {
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>, tokens: Arc<TokenService>) -> Self {
        let roles = RoleResolver::new(db.clone(), &config.authentication.admin_email);
        let lockout = lockout_policy(&config.lockout, db.clone());
        tracing::info!(policy = lockout.name(), "account lockout policy selected");

        Self {
            db,
            config,
            tokens,
            roles,
            lockout,
            hasher: PasswordHasher::new(),
        }
    }

    /// Create a principal with a default client membership
    pub async fn register(&self, req: RegisterRequest) -> HubResult<Principal> {
        if !self.config.authentication.allow_registration {
            return Err(HubError::Forbidden("Registration is disabled".to_string()));
        }

        let email = normalize_email(&req.email);
        self.validate_registration(&email, &req.display_name, &req.password)?;

        let password_hash = self.hasher.hash_password(&req.password)?;
        let mut tx = self.db.begin().await?;
        let principal = insert_principal(&mut tx, &email, req.display_name.trim(), &password_hash).await?;
        add_client(&mut tx, principal.id).await?;
        tx.commit().await?;

        tracing::info!(principal_id = principal.id, "principal registered");
        Ok(principal)
    }

    /// Check credentials and issue a session token carrying the current role
    pub async fn login(&self, req: LoginRequest) -> HubResult<IssuedToken> {
        let email = normalize_email(&req.email);

        let principal = match self.find_by_email(&email).await? {
            Some(p) => p,
            None => {
                tracing::debug!("login for unknown email");
                return Err(HubError::AuthenticationRequired("Invalid credentials".to_string()));
            }
        };

        if let Some(until) = self.lockout.locked_until(principal.id).await? {
            return Err(HubError::AccountLocked { until });
        }

        if !self.hasher.verify_password(&req.password, &principal.password_hash)? {
            self.lockout.record_failed_attempt(principal.id).await?;
            tracing::info!(principal_id = principal.id, "failed login");
            return Err(HubError::AuthenticationRequired("Invalid credentials".to_string()));
        }

        // Only disclosed to callers holding the password
        if !principal.active {
            return Err(HubError::Forbidden("Account is deactivated".to_string()));
        }

        self.lockout.record_success(principal.id).await?;

        let role = self.roles.resolve(principal.id).await?;
        let issued = self.tokens.issue(
            SessionClaims {
                principal_id: principal.id,
                role,
                display_name: principal.display_name.clone(),
            },
            self.tokens.default_ttl(),
        )?;

        tracing::info!(principal_id = principal.id, role = %role, jti = %issued.claims.jti, "session issued");
        Ok(issued)
    }

    /// Revoke the presented session token. Expired tokens may still log out.
    pub async fn logout(&self, token: &str) -> HubResult<TokenClaims> {
        let claims = self.tokens.revoke_token(token).await?;
        tracing::info!(principal_id = claims.principal_id, jti = %claims.jti, "session revoked");
        Ok(claims)
    }

    /// Replace the caller's password after checking the current one.
    /// Outstanding sessions stay valid.
    pub async fn change_password(&self, actor: Actor, req: ChangePasswordRequest) -> HubResult<()> {
        let principal = self.get_principal(actor.principal_id).await?;

        if !self.hasher.verify_password(&req.current_password, &principal.password_hash)? {
            tracing::info!(principal_id = principal.id, "password change with wrong current password");
            return Err(HubError::AuthenticationRequired("Invalid current password".to_string()));
        }
        validate_password(&req.new_password)?;

        let password_hash = self.hasher.hash_password(&req.new_password)?;
        sqlx::query("UPDATE principal SET password_hash = ?1 WHERE id = ?2")
            .bind(&password_hash)
            .bind(principal.id)
            .execute(&self.db)
            .await?;

        tracing::info!(principal_id = principal.id, "password changed");
        Ok(())
    }

    /// Trainer profile of a principal; NotFound without a trainer row
    pub async fn trainer_profile(&self, principal_id: i64) -> HubResult<TrainerProfile> {
        sqlx::query_as::<_, TrainerProfile>(&format!(
            "SELECT {} FROM trainer t JOIN principal p ON p.id = t.principal_id WHERE t.principal_id = ?1",
            TRAINER_PROFILE_COLUMNS
        ))
        .bind(principal_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Trainer profile for principal {} not found", principal_id)))
    }

    /// Edit the caller's own trainer profile
    pub async fn update_trainer_profile(
        &self,
        actor: Actor,
        update: TrainerProfileUpdate,
    ) -> HubResult<TrainerProfile> {
        let result = sqlx::query(
            "UPDATE trainer SET speciality = COALESCE(?1, speciality), bio = COALESCE(?2, bio) \
             WHERE principal_id = ?3",
        )
        .bind(update.speciality.as_deref().map(str::trim))
        .bind(update.bio.as_deref().map(str::trim))
        .bind(actor.principal_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::Forbidden("Not a trainer".to_string()));
        }

        self.trainer_profile(actor.principal_id).await
    }

    /// Active trainers, newest first. The configured admin is not listed.
    pub async fn list_trainers(&self) -> HubResult<Vec<TrainerProfile>> {
        let trainers = sqlx::query_as::<_, TrainerProfile>(&format!(
            "SELECT {} FROM trainer t JOIN principal p ON p.id = t.principal_id \
             WHERE p.active = 1 AND p.email <> ?1 ORDER BY t.id DESC",
            TRAINER_PROFILE_COLUMNS
        ))
        .bind(self.roles.admin_email())
        .fetch_all(&self.db)
        .await?;

        Ok(trainers)
    }

    pub async fn get_principal(&self, principal_id: i64) -> HubResult<Principal> {
        sqlx::query_as::<_, Principal>(&format!(
            "SELECT {} FROM principal WHERE id = ?1",
            PRINCIPAL_COLUMNS
        ))
        .bind(principal_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Principal {} not found", principal_id)))
    }

    async fn find_by_email(&self, email: &str) -> HubResult<Option<Principal>> {
        let principal = sqlx::query_as::<_, Principal>(&format!(
            "SELECT {} FROM principal WHERE email = ?1",
            PRINCIPAL_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        Ok(principal)
    }

    /// Create the admin account with trainer and client memberships.
    /// An existing account is left untouched.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> HubResult<Principal> {
        let email = normalize_email(email);
        if let Some(existing) = self.find_by_email(&email).await? {
            tracing::debug!(principal_id = existing.id, "admin account already present");
            return Ok(existing);
        }

        let password_hash = self.hasher.hash_password(password)?;
        let mut tx = self.db.begin().await?;
        let principal = insert_principal(&mut tx, &email, "Admin", &password_hash).await?;
        add_trainer(&mut tx, principal.id).await?;
        add_client(&mut tx, principal.id).await?;
        tx.commit().await?;

        tracing::info!(principal_id = principal.id, "admin account bootstrapped");
        Ok(principal)
    }

    /// Rewrite a principal's memberships so it resolves to `role`.
    ///
    /// Trainer adds a trainer row. Client keeps or creates the client row and
    /// drops the trainer row. User drops both. A trainer row still owning
    /// content cannot be dropped. Already issued tokens keep their old role
    /// until they expire.
    pub async fn set_role(&self, admin: Actor, principal_id: i64, role: Role) -> HubResult<Role> {
        admin.require_admin()?;
        if role == Role::Admin {
            return Err(HubError::Validation(
                "Admin role is derived from the configured admin email".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM principal WHERE id = ?1")
            .bind(principal_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(HubError::NotFound(format!("Principal {} not found", principal_id)));
        }

        match role {
            Role::Trainer => add_trainer(&mut tx, principal_id).await?,
            Role::Client => {
                drop_trainer(&mut tx, principal_id).await?;
                add_client(&mut tx, principal_id).await?;
            }
            Role::User => {
                drop_trainer(&mut tx, principal_id).await?;
                sqlx::query("DELETE FROM client WHERE principal_id = ?1")
                    .bind(principal_id)
                    .execute(&mut *tx)
                    .await?;
            }
            Role::Admin => {}
        }

        tx.commit().await?;

        let resolved = self.roles.resolve(principal_id).await?;
        tracing::warn!(
            principal_id,
            role = %resolved,
            ttl_secs = self.config.authentication.token_ttl_secs,
            "memberships changed; outstanding tokens keep their previous role until expiry"
        );
        Ok(resolved)
    }

    /// Soft delete: block logins and unpublish the principal's content
    pub async fn deactivate(&self, admin: Actor, principal_id: i64) -> HubResult<Principal> {
        admin.require_admin()?;
        let principal = self.get_principal(principal_id).await?;
        if principal.email == self.roles.admin_email() {
            return Err(HubError::Conflict("The configured admin cannot be deactivated".to_string()));
        }

        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE principal SET active = 0 WHERE id = ?1")
            .bind(principal_id)
            .execute(&mut *tx)
            .await?;
        for table in ["routine", "plan"] {
            sqlx::query(&format!(
                "UPDATE {} SET published = 0 WHERE trainer_id IN (SELECT id FROM trainer WHERE principal_id = ?1)",
                table
            ))
            .bind(principal_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(principal_id, admin = admin.principal_id, "principal deactivated");
        self.get_principal(principal_id).await
    }

    /// Allow logins again. Content stays unpublished.
    pub async fn reactivate(&self, admin: Actor, principal_id: i64) -> HubResult<Principal> {
        admin.require_admin()?;

        let result = sqlx::query("UPDATE principal SET active = 1 WHERE id = ?1")
            .bind(principal_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("Principal {} not found", principal_id)));
        }

        tracing::info!(principal_id, admin = admin.principal_id, "principal reactivated");
        self.get_principal(principal_id).await
    }

    /// Remove a principal with everything it owns.
    ///
    /// Pending reviews of its content are closed as rejected; memberships,
    /// content and subscription requests are removed by cascade.
    pub async fn hard_delete(&self, admin: Actor, principal_id: i64) -> HubResult<()> {
        admin.require_admin()?;

        let mut tx = self.db.begin().await?;
        let email: String = sqlx::query_scalar("SELECT email FROM principal WHERE id = ?1")
            .bind(principal_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Principal {} not found", principal_id)))?;
        if email == self.roles.admin_email() {
            return Err(HubError::Conflict("The configured admin cannot be deleted".to_string()));
        }

        let trainer_id: Option<i64> = sqlx::query_scalar("SELECT id FROM trainer WHERE principal_id = ?1")
            .bind(principal_id)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(trainer_id) = trainer_id {
            let closed = moderation::reject_pending_for_trainer(&mut tx, trainer_id, admin.principal_id).await?;
            tracing::debug!(trainer_id, closed, "pending reviews closed");
        }

        sqlx::query("DELETE FROM principal WHERE id = ?1")
            .bind(principal_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(principal_id, admin = admin.principal_id, "principal deleted");
        Ok(())
    }

    fn validate_registration(&self, email: &str, display_name: &str, password: &str) -> HubResult<()> {
        let valid_email = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !valid_email || email.chars().any(char::is_whitespace) {
            return Err(HubError::Validation("Invalid email address".to_string()));
        }
        if display_name.trim().is_empty() {
            return Err(HubError::Validation("Display name cannot be empty".to_string()));
        }
        validate_password(password)
    }
}

fn validate_password(password: &str) -> HubResult<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(HubError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

async fn insert_principal(
    conn: &mut SqliteConnection,
    email: &str,
    display_name: &str,
    password_hash: &str,
) -> HubResult<Principal> {
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO principal (email, display_name, password_hash, active, failed_attempts, created_at) \
         VALUES (?1, ?2, ?3, 1, 0, ?4)",
    )
    .bind(email)
    .bind(display_name)
    .bind(password_hash)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            HubError::Conflict("Email already registered".to_string())
        } else {
            HubError::Database(e)
        }
    })?;

    Ok(Principal {
        id: result.last_insert_rowid(),
        email: email.to_string(),
        display_name: display_name.to_string(),
        password_hash: password_hash.to_string(),
        active: true,
        failed_attempts: 0,
        locked_until: None,
        created_at: now,
    })
}

async fn add_trainer(conn: &mut SqliteConnection, principal_id: i64) -> HubResult<()> {
    sqlx::query(
        "INSERT INTO trainer (principal_id, created_at) VALUES (?1, ?2) ON CONFLICT(principal_id) DO NOTHING",
    )
    .bind(principal_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn add_client(conn: &mut SqliteConnection, principal_id: i64) -> HubResult<()> {
    sqlx::query(
        "INSERT INTO client (principal_id, created_at) VALUES (?1, ?2) ON CONFLICT(principal_id) DO NOTHING",
    )
    .bind(principal_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Drop the trainer row unless it still owns content
async fn drop_trainer(conn: &mut SqliteConnection, principal_id: i64) -> HubResult<()> {
    let owned: i64 = sqlx::query_scalar(
        r#"
        SELECT (SELECT COUNT(*) FROM routine r JOIN trainer t ON t.id = r.trainer_id WHERE t.principal_id = ?1)
             + (SELECT COUNT(*) FROM plan p JOIN trainer t ON t.id = p.trainer_id WHERE t.principal_id = ?1)
        "#,
    )
    .bind(principal_id)
    .fetch_one(&mut *conn)
    .await?;

    if owned > 0 {
        return Err(HubError::Conflict(format!(
            "Trainer still owns {} content item(s)",
            owned
        )));
    }

    sqlx::query("DELETE FROM trainer WHERE principal_id = ?1")
        .bind(principal_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockoutConfig;
    use crate::content::{ContentKind, ContentRef, ContentStore, NewContent};
    use crate::moderation::ModerationManager;
    use crate::subscription::SubscriptionManager;
    use crate::test_support::{test_config, test_pool, ADMIN_EMAIL};

    async fn setup_with(config: ServerConfig) -> (AccountManager, Arc<TokenService>, SqlitePool) {
        let pool = test_pool().await;
        let tokens = Arc::new(TokenService::new(pool.clone(), &config.authentication));
        let manager = AccountManager::new(pool.clone(), Arc::new(config), tokens.clone());
        (manager, tokens, pool)
    }

    async fn setup() -> (AccountManager, Arc<TokenService>, SqlitePool) {
        setup_with(test_config()).await
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            display_name: "Alice".to_string(),
            password: "password123".to_string(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    async fn admin(manager: &AccountManager) -> Actor {
        let principal = manager.ensure_admin(ADMIN_EMAIL, "adminpassword").await.unwrap();
        Actor::new(principal.id, Role::Admin)
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (manager, tokens, _) = setup().await;

        let principal = manager.register(register_request(" Alice@Example.com ")).await.unwrap();
        assert_eq!(principal.email, "alice@example.com");
        assert!(principal.password_hash.starts_with("$argon2"));

        let issued = manager
            .login(login_request("ALICE@example.com", "password123"))
            .await
            .unwrap();
        assert_eq!(issued.claims.principal_id, principal.id);
        // Registration provisions a client membership
        assert_eq!(issued.claims.role, Role::Client);
        assert_eq!(issued.claims.display_name, "Alice");

        let claims = tokens.validate(&issued.token).await.unwrap();
        assert_eq!(claims, issued.claims);
    }

    #[tokio::test]
    async fn test_register_validation_and_conflict() {
        let (manager, _, _) = setup().await;

        manager.register(register_request("a@example.com")).await.unwrap();
        assert!(matches!(
            manager.register(register_request("A@example.com")).await,
            Err(HubError::Conflict(_))
        ));

        assert!(matches!(
            manager.register(register_request("not-an-email")).await,
            Err(HubError::Validation(_))
        ));

        let mut short = register_request("b@example.com");
        short.password = "short".to_string();
        assert!(matches!(manager.register(short).await, Err(HubError::Validation(_))));
    }

    #[tokio::test]
    async fn test_registration_toggle() {
        let mut config = test_config();
        config.authentication.allow_registration = false;
        let (manager, _, _) = setup_with(config).await;

        assert!(matches!(
            manager.register(register_request("a@example.com")).await,
            Err(HubError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let (manager, _, _) = setup().await;
        manager.register(register_request("a@example.com")).await.unwrap();

        assert!(matches!(
            manager.login(login_request("a@example.com", "wrong-password")).await,
            Err(HubError::AuthenticationRequired(_))
        ));
        assert!(matches!(
            manager.login(login_request("nobody@example.com", "password123")).await,
            Err(HubError::AuthenticationRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_lockout_disabled_by_default() {
        let (manager, _, _) = setup().await;
        manager.register(register_request("a@example.com")).await.unwrap();

        for _ in 0..6 {
            let _ = manager.login(login_request("a@example.com", "wrong-password")).await;
        }
        assert!(manager.login(login_request("a@example.com", "password123")).await.is_ok());
    }

    #[tokio::test]
    async fn test_lockout_when_enabled() {
        let mut config = test_config();
        config.lockout = LockoutConfig {
            enabled: true,
            max_failed_attempts: 2,
            lockout_minutes: 10,
        };
        let (manager, _, _) = setup_with(config).await;
        manager.register(register_request("a@example.com")).await.unwrap();

        for _ in 0..2 {
            assert!(manager.login(login_request("a@example.com", "wrong-password")).await.is_err());
        }
        assert!(matches!(
            manager.login(login_request("a@example.com", "password123")).await,
            Err(HubError::AccountLocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_session() {
        let (manager, tokens, _) = setup().await;
        manager.register(register_request("a@example.com")).await.unwrap();
        let issued = manager.login(login_request("a@example.com", "password123")).await.unwrap();

        let claims = manager.logout(&issued.token).await.unwrap();
        assert_eq!(claims.jti, issued.claims.jti);
        // Logging out twice is harmless
        manager.logout(&issued.token).await.unwrap();

        assert!(matches!(
            tokens.validate(&issued.token).await,
            Err(HubError::TokenRevoked)
        ));
        // A fresh login is unaffected
        let again = manager.login(login_request("a@example.com", "password123")).await.unwrap();
        assert!(tokens.validate(&again.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_admin_bootstrap() {
        let (manager, _, _) = setup().await;

        let first = manager.ensure_admin("ADMIN@test.local", "adminpassword").await.unwrap();
        let second = manager.ensure_admin(ADMIN_EMAIL, "other").await.unwrap();
        assert_eq!(first.id, second.id);

        let issued = manager.login(login_request(ADMIN_EMAIL, "adminpassword")).await.unwrap();
        assert_eq!(issued.claims.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_set_role() {
        let (manager, _, pool) = setup().await;
        let admin = admin(&manager).await;
        let user = manager.register(register_request("a@example.com")).await.unwrap();

        assert_eq!(manager.set_role(admin, user.id, Role::Trainer).await.unwrap(), Role::Trainer);
        assert_eq!(manager.set_role(admin, user.id, Role::Client).await.unwrap(), Role::Client);
        assert_eq!(manager.set_role(admin, user.id, Role::User).await.unwrap(), Role::User);

        assert!(matches!(
            manager.set_role(admin, user.id, Role::Admin).await,
            Err(HubError::Validation(_))
        ));
        assert!(matches!(
            manager.set_role(Actor::new(user.id, Role::User), user.id, Role::Trainer).await,
            Err(HubError::Forbidden(_))
        ));
        assert!(matches!(
            manager.set_role(admin, 999, Role::Client).await,
            Err(HubError::NotFound(_))
        ));

        // A trainer owning content keeps the trainer row
        manager.set_role(admin, user.id, Role::Trainer).await.unwrap();
        let moderation = ModerationManager::new(pool.clone());
        moderation
            .submit(
                Actor::new(user.id, Role::Trainer),
                ContentKind::Routine,
                NewContent {
                    name: "R".to_string(),
                    description: None,
                    body: None,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            manager.set_role(admin, user.id, Role::Client).await,
            Err(HubError::Conflict(_))
        ));
        let resolver = RoleResolver::new(pool.clone(), ADMIN_EMAIL);
        assert_eq!(resolver.resolve(user.id).await.unwrap(), Role::Trainer);
    }

    #[tokio::test]
    async fn test_deactivate_and_reactivate() {
        let (manager, _, pool) = setup().await;
        let admin = admin(&manager).await;
        let user = manager.register(register_request("a@example.com")).await.unwrap();
        manager.set_role(admin, user.id, Role::Trainer).await.unwrap();

        let moderation = ModerationManager::new(pool.clone());
        let outcome = moderation
            .submit(
                Actor::new(user.id, Role::Trainer),
                ContentKind::Plan,
                NewContent {
                    name: "P".to_string(),
                    description: None,
                    body: None,
                },
            )
            .await
            .unwrap();
        moderation.approve_content(admin, outcome.content.reference()).await.unwrap();

        let deactivated = manager.deactivate(admin, user.id).await.unwrap();
        assert!(!deactivated.active);
        assert!(matches!(
            manager.login(login_request("a@example.com", "password123")).await,
            Err(HubError::Forbidden(_))
        ));

        let store = ContentStore::new(pool.clone());
        assert!(!store.get(outcome.content.reference()).await.unwrap().published);

        assert!(manager.reactivate(admin, user.id).await.unwrap().active);
        assert!(manager.login(login_request("a@example.com", "password123")).await.is_ok());
        assert!(!store.get(outcome.content.reference()).await.unwrap().published);

        assert!(matches!(
            manager.deactivate(admin, admin.principal_id).await,
            Err(HubError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_hard_delete_cascades() {
        let (manager, _, pool) = setup().await;
        let admin = admin(&manager).await;
        let trainer = manager.register(register_request("coach@example.com")).await.unwrap();
        manager.set_role(admin, trainer.id, Role::Trainer).await.unwrap();
        let client = manager.register(register_request("client@example.com")).await.unwrap();

        let trainer_actor = Actor::new(trainer.id, Role::Trainer);
        let moderation = ModerationManager::new(pool.clone());
        let new = NewContent {
            name: "R".to_string(),
            description: None,
            body: None,
        };
        let pending = moderation.submit(trainer_actor, ContentKind::Routine, new.clone()).await.unwrap();
        let plan = moderation.submit(trainer_actor, ContentKind::Plan, new).await.unwrap();
        moderation.approve_content(admin, plan.content.reference()).await.unwrap();

        let requests = SubscriptionManager::new(pool.clone());
        requests
            .request_access(Actor::new(client.id, Role::Client), plan.content.reference(), None)
            .await
            .unwrap();

        manager.hard_delete(admin, trainer.id).await.unwrap();

        assert!(matches!(
            manager.get_principal(trainer.id).await,
            Err(HubError::NotFound(_))
        ));
        let store = ContentStore::new(pool.clone());
        assert!(store.get(pending.content.reference()).await.is_err());
        assert!(store.get(ContentRef::plan(plan.content.id)).await.is_err());

        let request_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscription_request")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(request_count, 0);

        let review_state: String = sqlx::query_scalar("SELECT state FROM content_review WHERE id = ?1")
            .bind(pending.review.unwrap().id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(review_state, "rejected");

        // The client is untouched
        assert!(manager.get_principal(client.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_configured_admin_cannot_be_deleted() {
        let (manager, _, _) = setup().await;
        let admin = admin(&manager).await;

        assert!(matches!(
            manager.hard_delete(admin, admin.principal_id).await,
            Err(HubError::Conflict(_))
        ));
        assert!(matches!(
            manager.hard_delete(admin, 999).await,
            Err(HubError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivation_hidden_behind_password() {
        let (manager, _, _) = setup().await;
        let admin = admin(&manager).await;
        let user = manager.register(register_request("a@example.com")).await.unwrap();
        manager.deactivate(admin, user.id).await.unwrap();

        assert!(matches!(
            manager.login(login_request("a@example.com", "wrong-password")).await,
            Err(HubError::AuthenticationRequired(_))
        ));
        assert!(matches!(
            manager.login(login_request("a@example.com", "password123")).await,
            Err(HubError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (manager, tokens, _) = setup().await;
        let user = manager.register(register_request("a@example.com")).await.unwrap();
        let session = manager.login(login_request("a@example.com", "password123")).await.unwrap();
        let actor = Actor::new(user.id, Role::Client);

        let wrong = ChangePasswordRequest {
            current_password: "not-my-password".to_string(),
            new_password: "new-password-456".to_string(),
        };
        assert!(matches!(
            manager.change_password(actor, wrong).await,
            Err(HubError::AuthenticationRequired(_))
        ));

        let too_short = ChangePasswordRequest {
            current_password: "password123".to_string(),
            new_password: "short".to_string(),
        };
        assert!(matches!(
            manager.change_password(actor, too_short).await,
            Err(HubError::Validation(_))
        ));

        manager
            .change_password(
                actor,
                ChangePasswordRequest {
                    current_password: "password123".to_string(),
                    new_password: "new-password-456".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            manager.login(login_request("a@example.com", "password123")).await,
            Err(HubError::AuthenticationRequired(_))
        ));
        assert!(manager.login(login_request("a@example.com", "new-password-456")).await.is_ok());
        // Existing sessions survive the change
        assert!(tokens.validate(&session.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_trainer_profile_and_listing() {
        let (manager, _, _) = setup().await;
        let admin = admin(&manager).await;
        let coach = manager.register(register_request("coach@example.com")).await.unwrap();
        let other = manager.register(register_request("other@example.com")).await.unwrap();
        let client = manager.register(register_request("client@example.com")).await.unwrap();
        manager.set_role(admin, coach.id, Role::Trainer).await.unwrap();
        manager.set_role(admin, other.id, Role::Trainer).await.unwrap();

        let coach_actor = Actor::new(coach.id, Role::Trainer);
        let profile = manager
            .update_trainer_profile(
                coach_actor,
                TrainerProfileUpdate {
                    speciality: Some(" Strength ".to_string()),
                    bio: Some("Ten years coaching".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.principal_id, coach.id);
        assert_eq!(profile.speciality.as_deref(), Some("Strength"));

        // Absent fields are kept
        let profile = manager
            .update_trainer_profile(
                coach_actor,
                TrainerProfileUpdate {
                    speciality: None,
                    bio: Some("Eleven years coaching".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.speciality.as_deref(), Some("Strength"));
        assert_eq!(profile.bio.as_deref(), Some("Eleven years coaching"));
        assert_eq!(manager.trainer_profile(coach.id).await.unwrap(), profile);

        assert!(matches!(
            manager
                .update_trainer_profile(Actor::new(client.id, Role::Client), TrainerProfileUpdate::default())
                .await,
            Err(HubError::Forbidden(_))
        ));
        assert!(matches!(
            manager.trainer_profile(client.id).await,
            Err(HubError::NotFound(_))
        ));

        // Newest first, admin and deactivated trainers hidden
        let listed: Vec<i64> = manager.list_trainers().await.unwrap().iter().map(|t| t.principal_id).collect();
        assert_eq!(listed, vec![other.id, coach.id]);

        manager.deactivate(admin, other.id).await.unwrap();
        let listed: Vec<i64> = manager.list_trainers().await.unwrap().iter().map(|t| t.principal_id).collect();
        assert_eq!(listed, vec![coach.id]);
    }
}
