pub mod extractors;
pub mod handlers;
pub mod password;
pub mod tokens;

use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::config::{BootstrapAdmin, Config};
use crate::errors::AppError;
use crate::models::user::{AccountRow, AccountView};
use password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use tokens::{issue_token, TokenKind};

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in_hours: i64,
    pub user: AccountView,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_credentials(email: &str, password: &str) -> Result<(), AppError> {
    if !email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    validate_credentials(email, password)
}

fn auth_response(config: &Config, account: &AccountRow, kind: TokenKind) -> Result<AuthResponse, AppError> {
    let token = issue_token(
        &config.jwt_secret,
        account.id,
        &account.email,
        &account.name,
        kind,
        config.token_expiry_hours,
    )?;
    Ok(AuthResponse {
        token,
        token_type: "bearer",
        expires_in_hours: config.token_expiry_hours,
        user: AccountView::from(account),
    })
}

/// Looks up an active account and checks its password. Every failure is the same 401.
async fn authenticate(
    db: &PgPool,
    table: &str,
    email: &str,
    password: &str,
) -> Result<AccountRow, AppError> {
    let account = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT * FROM {table} WHERE email = $1 AND is_active"
    ))
    .bind(normalize_email(email))
    .fetch_optional(db)
    .await?
    .ok_or(AppError::Unauthorized)?;

    if !verify_password(password, &account.password_hash).await? {
        return Err(AppError::Unauthorized);
    }
    Ok(account)
}

pub async fn admin_login(
    db: &PgPool,
    config: &Config,
    email: &str,
    password: &str,
) -> Result<AuthResponse, AppError> {
    let account = authenticate(db, "admin_users", email, password).await?;
    info!("Admin {} logged in", account.id);
    auth_response(config, &account, TokenKind::Admin)
}

pub async fn user_login(
    db: &PgPool,
    config: &Config,
    email: &str,
    password: &str,
) -> Result<AuthResponse, AppError> {
    let account = authenticate(db, "app_users", email, password).await?;
    info!("User {} logged in", account.id);
    auth_response(config, &account, TokenKind::User)
}

/// `None` from the upsert means the email belongs to an active account.
fn registered_account(row: Option<AccountRow>) -> Result<AccountRow, AppError> {
    row.ok_or_else(|| AppError::Conflict("An account with this email already exists".to_string()))
}

/// Registers an expert. A deactivated account with the same email is
/// re-activated with the new credentials; an active one is left untouched.
pub async fn user_register(
    db: &PgPool,
    config: &Config,
    name: &str,
    email: &str,
    password: &str,
) -> Result<AuthResponse, AppError> {
    validate_registration(name, email, password)?;
    let password_hash = hash_password(password).await?;

    let row = sqlx::query_as::<_, AccountRow>(
        r#"
        INSERT INTO app_users (id, email, password_hash, name, is_active)
        VALUES ($1, $2, $3, $4, TRUE)
        ON CONFLICT (email) DO UPDATE
            SET password_hash = EXCLUDED.password_hash,
                name = EXCLUDED.name,
                is_active = TRUE
            WHERE app_users.is_active = FALSE
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(normalize_email(email))
    .bind(&password_hash)
    .bind(name.trim())
    .fetch_optional(db)
    .await?;
    let account = registered_account(row)?;

    info!("Registered user {}", account.id);
    auth_response(config, &account, TokenKind::User)
}

/// Creates the configured admin on startup when no admin with that email exists.
pub async fn ensure_bootstrap_admin(db: &PgPool, admin: &BootstrapAdmin) -> Result<(), AppError> {
    validate_credentials(&admin.email, &admin.password)?;
    let password_hash = hash_password(&admin.password).await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO admin_users (id, email, password_hash, name)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(normalize_email(&admin.email))
    .bind(&password_hash)
    .bind(&admin.name)
    .execute(db)
    .await?
    .rows_affected();

    if inserted > 0 {
        info!("Bootstrap admin account created");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Expert@Example.COM "), "expert@example.com");
    }

    #[test]
    fn test_registration_validation() {
        assert!(validate_registration("Sam", "sam@example.com", "longenough").is_ok());
        assert!(validate_registration(" ", "sam@example.com", "longenough").is_err());
        assert!(validate_registration("Sam", "sam.example.com", "longenough").is_err());
        assert!(validate_registration("Sam", "sam@example.com", "short").is_err());
    }

    #[test]
    fn test_active_email_is_a_conflict() {
        assert!(matches!(registered_account(None), Err(AppError::Conflict(_))));

        let reactivated = AccountRow {
            id: Uuid::new_v4(),
            email: "sam@example.com".into(),
            password_hash: "hash".into(),
            name: "Sam".into(),
            is_active: true,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(registered_account(Some(reactivated.clone())).unwrap().id, reactivated.id);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_register_keeps_existing_password(db: PgPool) {
        let config = crate::state::test_support::test_config();
        let first = user_register(&db, &config, "Sam", "sam@example.com", "first-password")
            .await
            .unwrap();

        let second = user_register(&db, &config, "Mallory", "SAM@example.com", "second-password").await;
        assert!(matches!(second, Err(AppError::Conflict(_))));

        let login = user_login(&db, &config, "sam@example.com", "first-password")
            .await
            .unwrap();
        assert_eq!(login.user.id, first.user.id);
        assert_eq!(login.user.name, "Sam");
    }
}
