//! PostgreSQL implementation of the credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{Membership, OrgWithRole, Organization, Role, User};
use crate::services::store::{CredentialStore, StoreError, StoreTransaction};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    #[instrument(skip(database_url), fields(service = "identity-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ==================== User Operations ====================

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, pw_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, pw_hash, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, pw_hash, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    // ==================== Membership Operations ====================

    async fn find_membership_role(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<Option<Role>, StoreError> {
        let role = sqlx::query_scalar::<_, Role>(
            "SELECT role FROM memberships WHERE user_id = $1 AND org_id = $2",
        )
        .bind(user_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    #[instrument(skip(self, membership), fields(user_id = %membership.user_id, org_id = %membership.org_id))]
    async fn insert_membership(&self, membership: &Membership) -> Result<(), StoreError> {
        insert_membership_query(membership)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Organization Operations ====================

    async fn find_organization(&self, org_id: Uuid) -> Result<Option<Organization>, StoreError> {
        let org = sqlx::query_as::<_, Organization>(
            "SELECT id, name, created_at, updated_at FROM orgs WHERE id = $1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(org)
    }

    async fn list_organizations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrgWithRole>, StoreError> {
        let orgs = sqlx::query_as::<_, OrgWithRole>(
            r#"
            SELECT o.id, o.name, o.created_at, o.updated_at, m.role
            FROM orgs o
            JOIN memberships m ON o.id = m.org_id
            WHERE m.user_id = $1
            ORDER BY o.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(orgs)
    }

    async fn update_organization_name(
        &self,
        org_id: Uuid,
        name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Organization>, StoreError> {
        let org = sqlx::query_as::<_, Organization>(
            r#"
            UPDATE orgs SET name = $1, updated_at = $2
            WHERE id = $3
            RETURNING id, name, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(updated_at)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(org)
    }

    #[instrument(skip(self))]
    async fn delete_organization(&self, org_id: Uuid) -> Result<bool, StoreError> {
        // Memberships go with the org via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM orgs WHERE id = $1")
            .bind(org_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn insert_membership_query(
    membership: &Membership,
) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO memberships (user_id, org_id, role, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(membership.user_id)
    .bind(membership.org_id)
    .bind(membership.role)
    .bind(membership.created_at)
}

/// sqlx rolls an uncommitted transaction back when it is dropped.
struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn insert_organization(&mut self, org: &Organization) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orgs (id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(org.created_at)
        .bind(org.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_membership(&mut self, membership: &Membership) -> Result<(), StoreError> {
        insert_membership_query(membership)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
