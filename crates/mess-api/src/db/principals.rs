//! Principal persistence operations on the `principals` table.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use mess_core::{Email, NumericId, PrincipalKind};
use mess_crypto::CredentialHash;
use mess_ledger::Principal;

use super::decode_error;

/// Insert or replace a principal.
pub async fn upsert(pool: &PgPool, p: &Principal) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO principals (kind, numeric_id, name, email, credential_hash, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (kind, numeric_id) DO UPDATE
         SET name = EXCLUDED.name,
             email = EXCLUDED.email,
             credential_hash = EXCLUDED.credential_hash,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(p.kind.as_str())
    .bind(p.numeric_id.value())
    .bind(&p.name)
    .bind(p.email.as_str())
    .bind(p.credential_hash.encode())
    .bind(p.created_at)
    .bind(p.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a principal. Returns whether a row was removed.
pub async fn delete(pool: &PgPool, kind: PrincipalKind, id: NumericId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM principals WHERE kind = $1 AND numeric_id = $2")
        .bind(kind.as_str())
        .bind(id.value())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load every principal for startup hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Principal>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PrincipalRow>(
        "SELECT kind, numeric_id, name, email, credential_hash, created_at, updated_at
         FROM principals ORDER BY kind, numeric_id",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(PrincipalRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    kind: String,
    numeric_id: i64,
    name: String,
    email: String,
    credential_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PrincipalRow {
    fn into_record(self) -> Result<Principal, sqlx::Error> {
        Ok(Principal {
            kind: PrincipalKind::from_str(&self.kind).map_err(|e| decode_error("kind", e))?,
            numeric_id: NumericId::new(self.numeric_id).map_err(|e| decode_error("numeric_id", e))?,
            name: self.name,
            email: Email::parse(&self.email).map_err(|e| decode_error("email", e))?,
            credential_hash: CredentialHash::parse(&self.credential_hash)
                .map_err(|e| decode_error("credential_hash", e))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
