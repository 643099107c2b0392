//! Database layer — migrations, queries, and the write-transaction helper.
//!
//! ## Locking model
//!
//! Cache mutations that touch budget totals run inside a `BEGIN IMMEDIATE`
//! transaction: SQLite takes the write lock up front, so concurrent
//! read-validate-write sequences serialize instead of both observing stale
//! "remaining budget". This is the `SELECT ... FOR UPDATE` equivalent the
//! allocation and release paths require.

use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{MilestoneRow, ProjectRow};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Write-transaction helpers
// ─────────────────────────────────────────────────────────

/// Acquire a connection and open an immediate (write-locked) transaction.
/// Callers must finish with [`commit`] or [`rollback`].
pub async fn begin_immediate(pool: &SqlitePool) -> Result<PoolConnection<Sqlite>> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(conn)
}

pub async fn commit(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("COMMIT").execute(&mut *conn).await?;
    Ok(())
}

pub async fn rollback(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("ROLLBACK").execute(&mut *conn).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Projects
// ─────────────────────────────────────────────────────────

/// Insert a new draft project row. Drafts have no ledger counterpart yet.
pub async fn create_draft_project(
    pool: &SqlitePool,
    title: &str,
    ministry: &str,
    total_budget: i64,
) -> Result<ProjectRow> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO projects (id, title, ministry, total_budget)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(&id)
    .bind(title)
    .bind(ministry)
    .bind(total_budget)
    .execute(pool)
    .await?;

    let row = get_project(pool, &id).await?;
    row.ok_or_else(|| sqlx::Error::RowNotFound.into())
}

pub async fn get_project(pool: &SqlitePool, id: &str) -> Result<Option<ProjectRow>> {
    let row = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Same lookup, but inside an already-open write transaction.
pub async fn get_project_locked(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<ProjectRow>> {
    let row = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Promote a draft to published, writing back the ledger identifiers.
pub async fn mark_published(
    conn: &mut SqliteConnection,
    id: &str,
    ledger_id: &str,
    ledger_address: &str,
    creation_tx: &str,
    authority: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE projects
        SET status = 'published',
            ledger_id = ?1,
            ledger_address = ?2,
            creation_tx = ?3,
            authority = ?4,
            updated_at = strftime('%s', 'now')
        WHERE id = ?5 AND status = 'draft'
        "#,
    )
    .bind(ledger_id)
    .bind(ledger_address)
    .bind(creation_tx)
    .bind(authority)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Milestones
// ─────────────────────────────────────────────────────────

pub async fn get_milestone(pool: &SqlitePool, id: &str) -> Result<Option<MilestoneRow>> {
    let row = sqlx::query_as::<_, MilestoneRow>("SELECT * FROM milestones WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Fetch a milestone together with its owning project.
pub async fn get_milestone_with_project(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<(MilestoneRow, ProjectRow)>> {
    let Some(milestone) = get_milestone(pool, id).await? else {
        return Ok(None);
    };
    let project = get_project(pool, &milestone.project_id).await?;
    Ok(project.map(|p| (milestone, p)))
}

pub async fn list_milestones(pool: &SqlitePool, project_id: &str) -> Result<Vec<MilestoneRow>> {
    let rows = sqlx::query_as::<_, MilestoneRow>(
        "SELECT * FROM milestones WHERE project_id = ?1 ORDER BY milestone_index ASC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Number of milestones already allocated for a project. The allocator
/// assigns the next index from this count, server-side.
pub async fn count_milestones(conn: &mut SqliteConnection, project_id: &str) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM milestones WHERE project_id = ?1")
            .bind(project_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count)
}

pub async fn milestone_index_exists(
    conn: &mut SqliteConnection,
    project_id: &str,
    index: i64,
) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM milestones WHERE project_id = ?1 AND milestone_index = ?2",
    )
    .bind(project_id)
    .bind(index)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.is_some())
}

/// Insert the cache milestone and bump the project's allocation total.
/// Call only after the corresponding ledger transaction is confirmed.
pub async fn insert_milestone(
    conn: &mut SqliteConnection,
    project_id: &str,
    index: i64,
    description: &str,
    amount: i64,
) -> Result<MilestoneRow> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO milestones (id, project_id, milestone_index, description, amount)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&id)
    .bind(project_id)
    .bind(index)
    .bind(description)
    .bind(amount)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE projects
        SET total_allocated = total_allocated + ?1,
            updated_at = strftime('%s', 'now')
        WHERE id = ?2
        "#,
    )
    .bind(amount)
    .bind(project_id)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, MilestoneRow>("SELECT * FROM milestones WHERE id = ?1")
        .bind(&id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row)
}

/// Record a confirmed release in the cache.
///
/// Idempotent: only an unreleased row is updated, and `total_released` is
/// bumped exactly when the row actually transitioned. Returns whether this
/// call performed the transition.
pub async fn mark_released(
    pool: &SqlitePool,
    milestone_id: &str,
    release_tx: &str,
    proof_url: &str,
    released_at: i64,
) -> Result<bool> {
    let mut conn = begin_immediate(pool).await?;
    let result = async {
        let updated = sqlx::query(
            r#"
            UPDATE milestones
            SET is_released = 1,
                release_tx = ?1,
                proof_url = ?2,
                released_at = ?3,
                updated_at = strftime('%s', 'now')
            WHERE id = ?4 AND is_released = 0
            "#,
        )
        .bind(release_tx)
        .bind(proof_url)
        .bind(released_at)
        .bind(milestone_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE projects
            SET total_released = total_released + (
                    SELECT amount FROM milestones WHERE id = ?1
                ),
                updated_at = strftime('%s', 'now')
            WHERE id = (SELECT project_id FROM milestones WHERE id = ?1)
            "#,
        )
        .bind(milestone_id)
        .execute(&mut *conn)
        .await?;
        Ok(true)
    }
    .await;

    match result {
        Ok(changed) => {
            commit(&mut conn).await?;
            Ok(changed)
        }
        Err(e) => {
            let _ = rollback(&mut conn).await;
            Err(e)
        }
    }
}
