//! Build record lifecycle.
//!
//! A build record tracks one build / deploy / revert cycle for a given
//! branch and revision. A record is inserted when a build starts and is
//! progressively filled in as later phases complete. Records are never
//! physically removed by the data layer; [`soft_delete`] stamps
//! [`delete_dttm`] instead, and deleted records refuse any further
//! lifecycle updates.
//!
//! [`delete_dttm`]: Model::delete_dttm

use derive_more::{Display, Error, From};
use sea_orm::{entity::prelude::*, ActiveValue, QueryOrder, QuerySelect, TransactionTrait};
use time::OffsetDateTime;
use tracing::info;

use crate::{SelectExt, SelectSingleExt, TransactionErrorExt};

/// Build record model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "build")]
pub struct Model {
    /// Unique build record identifier.
    #[sea_orm(primary_key)]
    pub build_id: i64,

    /// Branch the build was started from.
    pub branch: String,

    /// Revision the build was started from.
    pub revision: String,

    /// Version label attached by a completed build.
    ///
    /// Unique among records that carry one; [`None`] for failed or
    /// unfinished builds.
    pub version: Option<String>,

    pub build_output_tx: Option<String>,
    pub build_exit_status: Option<i32>,
    pub build_exec_sec: Option<Decimal>,
    pub build_size: Option<Decimal>,

    /// Version that was live until this record was deployed.
    ///
    /// A soft link by label, deliberately not a foreign key. [`None`]
    /// for the first deploy.
    pub previous_version: Option<String>,

    pub deploy_dttm: Option<TimeDateTime>,
    pub deploy_output_tx: Option<String>,
    pub deploy_exit_status: Option<i32>,

    pub revert_dttm: Option<TimeDateTime>,
    pub revert_output_tx: Option<String>,
    pub revert_exit_status: Option<i32>,

    /// Record creation timestamp. Never changes after insert.
    pub create_dttm: TimeDateTime,

    /// Refreshed whenever the record is saved.
    pub update_dttm: TimeDateTime,

    /// Soft-delete marker.
    pub delete_dttm: Option<TimeDateTime>,
}

impl Model {
    /// Whether the record is marked logically deleted.
    pub fn is_deleted(&self) -> bool {
        self.delete_dttm.is_some()
    }

    /// Whether the deploy phase has run.
    pub fn is_deployed(&self) -> bool {
        self.deploy_dttm.is_some()
    }

    /// Whether the revert phase has run.
    pub fn is_reverted(&self) -> bool {
        self.revert_dttm.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    // Every lifecycle operation writes through ActiveModel saves, so the
    // timestamp contract holds no matter which operation ran.
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let stamp = now();

        if insert && self.create_dttm.is_not_set() {
            self.create_dttm = ActiveValue::Set(stamp);
        }

        self.update_dttm = ActiveValue::Set(stamp);

        Ok(self)
    }
}

/// Errors reported by build record lifecycle operations.
#[derive(Debug, Display, Error, From)]
pub enum LifecycleError {
    /// Database-related error.
    DatabaseError(DbErr),

    /// No build record carries the requested identifier.
    #[display(fmt = "build record not found")]
    NotFound,

    /// The record is soft-deleted and refuses lifecycle updates.
    #[display(fmt = "build record is deleted")]
    Deleted,

    /// Another record already carries the requested version label.
    #[display(fmt = "version {} is already taken", _0)]
    VersionTaken(#[error(not(source))] String),

    /// Revert was requested for a record that was never deployed.
    #[display(fmt = "build record was never deployed")]
    NotDeployed,
}

/// Outcome of the build phase, recorded by [`finish_build`].
#[derive(Clone, Debug)]
pub struct BuildOutcome {
    /// Version label produced by the build.
    ///
    /// [`None`] for failed builds; unversioned records never conflict
    /// with each other.
    pub version: Option<String>,

    /// Captured build log.
    pub output: String,

    /// Build process exit code.
    pub exit_status: i32,

    /// Build duration, in seconds.
    pub exec_sec: Option<Decimal>,

    /// Artifact size.
    pub size: Option<Decimal>,
}

/// Captured output of a deploy or revert command.
#[derive(Clone, Debug)]
pub struct CommandOutput {
    /// Captured command log.
    pub output: String,

    /// Command exit code.
    pub exit_status: i32,
}

/// Insert a new record for a build that just started.
///
/// Branch and revision are known at this point; every phase column starts
/// out [`None`] and is filled in by later lifecycle transitions.
pub async fn start<C>(db: &C, branch: &str, revision: &str) -> Result<Model, LifecycleError>
where
    C: ConnectionTrait,
{
    let model = ActiveModel {
        branch: ActiveValue::Set(branch.to_owned()),
        revision: ActiveValue::Set(revision.to_owned()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(build_id = model.build_id, branch, revision, "build record created");

    Ok(model)
}

/// Record the build phase outcome.
///
/// The version label is pre-checked inside the transaction so a duplicate
/// surfaces as [`LifecycleError::VersionTaken`]; the UNIQUE constraint on
/// the column remains the backstop.
pub async fn finish_build<C>(
    db: &C,
    build_id: i64,
    outcome: BuildOutcome,
) -> Result<Model, LifecycleError>
where
    C: ConnectionTrait + TransactionTrait,
{
    db.transaction(|txn| {
        Box::pin(async move {
            let model = find_alive(txn, build_id).await?;

            if let Some(version) = outcome.version.as_deref() {
                let taken = Entity::find()
                    .select_only()
                    .filter(Column::Version.eq(version))
                    .filter(Column::BuildId.ne(build_id))
                    .exists(txn)
                    .await?;

                if taken {
                    return Err(LifecycleError::VersionTaken(version.to_owned()));
                }
            }

            let mut record: ActiveModel = model.into();
            record.version = ActiveValue::Set(outcome.version);
            record.build_output_tx = ActiveValue::Set(Some(outcome.output));
            record.build_exit_status = ActiveValue::Set(Some(outcome.exit_status));
            record.build_exec_sec = ActiveValue::Set(outcome.exec_sec);
            record.build_size = ActiveValue::Set(outcome.size);

            let model = record.update(txn).await?;

            info!(
                build_id,
                version = ?model.version,
                exit_status = model.build_exit_status,
                "build phase recorded"
            );

            Ok(model)
        })
    })
    .await
    .into_raw_result()
}

/// Stamp the deploy phase and link the record to the version it replaced.
///
/// `previous_version` is computed inside the transaction from the record
/// that was live until this deploy; the first deploy leaves it [`None`].
pub async fn mark_deployed<C>(
    db: &C,
    build_id: i64,
    output: CommandOutput,
) -> Result<Model, LifecycleError>
where
    C: ConnectionTrait + TransactionTrait,
{
    db.transaction(|txn| {
        Box::pin(async move {
            let model = find_alive(txn, build_id).await?;

            let previous_version = live_query()
                .filter(Column::BuildId.ne(build_id))
                .one(txn)
                .await?
                .and_then(|live| live.version);

            let mut record: ActiveModel = model.into();
            record.previous_version = ActiveValue::Set(previous_version);
            record.deploy_dttm = ActiveValue::Set(Some(now()));
            record.deploy_output_tx = ActiveValue::Set(Some(output.output));
            record.deploy_exit_status = ActiveValue::Set(Some(output.exit_status));

            let model = record.update(txn).await?;

            info!(
                build_id,
                version = ?model.version,
                previous_version = ?model.previous_version,
                "deploy recorded"
            );

            Ok(model)
        })
    })
    .await
    .into_raw_result()
}

/// Stamp the revert phase.
///
/// Only deployed records can be reverted. A reverted record is no longer
/// considered live, and rolling forward again takes a new record.
pub async fn mark_reverted<C>(
    db: &C,
    build_id: i64,
    output: CommandOutput,
) -> Result<Model, LifecycleError>
where
    C: ConnectionTrait + TransactionTrait,
{
    db.transaction(|txn| {
        Box::pin(async move {
            let model = find_alive(txn, build_id).await?;

            if !model.is_deployed() {
                return Err(LifecycleError::NotDeployed);
            }

            let mut record: ActiveModel = model.into();
            record.revert_dttm = ActiveValue::Set(Some(now()));
            record.revert_output_tx = ActiveValue::Set(Some(output.output));
            record.revert_exit_status = ActiveValue::Set(Some(output.exit_status));

            let model = record.update(txn).await?;

            info!(build_id, version = ?model.version, "revert recorded");

            Ok(model)
        })
    })
    .await
    .into_raw_result()
}

/// Mark the record logically deleted.
///
/// The row stays in the table and remains reachable by identifier, but
/// refuses further lifecycle updates and disappears from [`scan_active`].
pub async fn soft_delete<C>(db: &C, build_id: i64) -> Result<Model, LifecycleError>
where
    C: ConnectionTrait + TransactionTrait,
{
    db.transaction(|txn| {
        Box::pin(async move {
            let model = find_alive(txn, build_id).await?;

            let mut record: ActiveModel = model.into();
            record.delete_dttm = ActiveValue::Set(Some(now()));

            let model = record.update(txn).await?;

            info!(build_id, "build record soft-deleted");

            Ok(model)
        })
    })
    .await
    .into_raw_result()
}

/// Find the record carrying a version label.
///
/// More than one match means the UNIQUE constraint was bypassed; this is
/// reported as an error instead of silently picking a row.
pub async fn find_by_version<C>(db: &C, version: &str) -> Result<Option<Model>, DbErr>
where
    C: ConnectionTrait + Send,
{
    Entity::find()
        .filter(Column::Version.eq(version))
        .single(db)
        .await
}

/// The record currently live in production, if any.
pub async fn live<C>(db: &C) -> Result<Option<Model>, DbErr>
where
    C: ConnectionTrait,
{
    live_query().one(db).await
}

/// Non-deleted records, newest first.
pub async fn scan_active<C>(db: &C, limit: u64, offset: u64) -> Result<Vec<Model>, DbErr>
where
    C: ConnectionTrait,
{
    Entity::find()
        .filter(Column::DeleteDttm.is_null())
        .order_by_desc(Column::BuildId)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await
}

/// Load a record that is expected to accept lifecycle updates.
async fn find_alive<C>(db: &C, build_id: i64) -> Result<Model, LifecycleError>
where
    C: ConnectionTrait,
{
    let model = Entity::find_by_id(build_id)
        .one(db)
        .await?
        .ok_or(LifecycleError::NotFound)?;

    if model.is_deleted() {
        return Err(LifecycleError::Deleted);
    }

    Ok(model)
}

/// Deployed, not reverted, not deleted records, latest deploy first.
///
/// Ties on `deploy_dttm` are broken by `build_id`, so the younger record
/// wins deterministically.
fn live_query() -> Select<Entity> {
    Entity::find()
        .filter(Column::DeployDttm.is_not_null())
        .filter(Column::RevertDttm.is_null())
        .filter(Column::DeleteDttm.is_null())
        .order_by_desc(Column::DeployDttm)
        .order_by_desc(Column::BuildId)
}

/// Current UTC wall-clock time as the naive timestamp stored in the table.
fn now() -> TimeDateTime {
    let utc = OffsetDateTime::now_utc();

    TimeDateTime::new(utc.date(), utc.time())
}
