use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::authz::DataAccessError;
use crate::models::{AccessLevel, BranchAccess, Build, Namespace, Pipeline, Project, ProtectedBranch, Visibility};

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, DataAccessError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| DataAccessError::backend(format!("missing {}: {}", name, e)))
}

fn parse_uuid(s: &str) -> Result<Uuid, DataAccessError> {
    Uuid::parse_str(s.trim()).map_err(|e| DataAccessError::backend(format!("invalid uuid: {}", e)))
}

fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, DataAccessError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_uuid(&s)?)),
        _ => Ok(None),
    }
}

fn uuid_column(row: &SqliteRow, name: &str) -> Result<Uuid, DataAccessError> {
    let s: String = column(row, name)?;
    parse_uuid(&s)
}

fn opt_uuid_column(row: &SqliteRow, name: &str) -> Result<Option<Uuid>, DataAccessError> {
    let s: Option<String> = column(row, name)?;
    parse_opt_uuid(s)
}

pub fn namespace_from_row(row: &SqliteRow) -> Result<Namespace, DataAccessError> {
    Ok(Namespace {
        id: uuid_column(row, "id")?,
        path: column(row, "path")?,
        owner_id: opt_uuid_column(row, "owner_id")?,
    })
}

pub fn project_from_row(row: &SqliteRow) -> Result<Project, DataAccessError> {
    let visibility_s: String = column(row, "visibility")?;
    let visibility = visibility_s
        .parse::<Visibility>()
        .map_err(DataAccessError::backend)?;

    Ok(Project {
        id: uuid_column(row, "id")?,
        namespace_id: uuid_column(row, "namespace_id")?,
        path: column(row, "path")?,
        visibility,
        public_builds: column(row, "public_builds")?,
        archived: column(row, "archived")?,
    })
}

pub fn pipeline_from_row(row: &SqliteRow) -> Result<Pipeline, DataAccessError> {
    Ok(Pipeline {
        id: uuid_column(row, "id")?,
        project_id: uuid_column(row, "project_id")?,
        ref_name: column(row, "ref_name")?,
        user_id: opt_uuid_column(row, "user_id")?,
    })
}

pub fn build_from_row(row: &SqliteRow) -> Result<Build, DataAccessError> {
    Ok(Build {
        id: uuid_column(row, "id")?,
        pipeline_id: uuid_column(row, "pipeline_id")?,
        name: column(row, "name")?,
        ref_name: column(row, "ref_name")?,
        user_id: opt_uuid_column(row, "user_id")?,
    })
}

pub fn access_level_from_row(row: &SqliteRow) -> Result<AccessLevel, DataAccessError> {
    let value: i64 = column(row, "access_level")?;
    AccessLevel::from_i64(value)
        .ok_or_else(|| DataAccessError::backend(format!("invalid access level: {}", value)))
}

pub fn protected_branch_from_row(row: &SqliteRow) -> Result<ProtectedBranch, DataAccessError> {
    let branch_access = |name: &str| -> Result<BranchAccess, DataAccessError> {
        let value: i64 = column(row, name)?;
        BranchAccess::from_i64(value)
            .ok_or_else(|| DataAccessError::backend(format!("invalid {}: {}", name, value)))
    };

    Ok(ProtectedBranch {
        id: uuid_column(row, "id")?,
        project_id: uuid_column(row, "project_id")?,
        name: column(row, "name")?,
        push_access: branch_access("push_access_level")?,
        merge_access: branch_access("merge_access_level")?,
    })
}
