use async_trait::async_trait;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Decode, Row, Type};
use tracing::{debug, error};

use sapporo_core::{
    CoreError, Run, RunDraft, RunRepository, RunState, Service, ServiceDraft, ServiceRepository,
    StoreHealth, SupportedWesVersion, SupportedWesVersionDraft, SupportedWesVersionRepository,
    User, UserDraft, UserRepository, Workflow, WorkflowDraft, WorkflowEngine, WorkflowEngineDraft,
    WorkflowEngineRepository, WorkflowRepository, WorkflowType, WorkflowTypeDraft,
    WorkflowTypeRepository,
};

use crate::PostgresConnection;

/// Translate a database error, keeping constraint violations distinguishable
fn db_error(context: &str, err: sqlx::Error) -> CoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return CoreError::Conflict(format!("{}: {}", context, db_err.message()));
        }
        if db_err.is_foreign_key_violation() {
            return CoreError::ReferenceError(format!("{}: {}", context, db_err.message()));
        }
    }
    error!(?err, "{}", context);
    CoreError::StateStoreError(format!("{}: {}", context, err))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, CoreError>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| CoreError::SerializationError(format!("Error getting {}: {}", name, e)))
}

fn user_from_row(row: &PgRow) -> Result<User, CoreError> {
    Ok(User {
        id: column(row, "id")?,
        username: column(row, "username")?,
        password_hash: column(row, "password_hash")?,
        is_active: column(row, "is_active")?,
        is_staff: column(row, "is_staff")?,
        is_superuser: column(row, "is_superuser")?,
        date_joined: column(row, "date_joined")?,
        last_login: column(row, "last_login")?,
    })
}

fn service_from_row(row: &PgRow) -> Result<Service, CoreError> {
    Ok(Service {
        id: column(row, "id")?,
        name: column(row, "name")?,
        endpoint: column(row, "endpoint")?,
        auth_instructions_url: column(row, "auth_instructions_url")?,
        contact_info_url: column(row, "contact_info_url")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn wes_version_from_row(row: &PgRow) -> Result<SupportedWesVersion, CoreError> {
    Ok(SupportedWesVersion {
        id: column(row, "id")?,
        service_id: column(row, "service_id")?,
        version: column(row, "version")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn workflow_type_from_row(row: &PgRow) -> Result<WorkflowType, CoreError> {
    Ok(WorkflowType {
        id: column(row, "id")?,
        name: column(row, "name")?,
        version: column(row, "version")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn workflow_engine_from_row(row: &PgRow) -> Result<WorkflowEngine, CoreError> {
    Ok(WorkflowEngine {
        id: column(row, "id")?,
        service_id: column(row, "service_id")?,
        name: column(row, "name")?,
        version: column(row, "version")?,
        workflow_type_ids: column(row, "workflow_type_ids")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn workflow_from_row(row: &PgRow) -> Result<Workflow, CoreError> {
    Ok(Workflow {
        id: column(row, "id")?,
        service_id: column(row, "service_id")?,
        name: column(row, "name")?,
        version: column(row, "version")?,
        workflow_type_id: column(row, "workflow_type_id")?,
        location: column(row, "location")?,
        content: column(row, "content")?,
        parameters_template_location: column(row, "parameters_template_location")?,
        parameters_template: column(row, "parameters_template")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn run_from_row(row: &PgRow) -> Result<Run, CoreError> {
    let state: String = column(row, "state")?;
    Ok(Run {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        workflow_id: column(row, "workflow_id")?,
        workflow_engine_id: column(row, "workflow_engine_id")?,
        name: column(row, "name")?,
        run_id: column(row, "run_id")?,
        state: state.parse()?,
        parameters: column(row, "parameters")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn collect<T>(rows: Vec<PgRow>, map: fn(&PgRow) -> Result<T, CoreError>) -> Result<Vec<T>, CoreError> {
    rows.iter().map(map).collect()
}

fn expect_row(rows_affected: u64, entity: &'static str, id: i64) -> Result<(), CoreError> {
    if rows_affected == 0 {
        Err(CoreError::not_found(entity, id))
    } else {
        Ok(())
    }
}

const ENGINE_SELECT: &str = "
    SELECT e.id, e.service_id, e.name, e.version, e.created_at, e.updated_at,
           ARRAY(
               SELECT t.workflow_type_id FROM workflow_engine_workflow_types t
               WHERE t.workflow_engine_id = e.id
               ORDER BY t.workflow_type_id
           ) AS workflow_type_ids
    FROM workflow_engines e
";

const RUN_COLUMNS: &str = "id, user_id, workflow_id, workflow_engine_id, name, run_id, state, \
                           parameters, created_at, updated_at";

/// PostgreSQL store implementing every sapporo-web repository
#[derive(Debug, Clone)]
pub struct PostgresStore {
    conn: PostgresConnection,
}

impl PostgresStore {
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }

    async fn fetch_engine(&self, id: i64) -> Result<Option<WorkflowEngine>, CoreError> {
        let query = format!("{ENGINE_SELECT} WHERE e.id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to load workflow engine", e))?;
        row.as_ref().map(workflow_engine_from_row).transpose()
    }

    async fn replace_engine_types(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        engine_id: i64,
        type_ids: &[i64],
    ) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM workflow_engine_workflow_types WHERE workflow_engine_id = $1")
            .bind(engine_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to clear workflow engine types", e))?;
        for type_id in type_ids {
            sqlx::query(
                "INSERT INTO workflow_engine_workflow_types (workflow_engine_id, workflow_type_id)
                 VALUES ($1, $2)",
            )
            .bind(engine_id)
            .bind(type_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to link workflow type", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PostgresStore {
    async fn list(&self) -> Result<Vec<User>, CoreError> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY id")
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list users", e))?;
        collect(rows, user_from_row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, CoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to load user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to load user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert(&self, draft: UserDraft) -> Result<User, CoreError> {
        draft.validate()?;
        let row = sqlx::query(
            "INSERT INTO users (username, password_hash, is_active, is_staff, is_superuser)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(&draft.username)
        .bind(&draft.password_hash)
        .bind(draft.is_active)
        .bind(draft.is_staff)
        .bind(draft.is_superuser)
        .fetch_one(self.conn.pool())
        .await
        .map_err(|e| db_error("Failed to insert user", e))?;
        let user = user_from_row(&row)?;
        debug!(user_id = user.id, username = %user.username, "Inserted user");
        Ok(user)
    }

    async fn update(&self, id: i64, draft: UserDraft) -> Result<User, CoreError> {
        draft.validate()?;
        let row = sqlx::query(
            "UPDATE users
             SET username = $2, password_hash = $3, is_active = $4, is_staff = $5, is_superuser = $6
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&draft.username)
        .bind(&draft.password_hash)
        .bind(draft.is_active)
        .bind(draft.is_staff)
        .bind(draft.is_superuser)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| db_error("Failed to update user", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()?
            .ok_or_else(|| CoreError::not_found("user", id))
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), CoreError> {
        if password_hash.is_empty() {
            return Err(CoreError::ValidationError("password: this field is required".to_string()));
        }
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to set password", e))?;
        expect_row(result.rows_affected(), "user", id)
    }

    async fn record_login(&self, id: i64) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to record login", e))?;
        expect_row(result.rows_affected(), "user", id)
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to delete user", e))?;
        expect_row(result.rows_affected(), "user", id)
    }
}

#[async_trait]
impl ServiceRepository for PostgresStore {
    async fn list(&self) -> Result<Vec<Service>, CoreError> {
        let rows = sqlx::query("SELECT * FROM services ORDER BY id")
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list services", e))?;
        collect(rows, service_from_row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Service>, CoreError> {
        let row = sqlx::query("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to load service", e))?;
        row.as_ref().map(service_from_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Service>, CoreError> {
        let row = sqlx::query("SELECT * FROM services WHERE name = $1")
            .bind(name)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to load service", e))?;
        row.as_ref().map(service_from_row).transpose()
    }

    async fn insert(&self, draft: ServiceDraft) -> Result<Service, CoreError> {
        draft.validate()?;
        let row = sqlx::query(
            "INSERT INTO services (name, endpoint, auth_instructions_url, contact_info_url)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(&draft.name)
        .bind(&draft.endpoint)
        .bind(&draft.auth_instructions_url)
        .bind(&draft.contact_info_url)
        .fetch_one(self.conn.pool())
        .await
        .map_err(|e| db_error("Failed to insert service", e))?;
        service_from_row(&row)
    }

    async fn update(&self, id: i64, draft: ServiceDraft) -> Result<Service, CoreError> {
        draft.validate()?;
        let row = sqlx::query(
            "UPDATE services
             SET name = $2, endpoint = $3, auth_instructions_url = $4, contact_info_url = $5,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.endpoint)
        .bind(&draft.auth_instructions_url)
        .bind(&draft.contact_info_url)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| db_error("Failed to update service", e))?;
        row.as_ref()
            .map(service_from_row)
            .transpose()?
            .ok_or_else(|| CoreError::not_found("service", id))
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to delete service", e))?;
        expect_row(result.rows_affected(), "service", id)
    }
}

#[async_trait]
impl SupportedWesVersionRepository for PostgresStore {
    async fn list(&self) -> Result<Vec<SupportedWesVersion>, CoreError> {
        let rows = sqlx::query("SELECT * FROM supported_wes_versions ORDER BY id")
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list supported WES versions", e))?;
        collect(rows, wes_version_from_row)
    }

    async fn list_for_service(&self, service_id: i64) -> Result<Vec<SupportedWesVersion>, CoreError> {
        let rows = sqlx::query("SELECT * FROM supported_wes_versions WHERE service_id = $1 ORDER BY id")
            .bind(service_id)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list supported WES versions", e))?;
        collect(rows, wes_version_from_row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<SupportedWesVersion>, CoreError> {
        let row = sqlx::query("SELECT * FROM supported_wes_versions WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to load supported WES version", e))?;
        row.as_ref().map(wes_version_from_row).transpose()
    }

    async fn insert(&self, draft: SupportedWesVersionDraft) -> Result<SupportedWesVersion, CoreError> {
        draft.validate()?;
        let row = sqlx::query(
            "INSERT INTO supported_wes_versions (service_id, version) VALUES ($1, $2) RETURNING *",
        )
        .bind(draft.service_id)
        .bind(&draft.version)
        .fetch_one(self.conn.pool())
        .await
        .map_err(|e| db_error("Failed to insert supported WES version", e))?;
        wes_version_from_row(&row)
    }

    async fn update(
        &self,
        id: i64,
        draft: SupportedWesVersionDraft,
    ) -> Result<SupportedWesVersion, CoreError> {
        draft.validate()?;
        let row = sqlx::query(
            "UPDATE supported_wes_versions
             SET service_id = $2, version = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(draft.service_id)
        .bind(&draft.version)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| db_error("Failed to update supported WES version", e))?;
        row.as_ref()
            .map(wes_version_from_row)
            .transpose()?
            .ok_or_else(|| CoreError::not_found("supported WES version", id))
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM supported_wes_versions WHERE id = $1")
            .bind(id)
            .execute(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to delete supported WES version", e))?;
        expect_row(result.rows_affected(), "supported WES version", id)
    }
}

#[async_trait]
impl WorkflowTypeRepository for PostgresStore {
    async fn list(&self) -> Result<Vec<WorkflowType>, CoreError> {
        let rows = sqlx::query("SELECT * FROM workflow_types ORDER BY id")
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list workflow types", e))?;
        collect(rows, workflow_type_from_row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<WorkflowType>, CoreError> {
        let row = sqlx::query("SELECT * FROM workflow_types WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to load workflow type", e))?;
        row.as_ref().map(workflow_type_from_row).transpose()
    }

    async fn find_by_name_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<WorkflowType>, CoreError> {
        let row = sqlx::query("SELECT * FROM workflow_types WHERE name = $1 AND version = $2")
            .bind(name)
            .bind(version)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to load workflow type", e))?;
        row.as_ref().map(workflow_type_from_row).transpose()
    }

    async fn insert(&self, draft: WorkflowTypeDraft) -> Result<WorkflowType, CoreError> {
        draft.validate()?;
        let row = sqlx::query("INSERT INTO workflow_types (name, version) VALUES ($1, $2) RETURNING *")
            .bind(&draft.name)
            .bind(&draft.version)
            .fetch_one(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to insert workflow type", e))?;
        workflow_type_from_row(&row)
    }

    async fn update(&self, id: i64, draft: WorkflowTypeDraft) -> Result<WorkflowType, CoreError> {
        draft.validate()?;
        let row = sqlx::query(
            "UPDATE workflow_types SET name = $2, version = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.version)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| db_error("Failed to update workflow type", e))?;
        row.as_ref()
            .map(workflow_type_from_row)
            .transpose()?
            .ok_or_else(|| CoreError::not_found("workflow type", id))
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM workflow_types WHERE id = $1")
            .bind(id)
            .execute(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to delete workflow type", e))?;
        expect_row(result.rows_affected(), "workflow type", id)
    }
}

#[async_trait]
impl WorkflowEngineRepository for PostgresStore {
    async fn list(&self) -> Result<Vec<WorkflowEngine>, CoreError> {
        let query = format!("{ENGINE_SELECT} ORDER BY e.id");
        let rows = sqlx::query(&query)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list workflow engines", e))?;
        collect(rows, workflow_engine_from_row)
    }

    async fn list_for_service(&self, service_id: i64) -> Result<Vec<WorkflowEngine>, CoreError> {
        let query = format!("{ENGINE_SELECT} WHERE e.service_id = $1 ORDER BY e.id");
        let rows = sqlx::query(&query)
            .bind(service_id)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list workflow engines", e))?;
        collect(rows, workflow_engine_from_row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<WorkflowEngine>, CoreError> {
        self.fetch_engine(id).await
    }

    async fn insert(&self, draft: WorkflowEngineDraft) -> Result<WorkflowEngine, CoreError> {
        draft.validate()?;
        let mut tx = self
            .conn
            .pool()
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO workflow_engines (service_id, name, version) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(draft.service_id)
        .bind(&draft.name)
        .bind(&draft.version)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to insert workflow engine", e))?;
        Self::replace_engine_types(&mut tx, id, &draft.unique_type_ids()).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit workflow engine", e))?;

        self.fetch_engine(id)
            .await?
            .ok_or_else(|| CoreError::not_found("workflow engine", id))
    }

    async fn update(&self, id: i64, draft: WorkflowEngineDraft) -> Result<WorkflowEngine, CoreError> {
        draft.validate()?;
        let mut tx = self
            .conn
            .pool()
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        let result = sqlx::query(
            "UPDATE workflow_engines SET service_id = $2, name = $3, version = $4, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(draft.service_id)
        .bind(&draft.name)
        .bind(&draft.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update workflow engine", e))?;
        expect_row(result.rows_affected(), "workflow engine", id)?;
        Self::replace_engine_types(&mut tx, id, &draft.unique_type_ids()).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit workflow engine", e))?;

        self.fetch_engine(id)
            .await?
            .ok_or_else(|| CoreError::not_found("workflow engine", id))
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM workflow_engines WHERE id = $1")
            .bind(id)
            .execute(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to delete workflow engine", e))?;
        expect_row(result.rows_affected(), "workflow engine", id)
    }
}

#[async_trait]
impl WorkflowRepository for PostgresStore {
    async fn list(&self) -> Result<Vec<Workflow>, CoreError> {
        let rows = sqlx::query("SELECT * FROM workflows ORDER BY id")
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list workflows", e))?;
        collect(rows, workflow_from_row)
    }

    async fn list_for_service(&self, service_id: i64) -> Result<Vec<Workflow>, CoreError> {
        let rows = sqlx::query("SELECT * FROM workflows WHERE service_id = $1 ORDER BY id")
            .bind(service_id)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list workflows", e))?;
        collect(rows, workflow_from_row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Workflow>, CoreError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to load workflow", e))?;
        row.as_ref().map(workflow_from_row).transpose()
    }

    async fn insert(&self, draft: WorkflowDraft) -> Result<Workflow, CoreError> {
        draft.validate()?;
        let row = sqlx::query(
            "INSERT INTO workflows (service_id, name, version, workflow_type_id, location, content,
                                    parameters_template_location, parameters_template)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(draft.service_id)
        .bind(&draft.name)
        .bind(&draft.version)
        .bind(draft.workflow_type_id)
        .bind(&draft.location)
        .bind(&draft.content)
        .bind(&draft.parameters_template_location)
        .bind(&draft.parameters_template)
        .fetch_one(self.conn.pool())
        .await
        .map_err(|e| db_error("Failed to insert workflow", e))?;
        workflow_from_row(&row)
    }

    async fn update(&self, id: i64, draft: WorkflowDraft) -> Result<Workflow, CoreError> {
        draft.validate()?;
        let row = sqlx::query(
            "UPDATE workflows
             SET service_id = $2, name = $3, version = $4, workflow_type_id = $5, location = $6,
                 content = $7, parameters_template_location = $8, parameters_template = $9,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(draft.service_id)
        .bind(&draft.name)
        .bind(&draft.version)
        .bind(draft.workflow_type_id)
        .bind(&draft.location)
        .bind(&draft.content)
        .bind(&draft.parameters_template_location)
        .bind(&draft.parameters_template)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| db_error("Failed to update workflow", e))?;
        row.as_ref()
            .map(workflow_from_row)
            .transpose()?
            .ok_or_else(|| CoreError::not_found("workflow", id))
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id)
            .execute(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to delete workflow", e))?;
        expect_row(result.rows_affected(), "workflow", id)
    }
}

#[async_trait]
impl RunRepository for PostgresStore {
    async fn list(&self) -> Result<Vec<Run>, CoreError> {
        let query = format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY id");
        let rows = sqlx::query(&query)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list runs", e))?;
        collect(rows, run_from_row)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Run>, CoreError> {
        let query =
            format!("SELECT {RUN_COLUMNS} FROM runs WHERE user_id = $1 ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to list runs", e))?;
        collect(rows, run_from_row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Run>, CoreError> {
        let query = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to load run", e))?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn insert(&self, draft: RunDraft) -> Result<Run, CoreError> {
        draft.validate()?;
        let query = format!(
            "INSERT INTO runs (user_id, workflow_id, workflow_engine_id, name, run_id, state, parameters)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {RUN_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(draft.user_id)
            .bind(draft.workflow_id)
            .bind(draft.workflow_engine_id)
            .bind(&draft.name)
            .bind(&draft.run_id)
            .bind(draft.state.as_str())
            .bind(&draft.parameters)
            .fetch_one(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to insert run", e))?;
        run_from_row(&row)
    }

    async fn update(&self, id: i64, draft: RunDraft) -> Result<Run, CoreError> {
        draft.validate()?;
        let query = format!(
            "UPDATE runs
             SET user_id = $2, workflow_id = $3, workflow_engine_id = $4, name = $5, run_id = $6,
                 state = $7, parameters = $8, updated_at = NOW()
             WHERE id = $1
             RETURNING {RUN_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(draft.user_id)
            .bind(draft.workflow_id)
            .bind(draft.workflow_engine_id)
            .bind(&draft.name)
            .bind(&draft.run_id)
            .bind(draft.state.as_str())
            .bind(&draft.parameters)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to update run", e))?;
        row.as_ref()
            .map(run_from_row)
            .transpose()?
            .ok_or_else(|| CoreError::not_found("run", id))
    }

    async fn update_state(
        &self,
        id: i64,
        run_id: Option<String>,
        state: RunState,
    ) -> Result<Run, CoreError> {
        let query = format!(
            "UPDATE runs SET run_id = COALESCE($2, run_id), state = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING {RUN_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(run_id)
            .bind(state.as_str())
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to update run state", e))?;
        row.as_ref()
            .map(run_from_row)
            .transpose()?
            .ok_or_else(|| CoreError::not_found("run", id))
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM runs WHERE id = $1")
            .bind(id)
            .execute(self.conn.pool())
            .await
            .map_err(|e| db_error("Failed to delete run", e))?;
        expect_row(result.rows_affected(), "run", id)
    }
}

#[async_trait]
impl StoreHealth for PostgresStore {
    async fn health_check(&self) -> Result<bool, CoreError> {
        match sqlx::query("SELECT 1").execute(self.conn.pool()).await {
            Ok(_) => Ok(true),
            Err(err) => {
                error!(?err, "PostgreSQL health check failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rows_map_to_not_found() {
        assert!(expect_row(0, "run", 7).unwrap_err().is_not_found());
        assert!(expect_row(1, "run", 7).is_ok());
    }

    #[test]
    fn non_database_errors_are_store_errors() {
        let err = db_error("Failed to load run", sqlx::Error::RowNotFound);
        assert!(matches!(err, CoreError::StateStoreError(msg) if msg.starts_with("Failed to load run")));
    }

    #[test]
    fn engine_select_aggregates_type_ids() {
        assert!(ENGINE_SELECT.contains("AS workflow_type_ids"));
        assert!(RUN_COLUMNS.split(", ").any(|c| c.trim() == "state"));
    }
}
