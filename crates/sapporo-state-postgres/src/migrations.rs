/// Generate SQL migrations for the sapporo-web PostgreSQL schema
///
/// Each entry is applied once, in order, and recorded in
/// `sapporo_migrations`. Foreign keys carry the delete behaviour the
/// repositories promise: owned rows cascade, optional links are set to NULL.
pub fn generate_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "20240401000000_accounts",
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(150) NOT NULL UNIQUE,
                password_hash VARCHAR(128) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                is_staff BOOLEAN NOT NULL DEFAULT FALSE,
                is_superuser BOOLEAN NOT NULL DEFAULT FALSE,
                date_joined TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_login TIMESTAMPTZ NULL
            );
            "#,
        ),
        (
            "20240401000001_services",
            r#"
            CREATE TABLE IF NOT EXISTS services (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(256) NOT NULL UNIQUE,
                endpoint VARCHAR(256) NOT NULL,
                auth_instructions_url VARCHAR(256) NULL,
                contact_info_url VARCHAR(256) NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE TABLE IF NOT EXISTS supported_wes_versions (
                id BIGSERIAL PRIMARY KEY,
                service_id BIGINT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
                version VARCHAR(256) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (service_id, version)
            );

            CREATE INDEX IF NOT EXISTS idx_supported_wes_versions_service_id
                ON supported_wes_versions(service_id);
            "#,
        ),
        (
            "20240401000002_workflows",
            r#"
            CREATE TABLE IF NOT EXISTS workflow_types (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(256) NOT NULL,
                version VARCHAR(256) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (name, version)
            );

            CREATE TABLE IF NOT EXISTS workflow_engines (
                id BIGSERIAL PRIMARY KEY,
                service_id BIGINT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
                name VARCHAR(256) NOT NULL,
                version VARCHAR(256) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE TABLE IF NOT EXISTS workflow_engine_workflow_types (
                workflow_engine_id BIGINT NOT NULL REFERENCES workflow_engines(id) ON DELETE CASCADE,
                workflow_type_id BIGINT NOT NULL REFERENCES workflow_types(id) ON DELETE CASCADE,
                PRIMARY KEY (workflow_engine_id, workflow_type_id)
            );

            CREATE TABLE IF NOT EXISTS workflows (
                id BIGSERIAL PRIMARY KEY,
                service_id BIGINT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
                name VARCHAR(256) NOT NULL,
                version VARCHAR(256) NOT NULL,
                workflow_type_id BIGINT NULL REFERENCES workflow_types(id) ON DELETE SET NULL,
                location VARCHAR(256) NOT NULL,
                content TEXT NOT NULL,
                parameters_template_location VARCHAR(256) NOT NULL,
                parameters_template TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_workflow_engines_service_id ON workflow_engines(service_id);
            CREATE INDEX IF NOT EXISTS idx_workflows_service_id ON workflows(service_id);
            "#,
        ),
        (
            "20240401000003_runs",
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                workflow_id BIGINT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                workflow_engine_id BIGINT NULL REFERENCES workflow_engines(id) ON DELETE SET NULL,
                name VARCHAR(256) NOT NULL,
                run_id VARCHAR(256) NULL,
                state VARCHAR(32) NOT NULL DEFAULT 'UNKNOWN',
                parameters TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_runs_user_id_created_at ON runs(user_id, created_at DESC);
            "#,
        ),
    ]
}

/// Bookkeeping table for applied migrations
pub(crate) const MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS sapporo_migrations (
        name TEXT PRIMARY KEY,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;
