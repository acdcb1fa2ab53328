//! Round trips against a live database.
//!
//! Run with `SAPPORO_TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.
//! Each test creates rows under unique names so reruns do not collide.

use std::sync::Arc;

use chrono::Utc;
use sapporo_core::{
    CoreError, Repositories, RunDraft, RunState, ServiceDraft, UserDraft, WorkflowDraft,
    WorkflowEngineDraft, WorkflowTypeDraft,
};
use sapporo_state_postgres::{PostgresConfig, PostgresConnection, PostgresStore};

async fn repositories() -> Option<Repositories> {
    let url = std::env::var("SAPPORO_TEST_DATABASE_URL").ok()?;
    let parsed = url.trim_start_matches("postgres://");
    let (credentials, rest) = parsed.split_once('@')?;
    let (user, password) = credentials.split_once(':')?;
    let (host_port, database) = rest.split_once('/')?;
    let (host, port) = host_port.split_once(':').unwrap_or((host_port, "5432"));
    let config = PostgresConfig {
        host: host.to_string(),
        port: port.parse().ok()?,
        database: database.to_string(),
        user: user.to_string(),
        password: password.to_string(),
        ..Default::default()
    };
    let conn = PostgresConnection::new(&config).await.ok()?;
    Some(Repositories::from_store(Arc::new(PostgresStore::new(conn))))
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_engine_types_and_cascades() {
    let Some(repos) = repositories().await else {
        return;
    };

    let service = repos
        .services
        .insert(ServiceDraft {
            name: unique("service"),
            endpoint: "http://localhost:1122".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let cwl = repos
        .workflow_types
        .insert(WorkflowTypeDraft::new(unique("CWL"), "v1.0"))
        .await
        .unwrap();

    let engine = repos
        .workflow_engines
        .insert(WorkflowEngineDraft {
            service_id: service.id,
            name: "cwltool".to_string(),
            version: "3.1".to_string(),
            workflow_type_ids: vec![cwl.id, cwl.id],
        })
        .await
        .unwrap();
    assert_eq!(engine.workflow_type_ids, vec![cwl.id]);

    let workflow = repos
        .workflows
        .insert(WorkflowDraft {
            service_id: service.id,
            name: "qc".to_string(),
            version: "1".to_string(),
            workflow_type_id: Some(cwl.id),
            location: "https://example.org/qc.cwl".to_string(),
            content: "cwlVersion: v1.0".to_string(),
            parameters_template_location: "https://example.org/qc.json".to_string(),
            parameters_template: "{}".to_string(),
        })
        .await
        .unwrap();
    let user = repos
        .users
        .insert(UserDraft::regular(unique("user"), "hash"))
        .await
        .unwrap();
    let run = repos
        .runs
        .insert(RunDraft {
            user_id: user.id,
            workflow_id: workflow.id,
            workflow_engine_id: Some(engine.id),
            name: "first".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let run = repos
        .runs
        .update_state(run.id, Some("wes-1".to_string()), RunState::Running)
        .await
        .unwrap();
    assert_eq!(run.state, RunState::Running);

    repos.workflow_engines.delete(engine.id).await.unwrap();
    let run = repos.runs.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(run.workflow_engine_id, None);

    repos.workflow_types.delete(cwl.id).await.unwrap();
    let workflow = repos.workflows.find_by_id(workflow.id).await.unwrap().unwrap();
    assert_eq!(workflow.workflow_type_id, None);

    repos.services.delete(service.id).await.unwrap();
    assert!(repos.workflows.find_by_id(workflow.id).await.unwrap().is_none());
    assert!(repos.runs.find_by_id(run.id).await.unwrap().is_none());
    repos.users.delete(user.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_constraint_violations_are_typed() {
    let Some(repos) = repositories().await else {
        return;
    };

    let username = unique("dup");
    let user = repos
        .users
        .insert(UserDraft::regular(username.clone(), "hash"))
        .await
        .unwrap();
    let err = repos
        .users
        .insert(UserDraft::regular(username, "hash"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let err = repos
        .runs
        .insert(RunDraft {
            user_id: user.id,
            workflow_id: i64::MAX,
            name: "orphan".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ReferenceError(_)));

    assert!(repos.health.health_check().await.unwrap());
    repos.users.delete(user.id).await.unwrap();
}
