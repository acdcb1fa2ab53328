mod common;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;

use common::{body_text, location, test_config, MockWes, TestApp};
use sapporo_core::{
    RunDraft, RunState, Service, ServiceDraft, Workflow, WorkflowDraft, WorkflowEngine,
    WorkflowEngineDraft, WorkflowTypeDraft,
};
use sapporo_server::ServerError;

const ENDPOINT: &str = "http://wes.example.com";

struct Catalog {
    service: Service,
    cwl_engine: WorkflowEngine,
    wdl_engine: WorkflowEngine,
    workflow: Workflow,
}

async fn catalog(app: &TestApp) -> Catalog {
    let repos = &app.server.repos;
    let service = repos
        .services
        .insert(ServiceDraft {
            name: "sapporo".to_string(),
            endpoint: ENDPOINT.to_string(),
            auth_instructions_url: None,
            contact_info_url: None,
        })
        .await
        .unwrap();
    let cwl = repos.workflow_types.insert(WorkflowTypeDraft::new("CWL", "v1.2")).await.unwrap();
    let wdl = repos.workflow_types.insert(WorkflowTypeDraft::new("WDL", "1.0")).await.unwrap();
    let cwl_engine = repos
        .workflow_engines
        .insert(WorkflowEngineDraft {
            service_id: service.id,
            name: "cwltool".to_string(),
            version: "3.1".to_string(),
            workflow_type_ids: vec![cwl.id],
        })
        .await
        .unwrap();
    let wdl_engine = repos
        .workflow_engines
        .insert(WorkflowEngineDraft {
            service_id: service.id,
            name: "cromwell".to_string(),
            version: "86".to_string(),
            workflow_type_ids: vec![wdl.id],
        })
        .await
        .unwrap();
    let workflow = repos
        .workflows
        .insert(WorkflowDraft {
            service_id: service.id,
            name: "trimming_and_qc".to_string(),
            version: "1.0.0".to_string(),
            workflow_type_id: Some(cwl.id),
            location: "https://example.com/trimming_and_qc.cwl".to_string(),
            content: "cwlVersion: v1.2\nclass: Workflow\n".to_string(),
            parameters_template_location: "https://example.com/template.json".to_string(),
            parameters_template: "{\"fastq\": null}".to_string(),
        })
        .await
        .unwrap();
    Catalog {
        service,
        cwl_engine,
        wdl_engine,
        workflow,
    }
}

#[tokio::test]
async fn home_lists_services() {
    let mut app = TestApp::with_defaults();
    app.create_user("alice", false).await;
    let catalog = catalog(&app).await;
    app.sign_in("alice").await;

    let response = app.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(&format!("/services/{}", catalog.service.id)));
    assert!(html.contains("sapporo"));
}

#[tokio::test]
async fn workflow_page_offers_only_executable_engines() {
    let mut app = TestApp::with_defaults();
    app.create_user("alice", false).await;
    let catalog = catalog(&app).await;
    app.sign_in("alice").await;

    let html = body_text(app.get(&format!("/services/{}", catalog.service.id)).await).await;
    assert!(html.contains("cwltool"));
    assert!(html.contains("cromwell"));
    assert!(html.contains("trimming_and_qc"));

    let html = body_text(app.get(&format!("/workflows/{}", catalog.workflow.id)).await).await;
    assert!(html.contains("cwltool"));
    assert!(!html.contains("cromwell"));
}

#[tokio::test]
async fn missing_objects_render_not_found_pages() {
    let mut app = TestApp::with_defaults();
    app.create_user("alice", false).await;
    app.sign_in("alice").await;

    let response = app.get("/workflows/999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let html = body_text(response).await;
    assert!(html.contains("Workflow 999 does not exist."));
    assert!(html.contains("alice"));

    let response = app.get("/no/such/page").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn creating_a_run_submits_it() {
    let mut wes = MockWes::new();
    wes.expect_submit_run()
        .withf(|endpoint, request| {
            endpoint == ENDPOINT
                && request.workflow_type == "CWL"
                && request.workflow_type_version == "v1.2"
                && request.workflow_engine_name.as_deref() == Some("cwltool")
        })
        .times(1)
        .returning(|_, _| Ok("remote-1".to_string()));

    let mut app = TestApp::new(test_config(), wes);
    let user = app.create_user("alice", false).await;
    let catalog = catalog(&app).await;
    app.sign_in("alice").await;

    let engine_id = catalog.cwl_engine.id.to_string();
    let response = app
        .post(
            &format!("/workflows/{}/runs", catalog.workflow.id),
            &[
                ("name", "first run"),
                ("workflow_engine_id", &engine_id),
                ("parameters", "{\"fastq\": \"a.fq\"}"),
                ("submit", "on"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/runs");

    let runs = app.server.repos.runs.list_for_user(user.id).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].state, RunState::Queued);
    assert_eq!(runs[0].run_id.as_deref(), Some("remote-1"));

    let html = body_text(app.get("/runs").await).await;
    assert!(html.contains("first run"));
    assert!(html.contains("remote-1"));
}

#[tokio::test]
async fn failed_submission_keeps_the_run_unknown() {
    let mut wes = MockWes::new();
    wes.expect_submit_run()
        .returning(|_, _| Err(ServerError::WesError("connection refused".to_string())));

    let mut app = TestApp::new(test_config(), wes);
    let user = app.create_user("alice", false).await;
    let catalog = catalog(&app).await;
    app.sign_in("alice").await;

    let engine_id = catalog.cwl_engine.id.to_string();
    let response = app
        .post(
            &format!("/workflows/{}/runs", catalog.workflow.id),
            &[("name", "run"), ("workflow_engine_id", &engine_id), ("submit", "on")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let runs = app.server.repos.runs.list_for_user(user.id).await.unwrap();
    assert_eq!(runs[0].state, RunState::Unknown);
    assert_eq!(runs[0].run_id, None);
}

#[tokio::test]
async fn runs_need_an_executable_engine() {
    let mut app = TestApp::with_defaults();
    let user = app.create_user("alice", false).await;
    let catalog = catalog(&app).await;
    app.sign_in("alice").await;

    let engine_id = catalog.wdl_engine.id.to_string();
    let response = app
        .post(
            &format!("/workflows/{}/runs", catalog.workflow.id),
            &[("name", "run"), ("workflow_engine_id", &engine_id)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response)
        .await
        .contains("Select a workflow engine that can execute this workflow."));
    assert!(app.server.repos.runs.list_for_user(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn refresh_polls_the_run_state() {
    let mut wes = MockWes::new();
    wes.expect_run_status()
        .withf(|endpoint, run_id| endpoint == ENDPOINT && run_id == "remote-7")
        .times(1)
        .returning(|_, _| Ok(RunState::Complete));

    let mut app = TestApp::new(test_config(), wes);
    let alice = app.create_user("alice", false).await;
    let bob = app.create_user("bob", false).await;
    let catalog = catalog(&app).await;

    let draft = |user_id| RunDraft {
        user_id,
        workflow_id: catalog.workflow.id,
        workflow_engine_id: Some(catalog.cwl_engine.id),
        name: "run".to_string(),
        run_id: Some("remote-7".to_string()),
        state: RunState::Running,
        parameters: String::new(),
    };
    let own = app.server.repos.runs.insert(draft(alice.id)).await.unwrap();
    let foreign = app.server.repos.runs.insert(draft(bob.id)).await.unwrap();
    app.sign_in("alice").await;

    let response = app.post(&format!("/runs/{}/refresh", own.id), &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let run = app.server.repos.runs.find_by_id(own.id).await.unwrap().unwrap();
    assert_eq!(run.state, RunState::Complete);
    assert_eq!(run.run_id.as_deref(), Some("remote-7"));

    let response = app.post(&format!("/runs/{}/refresh", foreign.id), &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refresh_leaves_finished_runs_alone() {
    let mut wes = MockWes::new();
    wes.expect_run_status().times(0);

    let mut app = TestApp::new(test_config(), wes);
    let alice = app.create_user("alice", false).await;
    let catalog = catalog(&app).await;
    let run = app
        .server
        .repos
        .runs
        .insert(RunDraft {
            user_id: alice.id,
            workflow_id: catalog.workflow.id,
            workflow_engine_id: Some(catalog.cwl_engine.id),
            name: "done".to_string(),
            run_id: Some("remote-8".to_string()),
            state: RunState::Canceled,
            parameters: String::new(),
        })
        .await
        .unwrap();
    app.sign_in("alice").await;

    let response = app.post(&format!("/runs/{}/refresh", run.id), &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/runs");
    let stored = app.server.repos.runs.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Canceled);
}

#[tokio::test]
async fn health_reports_the_store() {
    let app = TestApp::with_defaults();
    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "UP");
    assert_eq!(body["dependencies"]["database"]["status"], "UP");
    assert_eq!(body["dependencies"]["database"]["backend"], "memory");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
