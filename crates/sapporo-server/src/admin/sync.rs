//! Import a service's capabilities from its `service-info`

use serde::Serialize;
use tracing::{info, warn};

use sapporo_core::domain::is_http_url;
use sapporo_core::{
    CoreError, ServiceDraft, SupportedWesVersionDraft, WorkflowEngineDraft, WorkflowTypeDraft,
};

use crate::error::ServerResult;
use crate::server::SapporoServer;
use crate::wes::ServiceInfo;

/// What a sync added or changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub wes_versions_added: usize,
    pub workflow_types_added: usize,
    pub engines_added: usize,
    pub engines_updated: usize,
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Synced from service-info: {} WES version(s) added, {} workflow type(s) added, {} engine(s) added, {} engine(s) updated.",
            self.wes_versions_added, self.workflow_types_added, self.engines_added, self.engines_updated
        )
    }
}

/// Fetch `service-info` of service `service_id` and upsert what it advertises.
///
/// service-info does not say which engine runs which language, so every
/// engine is linked to every workflow type the service lists.
pub async fn sync_service(server: &SapporoServer, service_id: i64) -> ServerResult<SyncReport> {
    let service = server
        .repos
        .services
        .find_by_id(service_id)
        .await?
        .ok_or_else(|| CoreError::not_found("service", service_id))?;

    let service_info = server.wes.service_info(&service.endpoint).await?;
    let report = apply(server, service_id, &service_info).await?;
    info!(service = %service.name, ?report, "Synced service-info");
    Ok(report)
}

/// Upsert the contents of `service_info` for service `service_id`
pub async fn apply(
    server: &SapporoServer,
    service_id: i64,
    service_info: &ServiceInfo,
) -> ServerResult<SyncReport> {
    let repos = &server.repos;
    let mut report = SyncReport::default();

    if let Some(service) = repos.services.find_by_id(service_id).await? {
        let auth = usable_url(service_info.auth_instructions_url.as_deref());
        let contact = usable_url(service_info.contact_info_url.as_deref());
        if (auth.is_some() && auth != service.auth_instructions_url)
            || (contact.is_some() && contact != service.contact_info_url)
        {
            let draft = ServiceDraft {
                name: service.name,
                endpoint: service.endpoint,
                auth_instructions_url: auth.or(service.auth_instructions_url),
                contact_info_url: contact.or(service.contact_info_url),
            };
            repos.services.update(service_id, draft).await?;
        }
    }

    let known_versions: Vec<String> = repos
        .wes_versions
        .list_for_service(service_id)
        .await?
        .into_iter()
        .map(|v| v.version)
        .collect();
    for version in &service_info.supported_wes_versions {
        if version.trim().is_empty() || known_versions.contains(version) {
            continue;
        }
        repos
            .wes_versions
            .insert(SupportedWesVersionDraft {
                service_id,
                version: version.clone(),
            })
            .await?;
        report.wes_versions_added += 1;
    }

    let mut type_ids = Vec::new();
    for (name, versions) in &service_info.workflow_type_versions {
        for version in &versions.workflow_type_version {
            let existing = repos.workflow_types.find_by_name_version(name, version).await?;
            let workflow_type = match existing {
                Some(workflow_type) => workflow_type,
                None => {
                    report.workflow_types_added += 1;
                    repos
                        .workflow_types
                        .insert(WorkflowTypeDraft::new(name.clone(), version.clone()))
                        .await?
                }
            };
            type_ids.push(workflow_type.id);
        }
    }

    let engines = repos.workflow_engines.list_for_service(service_id).await?;
    for (name, version) in &service_info.workflow_engine_versions {
        match engines.iter().find(|engine| &engine.name == name) {
            Some(engine) => {
                let mut merged = engine.workflow_type_ids.clone();
                merged.extend(type_ids.iter().copied());
                let draft = WorkflowEngineDraft {
                    service_id,
                    name: name.clone(),
                    version: version.clone(),
                    workflow_type_ids: merged,
                };
                let merged = draft.unique_type_ids();
                if engine.version != *version || merged != engine.workflow_type_ids {
                    repos.workflow_engines.update(engine.id, draft).await?;
                    report.engines_updated += 1;
                }
            }
            None => {
                repos
                    .workflow_engines
                    .insert(WorkflowEngineDraft {
                        service_id,
                        name: name.clone(),
                        version: version.clone(),
                        workflow_type_ids: type_ids.clone(),
                    })
                    .await?;
                report.engines_added += 1;
            }
        }
    }

    Ok(report)
}

fn usable_url(url: Option<&str>) -> Option<String> {
    match url.map(str::trim) {
        Some(url) if is_http_url(url) => Some(url.to_string()),
        Some(url) if !url.is_empty() => {
            warn!(%url, "Ignoring malformed URL from service-info");
            None
        }
        _ => None,
    }
}
