//! Administration console
//!
//! Each entity is exposed through an [`AdminModel`]: a list of rows, a form
//! description, and save/delete operations against the repositories. The
//! [`AdminSite`] holds the registered models and is looked up by URL slug.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{ServerError, ServerResult};
use crate::server::SapporoServer;

pub mod models;
pub mod sync;

/// Names and list columns of an admin model
#[derive(Debug, Clone, Serialize)]
pub struct ModelMeta {
    /// URL segment, e.g. `workflow-engines`
    pub slug: &'static str,
    pub name: &'static str,
    pub name_plural: &'static str,
    pub columns: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

impl Choice {
    pub fn new(value: impl ToString, label: impl ToString) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }
}

/// Widget of a form field
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Url,
    Textarea,
    Password,
    Checkbox,
    Select { choices: Vec<Choice> },
    MultiSelect { choices: Vec<Choice> },
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub help: Option<&'static str>,
}

impl FieldSpec {
    pub fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: true,
            help: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

/// A field together with its current value, as handed to the template
#[derive(Debug, Clone, Serialize)]
pub struct FieldView {
    #[serde(flatten)]
    pub spec: FieldSpec,
    pub value: String,
    pub values: Vec<String>,
}

/// One line of a change list
#[derive(Debug, Clone, Serialize)]
pub struct AdminRow {
    pub id: i64,
    pub cells: Vec<String>,
}

/// Submitted or initial form values, in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pairs: Vec<(String, String)>,
}

impl FormData {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Replace every value of `name` with `value`
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.pairs.retain(|(key, _)| key != name);
        self.pairs.push((name.to_string(), value.into()));
    }

    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.pairs.push((name.to_string(), value.into()));
    }

    /// First value of `name`, or an empty string
    pub fn get(&self, name: &str) -> &str {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    pub fn values(&self, name: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn text(&self, name: &str) -> String {
        self.get(name).trim().to_string()
    }

    /// Trimmed value, `None` when blank
    pub fn optional(&self, name: &str) -> Option<String> {
        let value = self.get(name).trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    /// HTML checkboxes are only submitted when ticked
    pub fn checkbox(&self, name: &str) -> bool {
        self.pairs
            .iter()
            .any(|(key, value)| key == name && !matches!(value.as_str(), "" | "off" | "false"))
    }

    pub fn id(&self, name: &str) -> ServerResult<i64> {
        self.optional_id(name)?
            .ok_or_else(|| ServerError::ValidationError(format!("{}: this field is required", name)))
    }

    pub fn optional_id(&self, name: &str) -> ServerResult<Option<i64>> {
        match self.optional(name) {
            None => Ok(None),
            Some(value) => value.parse::<i64>().map(Some).map_err(|_| {
                ServerError::ValidationError(format!("{}: select a valid choice", name))
            }),
        }
    }

    pub fn ids(&self, name: &str) -> ServerResult<Vec<i64>> {
        self.values(name)
            .iter()
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                value.trim().parse::<i64>().map_err(|_| {
                    ServerError::ValidationError(format!("{}: select a valid choice", name))
                })
            })
            .collect()
    }

    /// Pair each field with its value from this form
    pub fn bind(&self, fields: Vec<FieldSpec>) -> Vec<FieldView> {
        fields
            .into_iter()
            .map(|spec| FieldView {
                value: match spec.kind {
                    FieldKind::Password => String::new(),
                    _ => self.get(spec.name).to_string(),
                },
                values: self.values(spec.name),
                spec,
            })
            .collect()
    }
}

/// CRUD operations of one entity in the console
#[async_trait]
pub trait AdminModel: Send + Sync {
    fn meta(&self) -> &'static ModelMeta;

    /// Form fields; `id` is `None` on the add form
    async fn fields(&self, server: &SapporoServer, id: Option<i64>) -> ServerResult<Vec<FieldSpec>>;

    async fn rows(&self, server: &SapporoServer) -> ServerResult<Vec<AdminRow>>;

    /// Current values of an existing object
    async fn initial(&self, server: &SapporoServer, id: i64) -> ServerResult<FormData>;

    /// Create (`id` is `None`) or update an object, returning its id
    async fn save(&self, server: &SapporoServer, id: Option<i64>, form: &FormData) -> ServerResult<i64>;

    async fn delete(&self, server: &SapporoServer, id: i64) -> ServerResult<()>;

    /// Human-readable name of an object
    async fn label(&self, server: &SapporoServer, id: i64) -> ServerResult<String>;

    /// Whether the change form offers "sync from service-info"
    fn can_sync(&self) -> bool {
        false
    }
}

/// Registry of admin models
#[derive(Clone, Default)]
pub struct AdminSite {
    models: Vec<Arc<dyn AdminModel>>,
}

impl std::fmt::Debug for AdminSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.models.iter().map(|model| model.meta().slug))
            .finish()
    }
}

impl AdminSite {
    /// Site with every sapporo-web entity registered
    pub fn default_site() -> Self {
        let mut site = Self::default();
        site.register(models::RunAdmin);
        site.register(models::ServiceAdmin);
        site.register(models::SupportedWesVersionAdmin);
        site.register(models::UserAdmin);
        site.register(models::WorkflowEngineAdmin);
        site.register(models::WorkflowTypeAdmin);
        site.register(models::WorkflowAdmin);
        site
    }

    pub fn register<M: AdminModel + 'static>(&mut self, model: M) {
        self.models.push(Arc::new(model));
    }

    pub fn get(&self, slug: &str) -> Option<Arc<dyn AdminModel>> {
        self.models.iter().find(|model| model.meta().slug == slug).cloned()
    }

    pub fn metas(&self) -> Vec<&'static ModelMeta> {
        self.models.iter().map(|model| model.meta()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> FormData {
        FormData::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn form_accessors() {
        let data = form(&[
            ("name", "  cwltool "),
            ("service", "3"),
            ("types", "1"),
            ("types", "2"),
            ("is_staff", "on"),
            ("empty", " "),
        ]);
        assert_eq!(data.text("name"), "cwltool");
        assert_eq!(data.id("service").unwrap(), 3);
        assert_eq!(data.ids("types").unwrap(), vec![1, 2]);
        assert!(data.checkbox("is_staff"));
        assert!(!data.checkbox("is_active"));
        assert_eq!(data.optional("empty"), None);
        assert!(data.id("missing").is_err());
        assert!(form(&[("service", "x")]).optional_id("service").is_err());
    }

    #[test]
    fn bind_hides_passwords() {
        let data = form(&[("username", "root"), ("password", "secret")]);
        let views = data.bind(vec![
            FieldSpec::new("username", "Username", FieldKind::Text),
            FieldSpec::new("password", "Password", FieldKind::Password),
        ]);
        assert_eq!(views[0].value, "root");
        assert_eq!(views[1].value, "");
    }

    #[test]
    fn default_site_registers_every_model() {
        let site = AdminSite::default_site();
        let slugs: Vec<_> = site.metas().iter().map(|meta| meta.slug).collect();
        assert_eq!(
            slugs,
            vec![
                "runs",
                "services",
                "supported-wes-versions",
                "users",
                "workflow-engines",
                "workflow-types",
                "workflows"
            ]
        );
        assert!(site.get("services").is_some_and(|model| model.can_sync()));
        assert!(site.get("nope").is_none());
    }
}
