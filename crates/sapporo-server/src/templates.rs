//! Server-side HTML rendering
//!
//! Templates are compiled into the binary and rendered with minijinja. Every
//! page receives a `layout` object (language, signed-in user, CSRF token,
//! signup switch) next to its own `page` data.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use minijinja::{context, Environment};
use serde::Serialize;

use sapporo_core::User;

use crate::error::{ServerError, ServerResult};

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("signin.html", include_str!("../templates/signin.html")),
    ("signup.html", include_str!("../templates/signup.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("service.html", include_str!("../templates/service.html")),
    ("workflow.html", include_str!("../templates/workflow.html")),
    ("runs.html", include_str!("../templates/runs.html")),
    ("error.html", include_str!("../templates/error.html")),
    ("admin/index.html", include_str!("../templates/admin/index.html")),
    ("admin/list.html", include_str!("../templates/admin/list.html")),
    ("admin/form.html", include_str!("../templates/admin/form.html")),
    (
        "admin/confirm_delete.html",
        include_str!("../templates/admin/confirm_delete.html"),
    ),
];

/// Data shared by every page
#[derive(Debug, Clone, Default, Serialize)]
pub struct Layout {
    pub language_code: String,
    pub user: Option<User>,
    pub csrf_token: String,
    pub user_signup: bool,
    pub debug: bool,
}

/// Compiled template set
#[derive(Debug)]
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Compile all templates; timestamps are shown in `tz`
    pub fn new(tz: Tz) -> ServerResult<Self> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        env.add_filter("localtime", move |value: String| localtime(&value, tz));
        Ok(Self { env })
    }

    pub fn render<P: Serialize>(&self, name: &str, layout: &Layout, page: P) -> ServerResult<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| ServerError::TemplateError(format!("{}: {}", name, e)))?;
        Ok(template.render(context! { layout => layout, page => page })?)
    }
}

fn localtime(value: &str, tz: Tz) -> String {
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => parsed
            .with_timezone(&Utc)
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string(),
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layout() -> Layout {
        Layout {
            language_code: "ja".to_string(),
            csrf_token: "tok".to_string(),
            user_signup: true,
            ..Layout::default()
        }
    }

    #[test]
    fn all_templates_compile() {
        assert!(Templates::new(Tz::UTC).is_ok());
    }

    #[test]
    fn signin_shows_signup_link_only_when_enabled() {
        let templates = Templates::new(Tz::UTC).unwrap();
        let page = json!({"errors": [], "username": "", "next": "/"});

        let html = templates.render("signin.html", &layout(), &page).unwrap();
        assert!(html.contains("<html lang=\"ja\">"));
        assert!(html.contains("href=\"/signup\""));
        assert!(html.contains("name=\"csrfmiddlewaretoken\" value=\"tok\""));
        assert!(!html.contains("placeholder"));

        let disabled = Layout {
            user_signup: false,
            ..layout()
        };
        let html = templates.render("signin.html", &disabled, &page).unwrap();
        assert!(!html.contains("href=\"/signup\""));
    }

    #[test]
    fn output_is_escaped() {
        let templates = Templates::new(Tz::UTC).unwrap();
        let html = templates
            .render("error.html", &layout(), json!({"status": 404, "title": "Not Found", "message": "<script>"}))
            .unwrap();
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn localtime_converts_zone() {
        let tokyo: Tz = "Asia/Tokyo".parse().unwrap();
        assert_eq!(localtime("2024-01-01T00:00:00Z", tokyo), "2024-01-01 09:00:00 JST");
        assert_eq!(localtime("not a date", tokyo), "not a date");
    }
}
