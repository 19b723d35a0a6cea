use std::sync::Arc;

use minijinja::{
    value::{Enumerator, Object},
    Value,
};
use serde::Deserialize;

use crate::error::Error;

#[derive(Clone, Debug, Deserialize)]
struct Deploy {
    host: String,
    port: u16,
}

#[derive(Clone, Debug, Deserialize)]
struct Meta {
    blog_name: String,
    footer: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct Admin {
    email: String,
    password: String,
    full_name: Option<String>,
    inactive_expiry_days: Option<i64>,
}

#[derive(Clone, Debug, Deserialize)]
struct Database {
    url: String,
    max_connections: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
struct Style {
    code_syntax_highlight_theme: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    deploy: Deploy,
    meta: Meta,
    admin: Admin,
    database: Database,
    style: Style,
}

impl Config {
    pub fn new(path: &str) -> Result<Self, Error> {
        let config_content = std::fs::read_to_string(path)?;
        Self::from_toml(&config_content)
    }

    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(Error::Toml)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        // check the deployment config.
        if self.deploy.host.is_empty() || self.deploy.port == 0 {
            return Err(Error::ConfigValidation(
                "invalid deployment config, please specify the host and port".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(Error::ConfigValidation(
                "invalid database config, please specify the connection URL".to_string(),
            ));
        }
        // the admin account is seeded from these.
        if self.admin.email.trim().is_empty() || self.admin.password.is_empty() {
            return Err(Error::ConfigValidation(
                "invalid admin config, please specify the email and password".to_string(),
            ));
        }

        Ok(())
    }

    // get the server URL according to the config, this will be used to run the server.
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.deploy.host, self.deploy.port)
    }

    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    pub fn database_max_connections(&self) -> u32 {
        self.database.max_connections.unwrap_or(5)
    }

    pub fn admin_email(&self) -> String {
        self.admin.email.trim().to_lowercase()
    }

    pub fn admin_password(&self) -> &str {
        &self.admin.password
    }

    pub fn admin_full_name(&self) -> String {
        self.admin
            .full_name
            .clone()
            .unwrap_or_else(|| "Administrator".to_string())
    }

    pub fn admin_inactive_expiry_days(&self) -> i64 {
        self.admin.inactive_expiry_days.unwrap_or(30)
    }

    pub fn code_syntax_highlight_theme(&self) -> String {
        self.style.code_syntax_highlight_theme.clone()
    }
}

impl Object for Config {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        // just expose those fields that will be used in the templates.
        match key.as_str()? {
            "blog_name" => Some(Value::from(self.meta.blog_name.clone())),
            "footer" => Some(Value::from(self.meta.footer.clone())),
            _ => None,
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["blog_name", "footer"])
    }
}
