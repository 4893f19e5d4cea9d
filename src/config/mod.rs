//! Run configuration: the YAML file that supplies database connection
//! parameters, the two `SELECT`-grant role names, the staging directory, the
//! tenant service endpoint, and the fixed catalog of tables to load.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::db::Flavor;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub flavor: Option<Flavor>,
}

fn default_port() -> u16 {
    5432
}

impl DatabaseConfig {
    /// Resolve the password either from the literal config value or from a
    /// named environment variable, matching the teacher's Postgres-sink
    /// configuration shape.
    pub fn resolve_password(&self) -> Result<String> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        if let Some(var) = &self.password_env {
            return std::env::var(var)
                .map_err(|_| Error::Config(format!("environment variable '{var}' is not set")));
        }
        Err(Error::Config(
            "database config must set either 'password' or 'password_env'".into(),
        ))
    }

    pub fn connection_url(&self) -> Result<String> {
        let password = self.resolve_password()?;
        Ok(format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, password, self.host, self.port, self.database
        ))
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor.unwrap_or(Flavor::Postgres)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantServiceConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub auth_token_env: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    500
}

impl TenantServiceConfig {
    pub fn resolve_auth_token(&self) -> Result<Option<String>> {
        if let Some(token) = &self.auth_token {
            return Ok(Some(token.clone()));
        }
        if let Some(var) = &self.auth_token_env {
            let token = std::env::var(var)
                .map_err(|_| Error::Config(format!("environment variable '{var}' is not set")))?;
            return Ok(Some(token));
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfigEntry {
    pub table_name: String,
    pub module_name: String,
    pub source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub database: DatabaseConfig,
    pub roles: Vec<String>,
    pub staging_dir: PathBuf,
    pub tenant_service: TenantServiceConfig,
    pub tables: Vec<TableConfigEntry>,
}

pub fn load_config_from_path<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let config: RunConfig = serde_yaml::from_str(&text)?;
    for table in &config.tables {
        if !crate::identifiers::is_valid_published_name(&table.table_name) {
            return Err(Error::Config(format!(
                "table name '{}' ends in the reserved loading suffix",
                table.table_name
            )));
        }
    }
    if config.roles.len() != 2 {
        return Err(Error::Config(
            "exactly two roles must be configured for SELECT grants".into(),
        ));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_yaml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const VALID_YAML: &str = r#"
database:
  host: localhost
  database: warehouse
  user: loader
  password_env: LDP_DB_PASSWORD
roles:
  - analyst_ro
  - service_ro
staging_dir: /tmp/ldp-staging
tenant_service:
  base_url: https://tenant.example.com
tables:
  - table_name: employees
    module_name: mod-hr
    source_path: /hr/employees
"#;

    #[test]
    fn loads_valid_config() {
        let file = write_temp_yaml(VALID_YAML);
        let config = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.roles.len(), 2);
        assert_eq!(config.tables[0].table_name, "employees");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.flavor(), Flavor::Postgres);
    }

    #[test]
    fn rejects_loading_suffixed_table_name() {
        let yaml = VALID_YAML.replace("employees", "employees_loading");
        let file = write_temp_yaml(&yaml);
        let err = load_config_from_path(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn resolves_password_from_env() {
        std::env::set_var("LDP_DB_PASSWORD", "secret");
        let file = write_temp_yaml(VALID_YAML);
        let config = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.database.resolve_password().unwrap(), "secret");
        std::env::remove_var("LDP_DB_PASSWORD");
    }
}
