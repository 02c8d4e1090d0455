use anyhow::Context;
use sqlx::{Connection, Executor, postgres::PgConnection};

use crate::helpers::rand_hex;

/// Credentials for one ephemeral sandbox database. A container only
/// ever receives credentials minted in its own provisioning call.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxDatabase {
  pub name: String,
  pub user: String,
  pub password: String,
}

impl SandboxDatabase {
  pub fn generate() -> SandboxDatabase {
    SandboxDatabase {
      name: format!("pgdb_{}", rand_hex(8)),
      user: format!("pguser_{}", rand_hex(8)),
      password: format!("pgpassword_{}", rand_hex(8)),
    }
  }

  /// Environment handed to the container, reaching the database
  /// through the shared `postgres` host alias.
  pub fn env(&self) -> Vec<String> {
    vec![
      String::from("PGHOST=postgres"),
      format!("PGDATABASE={}", self.name),
      format!("PGUSER={}", self.user),
      format!("PGPASSWORD={}", self.password),
    ]
  }
}

/// Creates the database and its owning role on the admin DSN.
pub async fn create_database(
  dsn: &str,
  db: &SandboxDatabase,
) -> anyhow::Result<()> {
  let mut conn = PgConnection::connect(dsn)
    .await
    .context("failed to connect to postgres")?;

  let result = async {
    conn
      .execute(
        format!(
          r#"CREATE USER "{}" WITH PASSWORD '{}'"#,
          db.user, db.password
        )
        .as_str(),
      )
      .await
      .context("failed to create user")?;
    conn
      .execute(
        format!(
          r#"CREATE DATABASE "{}" OWNER "{}""#,
          db.name, db.user
        )
        .as_str(),
      )
      .await
      .context("failed to create database")?;
    conn
      .execute(
        format!(
          r#"GRANT ALL PRIVILEGES ON DATABASE "{}" TO "{}""#,
          db.name, db.user
        )
        .as_str(),
      )
      .await
      .context("failed to grant privileges")?;
    Ok(())
  }
  .await;

  conn.close().await.ok();
  result
}

/// Drops an ephemeral database, evicting any open connections.
pub async fn drop_database(
  dsn: &str,
  name: &str,
) -> anyhow::Result<()> {
  let mut conn = PgConnection::connect(dsn)
    .await
    .context("failed to connect to postgres")?;

  let result = conn
    .execute(
      format!(
        r#"DROP DATABASE IF EXISTS "{name}" WITH (FORCE)"#
      )
      .as_str(),
    )
    .await
    .context("failed to drop database")
    .map(|_| ());

  conn.close().await.ok();
  result
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generated_credentials_follow_the_naming_scheme() {
    let db = SandboxDatabase::generate();
    assert!(db.name.starts_with("pgdb_"));
    assert_eq!(db.name.len(), "pgdb_".len() + 8);
    assert!(db.user.starts_with("pguser_"));
    assert_eq!(db.user.len(), "pguser_".len() + 8);
    assert!(db.password.starts_with("pgpassword_"));
    assert_eq!(db.password.len(), "pgpassword_".len() + 8);
    assert_ne!(db, SandboxDatabase::generate());
  }

  #[test]
  fn env_points_the_container_at_its_own_database() {
    let db = SandboxDatabase {
      name: "pgdb_0011aabb".to_string(),
      user: "pguser_ccdd2233".to_string(),
      password: "pgpassword_44ee55ff".to_string(),
    };
    assert_eq!(
      db.env(),
      vec![
        "PGHOST=postgres".to_string(),
        "PGDATABASE=pgdb_0011aabb".to_string(),
        "PGUSER=pguser_ccdd2233".to_string(),
        "PGPASSWORD=pgpassword_44ee55ff".to_string(),
      ]
    );
  }
}
