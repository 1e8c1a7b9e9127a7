use std::net::SocketAddr;

use clap::Parser;

/// GraphQL API over the students collection.
#[derive(Parser, Debug, Clone)]
#[command(name = "students-graphql")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(long, env = "STUDENTS_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Postgres connection URL; documents stay in memory when unset
    #[arg(long, env = "STUDENTS_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Database name, overriding the one in the URL
    #[arg(long, env = "STUDENTS_DATABASE_NAME")]
    pub database_name: Option<String>,

    /// Origin allowed to call the API with credentials (repeatable)
    #[arg(long = "cors-origin", env = "STUDENTS_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind<'a> {
    Postgres {
        url: &'a str,
        database: Option<&'a str>,
    },
    Memory,
}

impl Config {
    pub fn store_kind(&self) -> StoreKind<'_> {
        match self.database_url.as_deref() {
            Some(url) if !url.trim().is_empty() => StoreKind::Postgres {
                url,
                database: self.database_name.as_deref(),
            },
            _ => StoreKind::Memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_memory_store() {
        let config = Config::try_parse_from(["students-graphql"]).unwrap();
        assert_eq!(config.bind, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.store_kind(), StoreKind::Memory);
    }

    #[test]
    fn database_flags_select_postgres() {
        let config = Config::try_parse_from([
            "students-graphql",
            "--database-url",
            "postgres://localhost/app",
            "--database-name",
            "school",
            "--cors-origin",
            "https://a.example,https://b.example",
        ])
        .unwrap();
        assert_eq!(
            config.store_kind(),
            StoreKind::Postgres {
                url: "postgres://localhost/app",
                database: Some("school"),
            }
        );
        assert_eq!(config.cors_origins, ["https://a.example", "https://b.example"]);
    }
}
