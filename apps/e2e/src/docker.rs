use anyhow::{Context, Result};
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

pub struct PostgresInstance {
    pub container: ContainerAsync<GenericImage>,
    pub host_port: u16,
    pub db_url: String,
}

pub struct PostgresOptions {
    pub image_tag: String,
    pub db: String,
    pub user: String,
    pub password: String,
    /// Gives the container a `scheduler-e2e-`-prefixed name so
    /// `docker_cleanup::cleanup_e2e_containers` can find and reap it if a
    /// test run is interrupted before its container is dropped.
    pub container_name: Option<String>,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            image_tag: "18.1".to_string(),
            db: "scheduler".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            container_name: None,
        }
    }
}

pub async fn start_postgres(opts: PostgresOptions) -> Result<PostgresInstance> {
    let _ = crate::docker_cleanup::cleanup_e2e_containers();

    let mut pg = GenericImage::new("postgres".to_string(), opts.image_tag)
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stdout(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_DB", opts.db.clone())
        .with_env_var("POSTGRES_USER", opts.user.clone())
        .with_env_var("POSTGRES_PASSWORD", opts.password.clone());
    if let Some(name) = opts.container_name {
        pg = pg.with_container_name(name);
    }

    let container = pg.start().await.context("start postgres container")?;
    let host_port = container.get_host_port_ipv4(5432).await?;
    let db_url = format!(
        "postgres://{}:{}@127.0.0.1:{}/{}",
        opts.user, opts.password, host_port, opts.db
    );

    Ok(PostgresInstance {
        container,
        host_port,
        db_url,
    })
}
