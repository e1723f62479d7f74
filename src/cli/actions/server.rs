use crate::api;
use crate::api::email::EmailWorkerConfig;
use crate::api::handlers::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            app_key,
            base_url,
            frontend_url,
            token_ttl,
        } => {
            let auth_config = AuthConfig::new(app_key)
                .with_base_url(base_url)
                .with_frontend_url(frontend_url)
                .with_token_ttl(token_ttl);

            api::new(port, dsn, auth_config, EmailWorkerConfig::default()).await?;
        }
    }

    Ok(())
}
