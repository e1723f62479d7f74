use crate::cli::actions::Action;
use anyhow::{Context, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .context("missing required argument: --dsn")?,
        app_key: matches
            .get_one("app-key")
            .map(|s: &String| SecretString::from(s.as_str()))
            .context("missing required argument: --app-key")?,
        base_url: matches
            .get_one("base-url")
            .map(|s: &String| s.trim_end_matches('/').to_string())
            .context("missing argument: --base-url")?,
        frontend_url: matches
            .get_one("frontend-url")
            .map(|s: &String| s.trim_end_matches('/').to_string())
            .context("missing argument: --frontend-url")?,
        token_ttl: matches.get_one::<i64>("token-ttl").copied().unwrap_or(3600),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn test_handler_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "sesamo",
            "--dsn",
            "postgres://localhost/sesamo",
            "--app-key",
            "secret",
            "--base-url",
            "https://api.sesamo.dev/",
        ]);

        let action = handler(&matches).unwrap();

        let Action::Server {
            port,
            dsn,
            base_url,
            frontend_url,
            token_ttl,
            ..
        } = action;

        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://localhost/sesamo");
        // trailing slash is stripped so link building can join paths
        assert_eq!(base_url, "https://api.sesamo.dev");
        assert_eq!(frontend_url, "http://localhost:5173");
        assert_eq!(token_ttl, 3600);
    }
}
