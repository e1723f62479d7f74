pub mod server;

use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        app_key: SecretString,
        base_url: String,
        frontend_url: String,
        token_ttl: i64,
    },
}
