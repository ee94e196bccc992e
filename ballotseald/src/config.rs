use std::env::var;

/// Daemon configuration. Values come from the environment; command line
/// flags override them.
pub struct Config {
    pub port: u16,
    pub store_path: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = match var("BALLOTSEAL_PORT") {
            Ok(val) => val
                .parse()
                .expect("BALLOTSEAL_PORT must be a port number"),
            Err(_) => 9014,
        };

        let store_path = var("BALLOTSEAL_STORE").unwrap_or_else(|_| "poll_data".to_owned());

        Config { port, store_path }
    }
}
