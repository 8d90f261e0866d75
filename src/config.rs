use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub http_bind: SocketAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_ip: Option<String>,
    /// Host the published container ports are reached through. Defaults to
    /// the address of Docker's default bridge.
    pub gateway_host: String,
    /// The pooled connector only dials plain `http`.
    pub upstream_scheme: String,
    /// Delay before resubscribing to a closed event stream. `0` disables
    /// resubscription.
    pub reconnect_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind: SocketAddr::from(([0, 0, 0, 0], 80)),
            bind_ip: None,
            gateway_host: "172.17.0.1".into(),
            upstream_scheme: "http".into(),
            reconnect_delay_secs: 5,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(Self::figment())
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("dockroute.toml"))
            .merge(Json::file("dockroute.json"))
            .merge(Env::prefixed("DOCKROUTE_"))
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // If bind_ip is set, override the IP part of http_bind
        if let Some(ref ip) = config.bind_ip {
            let port = config.http_bind.port();
            config.http_bind = format!("{}:{}", ip, port)
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid bind_ip: {}", e))?;
        }

        Ok(config)
    }

    pub fn reconnect_delay(&self) -> Option<Duration> {
        match self.reconnect_delay_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_docker_bridge_setup() {
        Jail::expect_with(|_jail| {
            let config = Config::from_figment(Config::figment()).unwrap();
            assert_eq!(config.http_bind, "0.0.0.0:80".parse().unwrap());
            assert_eq!(config.gateway_host, "172.17.0.1");
            assert_eq!(config.upstream_scheme, "http");
            assert_eq!(config.reconnect_delay(), Some(Duration::from_secs(5)));
            Ok(())
        });
    }

    #[test]
    fn file_and_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "dockroute.toml",
                r#"
                gateway_host = "10.0.0.1"
                reconnect_delay_secs = 0
                "#,
            )?;
            jail.set_env("DOCKROUTE_HTTP_BIND", "127.0.0.1:8080");
            jail.set_env("DOCKROUTE_GATEWAY_HOST", "192.168.1.1");

            let config = Config::from_figment(Config::figment()).unwrap();
            assert_eq!(config.gateway_host, "192.168.1.1");
            assert_eq!(config.http_bind, "127.0.0.1:8080".parse().unwrap());
            assert_eq!(config.reconnect_delay(), None);
            Ok(())
        });
    }

    #[test]
    fn bind_ip_overrides_address_but_keeps_port() {
        Jail::expect_with(|jail| {
            jail.set_env("DOCKROUTE_BIND_IP", "127.0.0.1");

            let config = Config::from_figment(Config::figment()).unwrap();
            assert_eq!(config.http_bind, "127.0.0.1:80".parse().unwrap());
            Ok(())
        });
    }

    #[test]
    fn invalid_bind_ip_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("DOCKROUTE_BIND_IP", "not-an-ip");

            let err = Config::from_figment(Config::figment()).unwrap_err();
            assert!(err.to_string().contains("Invalid bind_ip"));
            Ok(())
        });
    }
}
