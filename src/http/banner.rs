use std::net::SocketAddr;

use serde_json::json;
use tracing::info;

use super::{DEFAULT_MCP_PATH, HEALTH_PATH, SSE_PATH_PREFIX};

/// Human-readable startup message with a ready-to-paste client configuration.
pub fn startup_banner(addr: SocketAddr) -> String {
    let base_url = if addr.ip().is_unspecified() {
        format!("http://localhost:{}", addr.port())
    } else {
        format!("http://{addr}")
    };

    let client_config = json!({
        "mcpServers": {
            (env!("CARGO_PKG_NAME")): {
                "url": format!("{base_url}{DEFAULT_MCP_PATH}")
            }
        }
    });

    format!(
        "MCP server listening on {addr}\n\
         Health check: {base_url}{HEALTH_PATH}\n\
         \n\
         Client configuration:\n\
         {client_config:#}\n\
         \n\
         Legacy SSE clients can connect to {base_url}{SSE_PATH_PREFIX}"
    )
}

pub fn log_startup_banner(addr: SocketAddr) {
    info!(bind = %addr, "server ready\n{}", startup_banner(addr));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_names_endpoints() {
        let banner = startup_banner("127.0.0.1:8080".parse().expect("socket"));

        assert!(banner.contains("MCP server listening on 127.0.0.1:8080"));
        assert!(banner.contains("http://127.0.0.1:8080/health"));
        assert!(banner.contains("\"url\": \"http://127.0.0.1:8080/mcp\""));
        assert!(banner.contains("http://127.0.0.1:8080/sse"));
    }

    #[test]
    fn unspecified_address_uses_localhost_urls() {
        let banner = startup_banner("0.0.0.0:3000".parse().expect("socket"));

        assert!(banner.contains("MCP server listening on 0.0.0.0:3000"));
        assert!(banner.contains("http://localhost:3000/mcp"));
    }

    #[test]
    fn client_config_is_valid_json() {
        let banner = startup_banner("127.0.0.1:8080".parse().expect("socket"));
        let start = banner.find('{').expect("config start");
        let end = banner.rfind('}').expect("config end");

        let config: serde_json::Value =
            serde_json::from_str(&banner[start..=end]).expect("valid json config");
        assert_eq!(
            config["mcpServers"][env!("CARGO_PKG_NAME")]["url"],
            "http://127.0.0.1:8080/mcp"
        );
    }
}
