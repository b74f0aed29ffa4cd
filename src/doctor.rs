use std::net::SocketAddr;

use conduit_a2a::A2aClient;
use conduit_core::config::{AppConfig, McpDiscoveryConfig};
use conduit_core::traits::AgentResolver;
use conduit_mcp::McpAgentResolver;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

impl CheckResult {
    fn ok(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

pub async fn run_doctor(config: &AppConfig, client: &A2aClient) {
    let mut checks = Vec::new();

    // 1. Discovery source is usable
    checks.push(check_discovery(config));

    // 2. Tokens were expanded from the environment
    checks.push(check_tokens(config));

    // 3. Gateway bind address parses
    checks.push(check_gateway(config));

    // 4. Advertised URL is absolute
    checks.push(check_orchestrator_url(config));

    // 5. Remote agents answer
    if config.discovery.validate().is_ok() {
        match &config.discovery.mcp {
            Some(mcp) => checks.push(check_registry(mcp).await),
            None => {
                for peer in &config.discovery.agents {
                    checks.push(check_peer(client, &peer.name, &peer.url).await);
                }
            }
        }
    }

    // Print results
    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_discovery(config: &AppConfig) -> CheckResult {
    if let Err(e) = config.discovery.validate() {
        return CheckResult::fail("Discovery", e.to_string());
    }
    match &config.discovery.mcp {
        Some(mcp) => CheckResult::ok(
            "Discovery",
            format!("MCP registry ({}, tool '{}')", mcp.planner_resource, mcp.find_tool),
        ),
        None => CheckResult::ok(
            "Discovery",
            format!(
                "{} static agents, planner '{}'",
                config.discovery.agents.len(),
                config.discovery.planner.as_deref().unwrap_or_default()
            ),
        ),
    }
}

fn unexpanded(token: &Option<String>) -> bool {
    token.as_deref().is_some_and(|t| t.contains("${"))
}

fn check_tokens(config: &AppConfig) -> CheckResult {
    let mut issues = Vec::new();

    if unexpanded(&config.client.token) {
        issues.push("client.token".to_string());
    }
    if let Some(ref gw) = config.gateway {
        if unexpanded(&gw.token) {
            issues.push("gateway.token".to_string());
        }
        for key in &gw.api_keys {
            if key.key.contains("${") {
                issues.push(format!("gateway.api_keys '{}'", key.name));
            }
        }
    }

    if issues.is_empty() {
        CheckResult::ok("Tokens", "All references expanded")
    } else {
        CheckResult::fail("Tokens", format!("Unset env vars in: {}", issues.join(", ")))
    }
}

fn check_gateway(config: &AppConfig) -> CheckResult {
    let Some(ref gw) = config.gateway else {
        return CheckResult::ok("Gateway", "Not configured (defaults apply to serve)");
    };
    if let Err(e) = gw.bind.parse::<SocketAddr>() {
        return CheckResult::fail("Gateway", format!("bind '{}': {}", gw.bind, e));
    }
    let auth = if !gw.api_keys.is_empty() {
        format!("{} API keys", gw.api_keys.len())
    } else if gw.token.is_some() {
        "bearer token".to_string()
    } else {
        "open access".to_string()
    };
    CheckResult::ok("Gateway", format!("{} ({})", gw.bind, auth))
}

fn check_orchestrator_url(config: &AppConfig) -> CheckResult {
    let url = &config.orchestrator.url;
    if url.starts_with("http://") || url.starts_with("https://") {
        CheckResult::ok("Agent card", format!("'{}' at {}", config.orchestrator.name, url))
    } else {
        CheckResult::fail("Agent card", format!("url '{}' is not an http(s) URL", url))
    }
}

async fn check_peer(client: &A2aClient, name: &str, url: &str) -> CheckResult {
    let label = format!("Agent {}", name);
    match client.fetch_agent_card(url).await {
        Ok(card) => CheckResult::ok(
            &label,
            format!("'{}' v{} (streaming: {})", card.name, card.version, card.capabilities.streaming),
        ),
        Err(e) => CheckResult::fail(&label, format!("{}: {}", url, e)),
    }
}

async fn check_registry(config: &McpDiscoveryConfig) -> CheckResult {
    let resolver = match McpAgentResolver::connect(config).await {
        Ok(r) => r,
        Err(e) => return CheckResult::fail("Registry", e.to_string()),
    };
    let result = match resolver.planner_card().await {
        Ok(card) => CheckResult::ok("Registry", format!("planner '{}' at {}", card.name, card.url)),
        Err(e) => CheckResult::fail("Registry", e.to_string()),
    };
    resolver.shutdown().await;
    result
}
