//! Routes outbound HTTP through the host egress proxy.

use anyhow::Result;

use super::{Contributor, EnvVar, EnvVarRequest, PromptFragment, PromptRequest, PromptSection};

/// Destinations that bypass the proxy
const NO_PROXY: &str = "localhost,127.0.0.1,::1";

pub fn contributor() -> Contributor {
    Contributor::new("proxy")
        .with_env_vars(env_vars)
        .with_prompts(prompts)
}

fn proxy_url(url: Option<&String>) -> Option<&str> {
    url.map(|u| u.trim()).filter(|u| !u.is_empty())
}

fn env_vars(req: &EnvVarRequest) -> Result<Vec<EnvVar>> {
    let Some(url) = proxy_url(req.proxy_url.as_ref()) else {
        return Ok(Vec::new());
    };
    // Tools disagree on casing, so set both.
    Ok(vec![
        EnvVar::string("HTTP_PROXY", url),
        EnvVar::string("HTTPS_PROXY", url),
        EnvVar::string("http_proxy", url),
        EnvVar::string("https_proxy", url),
        EnvVar::string("NO_PROXY", NO_PROXY),
        EnvVar::string("no_proxy", NO_PROXY),
    ])
}

fn prompts(req: &PromptRequest) -> Result<Vec<PromptFragment>> {
    let Some(url) = proxy_url(req.proxy_url.as_ref()) else {
        return Ok(Vec::new());
    };
    Ok(vec![PromptFragment::new(
        PromptSection::Environment,
        10,
        format!(
            "Network access goes through the proxy at {url}. Requests to hosts the proxy \
             does not allow will fail; do not try to work around it."
        ),
    )])
}
