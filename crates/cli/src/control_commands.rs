//! Talk to a running relay over its HTTP control surface.

use std::path::Path;

use {anyhow::Result, reqwest::StatusCode, serde_json::json};

use crate::serve::{Overrides, load_settings};

/// Base URL of the relay described by the config plus overrides.
pub fn base_url(config: Option<&Path>, overrides: &Overrides) -> Result<String> {
    let (mut settings, _) = load_settings(config)?;
    overrides.apply(&mut settings);
    Ok(local_url(&settings.server.bind, settings.server.port))
}

fn local_url(bind: &str, port: u16) -> String {
    let host = match bind {
        "0.0.0.0" | "" => "127.0.0.1",
        "::" => "[::1]",
        other => other,
    };
    format!("http://{host}:{port}")
}

pub async fn control(base: &str, service: &str, command: &str) -> Result<()> {
    post(
        &format!("{base}/api/control"),
        json!({ "service": service, "command": command }),
    )
    .await?;
    println!("{command} {service}: accepted");
    Ok(())
}

pub async fn send(base: &str, service: &str, text: &str) -> Result<()> {
    post(
        &format!("{base}/api/services/{service}/send"),
        json!({ "text": text }),
    )
    .await?;
    println!("message queued for {service}");
    Ok(())
}

async fn post(url: &str, body: serde_json::Value) -> Result<()> {
    let resp = reqwest::Client::new().post(url).json(&body).send().await?;
    let status = resp.status();
    if status == StatusCode::ACCEPTED {
        return Ok(());
    }
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    let reason = body["error"].as_str().unwrap_or("no details");
    anyhow::bail!("relay rejected request ({status}): {reason}")
}
