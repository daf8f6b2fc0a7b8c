//! Secret bundle upload.

use std::path::Path;

use anyhow::{Context, Result, bail};
use reqwest::multipart::{Form, Part};

pub async fn upload(api_url: &str, clone_url: &str, file: &Path) -> Result<()> {
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("Secret file has no usable name")?
        .to_string();
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let form = Form::new()
        .text("url", clone_url.to_string())
        .part("secret", Part::bytes(data).file_name(file_name));

    let response = reqwest::Client::new()
        .post(upload_url(api_url))
        .multipart(form)
        .send()
        .await
        .context("Failed to reach server")?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("Upload rejected ({}): {}", status, body);
    }

    println!("Uploaded secrets for {}", clone_url);
    Ok(())
}

fn upload_url(api_url: &str) -> String {
    format!("{}/secrets/upload", api_url.trim_end_matches('/'))
}
