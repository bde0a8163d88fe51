use anyhow::Result;
use devbox_models::{CreateReleaseRequest, ReleaseSummary};
use reqwest::StatusCode;

use crate::config::api_url;

pub async fn run_list(name: String, output: String) -> Result<()> {
    let response = reqwest::get(format!("{}/devbox/{}/release", api_url(), name))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to API: {}", e))?;

    if !response.status().is_success() {
        anyhow::bail!(api_error(response).await);
    }

    let releases: Vec<ReleaseSummary> = response.json().await?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&releases)?);
    } else {
        print_table(&releases);
    }

    Ok(())
}

pub async fn run_create(name: String, tag: String, description: String, start: bool) -> Result<()> {
    let request = CreateReleaseRequest {
        tag: tag.clone(),
        release_des: description,
        start_devbox_after_release: start,
    };

    let response = reqwest::Client::new()
        .post(format!("{}/devbox/{}/release", api_url(), name))
        .json(&request)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to API: {}", e))?;

    if response.status() != StatusCode::ACCEPTED {
        anyhow::bail!(api_error(response).await);
    }

    println!("✓ Release '{}' of devbox '{}' accepted", tag, name);
    println!("  The devbox is paused while the image builds");
    println!("  Track it with: devbox-server releases {}", name);

    Ok(())
}

fn print_table(releases: &[ReleaseSummary]) {
    println!("{:<20} {:<10} {:<22} {:<40} DESCRIPTION", "TAG", "PHASE", "CREATED", "IMAGE");
    println!("{}", "-".repeat(110));

    for release in releases {
        let created = release
            .created_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<10} {:<22} {:<40} {}",
            release.tag,
            format!("{:?}", release.phase),
            created,
            release.image,
            release.description
        );
    }

    println!();
    println!("{} release(s) found", releases.len());
}

/// Error message of a failed API call, from its `{"error": ...}` body if any
async fn api_error(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<serde_json::Value>().await {
        Ok(body) => match body["error"].as_str() {
            Some(message) => format!("API error ({}): {}", status, message),
            None => format!("API error: {}", status),
        },
        Err(_) => format!("API error: {}", status),
    }
}
