use anyhow::{Context, Result};
use reqwest::Client;
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed creating {}", parent.display()))?;
    }
    Ok(())
}

pub fn tmp_sibling(path: &Path, fallback_name: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or(fallback_name);
    path.with_file_name(format!("{file_name}.tmp"))
}

pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    ensure_parent_dir(path)?;
    let tmp_path = tmp_sibling(path, "output");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("Failed writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed moving {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}

pub fn file_name_from_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    let file_name = without_query
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .context("Could not derive filename from URL")?;
    Ok(file_name.to_string())
}

pub async fn download_file(client: &Client, url: &str, output_path: &Path) -> Result<()> {
    ensure_parent_dir(output_path)?;

    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Download request failed for {url}"))?
        .error_for_status()
        .with_context(|| format!("Download failed for {url}"))?;

    let tmp_path = tmp_sibling(output_path, "download");
    let mut file = File::create(&tmp_path)
        .with_context(|| format!("Failed creating {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .context("Failed reading download stream")?
    {
        file.write_all(&chunk)
            .with_context(|| format!("Failed writing {}", tmp_path.display()))?;
        downloaded += chunk.len() as u64;
        if downloaded % (64 * 1024 * 1024) < chunk.len() as u64 {
            tracing::info!("Downloaded ~{} MiB from {url}", downloaded / (1024 * 1024));
        }
    }
    file.flush()
        .with_context(|| format!("Failed flushing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, output_path).with_context(|| {
        format!(
            "Failed moving download {} to {}",
            tmp_path.display(),
            output_path.display()
        )
    })?;

    tracing::info!("Download complete: {}", output_path.display());
    Ok(())
}

pub fn sql_escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "''")
}

pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

pub fn now_unix_millis() -> i128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i128)
        .unwrap_or_default()
}

pub fn new_run_id(job_name: &str) -> String {
    let slug: String = job_name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{slug}-{}", now_unix_millis())
}
